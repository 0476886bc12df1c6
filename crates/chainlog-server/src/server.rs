use std::future::Future;
use std::sync::Arc;

use chainlog_ledger::{LedgerError, LedgerService, ProvisioningService};
use chainlog_store::TransactionalStore;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Chainlog HTTP server.
pub struct ChainlogServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ChainlogServer {
    /// Wire the ledger services to `store`. The store handle is shared by
    /// every request.
    pub fn new(config: ServerConfig, store: Arc<dyn TransactionalStore>) -> Self {
        let state = Arc::new(AppState {
            ledger: LedgerService::new(Arc::clone(&store), config.ledger_config()),
            provisioner: ProvisioningService::new(store),
        });
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.state.ledger
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.state))
    }

    /// Provision the ledger if the configuration asks for it.
    ///
    /// An already provisioned ledger is not an error here.
    pub async fn prepare(&self) -> ServerResult<()> {
        if !self.config.provision_on_start {
            return Ok(());
        }
        match self.state.provisioner.provision().await {
            Ok(genesis) => {
                tracing::info!(hash = %genesis.self_hash.short_hex(), "ledger provisioned");
                Ok(())
            }
            Err(LedgerError::AlreadyProvisioned) => {
                tracing::info!("ledger already provisioned");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.prepare().await?;
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("chainlog server listening on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chainlog_store::InMemoryStore;

    use super::*;

    #[test]
    fn server_construction() {
        let server = ChainlogServer::new(ServerConfig::default(), Arc::new(InMemoryStore::new()));
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(server.ledger().config().max_payload_len, 1024);
    }

    #[tokio::test]
    async fn prepare_provisions_once() {
        let store = Arc::new(InMemoryStore::new());
        let config = ServerConfig {
            provision_on_start: true,
            ..ServerConfig::default()
        };
        let server = ChainlogServer::new(config.clone(), store.clone());
        server.prepare().await.unwrap();
        assert_eq!(store.stats().rows, 1);

        let restarted = ChainlogServer::new(config, store.clone());
        restarted.prepare().await.unwrap();
        assert_eq!(store.stats().rows, 1);
    }

    #[tokio::test]
    async fn prepare_without_provisioning_leaves_store_empty() {
        let store = Arc::new(InMemoryStore::new());
        let server = ChainlogServer::new(ServerConfig::default(), store.clone());
        server.prepare().await.unwrap();
        assert!(!store.schema_exists().await.unwrap());
    }
}
