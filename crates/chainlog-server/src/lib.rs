//! HTTP server for chainlog.
//!
//! A thin adapter over [`chainlog_ledger`]: one append endpoint, one
//! provisioning endpoint, liveness, and read-only views of the chain.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{LedgerSettings, LogSettings, RetrySettings, ServerConfig};
pub use error::{ErrorBody, ServerError, ServerResult};
pub use handler::AppState;
pub use server::ChainlogServer;
