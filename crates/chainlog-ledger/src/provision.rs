use std::sync::Arc;

use chainlog_crypto::RecordHasher;
use chainlog_store::{Mutation, RecordFilter, StoreError, TransactionalStore};
use chainlog_types::{Record, GENESIS_PAYLOAD, GENESIS_SEQUENCE};

use crate::error::LedgerError;

/// The first record of every chain. Deterministic for a given hasher.
pub fn genesis_record(hasher: &RecordHasher) -> Record {
    Record {
        sequence: GENESIS_SEQUENCE,
        payload: GENESIS_PAYLOAD.to_string(),
        self_hash: hasher.record_hash(GENESIS_SEQUENCE, None, GENESIS_PAYLOAD),
        backward_link: None,
        forward_link: None,
    }
}

/// Creates the record table and seeds the genesis record.
pub struct ProvisioningService {
    store: Arc<dyn TransactionalStore>,
    hasher: RecordHasher,
}

impl ProvisioningService {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self::with_hasher(store, RecordHasher::default())
    }

    pub fn with_hasher(store: Arc<dyn TransactionalStore>, hasher: RecordHasher) -> Self {
        Self { store, hasher }
    }

    /// Create the table if needed and write genesis into an empty table.
    ///
    /// Fails with [`LedgerError::AlreadyProvisioned`] when the table holds
    /// any row, including when a concurrent provisioner wins the race.
    pub async fn provision(&self) -> Result<Record, LedgerError> {
        match self.store.create_schema().await {
            Ok(()) => {}
            Err(StoreError::SchemaAlreadyExists) => {
                tracing::debug!("record table already exists");
            }
            Err(e) => return Err(e.into()),
        }

        let mut txn = self.store.begin().await?;
        let mut cursor = txn.query(RecordFilter::All).await?;
        let existing = cursor.next().await;
        cursor.close();
        match existing {
            Ok(None) => {}
            Ok(Some(_)) | Err(StoreError::CorruptRow { .. }) => {
                return Err(LedgerError::AlreadyProvisioned)
            }
            Err(e) => return Err(e.into()),
        }

        let genesis = genesis_record(&self.hasher);
        txn.buffer_mutation(Mutation::Upsert(genesis.clone()))?;
        match txn.commit().await {
            Ok(ts) => {
                tracing::info!(hash = %genesis.self_hash.short_hex(), %ts, "genesis record written");
                Ok(genesis)
            }
            Err(e) if e.is_conflict() => Err(LedgerError::AlreadyProvisioned),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the table exists and holds at least one row.
    pub async fn is_provisioned(&self) -> Result<bool, LedgerError> {
        if !self.store.schema_exists().await? {
            return Ok(false);
        }
        Ok(!self.store.single_read(RecordFilter::Tail).await?.is_empty())
    }
}
