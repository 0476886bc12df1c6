use chainlog_crypto::RecordHasher;
use chainlog_store::{Mutation, ReadWriteTransaction};
use chainlog_types::Record;

use crate::error::LedgerError;

/// The two rows produced by one append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLink {
    /// The new tail.
    pub appended: Record,
    /// The previous tail with its forward link set to `appended`.
    pub sealed: Record,
}

/// Derives new tails from the current one.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainWriter {
    hasher: RecordHasher,
}

impl ChainWriter {
    pub fn new(hasher: RecordHasher) -> Self {
        Self { hasher }
    }

    /// Compute the record that follows `tail` and the sealed `tail`. Pure.
    pub fn derive(&self, tail: &Record, payload: &str) -> ChainLink {
        let sequence = tail.sequence + 1;
        let self_hash = self
            .hasher
            .record_hash(sequence, Some(&tail.self_hash), payload);

        let appended = Record {
            sequence,
            payload: payload.to_string(),
            self_hash,
            backward_link: Some(tail.self_hash),
            forward_link: None,
        };
        let sealed = tail.sealed(self_hash);
        ChainLink { appended, sealed }
    }

    /// Buffer both rows of `link` as upserts in `txn`.
    pub fn stage(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        link: &ChainLink,
    ) -> Result<(), LedgerError> {
        txn.buffer_mutation(Mutation::Upsert(link.sealed.clone()))?;
        txn.buffer_mutation(Mutation::Upsert(link.appended.clone()))?;
        Ok(())
    }

    /// Derive and stage in one step.
    pub fn append(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        tail: &Record,
        payload: &str,
    ) -> Result<ChainLink, LedgerError> {
        let link = self.derive(tail, payload);
        self.stage(txn, &link)?;
        Ok(link)
    }

    pub fn hasher(&self) -> &RecordHasher {
        &self.hasher
    }
}
