use chainlog_store::{ReadWriteTransaction, RecordFilter};
use chainlog_types::Record;

use crate::error::LedgerError;

/// Reads chain state inside a caller-supplied transaction.
pub struct ChainReader;

impl ChainReader {
    /// Find the single record with an empty forward link.
    ///
    /// The scan is drained to the end even after the first match, so a
    /// forked chain is reported instead of silently picking one tail. The
    /// cursor is released on every exit path when it is dropped.
    pub async fn find_tail(txn: &mut dyn ReadWriteTransaction) -> Result<Record, LedgerError> {
        let mut cursor = txn.query(RecordFilter::Tail).await?;

        let mut tails: Vec<Record> = Vec::with_capacity(1);
        while let Some(record) = cursor.next().await? {
            tails.push(record);
        }
        cursor.close();

        match tails.len() {
            0 => Err(LedgerError::NotInitialized),
            1 => Ok(tails.remove(0)),
            n => {
                let sequences: Vec<u64> = tails.iter().map(|r| r.sequence).collect();
                tracing::error!(?sequences, "chain has {n} tail records");
                Err(LedgerError::IntegrityViolation {
                    sequence: tails[0].sequence,
                    reason: format!("found {n} tail records at sequences {sequences:?}"),
                })
            }
        }
    }
}
