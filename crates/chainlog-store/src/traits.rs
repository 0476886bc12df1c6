use std::fmt;

use async_trait::async_trait;
use chainlog_types::{Record, RecordRow};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Transactional record store.
///
/// All implementations must satisfy these invariants:
/// - A handle is safe for concurrent use by many callers.
/// - Mutations buffered in a transaction are invisible until commit.
/// - Commit applies every buffered mutation atomically, or none of them.
/// - A transaction whose read set was invalidated by another committed
///   transaction fails to commit with `StoreError::Conflict`.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Open a read-write transaction.
    async fn begin(&self) -> StoreResult<Box<dyn ReadWriteTransaction>>;

    /// Non-transactional snapshot read, fully drained, ordered by sequence.
    async fn single_read(&self, filter: RecordFilter) -> StoreResult<Vec<Record>>;

    /// Create the record table.
    ///
    /// Fails with `StoreError::SchemaAlreadyExists` if it already exists.
    async fn create_schema(&self) -> StoreResult<()>;

    /// Whether the record table exists.
    async fn schema_exists(&self) -> StoreResult<bool>;
}

/// A read-write transaction.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait ReadWriteTransaction: Send {
    /// Store-assigned transaction identifier, for logs.
    fn id(&self) -> u64;

    /// Start a lazy scan over the rows matching `filter`.
    ///
    /// The returned cursor must be drained or closed; dropping it releases
    /// it. A new query is the only way to restart a scan.
    async fn query(&mut self, filter: RecordFilter) -> StoreResult<Box<dyn RowCursor>>;

    /// Stage a mutation. It is applied only at commit.
    fn buffer_mutation(&mut self, mutation: Mutation) -> StoreResult<()>;

    /// Commit every buffered mutation atomically.
    async fn commit(&mut self) -> StoreResult<CommitTimestamp>;

    /// Discard buffered mutations and close the transaction.
    fn rollback(&mut self);
}

/// Lazy sequence of records produced by [`ReadWriteTransaction::query`].
#[async_trait]
pub trait RowCursor: Send {
    /// The next record, or `None` once the scan is exhausted.
    async fn next(&mut self) -> StoreResult<Option<Record>>;

    /// Release the cursor early. Further calls to `next` return `None`.
    fn close(&mut self);
}

/// Row predicate for scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFilter {
    /// Every row.
    All,
    /// Rows whose forward link is empty.
    Tail,
    /// The row with this sequence.
    Sequence(u64),
    /// Rows with `from <= sequence <= to`.
    Range { from: u64, to: u64 },
}

impl RecordFilter {
    /// Evaluate the predicate against a stored row.
    pub fn matches_row(&self, row: &RecordRow) -> bool {
        match *self {
            Self::All => true,
            Self::Tail => row.is_tail(),
            Self::Sequence(sequence) => u64::try_from(row.sequence) == Ok(sequence),
            Self::Range { from, to } => {
                u64::try_from(row.sequence).is_ok_and(|s| (from..=to).contains(&s))
            }
        }
    }
}

/// A staged write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace the row keyed by `record.sequence`.
    Upsert(Record),
}

impl Mutation {
    /// The sequence this mutation is keyed by.
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Upsert(record) => record.sequence,
        }
    }
}

/// Logical timestamp assigned to a committed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitTimestamp(pub u64);

impl fmt::Display for CommitTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}
