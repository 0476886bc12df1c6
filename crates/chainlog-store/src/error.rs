/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A row read or written by the transaction was committed concurrently.
    #[error("transaction conflict on sequence {sequence}")]
    Conflict { sequence: u64 },

    /// Transport-level failure reaching the store.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The record table has not been created.
    #[error("record table does not exist")]
    SchemaNotFound,

    /// The record table already exists.
    #[error("record table already exists")]
    SchemaAlreadyExists,

    /// The transaction was already committed, aborted, or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// The sequence does not fit the table's key column.
    #[error("sequence {sequence} cannot be stored")]
    SequenceOutOfRange { sequence: u64 },

    /// A stored row could not be decoded.
    #[error("corrupt row at sequence {sequence}: {reason}")]
    CorruptRow { sequence: i64, reason: String },

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if the failure is a transaction conflict, which is
    /// resolved by retrying in a fresh transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
