use thiserror::Error;

/// Errors produced by type validation and decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("payload too long: {len} characters, limit is {max}")]
    PayloadTooLong { len: usize, max: usize },

    #[error("sequence out of range: {0}")]
    SequenceOutOfRange(i64),

    #[error("sequence {0} does not fit the key column")]
    SequenceNotStorable(u64),

    #[error("column {column} exceeds {max} characters")]
    ColumnTooLong { column: &'static str, max: usize },
}
