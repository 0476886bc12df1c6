use chainlog_types::{Record, GENESIS_SEQUENCE};

use crate::hasher::RecordHasher;

/// Fail-fast integrity verifier for a chain of records.
///
/// The slice must be ordered by sequence, starting at genesis.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify a complete chain.
    ///
    /// Checks:
    /// 1. The first record is genesis: sequence 1, no backward link
    /// 2. Sequences increase by exactly one
    /// 3. Each backward link matches the predecessor's hash
    /// 4. Each sealed record's forward link matches the successor's hash
    /// 5. Only the last record is unsealed
    /// 6. Each record's hash recomputes from its stored fields
    pub fn verify_chain(records: &[Record]) -> Result<(), ChainError> {
        let Some(first) = records.first() else {
            return Err(ChainError::Empty);
        };

        if first.sequence != GENESIS_SEQUENCE || !first.is_genesis() {
            return Err(ChainError::InvalidGenesis);
        }

        let hasher = RecordHasher::RECORD;
        let last = records.len() - 1;

        for (index, record) in records.iter().enumerate() {
            if !hasher.verify(record) {
                return Err(ChainError::HashMismatch { index });
            }

            if index > 0 {
                let prev = &records[index - 1];
                if record.sequence != prev.sequence + 1 {
                    return Err(ChainError::SequenceGap { index });
                }
                match record.backward_link {
                    Some(link) if link == prev.self_hash => {}
                    Some(_) => return Err(ChainError::BrokenBackwardLink { index }),
                    None => return Err(ChainError::MissingBackwardLink { index }),
                }
            }

            match (index == last, record.forward_link) {
                (true, None) => {}
                (true, Some(_)) => return Err(ChainError::SealedTail { index }),
                (false, None) => return Err(ChainError::UnsealedRecord { index }),
                (false, Some(link)) => {
                    if link != records[index + 1].self_hash {
                        return Err(ChainError::BrokenForwardLink { index });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain is empty")]
    Empty,

    #[error("first record is not a genesis record")]
    InvalidGenesis,

    #[error("sequence gap at index {index}")]
    SequenceGap { index: usize },

    #[error("broken backward link at index {index}: does not match predecessor hash")]
    BrokenBackwardLink { index: usize },

    #[error("missing backward link at index {index}")]
    MissingBackwardLink { index: usize },

    #[error("broken forward link at index {index}: does not match successor hash")]
    BrokenForwardLink { index: usize },

    #[error("record at index {index} is unsealed but is not the tail")]
    UnsealedRecord { index: usize },

    #[error("tail at index {index} carries a forward link")]
    SealedTail { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },
}

impl ChainError {
    /// Position of the offending record in the verified slice, if any.
    pub fn index(&self) -> Option<usize> {
        match *self {
            Self::Empty | Self::InvalidGenesis => None,
            Self::SequenceGap { index }
            | Self::BrokenBackwardLink { index }
            | Self::MissingBackwardLink { index }
            | Self::BrokenForwardLink { index }
            | Self::UnsealedRecord { index }
            | Self::SealedTail { index }
            | Self::HashMismatch { index } => Some(index),
        }
    }
}
