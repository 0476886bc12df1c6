use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::RecordHash;

/// Column bound shared by the payload and the hash columns.
pub const MAX_COLUMN_LEN: usize = 1024;

/// Sequence number of the genesis record.
pub const GENESIS_SEQUENCE: u64 = 1;

/// Largest sequence the 64-bit signed key column can hold.
pub const MAX_SEQUENCE: u64 = i64::MAX as u64;

/// Payload written into the genesis record by provisioning.
pub const GENESIS_PAYLOAD: &str = "Block 0";

/// One link of the chain.
///
/// `backward_link` is `None` only for genesis. `forward_link` is `None` while
/// the record is the tail and is set exactly once, when a successor is
/// appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub sequence: u64,
    pub payload: String,
    pub self_hash: RecordHash,
    pub backward_link: Option<RecordHash>,
    pub forward_link: Option<RecordHash>,
}

impl Record {
    /// Returns `true` if no successor has sealed this record.
    pub fn is_tail(&self) -> bool {
        self.forward_link.is_none()
    }

    /// Returns `true` if this record has no predecessor.
    pub fn is_genesis(&self) -> bool {
        self.backward_link.is_none()
    }

    /// A copy of this record sealed with a forward link to `successor`.
    ///
    /// Every other field is unchanged.
    pub fn sealed(&self, successor: RecordHash) -> Self {
        Self {
            forward_link: Some(successor),
            ..self.clone()
        }
    }
}

/// Check a payload against the column bound (counted in characters).
pub fn validate_payload(payload: &str) -> Result<(), TypeError> {
    let len = payload.chars().count();
    if len > MAX_COLUMN_LEN {
        return Err(TypeError::PayloadTooLong {
            len,
            max: MAX_COLUMN_LEN,
        });
    }
    Ok(())
}
