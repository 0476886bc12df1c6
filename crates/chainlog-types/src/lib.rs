//! Foundation types for chainlog.
//!
//! chainlog is a tamper-evident, append-only ledger: a singly linked chain of
//! records where every record is identified by a content hash, points back to
//! its predecessor, and is sealed with a forward link once superseded.
//!
//! # Key Types
//!
//! - [`Record`]: one link of the chain
//! - [`RecordHash`]: BLAKE3 digest identifying a record
//! - [`RecordRow`]: the persisted column layout of a record
//! - [`TypeError`]: validation failures for the types above

pub mod error;
pub mod hash;
pub mod record;
pub mod row;

pub use error::TypeError;
pub use hash::RecordHash;
pub use record::{
    validate_payload, Record, GENESIS_PAYLOAD, GENESIS_SEQUENCE, MAX_COLUMN_LEN, MAX_SEQUENCE,
};
pub use row::RecordRow;
