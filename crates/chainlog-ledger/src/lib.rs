//! Append-only hash-linked ledger for chainlog.
//!
//! This crate is the heart of chainlog. It provides:
//! - [`ChainReader`]: tail lookup inside a transaction
//! - [`ChainWriter`]: derivation of the new tail and the sealed predecessor
//! - [`LedgerService`]: transactional append with bounded conflict retry
//! - [`ProvisioningService`]: table creation and genesis seeding
//! - [`ChainValidator`]: full-chain integrity reports

pub mod error;
pub mod provision;
pub mod reader;
pub mod retry;
pub mod service;
pub mod validation;
pub mod writer;

pub use error::{AppendError, AppendPhase, LedgerError};
pub use provision::{genesis_record, ProvisioningService};
pub use reader::ChainReader;
pub use retry::RetryPolicy;
pub use service::{AppendReceipt, LedgerConfig, LedgerService};
pub use validation::{ChainValidator, ValidationReport, Violation, ViolationKind};
pub use writer::{ChainLink, ChainWriter};
