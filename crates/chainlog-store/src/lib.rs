//! Transactional record storage for chainlog.
//!
//! The ledger never owns records: it reads and writes them through the
//! [`TransactionalStore`] contract, which provides read-write transactions
//! with buffered mutations and all-or-nothing commit.
//!
//! # Backends
//!
//! - [`InMemoryStore`] -- optimistic, multi-version in-memory table for
//!   tests, demos, and embedding
//! - [`FaultInjectingStore`] -- wraps any backend and injects scripted
//!   failures and latency
//!
//! # Design Rules
//!
//! 1. Mutations are buffered in the transaction and applied only at commit.
//! 2. Commit is atomic: every buffered mutation becomes visible, or none does.
//! 3. A transaction whose reads were invalidated by a concurrent commit fails
//!    with [`StoreError::Conflict`] and must be retried in a new transaction.
//! 4. Dropping an uncommitted transaction rolls it back.
//! 5. Cursors are released on drop, on every exit path.

pub mod error;
pub mod faulty;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use faulty::FaultInjectingStore;
pub use memory::{InMemoryStore, StoreStats};
pub use traits::{
    CommitTimestamp, Mutation, ReadWriteTransaction, RecordFilter, RowCursor, TransactionalStore,
};
