//! Hashing primitives for chainlog.
//!
//! Provides the domain-separated BLAKE3 record hasher and a fail-fast
//! verifier for sequence-ordered chains of records.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, ChainVerifier};
pub use hasher::{HashMaterial, RecordHasher};
