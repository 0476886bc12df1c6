use std::fmt;
use std::time::Duration;

use chainlog_store::StoreError;
use chainlog_types::TypeError;
use serde::Serialize;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger is not initialized: no tail record found")]
    NotInitialized,

    #[error("ledger is already provisioned")]
    AlreadyProvisioned,

    #[error("integrity violation at seq {sequence}: {reason}")]
    IntegrityViolation { sequence: u64, reason: String },

    #[error("payload too long: {len} characters, limit is {max}")]
    PayloadTooLong { len: usize, max: usize },

    #[error("invalid sequence range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("deadline of {deadline:?} exceeded")]
    DeadlineExceeded { deadline: Duration },

    #[error("transaction conflict persisted after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: u32 },

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl LedgerError {
    /// Returns `true` for a transaction conflict that has not been retried
    /// yet. Only the append loop ever sees this.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    /// Returns `true` if the caller may reasonably try the same call again.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::DeadlineExceeded { .. }
                | Self::ConflictRetriesExhausted { .. }
        )
    }

    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyProvisioned => "already_provisioned",
            Self::IntegrityViolation { .. } => "integrity_violation",
            Self::PayloadTooLong { .. } => "payload_too_long",
            Self::InvalidRange { .. } => "invalid_range",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::ConflictRetriesExhausted { .. } => "conflict_retries_exhausted",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(_) => Self::StoreUnavailable(error),
            StoreError::SchemaNotFound => Self::NotInitialized,
            StoreError::CorruptRow { sequence, reason } => Self::IntegrityViolation {
                sequence: sequence.max(0).unsigned_abs(),
                reason: format!("undecodable row: {reason}"),
            },
            StoreError::SequenceOutOfRange { sequence } => Self::IntegrityViolation {
                sequence,
                reason: "sequence exceeds the key column".into(),
            },
            other => Self::Store(other),
        }
    }
}

impl From<TypeError> for LedgerError {
    fn from(error: TypeError) -> Self {
        match error {
            TypeError::PayloadTooLong { len, max } => Self::PayloadTooLong { len, max },
            other => Self::IntegrityViolation {
                sequence: 0,
                reason: other.to_string(),
            },
        }
    }
}

/// Step of the append state machine a failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendPhase {
    Validate,
    Start,
    TailLookup,
    Derive,
    Commit,
}

impl fmt::Display for AppendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Start => "start",
            Self::TailLookup => "tail lookup",
            Self::Derive => "derive",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// A failed append, with the phase reached and the payload attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("append failed during {phase} (payload {:?}): {source}", preview(.payload))]
pub struct AppendError {
    pub phase: AppendPhase,
    pub payload: String,
    #[source]
    pub source: LedgerError,
}

impl AppendError {
    pub fn new(phase: AppendPhase, payload: &str, source: LedgerError) -> Self {
        Self {
            phase,
            payload: payload.to_string(),
            source,
        }
    }

    /// The underlying failure.
    pub fn kind(&self) -> &LedgerError {
        &self.source
    }
}

fn preview(payload: &str) -> String {
    const LIMIT: usize = 48;
    if payload.chars().count() <= LIMIT {
        payload.to_string()
    } else {
        let head: String = payload.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}
