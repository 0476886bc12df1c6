use std::sync::Arc;
use std::time::Duration;

use chainlog_crypto::{ChainError, ChainVerifier, RecordHasher};
use chainlog_store::{RecordFilter, TransactionalStore};
use chainlog_types::{validate_payload, Record, RecordHash, MAX_COLUMN_LEN, MAX_SEQUENCE};
use serde::Serialize;

use crate::error::{AppendError, AppendPhase, LedgerError};
use crate::reader::ChainReader;
use crate::retry::RetryPolicy;
use crate::validation::{ChainValidator, ValidationReport};
use crate::writer::ChainWriter;

/// Tuning for [`LedgerService`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Longest accepted payload, in characters. Never above the column bound.
    pub max_payload_len: usize,
    /// Budget for one append call, retries included.
    pub append_deadline: Duration,
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_payload_len: MAX_COLUMN_LEN,
            append_deadline: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a successful append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppendReceipt {
    pub sequence: u64,
    pub self_hash: RecordHash,
    /// Transactions opened, including the one that committed.
    pub attempts: u32,
}

/// Transactional append and read access over a record store.
///
/// The store handle is the only shared state; one service can be cloned
/// into any number of concurrent request handlers.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn TransactionalStore>,
    writer: ChainWriter,
    validator: ChainValidator,
    config: LedgerConfig,
}

impl LedgerService {
    pub fn new(store: Arc<dyn TransactionalStore>, config: LedgerConfig) -> Self {
        let hasher = RecordHasher::default();
        Self {
            store,
            writer: ChainWriter::new(hasher),
            validator: ChainValidator::new(hasher),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TransactionalStore> {
        &self.store
    }

    /// Append `payload` and return the new record's sequence.
    pub async fn append_message(&self, payload: &str) -> Result<u64, AppendError> {
        self.append(payload).await.map(|receipt| receipt.sequence)
    }

    /// Append `payload` as the new tail.
    ///
    /// Every attempt runs `TailLookup -> Derive -> Commit` in a fresh
    /// transaction. A conflict at any step discards that transaction and
    /// starts over after the policy's backoff. Everything else is returned
    /// with the phase it happened in. The whole loop runs under
    /// `append_deadline`; dropping the returned future rolls back the
    /// in-flight transaction.
    pub async fn append(&self, payload: &str) -> Result<AppendReceipt, AppendError> {
        let mut phase = AppendPhase::Validate;
        self.validate(payload)
            .map_err(|e| AppendError::new(phase, payload, e))?;

        let deadline = self.config.append_deadline;
        let outcome =
            tokio::time::timeout(deadline, self.append_with_retry(payload, &mut phase)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(LedgerError::DeadlineExceeded { deadline }),
        };
        match result {
            Ok(receipt) => {
                tracing::info!(
                    sequence = receipt.sequence,
                    attempts = receipt.attempts,
                    hash = %receipt.self_hash.short_hex(),
                    "record appended"
                );
                Ok(receipt)
            }
            Err(error) => {
                tracing::warn!(%phase, %error, "append failed");
                Err(AppendError::new(phase, payload, error))
            }
        }
    }

    fn validate(&self, payload: &str) -> Result<(), LedgerError> {
        validate_payload(payload)?;
        let len = payload.chars().count();
        if len > self.config.max_payload_len {
            return Err(LedgerError::PayloadTooLong {
                len,
                max: self.config.max_payload_len,
            });
        }
        Ok(())
    }

    async fn append_with_retry(
        &self,
        payload: &str,
        phase: &mut AppendPhase,
    ) -> Result<AppendReceipt, LedgerError> {
        let policy = &self.config.retry;
        let max_attempts = policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt_once(payload, phase).await {
                Ok(appended) => {
                    return Ok(AppendReceipt {
                        sequence: appended.sequence,
                        self_hash: appended.self_hash,
                        attempts: attempt,
                    })
                }
                Err(error) if error.is_conflict() => {
                    if attempt >= max_attempts {
                        return Err(LedgerError::ConflictRetriesExhausted { attempts: attempt });
                    }
                    let wait = policy.backoff(attempt);
                    tracing::debug!(attempt, %phase, ?wait, "append conflicted, retrying");
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One transaction. Dropped on every early return, which rolls it back.
    async fn attempt_once(
        &self,
        payload: &str,
        phase: &mut AppendPhase,
    ) -> Result<Record, LedgerError> {
        *phase = AppendPhase::Start;
        let mut txn = self.store.begin().await?;

        *phase = AppendPhase::TailLookup;
        let tail = ChainReader::find_tail(txn.as_mut()).await?;

        *phase = AppendPhase::Derive;
        let link = self.writer.append(txn.as_mut(), &tail, payload)?;

        *phase = AppendPhase::Commit;
        let ts = txn.commit().await?;
        tracing::trace!(txn = txn.id(), sequence = link.appended.sequence, %ts, "append committed");

        Ok(link.appended)
    }

    /// The current tail, read outside any transaction.
    pub async fn tail(&self) -> Result<Record, LedgerError> {
        let mut tails = self.store.single_read(RecordFilter::Tail).await?;
        match tails.len() {
            0 => Err(LedgerError::NotInitialized),
            1 => Ok(tails.remove(0)),
            n => Err(LedgerError::IntegrityViolation {
                sequence: tails[0].sequence,
                reason: format!("found {n} tail records"),
            }),
        }
    }

    /// The record at `sequence`, if any.
    pub async fn record(&self, sequence: u64) -> Result<Option<Record>, LedgerError> {
        let mut rows = self.store.single_read(RecordFilter::Sequence(sequence)).await?;
        Ok(rows.pop())
    }

    /// Records with `from <= sequence <= to`, in order.
    pub async fn records(&self, from: u64, to: u64) -> Result<Vec<Record>, LedgerError> {
        if from > to {
            return Err(LedgerError::InvalidRange { from, to });
        }
        if from > MAX_SEQUENCE {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .single_read(RecordFilter::Range { from, to })
            .await?)
    }

    /// Number of stored records.
    pub async fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.store.single_read(RecordFilter::All).await?.len() as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len().await? == 0)
    }

    /// Validate the whole chain and report every violation.
    pub async fn verify(&self) -> Result<ValidationReport, LedgerError> {
        let records = self.store.single_read(RecordFilter::All).await?;
        let report = self.validator.validate(&records);
        if !report.is_valid() {
            tracing::warn!(
                violations = report.violations.len(),
                records = report.record_count,
                "chain validation failed"
            );
        }
        Ok(report)
    }

    /// Verify the whole chain, failing on the first broken invariant.
    ///
    /// Returns the chain length.
    pub async fn verify_strict(&self) -> Result<u64, LedgerError> {
        let records = self.store.single_read(RecordFilter::All).await?;
        ChainVerifier::verify_chain(&records).map_err(|error| match error {
            ChainError::Empty => LedgerError::NotInitialized,
            other => LedgerError::IntegrityViolation {
                sequence: other
                    .index()
                    .and_then(|i| records.get(i))
                    .or(records.first())
                    .map_or(0, |r| r.sequence),
                reason: other.to_string(),
            },
        })?;
        Ok(records.len() as u64)
    }
}
