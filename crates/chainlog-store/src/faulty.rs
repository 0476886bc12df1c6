//! A [`TransactionalStore`] wrapper that injects scripted failures and latency.
//!
//! `FaultInjectingStore` wraps any `Arc<dyn TransactionalStore>` and, on
//! demand, fails the next N commits or queries with a chosen error, or
//! sleeps before every query and commit. Everything else passes through.
//!
//! # Example
//!
//! ```ignore
//! let store = FaultInjectingStore::new(Arc::new(InMemoryStore::new()))
//!     .commit_latency(Duration::from_millis(50));
//! store.conflict_next_commits(3);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chainlog_types::Record;

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    CommitTimestamp, Mutation, ReadWriteTransaction, RecordFilter, RowCursor, TransactionalStore,
};

/// A [`TransactionalStore`] wrapper with scripted faults.
///
/// Useful for exercising conflict retries, transport failures, and deadline
/// handling without a real network between the ledger and its store.
pub struct FaultInjectingStore {
    inner: Arc<dyn TransactionalStore>,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Faults {
    plan: Mutex<FaultPlan>,
    commit_attempts: AtomicU64,
}

#[derive(Default)]
struct FaultPlan {
    commit_errors: VecDeque<StoreError>,
    query_errors: VecDeque<StoreError>,
    query_latency: Duration,
    commit_latency: Duration,
}

impl Faults {
    fn plan(&self) -> MutexGuard<'_, FaultPlan> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FaultInjectingStore {
    /// Wrap an existing store with no faults (pass-through) by default.
    pub fn new(inner: Arc<dyn TransactionalStore>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Sleep for `latency` before every query.
    pub fn query_latency(self, latency: Duration) -> Self {
        self.faults.plan().query_latency = latency;
        self
    }

    /// Sleep for `latency` before every commit.
    pub fn commit_latency(self, latency: Duration) -> Self {
        self.faults.plan().commit_latency = latency;
        self
    }

    /// Fail the next `count` commits with `error`.
    ///
    /// The wrapped transaction is rolled back, so nothing is applied.
    pub fn fail_next_commits(&self, count: usize, error: StoreError) {
        let mut plan = self.faults.plan();
        plan.commit_errors
            .extend(std::iter::repeat(error).take(count));
    }

    /// Fail the next `count` commits with a transaction conflict.
    pub fn conflict_next_commits(&self, count: usize) {
        self.fail_next_commits(count, StoreError::Conflict { sequence: 0 });
    }

    /// Fail the next `count` queries with `error`.
    pub fn fail_next_queries(&self, count: usize, error: StoreError) {
        let mut plan = self.faults.plan();
        plan.query_errors
            .extend(std::iter::repeat(error).take(count));
    }

    /// Number of commits attempted through this wrapper.
    pub fn commit_attempts(&self) -> u64 {
        self.faults.commit_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionalStore for FaultInjectingStore {
    async fn begin(&self) -> StoreResult<Box<dyn ReadWriteTransaction>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn single_read(&self, filter: RecordFilter) -> StoreResult<Vec<Record>> {
        self.inner.single_read(filter).await
    }

    async fn create_schema(&self) -> StoreResult<()> {
        self.inner.create_schema().await
    }

    async fn schema_exists(&self) -> StoreResult<bool> {
        self.inner.schema_exists().await
    }
}

struct FaultyTransaction {
    inner: Box<dyn ReadWriteTransaction>,
    faults: Arc<Faults>,
}

#[async_trait]
impl ReadWriteTransaction for FaultyTransaction {
    fn id(&self) -> u64 {
        self.inner.id()
    }

    async fn query(&mut self, filter: RecordFilter) -> StoreResult<Box<dyn RowCursor>> {
        let (latency, injected) = {
            let mut plan = self.faults.plan();
            (plan.query_latency, plan.query_errors.pop_front())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = injected {
            tracing::debug!(txn = self.inner.id(), %error, "injecting query fault");
            return Err(error);
        }
        self.inner.query(filter).await
    }

    fn buffer_mutation(&mut self, mutation: Mutation) -> StoreResult<()> {
        self.inner.buffer_mutation(mutation)
    }

    async fn commit(&mut self) -> StoreResult<CommitTimestamp> {
        self.faults.commit_attempts.fetch_add(1, Ordering::SeqCst);
        let (latency, injected) = {
            let mut plan = self.faults.plan();
            (plan.commit_latency, plan.commit_errors.pop_front())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = injected {
            tracing::debug!(txn = self.inner.id(), %error, "injecting commit fault");
            self.inner.rollback();
            return Err(error);
        }
        self.inner.commit().await
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    async fn wrapped() -> (Arc<InMemoryStore>, FaultInjectingStore) {
        let inner = Arc::new(InMemoryStore::new());
        inner.create_schema().await.unwrap();
        let faulty = FaultInjectingStore::new(inner.clone());
        (inner, faulty)
    }

    #[tokio::test]
    async fn passes_through_without_faults() {
        let (inner, faulty) = wrapped().await;
        let mut txn = faulty.begin().await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(inner.stats().commits, 1);
        assert_eq!(faulty.commit_attempts(), 1);
    }

    #[tokio::test]
    async fn scripted_commit_failures_are_consumed_in_order() {
        let (inner, faulty) = wrapped().await;
        faulty.conflict_next_commits(1);
        faulty.fail_next_commits(1, StoreError::Unavailable("link down".into()));

        let mut first = faulty.begin().await.unwrap();
        assert!(first.commit().await.unwrap_err().is_conflict());

        let mut second = faulty.begin().await.unwrap();
        assert_eq!(
            second.commit().await.unwrap_err(),
            StoreError::Unavailable("link down".into())
        );

        let mut third = faulty.begin().await.unwrap();
        third.commit().await.unwrap();

        assert_eq!(inner.stats().commits, 1);
        assert_eq!(inner.stats().rollbacks, 2);
    }

    #[tokio::test]
    async fn scripted_query_failure() {
        let (_inner, faulty) = wrapped().await;
        faulty.fail_next_queries(1, StoreError::Unavailable("timeout".into()));

        let mut txn = faulty.begin().await.unwrap();
        let err = txn.query(RecordFilter::Tail).await.err().unwrap();
        assert_eq!(err, StoreError::Unavailable("timeout".into()));
        assert!(txn.query(RecordFilter::Tail).await.is_ok());
    }

    #[tokio::test]
    async fn commit_latency_delays_commit() {
        let inner = Arc::new(InMemoryStore::new());
        inner.create_schema().await.unwrap();
        let faulty = FaultInjectingStore::new(inner).commit_latency(Duration::from_millis(30));

        let mut txn = faulty.begin().await.unwrap();
        let started = std::time::Instant::now();
        txn.commit().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
