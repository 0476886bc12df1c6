use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chainlog_types::{Record, RecordRow};
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    CommitTimestamp, Mutation, ReadWriteTransaction, RecordFilter, RowCursor, TransactionalStore,
};

/// In-memory record table with optimistic concurrency control.
///
/// Rows are kept in their persisted [`RecordRow`] layout, each stamped with
/// the commit timestamp of its last write. A transaction remembers its
/// snapshot timestamp, the keys it read, and the filters it scanned. The
/// snapshot starts at `begin` and is re-pinned by the first query, so
/// commits landing before a transaction's first read never count against
/// it. Reads always see the latest committed rows. Commit validates and
/// applies under a single write-lock acquisition: if any read key or
/// written key, or any row matching a scanned filter, was committed after
/// the snapshot, the commit aborts with [`StoreError::Conflict`].
///
/// Clones share the same table.
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: RwLock<TableState>,
    next_txn_id: AtomicU64,
    open_cursors: AtomicUsize,
    commits: AtomicU64,
    aborts: AtomicU64,
    rollbacks: AtomicU64,
}

#[derive(Default)]
struct TableState {
    schema: bool,
    clock: u64,
    rows: BTreeMap<i64, StoredRow>,
}

struct StoredRow {
    row: RecordRow,
    committed_at: u64,
}

/// Counters exposed for tests and diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub rows: usize,
    pub commits: u64,
    pub aborts: u64,
    pub rollbacks: u64,
    pub open_cursors: usize,
}

impl InMemoryStore {
    /// Create a store without a record table.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(TableState::default()),
                next_txn_id: AtomicU64::new(1),
                open_cursors: AtomicUsize::new(0),
                commits: AtomicU64::new(0),
                aborts: AtomicU64::new(0),
                rollbacks: AtomicU64::new(0),
            }),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> StoreStats {
        let rows = self.shared.read().map(|s| s.rows.len()).unwrap_or(0);
        StoreStats {
            rows,
            commits: self.shared.commits.load(Ordering::SeqCst),
            aborts: self.shared.aborts.load(Ordering::SeqCst),
            rollbacks: self.shared.rollbacks.load(Ordering::SeqCst),
            open_cursors: self.shared.open_cursors.load(Ordering::SeqCst),
        }
    }

    /// Write a record directly, bypassing transactions and validation.
    ///
    /// Simulates out-of-band writes (tampering, forks) in tests.
    pub fn force_upsert(&self, record: &Record) -> StoreResult<()> {
        let mut state = self.shared.write()?;
        state.clock += 1;
        let committed_at = state.clock;
        let row = to_row(record)?;
        state.rows.insert(row.key(), StoredRow { row, committed_at });
        Ok(())
    }

    /// Edit a stored row in place, bypassing transactions and validation.
    ///
    /// Returns `false` if no row exists at `sequence`.
    pub fn corrupt_row(
        &self,
        sequence: u64,
        edit: impl FnOnce(&mut RecordRow),
    ) -> StoreResult<bool> {
        let Ok(key) = i64::try_from(sequence) else {
            return Ok(false);
        };
        let mut state = self.shared.write()?;
        state.clock += 1;
        let clock = state.clock;
        match state.rows.get_mut(&key) {
            Some(stored) => {
                edit(&mut stored.row);
                stored.committed_at = clock;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("InMemoryStore")
            .field("rows", &stats.rows)
            .field("commits", &stats.commits)
            .finish()
    }
}

impl Shared {
    fn read(&self) -> StoreResult<RwLockReadGuard<'_, TableState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Internal("table read lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, TableState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Internal("table write lock poisoned".into()))
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn ReadWriteTransaction>> {
        let snapshot_ts = self.shared.read()?.clock;
        let id = self.shared.next_txn_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(txn = id, snapshot_ts, "transaction started");
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            id,
            snapshot_ts,
            snapshot_pinned: false,
            read_keys: BTreeSet::new(),
            scans: Vec::new(),
            mutations: BTreeMap::new(),
            status: TxnStatus::Open,
        }))
    }

    async fn single_read(&self, filter: RecordFilter) -> StoreResult<Vec<Record>> {
        let state = self.shared.read()?;
        if !state.schema {
            return Err(StoreError::SchemaNotFound);
        }
        state
            .rows
            .values()
            .filter(|stored| filter.matches_row(&stored.row))
            .map(|stored| decode(stored.row.clone()))
            .collect()
    }

    async fn create_schema(&self) -> StoreResult<()> {
        let mut state = self.shared.write()?;
        if state.schema {
            return Err(StoreError::SchemaAlreadyExists);
        }
        state.schema = true;
        tracing::info!("record table created");
        Ok(())
    }

    async fn schema_exists(&self) -> StoreResult<bool> {
        Ok(self.shared.read()?.schema)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxnStatus {
    Open,
    Committed,
    Aborted,
    RolledBack,
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    id: u64,
    snapshot_ts: u64,
    snapshot_pinned: bool,
    read_keys: BTreeSet<i64>,
    scans: Vec<RecordFilter>,
    mutations: BTreeMap<i64, RecordRow>,
    status: TxnStatus,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.status == TxnStatus::Open {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed)
        }
    }

    /// First key whose committed state invalidates this transaction.
    fn find_conflict(&self, state: &TableState) -> Option<i64> {
        let newer = |key: &i64| {
            state
                .rows
                .get(key)
                .is_some_and(|stored| stored.committed_at > self.snapshot_ts)
        };

        if let Some(key) = self.read_keys.iter().find(|k| newer(*k)) {
            return Some(*key);
        }
        if let Some(key) = self.mutations.keys().find(|k| newer(*k)) {
            return Some(*key);
        }

        state
            .rows
            .values()
            .filter(|stored| stored.committed_at > self.snapshot_ts)
            .find(|stored| self.scans.iter().any(|f| f.matches_row(&stored.row)))
            .map(|stored| stored.row.key())
    }
}

#[async_trait]
impl ReadWriteTransaction for MemoryTransaction {
    fn id(&self) -> u64 {
        self.id
    }

    async fn query(&mut self, filter: RecordFilter) -> StoreResult<Box<dyn RowCursor>> {
        self.ensure_open()?;

        let rows: VecDeque<RecordRow> = {
            let state = self.shared.read()?;
            if !state.schema {
                return Err(StoreError::SchemaNotFound);
            }
            if !self.snapshot_pinned {
                self.snapshot_ts = state.clock;
                self.snapshot_pinned = true;
            }
            state
                .rows
                .values()
                .filter(|stored| filter.matches_row(&stored.row))
                .map(|stored| stored.row.clone())
                .collect()
        };

        self.read_keys.extend(rows.iter().map(RecordRow::key));
        self.scans.push(filter);
        self.shared.open_cursors.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryCursor {
            shared: Arc::clone(&self.shared),
            rows,
            open: true,
        }))
    }

    fn buffer_mutation(&mut self, mutation: Mutation) -> StoreResult<()> {
        self.ensure_open()?;
        match mutation {
            Mutation::Upsert(record) => {
                let row = to_row(&record)?;
                self.mutations.insert(row.key(), row);
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<CommitTimestamp> {
        self.ensure_open()?;

        let mut state = self.shared.write()?;
        if !state.schema {
            self.status = TxnStatus::Aborted;
            return Err(StoreError::SchemaNotFound);
        }

        if let Some(key) = self.find_conflict(&state) {
            self.status = TxnStatus::Aborted;
            self.shared.aborts.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(txn = self.id, sequence = key, "commit aborted by conflict");
            return Err(StoreError::Conflict {
                sequence: key.unsigned_abs(),
            });
        }

        if !self.mutations.is_empty() {
            state.clock += 1;
        }
        let committed_at = state.clock;
        for (key, row) in std::mem::take(&mut self.mutations) {
            state.rows.insert(key, StoredRow { row, committed_at });
        }

        self.status = TxnStatus::Committed;
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(txn = self.id, committed_at, "transaction committed");
        Ok(CommitTimestamp(committed_at))
    }

    fn rollback(&mut self) {
        if self.status == TxnStatus::Open {
            self.mutations.clear();
            self.status = TxnStatus::RolledBack;
            self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(txn = self.id, "transaction rolled back");
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.rollback();
    }
}

struct MemoryCursor {
    shared: Arc<Shared>,
    rows: VecDeque<RecordRow>,
    open: bool,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next(&mut self) -> StoreResult<Option<Record>> {
        if !self.open {
            return Ok(None);
        }
        match self.rows.pop_front() {
            Some(row) => decode(row).map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.rows.clear();
            self.shared.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_row(record: &Record) -> StoreResult<RecordRow> {
    RecordRow::try_from(record).map_err(|_| StoreError::SequenceOutOfRange {
        sequence: record.sequence,
    })
}

fn decode(row: RecordRow) -> StoreResult<Record> {
    let sequence = row.sequence;
    Record::try_from(row).map_err(|e| StoreError::CorruptRow {
        sequence,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chainlog_crypto::RecordHasher;
    use chainlog_types::RecordHash;

    use super::*;

    fn record(sequence: u64, prev: Option<RecordHash>, payload: &str) -> Record {
        Record {
            sequence,
            payload: payload.into(),
            self_hash: RecordHasher::RECORD.record_hash(sequence, prev.as_ref(), payload),
            backward_link: prev,
            forward_link: None,
        }
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_schema().await.unwrap();
        store.force_upsert(&record(1, None, "Block 0")).unwrap();
        store
    }

    async fn drain(cursor: &mut Box<dyn RowCursor>) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(r) = cursor.next().await.unwrap() {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn query_without_schema_fails() {
        let store = InMemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        let err = txn.query(RecordFilter::Tail).await.err().unwrap();
        assert_eq!(err, StoreError::SchemaNotFound);
    }

    #[tokio::test]
    async fn create_schema_twice_fails() {
        let store = InMemoryStore::new();
        store.create_schema().await.unwrap();
        assert!(store.schema_exists().await.unwrap());
        assert_eq!(
            store.create_schema().await.unwrap_err(),
            StoreError::SchemaAlreadyExists
        );
    }

    #[tokio::test]
    async fn buffered_mutations_are_invisible_until_commit() {
        let store = seeded_store().await;
        let genesis = store.single_read(RecordFilter::Sequence(1)).await.unwrap()[0].clone();

        let mut txn = store.begin().await.unwrap();
        let next = record(2, Some(genesis.self_hash), "hello");
        txn.buffer_mutation(Mutation::Upsert(next.clone())).unwrap();

        assert_eq!(store.single_read(RecordFilter::All).await.unwrap().len(), 1);

        txn.commit().await.unwrap();
        let rows = store.single_read(RecordFilter::All).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], next);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = seeded_store().await;
        {
            let mut txn = store.begin().await.unwrap();
            txn.buffer_mutation(Mutation::Upsert(record(2, None, "lost")))
                .unwrap();
        }
        assert_eq!(store.single_read(RecordFilter::All).await.unwrap().len(), 1);
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn concurrent_writers_on_same_tail_conflict() {
        let store = seeded_store().await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let mut c1 = first.query(RecordFilter::Tail).await.unwrap();
        let tail1 = drain(&mut c1).await;
        let mut c2 = second.query(RecordFilter::Tail).await.unwrap();
        let tail2 = drain(&mut c2).await;
        assert_eq!(tail1, tail2);

        let a = record(2, Some(tail1[0].self_hash), "a");
        first
            .buffer_mutation(Mutation::Upsert(tail1[0].sealed(a.self_hash)))
            .unwrap();
        first.buffer_mutation(Mutation::Upsert(a)).unwrap();

        let b = record(2, Some(tail2[0].self_hash), "b");
        second
            .buffer_mutation(Mutation::Upsert(tail2[0].sealed(b.self_hash)))
            .unwrap();
        second.buffer_mutation(Mutation::Upsert(b)).unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());

        let tails = store.single_read(RecordFilter::Tail).await.unwrap();
        assert_eq!(tails.len(), 1);
        assert_eq!(tails[0].payload, "a");
        assert_eq!(store.stats().aborts, 1);
    }

    #[tokio::test]
    async fn new_tail_row_is_a_phantom_for_tail_scans() {
        let store = seeded_store().await;
        let mut txn = store.begin().await.unwrap();
        let mut cursor = txn.query(RecordFilter::Tail).await.unwrap();
        drain(&mut cursor).await;

        // Out-of-band insert of a second tail after the scan.
        store.force_upsert(&record(9, None, "phantom")).unwrap();

        assert_eq!(
            txn.commit().await.unwrap_err(),
            StoreError::Conflict { sequence: 9 }
        );
    }

    #[tokio::test]
    async fn commits_before_first_read_do_not_conflict() {
        let store = seeded_store().await;
        let genesis = store.single_read(RecordFilter::Sequence(1)).await.unwrap()[0].clone();

        let mut txn = store.begin().await.unwrap();

        let a = record(2, Some(genesis.self_hash), "a");
        let mut other = store.begin().await.unwrap();
        other
            .buffer_mutation(Mutation::Upsert(genesis.sealed(a.self_hash)))
            .unwrap();
        other.buffer_mutation(Mutation::Upsert(a)).unwrap();
        other.commit().await.unwrap();

        let mut cursor = txn.query(RecordFilter::Tail).await.unwrap();
        let tail = drain(&mut cursor).await;
        assert_eq!(tail[0].sequence, 2);

        let b = record(3, Some(tail[0].self_hash), "b");
        txn.buffer_mutation(Mutation::Upsert(tail[0].sealed(b.self_hash)))
            .unwrap();
        txn.buffer_mutation(Mutation::Upsert(b)).unwrap();
        txn.commit().await.unwrap();

        assert_eq!(store.stats().aborts, 0);
        assert_eq!(store.single_read(RecordFilter::Tail).await.unwrap()[0].sequence, 3);
    }

    #[tokio::test]
    async fn unstorable_sequence_is_rejected() {
        let store = seeded_store().await;
        let too_far = record(u64::MAX, None, "x");

        let mut txn = store.begin().await.unwrap();
        assert_eq!(
            txn.buffer_mutation(Mutation::Upsert(too_far.clone()))
                .unwrap_err(),
            StoreError::SequenceOutOfRange { sequence: u64::MAX }
        );
        assert_eq!(
            store.force_upsert(&too_far).unwrap_err(),
            StoreError::SequenceOutOfRange { sequence: u64::MAX }
        );
        assert!(!store.corrupt_row(u64::MAX, |_| {}).unwrap());
        assert_eq!(store.stats().rows, 1);
    }

    #[tokio::test]
    async fn committed_transaction_is_closed() {
        let store = seeded_store().await;
        let mut txn = store.begin().await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(
            txn.buffer_mutation(Mutation::Upsert(record(2, None, "x")))
                .unwrap_err(),
            StoreError::TransactionClosed
        );
        assert_eq!(txn.commit().await.unwrap_err(), StoreError::TransactionClosed);
    }

    #[tokio::test]
    async fn cursors_are_released_on_drop_and_close() {
        let store = seeded_store().await;
        let mut txn = store.begin().await.unwrap();

        let cursor = txn.query(RecordFilter::All).await.unwrap();
        assert_eq!(store.stats().open_cursors, 1);
        drop(cursor);
        assert_eq!(store.stats().open_cursors, 0);

        let mut cursor = txn.query(RecordFilter::All).await.unwrap();
        cursor.close();
        assert_eq!(store.stats().open_cursors, 0);
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_row_surfaces_on_read() {
        let store = seeded_store().await;
        assert!(store
            .corrupt_row(1, |row| row.self_hash = "garbage".into())
            .unwrap());

        let err = store.single_read(RecordFilter::All).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { sequence: 1, .. }));
    }

    #[tokio::test]
    async fn range_read_is_ordered() {
        let store = seeded_store().await;
        let mut prev = store.single_read(RecordFilter::Sequence(1)).await.unwrap()[0].self_hash;
        for seq in 2..=5 {
            let r = record(seq, Some(prev), "m");
            prev = r.self_hash;
            store.force_upsert(&r).unwrap();
        }
        let rows = store
            .single_read(RecordFilter::Range { from: 2, to: 4 })
            .await
            .unwrap();
        let seqs: Vec<u64> = rows.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }
}
