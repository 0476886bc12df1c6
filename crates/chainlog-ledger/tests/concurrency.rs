//! Concurrent appends against one ledger must serialize into a single chain.

use std::sync::Arc;
use std::time::Duration;

use chainlog_ledger::{LedgerConfig, LedgerService, ProvisioningService, RetryPolicy};
use chainlog_store::{FaultInjectingStore, InMemoryStore, RecordFilter, TransactionalStore};

async fn provisioned_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    ProvisioningService::new(store.clone())
        .provision()
        .await
        .unwrap();
    store
}

fn generous_config() -> LedgerConfig {
    LedgerConfig {
        append_deadline: Duration::from_secs(30),
        retry: RetryPolicy {
            max_attempts: 1_000,
            initial_backoff: Duration::from_micros(100),
            max_backoff: Duration::from_millis(5),
            jitter: true,
        },
        ..LedgerConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_form_one_chain() {
    let store = provisioned_store().await;
    let service = LedgerService::new(store.clone(), generous_config());

    for i in 0..3 {
        service.append_message(&format!("seed-{i}")).await.unwrap();
    }
    let before = service.len().await.unwrap();

    let writers = 16;
    let mut handles = Vec::new();
    for w in 0..writers {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.append(&format!("writer-{w}")).await
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap().unwrap().sequence);
    }
    sequences.sort_unstable();

    let expected: Vec<u64> = (before + 1..=before + writers).collect();
    assert_eq!(sequences, expected);
    assert_eq!(service.len().await.unwrap(), before + writers);

    let tails = store.single_read(RecordFilter::Tail).await.unwrap();
    assert_eq!(tails.len(), 1);
    assert_eq!(tails[0].sequence, before + writers);

    assert!(service.verify().await.unwrap().is_valid());
    assert_eq!(service.verify_strict().await.unwrap(), before + writers);
    assert_eq!(store.stats().open_cursors, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_identical_payloads_stay_distinct() {
    let store = provisioned_store().await;
    let service = LedgerService::new(store.clone(), generous_config());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.append("same").await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let report = service.verify().await.unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
    assert_eq!(report.record_count, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contention_with_tight_budget_never_forks() {
    let store = provisioned_store().await;
    let service = LedgerService::new(
        store.clone(),
        LedgerConfig {
            retry: RetryPolicy::immediate(2),
            ..LedgerConfig::default()
        },
    );

    let mut handles = Vec::new();
    for w in 0..12 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.append_message(&format!("w{w}")).await
        }));
    }

    let mut succeeded = 0u64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(err.source.is_retryable_by_caller(), "{err}"),
        }
    }

    assert_eq!(service.len().await.unwrap(), 1 + succeeded);
    assert!(service.verify().await.unwrap().is_valid());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_store_still_serializes() {
    let inner = provisioned_store().await;
    let slow = Arc::new(
        FaultInjectingStore::new(inner.clone())
            .query_latency(Duration::from_millis(2))
            .commit_latency(Duration::from_millis(3)),
    );
    let service = LedgerService::new(slow, generous_config());

    let mut handles = Vec::new();
    for w in 0..6 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.append_message(&format!("slow-{w}")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = inner.single_read(RecordFilter::All).await.unwrap();
    assert_eq!(all.len(), 7);
    assert_eq!(all.iter().filter(|r| r.is_tail()).count(), 1);
}
