//! Chain invariants over arbitrary append sequences.

use std::sync::Arc;

use chainlog_crypto::RecordHasher;
use chainlog_ledger::{LedgerConfig, LedgerService, ProvisioningService};
use chainlog_store::{InMemoryStore, RecordFilter, TransactionalStore};
use chainlog_types::Record;
use proptest::prelude::*;

fn append_all(payloads: &[String]) -> Vec<Record> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let store = Arc::new(InMemoryStore::new());
        ProvisioningService::new(store.clone())
            .provision()
            .await
            .unwrap();
        let service = LedgerService::new(store.clone(), LedgerConfig::default());
        for (i, payload) in payloads.iter().enumerate() {
            let sequence = service.append_message(payload).await.unwrap();
            assert_eq!(sequence, i as u64 + 2);

            let tails = store.single_read(RecordFilter::Tail).await.unwrap();
            assert_eq!(tails.len(), 1);
        }
        store.single_read(RecordFilter::All).await.unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sequence_is_contiguous(payloads in prop::collection::vec(".{0,40}", 0..24)) {
        let chain = append_all(&payloads);
        prop_assert_eq!(chain.len(), payloads.len() + 1);
        for (index, record) in chain.iter().enumerate() {
            prop_assert_eq!(record.sequence, index as u64 + 1);
        }
    }

    #[test]
    fn every_link_is_mutual(payloads in prop::collection::vec("[a-z ]{0,16}", 1..24)) {
        let chain = append_all(&payloads);
        for pair in chain.windows(2) {
            prop_assert_eq!(pair[1].backward_link, Some(pair[0].self_hash));
            prop_assert_eq!(pair[0].forward_link, Some(pair[1].self_hash));
        }
        prop_assert!(chain[0].is_genesis());
        prop_assert_eq!(chain.iter().filter(|r| r.is_tail()).count(), 1);
    }

    #[test]
    fn stored_hashes_recompute(payloads in prop::collection::vec(any::<String>(), 0..16)) {
        let payloads: Vec<String> = payloads
            .into_iter()
            .map(|p| p.chars().take(1024).collect())
            .collect();
        let chain = append_all(&payloads);
        for record in &chain {
            prop_assert!(RecordHasher::RECORD.verify(record));
        }
    }
}
