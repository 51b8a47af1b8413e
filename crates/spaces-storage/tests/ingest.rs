//! Ingestor behaviour against the in-memory backend.

mod common;

use std::sync::Arc;

use serde_json::json;

use spaces_core::error::IndexerError;
use spaces_core::ingest::Ingestor;
use spaces_core::store::SpaceReader;
use spaces_core::types::{SpaceAction, SpaceStatus, Transaction};
use spaces_storage::InMemoryStorage;

use common::{bid, block, claim, labelled, rollout, transfer, FailingStore};

fn setup() -> (Arc<InMemoryStorage>, Ingestor) {
    let store = Arc::new(InMemoryStorage::new());
    let ingestor = Ingestor::new(store.clone());
    (store, ingestor)
}

#[tokio::test]
async fn empty_block_is_not_stored() {
    let (store, ingestor) = setup();
    let receipt = ingestor.process_block(&block(900_000), &[]).await.unwrap();

    assert!(receipt.is_none());
    assert_eq!(store.block_count().await.unwrap(), 0);
    assert!(store.block_at(900_000).await.is_none());
}

#[tokio::test]
async fn bid_on_new_name_creates_pre_auction_space() {
    let (store, ingestor) = setup();
    let receipt = ingestor
        .process_block(&block(900_000), &[bid("t1", "@fresh", 50_000)])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(receipt.spaces_created, 1);
    assert_eq!(receipt.history_rows, 1);
    assert_eq!(receipt.transitions, 0);

    let space = store.space("@fresh").await.unwrap().unwrap();
    assert_eq!(space.status, SpaceStatus::PreAuction);

    let history = store.history_for("@fresh").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, Some(SpaceAction::Bid));
    assert_eq!(history[0].bid_amount, Some(50_000));
    assert_eq!(history[0].txid, "t1");
    assert_eq!(space.last_history_id, Some(history[0].id));
}

#[tokio::test]
async fn full_lifecycle_across_blocks() {
    let (store, ingestor) = setup();
    ingestor
        .process_block(&block(1), &[rollout("t1", "@bitcoin", 1_000)])
        .await
        .unwrap();
    assert_eq!(
        store.space("@bitcoin").await.unwrap().unwrap().status,
        SpaceStatus::Auction
    );

    ingestor
        .process_block(&block(2), &[bid("t2", "@bitcoin", 7_500)])
        .await
        .unwrap();
    assert_eq!(
        store.space("@bitcoin").await.unwrap().unwrap().status,
        SpaceStatus::Auction
    );

    ingestor
        .process_block(&block(3), &[claim("t3", "@bitcoin")])
        .await
        .unwrap();
    assert_eq!(
        store.space("@bitcoin").await.unwrap().unwrap().status,
        SpaceStatus::Registered
    );

    ingestor
        .process_block(&block(4), &[transfer("t4", "@bitcoin")])
        .await
        .unwrap();
    ingestor
        .process_block(&block(5), &[labelled("t5", "@bitcoin", "revoke")])
        .await
        .unwrap();

    let space = store.space("@bitcoin").await.unwrap().unwrap();
    assert_eq!(space.status, SpaceStatus::Revoked);

    let actions: Vec<_> = store
        .history_for("@bitcoin")
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            Some(SpaceAction::Rollout),
            Some(SpaceAction::Bid),
            Some(SpaceAction::Register),
            Some(SpaceAction::Transfer),
            Some(SpaceAction::Revoke),
        ]
    );
    assert_eq!(store.stored_heights().await, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn register_after_bid_ignores_other_event_fields() {
    let (store, ingestor) = setup();
    ingestor
        .process_block(&block(10), &[bid("t1", "@name", 100)])
        .await
        .unwrap();

    let register = spaces_core::types::Transaction::from_json(serde_json::json!({
        "txid": "t2",
        "vmetaout": [{
            "action": "revoke",
            "target": {
                "name": "@name",
                "covenant": { "type": "transfer", "total_burned": 999 }
            }
        }]
    }))
    .unwrap();
    ingestor.process_block(&block(11), &[register]).await.unwrap();

    let history = store.history_for("@name").await.unwrap();
    assert_eq!(history[1].action, Some(SpaceAction::Register));
    assert_eq!(history[1].bid_amount, None);
    assert_eq!(
        store.space("@name").await.unwrap().unwrap().status,
        SpaceStatus::Registered
    );
}

#[tokio::test]
async fn unmatched_event_is_recorded_without_transition() {
    let (store, ingestor) = setup();
    ingestor
        .process_block(&block(10), &[rollout("t1", "@name", 1)])
        .await
        .unwrap();
    ingestor
        .process_block(&block(11), &[claim("t2", "@name")])
        .await
        .unwrap();

    let space = store.space("@name").await.unwrap().unwrap();
    let history = store.history_for("@name").await.unwrap();
    assert_eq!(space.status, SpaceStatus::Auction);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action, None);
    assert_eq!(history[1].payload["target"]["covenant"]["type"], "transfer");
    assert_eq!(space.last_history_id, Some(history[1].id));
}

#[tokio::test]
async fn transfer_of_unknown_space_aborts_block() {
    let (store, ingestor) = setup();
    let err = ingestor
        .process_block(
            &block(20),
            &[rollout("t1", "@known", 5), transfer("t2", "@ghost")],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IndexerError::UnknownSpace { ref name, ref txid } if name == "@ghost" && txid == "t2"
    ));
    assert!(err.is_consistency());
    assert_eq!(store.block_count().await.unwrap(), 0);
    assert_eq!(store.transaction_count().await.unwrap(), 0);
    assert!(store.space("@known").await.unwrap().is_none());
}

#[tokio::test]
async fn failure_after_nth_history_insert_leaves_store_untouched() {
    let memory = Arc::new(InMemoryStorage::new());
    let ingestor = Ingestor::new(memory.clone());
    ingestor
        .process_block(&block(1), &[rollout("t0", "@a", 10)])
        .await
        .unwrap();

    let before_space = memory.space("@a").await.unwrap().unwrap();
    let before_history = memory.history_count().await;

    for fail_on in 1..=3 {
        let failing = Ingestor::new(Arc::new(FailingStore::new(memory.clone(), fail_on)));
        let err = failing
            .process_block(
                &block(2),
                &[bid("t1", "@a", 20), claim("t2", "@a"), bid("t3", "@b", 30)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Storage(_)));

        assert_eq!(memory.stored_heights().await, vec![1]);
        assert_eq!(memory.transaction_count().await.unwrap(), 1);
        assert_eq!(memory.history_count().await, before_history);
        assert_eq!(memory.space("@a").await.unwrap().unwrap(), before_space);
        assert!(memory.space("@b").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn duplicate_block_is_rejected_atomically() {
    let (store, ingestor) = setup();
    ingestor
        .process_block(&block(30), &[rollout("t1", "@dup", 1)])
        .await
        .unwrap();

    let err = ingestor
        .process_block(&block(30), &[bid("t2", "@dup", 5)])
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::Storage(_)));
    assert_eq!(store.history_for("@dup").await.unwrap().len(), 1);
}

#[tokio::test]
async fn transactions_keep_their_block_order() {
    let (store, ingestor) = setup();
    let receipt = ingestor
        .process_block(
            &block(40),
            &[rollout("ta", "@x", 1), rollout("tb", "@y", 1), bid("tc", "@x", 2)],
        )
        .await
        .unwrap()
        .unwrap();

    let rows = store.transactions_in(receipt.block_id).await;
    let order: Vec<_> = rows.iter().map(|r| (r.position, r.txid.as_str())).collect();
    assert_eq!(order, vec![(0, "ta"), (1, "tb"), (2, "tc")]);
    assert_eq!(receipt.spaces_created, 2);
    assert_eq!(receipt.transitions, 2);
}

#[tokio::test]
async fn bid_then_register_in_one_block_registers() {
    let (store, ingestor) = setup();
    ingestor
        .process_block(&block(50), &[bid("t1", "@pair", 10), claim("t2", "@pair")])
        .await
        .unwrap();

    assert_eq!(
        store.space("@pair").await.unwrap().unwrap().status,
        SpaceStatus::Registered
    );
}

/// Reverse order within a block is unsupported: the register event arrives
/// before any bid, so it is recorded without effect and the space stays in
/// pre-auction. Pinned so the outcome stays deterministic.
#[tokio::test]
async fn register_before_bid_in_one_block_stays_pre_auction() {
    let (store, ingestor) = setup();
    ingestor
        .process_block(&block(50), &[claim("t2", "@pair"), bid("t1", "@pair", 10)])
        .await
        .unwrap();

    let space = store.space("@pair").await.unwrap().unwrap();
    assert_eq!(space.status, SpaceStatus::PreAuction);
    let actions: Vec<_> = store
        .history_for("@pair")
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.action)
        .collect();
    assert_eq!(actions, vec![None, Some(SpaceAction::Bid)]);
}

#[tokio::test]
async fn transfer_output_sees_space_created_earlier_in_block() {
    let (store, ingestor) = setup();
    let receipt = ingestor
        .process_block(
            &block(60),
            &[
                rollout("t1", "@new", 1_000),
                transfer("t2", "@new"),
                bid("t3", "@later", 5),
                claim("t4", "@later"),
                transfer("t5", "@later"),
            ],
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(receipt.spaces_created, 2);
    assert_eq!(receipt.history_rows, 5);

    let fresh = store.space("@new").await.unwrap().unwrap();
    assert_eq!(fresh.status, SpaceStatus::Auction);
    let history = store.history_for("@new").await.unwrap();
    let actions: Vec<_> = history.iter().map(|h| h.action.clone()).collect();
    assert_eq!(actions, vec![Some(SpaceAction::Rollout), Some(SpaceAction::Transfer)]);
    assert_eq!(fresh.last_history_id, Some(history[1].id));

    let registered = store.space("@later").await.unwrap().unwrap();
    assert_eq!(registered.status, SpaceStatus::Registered);
    let last = store.history_for("@later").await.unwrap().pop().unwrap();
    assert_eq!(last.action, Some(SpaceAction::Transfer));
    assert_eq!(last.txid, "t5");
}

#[tokio::test]
async fn string_bid_value_opens_auction_instead_of_failing() {
    let (store, ingestor) = setup();
    let tx = Transaction::from_json(json!({
        "txid": "t1",
        "vmetaout": [{
            "action": "rollout",
            "bid_value": "1000",
            "target": { "name": "@quoted", "covenant": { "type": "reserve" } }
        }]
    }))
    .unwrap();

    ingestor.process_block(&block(70), &[tx]).await.unwrap();

    let space = store.space("@quoted").await.unwrap().unwrap();
    assert_eq!(space.status, SpaceStatus::Auction);
    let history = store.history_for("@quoted").await.unwrap();
    assert_eq!(history[0].action, Some(SpaceAction::Rollout));
    assert_eq!(history[0].payload["bid_value"], json!("1000"));
}
