use std::{
    sync::{atomic::AtomicBool, Arc},
    time::{Duration, Instant},
};

use ledger_tests::Scenario;
use zen_primitives::{transaction::TransactionBase, uint::Uint256, COIN};
use zen_wallet::{
    testutils::{coinbase_paying, first_note, shielded_payment, BLOCK_INTERVAL, GENESIS_TIME, OURS},
    traits::ChainView,
};

#[tokio::test]
async fn rescan_finds_history_and_builds_witnesses() {
    let scenario = Scenario::new();
    let coinbase = coinbase_paying(OURS, 50 * COIN, 1);
    scenario.chain.push_block(vec![coinbase.clone()], Vec::new());
    scenario.chain.extend(4);
    let (payment, _) = shielded_payment(&scenario.keys, Uint256([0x51; 32]), COIN);
    scenario.chain.push_block(vec![payment.clone()], Vec::new());
    scenario.chain.extend(2);

    let summary = scenario
        .wallet
        .rescan(scenario.chain.as_ref(), 0, true, None, &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(summary.added, vec![*coinbase.hash(), *payment.hash()]);
    assert_eq!(summary.last_height, Some(scenario.chain.tip_height()));
    assert!(!summary.interrupted);
    let (witnesses, anchor) = scenario.wallet.note_witnesses(&[first_note(&payment)]).await;
    assert!(witnesses[0].is_some());
    assert_eq!(anchor, Some(Uint256::from(scenario.tip_tree().root())));
    assert_eq!(scenario.wallet.immature_balance().await.unwrap(), 50 * COIN);
}

#[tokio::test]
async fn elapsed_deadline_stops_before_the_first_block() {
    let scenario = Scenario::new();
    scenario
        .chain
        .push_block(vec![coinbase_paying(OURS, 50 * COIN, 1)], Vec::new());
    let deadline = Instant::now() - Duration::from_secs(1);

    let summary = scenario
        .wallet
        .rescan(scenario.chain.as_ref(), 0, true, Some(deadline), &AtomicBool::new(false))
        .await
        .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.last_height, None);
    assert!(scenario.wallet.ledger().read().await.is_empty());
}

#[tokio::test]
async fn blocks_well_before_the_first_key_are_skipped() {
    let scenario = Scenario::new();
    let early = coinbase_paying(OURS, 50 * COIN, 1);
    scenario.chain.push_block(vec![early.clone()], Vec::new());
    scenario.chain.extend(59);
    let late = coinbase_paying(OURS, 50 * COIN, 2);
    scenario.chain.push_block(vec![late.clone()], Vec::new());
    // Keys born at height 50; 7200 seconds of slack reach back 48 blocks.
    scenario.keys.set_first_key_time(Some(GENESIS_TIME + 50 * BLOCK_INTERVAL));

    let summary = scenario
        .wallet
        .rescan(scenario.chain.as_ref(), 0, true, None, &AtomicBool::new(false))
        .await
        .unwrap();
    assert_eq!(summary.added, vec![*late.hash()]);
    assert_eq!(summary.last_height, Some(60));
}

#[tokio::test]
async fn shutdown_flag_is_shared_across_tasks() {
    let scenario = Scenario::new();
    scenario.chain.extend(10);
    let shutdown = Arc::new(AtomicBool::new(false));
    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);

    let wallet = scenario.wallet.clone();
    let chain = scenario.chain.clone();
    let flag = shutdown.clone();
    let summary = tokio::spawn(async move { wallet.rescan(chain.as_ref(), 0, true, None, &flag).await })
        .await
        .unwrap()
        .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.last_height, None);
}
