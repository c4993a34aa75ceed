use std::collections::BTreeSet;

use ledger_tests::Scenario;
use zen_primitives::{
    transaction::{OutPoint, TransactionBase},
    uint::Uint256,
    COIN,
};
use zen_wallet::{
    ledger::item::{LedgerItem, SpendKey},
    testutils::{coinbase_paying, nullifier_spend, shielded_payment, spend_of, OURS, THEIRS},
    traits::IsMineFilter,
};

#[tokio::test]
async fn unconfirmed_double_spend_marks_both_dirty_and_conflicts_the_second() {
    let scenario = Scenario::new();
    let funding = coinbase_paying(OURS, 50 * COIN, 1);
    scenario.connect(vec![funding.clone()], Vec::new()).await;
    scenario.mine(100).await;

    let prevout = OutPoint::new(*funding.hash(), 0);
    let first = spend_of(prevout, OURS, 10 * COIN);
    let second = spend_of(prevout, THEIRS, 20 * COIN);
    scenario.wallet.sync_transaction(&first, None).await.unwrap();
    {
        let ledger = scenario.wallet.ledger().read().await;
        ledger.debit(first.hash(), IsMineFilter::ALL).unwrap();
        assert!(!ledger.get(first.hash()).unwrap().cache().is_empty());
    }
    scenario.wallet.sync_transaction(&second, None).await.unwrap();

    let ledger = scenario.wallet.ledger().read().await;
    assert!(ledger.get(first.hash()).unwrap().cache().is_empty());
    assert!(ledger.get(second.hash()).unwrap().cache().is_empty());
    assert_eq!(ledger.active_spender(&SpendKey::Prevout(prevout)), Some(*first.hash()));
    assert_eq!(ledger.depth(first.hash()), Some(0));
    assert_eq!(ledger.depth(second.hash()), Some(-1));
    assert_eq!(ledger.conflicts(second.hash()), BTreeSet::from([*first.hash()]));
}

#[tokio::test]
async fn mining_the_second_spender_flips_the_conflict() {
    let scenario = Scenario::new();
    let funding = coinbase_paying(OURS, 50 * COIN, 1);
    scenario.connect(vec![funding.clone()], Vec::new()).await;
    scenario.mine(100).await;

    let prevout = OutPoint::new(*funding.hash(), 0);
    let first = spend_of(prevout, OURS, 10 * COIN);
    let second = spend_of(prevout, OURS, 20 * COIN);
    scenario.wallet.sync_transaction(&first, None).await.unwrap();
    scenario.wallet.sync_transaction(&second, None).await.unwrap();
    assert_eq!(scenario.wallet.unconfirmed_balance().await.unwrap(), 0);

    scenario.connect(vec![second.clone()], Vec::new()).await;
    {
        let ledger = scenario.wallet.ledger().read().await;
        assert_eq!(ledger.depth(second.hash()), Some(1));
        assert_eq!(ledger.depth(first.hash()), Some(-1));
        assert!(ledger.is_spent(&prevout));
    }
    assert_eq!(scenario.wallet.balance().await.unwrap(), 20 * COIN);

    scenario.disconnect().await;
    let ledger = scenario.wallet.ledger().read().await;
    assert_eq!(ledger.depth(first.hash()), Some(0));
    assert_eq!(ledger.depth(second.hash()), Some(-1));
}

#[tokio::test]
async fn revealing_our_nullifier_spends_the_note() {
    let scenario = Scenario::new();
    let (payment, nullifier) = shielded_payment(&scenario.keys, Uint256([0x21; 32]), 4 * COIN);
    scenario.connect(vec![payment.clone()], Vec::new()).await;
    assert_eq!(scenario.wallet.filtered_notes(None, 1, true, false).await.len(), 1);

    let spend = nullifier_spend(nullifier, THEIRS, 4 * COIN);
    scenario.connect(vec![spend.clone()], Vec::new()).await;

    let ledger = scenario.wallet.ledger().read().await;
    assert!(ledger.get(spend.hash()).is_some());
    assert!(ledger.is_nullifier_spent(&nullifier));
    drop(ledger);
    assert!(scenario.wallet.filtered_notes(None, 1, true, false).await.is_empty());
    assert_eq!(scenario.wallet.filtered_notes(None, 1, false, false).await.len(), 1);
}
