use ledger_tests::{witness_bytes, Scenario};
use proptest::prelude::*;
use zen_primitives::{
    transaction::TransactionBase,
    tree::{witness_position, CommitmentTree},
    uint::Uint256,
    COIN,
};
use zen_wallet::{
    ledger::item::LedgerItem,
    note::JsOutPoint,
    store::MemoryWalletStore,
    testutils::{first_note, shielded_payment, FakeKeys},
};
use zenconfig::{WalletConfig, WalletConfigBuilder};

const SHORT_CACHE: usize = 10;

fn short_cache_config() -> WalletConfig {
    WalletConfigBuilder::default()
        .set_coinbase_maturity(SHORT_CACHE as u32)
        .create()
}

#[tokio::test]
async fn connect_then_disconnect_restores_witnesses() {
    let scenario = Scenario::new();
    let (payment, _) = shielded_payment(&scenario.keys, Uint256([0x31; 32]), 2 * COIN);
    scenario.connect(vec![payment.clone()], Vec::new()).await;
    scenario.mine(3).await;
    let jsop = first_note(&payment);

    let (before, anchor_before) = scenario.wallet.note_witnesses(&[jsop]).await;
    let size_before = scenario.wallet.ledger().read().await.witness_cache_size();
    assert_eq!(anchor_before, Some(Uint256::from(scenario.tip_tree().root())));

    let (other, _) = shielded_payment(&scenario.keys, Uint256([0x32; 32]), COIN);
    scenario.connect(vec![other], Vec::new()).await;
    let (advanced, anchor_advanced) = scenario.wallet.note_witnesses(&[jsop]).await;
    assert_ne!(witness_bytes(&advanced), witness_bytes(&before));
    assert_eq!(anchor_advanced, Some(Uint256::from(scenario.tip_tree().root())));

    scenario.disconnect().await;
    let (after, anchor_after) = scenario.wallet.note_witnesses(&[jsop]).await;
    assert_eq!(witness_bytes(&after), witness_bytes(&before));
    assert_eq!(anchor_after, anchor_before);
    assert_eq!(scenario.wallet.ledger().read().await.witness_cache_size(), size_before);
}

#[tokio::test]
async fn cache_is_bounded_by_coinbase_maturity() {
    let scenario = Scenario::new();
    let (payment, _) = shielded_payment(&scenario.keys, Uint256([0x33; 32]), COIN);
    scenario.connect(vec![payment.clone()], Vec::new()).await;
    scenario.mine(120).await;

    let ledger = scenario.wallet.ledger().read().await;
    assert_eq!(ledger.witness_cache_size(), 100);
    let notes = ledger.get(payment.hash()).unwrap().note_data().unwrap();
    let nd = &notes[&first_note(&payment)];
    assert_eq!(nd.witnesses.len(), 100);
    assert_eq!(nd.witness_height, scenario.chain.tip_index().height);
}

#[tokio::test]
async fn notes_mined_in_different_blocks_share_the_tip_anchor() {
    let scenario = Scenario::new();
    let (a, _) = shielded_payment(&scenario.keys, Uint256([0x34; 32]), COIN);
    scenario.connect(vec![a.clone()], Vec::new()).await;
    let (b, _) = shielded_payment(&scenario.keys, Uint256([0x35; 32]), COIN);
    scenario.connect(vec![b.clone()], Vec::new()).await;

    let unknown = JsOutPoint::new(Uint256([0x99; 32]), 0, 0);
    let (witnesses, anchor) = scenario
        .wallet
        .note_witnesses(&[first_note(&a), first_note(&b), unknown])
        .await;
    assert!(witnesses[0].is_some() && witnesses[1].is_some());
    assert!(witnesses[2].is_none());
    assert_eq!(anchor, Some(Uint256::from(scenario.tip_tree().root())));
    assert_eq!(witness_position(witnesses[0].as_ref().unwrap()), 0);
    assert_eq!(witness_position(witnesses[1].as_ref().unwrap()), 2);
}

#[derive(Debug)]
struct WitnessState {
    front: Vec<Option<Vec<u8>>>,
    anchor: Option<Uint256>,
    history: usize,
    cache_size: u64,
    tip_tree: CommitmentTree,
}

async fn witness_state(scenario: &Scenario, jsop: JsOutPoint) -> WitnessState {
    let (front, anchor) = scenario.wallet.note_witnesses(&[jsop]).await;
    let ledger = scenario.wallet.ledger().read().await;
    let history = ledger
        .get(&jsop.hash)
        .and_then(|entry| entry.note_data())
        .map_or(0, |notes| notes[&jsop].witnesses.len());
    WitnessState {
        front: witness_bytes(&front),
        anchor,
        history,
        cache_size: ledger.witness_cache_size(),
        tip_tree: scenario.tip_tree(),
    }
}

/// Finds a note, mines `settle` empty blocks, then connects and disconnects `depth` blocks of foreign
/// commitments. Returns the state before and after the round trip.
async fn connect_and_unwind(settle: usize, depth: usize) -> (WitnessState, WitnessState) {
    let scenario = Scenario::with(short_cache_config(), Box::new(MemoryWalletStore::new()));
    let (payment, _) = shielded_payment(&scenario.keys, Uint256([0x41; 32]), COIN);
    scenario.connect(vec![payment.clone()], Vec::new()).await;
    scenario.mine(settle).await;
    let jsop = first_note(&payment);
    let before = witness_state(&scenario, jsop).await;

    let strangers = FakeKeys::new();
    for i in 0..depth {
        let mut seed = [0x50; 32];
        seed[0] += i as u8;
        let (foreign, _) = shielded_payment(&strangers, Uint256(seed), COIN);
        scenario.connect(vec![foreign], Vec::new()).await;
    }
    let advanced = witness_state(&scenario, jsop).await;
    assert_ne!(advanced.tip_tree, before.tip_tree);

    for _ in 0..depth {
        scenario.disconnect().await;
    }
    (before, witness_state(&scenario, jsop).await)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]
    #[test]
    fn unwinding_what_was_connected_restores_the_cache(
        settle in 0..=SHORT_CACHE + 2,
        depth in 1..=SHORT_CACHE,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (before, after) = runtime.block_on(connect_and_unwind(settle, depth));

        prop_assert_eq!(&after.tip_tree, &before.tip_tree);
        // History that had to be trimmed at the back to make room is not recovered.
        let kept = (before.history + depth).min(SHORT_CACHE) - depth;
        prop_assert_eq!(after.history, kept);
        prop_assert_eq!(after.cache_size as usize, (before.cache_size as usize + depth).min(SHORT_CACHE) - depth);
        if kept > 0 {
            prop_assert_eq!(&after.front, &before.front);
            prop_assert_eq!(after.anchor, before.anchor);
            prop_assert_eq!(after.anchor, Some(Uint256::from(after.tip_tree.root())));
        } else {
            prop_assert_eq!(&after.front, &vec![None]);
            prop_assert_eq!(after.anchor, None);
        }
    }
}
