//! Records pass the context-free checks before the wallet sees them, the way a node feeds its wallet.

use ledger_tests::Scenario;
use zen_primitives::{
    certificate::MutableScCertificate,
    proof::{GrothPublicInputs, JoinSplitVerifier},
    transaction::{
        joinsplit::{GrothProof, JoinSplitDescription, PhgrProof},
        BackwardTransferOut, Transaction, TransactionBase,
    },
    uint::{Uint160, Uint256},
    validation::{check_certificate, check_transaction, RejectCode, ValidationState},
    COIN, MAX_MONEY,
};
use zen_wallet::testutils::{coinbase_paying, shielded_payment, OURS};

struct Verdict(bool);

impl JoinSplitVerifier for Verdict {
    fn verify_phgr(&self, _proof: &PhgrProof, _js: &JoinSplitDescription, _join_split_pub_key: &Uint256) -> bool {
        self.0
    }

    fn verify_groth(&self, _proof: &GrothProof, _inputs: &GrothPublicInputs) -> bool {
        self.0
    }
}

async fn accept_if_valid(scenario: &Scenario, tx: &Transaction, verifier: &Verdict) -> ValidationState {
    let mut state = ValidationState::new();
    if check_transaction(tx, &mut state, verifier) {
        scenario.wallet.sync_transaction(tx, None).await.unwrap();
    }
    state
}

#[tokio::test]
async fn verified_shielded_payment_reaches_the_wallet() {
    let scenario = Scenario::new();
    let (payment, _) = shielded_payment(&scenario.keys, Uint256([0x61; 32]), 3 * COIN);

    let state = accept_if_valid(&scenario, &payment, &Verdict(true)).await;
    assert!(state.is_valid());
    assert_eq!(scenario.wallet.filtered_notes(None, 0, true, false).await.len(), 1);
}

#[tokio::test]
async fn failed_proof_keeps_the_record_out() {
    let scenario = Scenario::new();
    let (payment, _) = shielded_payment(&scenario.keys, Uint256([0x62; 32]), 3 * COIN);

    let state = accept_if_valid(&scenario, &payment, &Verdict(false)).await;
    assert!(state.is_invalid());
    assert_eq!(state.dos_score(), 100);
    assert_eq!(state.reject_code(), Some(RejectCode::Invalid));
    assert_eq!(state.reject_reason(), "bad-txns-joinsplit-verification-failed");
    assert!(scenario.wallet.ledger().read().await.get(payment.hash()).is_none());
}

#[tokio::test]
async fn out_of_range_output_is_rejected_before_the_wallet() {
    let scenario = Scenario::new();
    let mut builder = coinbase_paying(OURS, COIN, 1).to_mutable();
    builder.vout[0].value = MAX_MONEY + 1;
    let tx = builder.freeze();

    let state = accept_if_valid(&scenario, &tx, &Verdict(true)).await;
    assert_eq!(state.reject_reason(), "bad-txns-vout-toolarge");
    assert!(scenario.wallet.ledger().read().await.is_empty());
}

#[tokio::test]
async fn backward_transfer_to_us_is_spendable_once_confirmed() {
    let scenario = Scenario::new();
    let mut builder = MutableScCertificate::new(Uint256([0x63; 32]), 4, Uint256([0x64; 32]));
    builder.add_backward_transfer(BackwardTransferOut {
        value: 7 * COIN,
        pubkey_hash: Uint160([OURS; 20]),
    });
    let cert = builder.freeze();

    let mut state = ValidationState::new();
    assert!(check_certificate(&cert, &mut state));
    scenario.connect(Vec::new(), vec![cert.clone()]).await;

    assert_eq!(scenario.wallet.balance().await.unwrap(), 7 * COIN);
    let ledger = scenario.wallet.ledger().read().await;
    let entry = ledger.get(cert.hash()).unwrap();
    assert!(entry.as_certificate().is_some());
    assert_eq!(ledger.blocks_to_maturity(entry), 0);
}
