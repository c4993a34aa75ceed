//! Shared handle over the ledger.
//!
//! Every operation takes the ledger lock for its whole body. Nothing is awaited while the lock is held, so a
//! chain tip update never interleaves with a balance query or a coin selection.

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Instant,
};

use tokio::sync::RwLock;
use zen_primitives::{
    block::{Block, BlockIndex, BlockLocator},
    certificate::ScCertificate,
    transaction::{OutPoint, Transaction, TxHash},
    tree::{CommitmentTree, IncrementalWitness},
    uint::Uint256,
    Amount,
};

use crate::{
    error::WalletError,
    ledger::{ScanSummary, TxLedger},
    note::{JsOutPoint, NotePlaintextEntry, PaymentAddress},
    select::{CoinControl, CoinSelection, Output},
    traits::{ChainSource, TransactionRelay},
};

/// Cloneable, lock-guarded wallet ledger
#[derive(Clone, Debug)]
pub struct Wallet {
    ledger: Arc<RwLock<TxLedger>>,
}

impl Wallet {
    /// Wraps `ledger`
    pub fn new(ledger: TxLedger) -> Self {
        Wallet {
            ledger: Arc::new(RwLock::new(ledger)),
        }
    }

    /// The lock itself, for callers needing several operations under one guard
    pub fn ledger(&self) -> &Arc<RwLock<TxLedger>> {
        &self.ledger
    }

    /// See [`TxLedger::sync_transaction`]
    pub async fn sync_transaction(&self, tx: &Transaction, block: Option<&Block>) -> Result<(), WalletError> {
        self.ledger.write().await.sync_transaction(tx, block)
    }

    /// See [`TxLedger::sync_certificate`]
    pub async fn sync_certificate(&self, cert: &ScCertificate, block: Option<&Block>) -> Result<(), WalletError> {
        self.ledger.write().await.sync_certificate(cert, block)
    }

    /// Connects or disconnects `block`, advancing or rolling back note witnesses.
    pub async fn chain_tip(
        &self,
        index: &BlockIndex,
        block: &Block,
        tree: &mut CommitmentTree,
        added: bool,
    ) -> Result<(), WalletError> {
        self.ledger.write().await.chain_tip(index, block, tree, added)
    }

    /// Newest witnesses of `notes` and their common anchor
    pub async fn note_witnesses(&self, notes: &[JsOutPoint]) -> (Vec<Option<IncrementalWitness>>, Option<Uint256>) {
        self.ledger.read().await.note_witnesses(notes)
    }

    /// See [`TxLedger::set_best_chain`]
    pub async fn set_best_chain(&self, locator: &BlockLocator) -> Result<(), WalletError> {
        self.ledger.write().await.set_best_chain(locator)
    }

    /// Trusted spendable balance
    pub async fn balance(&self) -> Result<Amount, WalletError> {
        self.ledger.read().await.balance()
    }

    /// Spendable balance of untrusted unconfirmed entries
    pub async fn unconfirmed_balance(&self) -> Result<Amount, WalletError> {
        self.ledger.read().await.unconfirmed_balance()
    }

    /// Spendable balance of immature coinbases
    pub async fn immature_balance(&self) -> Result<Amount, WalletError> {
        self.ledger.read().await.immature_balance()
    }

    /// Trusted watch-only balance
    pub async fn watch_only_balance(&self) -> Result<Amount, WalletError> {
        self.ledger.read().await.watch_only_balance()
    }

    /// See [`TxLedger::available_coins`]
    pub async fn available_coins(
        &self,
        only_confirmed: bool,
        coin_control: Option<&CoinControl>,
        include_zero_value: bool,
        include_coinbase: bool,
    ) -> Result<Vec<Output>, WalletError> {
        self.ledger
            .read()
            .await
            .available_coins(only_confirmed, coin_control, include_zero_value, include_coinbase)
    }

    /// See [`TxLedger::select_coins`]
    pub async fn select_coins(
        &self,
        target: Amount,
        coin_control: Option<&CoinControl>,
    ) -> Result<CoinSelection, WalletError> {
        self.ledger.read().await.select_coins(target, coin_control)
    }

    /// Keeps `outpoint` out of coin selection
    pub async fn lock_coin(&self, outpoint: OutPoint) {
        self.ledger.write().await.lock_coin(outpoint);
    }

    /// Makes `outpoint` selectable again
    pub async fn unlock_coin(&self, outpoint: &OutPoint) {
        self.ledger.write().await.unlock_coin(outpoint);
    }

    /// Every locked output
    pub async fn list_locked_coins(&self) -> Vec<OutPoint> {
        self.ledger.read().await.list_locked_coins()
    }

    /// See [`TxLedger::filtered_notes`]
    pub async fn filtered_notes(
        &self,
        address: Option<&PaymentAddress>,
        min_depth: i32,
        ignore_spent: bool,
        ignore_unspendable: bool,
    ) -> Vec<NotePlaintextEntry> {
        self.ledger
            .read()
            .await
            .filtered_notes(address, min_depth, ignore_spent, ignore_unspendable)
    }

    /// Fills in nullifiers that became derivable, e.g. after the keys were unlocked.
    pub async fn update_nullifier_note_map(&self) {
        self.ledger.write().await.update_nullifier_note_map();
    }

    /// Forgets the entry for `hash`
    pub async fn erase(&self, hash: &TxHash) -> Result<bool, WalletError> {
        self.ledger.write().await.erase(hash)
    }

    /// See [`TxLedger::resend_wallet_transactions`]
    pub async fn resend_wallet_transactions<R>(&self, now: i64, best_block_time: i64, relay: &R) -> Vec<TxHash>
    where
        R: TransactionRelay + ?Sized,
    {
        self.ledger
            .write()
            .await
            .resend_wallet_transactions(now, best_block_time, relay)
    }

    /// Rescans `source` from `start_height`. The ledger stays locked for the whole scan; `deadline` and
    /// `shutdown` are checked between blocks.
    pub async fn rescan<S>(
        &self,
        source: &S,
        start_height: i32,
        update: bool,
        deadline: Option<Instant>,
        shutdown: &AtomicBool,
    ) -> Result<ScanSummary, WalletError>
    where
        S: ChainSource + ?Sized,
    {
        self.ledger
            .write()
            .await
            .scan_for_wallet_transactions(source, start_height, update, deadline, shutdown)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use zen_primitives::{transaction::TransactionBase, COIN};

    use super::*;
    use crate::testutils::{coinbase_paying, fake_ledger, spend_of, RecordingRelay, OURS};

    #[tokio::test]
    async fn concurrent_syncs_all_land() {
        let (ledger, chain, _keys) = fake_ledger();
        let wallet = Wallet::new(ledger);
        let coinbases: Vec<Transaction> = (0..8).map(|nonce| coinbase_paying(OURS, COIN, nonce)).collect();
        let block = chain.push_block(coinbases.clone(), Vec::new());
        chain.extend(100);

        let handles: Vec<_> = coinbases
            .into_iter()
            .map(|tx| {
                let wallet = wallet.clone();
                let block = block.clone();
                tokio::spawn(async move { wallet.sync_transaction(&tx, Some(&block)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(wallet.ledger().read().await.len(), 8);
        assert_eq!(wallet.balance().await.unwrap(), 8 * COIN);
        assert_eq!(wallet.immature_balance().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn locked_coins_are_not_selected() {
        let (ledger, chain, _keys) = fake_ledger();
        let wallet = Wallet::new(ledger);
        let funding = spend_of(OutPoint::new(Uint256([3; 32]), 0), OURS, 2 * COIN);
        let block = chain.push_block(vec![funding.clone()], Vec::new());
        wallet.sync_transaction(&funding, Some(&block)).await.unwrap();

        let outpoint = OutPoint::new(*funding.hash(), 0);
        wallet.lock_coin(outpoint).await;
        assert_eq!(wallet.list_locked_coins().await, vec![outpoint]);
        assert!(matches!(
            wallet.select_coins(COIN, None).await,
            Err(WalletError::InsufficientFunds { .. })
        ));

        wallet.unlock_coin(&outpoint).await;
        let selection = wallet.select_coins(COIN, None).await.unwrap();
        assert_eq!(selection.value, 2 * COIN);
    }

    #[tokio::test]
    async fn rescan_picks_up_blocks_and_honors_shutdown() {
        let (ledger, chain, _keys) = fake_ledger();
        let wallet = Wallet::new(ledger);
        let coinbase = coinbase_paying(OURS, 50 * COIN, 1);
        chain.push_block(vec![coinbase.clone()], Vec::new());
        chain.extend(3);

        let shutdown = AtomicBool::new(true);
        let summary = wallet.rescan(chain.as_ref(), 0, false, None, &shutdown).await.unwrap();
        assert!(summary.interrupted);
        assert!(summary.added.is_empty());

        shutdown.store(false, Ordering::SeqCst);
        let summary = wallet.rescan(chain.as_ref(), 0, false, None, &shutdown).await.unwrap();
        assert_eq!(summary.added, vec![*coinbase.hash()]);
        assert_eq!(summary.last_height, Some(3));
        assert!(!summary.interrupted);
    }

    #[tokio::test]
    async fn first_resend_only_schedules() {
        let (ledger, _chain, _keys) = fake_ledger();
        let wallet = Wallet::new(ledger);
        let relay = RecordingRelay::default();
        assert!(wallet
            .resend_wallet_transactions(1_000, 1_000, &relay)
            .await
            .is_empty());
        assert!(relay.relayed().is_empty());
    }
}
