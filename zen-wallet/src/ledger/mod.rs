//! The wallet ledger: every record the wallet cares about, which of them spend what, and the note index.
//!
//! [`TxLedger`] is a plain struct mutated through `&mut self`. Sharing it between tasks is the job of
//! [`crate::wallet::Wallet`], which holds one coarse lock over the whole ledger.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use itertools::Itertools;
use rand::Rng;
use zen_primitives::{
    block::{Block, BlockLocator},
    certificate::ScCertificate,
    transaction::{joinsplit::Nullifier, OutPoint, Transaction, TransactionBase, TxHash},
};
use zenconfig::WalletConfig;

use crate::{
    error::WalletError,
    note::{JsOutPoint, NoteData, NoteMap, NotePlaintextEntry, PaymentAddress},
    store::WalletStore,
    traits::{ChainSource, ChainView, IsMine, IsMineFilter, TransactionRelay, WalletKeys},
};

pub mod balance;
pub mod item;
pub mod witness;

use item::{LedgerItem, SpendKey, WalletCertificate, WalletObject, WalletTransaction};

/// Blocks mined this long before the oldest key cannot hold anything of ours
const KEY_TIME_SLACK_SECS: i64 = 7200;

/// Upper bound of the random delay before the next resend, in seconds
const MAX_RESEND_DELAY_SECS: i64 = 30 * 60;

/// Outcome of a rescan
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records added or updated, in block order
    pub added: Vec<TxHash>,
    /// Last block fully processed
    pub last_height: Option<i32>,
    /// True if the deadline or the shutdown flag stopped the scan early
    pub interrupted: bool,
}

/// Wallet ledger.
pub struct TxLedger {
    entries: BTreeMap<TxHash, WalletObject>,
    /// Spenders of each transparent output, in registration order
    spends: BTreeMap<OutPoint, Vec<TxHash>>,
    /// Spenders of each nullifier, in registration order
    nullifier_spends: BTreeMap<Nullifier, Vec<TxHash>>,
    /// Nullifiers of our own notes
    nullifiers_to_notes: BTreeMap<Nullifier, JsOutPoint>,
    locked_coins: BTreeSet<OutPoint>,
    order_pos_next: i64,
    witness_cache_size: u64,
    next_resend: i64,
    last_resend: i64,
    config: WalletConfig,
    keys: Arc<dyn WalletKeys + Send + Sync>,
    chain: Arc<dyn ChainView + Send + Sync>,
    store: Box<dyn WalletStore + Send + Sync>,
}

impl std::fmt::Debug for TxLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxLedger")
            .field("entries", &self.entries.len())
            .field("spends", &self.spends.len())
            .field("nullifier_spends", &self.nullifier_spends.len())
            .field("locked_coins", &self.locked_coins)
            .field("witness_cache_size", &self.witness_cache_size)
            .finish()
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

impl TxLedger {
    /// Empty ledger
    pub fn new(
        config: WalletConfig,
        keys: Arc<dyn WalletKeys + Send + Sync>,
        chain: Arc<dyn ChainView + Send + Sync>,
        store: Box<dyn WalletStore + Send + Sync>,
    ) -> Self {
        TxLedger {
            entries: BTreeMap::new(),
            spends: BTreeMap::new(),
            nullifier_spends: BTreeMap::new(),
            nullifiers_to_notes: BTreeMap::new(),
            locked_coins: BTreeSet::new(),
            order_pos_next: 0,
            witness_cache_size: 0,
            next_resend: 0,
            last_resend: 0,
            config,
            keys,
            chain,
            store,
        }
    }

    /// Configuration the ledger runs with
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Store the ledger persists to
    pub fn store(&self) -> &(dyn WalletStore + Send + Sync) {
        self.store.as_ref()
    }

    /// Entry for `hash`
    pub fn get(&self, hash: &TxHash) -> Option<&WalletObject> {
        self.entries.get(hash)
    }

    /// Every entry, by hash
    pub fn entries(&self) -> impl Iterator<Item = (&TxHash, &WalletObject)> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the ledger tracks nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, hash: &TxHash) -> Result<&WalletObject, WalletError> {
        self.entries.get(hash).ok_or(WalletError::UnknownEntry(*hash))
    }

    /// Height of the entry's block if that block is in the active chain
    fn confirmed_height(&self, entry: &WalletObject) -> Option<i32> {
        let merkle = entry.merkle();
        if merkle.hash_block.is_null() || merkle.index == -1 {
            return None;
        }
        self.chain.height_of(&merkle.hash_block)
    }

    /// Confirmations of the entry: at least 1 when in the active chain, 0 when unconfirmed, -1 when conflicted.
    pub fn depth_of(&self, entry: &WalletObject) -> i32 {
        if let Some(height) = self.confirmed_height(entry) {
            return self.chain.tip_height() - height + 1;
        }
        if self.is_conflicted(entry) {
            -1
        } else {
            0
        }
    }

    /// Depth of the entry for `hash`, `None` if there is none
    pub fn depth(&self, hash: &TxHash) -> Option<i32> {
        self.entries.get(hash).map(|entry| self.depth_of(entry))
    }

    /// An unconfirmed entry is conflicted when another record is the active spender of something it claims.
    fn is_conflicted(&self, entry: &WalletObject) -> bool {
        let hash = entry.hash();
        entry.spend_keys().iter().any(|key| {
            self.active_spender(key)
                .is_some_and(|active| active != *hash)
        })
    }

    fn spenders(&self, key: &SpendKey) -> &[TxHash] {
        let spenders = match key {
            SpendKey::Prevout(outpoint) => self.spends.get(outpoint),
            SpendKey::Nullifier(nullifier) => self.nullifier_spends.get(nullifier),
        };
        spenders.map(Vec::as_slice).unwrap_or(&[])
    }

    fn spenders_mut(&mut self, key: &SpendKey) -> &mut Vec<TxHash> {
        match key {
            SpendKey::Prevout(outpoint) => self.spends.entry(*outpoint).or_default(),
            SpendKey::Nullifier(nullifier) => self.nullifier_spends.entry(*nullifier).or_default(),
        }
    }

    /// The spender that wins `key`: the one confirmed lowest in the active chain, else the first registered.
    pub fn active_spender(&self, key: &SpendKey) -> Option<TxHash> {
        let spenders = self
            .spenders(key)
            .iter()
            .filter_map(|hash| self.entries.get(hash).map(|entry| (hash, entry)));
        let confirmed = spenders
            .clone()
            .filter_map(|(hash, entry)| {
                self.confirmed_height(entry)
                    .map(|height| ((height, entry.meta().order_pos), *hash))
            })
            .min();
        if let Some((_, hash)) = confirmed {
            return Some(hash);
        }
        spenders
            .map(|(hash, entry)| (entry.meta().order_pos, *hash))
            .min()
            .map(|(_, hash)| hash)
    }

    fn has_live_spender(&self, key: &SpendKey) -> bool {
        self.spenders(key).iter().any(|hash| {
            self.entries
                .get(hash)
                .is_some_and(|entry| self.depth_of(entry) >= 0)
        })
    }

    /// True if a spender of `outpoint` is not conflicted
    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.has_live_spender(&SpendKey::Prevout(*outpoint))
    }

    /// True if a spender of `nullifier` is not conflicted
    pub fn is_nullifier_spent(&self, nullifier: &Nullifier) -> bool {
        self.has_live_spender(&SpendKey::Nullifier(*nullifier))
    }

    /// Other records claiming something the entry for `hash` claims
    pub fn conflicts(&self, hash: &TxHash) -> BTreeSet<TxHash> {
        let Some(entry) = self.entries.get(hash) else {
            return BTreeSet::new();
        };
        entry
            .spend_keys()
            .iter()
            .flat_map(|key| self.spenders(key).iter().copied())
            .filter(|spender| spender != hash)
            .collect()
    }

    /// Registers everything the entry for `hash` claims. When a key ends up with several spenders, their
    /// metadata is aligned on the oldest and all of them are marked dirty.
    pub fn add_to_spends(&mut self, hash: &TxHash) {
        let Some(entry) = self.entries.get(hash) else {
            return;
        };
        for key in entry.spend_keys() {
            let spenders = self.spenders_mut(&key);
            if !spenders.contains(hash) {
                spenders.push(*hash);
            }
            if spenders.len() > 1 {
                let owners = spenders.clone();
                tracing::debug!("{:?} claimed by {} records", key, owners.len());
                self.sync_meta_data(&owners);
                for owner in &owners {
                    if let Some(entry) = self.entries.get_mut(owner) {
                        entry.mark_dirty();
                    }
                }
            }
        }
    }

    /// Copies the owner metadata of the oldest of `owners` onto the rest
    fn sync_meta_data(&mut self, owners: &[TxHash]) {
        let Some(oldest) = owners
            .iter()
            .filter_map(|hash| self.entries.get(hash))
            .min_by_key(|entry| entry.meta().order_pos)
        else {
            return;
        };
        let oldest_hash = *oldest.hash();
        let source = oldest.meta().clone();
        for owner in owners.iter().filter(|hash| **hash != oldest_hash) {
            if let Some(entry) = self.entries.get_mut(owner) {
                let meta = entry.meta_mut();
                meta.map_value = source.map_value.clone();
                meta.from_account = source.from_account.clone();
                meta.time_received_is_tx_time = source.time_received_is_tx_time;
                meta.time_smart = source.time_smart;
                meta.from_me = source.from_me;
            }
        }
    }

    /// Drops the memoized amounts of every entry
    pub fn mark_dirty(&mut self) {
        for entry in self.entries.values_mut() {
            entry.mark_dirty();
        }
    }

    /// Drops the memoized amounts of the entries `record` spends from: the parents of its inputs and the owners
    /// of the notes its nullifiers reveal.
    pub fn mark_affected_dirty(&mut self, record: &dyn TransactionBase) {
        let mut affected: BTreeSet<TxHash> = record.vin().iter().map(|txin| txin.prevout.hash).collect();
        affected.extend(
            record
                .nullifiers()
                .iter()
                .filter_map(|nullifier| self.nullifiers_to_notes.get(nullifier))
                .map(|jsop| jsop.hash),
        );
        for hash in affected {
            if let Some(entry) = self.entries.get_mut(&hash) {
                entry.mark_dirty();
            }
        }
    }

    /// Our notes among the outputs of `tx`
    pub fn find_my_notes(&self, tx: &Transaction) -> NoteMap {
        let mut notes = NoteMap::new();
        for (js_index, js) in tx.vjoinsplit().iter().enumerate() {
            let h_sig = js.h_sig(tx.join_split_pub_key());
            for n in 0..js.commitments.len() {
                if let Some(found) = self.keys.try_decrypt_note(tx, js_index, n, &h_sig) {
                    notes.insert(
                        JsOutPoint::new(*tx.hash(), js_index as u64, n as u8),
                        NoteData::new(found.address, found.nullifier),
                    );
                }
            }
        }
        notes
    }

    /// True if `record` reveals the nullifier of one of our notes
    fn reveals_our_nullifier(&self, record: &dyn TransactionBase) -> bool {
        record
            .nullifiers()
            .iter()
            .any(|nullifier| self.nullifiers_to_notes.contains_key(nullifier))
    }

    /// True if any output of `record` is ours in any way
    fn pays_us(&self, record: &dyn TransactionBase) -> bool {
        record
            .vout()
            .iter()
            .any(|txout| self.keys.is_mine(&txout.script_pubkey) != IsMine::No)
    }

    /// Records `tx`, seen in `block` or unconfirmed, if it concerns the wallet.
    pub fn sync_transaction(&mut self, tx: &Transaction, block: Option<&Block>) -> Result<(), WalletError> {
        let entry = WalletObject::from(WalletTransaction::new(tx.clone()));
        if !self.add_to_wallet_if_involving_me(entry, block, true)? {
            return Ok(());
        }
        self.mark_affected_dirty(tx);
        Ok(())
    }

    /// Records `cert`, seen in `block` or unconfirmed, if it concerns the wallet.
    pub fn sync_certificate(&mut self, cert: &ScCertificate, block: Option<&Block>) -> Result<(), WalletError> {
        let entry = WalletObject::from(WalletCertificate::new(cert.clone()));
        if !self.add_to_wallet_if_involving_me(entry, block, true)? {
            return Ok(());
        }
        self.mark_affected_dirty(cert);
        Ok(())
    }

    /// Adds or updates the entry if it concerns the wallet. Returns false, leaving the ledger untouched, if it
    /// does not, or if it is already known and `update` is off.
    pub fn add_to_wallet_if_involving_me(
        &mut self,
        mut incoming: WalletObject,
        block: Option<&Block>,
        update: bool,
    ) -> Result<bool, WalletError> {
        let hash = *incoming.hash();
        if let Some(block) = block {
            for key in incoming.spend_keys() {
                for other in self.spenders(&key).iter().filter(|other| **other != hash) {
                    tracing::info!(
                        "record {} in block {} conflicts with wallet record {} ({:?})",
                        hash,
                        block.hash,
                        other,
                        key
                    );
                }
            }
        }

        let exists = self.entries.contains_key(&hash);
        if exists && !update {
            return Ok(false);
        }
        let notes = incoming
            .as_transaction()
            .map(|tx| self.find_my_notes(tx))
            .unwrap_or_default();
        let relevant = exists
            || !notes.is_empty()
            || self.pays_us(incoming.record())
            || self.reveals_our_nullifier(incoming.record())
            || self.record_debit(incoming.record(), IsMineFilter::ALL)? > 0;
        if !relevant {
            return Ok(false);
        }

        if !notes.is_empty() {
            if let Some(note_data) = incoming.note_data_mut() {
                *note_data = notes;
            }
        }
        if let Some(block) = block {
            incoming.merkle_mut().set_from_block(block, &hash);
        }
        self.add_to_wallet(incoming)?;
        Ok(true)
    }

    /// Inserts `incoming` or merges it into the existing entry. The result is persisted before the ledger
    /// changes, so a failed write leaves the ledger as it was.
    pub fn add_to_wallet(&mut self, incoming: WalletObject) -> Result<(), WalletError> {
        let hash = *incoming.hash();
        let (mut entry, inserted, updated) = match self.entries.get(&hash) {
            None => {
                let mut entry = incoming;
                let now = now_secs();
                let block_time = self.chain.block_time(&entry.merkle().hash_block);
                let meta = entry.meta_mut();
                meta.time_received = now as u32;
                meta.order_pos = self.order_pos_next;
                meta.time_smart = block_time.unwrap_or(now) as u32;
                (entry, true, true)
            }
            Some(stored) => {
                let mut entry = stored.clone();
                let updated = merge_entry(&mut entry, incoming);
                (entry, false, updated)
            }
        };
        entry.mark_dirty();
        if updated {
            self.store.write_ledger_entry(&hash, &entry)?;
        }

        tracing::debug!(
            "add_to_wallet {} {}{}",
            hash,
            if inserted { "new" } else { "" },
            if updated && !inserted { "update" } else { "" }
        );
        self.entries.insert(hash, entry);
        if inserted {
            self.order_pos_next += 1;
            self.add_to_spends(&hash);
        }
        self.update_nullifier_note_map_for(&hash);
        Ok(())
    }

    /// Records the nullifier of every note of the entry for `hash` that has one
    fn update_nullifier_note_map_for(&mut self, hash: &TxHash) {
        let Some(notes) = self.entries.get(hash).and_then(|entry| entry.note_data()) else {
            return;
        };
        for (jsop, nd) in notes {
            if let Some(nullifier) = nd.nullifier {
                self.nullifiers_to_notes.insert(nullifier, *jsop);
            }
        }
    }

    /// Derives the nullifiers that were missing while spending keys were unavailable and refreshes the index.
    pub fn update_nullifier_note_map(&mut self) {
        let keys = self.keys.as_ref();
        let derived: Vec<(JsOutPoint, Nullifier)> = self
            .entries
            .values()
            .filter_map(|entry| Some((entry.as_transaction()?, entry.note_data()?)))
            .flat_map(|(tx, notes)| {
                notes
                    .iter()
                    .filter(|(_, nd)| nd.nullifier.is_none())
                    .filter(move |(_, nd)| keys.have_spending_key(&nd.address))
                    .filter_map(move |(jsop, nd)| {
                        keys.derive_nullifier(&nd.address, tx, jsop)
                            .map(|nullifier| (*jsop, nullifier))
                    })
            })
            .collect();

        for (jsop, nullifier) in derived {
            if let Some(nd) = self
                .entries
                .get_mut(&jsop.hash)
                .and_then(|entry| entry.note_data_mut())
                .and_then(|notes| notes.get_mut(&jsop))
            {
                nd.nullifier = Some(nullifier);
            }
        }
        let hashes: Vec<TxHash> = self.entries.keys().copied().collect();
        for hash in &hashes {
            self.update_nullifier_note_map_for(hash);
        }
    }

    /// Notes of the entry that owns `nullifier`
    pub fn note_for_nullifier(&self, nullifier: &Nullifier) -> Option<&JsOutPoint> {
        self.nullifiers_to_notes.get(nullifier)
    }

    /// Decrypted notes, optionally for one address only, from entries at least `min_depth` deep.
    pub fn filtered_notes(
        &self,
        address: Option<&PaymentAddress>,
        min_depth: i32,
        ignore_spent: bool,
        ignore_unspendable: bool,
    ) -> Vec<NotePlaintextEntry> {
        let mut found = Vec::new();
        for entry in self.entries.values() {
            let (Some(tx), Some(notes)) = (entry.as_transaction(), entry.note_data()) else {
                continue;
            };
            if self.depth_of(entry) < min_depth {
                continue;
            }
            for (jsop, nd) in notes {
                if address.is_some_and(|address| *address != nd.address) {
                    continue;
                }
                if ignore_spent && nd.nullifier.is_some_and(|nullifier| self.is_nullifier_spent(&nullifier)) {
                    continue;
                }
                if ignore_unspendable && !self.keys.have_spending_key(&nd.address) {
                    continue;
                }
                match self.keys.decrypt_note_plaintext(&nd.address, tx, jsop) {
                    Some(plaintext) => found.push(NotePlaintextEntry {
                        jsop: *jsop,
                        address: nd.address,
                        plaintext,
                    }),
                    None => tracing::warn!("could not decrypt known note {}", jsop),
                }
            }
        }
        found
    }

    /// Keeps `outpoint` out of coin selection
    pub fn lock_coin(&mut self, outpoint: OutPoint) {
        self.locked_coins.insert(outpoint);
    }

    /// Makes `outpoint` selectable again
    pub fn unlock_coin(&mut self, outpoint: &OutPoint) {
        self.locked_coins.remove(outpoint);
    }

    /// Makes every locked output selectable again
    pub fn unlock_all_coins(&mut self) {
        self.locked_coins.clear();
    }

    /// True if `outpoint` is locked
    pub fn is_locked_coin(&self, outpoint: &OutPoint) -> bool {
        self.locked_coins.contains(outpoint)
    }

    /// Every locked output
    pub fn list_locked_coins(&self) -> Vec<OutPoint> {
        self.locked_coins.iter().copied().collect()
    }

    /// Forgets the entry for `hash`. Returns false if there was none.
    pub fn erase(&mut self, hash: &TxHash) -> Result<bool, WalletError> {
        let Some(entry) = self.entries.remove(hash) else {
            return Ok(false);
        };
        for key in entry.spend_keys() {
            let spenders = self.spenders_mut(&key);
            spenders.retain(|spender| spender != hash);
            if spenders.is_empty() {
                match key {
                    SpendKey::Prevout(outpoint) => self.spends.remove(&outpoint),
                    SpendKey::Nullifier(nullifier) => self.nullifier_spends.remove(&nullifier),
                };
            }
        }
        self.nullifiers_to_notes.retain(|_, jsop| jsop.hash != *hash);
        self.store.erase_ledger_entry(hash)?;
        Ok(true)
    }

    /// Persists every entry, the witness cache size and `locator` as one store transaction. On failure nothing
    /// lands.
    pub fn set_best_chain(&mut self, locator: &BlockLocator) -> Result<(), WalletError> {
        self.store.txn_begin()?;
        let written = self.write_best_chain(locator);
        if let Err(e) = written {
            tracing::error!("set_best_chain failed, aborting store transaction: {}", e);
            if let Err(abort) = self.store.txn_abort() {
                tracing::error!("store transaction abort failed: {}", abort);
            }
            return Err(e.into());
        }
        self.store.txn_commit()?;
        Ok(())
    }

    fn write_best_chain(&mut self, locator: &BlockLocator) -> Result<(), crate::error::StoreError> {
        for (hash, entry) in &self.entries {
            self.store.write_ledger_entry(hash, entry)?;
        }
        self.store.write_witness_cache_size(self.witness_cache_size)?;
        self.store.write_best_block(locator)
    }

    /// Hands every unconfirmed, non-coinbase entry received at or before `time` to `relay`, oldest first.
    /// Returns the hashes the relay accepted.
    pub fn resend_wallet_transactions_before<R>(&self, time: i64, relay: &R) -> Vec<TxHash>
    where
        R: TransactionRelay + ?Sized,
    {
        self.entries
            .values()
            .filter(|entry| !entry.record().is_coinbase())
            .filter(|entry| i64::from(entry.meta().time_received) <= time)
            .filter(|entry| self.depth_of(entry) == 0)
            .sorted_by_key(|entry| (entry.meta().time_received, entry.meta().order_pos))
            .filter(|entry| relay.relay(entry))
            .map(|entry| *entry.hash())
            .collect()
    }

    /// Periodic rebroadcast. Does nothing before the randomly scheduled next resend, on the first call, or if no
    /// block arrived since the last resend; otherwise resends what was received a while before the best block.
    pub fn resend_wallet_transactions<R>(&mut self, now: i64, best_block_time: i64, relay: &R) -> Vec<TxHash>
    where
        R: TransactionRelay + ?Sized,
    {
        if now < self.next_resend {
            return Vec::new();
        }
        let first = self.next_resend == 0;
        self.next_resend = now + rand::thread_rng().gen_range(0..MAX_RESEND_DELAY_SECS);
        if first {
            return Vec::new();
        }
        if best_block_time < self.last_resend {
            return Vec::new();
        }
        self.last_resend = now;
        let cutoff = best_block_time - self.config.min_relay_resend_interval_secs as i64;
        let relayed = self.resend_wallet_transactions_before(cutoff, relay);
        if !relayed.is_empty() {
            tracing::info!("rebroadcast {} unconfirmed records", relayed.len());
        }
        relayed
    }

    /// Walks the active chain of `source` from `start_height`, adding every record that concerns the wallet
    /// and advancing note witnesses. Checks `deadline` and `shutdown` before each block.
    pub fn scan_for_wallet_transactions<S>(
        &mut self,
        source: &S,
        start_height: i32,
        update: bool,
        deadline: Option<Instant>,
        shutdown: &AtomicBool,
    ) -> Result<ScanSummary, WalletError>
    where
        S: ChainSource + ?Sized,
    {
        let earliest = self
            .keys
            .first_key_time()
            .map(|time| time - KEY_TIME_SLACK_SECS);
        let tip = source.tip_height();
        let mut summary = ScanSummary::default();
        tracing::info!("rescanning from height {} to {}", start_height.max(0), tip);

        for height in start_height.max(0)..=tip {
            if shutdown.load(Ordering::Relaxed) || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::info!("rescan interrupted at height {}", height);
                summary.interrupted = true;
                break;
            }
            let (index, block) = source
                .block_at(height)
                .ok_or(WalletError::BlockUnavailable(height))?;
            if earliest.is_some_and(|earliest| index.time < earliest) {
                continue;
            }

            for tx in &block.vtx {
                let entry = WalletObject::from(WalletTransaction::new(tx.clone()));
                if self.add_to_wallet_if_involving_me(entry, Some(&block), update)? {
                    summary.added.push(*tx.hash());
                }
            }
            for cert in &block.vcert {
                let entry = WalletObject::from(WalletCertificate::new(cert.clone()));
                if self.add_to_wallet_if_involving_me(entry, Some(&block), update)? {
                    summary.added.push(*cert.hash());
                }
            }

            let mut tree = source
                .tree_before(height)
                .ok_or(WalletError::BlockUnavailable(height))?;
            self.chain_tip(&index, &block, &mut tree, true)?;
            summary.last_height = Some(height);
            if height % 100 == 0 {
                tracing::info!("rescan progress: height {}", height);
            }
        }
        Ok(summary)
    }
}

/// Folds what `incoming` knows into `entry`. Returns true if anything changed.
fn merge_entry(entry: &mut WalletObject, incoming: WalletObject) -> bool {
    let mut updated = false;
    let linkage = incoming.merkle();
    if !linkage.hash_block.is_null() && linkage.hash_block != entry.merkle().hash_block {
        entry.merkle_mut().hash_block = linkage.hash_block;
        updated = true;
    }
    if linkage.index != -1 && (linkage.branch != entry.merkle().branch || linkage.index != entry.merkle().index) {
        entry.merkle_mut().branch = linkage.branch.clone();
        entry.merkle_mut().index = linkage.index;
        updated = true;
    }
    if let (Some(fresh), Some(stored)) = (incoming.note_data(), entry.note_data_mut()) {
        if !fresh.is_empty() && fresh != stored {
            *stored = updated_note_data(fresh, stored);
            updated = true;
        }
    }
    if incoming.meta().from_me && !entry.meta().from_me {
        entry.meta_mut().from_me = true;
        updated = true;
    }
    updated
}

/// Fresh note data for an entry, carrying over the witnesses already cached for notes both sides know.
fn updated_note_data(fresh: &NoteMap, stored: &NoteMap) -> NoteMap {
    fresh
        .iter()
        .map(|(jsop, nd)| {
            let mut nd = nd.clone();
            if let Some(previous) = stored.get(jsop) {
                nd.witnesses = previous.witnesses.clone();
                nd.witness_height = previous.witness_height;
            }
            (*jsop, nd)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use zen_primitives::{uint::Uint256, COIN};

    use super::*;
    use crate::{
        error::StoreError,
        testutils::{
            coinbase_paying, fake_ledger, ledger_with_store, spend_of, FailPoint, FailingStore, FakeChain, FakeKeys,
            RecordingRelay, OURS, THEIRS,
        },
    };

    #[test]
    fn irrelevant_records_leave_the_ledger_untouched() {
        let (mut ledger, _chain, _keys) = fake_ledger();
        let tx = coinbase_paying(THEIRS, 50 * COIN, 1);
        ledger.sync_transaction(&tx, None).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn failed_entry_write_leaves_the_ledger_unchanged() {
        let chain = Arc::new(FakeChain::new());
        let store = FailingStore::new();
        let mut ledger = ledger_with_store(chain.clone(), Arc::new(FakeKeys::new()), Box::new(store.clone()));
        let funding = coinbase_paying(OURS, 50 * COIN, 1);
        ledger.sync_transaction(&funding, None).unwrap();
        let prevout = OutPoint::new(*funding.hash(), 0);
        let spend = spend_of(prevout, OURS, 49 * COIN);

        store.fail_on(FailPoint::LedgerEntry);
        assert!(matches!(
            ledger.sync_transaction(&spend, None),
            Err(WalletError::Store(StoreError::WriteFailed(_)))
        ));
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.is_spent(&prevout));
        assert!(ledger.spenders(&SpendKey::Prevout(prevout)).is_empty());

        let block = chain.push_block(vec![funding.clone()], Vec::new());
        assert!(ledger.sync_transaction(&funding, Some(&block)).is_err());
        assert!(ledger.get(funding.hash()).unwrap().merkle().hash_block.is_null());

        store.fail_on(FailPoint::Nothing);
        ledger.sync_transaction(&spend, None).unwrap();
        assert_eq!(ledger.get(spend.hash()).unwrap().meta().order_pos, 1);
        assert!(ledger.is_spent(&prevout));
        assert!(store.contents().entries.contains_key(spend.hash()));
    }

    #[test]
    fn paying_records_are_added_with_increasing_order() {
        let (mut ledger, _chain, _keys) = fake_ledger();
        let first = coinbase_paying(OURS, 50 * COIN, 1);
        let second = coinbase_paying(OURS, 25 * COIN, 2);
        ledger.sync_transaction(&first, None).unwrap();
        ledger.sync_transaction(&second, None).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(first.hash()).unwrap().meta().order_pos, 0);
        assert_eq!(ledger.get(second.hash()).unwrap().meta().order_pos, 1);
    }

    #[test]
    fn first_registered_spender_wins_while_unconfirmed() {
        let (mut ledger, _chain, _keys) = fake_ledger();
        let funding = coinbase_paying(OURS, 50 * COIN, 1);
        ledger.sync_transaction(&funding, None).unwrap();
        let prevout = OutPoint::new(*funding.hash(), 0);
        let first = spend_of(prevout, OURS, 10 * COIN);
        let second = spend_of(prevout, OURS, 20 * COIN);
        ledger.sync_transaction(&first, None).unwrap();
        ledger.sync_transaction(&second, None).unwrap();

        assert_eq!(ledger.active_spender(&SpendKey::Prevout(prevout)), Some(*first.hash()));
        assert_eq!(ledger.depth(first.hash()), Some(0));
        assert_eq!(ledger.depth(second.hash()), Some(-1));
        assert!(ledger.is_spent(&prevout));
        assert_eq!(ledger.conflicts(first.hash()), BTreeSet::from([*second.hash()]));
    }

    #[test]
    fn confirmed_spender_beats_first_seen() {
        let (mut ledger, chain, _keys) = fake_ledger();
        let funding = coinbase_paying(OURS, 50 * COIN, 1);
        ledger.sync_transaction(&funding, None).unwrap();
        let prevout = OutPoint::new(*funding.hash(), 0);
        let first = spend_of(prevout, OURS, 10 * COIN);
        let second = spend_of(prevout, OURS, 20 * COIN);
        ledger.sync_transaction(&first, None).unwrap();

        let block = chain.push_block(vec![second.clone()], Vec::new());
        ledger.sync_transaction(&second, Some(&block)).unwrap();

        assert_eq!(ledger.active_spender(&SpendKey::Prevout(prevout)), Some(*second.hash()));
        assert_eq!(ledger.depth(second.hash()), Some(1));
        assert_eq!(ledger.depth(first.hash()), Some(-1));
    }

    #[test]
    fn collisions_align_metadata_on_the_oldest() {
        let (mut ledger, _chain, _keys) = fake_ledger();
        let funding = coinbase_paying(OURS, 50 * COIN, 1);
        ledger.sync_transaction(&funding, None).unwrap();
        let prevout = OutPoint::new(*funding.hash(), 0);
        let first = spend_of(prevout, OURS, 10 * COIN);
        ledger.sync_transaction(&first, None).unwrap();
        if let Some(WalletObject::WalletTransaction(wtx)) = ledger.entries.get_mut(first.hash()) {
            wtx.meta_mut()
                .map_value
                .insert("comment".to_string(), "rent".to_string());
        }
        let second = spend_of(prevout, OURS, 20 * COIN);
        ledger.sync_transaction(&second, None).unwrap();
        assert_eq!(
            ledger.get(second.hash()).unwrap().meta().map_value.get("comment"),
            Some(&"rent".to_string())
        );
    }

    #[test]
    fn erase_forgets_spends() {
        let (mut ledger, _chain, _keys) = fake_ledger();
        let funding = coinbase_paying(OURS, 50 * COIN, 1);
        ledger.sync_transaction(&funding, None).unwrap();
        let prevout = OutPoint::new(*funding.hash(), 0);
        let spend = spend_of(prevout, OURS, 10 * COIN);
        ledger.sync_transaction(&spend, None).unwrap();
        assert!(ledger.is_spent(&prevout));

        assert!(ledger.erase(spend.hash()).unwrap());
        assert!(!ledger.is_spent(&prevout));
        assert!(!ledger.erase(spend.hash()).unwrap());
    }

    #[test]
    fn locked_coins_round_trip() {
        let (mut ledger, _chain, _keys) = fake_ledger();
        let a = OutPoint::new(Uint256([1; 32]), 0);
        let b = OutPoint::new(Uint256([2; 32]), 1);
        ledger.lock_coin(a);
        ledger.lock_coin(b);
        assert!(ledger.is_locked_coin(&a));
        ledger.unlock_coin(&a);
        assert_eq!(ledger.list_locked_coins(), vec![b]);
        ledger.unlock_all_coins();
        assert!(ledger.list_locked_coins().is_empty());
    }

    #[test]
    fn notes_are_found_and_indexed() {
        let chain = Arc::new(FakeChain::new());
        let keys = Arc::new(FakeKeys::new());
        let mut ledger = crate::testutils::ledger_with(chain, keys.clone());
        let (tx, nullifier) = crate::testutils::shielded_payment(&keys, Uint256([4; 32]), 3 * COIN);
        ledger.sync_transaction(&tx, None).unwrap();

        let jsop = JsOutPoint::new(*tx.hash(), 0, 0);
        assert_eq!(ledger.note_for_nullifier(&nullifier), Some(&jsop));
        let notes = ledger.filtered_notes(None, 0, true, false);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].plaintext.value, 3 * COIN);
    }

    #[test]
    fn unlocked_keys_fill_in_nullifiers() {
        let chain = Arc::new(FakeChain::new());
        let keys = Arc::new(FakeKeys::new());
        keys.set_spending_keys_available(false);
        let mut ledger = crate::testutils::ledger_with(chain, keys.clone());
        let (tx, nullifier) = crate::testutils::shielded_payment(&keys, Uint256([5; 32]), COIN);
        ledger.sync_transaction(&tx, None).unwrap();
        assert_eq!(ledger.note_for_nullifier(&nullifier), None);

        keys.set_spending_keys_available(true);
        ledger.update_nullifier_note_map();
        assert_eq!(
            ledger.note_for_nullifier(&nullifier),
            Some(&JsOutPoint::new(*tx.hash(), 0, 0))
        );
    }

    #[test]
    fn resend_hands_over_unconfirmed_records_oldest_first() {
        let (mut ledger, chain, _keys) = fake_ledger();
        let funding = spend_of(OutPoint::new(Uint256([12; 32]), 0), OURS, 5 * COIN);
        let block = chain.push_block(vec![funding.clone()], Vec::new());
        ledger.sync_transaction(&funding, Some(&block)).unwrap();
        let first = spend_of(OutPoint::new(*funding.hash(), 0), THEIRS, COIN);
        let coinbase = coinbase_paying(OURS, COIN, 3);
        let second = spend_of(OutPoint::new(Uint256([13; 32]), 1), OURS, COIN);
        for tx in [&first, &coinbase, &second] {
            ledger.sync_transaction(tx, None).unwrap();
        }

        let relay = RecordingRelay::default();
        assert!(ledger.resend_wallet_transactions_before(-1, &relay).is_empty());
        let relayed = ledger.resend_wallet_transactions_before(i64::MAX, &relay);
        assert_eq!(relayed, vec![*first.hash(), *second.hash()]);
        assert_eq!(relay.relayed(), relayed);
    }
}
