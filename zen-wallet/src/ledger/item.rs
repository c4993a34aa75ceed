//! Ledger entries: the records the wallet tracks plus what only the owner cares about

use std::{
    collections::BTreeMap,
    io::{self, Write},
    sync::OnceLock,
};

use byteorder::{LittleEndian, WriteBytesExt};
use enum_dispatch::enum_dispatch;
use getset::{Getters, MutGetters};
use zcash_encoding::{CompactSize, Vector};
use zen_primitives::{
    block::{Block, BlockHash},
    certificate::ScCertificate,
    transaction::{joinsplit::Nullifier, OutPoint, Transaction, TransactionBase, TxHash},
    uint::Uint256,
    Amount,
};

use crate::note::NoteMap;

/// Something an entry claims to spend. Two entries claiming the same key conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpendKey {
    /// A transparent output
    Prevout(OutPoint),
    /// A shielded note
    Nullifier(Nullifier),
}

/// Link from an entry to the block that included it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleLink {
    /// Including block, null while unconfirmed
    pub hash_block: BlockHash,
    /// Merkle branch from the entry to the block's merkle root
    pub branch: Vec<Uint256>,
    /// Position among the block's leaves, -1 when unknown
    pub index: i32,
}

impl Default for MerkleLink {
    fn default() -> Self {
        MerkleLink {
            hash_block: Uint256::ZERO,
            branch: Vec::new(),
            index: -1,
        }
    }
}

impl MerkleLink {
    /// Links `hash` to `block`. Returns false, leaving the link unlocated, if the block does not hold it.
    pub fn set_from_block(&mut self, block: &Block, hash: &TxHash) -> bool {
        self.hash_block = block.hash;
        match block.leaf_index(hash) {
            Some(index) => {
                self.index = index as i32;
                self.branch = block.merkle_branch(index);
                true
            }
            None => {
                self.index = -1;
                self.branch.clear();
                false
            }
        }
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.hash_block.write(&mut writer)?;
        Vector::write(&mut writer, &self.branch, |w, node| node.write(w))?;
        writer.write_i32::<LittleEndian>(self.index)
    }
}

/// Owner-only bookkeeping shared by every entry kind
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// Free-form key/value annotations
    pub map_value: BTreeMap<String, String>,
    /// Account the entry was sent from
    pub from_account: String,
    /// Seconds since epoch the entry was first seen
    pub time_received: u32,
    /// Whether `time_received` is the record's own time
    pub time_received_is_tx_time: bool,
    /// Display time, 0 when unset
    pub time_smart: u32,
    /// Created by this wallet
    pub from_me: bool,
    /// Position in the ledger's insertion order, -1 until inserted
    pub order_pos: i64,
}

impl EntryMeta {
    fn new() -> Self {
        EntryMeta {
            order_pos: -1,
            ..Default::default()
        }
    }

    /// Annotations as persisted: the account, order position and smart time travel inside the map.
    fn persisted_map_value(&self) -> BTreeMap<String, String> {
        let mut map_value = self.map_value.clone();
        map_value.insert("fromaccount".to_string(), self.from_account.clone());
        if self.order_pos != -1 {
            map_value.insert("n".to_string(), self.order_pos.to_string());
        }
        if self.time_smart != 0 {
            map_value.insert("timesmart".to_string(), self.time_smart.to_string());
        }
        map_value
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let map_value = self.persisted_map_value();
        CompactSize::write(&mut writer, map_value.len())?;
        for (key, value) in &map_value {
            write_string(&mut writer, key)?;
            write_string(&mut writer, value)?;
        }
        writer.write_u32::<LittleEndian>(u32::from(self.time_received_is_tx_time))?;
        writer.write_u32::<LittleEndian>(self.time_received)?;
        writer.write_u8(u8::from(self.from_me))
    }
}

fn write_string<W: Write>(mut writer: W, s: &str) -> io::Result<()> {
    CompactSize::write(&mut writer, s.len())?;
    writer.write_all(s.as_bytes())
}

/// Memoized amounts. Cleared whenever anything they depend on may have changed.
#[derive(Clone, Debug, Default)]
pub struct AmountCache {
    pub(crate) debit: OnceLock<Amount>,
    pub(crate) watch_debit: OnceLock<Amount>,
    pub(crate) credit: OnceLock<Amount>,
    pub(crate) watch_credit: OnceLock<Amount>,
    pub(crate) immature_credit: OnceLock<Amount>,
    pub(crate) immature_watch_credit: OnceLock<Amount>,
    pub(crate) available_credit: OnceLock<Amount>,
    pub(crate) available_watch_credit: OnceLock<Amount>,
    pub(crate) change: OnceLock<Amount>,
}

impl AmountCache {
    /// Forgets every memoized amount
    pub fn clear(&mut self) {
        *self = AmountCache::default();
    }

    /// True if nothing is memoized
    pub fn is_empty(&self) -> bool {
        [
            &self.debit,
            &self.watch_debit,
            &self.credit,
            &self.watch_credit,
            &self.immature_credit,
            &self.immature_watch_credit,
            &self.available_credit,
            &self.available_watch_credit,
            &self.change,
        ]
        .iter()
        .all(|cell| cell.get().is_none())
    }
}

/// Returns the memoized value in `cell`, computing and storing it first if needed.
pub(crate) fn cached<E, F>(cell: &OnceLock<Amount>, compute: F) -> Result<Amount, E>
where
    F: FnOnce() -> Result<Amount, E>,
{
    if let Some(value) = cell.get() {
        return Ok(*value);
    }
    let value = compute()?;
    let _ = cell.set(value);
    Ok(value)
}

/// Capabilities every ledger entry has, whatever record it wraps.
#[enum_dispatch]
pub trait LedgerItem {
    /// Hash of the wrapped record
    fn hash(&self) -> &TxHash;

    /// The wrapped record
    fn record(&self) -> &dyn TransactionBase;

    /// Block linkage
    fn merkle(&self) -> &MerkleLink;

    /// Mutable block linkage
    fn merkle_mut(&mut self) -> &mut MerkleLink;

    /// Owner bookkeeping
    fn meta(&self) -> &EntryMeta;

    /// Mutable owner bookkeeping
    fn meta_mut(&mut self) -> &mut EntryMeta;

    /// Memoized amounts
    fn cache(&self) -> &AmountCache;

    /// Mutable memoized amounts
    fn cache_mut(&mut self) -> &mut AmountCache;

    /// True for coinbase transactions, whose outputs wait for maturity
    fn matures(&self) -> bool;

    /// Encoding used by the wallet store
    fn write(&self, writer: &mut dyn Write) -> io::Result<()>;

    /// Drops every memoized amount
    fn mark_dirty(&mut self) {
        self.cache_mut().clear();
    }

    /// Notes the entry pays to us
    fn note_data(&self) -> Option<&NoteMap> {
        None
    }

    /// Mutable notes
    fn note_data_mut(&mut self) -> Option<&mut NoteMap> {
        None
    }

    /// Prevouts and nullifiers the entry claims
    fn spend_keys(&self) -> Vec<SpendKey> {
        Vec::new()
    }

    /// Display time: the smart time if set, else the time received
    fn tx_time(&self) -> i64 {
        let meta = self.meta();
        if meta.time_smart != 0 {
            i64::from(meta.time_smart)
        } else {
            i64::from(meta.time_received)
        }
    }

    /// Drops every cached witness of every note
    fn clear_note_witness_cache(&mut self) {
        if let Some(notes) = self.note_data_mut() {
            for nd in notes.values_mut() {
                nd.witnesses.clear();
                nd.witness_height = -1;
            }
        }
    }
}

/// A transaction in the ledger
#[derive(Clone, Debug, Getters, MutGetters)]
pub struct WalletTransaction {
    /// The transaction
    #[getset(get = "pub")]
    tx: Transaction,
    merkle: MerkleLink,
    meta: EntryMeta,
    cache: AmountCache,
    /// Our notes among its outputs
    #[getset(get = "pub", get_mut = "pub")]
    notes: NoteMap,
}

impl WalletTransaction {
    /// Unlinked entry for `tx`
    pub fn new(tx: Transaction) -> Self {
        WalletTransaction {
            tx,
            merkle: MerkleLink::default(),
            meta: EntryMeta::new(),
            cache: AmountCache::default(),
            notes: NoteMap::new(),
        }
    }

    /// Replaces the note data
    pub fn set_note_data(&mut self, notes: NoteMap) {
        self.notes = notes;
    }
}

impl LedgerItem for WalletTransaction {
    fn hash(&self) -> &TxHash {
        self.tx.hash()
    }

    fn record(&self) -> &dyn TransactionBase {
        &self.tx
    }

    fn merkle(&self) -> &MerkleLink {
        &self.merkle
    }

    fn merkle_mut(&mut self) -> &mut MerkleLink {
        &mut self.merkle
    }

    fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntryMeta {
        &mut self.meta
    }

    fn cache(&self) -> &AmountCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut AmountCache {
        &mut self.cache
    }

    fn matures(&self) -> bool {
        self.tx.is_coinbase()
    }

    fn write(&self, mut writer: &mut dyn Write) -> io::Result<()> {
        self.tx.write(&mut writer)?;
        self.merkle.write(&mut writer)?;
        self.meta.write(&mut writer)?;
        CompactSize::write(&mut writer, self.notes.len())?;
        for (jsop, nd) in &self.notes {
            jsop.write(&mut writer)?;
            nd.write(&mut writer)?;
        }
        Ok(())
    }

    fn note_data(&self) -> Option<&NoteMap> {
        Some(&self.notes)
    }

    fn note_data_mut(&mut self) -> Option<&mut NoteMap> {
        Some(&mut self.notes)
    }

    fn spend_keys(&self) -> Vec<SpendKey> {
        if self.tx.is_coinbase() {
            return Vec::new();
        }
        self.tx
            .vin()
            .iter()
            .map(|txin| SpendKey::Prevout(txin.prevout))
            .chain(self.tx.nullifiers().into_iter().map(SpendKey::Nullifier))
            .collect()
    }
}

/// A sidechain certificate in the ledger. Certificates spend nothing and carry no notes.
#[derive(Clone, Debug, Getters)]
pub struct WalletCertificate {
    /// The certificate
    #[getset(get = "pub")]
    cert: ScCertificate,
    merkle: MerkleLink,
    meta: EntryMeta,
    cache: AmountCache,
}

impl WalletCertificate {
    /// Unlinked entry for `cert`
    pub fn new(cert: ScCertificate) -> Self {
        WalletCertificate {
            cert,
            merkle: MerkleLink::default(),
            meta: EntryMeta::new(),
            cache: AmountCache::default(),
        }
    }
}

impl LedgerItem for WalletCertificate {
    fn hash(&self) -> &TxHash {
        self.cert.hash()
    }

    fn record(&self) -> &dyn TransactionBase {
        &self.cert
    }

    fn merkle(&self) -> &MerkleLink {
        &self.merkle
    }

    fn merkle_mut(&mut self) -> &mut MerkleLink {
        &mut self.merkle
    }

    fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntryMeta {
        &mut self.meta
    }

    fn cache(&self) -> &AmountCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut AmountCache {
        &mut self.cache
    }

    fn matures(&self) -> bool {
        false
    }

    fn write(&self, mut writer: &mut dyn Write) -> io::Result<()> {
        self.cert.write(&mut writer)?;
        self.merkle.write(&mut writer)?;
        self.meta.write(&mut writer)
    }
}

/// Any ledger entry
#[enum_dispatch(LedgerItem)]
#[derive(Clone, Debug)]
pub enum WalletObject {
    /// A transaction
    WalletTransaction,
    /// A sidechain certificate
    WalletCertificate,
}

impl WalletObject {
    /// The wrapped transaction, if this is one
    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            WalletObject::WalletTransaction(wtx) => Some(wtx.tx()),
            WalletObject::WalletCertificate(_) => None,
        }
    }

    /// The wrapped certificate, if this is one
    pub fn as_certificate(&self) -> Option<&ScCertificate> {
        match self {
            WalletObject::WalletTransaction(_) => None,
            WalletObject::WalletCertificate(wcert) => Some(wcert.cert()),
        }
    }
}

#[cfg(test)]
mod tests {
    use zen_primitives::{
        script::Script,
        transaction::{joinsplit::JoinSplitDescription, MutableTransaction, TxIn, TxOut, GROTH_TX_VERSION},
        COIN,
    };

    use super::*;

    fn spending_tx() -> Transaction {
        let mut tx = MutableTransaction::new();
        tx.version = GROTH_TX_VERSION;
        tx.vin.push(TxIn::new(OutPoint::new(Uint256([1; 32]), 0), Script::default()));
        tx.vout.push(TxOut::new(COIN, Script::default()));
        let mut js = JoinSplitDescription::empty(true);
        js.nullifiers = [Uint256([2; 32]), Uint256([3; 32])];
        tx.vjoinsplit.push(js);
        tx.freeze()
    }

    #[test]
    fn transactions_claim_prevouts_and_nullifiers() {
        let wtx = WalletObject::from(WalletTransaction::new(spending_tx()));
        assert_eq!(
            wtx.spend_keys(),
            vec![
                SpendKey::Prevout(OutPoint::new(Uint256([1; 32]), 0)),
                SpendKey::Nullifier(Uint256([2; 32])),
                SpendKey::Nullifier(Uint256([3; 32])),
            ]
        );
    }

    #[test]
    fn coinbase_claims_nothing() {
        let mut tx = MutableTransaction::new();
        tx.vin.push(TxIn::coinbase(Script(vec![1, 2])));
        tx.vout.push(TxOut::new(50 * COIN, Script::default()));
        let wtx = WalletObject::from(WalletTransaction::new(tx.freeze()));
        assert!(wtx.spend_keys().is_empty());
        assert!(wtx.matures());
    }

    #[test]
    fn mark_dirty_clears_every_amount() {
        let mut wtx = WalletObject::from(WalletTransaction::new(spending_tx()));
        let _ = wtx.cache().credit.set(COIN);
        let _ = wtx.cache().change.set(1);
        assert!(!wtx.cache().is_empty());
        wtx.mark_dirty();
        assert!(wtx.cache().is_empty());
    }

    #[test]
    fn merkle_link_follows_block() {
        let tx = spending_tx();
        let block = Block {
            hash: Uint256([9; 32]),
            time: 0,
            vtx: vec![Transaction::default(), tx.clone()],
            vcert: Vec::new(),
        };
        let mut link = MerkleLink::default();
        assert!(link.set_from_block(&block, tx.hash()));
        assert_eq!(link.index, 1);
        assert_eq!(link.hash_block, block.hash);
        assert!(!link.set_from_block(&block, &Uint256([7; 32])));
        assert_eq!(link.index, -1);
    }

    #[test]
    fn smart_time_wins_over_received_time() {
        let mut wtx = WalletTransaction::new(spending_tx());
        wtx.meta_mut().time_received = 10;
        assert_eq!(wtx.tx_time(), 10);
        wtx.meta_mut().time_smart = 20;
        assert_eq!(wtx.tx_time(), 20);
    }
}
