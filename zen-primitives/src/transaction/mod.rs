//! The transaction record: transparent inputs and outputs, crosschain outputs and shielded joinsplits.
//!
//! A [`Transaction`] is immutable. It is produced by freezing a [`MutableTransaction`], which computes and caches
//! the content hash exactly once. Changing anything means going back through [`Transaction::to_mutable`].

use std::{
    fmt,
    io::{self, Write},
};

use byteorder::{LittleEndian, WriteBytesExt};
use getset::{CopyGetters, Getters};
use zcash_encoding::Vector;

use crate::{
    amount::{checked_money_add, format_money},
    coins::CoinsView,
    error::{ScriptError, TreeError, ValueError},
    script::Script,
    serialize::{hash_of, size_of, write_amount, write_bytes},
    tree::{append_commitment, CommitmentTree, SproutNode},
    uint::{Uint160, Uint256},
    Amount,
};

pub mod crosschain;
pub mod joinsplit;

use crosschain::{value_cc_out, CertifierLockOut, CrosschainOut, ForwardTransferOut, ScCreationOut};
use joinsplit::{JoinSplitDescription, Nullifier};

/// Transaction identifier
pub type TxHash = Uint256;

/// Signature over the transaction by the joinsplit signing key
pub type JoinSplitSig = [u8; 64];

/// Transparent-only transactions
pub const TRANSPARENT_TX_VERSION: i32 = 1;
/// Joinsplits with scheme-A proofs
pub const PHGR_TX_VERSION: i32 = 2;
/// Joinsplits with scheme-B proofs
pub const GROTH_TX_VERSION: i32 = -3;
/// Sidechain-aware transactions (crosschain outputs, scheme-B joinsplits)
pub const SC_TX_VERSION: i32 = -4;
/// Sidechain certificates
pub const SC_CERT_VERSION: i32 = -5;
/// Lowest accepted positive version
pub const MIN_OLD_TX_VERSION: i32 = 1;
/// Largest accepted encoded transaction
pub const MAX_TX_SIZE: usize = 100_000;

/// Reference to the `n`th output of a transaction
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OutPoint {
    /// Hash of the transaction holding the output
    pub hash: TxHash,
    /// Output index
    pub n: u32,
}

impl OutPoint {
    /// Reference to output `n` of `hash`
    pub fn new(hash: TxHash, n: u32) -> Self {
        OutPoint { hash, n }
    }

    /// The reference a coinbase input carries
    pub fn null() -> Self {
        OutPoint {
            hash: Uint256::ZERO,
            n: u32::MAX,
        }
    }

    /// True for the coinbase reference
    pub fn is_null(&self) -> bool {
        self.hash.is_null() && self.n == u32::MAX
    }

    /// Canonical encoding
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.hash.write(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.n)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({:.10}, {})", self.hash.to_string(), self.n)
    }
}

/// Transparent input
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxIn {
    /// Output being spent
    pub prevout: OutPoint,
    /// Unlocking script
    pub script_sig: Script,
    /// Sequence number, `u32::MAX` when final
    pub sequence: u32,
}

impl TxIn {
    /// Final input spending `prevout`
    pub fn new(prevout: OutPoint, script_sig: Script) -> Self {
        TxIn {
            prevout,
            script_sig,
            sequence: u32::MAX,
        }
    }

    /// The synthetic input of a coinbase
    pub fn coinbase(script_sig: Script) -> Self {
        TxIn::new(OutPoint::null(), script_sig)
    }

    /// Canonical encoding
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.prevout.write(&mut writer)?;
        write_bytes(&mut writer, self.script_sig.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.sequence)
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxIn({}", self.prevout)?;
        if self.prevout.is_null() {
            write!(f, ", coinbase {}", hex::encode(self.script_sig.as_bytes()))?;
        } else {
            write!(f, ", script_sig={:.24}", hex::encode(self.script_sig.as_bytes()))?;
        }
        if self.sequence != u32::MAX {
            write!(f, ", sequence={}", self.sequence)?;
        }
        write!(f, ")")
    }
}

/// Transparent output
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxOut {
    /// Value in zatoshis
    pub value: Amount,
    /// Spend condition
    pub script_pubkey: Script,
    /// Set for outputs produced by a backward transfer, which skip the standard-output checks
    pub is_from_backward_transfer: bool,
}

impl TxOut {
    /// Ordinary output
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
            is_from_backward_transfer: false,
        }
    }

    /// Canonical encoding. The backward transfer flag is not part of it.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_amount(&mut writer, self.value)?;
        write_bytes(&mut writer, self.script_pubkey.as_bytes())
    }

    /// Content hash of the output
    pub fn hash(&self) -> Uint256 {
        hash_of(|w| self.write(w))
    }
}

impl fmt::Display for TxOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TxOut(value={}, script_pubkey={:.30})",
            format_money(self.value),
            hex::encode(self.script_pubkey.as_bytes())
        )
    }
}

/// Value returning from a sidechain to a public key hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackwardTransferOut {
    /// Value in zatoshis
    pub value: Amount,
    /// Receiver
    pub pubkey_hash: Uint160,
}

impl BackwardTransferOut {
    /// Canonical encoding
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_amount(&mut writer, self.value)?;
        self.pubkey_hash.write(&mut writer)
    }
}

impl From<BackwardTransferOut> for TxOut {
    fn from(bt: BackwardTransferOut) -> Self {
        TxOut {
            value: bt.value,
            script_pubkey: Script::p2pkh(&bt.pubkey_hash),
            is_from_backward_transfer: true,
        }
    }
}

impl TryFrom<&TxOut> for BackwardTransferOut {
    type Error = ScriptError;

    fn try_from(txout: &TxOut) -> Result<Self, Self::Error> {
        Ok(BackwardTransferOut {
            value: txout.value,
            pubkey_hash: txout.script_pubkey.extract_pubkey_hash()?,
        })
    }
}

/// Read access shared by every record type, so the context-free checks run over transactions and certificates
/// alike.
pub trait TransactionBase {
    /// Cached content hash
    fn hash(&self) -> &TxHash;
    /// Version tag
    fn version(&self) -> i32;
    /// Encoded length
    fn serialized_size(&self) -> usize;
    /// Transparent outputs
    fn vout(&self) -> &[TxOut];

    /// Transparent inputs
    fn vin(&self) -> &[TxIn] {
        &[]
    }

    /// Shielded transfers
    fn vjoinsplit(&self) -> &[JoinSplitDescription] {
        &[]
    }

    /// Sidechain creations
    fn vsc_ccout(&self) -> &[ScCreationOut] {
        &[]
    }

    /// Certifier locks
    fn vcl_ccout(&self) -> &[CertifierLockOut] {
        &[]
    }

    /// Forward transfers
    fn vft_ccout(&self) -> &[ForwardTransferOut] {
        &[]
    }

    /// True for sidechain certificates
    fn is_certificate(&self) -> bool {
        false
    }

    /// A coinbase has exactly one input and it references nothing
    fn is_coinbase(&self) -> bool {
        let vin = self.vin();
        vin.len() == 1 && vin[0].prevout.is_null()
    }

    /// True when there are no crosschain outputs
    fn cc_is_null(&self) -> bool {
        self.vsc_ccout().is_empty() && self.vcl_ccout().is_empty() && self.vft_ccout().is_empty()
    }

    /// Nullifiers revealed by every joinsplit, in order
    fn nullifiers(&self) -> Vec<Nullifier> {
        self.vjoinsplit()
            .iter()
            .flat_map(|js| js.nullifiers.iter().copied())
            .collect()
    }

    /// Sum of the transparent outputs, range-checked at each step
    fn transparent_value_out(&self) -> Result<Amount, ValueError> {
        self.vout()
            .iter()
            .try_fold(0, |total, out| checked_money_add(total, out.value))
            .ok_or(ValueError::OutOfRange("value_out"))
    }
}

/// True for the versions that carry joinsplits
pub fn is_shielded_version(version: i32) -> bool {
    version >= PHGR_TX_VERSION || version == GROTH_TX_VERSION || version == SC_TX_VERSION
}

/// Builder for [`Transaction`]. All fields are public; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableTransaction {
    /// Version tag
    pub version: i32,
    /// Transparent inputs
    pub vin: Vec<TxIn>,
    /// Transparent outputs
    pub vout: Vec<TxOut>,
    /// Sidechain creations
    pub vsc_ccout: Vec<ScCreationOut>,
    /// Certifier locks
    pub vcl_ccout: Vec<CertifierLockOut>,
    /// Forward transfers
    pub vft_ccout: Vec<ForwardTransferOut>,
    /// Earliest height or time the transaction may be mined
    pub lock_time: u32,
    /// Shielded transfers
    pub vjoinsplit: Vec<JoinSplitDescription>,
    /// Key the joinsplit signature is made with
    pub join_split_pub_key: Uint256,
    /// Joinsplit signature
    pub join_split_sig: JoinSplitSig,
}

impl Default for MutableTransaction {
    fn default() -> Self {
        MutableTransaction {
            version: TRANSPARENT_TX_VERSION,
            vin: Vec::new(),
            vout: Vec::new(),
            vsc_ccout: Vec::new(),
            vcl_ccout: Vec::new(),
            vft_ccout: Vec::new(),
            lock_time: 0,
            vjoinsplit: Vec::new(),
            join_split_pub_key: Uint256::ZERO,
            join_split_sig: [0u8; 64],
        }
    }
}

impl MutableTransaction {
    /// Empty transparent transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sidechain creation output
    pub fn add_sc_creation_out(&mut self, out: ScCreationOut) {
        self.vsc_ccout.push(out);
    }

    /// Adds a certifier lock output
    pub fn add_certifier_lock_out(&mut self, out: CertifierLockOut) {
        self.vcl_ccout.push(out);
    }

    /// Adds a forward transfer output
    pub fn add_forward_transfer_out(&mut self, out: ForwardTransferOut) {
        self.vft_ccout.push(out);
    }

    /// Hash the transaction would have if frozen now
    pub fn hash(&self) -> TxHash {
        hash_of(|w| self.parts().write(w))
    }

    /// Copies every field into an immutable transaction and computes its hash.
    pub fn freeze(&self) -> Transaction {
        Transaction {
            hash: self.hash(),
            version: self.version,
            vin: self.vin.clone(),
            vout: self.vout.clone(),
            vsc_ccout: self.vsc_ccout.clone(),
            vcl_ccout: self.vcl_ccout.clone(),
            vft_ccout: self.vft_ccout.clone(),
            lock_time: self.lock_time,
            vjoinsplit: self.vjoinsplit.clone(),
            join_split_pub_key: self.join_split_pub_key,
            join_split_sig: self.join_split_sig,
        }
    }

    fn parts(&self) -> TransactionParts<'_> {
        TransactionParts {
            version: self.version,
            vin: &self.vin,
            vout: &self.vout,
            vsc_ccout: &self.vsc_ccout,
            vcl_ccout: &self.vcl_ccout,
            vft_ccout: &self.vft_ccout,
            lock_time: self.lock_time,
            vjoinsplit: &self.vjoinsplit,
            join_split_pub_key: &self.join_split_pub_key,
            join_split_sig: &self.join_split_sig,
        }
    }
}

impl From<&Transaction> for MutableTransaction {
    fn from(tx: &Transaction) -> Self {
        tx.to_mutable()
    }
}

impl From<MutableTransaction> for Transaction {
    fn from(tx: MutableTransaction) -> Self {
        tx.freeze()
    }
}

/// Immutable transaction with its content hash computed once at construction.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Transaction {
    hash: TxHash,
    version: i32,
    vin: Vec<TxIn>,
    vout: Vec<TxOut>,
    vsc_ccout: Vec<ScCreationOut>,
    vcl_ccout: Vec<CertifierLockOut>,
    vft_ccout: Vec<ForwardTransferOut>,
    /// Earliest height or time the transaction may be mined
    #[getset(get_copy = "pub")]
    lock_time: u32,
    vjoinsplit: Vec<JoinSplitDescription>,
    /// Key the joinsplit signature is made with
    #[getset(get = "pub")]
    join_split_pub_key: Uint256,
    /// Joinsplit signature
    #[getset(get = "pub")]
    join_split_sig: JoinSplitSig,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Transaction {}

impl Default for Transaction {
    fn default() -> Self {
        MutableTransaction::default().freeze()
    }
}

impl Transaction {
    /// Builder holding a copy of every field
    pub fn to_mutable(&self) -> MutableTransaction {
        MutableTransaction {
            version: self.version,
            vin: self.vin.clone(),
            vout: self.vout.clone(),
            vsc_ccout: self.vsc_ccout.clone(),
            vcl_ccout: self.vcl_ccout.clone(),
            vft_ccout: self.vft_ccout.clone(),
            lock_time: self.lock_time,
            vjoinsplit: self.vjoinsplit.clone(),
            join_split_pub_key: self.join_split_pub_key,
            join_split_sig: self.join_split_sig,
        }
    }

    /// Canonical encoding
    pub fn write<W: Write>(&self, writer: W) -> io::Result<()> {
        self.parts().write(writer)
    }

    /// True for the scheme-B version
    pub fn is_groth_version(&self) -> bool {
        self.version == GROTH_TX_VERSION
    }

    /// True for the sidechain-aware version
    pub fn is_sc_version(&self) -> bool {
        self.version == SC_TX_VERSION
    }

    /// True when the version allows joinsplits
    pub fn is_shielded_version(&self) -> bool {
        is_shielded_version(self.version)
    }

    /// Value leaving the transparent pool: outputs, then joinsplit `vpub_old`, then crosschain outputs.
    /// Every addition is range-checked.
    pub fn value_out(&self) -> Result<Amount, ValueError> {
        let mut total = self.transparent_value_out()?;
        for js in &self.vjoinsplit {
            total = checked_money_add(total, js.vpub_old)
                .ok_or(ValueError::OutOfRange("value_out"))?;
        }
        for cc_total in [
            value_cc_out(&self.vsc_ccout),
            value_cc_out(&self.vcl_ccout),
            value_cc_out(&self.vft_ccout),
        ] {
            let cc_total = cc_total.ok_or(ValueError::OutOfRange("value_cc_out"))?;
            total = checked_money_add(total, cc_total)
                .ok_or(ValueError::OutOfRange("value_out"))?;
        }
        Ok(total)
    }

    /// Value the joinsplits release from the shielded pool
    pub fn join_split_value_in(&self) -> Result<Amount, ValueError> {
        self.vjoinsplit
            .iter()
            .try_fold(0, |total, js| checked_money_add(total, js.vpub_new))
            .ok_or(ValueError::OutOfRange("join_split_value_in"))
    }

    /// Value entering the transaction: resolved inputs plus joinsplit `vpub_new`. Zero for coinbases.
    ///
    /// An input the view cannot resolve is an error, never a zero contribution.
    pub fn value_in<V>(&self, view: &V) -> Result<Amount, ValueError>
    where
        V: CoinsView + ?Sized,
    {
        if self.is_coinbase() {
            return Ok(0);
        }
        let mut total: Amount = 0;
        for txin in &self.vin {
            let prev = view
                .output_for(txin)
                .ok_or(ValueError::MissingInput(txin.prevout))?;
            total = checked_money_add(total, prev.value)
                .ok_or(ValueError::OutOfRange("value_in"))?;
        }
        checked_money_add(total, self.join_split_value_in()?)
            .ok_or(ValueError::OutOfRange("value_in"))
    }

    /// Size used for priority: the constant overhead of each input and up to 110 bytes of its scriptSig are not
    /// counted. A `tx_size` of zero means the encoded size.
    pub fn calculate_modified_size(&self, tx_size: usize) -> usize {
        let mut size = if tx_size == 0 {
            self.serialized_size()
        } else {
            tx_size
        };
        for txin in &self.vin {
            let offset = 41 + std::cmp::min(110, txin.script_sig.len());
            if size > offset {
                size -= offset;
            }
        }
        size
    }

    /// Input priority per modified byte
    pub fn compute_priority(&self, priority_inputs: f64, tx_size: usize) -> f64 {
        let size = self.calculate_modified_size(tx_size);
        if size == 0 {
            return 0.0;
        }
        priority_inputs / size as f64
    }

    /// Appends every joinsplit commitment, in order, to `tree`.
    pub fn handle_join_split_commitments(&self, tree: &mut CommitmentTree) -> Result<(), TreeError> {
        for js in &self.vjoinsplit {
            for commitment in &js.commitments {
                append_commitment(tree, SproutNode::from(*commitment))?;
            }
        }
        Ok(())
    }

    fn parts(&self) -> TransactionParts<'_> {
        TransactionParts {
            version: self.version,
            vin: &self.vin,
            vout: &self.vout,
            vsc_ccout: &self.vsc_ccout,
            vcl_ccout: &self.vcl_ccout,
            vft_ccout: &self.vft_ccout,
            lock_time: self.lock_time,
            vjoinsplit: &self.vjoinsplit,
            join_split_pub_key: &self.join_split_pub_key,
            join_split_sig: &self.join_split_sig,
        }
    }
}

impl TransactionBase for Transaction {
    fn hash(&self) -> &TxHash {
        &self.hash
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn serialized_size(&self) -> usize {
        size_of(|w| self.write(w))
    }

    fn vout(&self) -> &[TxOut] {
        &self.vout
    }

    fn vin(&self) -> &[TxIn] {
        &self.vin
    }

    fn vjoinsplit(&self) -> &[JoinSplitDescription] {
        &self.vjoinsplit
    }

    fn vsc_ccout(&self) -> &[ScCreationOut] {
        &self.vsc_ccout
    }

    fn vcl_ccout(&self) -> &[CertifierLockOut] {
        &self.vcl_ccout
    }

    fn vft_ccout(&self) -> &[ForwardTransferOut] {
        &self.vft_ccout
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sc_version() {
            writeln!(
                f,
                "Transaction(hash={:.10}, ver={}, vin.size={}, vout.size={}, vsc_ccout.size={}, vcl_ccout.size={}, vft_ccout.size={}, lock_time={})",
                self.hash.to_string(),
                self.version,
                self.vin.len(),
                self.vout.len(),
                self.vsc_ccout.len(),
                self.vcl_ccout.len(),
                self.vft_ccout.len(),
                self.lock_time
            )?;
        } else {
            writeln!(
                f,
                "Transaction(hash={:.10}, ver={}, vin.size={}, vout.size={}, lock_time={})",
                self.hash.to_string(),
                self.version,
                self.vin.len(),
                self.vout.len(),
                self.lock_time
            )?;
        }
        for txin in &self.vin {
            writeln!(f, "    {}", txin)?;
        }
        for txout in &self.vout {
            writeln!(f, "    {}", txout)?;
        }
        if self.is_sc_version() {
            for out in &self.vsc_ccout {
                writeln!(f, "    {}", out)?;
            }
            for out in &self.vcl_ccout {
                writeln!(f, "    {}", out)?;
            }
            for out in &self.vft_ccout {
                writeln!(f, "    {}", out)?;
            }
        }
        Ok(())
    }
}

/// Borrowed view of the encoded fields, shared by the builder and the frozen record
struct TransactionParts<'a> {
    version: i32,
    vin: &'a [TxIn],
    vout: &'a [TxOut],
    vsc_ccout: &'a [ScCreationOut],
    vcl_ccout: &'a [CertifierLockOut],
    vft_ccout: &'a [ForwardTransferOut],
    lock_time: u32,
    vjoinsplit: &'a [JoinSplitDescription],
    join_split_pub_key: &'a Uint256,
    join_split_sig: &'a JoinSplitSig,
}

impl TransactionParts<'_> {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.version)?;
        Vector::write(&mut writer, self.vin, |w, txin| txin.write(w))?;
        Vector::write(&mut writer, self.vout, |w, txout| txout.write(w))?;
        if self.version == SC_TX_VERSION {
            Vector::write(&mut writer, self.vsc_ccout, |w, out| out.write(w))?;
            Vector::write(&mut writer, self.vcl_ccout, |w, out| out.write(w))?;
            Vector::write(&mut writer, self.vft_ccout, |w, out| out.write(w))?;
        }
        writer.write_u32::<LittleEndian>(self.lock_time)?;
        if is_shielded_version(self.version) {
            Vector::write(&mut writer, self.vjoinsplit, |w, js| js.write(w))?;
            if !self.vjoinsplit.is_empty() {
                self.join_split_pub_key.write(&mut writer)?;
                writer.write_all(self.join_split_sig)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{COIN, MAX_MONEY};

    fn spend(hash: u8, n: u32) -> TxIn {
        TxIn::new(OutPoint::new(Uint256([hash; 32]), n), Script(vec![0x51]))
    }

    fn pay(value: Amount) -> TxOut {
        TxOut::new(value, Script::p2pkh(&Uint160([9; 20])))
    }

    fn shielded(vpub_old: Amount, vpub_new: Amount) -> JoinSplitDescription {
        let mut js = JoinSplitDescription::empty(true);
        js.vpub_old = vpub_old;
        js.vpub_new = vpub_new;
        js
    }

    #[test]
    fn hash_is_stable_and_tracks_content() {
        let mut builder = MutableTransaction::new();
        builder.vin.push(spend(1, 0));
        builder.vout.push(pay(COIN));
        let tx = builder.freeze();
        assert_eq!(tx.hash(), &builder.hash());
        assert_eq!(tx.hash(), tx.to_mutable().freeze().hash());

        builder.vout[0].value += 1;
        assert_ne!(tx.hash(), &builder.hash());
    }

    #[test]
    fn backward_transfer_flag_is_not_hashed() {
        let bt = BackwardTransferOut {
            value: COIN,
            pubkey_hash: Uint160([3; 20]),
        };
        let flagged = TxOut::from(bt);
        let plain = TxOut::new(COIN, Script::p2pkh(&Uint160([3; 20])));
        assert!(flagged.is_from_backward_transfer);
        assert_eq!(flagged.hash(), plain.hash());
        assert_eq!(BackwardTransferOut::try_from(&flagged), Ok(bt));
    }

    #[test]
    fn coinbase_detection() {
        let mut builder = MutableTransaction::new();
        builder.vin.push(TxIn::coinbase(Script(vec![1, 2, 3])));
        builder.vout.push(pay(50 * COIN));
        let coinbase = builder.freeze();
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.value_out(), Ok(50 * COIN));
        assert_eq!(coinbase.value_in(&HashMap::new()), Ok(0));

        builder.vin.push(spend(1, 0));
        assert!(!builder.freeze().is_coinbase());
    }

    #[test]
    fn value_out_includes_vpub_old_and_crosschain() {
        let mut builder = MutableTransaction::new();
        builder.version = SC_TX_VERSION;
        builder.vin.push(spend(1, 0));
        builder.vout.push(pay(2 * COIN));
        builder.vjoinsplit.push(shielded(3 * COIN, 0));
        builder.vjoinsplit.push(shielded(0, 4 * COIN));
        builder.add_forward_transfer_out(ForwardTransferOut {
            sc_id: Uint256([5; 32]),
            value: COIN,
            address: Uint256([6; 32]),
        });
        let tx = builder.freeze();
        assert_eq!(tx.value_out(), Ok(6 * COIN));
        assert_eq!(tx.join_split_value_in(), Ok(4 * COIN));
    }

    #[test]
    fn value_out_overflow_is_an_error() {
        let mut builder = MutableTransaction::new();
        builder.vin.push(spend(1, 0));
        builder.vout.push(pay(MAX_MONEY));
        builder.vout.push(pay(1));
        assert!(matches!(
            builder.freeze().value_out(),
            Err(ValueError::OutOfRange(_))
        ));
    }

    #[test]
    fn value_in_fails_on_unresolved_input() {
        let mut builder = MutableTransaction::new();
        builder.vin.push(spend(1, 0));
        builder.vin.push(spend(2, 1));
        builder.vout.push(pay(COIN));
        let tx = builder.freeze();

        let mut view = HashMap::new();
        view.insert(OutPoint::new(Uint256([1; 32]), 0), pay(3 * COIN));
        assert_eq!(
            tx.value_in(&view),
            Err(ValueError::MissingInput(OutPoint::new(Uint256([2; 32]), 1)))
        );

        view.insert(OutPoint::new(Uint256([2; 32]), 1), pay(COIN));
        assert_eq!(tx.value_in(&view), Ok(4 * COIN));
    }

    #[test]
    fn modified_size_discounts_inputs() {
        let mut builder = MutableTransaction::new();
        builder.vin.push(TxIn::new(
            OutPoint::new(Uint256([1; 32]), 0),
            Script(vec![0; 200]),
        ));
        builder.vout.push(pay(COIN));
        let tx = builder.freeze();
        assert_eq!(tx.calculate_modified_size(1000), 1000 - 41 - 110);
        assert_eq!(tx.calculate_modified_size(100), 100);
        assert_eq!(tx.compute_priority(849.0, 1000), 1.0);
    }

    #[test]
    fn joinsplits_are_not_encoded_for_transparent_version() {
        let mut builder = MutableTransaction::new();
        builder.vin.push(spend(1, 0));
        builder.vout.push(pay(COIN));
        let transparent = builder.freeze().serialized_size();

        builder.version = GROTH_TX_VERSION;
        let groth_empty = builder.freeze().serialized_size();
        assert_eq!(groth_empty, transparent + 1);

        builder.vjoinsplit.push(shielded(COIN, 0));
        let groth = builder.freeze().serialized_size();
        assert!(groth > groth_empty + 32 + 64);
    }

    #[test]
    fn commitments_are_appended_in_order() {
        let mut builder = MutableTransaction::new();
        builder.version = GROTH_TX_VERSION;
        let mut js = shielded(COIN, 0);
        js.commitments = [Uint256([1; 32]), Uint256([2; 32])];
        builder.vjoinsplit.push(js);
        let tx = builder.freeze();

        let mut tree = CommitmentTree::empty();
        tx.handle_join_split_commitments(&mut tree).unwrap();

        let mut expected = CommitmentTree::empty();
        expected.append(SproutNode::from(Uint256([1; 32]))).unwrap();
        expected.append(SproutNode::from(Uint256([2; 32]))).unwrap();
        assert_eq!(tree.size(), 2);
        assert_eq!(tree.root(), expected.root());
    }
}
