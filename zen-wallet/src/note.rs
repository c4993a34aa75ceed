//! Shielded notes the wallet owns and the witnesses kept for them

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    io::{self, Write},
};

use byteorder::{LittleEndian, WriteBytesExt};
use zcash_encoding::CompactSize;
use zen_primitives::{
    transaction::{joinsplit::Nullifier, TxHash},
    tree::{write_incremental_witness, IncrementalWitness},
    uint::Uint256,
    Amount,
};

/// Location of a note: output `n` of joinsplit `js` of transaction `hash`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JsOutPoint {
    /// Transaction hash
    pub hash: TxHash,
    /// Index into the transaction's joinsplits
    pub js: u64,
    /// Index into the joinsplit's outputs
    pub n: u8,
}

impl JsOutPoint {
    /// Note `n` of joinsplit `js` in `hash`
    pub fn new(hash: TxHash, js: u64, n: u8) -> Self {
        JsOutPoint { hash, js, n }
    }

    /// Canonical encoding
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.hash.write(&mut writer)?;
        writer.write_u64::<LittleEndian>(self.js)?;
        writer.write_u8(self.n)
    }
}

impl fmt::Display for JsOutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JSOutPoint({:.10}, {}, {})",
            self.hash.to_string(),
            self.js,
            self.n
        )
    }
}

/// Shielded payment address
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaymentAddress {
    /// Paying key
    pub a_pk: Uint256,
    /// Transmission key
    pub pk_enc: Uint256,
}

/// What the wallet knows about one of its notes.
#[derive(Clone, Debug)]
pub struct NoteData {
    /// Receiving address
    pub address: PaymentAddress,
    /// Cached nullifier. Unknown while the spending key is locked; a note without one is treated as unspent.
    pub nullifier: Option<Nullifier>,
    /// Witness cache, most recent first
    pub witnesses: VecDeque<IncrementalWitness>,
    /// Height the front witness is valid for, -1 until the first chain tip update
    pub witness_height: i32,
}

impl NoteData {
    /// Note received at `address` with an optional known nullifier
    pub fn new(address: PaymentAddress, nullifier: Option<Nullifier>) -> Self {
        NoteData {
            address,
            nullifier,
            witnesses: VecDeque::new(),
            witness_height: -1,
        }
    }

    /// Encoding used by the wallet store
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.address.a_pk.write(&mut writer)?;
        self.address.pk_enc.write(&mut writer)?;
        match &self.nullifier {
            Some(nullifier) => {
                writer.write_u8(1)?;
                nullifier.write(&mut writer)?;
            }
            None => writer.write_u8(0)?,
        }
        CompactSize::write(&mut writer, self.witnesses.len())?;
        for witness in &self.witnesses {
            write_incremental_witness(witness, &mut writer)?;
        }
        writer.write_i32::<LittleEndian>(self.witness_height)
    }
}

/// Two entries describe the same note when address and nullifier agree; witnesses are cache state.
impl PartialEq for NoteData {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.nullifier == other.nullifier
    }
}

impl Eq for NoteData {}

/// Notes of one transaction, by location
pub type NoteMap = BTreeMap<JsOutPoint, NoteData>;

/// Decrypted note contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotePlaintext {
    /// Note value
    pub value: Amount,
    /// Memo field
    pub memo: Vec<u8>,
}

/// A decrypted note and where it lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotePlaintextEntry {
    /// Location
    pub jsop: JsOutPoint,
    /// Receiving address
    pub address: PaymentAddress,
    /// Contents
    pub plaintext: NotePlaintext,
}
