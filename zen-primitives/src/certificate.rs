//! Sidechain withdrawal certificates
//!
//! A certificate closes a sidechain withdrawal epoch. It has no inputs and no joinsplits; its outputs are either
//! ordinary change outputs or backward transfers paying main-chain public key hashes.

use std::{
    fmt,
    io::{self, Write},
};

use byteorder::{LittleEndian, WriteBytesExt};
use zcash_encoding::Vector;

use crate::{
    error::{ScriptError, ValueError},
    serialize::{hash_of, size_of},
    transaction::{
        crosschain::ScId, BackwardTransferOut, TransactionBase, TxHash, TxOut, SC_CERT_VERSION,
    },
    uint::Uint256,
    Amount,
};

/// Builder for [`ScCertificate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableScCertificate {
    /// Version tag
    pub version: i32,
    /// Certified sidechain
    pub sc_id: ScId,
    /// Withdrawal epoch being certified
    pub epoch_number: i32,
    /// Last main-chain block of the epoch
    pub end_epoch_block_hash: Uint256,
    /// Ordinary outputs followed by backward transfers
    pub vout: Vec<TxOut>,
    /// Certifier nonce
    pub nonce: Uint256,
}

impl Default for MutableScCertificate {
    fn default() -> Self {
        MutableScCertificate {
            version: SC_CERT_VERSION,
            sc_id: Uint256::ZERO,
            epoch_number: 0,
            end_epoch_block_hash: Uint256::ZERO,
            vout: Vec::new(),
            nonce: Uint256::ZERO,
        }
    }
}

impl MutableScCertificate {
    /// Empty certificate for `sc_id` and `epoch_number`
    pub fn new(sc_id: ScId, epoch_number: i32, end_epoch_block_hash: Uint256) -> Self {
        MutableScCertificate {
            sc_id,
            epoch_number,
            end_epoch_block_hash,
            ..Default::default()
        }
    }

    /// Appends a backward transfer output
    pub fn add_backward_transfer(&mut self, bt: BackwardTransferOut) {
        self.vout.push(TxOut::from(bt));
    }

    /// Hash the certificate would have if frozen now
    pub fn hash(&self) -> TxHash {
        hash_of(|w| write_certificate(w, self))
    }

    /// Copies every field into an immutable certificate and computes its hash.
    pub fn freeze(&self) -> ScCertificate {
        ScCertificate {
            hash: self.hash(),
            inner: self.clone(),
        }
    }
}

/// Immutable sidechain certificate with its content hash computed once at construction.
#[derive(Debug, Clone)]
pub struct ScCertificate {
    hash: TxHash,
    inner: MutableScCertificate,
}

impl PartialEq for ScCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ScCertificate {}

impl ScCertificate {
    /// Builder holding a copy of every field
    pub fn to_mutable(&self) -> MutableScCertificate {
        self.inner.clone()
    }

    /// Certified sidechain
    pub fn sc_id(&self) -> &ScId {
        &self.inner.sc_id
    }

    /// Withdrawal epoch being certified
    pub fn epoch_number(&self) -> i32 {
        self.inner.epoch_number
    }

    /// Last main-chain block of the epoch
    pub fn end_epoch_block_hash(&self) -> &Uint256 {
        &self.inner.end_epoch_block_hash
    }

    /// Outputs produced by backward transfers
    pub fn backward_transfers(&self) -> Result<Vec<BackwardTransferOut>, ScriptError> {
        self.inner
            .vout
            .iter()
            .filter(|out| out.is_from_backward_transfer)
            .map(BackwardTransferOut::try_from)
            .collect()
    }

    /// Total value of the outputs, range-checked at each step
    pub fn value_out(&self) -> Result<Amount, ValueError> {
        self.transparent_value_out()
    }

    /// Canonical encoding
    pub fn write<W: Write>(&self, writer: W) -> io::Result<()> {
        write_certificate(writer, &self.inner)
    }
}

impl TransactionBase for ScCertificate {
    fn hash(&self) -> &TxHash {
        &self.hash
    }

    fn version(&self) -> i32 {
        self.inner.version
    }

    fn serialized_size(&self) -> usize {
        size_of(|w| self.write(w))
    }

    fn vout(&self) -> &[TxOut] {
        &self.inner.vout
    }

    fn is_certificate(&self) -> bool {
        true
    }
}

impl fmt::Display for ScCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ScCertificate(hash={:.10}, ver={}, sc_id={}, epoch_number={}, end_epoch_block_hash={}, vout.size={})",
            self.hash.to_string(),
            self.inner.version,
            self.inner.sc_id,
            self.inner.epoch_number,
            self.inner.end_epoch_block_hash,
            self.inner.vout.len()
        )?;
        for out in &self.inner.vout {
            writeln!(f, "    {}", out)?;
        }
        Ok(())
    }
}

/// Ordinary outputs and backward transfers are encoded as two separate lists.
fn write_certificate<W: Write>(mut writer: W, cert: &MutableScCertificate) -> io::Result<()> {
    writer.write_i32::<LittleEndian>(cert.version)?;
    cert.sc_id.write(&mut writer)?;
    writer.write_i32::<LittleEndian>(cert.epoch_number)?;
    cert.end_epoch_block_hash.write(&mut writer)?;
    let (backward, ordinary): (Vec<&TxOut>, Vec<&TxOut>) = cert
        .vout
        .iter()
        .partition(|out| out.is_from_backward_transfer);
    Vector::write(&mut writer, &ordinary, |w, out| out.write(w))?;
    Vector::write(&mut writer, &backward, |w, out| {
        let bt = BackwardTransferOut::try_from(*out)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        bt.write(w)
    })?;
    cert.nonce.write(&mut writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{script::Script, uint::Uint160, COIN};

    #[test]
    fn backward_transfers_round_trip_through_outputs() {
        let mut builder = MutableScCertificate::new(Uint256([1; 32]), 3, Uint256([2; 32]));
        builder.vout.push(TxOut::new(COIN, Script(vec![0x51])));
        builder.add_backward_transfer(BackwardTransferOut {
            value: 2 * COIN,
            pubkey_hash: Uint160([4; 20]),
        });
        let cert = builder.freeze();

        assert!(cert.is_certificate());
        assert!(!cert.is_coinbase());
        assert_eq!(cert.value_out(), Ok(3 * COIN));
        assert_eq!(
            cert.backward_transfers().unwrap(),
            vec![BackwardTransferOut {
                value: 2 * COIN,
                pubkey_hash: Uint160([4; 20]),
            }]
        );
        assert_eq!(cert.hash(), &cert.to_mutable().hash());
    }
}
