//! Outputs that move value out of the main ledger towards a sidechain

use std::{
    fmt,
    io::{self, Write},
};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    amount::{format_money, money_range},
    serialize::{hash_of, write_amount, write_bytes},
    uint::Uint256,
    Amount,
};

/// Sidechain identifier
pub type ScId = Uint256;

/// Behaviour shared by the three crosschain output variants.
pub trait CrosschainOut {
    /// Sidechain the value is sent to
    fn sc_id(&self) -> &ScId;
    /// Value leaving the main ledger
    fn value(&self) -> Amount;
    /// Receiver on the sidechain
    fn address(&self) -> &Uint256;
    /// Canonical encoding
    fn write<W: Write>(&self, writer: W) -> io::Result<()>;

    /// Content hash of the output
    fn hash(&self) -> Uint256 {
        hash_of(|w| self.write(w))
    }

    /// Checks the amount is nonzero and in range, then accumulates it into `cumulated`, which must also stay in range.
    fn check_amount_range(&self, cumulated: &mut Amount) -> bool {
        let value = self.value();
        if value == 0 || !money_range(value) {
            tracing::debug!(sc_id = %self.sc_id(), value, "invalid crosschain output value");
            return false;
        }
        *cumulated = match cumulated.checked_add(value) {
            Some(sum) => sum,
            None => return false,
        };
        if !money_range(*cumulated) {
            tracing::debug!(sc_id = %self.sc_id(), cumulated = *cumulated, "invalid cumulated crosschain value");
            return false;
        }
        true
    }
}

/// Creates a sidechain and funds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScCreationOut {
    /// Sidechain being created
    pub sc_id: ScId,
    /// Initial funds
    pub value: Amount,
    /// Receiver of the funds on the sidechain
    pub address: Uint256,
    /// Blocks per withdrawal epoch
    pub withdrawal_epoch_length: i32,
    /// Opaque sidechain-defined data
    pub custom_data: Vec<u8>,
}

/// Locks a certifier bond on a sidechain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertifierLockOut {
    /// Sidechain the certifier works for
    pub sc_id: ScId,
    /// Bond amount
    pub value: Amount,
    /// Certifier address on the sidechain
    pub address: Uint256,
    /// First withdrawal epoch the lock applies to
    pub active_from_withdrawal_epoch: i64,
}

/// Forwards value to an existing sidechain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTransferOut {
    /// Target sidechain
    pub sc_id: ScId,
    /// Value transferred
    pub value: Amount,
    /// Receiver on the sidechain
    pub address: Uint256,
}

impl CrosschainOut for ScCreationOut {
    fn sc_id(&self) -> &ScId {
        &self.sc_id
    }

    fn value(&self) -> Amount {
        self.value
    }

    fn address(&self) -> &Uint256 {
        &self.address
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.sc_id.write(&mut writer)?;
        writer.write_i32::<LittleEndian>(self.withdrawal_epoch_length)?;
        write_amount(&mut writer, self.value)?;
        self.address.write(&mut writer)?;
        write_bytes(&mut writer, &self.custom_data)
    }
}

impl CrosschainOut for CertifierLockOut {
    fn sc_id(&self) -> &ScId {
        &self.sc_id
    }

    fn value(&self) -> Amount {
        self.value
    }

    fn address(&self) -> &Uint256 {
        &self.address
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_amount(&mut writer, self.value)?;
        self.address.write(&mut writer)?;
        self.sc_id.write(&mut writer)?;
        writer.write_i64::<LittleEndian>(self.active_from_withdrawal_epoch)
    }
}

impl CrosschainOut for ForwardTransferOut {
    fn sc_id(&self) -> &ScId {
        &self.sc_id
    }

    fn value(&self) -> Amount {
        self.value
    }

    fn address(&self) -> &Uint256 {
        &self.address
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_amount(&mut writer, self.value)?;
        self.address.write(&mut writer)?;
        self.sc_id.write(&mut writer)
    }
}

impl fmt::Display for ScCreationOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScCreationOut(sc_id={}, withdrawal_epoch_length={}, value={}, address={:.30}, custom_data=[{}])",
            self.sc_id,
            self.withdrawal_epoch_length,
            format_money(self.value),
            hex::encode(self.address.as_bytes()),
            hex::encode(&self.custom_data)
        )
    }
}

impl fmt::Display for CertifierLockOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CertifierLockOut(value={}, address={:.30}, sc_id={}, active_from_withdrawal_epoch={})",
            format_money(self.value),
            hex::encode(self.address.as_bytes()),
            self.sc_id,
            self.active_from_withdrawal_epoch
        )
    }
}

impl fmt::Display for ForwardTransferOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ForwardTransferOut(value={}, address={:.30}, sc_id={})",
            format_money(self.value),
            hex::encode(self.address.as_bytes()),
            self.sc_id
        )
    }
}

/// Sum of the values of `outputs`, failing if any value or partial sum leaves the money range.
pub(crate) fn value_cc_out<T: CrosschainOut>(outputs: &[T]) -> Option<Amount> {
    outputs
        .iter()
        .try_fold(0, |total, out| crate::amount::checked_money_add(total, out.value()))
}
