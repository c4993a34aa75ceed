//! Output scripts, limited to what backward transfers need to build and read

use std::fmt;

use crate::{error::ScriptError, uint::Uint160};

/// Duplicate the top stack item
pub const OP_DUP: u8 = 0x76;
/// Hash160 the top stack item
pub const OP_HASH160: u8 = 0xa9;
/// Equality check that fails the script on mismatch
pub const OP_EQUALVERIFY: u8 = 0x88;
/// Signature check
pub const OP_CHECKSIG: u8 = 0xac;

/// Raw script bytes. Opcode semantics are the interpreter's business, not ours.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(pub Vec<u8>);

impl Script {
    /// `OP_DUP OP_HASH160 <pubkey hash> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(pubkey_hash: &Uint160) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.push(OP_DUP);
        bytes.push(OP_HASH160);
        bytes.push(Uint160::LEN as u8);
        bytes.extend_from_slice(pubkey_hash.as_bytes());
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Script(bytes)
    }

    /// Finds the first `OP_HASH160`, expects a 20 byte push right after it and returns the pushed hash.
    pub fn extract_pubkey_hash(&self) -> Result<Uint160, ScriptError> {
        let start = self
            .0
            .iter()
            .position(|op| *op == OP_HASH160)
            .ok_or(ScriptError::NoPubKeyHash)?;
        let rest = &self.0[start + 1..];
        match rest.split_first() {
            Some((len, data)) if *len as usize == Uint160::LEN && data.len() >= Uint160::LEN => {
                Uint160::from_slice(&data[..Uint160::LEN]).ok_or(ScriptError::NoPubKeyHash)
            }
            _ => Err(ScriptError::NoPubKeyHash),
        }
    }

    /// Script length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty script
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}
