//! Shielded transfer descriptions

use std::{
    fmt,
    io::{self, Write},
};

use crate::{serialize::write_amount, uint::Uint256, Amount};

/// Number of notes a joinsplit consumes
pub const ZC_NUM_JS_INPUTS: usize = 2;
/// Number of notes a joinsplit produces
pub const ZC_NUM_JS_OUTPUTS: usize = 2;
/// Encoded width of a scheme-A (PHGR13) proof
pub const PHGR_PROOF_SIZE: usize = 296;
/// Encoded width of a scheme-B (Groth16) proof
pub const GROTH_PROOF_SIZE: usize = 192;
/// Encoded width of a note ciphertext
pub const ZC_NOTE_CIPHERTEXT_SIZE: usize = 601;

/// Nullifier revealed when a note is spent
pub type Nullifier = Uint256;
/// Note commitment appended to the commitment tree
pub type Commitment = Uint256;

macro_rules! blob {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", stringify!($name), hex::encode(&self.0[..8]))
            }
        }
    };
}

blob!(PhgrProof, PHGR_PROOF_SIZE, "Scheme-A proof bytes");
blob!(GrothProof, GROTH_PROOF_SIZE, "Scheme-B proof bytes");
blob!(NoteCiphertext, ZC_NOTE_CIPHERTEXT_SIZE, "Encrypted note plaintext");

/// The proof carried by a joinsplit, one of two proving schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SproutProof {
    /// PHGR13
    Phgr(PhgrProof),
    /// Groth16
    Groth(GrothProof),
}

impl SproutProof {
    /// An all-zero proof of the requested scheme
    pub fn empty(use_groth: bool) -> Self {
        if use_groth {
            SproutProof::Groth(GrothProof::default())
        } else {
            SproutProof::Phgr(PhgrProof::default())
        }
    }

    /// Encoded width
    pub fn size(&self) -> usize {
        match self {
            SproutProof::Phgr(_) => PHGR_PROOF_SIZE,
            SproutProof::Groth(_) => GROTH_PROOF_SIZE,
        }
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        match self {
            SproutProof::Phgr(proof) => writer.write_all(proof.as_bytes()),
            SproutProof::Groth(proof) => writer.write_all(proof.as_bytes()),
        }
    }
}

/// A shielded transfer unit: consumes two notes, produces two notes and optionally moves transparent value in
/// (`vpub_old`) or out (`vpub_new`) of the shielded pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSplitDescription {
    /// Transparent value entering the shielded pool
    pub vpub_old: Amount,
    /// Transparent value leaving the shielded pool
    pub vpub_new: Amount,
    /// Commitment tree root the input notes are proven against
    pub anchor: Uint256,
    /// Nullifiers of the consumed notes
    pub nullifiers: [Nullifier; ZC_NUM_JS_INPUTS],
    /// Commitments of the produced notes
    pub commitments: [Commitment; ZC_NUM_JS_OUTPUTS],
    /// Ephemeral key for note encryption
    pub ephemeral_key: Uint256,
    /// Seed binding the joinsplit to its transaction signature
    pub random_seed: Uint256,
    /// Message authentication tags binding spending keys to the signature hash
    pub macs: [Uint256; ZC_NUM_JS_INPUTS],
    /// Zero-knowledge proof
    pub proof: SproutProof,
    /// Encrypted output notes
    pub ciphertexts: [NoteCiphertext; ZC_NUM_JS_OUTPUTS],
}

impl JoinSplitDescription {
    /// A description with zeroed fields and an empty proof of the requested scheme
    pub fn empty(use_groth: bool) -> Self {
        JoinSplitDescription {
            vpub_old: 0,
            vpub_new: 0,
            anchor: Uint256::ZERO,
            nullifiers: [Uint256::ZERO; ZC_NUM_JS_INPUTS],
            commitments: [Uint256::ZERO; ZC_NUM_JS_OUTPUTS],
            ephemeral_key: Uint256::ZERO,
            random_seed: Uint256::ZERO,
            macs: [Uint256::ZERO; ZC_NUM_JS_INPUTS],
            proof: SproutProof::empty(use_groth),
            ciphertexts: [NoteCiphertext::default(), NoteCiphertext::default()],
        }
    }

    /// Canonical encoding
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_amount(&mut writer, self.vpub_old)?;
        write_amount(&mut writer, self.vpub_new)?;
        self.anchor.write(&mut writer)?;
        for nullifier in &self.nullifiers {
            nullifier.write(&mut writer)?;
        }
        for commitment in &self.commitments {
            commitment.write(&mut writer)?;
        }
        self.ephemeral_key.write(&mut writer)?;
        self.random_seed.write(&mut writer)?;
        for mac in &self.macs {
            mac.write(&mut writer)?;
        }
        self.proof.write(&mut writer)?;
        for ciphertext in &self.ciphertexts {
            writer.write_all(ciphertext.as_bytes())?;
        }
        Ok(())
    }
}
