//! Module for the note commitment tree and the incremental witnesses built on it
//!
//! Both come from `incrementalmerkletree`'s legacy api at depth [`SPROUT_TREE_DEPTH`]; this module supplies the node
//! type, its SHA256Compress combination, and the chain's encoding of trees and witnesses.

use std::io::{self, Read, Write};

use incrementalmerkletree::{frontier, witness, Hashable, Level};
use sha2::{compress256, digest::generic_array::GenericArray};
use zcash_encoding::{Optional, Vector};

use crate::{error::TreeError, uint::Uint256};

/// Depth of the shielded note commitment tree
pub const SPROUT_TREE_DEPTH: u8 = 29;

/// SHA-256 initial hash value
const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// Append-only note commitment tree
pub type CommitmentTree = frontier::CommitmentTree<SproutNode, SPROUT_TREE_DEPTH>;

/// Authentication path for one leaf, kept current as the tree grows
pub type IncrementalWitness = witness::IncrementalWitness<SproutNode, SPROUT_TREE_DEPTH>;

/// Tree node: a note commitment at the leaves, SHA256Compress of the two children above them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SproutNode(pub [u8; 32]);

impl SproutNode {
    /// Reads the raw 32 bytes.
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut bytes = [0u8; 32];
        reader.read_exact(&mut bytes)?;
        Ok(SproutNode(bytes))
    }

    /// Writes the raw 32 bytes.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl Hashable for SproutNode {
    fn empty_leaf() -> Self {
        SproutNode([0u8; 32])
    }

    /// One unpadded SHA-256 compression of the 64 byte block `left || right`.
    fn combine(_level: Level, left: &Self, right: &Self) -> Self {
        let mut block = [0u8; 64];
        block[..32].copy_from_slice(&left.0);
        block[32..].copy_from_slice(&right.0);

        let mut state = SHA256_IV;
        compress256(&mut state, &[GenericArray::clone_from_slice(&block)]);

        let mut out = [0u8; 32];
        for (chunk, word) in out.chunks_exact_mut(4).zip(state) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        SproutNode(out)
    }
}

impl From<Uint256> for SproutNode {
    fn from(commitment: Uint256) -> Self {
        SproutNode(commitment.0)
    }
}

impl From<SproutNode> for Uint256 {
    fn from(node: SproutNode) -> Self {
        Uint256(node.0)
    }
}

/// Appends a leaf to `tree`.
pub fn append_commitment(tree: &mut CommitmentTree, node: SproutNode) -> Result<(), TreeError> {
    tree.append(node).map_err(|()| TreeError::Full)
}

/// Appends a leaf to `tree` and returns a witness for it.
pub fn append_witnessed(tree: &mut CommitmentTree, node: SproutNode) -> Result<IncrementalWitness, TreeError> {
    append_commitment(tree, node)?;
    Ok(IncrementalWitness::from_tree(tree.clone()))
}

/// Records in `witness` a leaf appended to the tree after the witnessed one.
pub fn witness_append(witness: &mut IncrementalWitness, node: SproutNode) -> Result<(), TreeError> {
    witness.append(node).map_err(|()| TreeError::Full)
}

/// Position of the leaf `witness` authenticates
pub fn witness_position(witness: &IncrementalWitness) -> u64 {
    u64::from(witness.witnessed_position())
}

/// Writes `tree` as left leaf, right leaf and the optional parents, each optional node flagged.
pub fn write_commitment_tree<W: Write>(tree: &CommitmentTree, mut writer: W) -> io::Result<()> {
    Optional::write(&mut writer, tree.left().as_ref(), |w, node| node.write(w))?;
    Optional::write(&mut writer, tree.right().as_ref(), |w, node| node.write(w))?;
    Vector::write(&mut writer, tree.parents(), |w, parent| {
        Optional::write(w, parent.as_ref(), |w, node| node.write(w))
    })
}

/// Reads what [`write_commitment_tree`] wrote.
pub fn read_commitment_tree<R: Read>(mut reader: R) -> io::Result<CommitmentTree> {
    let left = Optional::read(&mut reader, SproutNode::read)?;
    let right = Optional::read(&mut reader, SproutNode::read)?;
    let parents = Vector::read(&mut reader, |r| Optional::read(r, SproutNode::read))?;
    CommitmentTree::from_parts(left, right, parents).map_err(|()| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "parents vector exceeds the tree depth",
        )
    })
}

/// Writes the witnessed tree, the filled right siblings and the cursor.
pub fn write_incremental_witness<W: Write>(witness: &IncrementalWitness, mut writer: W) -> io::Result<()> {
    write_commitment_tree(witness.tree(), &mut writer)?;
    Vector::write(&mut writer, witness.filled(), |w, node| node.write(w))?;
    Optional::write(&mut writer, witness.cursor().as_ref(), |w, cursor| {
        write_commitment_tree(cursor, w)
    })
}

/// Reads what [`write_incremental_witness`] wrote.
pub fn read_incremental_witness<R: Read>(mut reader: R) -> io::Result<IncrementalWitness> {
    let tree = read_commitment_tree(&mut reader)?;
    let filled = Vector::read(&mut reader, |r| SproutNode::read(r))?;
    let cursor = Optional::read(&mut reader, read_commitment_tree)?;
    Ok(IncrementalWitness::from_parts(tree, filled, cursor))
}
