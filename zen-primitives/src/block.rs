//! Blocks as the wallet sees them: the records they confirm and the merkle tree over those records

use crate::{
    certificate::ScCertificate,
    serialize::hash_pair,
    transaction::{Transaction, TransactionBase, TxHash},
    uint::Uint256,
};

/// Block identifier
pub type BlockHash = Uint256;

/// Position of a block in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockIndex {
    /// Height, genesis is zero
    pub height: i32,
    /// Block hash
    pub hash: BlockHash,
    /// Block timestamp
    pub time: i64,
}

/// Sparse list of block hashes from the tip backwards, enough to find a fork point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLocator {
    /// Hashes, most recent first
    pub have: Vec<BlockHash>,
}

impl BlockLocator {
    /// Locator holding `have`
    pub fn new(have: Vec<BlockHash>) -> Self {
        BlockLocator { have }
    }

    /// True when the locator points nowhere
    pub fn is_null(&self) -> bool {
        self.have.is_empty()
    }
}

/// Block contents. Transactions come first in the merkle tree, certificates after them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Block hash
    pub hash: BlockHash,
    /// Block timestamp
    pub time: i64,
    /// Transactions, coinbase first
    pub vtx: Vec<Transaction>,
    /// Sidechain certificates
    pub vcert: Vec<ScCertificate>,
}

impl Block {
    /// Hashes of the merkle tree leaves, in tree order
    pub fn leaf_hashes(&self) -> Vec<TxHash> {
        self.vtx
            .iter()
            .map(|tx| *tx.hash())
            .chain(self.vcert.iter().map(|cert| *cert.hash()))
            .collect()
    }

    /// Position of `hash` among the leaves
    pub fn leaf_index(&self, hash: &TxHash) -> Option<usize> {
        self.leaf_hashes().iter().position(|leaf| leaf == hash)
    }

    /// Every level of the merkle tree, leaves first, root last. The last node of an odd level is paired with
    /// itself.
    fn merkle_tree(&self) -> Vec<Uint256> {
        let mut tree = self.leaf_hashes();
        let mut offset = 0;
        let mut size = tree.len();
        while size > 1 {
            for i in (0..size).step_by(2) {
                let i2 = std::cmp::min(i + 1, size - 1);
                let node = hash_pair(&tree[offset + i], &tree[offset + i2]);
                tree.push(node);
            }
            offset += size;
            size = size.div_ceil(2);
        }
        tree
    }

    /// Merkle root over transactions then certificates; null for an empty block.
    pub fn merkle_root(&self) -> Uint256 {
        self.merkle_tree().last().copied().unwrap_or(Uint256::ZERO)
    }

    /// Siblings needed to connect leaf `index` to the root.
    pub fn merkle_branch(&self, index: usize) -> Vec<Uint256> {
        let tree = self.merkle_tree();
        let mut branch = Vec::new();
        let mut index = index;
        let mut offset = 0;
        let mut size = self.vtx.len() + self.vcert.len();
        while size > 1 {
            let sibling = std::cmp::min(index ^ 1, size - 1);
            branch.push(tree[offset + sibling]);
            index >>= 1;
            offset += size;
            size = size.div_ceil(2);
        }
        branch
    }
}

/// Folds `leaf` up `branch`, returning the root it implies.
pub fn check_merkle_branch(leaf: Uint256, branch: &[Uint256], index: usize) -> Uint256 {
    let mut hash = leaf;
    let mut index = index;
    for sibling in branch {
        hash = if index & 1 == 1 {
            hash_pair(sibling, &hash)
        } else {
            hash_pair(&hash, sibling)
        };
        index >>= 1;
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        script::Script,
        transaction::{MutableTransaction, TxIn, TxOut},
    };

    fn block_with(count: u8) -> Block {
        let vtx = (0..count)
            .map(|i| {
                let mut tx = MutableTransaction::new();
                tx.vin.push(TxIn::coinbase(Script(vec![i, i])));
                tx.vout.push(TxOut::new(i as i64, Script::default()));
                tx.freeze()
            })
            .collect();
        Block {
            hash: Uint256([count; 32]),
            time: 0,
            vtx,
            vcert: Vec::new(),
        }
    }

    #[test]
    fn branches_lead_to_root() {
        for count in 1..8 {
            let block = block_with(count);
            let root = block.merkle_root();
            for (index, leaf) in block.leaf_hashes().into_iter().enumerate() {
                let branch = block.merkle_branch(index);
                assert_eq!(check_merkle_branch(leaf, &branch, index), root);
            }
        }
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let block = block_with(1);
        assert_eq!(block.merkle_root(), *block.vtx[0].hash());
        assert!(block.merkle_branch(0).is_empty());
    }
}
