//! Note witness cache maintenance, driven by chain tip updates
//!
//! Every note keeps a short history of witnesses, newest first, one per block since it was found. Connecting a
//! block pushes a witness, disconnecting pops one, so a reorganization shallower than the cache can be undone
//! without rescanning.

use zen_primitives::{
    block::{Block, BlockIndex},
    transaction::TransactionBase,
    tree::{
        append_commitment, append_witnessed, witness_append, CommitmentTree, IncrementalWitness, SproutNode,
    },
    uint::Uint256,
};

use crate::{
    error::WalletError,
    note::{JsOutPoint, NoteData},
};

use super::{item::LedgerItem, TxLedger};

impl TxLedger {
    /// Ledger-wide witness cache size: how many blocks of witness history every note may hold.
    pub fn witness_cache_size(&self) -> u64 {
        self.witness_cache_size
    }

    /// Chain tip update, delivered in height order. `tree` is the commitment tree before `block`.
    pub fn chain_tip(
        &mut self,
        index: &BlockIndex,
        block: &Block,
        tree: &mut CommitmentTree,
        added: bool,
    ) -> Result<(), WalletError> {
        if added {
            self.increment_note_witnesses(index, block, tree)
        } else {
            self.decrement_note_witnesses(index);
            Ok(())
        }
    }

    /// Advances every note witness past `block`, appending its commitments to `tree` and witnessing our own new
    /// notes.
    ///
    /// # Panics
    ///
    /// If a note behind `index` has a witness height other than -1 or the previous height, or holds more
    /// witnesses than the cache allows.
    pub fn increment_note_witnesses(
        &mut self,
        index: &BlockIndex,
        block: &Block,
        tree: &mut CommitmentTree,
    ) -> Result<(), WalletError> {
        let height = index.height;
        let limit = self.config.witness_cache_size();
        let cache_size = self.witness_cache_size;

        for nd in self.note_data_iter_mut() {
            if nd.witness_height < height {
                assert!(
                    cache_size >= nd.witnesses.len() as u64,
                    "note holds more witnesses than the cache size"
                );
                assert!(
                    nd.witness_height == -1 || nd.witness_height == height - 1,
                    "witness height {} is neither unset nor {}",
                    nd.witness_height,
                    height - 1
                );
                if let Some(front) = nd.witnesses.front().cloned() {
                    nd.witnesses.push_front(front);
                }
                if nd.witnesses.len() > limit {
                    nd.witnesses.pop_back();
                }
            }
        }
        if self.witness_cache_size < limit as u64 {
            self.witness_cache_size += 1;
        }

        for tx in &block.vtx {
            let hash = *tx.hash();
            let ours = self.entries.contains_key(&hash);
            for (js_index, js) in tx.vjoinsplit().iter().enumerate() {
                for (n, commitment) in js.commitments.iter().enumerate() {
                    let node = SproutNode::from(*commitment);
                    let jsop = JsOutPoint::new(hash, js_index as u64, n as u8);
                    let witnessed = ours && self.note_needs_witness(&jsop, height);
                    let fresh = if witnessed {
                        Some(append_witnessed(tree, node)?)
                    } else {
                        append_commitment(tree, node)?;
                        None
                    };

                    for nd in self.note_data_iter_mut() {
                        if nd.witness_height < height && !nd.witnesses.is_empty() {
                            if let Some(front) = nd.witnesses.front_mut() {
                                witness_append(front, node)?;
                            }
                        }
                    }

                    if let Some(witness) = fresh {
                        self.push_fresh_witness(&jsop, witness, height);
                    }
                }
            }
        }

        let cache_size = self.witness_cache_size;
        for nd in self.note_data_iter_mut() {
            if nd.witness_height < height {
                nd.witness_height = height;
                assert!(
                    cache_size >= nd.witnesses.len() as u64,
                    "note holds more witnesses than the cache size"
                );
            }
        }
        tracing::debug!(
            "witnesses advanced to height {} (cache size {})",
            height,
            self.witness_cache_size
        );
        Ok(())
    }

    fn note_needs_witness(&self, jsop: &JsOutPoint, height: i32) -> bool {
        self.entries
            .get(&jsop.hash)
            .and_then(|entry| entry.note_data())
            .and_then(|notes| notes.get(jsop))
            .is_some_and(|nd| nd.witness_height < height)
    }

    fn push_fresh_witness(&mut self, jsop: &JsOutPoint, witness: IncrementalWitness, height: i32) {
        let cache_size = self.witness_cache_size;
        let Some(nd) = self
            .entries
            .get_mut(&jsop.hash)
            .and_then(|entry| entry.note_data_mut())
            .and_then(|notes| notes.get_mut(jsop))
        else {
            return;
        };
        if let Some(front) = nd.witnesses.front() {
            // Happens when blocks already cached are replayed after an unclean shutdown.
            tracing::warn!(
                "inconsistent witness cache for {}: {} cached, top (height {}) root {}, new (height {}) root {}",
                jsop,
                nd.witnesses.len(),
                nd.witness_height,
                Uint256::from(front.root()),
                height,
                Uint256::from(witness.root())
            );
            nd.witnesses.clear();
        }
        nd.witnesses.push_front(witness);
        nd.witness_height = height - 1;
        assert!(
            cache_size >= nd.witnesses.len() as u64,
            "note holds more witnesses than the cache size"
        );
    }

    /// Rolls every note witness back past the disconnected block at `index`.
    ///
    /// # Panics
    ///
    /// If the ledger-wide witness cache is already empty, or a note at or below `index` has a witness height
    /// other than -1 or the block's height.
    pub fn decrement_note_witnesses(&mut self, index: &BlockIndex) {
        let height = index.height;
        assert!(
            self.witness_cache_size > 0,
            "witness cache underflow while disconnecting height {}",
            height
        );
        let cache_size = self.witness_cache_size;
        for nd in self.note_data_iter_mut() {
            if nd.witness_height <= height {
                assert!(
                    cache_size >= nd.witnesses.len() as u64,
                    "note holds more witnesses than the cache size"
                );
                assert!(
                    nd.witness_height == -1 || nd.witness_height == height,
                    "witness height {} is neither unset nor {}",
                    nd.witness_height,
                    height
                );
                nd.witnesses.pop_front();
                nd.witness_height = height - 1;
            }
        }
        self.witness_cache_size -= 1;
        tracing::debug!(
            "witnesses rolled back to height {} (cache size {})",
            height - 1,
            self.witness_cache_size
        );
    }

    /// Drops every cached witness and resets the cache size.
    pub fn clear_note_witness_cache(&mut self) {
        for entry in self.entries.values_mut() {
            entry.clear_note_witness_cache();
        }
        self.witness_cache_size = 0;
    }

    /// Newest witness of each note, and the anchor they share. The anchor is `None` when no note has a witness
    /// or their roots disagree.
    pub fn note_witnesses(&self, notes: &[JsOutPoint]) -> (Vec<Option<IncrementalWitness>>, Option<Uint256>) {
        let witnesses: Vec<Option<IncrementalWitness>> = notes
            .iter()
            .map(|jsop| {
                self.entries
                    .get(&jsop.hash)
                    .and_then(|entry| entry.note_data())
                    .and_then(|notes| notes.get(jsop))
                    .and_then(|nd| nd.witnesses.front().cloned())
            })
            .collect();
        let mut roots = witnesses
            .iter()
            .flatten()
            .map(|witness| Uint256::from(witness.root()));
        let anchor = roots.next().filter(|first| roots.all(|root| root == *first));
        (witnesses, anchor)
    }

    fn note_data_iter_mut(&mut self) -> impl Iterator<Item = &mut NoteData> {
        self.entries
            .values_mut()
            .filter_map(|entry| entry.note_data_mut())
            .flat_map(|notes| notes.values_mut())
    }
}
