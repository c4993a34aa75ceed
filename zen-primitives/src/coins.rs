//! Lookup of the outputs that transaction inputs spend

use std::collections::{BTreeMap, HashMap};

use crate::transaction::{OutPoint, TxIn, TxOut};

/// Resolves an input to the output it spends. `None` means the output is unknown or already spent.
pub trait CoinsView {
    /// Output referenced by `input.prevout`
    fn output_for(&self, input: &TxIn) -> Option<TxOut>;
}

impl CoinsView for HashMap<OutPoint, TxOut> {
    fn output_for(&self, input: &TxIn) -> Option<TxOut> {
        self.get(&input.prevout).cloned()
    }
}

impl CoinsView for BTreeMap<OutPoint, TxOut> {
    fn output_for(&self, input: &TxIn) -> Option<TxOut> {
        self.get(&input.prevout).cloned()
    }
}
