//! Persistence seam for the ledger.
//!
//! The ledger only needs a handful of writes and an atomic batch around them. [`MemoryWalletStore`] stages writes
//! made inside a batch and applies them on commit, which is what the on-disk stores do too.

use std::collections::BTreeMap;

use zen_primitives::{block::BlockLocator, transaction::TxHash};

use crate::{
    error::StoreError,
    ledger::item::{LedgerItem, WalletObject},
};

/// Writes the ledger needs from a store
pub trait WalletStore {
    /// Opens an atomic batch
    fn txn_begin(&mut self) -> Result<(), StoreError>;
    /// Applies the open batch
    fn txn_commit(&mut self) -> Result<(), StoreError>;
    /// Drops the open batch
    fn txn_abort(&mut self) -> Result<(), StoreError>;
    /// Stores a ledger entry under its hash
    fn write_ledger_entry(&mut self, hash: &TxHash, entry: &WalletObject) -> Result<(), StoreError>;
    /// Removes a ledger entry
    fn erase_ledger_entry(&mut self, hash: &TxHash) -> Result<(), StoreError>;
    /// Stores the ledger-wide witness cache size
    fn write_witness_cache_size(&mut self, size: u64) -> Result<(), StoreError>;
    /// Stores the best block the ledger is synced to
    fn write_best_block(&mut self, locator: &BlockLocator) -> Result<(), StoreError>;
}

/// Everything a store holds
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreContents {
    /// Encoded ledger entries
    pub entries: BTreeMap<TxHash, Vec<u8>>,
    /// Witness cache size
    pub witness_cache_size: Option<u64>,
    /// Best block
    pub best_block: Option<BlockLocator>,
}

/// In-memory store with staged batches
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    committed: StoreContents,
    staged: Option<StoreContents>,
}

impl MemoryWalletStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed contents
    pub fn contents(&self) -> &StoreContents {
        &self.committed
    }

    /// True while a batch is open
    pub fn in_txn(&self) -> bool {
        self.staged.is_some()
    }

    fn target(&mut self) -> &mut StoreContents {
        match self.staged.as_mut() {
            Some(staged) => staged,
            None => &mut self.committed,
        }
    }
}

impl WalletStore for MemoryWalletStore {
    fn txn_begin(&mut self) -> Result<(), StoreError> {
        if self.staged.is_some() {
            return Err(StoreError::TxnActive);
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    fn txn_commit(&mut self) -> Result<(), StoreError> {
        self.committed = self.staged.take().ok_or(StoreError::NoTxn)?;
        Ok(())
    }

    fn txn_abort(&mut self) -> Result<(), StoreError> {
        self.staged.take().map(|_| ()).ok_or(StoreError::NoTxn)
    }

    fn write_ledger_entry(&mut self, hash: &TxHash, entry: &WalletObject) -> Result<(), StoreError> {
        let mut bytes = Vec::new();
        entry.write(&mut bytes)?;
        self.target().entries.insert(*hash, bytes);
        Ok(())
    }

    fn erase_ledger_entry(&mut self, hash: &TxHash) -> Result<(), StoreError> {
        self.target().entries.remove(hash);
        Ok(())
    }

    fn write_witness_cache_size(&mut self, size: u64) -> Result<(), StoreError> {
        self.target().witness_cache_size = Some(size);
        Ok(())
    }

    fn write_best_block(&mut self, locator: &BlockLocator) -> Result<(), StoreError> {
        self.target().best_block = Some(locator.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use zen_primitives::uint::Uint256;

    use super::*;

    #[test]
    fn aborted_batch_leaves_nothing_behind() {
        let mut store = MemoryWalletStore::new();
        store.write_witness_cache_size(3).unwrap();

        store.txn_begin().unwrap();
        store.write_witness_cache_size(7).unwrap();
        store
            .write_best_block(&BlockLocator::new(vec![Uint256([1; 32])]))
            .unwrap();
        assert_eq!(store.contents().witness_cache_size, Some(3));
        store.txn_abort().unwrap();

        assert_eq!(store.contents().witness_cache_size, Some(3));
        assert_eq!(store.contents().best_block, None);
        assert!(!store.in_txn());
    }

    #[test]
    fn committed_batch_lands() {
        let mut store = MemoryWalletStore::new();
        store.txn_begin().unwrap();
        assert!(matches!(store.txn_begin(), Err(StoreError::TxnActive)));
        store.write_witness_cache_size(7).unwrap();
        store.txn_commit().unwrap();
        assert_eq!(store.contents().witness_cache_size, Some(7));
        assert!(matches!(store.txn_commit(), Err(StoreError::NoTxn)));
    }
}
