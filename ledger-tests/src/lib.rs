//! Scenario driver for ledger tests: a fake chain, fake keys and a wallet kept in step the way a node would
//! keep them.

use std::sync::Arc;

use zen_primitives::{
    block::Block,
    certificate::ScCertificate,
    transaction::Transaction,
    tree::{write_incremental_witness, CommitmentTree, IncrementalWitness},
};
use zen_wallet::{
    ledger::TxLedger,
    store::{MemoryWalletStore, WalletStore},
    testutils::{FakeChain, FakeKeys},
    traits::{ChainSource, ChainView},
    wallet::Wallet,
};
use zenconfig::WalletConfig;

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Encoded form of each witness, for comparing witness state across chain updates.
pub fn witness_bytes(witnesses: &[Option<IncrementalWitness>]) -> Vec<Option<Vec<u8>>> {
    witnesses
        .iter()
        .map(|witness| {
            witness.as_ref().map(|witness| {
                let mut bytes = Vec::new();
                write_incremental_witness(witness, &mut bytes).expect("writing to a vec");
                bytes
            })
        })
        .collect()
}

/// A chain, its keys and a wallet following it
pub struct Scenario {
    /// Active chain
    pub chain: Arc<FakeChain>,
    /// Keys the wallet decrypts with
    pub keys: Arc<FakeKeys>,
    /// Wallet under test
    pub wallet: Wallet,
}

impl Scenario {
    /// Default configuration and a memory store
    pub fn new() -> Self {
        Self::with(WalletConfig::default(), Box::new(MemoryWalletStore::new()))
    }

    /// Custom configuration and store
    pub fn with(config: WalletConfig, store: Box<dyn WalletStore + Send + Sync>) -> Self {
        init_tracing();
        let chain = Arc::new(FakeChain::new());
        let keys = Arc::new(FakeKeys::new());
        let ledger = TxLedger::new(config, keys.clone(), chain.clone(), store);
        Scenario {
            chain,
            keys,
            wallet: Wallet::new(ledger),
        }
    }

    /// Mines a block with `vtx` and `vcert`, hands every record to the wallet, then the tip update.
    pub async fn connect(&self, vtx: Vec<Transaction>, vcert: Vec<ScCertificate>) -> Block {
        let block = self.chain.push_block(vtx, vcert);
        for tx in &block.vtx {
            self.wallet.sync_transaction(tx, Some(&block)).await.unwrap();
        }
        for cert in &block.vcert {
            self.wallet.sync_certificate(cert, Some(&block)).await.unwrap();
        }
        let mut tree = self.chain.tree_before_tip();
        self.wallet
            .chain_tip(&self.chain.tip_index(), &block, &mut tree, true)
            .await
            .unwrap();
        block
    }

    /// Mines `count` empty blocks
    pub async fn mine(&self, count: usize) {
        for _ in 0..count {
            self.connect(Vec::new(), Vec::new()).await;
        }
    }

    /// Disconnects the tip and rolls the wallet back past it.
    pub async fn disconnect(&self) -> Block {
        let mut tree = self.chain.tree_before_tip();
        let (index, block) = self.chain.pop_block();
        self.wallet
            .chain_tip(&index, &block, &mut tree, false)
            .await
            .unwrap();
        block
    }

    /// Commitment tree after the tip block
    pub fn tip_tree(&self) -> CommitmentTree {
        self.chain
            .tree_before(self.chain.tip_height() + 1)
            .expect("tree after the tip is kept")
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}
