//! Fakes for the ledger's collaborators, shared by unit tests and the scenario test crate.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
};

use zen_primitives::{
    block::{Block, BlockHash, BlockIndex, BlockLocator},
    certificate::ScCertificate,
    script::Script,
    transaction::{
        joinsplit::{Commitment, JoinSplitDescription, Nullifier},
        MutableTransaction, OutPoint, Transaction, TransactionBase, TxHash, TxIn, TxOut, GROTH_TX_VERSION,
    },
    tree::{CommitmentTree, SproutNode},
    uint::{Uint160, Uint256},
    Amount,
};
use zenconfig::WalletConfig;

use crate::{
    error::StoreError,
    ledger::{
        item::{LedgerItem, WalletObject},
        TxLedger,
    },
    note::{JsOutPoint, NotePlaintext, PaymentAddress},
    store::{MemoryWalletStore, StoreContents, WalletStore},
    traits::{ChainSource, ChainView, DecryptedNote, IsMine, TransactionRelay, WalletKeys},
};

/// Owner tag of spendable outputs
pub const OURS: u8 = 1;
/// Owner tag of foreign outputs
pub const THEIRS: u8 = 2;
/// Owner tag of watch-only outputs
pub const WATCHED: u8 = 3;
/// Owner tag of our change outputs
pub const CHANGE: u8 = 4;

/// Timestamp of the genesis block of every [`FakeChain`]
pub const GENESIS_TIME: i64 = 1_500_000_000;
/// Seconds between [`FakeChain`] blocks
pub const BLOCK_INTERVAL: i64 = 150;

/// Pay-to-pubkey-hash script of an owner tag
pub fn script_for(owner: u8) -> Script {
    Script::p2pkh(&Uint160([owner; 20]))
}

/// Coinbase paying `value` to `owner`. `nonce` keeps hashes apart.
pub fn coinbase_paying(owner: u8, value: Amount, nonce: u8) -> Transaction {
    let mut tx = MutableTransaction::new();
    tx.vin.push(TxIn::coinbase(Script(vec![nonce, nonce])));
    tx.vout.push(TxOut::new(value, script_for(owner)));
    tx.freeze()
}

/// Transaction spending `prevout` and paying `value` to `owner`
pub fn spend_of(prevout: OutPoint, owner: u8, value: Amount) -> Transaction {
    let mut tx = MutableTransaction::new();
    tx.vin.push(TxIn::new(prevout, Script(vec![0x51])));
    tx.vout.push(TxOut::new(value, script_for(owner)));
    tx.freeze()
}

/// Shielding transaction whose first joinsplit output is a note for us of `value`. Registers the note with
/// `keys` and returns its nullifier.
pub fn shielded_payment(keys: &FakeKeys, seed: Uint256, value: Amount) -> (Transaction, Nullifier) {
    let mut other = seed;
    other.0[31] ^= 0xff;
    let mut js = JoinSplitDescription::empty(true);
    js.vpub_old = value;
    js.commitments = [seed, other];
    js.nullifiers = [Uint256([0xa0; 32]), Uint256([0xa1; 32])];
    js.nullifiers[0].0[0] = seed.0[0];
    js.nullifiers[1].0[0] = seed.0[0];

    let mut tx = MutableTransaction::new();
    tx.version = GROTH_TX_VERSION;
    tx.vin.push(TxIn::new(OutPoint::new(seed, 9), Script(vec![0x51])));
    tx.vjoinsplit.push(js);
    tx.join_split_pub_key = Uint256([0x33; 32]);
    keys.add_note(seed, PaymentAddress::default(), value);
    (tx.freeze(), FakeKeys::nullifier_for(&seed))
}

/// Transaction revealing `nullifier` and paying `value` to `owner`
pub fn nullifier_spend(nullifier: Nullifier, owner: u8, value: Amount) -> Transaction {
    let mut js = JoinSplitDescription::empty(true);
    js.vpub_new = value;
    js.nullifiers = [nullifier, Uint256([0xee; 32])];
    js.commitments = [Uint256([0xc0; 32]), Uint256([0xc1; 32])];
    js.commitments[0].0[0] = nullifier.0[0];
    js.commitments[1].0[0] = nullifier.0[1];

    let mut tx = MutableTransaction::new();
    tx.version = GROTH_TX_VERSION;
    tx.vout.push(TxOut::new(value, script_for(owner)));
    tx.vjoinsplit.push(js);
    tx.freeze()
}

struct ChainState {
    blocks: Vec<(BlockIndex, Block)>,
    /// `trees[h]` is the commitment tree before the block at height `h`; one more entry than blocks.
    trees: Vec<CommitmentTree>,
    nonce: u32,
}

/// In-memory active chain
pub struct FakeChain {
    state: RwLock<ChainState>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    /// Empty chain
    pub fn new() -> Self {
        FakeChain {
            state: RwLock::new(ChainState {
                blocks: Vec::new(),
                trees: vec![CommitmentTree::empty()],
                nonce: 0,
            }),
        }
    }

    /// Connects a block holding `vtx` and `vcert` and returns it.
    pub fn push_block(&self, vtx: Vec<Transaction>, vcert: Vec<ScCertificate>) -> Block {
        let mut state = self.state.write().unwrap();
        state.nonce += 1;
        let height = state.blocks.len() as i32;
        let mut hash = [0xb0u8; 32];
        hash[..4].copy_from_slice(&state.nonce.to_le_bytes());
        let block = Block {
            hash: BlockHash::from(hash),
            time: GENESIS_TIME + BLOCK_INTERVAL * height as i64,
            vtx,
            vcert,
        };
        let mut tree = state.trees.last().cloned().unwrap_or_else(CommitmentTree::empty);
        for tx in &block.vtx {
            tx.handle_join_split_commitments(&mut tree).unwrap();
        }
        state.trees.push(tree);
        state.blocks.push((
            BlockIndex {
                height,
                hash: block.hash,
                time: block.time,
            },
            block.clone(),
        ));
        block
    }

    /// Connects `count` empty blocks
    pub fn extend(&self, count: usize) {
        for _ in 0..count {
            self.push_block(Vec::new(), Vec::new());
        }
    }

    /// Disconnects the tip and returns it
    pub fn pop_block(&self) -> (BlockIndex, Block) {
        let mut state = self.state.write().unwrap();
        state.trees.pop();
        state.blocks.pop().expect("chain is not empty")
    }

    /// Index of the tip
    pub fn tip_index(&self) -> BlockIndex {
        self.state.read().unwrap().blocks.last().expect("chain is not empty").0
    }

    /// Commitment tree before the tip block
    pub fn tree_before_tip(&self) -> CommitmentTree {
        let state = self.state.read().unwrap();
        state.trees[state.blocks.len() - 1].clone()
    }
}

impl ChainView for FakeChain {
    fn tip_height(&self) -> i32 {
        self.state.read().unwrap().blocks.len() as i32 - 1
    }

    fn height_of(&self, hash: &BlockHash) -> Option<i32> {
        self.state
            .read()
            .unwrap()
            .blocks
            .iter()
            .find(|(index, _)| index.hash == *hash)
            .map(|(index, _)| index.height)
    }

    fn block_time(&self, hash: &BlockHash) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .blocks
            .iter()
            .find(|(index, _)| index.hash == *hash)
            .map(|(index, _)| index.time)
    }
}

impl ChainSource for FakeChain {
    fn block_at(&self, height: i32) -> Option<(BlockIndex, Block)> {
        let index = usize::try_from(height).ok()?;
        self.state.read().unwrap().blocks.get(index).cloned()
    }

    fn tree_before(&self, height: i32) -> Option<CommitmentTree> {
        let index = usize::try_from(height).ok()?;
        self.state.read().unwrap().trees.get(index).cloned()
    }

    fn locator(&self) -> BlockLocator {
        BlockLocator::new(
            self.state
                .read()
                .unwrap()
                .blocks
                .iter()
                .rev()
                .map(|(index, _)| index.hash)
                .collect(),
        )
    }
}

/// Key store recognizing the owner tags and a set of registered notes
pub struct FakeKeys {
    notes: RwLock<BTreeMap<Commitment, (PaymentAddress, Amount)>>,
    spending_keys_available: AtomicBool,
    first_key_time: RwLock<Option<i64>>,
}

impl Default for FakeKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKeys {
    /// Keys with spending keys available and no notes
    pub fn new() -> Self {
        FakeKeys {
            notes: RwLock::new(BTreeMap::new()),
            spending_keys_available: AtomicBool::new(true),
            first_key_time: RwLock::new(None),
        }
    }

    /// The nullifier the fake derives for the note with `commitment`
    pub fn nullifier_for(commitment: &Commitment) -> Nullifier {
        let mut bytes = commitment.0;
        for byte in bytes.iter_mut() {
            *byte ^= 0x5a;
        }
        Uint256(bytes)
    }

    /// Registers a note the keys can decrypt
    pub fn add_note(&self, commitment: Commitment, address: PaymentAddress, value: Amount) {
        self.notes.write().unwrap().insert(commitment, (address, value));
    }

    /// Locks or unlocks the spending keys
    pub fn set_spending_keys_available(&self, available: bool) {
        self.spending_keys_available.store(available, Ordering::SeqCst);
    }

    /// Sets the creation time of the oldest key
    pub fn set_first_key_time(&self, time: Option<i64>) {
        *self.first_key_time.write().unwrap() = time;
    }

    fn commitment_at(tx: &Transaction, jsop: &JsOutPoint) -> Option<Commitment> {
        tx.vjoinsplit()
            .get(jsop.js as usize)
            .and_then(|js| js.commitments.get(jsop.n as usize))
            .copied()
    }

    fn available(&self) -> bool {
        self.spending_keys_available.load(Ordering::SeqCst)
    }
}

impl WalletKeys for FakeKeys {
    fn is_mine(&self, script: &Script) -> IsMine {
        match script.extract_pubkey_hash() {
            Ok(hash) if hash == Uint160([OURS; 20]) || hash == Uint160([CHANGE; 20]) => IsMine::Spendable,
            Ok(hash) if hash == Uint160([WATCHED; 20]) => IsMine::WatchOnly,
            _ => IsMine::No,
        }
    }

    fn is_change(&self, txout: &TxOut) -> bool {
        txout.script_pubkey == script_for(CHANGE)
    }

    fn try_decrypt_note(&self, tx: &Transaction, js: usize, n: usize, _h_sig: &Uint256) -> Option<DecryptedNote> {
        let commitment = Self::commitment_at(tx, &JsOutPoint::new(*tx.hash(), js as u64, n as u8))?;
        let (address, _) = *self.notes.read().unwrap().get(&commitment)?;
        Some(DecryptedNote {
            address,
            nullifier: self.available().then(|| Self::nullifier_for(&commitment)),
        })
    }

    fn derive_nullifier(&self, _address: &PaymentAddress, tx: &Transaction, jsop: &JsOutPoint) -> Option<Nullifier> {
        if !self.available() {
            return None;
        }
        let commitment = Self::commitment_at(tx, jsop)?;
        self.notes
            .read()
            .unwrap()
            .contains_key(&commitment)
            .then(|| Self::nullifier_for(&commitment))
    }

    fn decrypt_note_plaintext(
        &self,
        address: &PaymentAddress,
        tx: &Transaction,
        jsop: &JsOutPoint,
    ) -> Option<NotePlaintext> {
        let commitment = Self::commitment_at(tx, jsop)?;
        let notes = self.notes.read().unwrap();
        let (owner, value) = notes.get(&commitment)?;
        (owner == address).then(|| NotePlaintext {
            value: *value,
            memo: Vec::new(),
        })
    }

    fn have_spending_key(&self, _address: &PaymentAddress) -> bool {
        self.available()
    }

    fn first_key_time(&self) -> Option<i64> {
        *self.first_key_time.read().unwrap()
    }
}

/// Which write a [`FailingStore`] refuses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    /// Never fail
    Nothing,
    /// Ledger entries
    LedgerEntry,
    /// The witness cache size
    WitnessCacheSize,
    /// The best block locator
    BestBlock,
}

/// Memory store that can be told to fail one kind of write. Clones share the same contents.
#[derive(Clone)]
pub struct FailingStore {
    inner: Arc<Mutex<MemoryWalletStore>>,
    fail_on: Arc<Mutex<FailPoint>>,
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingStore {
    /// Store failing nothing yet
    pub fn new() -> Self {
        FailingStore {
            inner: Arc::new(Mutex::new(MemoryWalletStore::new())),
            fail_on: Arc::new(Mutex::new(FailPoint::Nothing)),
        }
    }

    /// Chooses which write fails from now on
    pub fn fail_on(&self, point: FailPoint) {
        *self.fail_on.lock().unwrap() = point;
    }

    /// Committed contents
    pub fn contents(&self) -> StoreContents {
        self.inner.lock().unwrap().contents().clone()
    }

    /// True while a batch is open
    pub fn in_txn(&self) -> bool {
        self.inner.lock().unwrap().in_txn()
    }

    fn check(&self, point: FailPoint, what: &'static str) -> Result<(), StoreError> {
        if *self.fail_on.lock().unwrap() == point {
            return Err(StoreError::WriteFailed(what));
        }
        Ok(())
    }
}

impl WalletStore for FailingStore {
    fn txn_begin(&mut self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().txn_begin()
    }

    fn txn_commit(&mut self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().txn_commit()
    }

    fn txn_abort(&mut self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().txn_abort()
    }

    fn write_ledger_entry(&mut self, hash: &TxHash, entry: &WalletObject) -> Result<(), StoreError> {
        self.check(FailPoint::LedgerEntry, "ledger entry")?;
        self.inner.lock().unwrap().write_ledger_entry(hash, entry)
    }

    fn erase_ledger_entry(&mut self, hash: &TxHash) -> Result<(), StoreError> {
        self.inner.lock().unwrap().erase_ledger_entry(hash)
    }

    fn write_witness_cache_size(&mut self, size: u64) -> Result<(), StoreError> {
        self.check(FailPoint::WitnessCacheSize, "witness cache size")?;
        self.inner.lock().unwrap().write_witness_cache_size(size)
    }

    fn write_best_block(&mut self, locator: &BlockLocator) -> Result<(), StoreError> {
        self.check(FailPoint::BestBlock, "best block")?;
        self.inner.lock().unwrap().write_best_block(locator)
    }
}

/// Relay that accepts everything and remembers what it saw
#[derive(Default)]
pub struct RecordingRelay {
    relayed: Mutex<Vec<TxHash>>,
}

impl RecordingRelay {
    /// Hashes relayed so far, in order
    pub fn relayed(&self) -> Vec<TxHash> {
        self.relayed.lock().unwrap().clone()
    }
}

impl TransactionRelay for RecordingRelay {
    fn relay(&self, item: &WalletObject) -> bool {
        self.relayed.lock().unwrap().push(*item.hash());
        true
    }
}

/// Ledger over `chain` and `keys` with the default configuration and a memory store
pub fn ledger_with(chain: Arc<FakeChain>, keys: Arc<FakeKeys>) -> TxLedger {
    ledger_with_store(chain, keys, Box::new(MemoryWalletStore::new()))
}

/// Ledger over `chain`, `keys` and `store` with the default configuration
pub fn ledger_with_store(
    chain: Arc<FakeChain>,
    keys: Arc<FakeKeys>,
    store: Box<dyn WalletStore + Send + Sync>,
) -> TxLedger {
    TxLedger::new(WalletConfig::default(), keys, chain, store)
}

/// Fresh ledger with its chain and keys
pub fn fake_ledger() -> (TxLedger, Arc<FakeChain>, Arc<FakeKeys>) {
    let chain = Arc::new(FakeChain::new());
    let keys = Arc::new(FakeKeys::new());
    (ledger_with(chain.clone(), keys.clone()), chain, keys)
}

/// The note at output 0 of joinsplit 0 of `tx`
pub fn first_note(tx: &Transaction) -> JsOutPoint {
    JsOutPoint::new(*tx.hash(), 0, 0)
}

/// Leaf the tree would get for `commitment`
pub fn leaf(commitment: Commitment) -> SproutNode {
    SproutNode::from(commitment)
}
