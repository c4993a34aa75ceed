//! Traits for the wallet's external collaborators: the chain, the key store and the relay

use zen_primitives::{
    block::{Block, BlockHash, BlockIndex, BlockLocator},
    script::Script,
    transaction::{joinsplit::Nullifier, Transaction, TxOut},
    tree::CommitmentTree,
    uint::Uint256,
};

use crate::{
    ledger::item::WalletObject,
    note::{JsOutPoint, NotePlaintext, PaymentAddress},
};

/// Ownership of a script
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsMine {
    /// Not ours
    No,
    /// Watched without a spending key
    WatchOnly,
    /// Ours to spend
    Spendable,
}

/// Which kinds of ownership an amount query counts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IsMineFilter(u8);

impl IsMineFilter {
    /// Spendable outputs only
    pub const SPENDABLE: IsMineFilter = IsMineFilter(1);
    /// Watch-only outputs only
    pub const WATCH_ONLY: IsMineFilter = IsMineFilter(2);
    /// Both
    pub const ALL: IsMineFilter = IsMineFilter(3);

    /// True if `mine` is counted by this filter
    pub fn matches(self, mine: IsMine) -> bool {
        match mine {
            IsMine::No => false,
            IsMine::WatchOnly => self.includes(IsMineFilter::WATCH_ONLY),
            IsMine::Spendable => self.includes(IsMineFilter::SPENDABLE),
        }
    }

    /// True if every kind in `other` is counted by this filter
    pub fn includes(self, other: IsMineFilter) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A note the key store could decrypt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedNote {
    /// Receiving address
    pub address: PaymentAddress,
    /// Nullifier, when the spending key is available
    pub nullifier: Option<Nullifier>,
}

/// Read access to the active chain.
pub trait ChainView {
    /// Height of the active tip, -1 for an empty chain
    fn tip_height(&self) -> i32;

    /// Height of `hash` if it is in the active chain
    fn height_of(&self, hash: &BlockHash) -> Option<i32>;

    /// Timestamp of `hash` if the block is known
    fn block_time(&self, hash: &BlockHash) -> Option<i64>;
}

/// A chain that can also hand out blocks and tree states, for rescans.
pub trait ChainSource: ChainView {
    /// Active chain block at `height`
    fn block_at(&self, height: i32) -> Option<(BlockIndex, Block)>;

    /// Note commitment tree as it was before the block at `height`
    fn tree_before(&self, height: i32) -> Option<CommitmentTree>;

    /// Locator for the active tip
    fn locator(&self) -> BlockLocator;
}

/// Key store queries. Key encryption is the implementor's concern.
pub trait WalletKeys {
    /// Ownership of an output script
    fn is_mine(&self, script: &Script) -> IsMine;

    /// True for outputs paying our own change addresses
    fn is_change(&self, txout: &TxOut) -> bool;

    /// Tries every viewing key on output `n` of joinsplit `js`.
    fn try_decrypt_note(&self, tx: &Transaction, js: usize, n: usize, h_sig: &Uint256) -> Option<DecryptedNote>;

    /// Nullifier of a known note, `None` while the spending key is unavailable
    fn derive_nullifier(&self, address: &PaymentAddress, tx: &Transaction, jsop: &JsOutPoint) -> Option<Nullifier>;

    /// Decrypted contents of a known note
    fn decrypt_note_plaintext(
        &self,
        address: &PaymentAddress,
        tx: &Transaction,
        jsop: &JsOutPoint,
    ) -> Option<NotePlaintext>;

    /// True if we hold the spending key for `address`
    fn have_spending_key(&self, address: &PaymentAddress) -> bool;

    /// Creation time of the oldest key; blocks well before it cannot concern us.
    fn first_key_time(&self) -> Option<i64> {
        None
    }
}

/// Hands wallet records to the network.
pub trait TransactionRelay {
    /// Returns true if the record was accepted for relay
    fn relay(&self, item: &WalletObject) -> bool;
}
