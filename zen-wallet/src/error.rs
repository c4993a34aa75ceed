//! Wallet error types

use zen_primitives::{
    error::{TreeError, ValueError},
    transaction::{OutPoint, TxHash},
    Amount,
};

/// Errors from the wallet store
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a store transaction is already open")]
    TxnActive,
    #[error("no store transaction is open")]
    NoTxn,
    #[error("failed to write {0}")]
    WriteFailed(&'static str),
    #[error("failed to commit")]
    CommitFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from ledger operations
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("insufficient funds: {target} requested")]
    InsufficientFunds {
        target: Amount,
        only_coinbase: bool,
        need_coinbase: bool,
    },
    #[error("preselected input {0} is not a wallet output")]
    InvalidPreselectedInput(OutPoint),
    #[error("no ledger entry for {0}")]
    UnknownEntry(TxHash),
    #[error("block at height {0} is not available from the chain source")]
    BlockUnavailable(i32),
    #[error("value error: {0}")]
    Value(#[from] ValueError),
    #[error("commitment tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
