//! Error types for record construction and aggregation

use crate::transaction::OutPoint;

/// Errors from summing record values
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("{0}: value out of range")]
    OutOfRange(&'static str),
    #[error("input {0} could not be resolved")]
    MissingInput(OutPoint),
}

/// Errors from the note commitment tree
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("commitment tree is full")]
    Full,
}

/// Errors from interpreting output scripts
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script carries no pay-to-pubkey-hash destination")]
    NoPubKeyHash,
}
