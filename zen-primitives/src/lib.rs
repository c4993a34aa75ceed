#![warn(missing_docs)]
//! Value-transfer records and their context-free validation
//!
//! Entrypoints: [`crate::transaction::Transaction`], [`crate::certificate::ScCertificate`] and the
//! checks in [`crate::validation`].
//!
//! Terminology:
//! Record - a transaction or a sidechain certificate, anything that moves value.
//! Value pool - the shielded pool joinsplits move value into (`vpub_old`) and out of (`vpub_new`).
//! Crosschain output - value leaving the main ledger towards a sidechain (creation, certifier lock, forward transfer).
//! Backward transfer - value returning from a sidechain as an ordinary pay-to-pubkey-hash output.

pub mod amount;
pub mod block;
pub mod certificate;
pub mod coins;
pub mod error;
pub mod proof;
pub mod script;
pub(crate) mod serialize;
pub mod transaction;
pub mod tree;
pub mod uint;
pub mod validation;

pub use amount::{checked_money_add, money_range, Amount, CENT, COIN, MAX_MONEY};
pub use uint::{Uint160, Uint256};
