#![warn(missing_docs)]
//! Wallet ledger for Zen records
//!
//! Entrypoint: [`crate::wallet::Wallet`], a shared handle over [`crate::ledger::TxLedger`].
//!
//! Terminology:
//! Entry - a transaction or certificate the wallet keeps, with its block linkage and cached amounts.
//! Spend key - what an entry consumes: a transparent prevout or a shielded nullifier.
//! Conflicted - an unconfirmed entry that lost one of its spend keys to another spender (depth -1).
//! Witness cache - per-note witnesses for the last blocks, newest first, so shallow reorganizations unwind cheaply.

pub mod error;
pub mod ledger;
pub mod note;
pub mod select;
pub mod store;
pub mod traits;
pub mod wallet;

#[cfg(any(test, feature = "test-elevation"))]
pub mod testutils;
