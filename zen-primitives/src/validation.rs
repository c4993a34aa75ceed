//! Context-free checks over a single record
//!
//! Every check takes the record and a [`ValidationSink`], returns `false` on the first violation it finds and
//! reports that violation to the sink with a stable reason string and a misbehaviour score. Reason strings are
//! relied upon by peers and must not change.

use std::collections::HashSet;

use crate::{
    amount::{money_range, MAX_MONEY},
    certificate::ScCertificate,
    proof::{verify_joinsplit, JoinSplitVerifier},
    transaction::{
        crosschain::CrosschainOut, OutPoint, Transaction, TransactionBase, GROTH_TX_VERSION,
        MAX_TX_SIZE, MIN_OLD_TX_VERSION, SC_TX_VERSION,
    },
    Amount,
};

/// Reject codes sent back to peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectCode {
    /// Could not be decoded
    Malformed = 0x01,
    /// Breaks a consensus rule
    Invalid = 0x10,
    /// Uses an outdated version
    Obsolete = 0x11,
    /// Already known
    Duplicate = 0x12,
    /// Breaks a relay policy rule
    Nonstandard = 0x40,
    /// Fee below the relay minimum
    InsufficientFee = 0x42,
}

/// Receives rejections from the checks.
pub trait ValidationSink {
    /// Records a rejection with misbehaviour score `level`. Always returns `false`, so checks can
    /// `return state.dos(...)`.
    fn dos(&mut self, level: u32, code: RejectCode, reason: &str) -> bool;

    /// Records a rejection that does not count against the peer.
    fn invalid(&mut self, code: RejectCode, reason: &str) -> bool {
        self.dos(0, code, reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Valid,
    Invalid,
}

/// Accumulated outcome of a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    mode: Mode,
    dos_score: u32,
    reject_code: Option<RejectCode>,
    reject_reason: String,
}

impl ValidationState {
    /// A state with nothing recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// True until a rejection is recorded
    pub fn is_valid(&self) -> bool {
        self.mode == Mode::Valid
    }

    /// True once a rejection is recorded
    pub fn is_invalid(&self) -> bool {
        self.mode == Mode::Invalid
    }

    /// Total misbehaviour score
    pub fn dos_score(&self) -> u32 {
        self.dos_score
    }

    /// Code of the last rejection
    pub fn reject_code(&self) -> Option<RejectCode> {
        self.reject_code
    }

    /// Reason of the last rejection, empty while valid
    pub fn reject_reason(&self) -> &str {
        &self.reject_reason
    }
}

impl ValidationSink for ValidationState {
    fn dos(&mut self, level: u32, code: RejectCode, reason: &str) -> bool {
        tracing::debug!(reason, level, "record rejected");
        self.mode = Mode::Invalid;
        self.dos_score = self.dos_score.saturating_add(level);
        self.reject_code = Some(code);
        self.reject_reason = reason.to_string();
        false
    }
}

/// Rejects versions below the minimum that are not one of the negative tags in use.
pub fn check_version_basic<S: ValidationSink>(tx: &Transaction, state: &mut S) -> bool {
    let version = tx.version();
    if version < MIN_OLD_TX_VERSION && version != GROTH_TX_VERSION && version != SC_TX_VERSION {
        return state.dos(100, RejectCode::Invalid, "bad-txns-version-too-low");
    }
    true
}

/// A transaction may have no transparent inputs only if it has joinsplits.
pub fn check_inputs_availability<S: ValidationSink>(tx: &Transaction, state: &mut S) -> bool {
    if tx.vin().is_empty() && tx.vjoinsplit().is_empty() {
        tracing::debug!(tx = %tx.hash(), "no inputs and no joinsplits");
        return state.dos(10, RejectCode::Invalid, "bad-txns-vin-empty");
    }
    true
}

/// A transaction may have no transparent outputs only if it has joinsplits or crosschain outputs.
pub fn check_outputs_availability<S: ValidationSink>(tx: &Transaction, state: &mut S) -> bool {
    if tx.vout().is_empty() && tx.vjoinsplit().is_empty() && tx.cc_is_null() {
        return state.dos(10, RejectCode::Invalid, "bad-txns-vout-empty");
    }
    true
}

/// Rejects records whose encoding exceeds [`MAX_TX_SIZE`].
pub fn check_serialized_size<T, S>(tx: &T, state: &mut S) -> bool
where
    T: TransactionBase + ?Sized,
    S: ValidationSink,
{
    if tx.serialized_size() > MAX_TX_SIZE {
        return state.dos(100, RejectCode::Invalid, "bad-txns-oversize");
    }
    true
}

/// True when `limit` is zero or the record has at most `limit` inputs.
pub fn check_inputs_limit<T>(tx: &T, limit: usize) -> bool
where
    T: TransactionBase + ?Sized,
{
    limit == 0 || tx.vin().len() <= limit
}

/// Output values and joinsplit `vpub_old`/`vpub_new` must be in range, with at most one `vpub` nonzero per
/// joinsplit, and the running total of value leaving must stay in range.
pub fn check_outputs_amount<T, S>(tx: &T, state: &mut S) -> bool
where
    T: TransactionBase + ?Sized,
    S: ValidationSink,
{
    let mut cumulated_value_out: Amount = 0;
    for txout in tx.vout() {
        if txout.value < 0 {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vout-negative");
        }
        if txout.value > MAX_MONEY {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vout-toolarge");
        }
        cumulated_value_out += txout.value;
        if !money_range(cumulated_value_out) {
            return state.dos(100, RejectCode::Invalid, "bad-txns-txouttotal-toolarge");
        }
    }

    for js in tx.vjoinsplit() {
        if js.vpub_old < 0 {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vpub_old-negative");
        }
        if js.vpub_new < 0 {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vpub_new-negative");
        }
        if js.vpub_old > MAX_MONEY {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vpub_old-toolarge");
        }
        if js.vpub_new > MAX_MONEY {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vpub_new-toolarge");
        }
        if js.vpub_new != 0 && js.vpub_old != 0 {
            return state.dos(100, RejectCode::Invalid, "bad-txns-vpubs-both-nonzero");
        }
        cumulated_value_out += js.vpub_old;
        if !money_range(cumulated_value_out) {
            return state.dos(100, RejectCode::Invalid, "bad-txns-txouttotal-toolarge");
        }
    }
    true
}

/// The value joinsplits claim to release into the transparent pool must stay in range. Inputs are not resolved
/// at this stage.
pub fn check_inputs_amount<T, S>(tx: &T, state: &mut S) -> bool
where
    T: TransactionBase + ?Sized,
    S: ValidationSink,
{
    let mut cumulated_value_in: Amount = 0;
    for js in tx.vjoinsplit() {
        cumulated_value_in = cumulated_value_in.saturating_add(js.vpub_new);
        if !money_range(js.vpub_new) || !money_range(cumulated_value_in) {
            return state.dos(100, RejectCode::Invalid, "bad-txns-txintotal-toolarge");
        }
    }
    true
}

/// Every crosschain output must carry a nonzero in-range amount and the cumulative amount over all three kinds
/// must stay in range.
pub fn check_crosschain_amounts<T, S>(tx: &T, state: &mut S) -> bool
where
    T: TransactionBase + ?Sized,
    S: ValidationSink,
{
    let mut cumulated: Amount = 0;
    for out in tx.vsc_ccout() {
        if !out.check_amount_range(&mut cumulated) {
            return state.dos(100, RejectCode::Invalid, "sidechain-sc-creation-amount-outside-range");
        }
    }
    for out in tx.vcl_ccout() {
        if !out.check_amount_range(&mut cumulated) {
            return state.dos(100, RejectCode::Invalid, "sidechain-certifier-lock-amount-outside-range");
        }
    }
    for out in tx.vft_ccout() {
        if !out.check_amount_range(&mut cumulated) {
            return state.dos(100, RejectCode::Invalid, "sidechain-sc-fwd-amount-outside-range");
        }
    }
    true
}

/// No prevout may be spent twice and no nullifier revealed twice within one record.
pub fn check_inputs_duplication<T, S>(tx: &T, state: &mut S) -> bool
where
    T: TransactionBase + ?Sized,
    S: ValidationSink,
{
    let mut prevouts: HashSet<&OutPoint> = HashSet::new();
    for txin in tx.vin() {
        if !prevouts.insert(&txin.prevout) {
            return state.dos(100, RejectCode::Invalid, "bad-txns-inputs-duplicate");
        }
    }

    let mut nullifiers = HashSet::new();
    for js in tx.vjoinsplit() {
        for nullifier in &js.nullifiers {
            if !nullifiers.insert(nullifier) {
                return state.dos(100, RejectCode::Invalid, "bad-joinsplits-nullifiers-duplicate");
            }
        }
    }
    true
}

/// A coinbase has no joinsplits and a 2 to 100 byte scriptSig; anything else has no null prevouts.
pub fn check_inputs_interaction<T, S>(tx: &T, state: &mut S) -> bool
where
    T: TransactionBase + ?Sized,
    S: ValidationSink,
{
    if tx.is_coinbase() {
        if !tx.vjoinsplit().is_empty() {
            return state.dos(100, RejectCode::Invalid, "bad-cb-has-joinsplits");
        }
        let script_len = tx.vin()[0].script_sig.len();
        if !(2..=100).contains(&script_len) {
            return state.dos(100, RejectCode::Invalid, "bad-cb-length");
        }
    } else if tx.vin().iter().any(|txin| txin.prevout.is_null()) {
        return state.dos(10, RejectCode::Invalid, "bad-txns-prevout-null");
    }
    true
}

/// Every context-free check except proof verification, in the order the chain applies them.
pub fn check_transaction_without_proof<S: ValidationSink>(tx: &Transaction, state: &mut S) -> bool {
    check_version_basic(tx, state)
        && check_inputs_availability(tx, state)
        && check_outputs_availability(tx, state)
        && check_serialized_size(tx, state)
        && check_outputs_amount(tx, state)
        && check_inputs_amount(tx, state)
        && check_crosschain_amounts(tx, state)
        && check_inputs_duplication(tx, state)
        && check_inputs_interaction(tx, state)
}

/// [`check_transaction_without_proof`] followed by verification of every joinsplit proof.
pub fn check_transaction<S, V>(tx: &Transaction, state: &mut S, verifier: &V) -> bool
where
    S: ValidationSink,
    V: JoinSplitVerifier + ?Sized,
{
    if !check_transaction_without_proof(tx, state) {
        return false;
    }
    for js in tx.vjoinsplit() {
        if !verify_joinsplit(js, verifier, tx.join_split_pub_key()) {
            return state.dos(100, RejectCode::Invalid, "bad-txns-joinsplit-verification-failed");
        }
    }
    true
}

/// Context-free checks for a certificate: size and output amounts.
pub fn check_certificate<S: ValidationSink>(cert: &ScCertificate, state: &mut S) -> bool {
    check_serialized_size(cert, state) && check_outputs_amount(cert, state)
}
