//! Coin selection: picking wallet outputs that cover a target amount.
//!
//! The solver is a randomized approximate subset sum with an iteration budget. It is tried with stricter
//! confirmation requirements first and relaxed only when that fails.

use std::collections::BTreeSet;

use rand::{seq::SliceRandom, Rng};
use zen_primitives::{
    checked_money_add,
    error::ValueError,
    money_range,
    transaction::{OutPoint, TransactionBase},
    Amount, CENT,
};

use crate::{
    error::WalletError,
    ledger::{item::LedgerItem, TxLedger},
};

/// Caller constraints on which outputs may be used
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoinControl {
    /// Outputs the caller wants spent
    pub selected: BTreeSet<OutPoint>,
    /// Whether outputs beyond `selected` may be added
    pub allow_other_inputs: bool,
    /// Whether watch-only outputs count as spendable
    pub allow_watch_only: bool,
}

impl CoinControl {
    /// True if any output is preselected
    pub fn has_selected(&self) -> bool {
        !self.selected.is_empty()
    }

    /// True if `outpoint` is preselected
    pub fn is_selected(&self, outpoint: &OutPoint) -> bool {
        self.selected.contains(outpoint)
    }

    /// Preselects `outpoint`
    pub fn select(&mut self, outpoint: OutPoint) {
        self.selected.insert(outpoint);
    }

    /// Drops `outpoint` from the preselection
    pub fn unselect(&mut self, outpoint: &OutPoint) {
        self.selected.remove(outpoint);
    }

    /// Clears the preselection
    pub fn unselect_all(&mut self) {
        self.selected.clear();
    }
}

/// A wallet output that selection may use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Output {
    /// Where it is
    pub outpoint: OutPoint,
    /// Its value
    pub value: Amount,
    /// Confirmations of the record holding it
    pub depth: i32,
    /// We can sign for it
    pub spendable: bool,
    /// It comes from a coinbase
    pub is_coinbase: bool,
    /// The record holding it spends our own outputs
    pub from_me: bool,
}

/// Chosen outputs and the flags describing the coinbase situation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoinSelection {
    /// Outputs to spend
    pub coins: Vec<Output>,
    /// Their total value
    pub value: Amount,
    /// Only coinbase outputs were available
    pub only_coinbase: bool,
    /// The target can only be met by spending coinbase outputs
    pub need_coinbase: bool,
}

/// Fails unless `target` is a valid amount.
fn check_target(target: Amount) -> Result<(), WalletError> {
    if money_range(target) {
        Ok(())
    } else {
        Err(ValueError::OutOfRange("selection target").into())
    }
}

/// Sum of `values`, failing as soon as a value or a partial sum leaves the money range.
fn money_sum<I: IntoIterator<Item = Amount>>(values: I, what: &'static str) -> Result<Amount, WalletError> {
    values.into_iter().try_fold(0, |total, value| {
        checked_money_add(total, value).ok_or(WalletError::Value(ValueError::OutOfRange(what)))
    })
}

/// Randomized subset sum over `values`, sorted in descending order. Returns the inclusion vector of the
/// smallest total found that reaches `target`, starting from "everything" (`total_lower`).
pub fn approximate_best_subset<R: Rng + ?Sized>(
    values: &[Amount],
    total_lower: Amount,
    target: Amount,
    iterations: usize,
    rng: &mut R,
) -> (Vec<bool>, Amount) {
    let mut best = vec![true; values.len()];
    let mut best_value = total_lower;

    for _ in 0..iterations {
        if best_value == target {
            break;
        }
        let mut included = vec![false; values.len()];
        let mut total: Amount = 0;
        let mut reached_target = false;
        for pass in 0..2 {
            if reached_target {
                break;
            }
            for (i, value) in values.iter().enumerate() {
                // The first pass picks at random, the second fills in what the first left out.
                let take = if pass == 0 {
                    rng.gen_bool(0.5)
                } else {
                    !included[i]
                };
                if take {
                    total += value;
                    included[i] = true;
                    if total >= target {
                        reached_target = true;
                        if total < best_value {
                            best_value = total;
                            best.clone_from(&included);
                        }
                        total -= value;
                        included[i] = false;
                    }
                }
            }
        }
    }
    (best, best_value)
}

/// Picks outputs covering `target` among those confirmed `conf_mine` deep (records we sent) or `conf_theirs`
/// deep (everything else). Returns `None` if they cannot cover it, and an error if `target` or an eligible coin
/// lies outside the money range.
pub fn select_coins_min_conf<R: Rng + ?Sized>(
    target: Amount,
    conf_mine: i32,
    conf_theirs: i32,
    coins: &[Output],
    iterations: usize,
    rng: &mut R,
) -> Result<Option<(Vec<Output>, Amount)>, WalletError> {
    check_target(target)?;
    let mut lowest_larger: Option<Output> = None;
    let mut smaller = Vec::new();
    let mut total_lower: Amount = 0;

    let mut shuffled = coins.to_vec();
    shuffled.shuffle(rng);

    for coin in shuffled {
        if !coin.spendable {
            continue;
        }
        let required = if coin.from_me { conf_mine } else { conf_theirs };
        if coin.depth < required {
            continue;
        }
        if !money_range(coin.value) {
            return Err(ValueError::OutOfRange("selected coin").into());
        }
        if coin.value == target {
            return Ok(Some((vec![coin], coin.value)));
        } else if coin.value < target + CENT {
            smaller.push(coin);
            total_lower = money_sum([total_lower, coin.value], "selected coins")?;
        } else if lowest_larger.map_or(true, |larger| coin.value < larger.value) {
            lowest_larger = Some(coin);
        }
    }

    if total_lower == target {
        return Ok(Some((smaller, total_lower)));
    }
    if total_lower < target {
        return Ok(lowest_larger.map(|coin| (vec![coin], coin.value)));
    }

    smaller.sort_by(|a, b| b.value.cmp(&a.value));
    let values: Vec<Amount> = smaller.iter().map(|coin| coin.value).collect();
    let (mut best, mut best_value) = approximate_best_subset(&values, total_lower, target, iterations, rng);
    if best_value != target && total_lower >= target + CENT {
        (best, best_value) = approximate_best_subset(&values, total_lower, target + CENT, iterations, rng);
    }

    // A single larger coin wins if the subset missed the target by less than a cent, or is no closer.
    if let Some(larger) = lowest_larger {
        if (best_value != target && best_value < target + CENT) || larger.value <= best_value {
            return Ok(Some((vec![larger], larger.value)));
        }
    }

    let chosen: Vec<Output> = smaller
        .into_iter()
        .zip(best)
        .filter_map(|(coin, take)| take.then_some(coin))
        .collect();
    tracing::debug!(
        "selected {} coins totalling {} for target {}",
        chosen.len(),
        best_value,
        target
    );
    Ok(Some((chosen, best_value)))
}

impl TxLedger {
    /// Picks wallet outputs covering `target`, honoring `coin_control`.
    pub fn select_coins(
        &self,
        target: Amount,
        coin_control: Option<&CoinControl>,
    ) -> Result<CoinSelection, WalletError> {
        self.select_coins_with_rng(target, coin_control, &mut rand::thread_rng())
    }

    /// [`TxLedger::select_coins`] with a caller-supplied randomness source.
    ///
    /// Coinbase outputs are left out while coinbase protection is on; the result then reports whether only
    /// coinbase outputs were available and whether they would have been needed. Preselected outputs are always
    /// part of the result, and with `allow_other_inputs` off they are the whole result. Selection is tried with
    /// confirmations (1 mine, 6 theirs), then (1, 1), then (0, 1) if spending zero-conf change is allowed.
    pub fn select_coins_with_rng<R: Rng + ?Sized>(
        &self,
        target: Amount,
        coin_control: Option<&CoinControl>,
        rng: &mut R,
    ) -> Result<CoinSelection, WalletError> {
        check_target(target)?;
        let without_coinbase = self.available_coins(true, coin_control, false, false)?;
        let with_coinbase = self.available_coins(true, coin_control, false, true)?;
        let only_coinbase = without_coinbase.is_empty() && !with_coinbase.is_empty();

        let protect_coinbase = self.config().coinbase_must_be_protected;
        let mut coins = if protect_coinbase {
            without_coinbase.clone()
        } else {
            with_coinbase.clone()
        };

        let mut need_coinbase = false;
        if protect_coinbase && with_coinbase.len() > without_coinbase.len() {
            let spendable_value = |outputs: &[Output]| {
                money_sum(
                    outputs.iter().filter(|coin| coin.spendable).map(|coin| coin.value),
                    "spendable coins",
                )
            };
            if spendable_value(&without_coinbase)? <= target {
                need_coinbase = spendable_value(&with_coinbase)? >= target;
            }
        }
        let insufficient = WalletError::InsufficientFunds {
            target,
            only_coinbase,
            need_coinbase,
        };

        if let Some(control) = coin_control.filter(|control| control.has_selected() && !control.allow_other_inputs)
        {
            let chosen: Vec<Output> = coins.into_iter().filter(|coin| coin.spendable).collect();
            let value = money_sum(chosen.iter().map(|coin| coin.value), "preselected coins")?;
            tracing::debug!("using {} preselected coins", control.selected.len());
            if value < target {
                return Err(insufficient);
            }
            return Ok(CoinSelection {
                coins: chosen,
                value,
                only_coinbase,
                need_coinbase,
            });
        }

        let mut preset = Vec::new();
        if let Some(control) = coin_control {
            for outpoint in &control.selected {
                let entry = self
                    .get(&outpoint.hash)
                    .ok_or(WalletError::InvalidPreselectedInput(*outpoint))?;
                let txout = entry
                    .record()
                    .vout()
                    .get(outpoint.n as usize)
                    .ok_or(WalletError::InvalidPreselectedInput(*outpoint))?;
                preset.push(Output {
                    outpoint: *outpoint,
                    value: txout.value,
                    depth: self.depth_of(entry),
                    spendable: true,
                    is_coinbase: entry.record().is_coinbase(),
                    from_me: false,
                });
            }
            coins.retain(|coin| !control.is_selected(&coin.outpoint));
        }
        let preset_value = money_sum(preset.iter().map(|coin| coin.value), "preselected coins")?;

        let remaining = target - preset_value;
        let iterations = self.config().coin_selection_iterations;
        let passes = [
            (1, 6, true),
            (1, 1, true),
            (0, 1, self.config().spend_zero_conf_change),
        ];
        let mut selected = None;
        if remaining <= 0 {
            selected = Some((Vec::new(), 0));
        } else {
            for (conf_mine, conf_theirs, enabled) in passes {
                if !enabled {
                    continue;
                }
                selected = select_coins_min_conf(remaining, conf_mine, conf_theirs, &coins, iterations, rng)?;
                if selected.is_some() {
                    break;
                }
            }
        }
        let Some((mut chosen, value)) = selected else {
            return Err(insufficient);
        };
        chosen.extend(preset);
        Ok(CoinSelection {
            coins: chosen,
            value: money_sum([value, preset_value], "selected coins")?,
            only_coinbase,
            need_coinbase,
        })
    }
}
