//! Credits, debits and balances. Every sum is range-checked; leaving the money range fails the whole query.

use zen_primitives::{
    error::ValueError,
    money_range,
    transaction::{OutPoint, TransactionBase, TxHash, TxIn, TxOut},
    Amount,
};

use crate::{
    error::WalletError,
    select::{CoinControl, Output},
    traits::{IsMine, IsMineFilter},
};

use super::{
    item::{cached, LedgerItem, WalletObject},
    TxLedger,
};

fn add_amount(total: Amount, value: Amount, what: &'static str) -> Result<Amount, WalletError> {
    if !money_range(value) {
        return Err(ValueError::OutOfRange(what).into());
    }
    total
        .checked_add(value)
        .filter(|sum| money_range(*sum))
        .ok_or_else(|| ValueError::OutOfRange(what).into())
}

impl TxLedger {
    /// Ownership of an output
    pub fn is_mine(&self, txout: &TxOut) -> IsMine {
        self.keys.is_mine(&txout.script_pubkey)
    }

    /// Value of `txout` if `filter` counts it as ours
    pub fn txout_credit(&self, txout: &TxOut, filter: IsMineFilter) -> Result<Amount, WalletError> {
        if !money_range(txout.value) {
            return Err(ValueError::OutOfRange("txout_credit").into());
        }
        Ok(if filter.matches(self.is_mine(txout)) {
            txout.value
        } else {
            0
        })
    }

    /// Value of the output `txin` spends if the wallet knows it and `filter` counts it as ours
    pub fn txin_debit(&self, txin: &TxIn, filter: IsMineFilter) -> Result<Amount, WalletError> {
        let Some(prev) = self
            .entries
            .get(&txin.prevout.hash)
            .and_then(|parent| parent.record().vout().get(txin.prevout.n as usize))
        else {
            return Ok(0);
        };
        self.txout_credit(prev, filter)
    }

    /// Value of our outputs `record` spends
    pub fn record_debit(&self, record: &dyn TransactionBase, filter: IsMineFilter) -> Result<Amount, WalletError> {
        record.vin().iter().try_fold(0, |total, txin| {
            add_amount(total, self.txin_debit(txin, filter)?, "debit")
        })
    }

    /// Value `record` pays to us
    pub fn record_credit(&self, record: &dyn TransactionBase, filter: IsMineFilter) -> Result<Amount, WalletError> {
        record.vout().iter().try_fold(0, |total, txout| {
            add_amount(total, self.txout_credit(txout, filter)?, "credit")
        })
    }

    /// Value `record` pays to our change addresses
    pub fn record_change(&self, record: &dyn TransactionBase) -> Result<Amount, WalletError> {
        record
            .vout()
            .iter()
            .filter(|txout| self.keys.is_change(txout))
            .try_fold(0, |total, txout| add_amount(total, txout.value, "change"))
    }

    /// Blocks until a coinbase can be spent; 0 for everything else.
    pub fn blocks_to_maturity(&self, entry: &WalletObject) -> i32 {
        if !entry.matures() {
            return 0;
        }
        let maturity = self.config.coinbase_maturity as i32 + 1;
        (maturity - self.depth_of(entry)).max(0)
    }

    /// True if `entry` is the debit side of our own transfer
    pub fn is_from_me(&self, entry: &WalletObject, filter: IsMineFilter) -> Result<bool, WalletError> {
        Ok(self.entry_debit(entry, filter)? > 0)
    }

    /// Debit of the entry for `hash`, memoized per ownership kind
    pub fn debit(&self, hash: &TxHash, filter: IsMineFilter) -> Result<Amount, WalletError> {
        self.entry_debit(self.entry(hash)?, filter)
    }

    fn entry_debit(&self, entry: &WalletObject, filter: IsMineFilter) -> Result<Amount, WalletError> {
        let record = entry.record();
        if record.vin().is_empty() {
            return Ok(0);
        }
        let cache = entry.cache();
        let mut debit = 0;
        if filter.includes(IsMineFilter::SPENDABLE) {
            let spendable = cached(&cache.debit, || self.record_debit(record, IsMineFilter::SPENDABLE))?;
            debit = add_amount(debit, spendable, "debit")?;
        }
        if filter.includes(IsMineFilter::WATCH_ONLY) {
            let watched = cached(&cache.watch_debit, || self.record_debit(record, IsMineFilter::WATCH_ONLY))?;
            debit = add_amount(debit, watched, "debit")?;
        }
        Ok(debit)
    }

    /// Credit of the entry for `hash`. Immature coinbases credit nothing yet.
    pub fn credit(&self, hash: &TxHash, filter: IsMineFilter) -> Result<Amount, WalletError> {
        self.entry_credit(self.entry(hash)?, filter)
    }

    fn entry_credit(&self, entry: &WalletObject, filter: IsMineFilter) -> Result<Amount, WalletError> {
        if self.blocks_to_maturity(entry) > 0 {
            return Ok(0);
        }
        let record = entry.record();
        let cache = entry.cache();
        let mut credit = 0;
        if filter.includes(IsMineFilter::SPENDABLE) {
            let spendable = cached(&cache.credit, || self.record_credit(record, IsMineFilter::SPENDABLE))?;
            credit = add_amount(credit, spendable, "credit")?;
        }
        if filter.includes(IsMineFilter::WATCH_ONLY) {
            let watched = cached(&cache.watch_credit, || self.record_credit(record, IsMineFilter::WATCH_ONLY))?;
            credit = add_amount(credit, watched, "credit")?;
        }
        Ok(credit)
    }

    /// Credit of a coinbase in the active chain that has not matured yet
    pub fn immature_credit(&self, hash: &TxHash, filter: IsMineFilter) -> Result<Amount, WalletError> {
        self.entry_immature_credit(self.entry(hash)?, filter)
    }

    fn entry_immature_credit(&self, entry: &WalletObject, filter: IsMineFilter) -> Result<Amount, WalletError> {
        if !(entry.matures() && self.blocks_to_maturity(entry) > 0 && self.depth_of(entry) > 0) {
            return Ok(0);
        }
        let record = entry.record();
        let cache = entry.cache();
        let mut credit = 0;
        if filter.includes(IsMineFilter::SPENDABLE) {
            let spendable = cached(&cache.immature_credit, || {
                self.record_credit(record, IsMineFilter::SPENDABLE)
            })?;
            credit = add_amount(credit, spendable, "immature_credit")?;
        }
        if filter.includes(IsMineFilter::WATCH_ONLY) {
            let watched = cached(&cache.immature_watch_credit, || {
                self.record_credit(record, IsMineFilter::WATCH_ONLY)
            })?;
            credit = add_amount(credit, watched, "immature_credit")?;
        }
        Ok(credit)
    }

    /// Credit still unspent
    pub fn available_credit(&self, hash: &TxHash, filter: IsMineFilter) -> Result<Amount, WalletError> {
        self.entry_available_credit(self.entry(hash)?, filter)
    }

    fn unspent_credit(&self, entry: &WalletObject, filter: IsMineFilter) -> Result<Amount, WalletError> {
        let hash = entry.hash();
        entry
            .record()
            .vout()
            .iter()
            .enumerate()
            .filter(|(n, _)| !self.is_spent(&OutPoint::new(*hash, *n as u32)))
            .try_fold(0, |total, (_, txout)| {
                add_amount(total, self.txout_credit(txout, filter)?, "available_credit")
            })
    }

    fn entry_available_credit(&self, entry: &WalletObject, filter: IsMineFilter) -> Result<Amount, WalletError> {
        if entry.matures() && self.blocks_to_maturity(entry) > 0 {
            return Ok(0);
        }
        let cache = entry.cache();
        let mut credit = 0;
        if filter.includes(IsMineFilter::SPENDABLE) {
            let spendable = cached(&cache.available_credit, || {
                self.unspent_credit(entry, IsMineFilter::SPENDABLE)
            })?;
            credit = add_amount(credit, spendable, "available_credit")?;
        }
        if filter.includes(IsMineFilter::WATCH_ONLY) {
            let watched = cached(&cache.available_watch_credit, || {
                self.unspent_credit(entry, IsMineFilter::WATCH_ONLY)
            })?;
            credit = add_amount(credit, watched, "available_credit")?;
        }
        Ok(credit)
    }

    /// Value the entry for `hash` pays back to our change addresses
    pub fn change(&self, hash: &TxHash) -> Result<Amount, WalletError> {
        let entry = self.entry(hash)?;
        cached(&entry.cache().change, || self.record_change(entry.record()))
    }

    /// Confirmed, or unconfirmed zero-conf change spending only our own spendable outputs.
    pub fn is_trusted(&self, entry: &WalletObject) -> Result<bool, WalletError> {
        let depth = self.depth_of(entry);
        if depth >= 1 {
            return Ok(true);
        }
        if depth < 0 {
            return Ok(false);
        }
        if !self.config.spend_zero_conf_change || !self.is_from_me(entry, IsMineFilter::ALL)? {
            return Ok(false);
        }
        Ok(entry.record().vin().iter().all(|txin| {
            self.entries
                .get(&txin.prevout.hash)
                .and_then(|parent| parent.record().vout().get(txin.prevout.n as usize))
                .is_some_and(|prev| self.is_mine(prev) == IsMine::Spendable)
        }))
    }

    fn sum_entries<F>(&self, mut amount: F) -> Result<Amount, WalletError>
    where
        F: FnMut(&WalletObject) -> Result<Amount, WalletError>,
    {
        self.entries
            .values()
            .try_fold(0, |total, entry| add_amount(total, amount(entry)?, "balance"))
    }

    fn trusted_balance(&self, filter: IsMineFilter) -> Result<Amount, WalletError> {
        self.sum_entries(|entry| {
            if self.is_trusted(entry)? {
                self.entry_available_credit(entry, filter)
            } else {
                Ok(0)
            }
        })
    }

    fn untrusted_balance(&self, filter: IsMineFilter) -> Result<Amount, WalletError> {
        self.sum_entries(|entry| {
            if !self.is_trusted(entry)? && self.depth_of(entry) == 0 {
                self.entry_available_credit(entry, filter)
            } else {
                Ok(0)
            }
        })
    }

    /// Spendable value of trusted entries
    pub fn balance(&self) -> Result<Amount, WalletError> {
        self.trusted_balance(IsMineFilter::SPENDABLE)
    }

    /// Spendable value of untrusted unconfirmed entries
    pub fn unconfirmed_balance(&self) -> Result<Amount, WalletError> {
        self.untrusted_balance(IsMineFilter::SPENDABLE)
    }

    /// Value of coinbases waiting to mature
    pub fn immature_balance(&self) -> Result<Amount, WalletError> {
        self.sum_entries(|entry| self.entry_immature_credit(entry, IsMineFilter::SPENDABLE))
    }

    /// Watch-only value of trusted entries
    pub fn watch_only_balance(&self) -> Result<Amount, WalletError> {
        self.trusted_balance(IsMineFilter::WATCH_ONLY)
    }

    /// Watch-only value of untrusted unconfirmed entries
    pub fn unconfirmed_watch_only_balance(&self) -> Result<Amount, WalletError> {
        self.untrusted_balance(IsMineFilter::WATCH_ONLY)
    }

    /// Watch-only value of coinbases waiting to mature
    pub fn immature_watch_only_balance(&self) -> Result<Amount, WalletError> {
        self.sum_entries(|entry| self.entry_immature_credit(entry, IsMineFilter::WATCH_ONLY))
    }

    /// Outputs that could be spent now.
    ///
    /// With `only_confirmed`, untrusted entries are skipped. Coinbases are skipped unless `include_coinbase`, and
    /// always while immature. Spent, locked and foreign outputs never show up; zero-value ones only with
    /// `include_zero_value`. When `coin_control` preselects outputs and forbids others, only those are listed.
    pub fn available_coins(
        &self,
        only_confirmed: bool,
        coin_control: Option<&CoinControl>,
        include_zero_value: bool,
        include_coinbase: bool,
    ) -> Result<Vec<Output>, WalletError> {
        let mut coins = Vec::new();
        for (hash, entry) in &self.entries {
            if only_confirmed && !self.is_trusted(entry)? {
                continue;
            }
            let is_coinbase = entry.record().is_coinbase();
            if is_coinbase && !include_coinbase {
                continue;
            }
            if is_coinbase && self.blocks_to_maturity(entry) > 0 {
                continue;
            }
            let depth = self.depth_of(entry);
            if depth < 0 {
                continue;
            }
            let from_me = self.is_from_me(entry, IsMineFilter::ALL)?;
            for (n, txout) in entry.record().vout().iter().enumerate() {
                let outpoint = OutPoint::new(*hash, n as u32);
                let mine = self.is_mine(txout);
                if mine == IsMine::No
                    || self.is_spent(&outpoint)
                    || self.is_locked_coin(&outpoint)
                    || (txout.value <= 0 && !include_zero_value)
                {
                    continue;
                }
                if let Some(control) = coin_control {
                    if control.has_selected() && !control.allow_other_inputs && !control.is_selected(&outpoint) {
                        continue;
                    }
                }
                let spendable = mine == IsMine::Spendable
                    || coin_control.is_some_and(|control| control.allow_watch_only && mine == IsMine::WatchOnly);
                coins.push(Output {
                    outpoint,
                    value: txout.value,
                    depth,
                    spendable,
                    is_coinbase,
                    from_me,
                });
            }
        }
        Ok(coins)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zen_primitives::{script::Script, uint::Uint256, COIN, MAX_MONEY};

    use super::*;
    use crate::testutils::{
        coinbase_paying, fake_ledger, ledger_with, spend_of, FakeChain, FakeKeys, OURS, THEIRS, WATCHED,
    };

    #[test]
    fn coinbase_matures_after_the_configured_depth() {
        let (mut ledger, chain, _keys) = fake_ledger();
        let coinbase = coinbase_paying(OURS, 50 * COIN, 1);
        let block = chain.push_block(vec![coinbase.clone()], Vec::new());
        ledger.sync_transaction(&coinbase, Some(&block)).unwrap();

        let entry = ledger.get(coinbase.hash()).unwrap();
        assert_eq!(ledger.blocks_to_maturity(entry), 100);
        assert_eq!(ledger.immature_balance().unwrap(), 50 * COIN);
        assert_eq!(ledger.balance().unwrap(), 0);
        assert_eq!(ledger.credit(coinbase.hash(), IsMineFilter::ALL).unwrap(), 0);

        chain.extend(100);
        let entry = ledger.get(coinbase.hash()).unwrap();
        assert_eq!(ledger.blocks_to_maturity(entry), 0);
        assert_eq!(ledger.immature_balance().unwrap(), 0);
        assert_eq!(ledger.balance().unwrap(), 50 * COIN);
    }

    #[test]
    fn spends_reduce_available_credit() {
        let (mut ledger, chain, _keys) = fake_ledger();
        let funding = spend_of(OutPoint::new(Uint256([8; 32]), 0), OURS, 5 * COIN);
        let block = chain.push_block(vec![funding.clone()], Vec::new());
        ledger.sync_transaction(&funding, Some(&block)).unwrap();
        assert_eq!(ledger.balance().unwrap(), 5 * COIN);

        let spend = spend_of(OutPoint::new(*funding.hash(), 0), THEIRS, 4 * COIN);
        ledger.sync_transaction(&spend, None).unwrap();
        assert_eq!(ledger.debit(spend.hash(), IsMineFilter::SPENDABLE).unwrap(), 5 * COIN);
        assert_eq!(ledger.available_credit(funding.hash(), IsMineFilter::SPENDABLE).unwrap(), 0);
        assert_eq!(ledger.balance().unwrap(), 0);
    }

    #[test]
    fn watch_only_outputs_have_their_own_balance() {
        let (mut ledger, chain, _keys) = fake_ledger();
        let tx = spend_of(OutPoint::new(Uint256([9; 32]), 0), WATCHED, 2 * COIN);
        let block = chain.push_block(vec![tx.clone()], Vec::new());
        ledger.sync_transaction(&tx, Some(&block)).unwrap();
        assert_eq!(ledger.balance().unwrap(), 0);
        assert_eq!(ledger.watch_only_balance().unwrap(), 2 * COIN);

        let coins = ledger.available_coins(true, None, false, true).unwrap();
        assert_eq!(coins.len(), 1);
        assert!(!coins[0].spendable);
        let control = CoinControl {
            allow_watch_only: true,
            ..Default::default()
        };
        assert!(ledger.available_coins(true, Some(&control), false, true).unwrap()[0].spendable);
    }

    #[test]
    fn out_of_range_outputs_fail_the_query() {
        let chain = Arc::new(FakeChain::new());
        let keys = Arc::new(FakeKeys::new());
        let mut ledger = ledger_with(chain.clone(), keys);
        let mut builder = coinbase_paying(OURS, MAX_MONEY, 1).to_mutable();
        builder.vin[0] = TxIn::new(OutPoint::new(Uint256([3; 32]), 0), Script::default());
        builder.vout.push(builder.vout[0].clone());
        let tx = builder.freeze();
        let block = chain.push_block(vec![tx.clone()], Vec::new());
        ledger.sync_transaction(&tx, Some(&block)).unwrap();
        assert!(matches!(
            ledger.balance(),
            Err(WalletError::Value(ValueError::OutOfRange(_)))
        ));
    }

    #[test]
    fn locked_coins_are_not_available() {
        let (mut ledger, chain, _keys) = fake_ledger();
        let tx = spend_of(OutPoint::new(Uint256([10; 32]), 0), OURS, COIN);
        let block = chain.push_block(vec![tx.clone()], Vec::new());
        ledger.sync_transaction(&tx, Some(&block)).unwrap();
        let outpoint = OutPoint::new(*tx.hash(), 0);
        ledger.lock_coin(outpoint);
        assert!(ledger.available_coins(true, None, false, true).unwrap().is_empty());
        ledger.unlock_coin(&outpoint);
        assert_eq!(ledger.available_coins(true, None, false, true).unwrap().len(), 1);
    }
}
