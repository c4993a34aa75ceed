//! Monetary amounts and their valid range

/// Amount in zatoshis. Signed so that malformed (negative) values can be represented and rejected.
pub type Amount = i64;

/// Zatoshis per coin
pub const COIN: Amount = 100_000_000;
/// One hundredth of a coin
pub const CENT: Amount = 1_000_000;
/// No amount larger than this is valid
pub const MAX_MONEY: Amount = 21_000_000 * COIN;

/// Returns true if `value` lies in `[0, MAX_MONEY]`
pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Formats an amount as `coins.zatoshis` with eight decimals.
pub fn format_money(value: Amount) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!(
        "{}{}.{:08}",
        sign,
        abs / COIN as u64,
        abs % COIN as u64
    )
}

/// Adds `value` to `total`, returning `None` if either the value or the new total leaves the money range.
pub fn checked_money_add(total: Amount, value: Amount) -> Option<Amount> {
    if !money_range(value) {
        return None;
    }
    total.checked_add(value).filter(|sum| money_range(*sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds() {
        assert!(money_range(0));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(-1));
        assert!(!money_range(MAX_MONEY + 1));
    }

    #[test]
    fn formats_eight_decimals() {
        assert_eq!(format_money(50 * COIN), "50.00000000");
        assert_eq!(format_money(COIN + 1), "1.00000001");
        assert_eq!(format_money(-CENT), "-0.01000000");
    }

    #[test]
    fn checked_add_rejects_leaving_range() {
        assert_eq!(checked_money_add(MAX_MONEY - 1, 1), Some(MAX_MONEY));
        assert_eq!(checked_money_add(MAX_MONEY, 1), None);
        assert_eq!(checked_money_add(0, -1), None);
    }
}
