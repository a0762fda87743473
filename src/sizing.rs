use rust_decimal::Decimal;

/// Smallest size worth suggesting. Polymarket rejects orders below $1 notional.
pub const MIN_SUGGESTED_USD: Decimal = Decimal::ONE;

/// Suggested follower size for a trade of `observed_usd` by a trader with
/// `reference_bankroll`, scaled to `your_bankroll` and floored at $1.
///
/// A non-positive reference bankroll yields the floor. Overflow saturates.
pub fn suggested_size(
    observed_usd: Decimal,
    reference_bankroll: Decimal,
    your_bankroll: Decimal,
) -> Decimal {
    if reference_bankroll <= Decimal::ZERO {
        return MIN_SUGGESTED_USD;
    }
    let proportional = observed_usd
        .checked_mul(your_bankroll)
        .and_then(|v| v.checked_div(reference_bankroll))
        .unwrap_or(if observed_usd.is_sign_negative() != your_bankroll.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        });
    proportional.max(MIN_SUGGESTED_USD)
}

/// Share of the trader's bankroll committed by this trade, in percent.
pub fn bankroll_share_pct(observed_usd: Decimal, reference_bankroll: Decimal) -> Decimal {
    if reference_bankroll <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    observed_usd
        .checked_div(reference_bankroll)
        .and_then(|v| v.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn proportional_above_floor() {
        // 25800 trader bankroll, 50 follower bankroll
        let s = suggested_size(dec!(1032), dec!(25800), dec!(50));
        assert_eq!(s, dec!(2));
    }

    #[test]
    fn floor_applies_to_small_trades() {
        assert_eq!(suggested_size(dec!(10), dec!(25800), dec!(50)), dec!(1));
        assert_eq!(suggested_size(Decimal::ZERO, dec!(100), dec!(50)), dec!(1));
    }

    #[test]
    fn zero_reference_bankroll_is_floor() {
        for x in [dec!(0), dec!(5), dec!(1000000)] {
            for y in [dec!(0), dec!(50), dec!(99999)] {
                assert_eq!(suggested_size(x, Decimal::ZERO, y), dec!(1));
            }
        }
        assert_eq!(suggested_size(dec!(500), dec!(-10), dec!(50)), dec!(1));
    }

    #[test]
    fn monotonic_in_observed_size() {
        let mut prev = Decimal::ZERO;
        let mut usd = Decimal::ZERO;
        while usd <= dec!(20000) {
            let s = suggested_size(usd, dec!(25800), dec!(50));
            assert!(s >= prev, "size decreased at {usd}");
            assert!(s >= dec!(1));
            prev = s;
            usd += dec!(137.5);
        }
    }

    #[test]
    fn overflow_saturates() {
        let s = suggested_size(Decimal::MAX, dec!(0.0001), Decimal::MAX);
        assert_eq!(s, Decimal::MAX);
    }

    #[test]
    fn share_pct() {
        assert_eq!(bankroll_share_pct(dec!(258), dec!(25800)), dec!(1));
        assert_eq!(bankroll_share_pct(dec!(258), Decimal::ZERO), Decimal::ZERO);
    }
}
