// 3.0: mark-to-market math. pure functions, no engine state.
// raw products are computed in 256-bit signed integers so u128 prices times i64
// sizes can never overflow; only the final division by the position factor
// brings the result back into the u128 amount domain.

use crate::trades::TradeRecord;
use crate::types::{Amount, PositionFactor, Price};
use ethnum::{I256, U256};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// A party's cash delta for one settlement cycle, split into the truncated
/// integer amount and the fractional remainder lost by truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtmShare {
    pub amount: Amount,
    pub remainder: Decimal,
    pub is_loss: bool,
}

impl MtmShare {
    pub fn zero() -> Self {
        Self {
            amount: Amount::ZERO,
            remainder: Decimal::ZERO,
            is_loss: false,
        }
    }

    // compares the full decimal magnitude: integer part first, then remainder
    pub fn magnitude_cmp(&self, other: &MtmShare) -> Ordering {
        self.amount
            .cmp(&other.amount)
            .then_with(|| self.remainder.cmp(&other.remainder))
    }

    pub fn is_zero_magnitude(&self) -> bool {
        self.amount.is_zero() && self.remainder.is_zero()
    }
}

pub(crate) fn price_to_i256(price: Price) -> I256 {
    U256::new(price.value()).as_i256()
}

// 3.1: delta = V * (P_new - P_old) + sum(s_i * (P_new - p_i)), divided by the position factor
pub fn calculate_mtm(
    mark_price: Price,
    last_price: Price,
    size: i64,
    trades: &[TradeRecord],
    factor: PositionFactor,
) -> MtmShare {
    let mark = price_to_i256(mark_price);
    let mut raw = I256::from(size) * (mark - price_to_i256(last_price));

    for trade in trades {
        raw += I256::from(trade.size) * (mark - price_to_i256(trade.price));
    }

    share_from_raw(raw, factor)
}

// 3.2: per-party funding cash flow is -open_volume * funding_payment / factor
pub fn calculate_funding_flow(size: i64, funding_payment: i128, factor: PositionFactor) -> MtmShare {
    let raw = -(I256::from(size) * I256::new(funding_payment));
    share_from_raw(raw, factor)
}

fn share_from_raw(raw: I256, factor: PositionFactor) -> MtmShare {
    let (amount, remainder) = divide_by_factor(raw.unsigned_abs(), factor);
    MtmShare {
        amount,
        remainder,
        is_loss: raw.is_negative(),
    }
}

/// Exact division of an integer magnitude by the position factor.
/// Returns the quotient truncated toward zero and the fractional remainder in [0, 1).
///
/// Panics if the quotient does not fit an `Amount`: no real ledger can hold it,
/// and every node hits the same panic for the same input.
pub fn divide_by_factor(raw: U256, factor: PositionFactor) -> (Amount, Decimal) {
    let value = factor.value();
    let mantissa = U256::new(value.mantissa().unsigned_abs());
    let scale = U256::new(10u128.pow(value.scale()));

    // raw / (m / 10^s) == raw * 10^s / m, split so the multiply cannot overflow
    let whole = raw / mantissa;
    let rest = (raw % mantissa) * scale;
    let quotient = whole
        .checked_mul(scale)
        .and_then(|q| q.checked_add(rest / mantissa));
    let remainder = rest % mantissa;

    let amount = match quotient.map(|q| q.into_words()) {
        Some((0, low)) => Amount::new(low),
        _ => panic!("settlement amount out of range: {} / {}", raw, value),
    };

    (amount, fraction(remainder, mantissa))
}

// numerator < denominator <= 2^96, both fit a Decimal mantissa
fn fraction(numerator: U256, denominator: U256) -> Decimal {
    if numerator == U256::ZERO {
        return Decimal::ZERO;
    }
    let (_, num) = numerator.into_words();
    let (_, den) = denominator.into_words();
    Decimal::from_i128_with_scale(num as i128, 0) / Decimal::from_i128_with_scale(den as i128, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(size: i64, price: u128) -> TradeRecord {
        TradeRecord {
            party: "p".into(),
            size,
            price: Price::new(price),
            market_price: Price::new(price),
            new_size: size,
        }
    }

    #[test]
    fn long_profits_when_price_rises() {
        let share = calculate_mtm(Price::new(1100), Price::new(1000), 10, &[], PositionFactor::ONE);
        assert_eq!(share.amount, Amount::new(1000));
        assert!(!share.is_loss);
        assert_eq!(share.remainder, Decimal::ZERO);
    }

    #[test]
    fn short_loses_when_price_rises() {
        let share = calculate_mtm(Price::new(1100), Price::new(1000), -10, &[], PositionFactor::ONE);
        assert_eq!(share.amount, Amount::new(1000));
        assert!(share.is_loss);
    }

    #[test]
    fn trades_marked_at_their_own_price() {
        // long 5 from 1000, bought 3 more at 1050, mark moves to 1100
        // 5 * 100 + 3 * 50 = 650
        let share = calculate_mtm(
            Price::new(1100),
            Price::new(1000),
            5,
            &[trade(3, 1050)],
            PositionFactor::ONE,
        );
        assert_eq!(share.amount, Amount::new(650));
        assert!(!share.is_loss);
    }

    #[test]
    fn trade_flips_sign_of_delta() {
        // short 1 from 1000 loses 100, but bought 4 at 900 which gains 800
        let share = calculate_mtm(
            Price::new(1100),
            Price::new(1000),
            -1,
            &[trade(4, 900)],
            PositionFactor::ONE,
        );
        assert_eq!(share.amount, Amount::new(700));
        assert!(!share.is_loss);
    }

    #[test]
    fn position_factor_truncates_with_remainder() {
        let factor = PositionFactor::from_decimals(1).unwrap();
        // 7 * 3 / 10 = 2.1
        let share = calculate_mtm(Price::new(1003), Price::new(1000), 7, &[], factor);
        assert_eq!(share.amount, Amount::new(2));
        assert_eq!(share.remainder, dec!(0.1));
    }

    #[test]
    fn fractional_factor_multiplies() {
        let factor = PositionFactor::from_decimals(-2).unwrap();
        let (amount, rem) = divide_by_factor(U256::new(7), factor);
        assert_eq!(amount, Amount::new(700));
        assert_eq!(rem, Decimal::ZERO);
    }

    #[test]
    fn non_power_of_ten_factor() {
        let factor = PositionFactor::new(dec!(2.5)).unwrap();
        // 7 / 2.5 = 2.8
        let (amount, rem) = divide_by_factor(U256::new(7), factor);
        assert_eq!(amount, Amount::new(2));
        assert_eq!(rem, dec!(0.8));
    }

    #[test]
    fn extreme_sizes_do_not_overflow() {
        // |i64::MIN| * 2^64 == 2^127, past i128::MAX but inside u128
        let share = calculate_mtm(
            Price::new(1u128 << 64),
            Price::ZERO,
            i64::MIN,
            &[],
            PositionFactor::ONE,
        );
        assert_eq!(share.amount, Amount::new(1u128 << 127));
        assert!(share.is_loss);

        let share = calculate_mtm(
            Price::ZERO,
            Price::new(u128::MAX >> 63),
            i64::MAX,
            &[trade(i64::MAX, u128::MAX >> 63)],
            PositionFactor::from_decimals(18).unwrap(),
        );
        assert!(share.is_loss);
    }

    #[test]
    #[should_panic(expected = "settlement amount out of range")]
    fn amount_past_u128_is_fatal() {
        calculate_mtm(Price::new(u128::MAX), Price::ZERO, i64::MAX, &[], PositionFactor::ONE);
    }

    #[test]
    fn funding_flow_sign() {
        // longs pay a positive funding payment
        let long = calculate_funding_flow(10, 5, PositionFactor::ONE);
        assert!(long.is_loss);
        assert_eq!(long.amount, Amount::new(50));

        let short = calculate_funding_flow(-10, 5, PositionFactor::ONE);
        assert!(!short.is_loss);
        assert_eq!(short.amount, Amount::new(50));
    }

    #[test]
    fn magnitude_ordering() {
        let a = MtmShare { amount: Amount::new(2), remainder: dec!(0.1), is_loss: false };
        let b = MtmShare { amount: Amount::new(2), remainder: dec!(0.5), is_loss: false };
        assert_eq!(a.magnitude_cmp(&b), Ordering::Less);
        assert!(MtmShare::zero().is_zero_magnitude());
    }
}
