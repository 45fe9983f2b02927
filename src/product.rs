// 7.0: product capability. the engine does not know how a product values a
// position at expiry; it hands over the last mark, the settlement data and the
// net position (already in market precision) and gets back a signed amount.

use crate::types::{Amount, Price};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSettlement {
    pub amount: Amount,
    pub is_loss: bool,
    // fraction of a unit lost when truncating the amount
    pub remainder: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("settlement amount overflows for price {price} and position {position}")]
    Overflow { price: Price, position: Decimal },

    #[error("product rejected settlement: {0}")]
    Rejected(String),
}

pub trait Product: Send + Sync {
    fn settle(
        &self,
        mark_price: Price,
        settlement_data: Price,
        net_position: Decimal,
    ) -> Result<ProductSettlement, ProductError>;

    fn asset(&self) -> &str;
}

/// Cash settled future or perpetual: pays |settlement - mark| per unit of position.
#[derive(Debug, Clone)]
pub struct CashSettledProduct {
    asset: String,
}

impl CashSettledProduct {
    pub fn new(asset: impl Into<String>) -> Self {
        Self { asset: asset.into() }
    }
}

impl Product for CashSettledProduct {
    fn settle(
        &self,
        mark_price: Price,
        settlement_data: Price,
        net_position: Decimal,
    ) -> Result<ProductSettlement, ProductError> {
        let overflow = || ProductError::Overflow {
            price: settlement_data,
            position: net_position,
        };

        let (per_unit, mut is_loss) = if settlement_data >= mark_price {
            (settlement_data.value() - mark_price.value(), false)
        } else {
            (mark_price.value() - settlement_data.value(), true)
        };
        if net_position.is_sign_negative() && !net_position.is_zero() {
            is_loss = !is_loss;
        }

        let per_unit = Amount::new(per_unit).to_decimal().ok_or_else(overflow)?;
        let value = net_position.abs().checked_mul(per_unit).ok_or_else(overflow)?;
        let whole = value.trunc();

        tracing::debug!(
            mark_price = %mark_price,
            settlement_data = %settlement_data,
            net_position = %net_position,
            value = %value,
            "product settlement"
        );

        Ok(ProductSettlement {
            amount: Amount::new(whole.to_u128().ok_or_else(overflow)?),
            is_loss,
            remainder: value - whole,
        })
    }

    fn asset(&self) -> &str {
        &self.asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_wins_when_settlement_above_mark() {
        let product = CashSettledProduct::new("ETH");
        let out = product.settle(Price::new(1000), Price::new(1100), dec!(10)).unwrap();
        assert_eq!(out.amount, Amount::new(1000));
        assert!(!out.is_loss);
        assert_eq!(out.remainder, Decimal::ZERO);
    }

    #[test]
    fn short_loses_when_settlement_above_mark() {
        let product = CashSettledProduct::new("ETH");
        let out = product.settle(Price::new(1000), Price::new(1100), dec!(-5)).unwrap();
        assert_eq!(out.amount, Amount::new(500));
        assert!(out.is_loss);
    }

    #[test]
    fn fractional_position_keeps_remainder() {
        let product = CashSettledProduct::new("ETH");
        let out = product.settle(Price::new(1000), Price::new(997), dec!(0.25)).unwrap();
        assert_eq!(out.amount, Amount::ZERO);
        assert_eq!(out.remainder, dec!(0.75));
        assert!(out.is_loss);
    }

    #[test]
    fn overflow_is_an_error() {
        let product = CashSettledProduct::new("ETH");
        let err = product.settle(Price::ZERO, Price::new(u128::MAX), dec!(1)).unwrap_err();
        assert!(matches!(err, ProductError::Overflow { .. }));
        assert_eq!(product.asset(), "ETH");
    }
}
