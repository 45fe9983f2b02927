//! Final settlement at market expiry.

use super::core::Engine;
use super::results::{SettlementError, SettlementResult};
use crate::transfer::{Transfer, TransferType};
use crate::types::{Amount, Price, Timestamp};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

impl Engine {
    /// Settles every open position against `settlement_data`, in party order. Any product
    /// failure aborts the whole call and nothing is returned.
    pub fn settle(
        &self,
        now: Timestamp,
        settlement_data: Price,
    ) -> Result<SettlementResult, SettlementError> {
        tracing::debug!(market = %self.market, closed_at = now.as_nanos(), "settling market");
        let product = self.product();
        let asset = product.asset().to_string();

        let state = self.lock();
        let mark_price = state.last_mark_price.unwrap_or(Price::ZERO);
        let mut losses = Vec::with_capacity(state.settled_positions.len());
        let mut wins = Vec::with_capacity(state.settled_positions.len() / 2);
        // rounding left in the settlement account: dropped loss fractions reduce it,
        // dropped win fractions add to it
        let mut delta = Decimal::ZERO;

        for (party, &size) in &state.settled_positions {
            if size == 0 {
                continue;
            }
            let Some(net_position) = self.position_factor.scale_size(size) else {
                tracing::error!(market = %self.market, party = %party, size, factor = %self.position_factor, "net position out of range");
                return Err(SettlementError::NetPosition {
                    party: party.clone(),
                    size,
                });
            };
            let settled = product
                .settle(mark_price, settlement_data, net_position)
                .map_err(|source| {
                    tracing::error!(market = %self.market, party = %party, error = %source, "failed to settle position");
                    SettlementError::Product {
                        party: party.clone(),
                        source,
                    }
                })?;

            tracing::debug!(market = %self.market, party = %party, amount = %settled.amount, loss = settled.is_loss, "settled position");

            if settled.is_loss {
                losses.push(Transfer::new(party.clone(), settled.amount, asset.as_str(), TransferType::Loss));
                delta -= settled.remainder;
            } else {
                wins.push(Transfer::new(party.clone(), settled.amount, asset.as_str(), TransferType::Win));
                delta += settled.remainder;
            }
        }
        drop(state);

        let residual = if delta.is_sign_negative() {
            Amount::ZERO
        } else {
            Amount::new(delta.trunc().to_u128().unwrap_or(0))
        };

        losses.append(&mut wins);
        Ok(SettlementResult {
            transfers: losses,
            residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::FixedClock;
    use crate::config::SettlementConfig;
    use crate::engine::{Engine, SettlementError};
    use crate::events::EventCollector;
    use crate::position::Position;
    use crate::product::{CashSettledProduct, Product, ProductError, ProductSettlement};
    use crate::transfer::TransferType;
    use crate::types::{Amount, MarketId, PositionFactor, Price, Timestamp};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    struct Failing;

    impl Product for Failing {
        fn settle(&self, _: Price, _: Price, _: Decimal) -> Result<ProductSettlement, ProductError> {
            Err(ProductError::Rejected("no settlement data".to_string()))
        }

        fn asset(&self) -> &str {
            "USD"
        }
    }

    fn engine(product: Arc<dyn Product>, factor: PositionFactor) -> Engine {
        Engine::new(
            SettlementConfig::default(),
            product,
            MarketId::new("ETH/DEC24"),
            Arc::new(FixedClock::new(Timestamp::from_nanos(0))),
            Arc::new(EventCollector::new()),
            factor,
        )
    }

    #[test]
    fn losses_then_wins_in_party_order() {
        let engine = engine(Arc::new(CashSettledProduct::new("USD")), PositionFactor::ONE);
        engine.update(&[
            Position::with_open_volume("zed", 10, Price::new(1000)),
            Position::with_open_volume("bob", -4, Price::new(1000)),
            Position::with_open_volume("alice", -6, Price::new(1000)),
            Position::with_open_volume("carol", 0, Price::new(1000)),
        ]);

        let result = engine.settle(Timestamp::from_nanos(5), Price::new(1100)).unwrap();
        let parties: Vec<_> = result.transfers.iter().map(|t| t.owner.as_str()).collect();
        assert_eq!(parties, vec!["alice", "bob", "zed"]);
        assert_eq!(result.transfers[0].transfer_type, TransferType::Loss);
        assert_eq!(result.transfers[0].amount, Amount::new(600));
        assert_eq!(result.transfers[1].amount, Amount::new(400));
        assert_eq!(result.transfers[2].transfer_type, TransferType::Win);
        assert_eq!(result.transfers[2].amount, Amount::new(1000));
        assert_eq!(result.residual, Amount::ZERO);
    }

    #[test]
    fn residual_from_dropped_win_fractions() {
        // one position decimal: 1.5 and 1.5 long, 3 short, price moves 1
        let engine = engine(Arc::new(CashSettledProduct::new("USD")), PositionFactor::from_decimals(1).unwrap());
        engine.update(&[
            Position::with_open_volume("a", 15, Price::new(1000)),
            Position::with_open_volume("b", 15, Price::new(1000)),
            Position::with_open_volume("c", -30, Price::new(1000)),
        ]);

        let result = engine.settle(Timestamp::from_nanos(5), Price::new(1001)).unwrap();
        // c loses exactly 3, a and b win 1.5 each, truncated to 1
        assert_eq!(result.transfers[0].amount, Amount::new(3));
        assert_eq!(result.transfers[1].amount, Amount::ONE);
        assert_eq!(result.transfers[2].amount, Amount::ONE);
        assert_eq!(result.residual, Amount::ONE);
    }

    #[test]
    fn product_failure_aborts() {
        let engine = engine(Arc::new(Failing), PositionFactor::ONE);
        engine.update(&[Position::with_open_volume("party1", 10, Price::new(1000))]);

        let err = engine.settle(Timestamp::from_nanos(5), Price::new(1100)).unwrap_err();
        match err {
            SettlementError::Product { party, source } => {
                assert_eq!(party.as_str(), "party1");
                assert_eq!(source, ProductError::Rejected("no settlement data".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn oversized_net_position_is_an_error() {
        let factor = PositionFactor::from_decimals(-28).unwrap();
        let engine = engine(Arc::new(CashSettledProduct::new("USD")), factor);
        engine.update(&[
            Position::with_open_volume("party1", i64::MAX, Price::new(1000)),
            Position::with_open_volume("party2", i64::MIN + 1, Price::new(1000)),
        ]);

        let err = engine.settle(Timestamp::from_nanos(5), Price::new(1100)).unwrap_err();
        assert_eq!(
            err,
            SettlementError::NetPosition {
                party: "party1".into(),
                size: i64::MAX
            }
        );
        assert_eq!(engine.settled_position(&"party1".into()), Some(i64::MAX));
    }
}
