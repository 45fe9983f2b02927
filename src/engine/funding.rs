//! Funding settlement for perpetuals.

use super::core::Engine;
use super::results::FundingResult;
use crate::mtm::calculate_funding_flow;
use crate::position::{MarketPosition, SettledPosition};
use crate::transfer::{MtmTransfer, Transfer, TransferType};
use crate::types::Amount;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

impl Engine {
    /// Turns one funding payment into per-party flows of `-size * funding_payment / factor`.
    /// Losses first, then wins. The residual is what rounding leaves in the settlement account.
    pub fn settle_funding_period<P: MarketPosition>(
        &self,
        positions: &[P],
        funding_payment: i128,
    ) -> FundingResult {
        if funding_payment == 0 || positions.is_empty() {
            return FundingResult::default();
        }
        let asset = self.product().asset().to_string();
        let debug = self.is_debug();

        let mut losses = Vec::with_capacity(positions.len());
        let mut wins = Vec::with_capacity(positions.len());
        let mut zero = Vec::with_capacity(positions.len() / 2);
        let (mut total_loss, mut total_win) = (Amount::ZERO, Amount::ZERO);
        let mut delta = Decimal::ZERO;

        for position in positions {
            let flow = calculate_funding_flow(position.size(), funding_payment, self.position_factor);
            if flow.is_loss {
                delta -= flow.remainder;
            } else {
                delta += flow.remainder;
            }

            let settled = SettledPosition::from_position(position);
            if flow.amount.is_zero() {
                let transfer = Transfer::new(settled.party.clone(), Amount::ZERO, asset.as_str(), TransferType::PerpFundingWin);
                zero.push(MtmTransfer {
                    position: settled,
                    transfer: Some(transfer),
                });
            } else if flow.is_loss {
                total_loss = total_loss.add(flow.amount);
                losses.push(MtmTransfer::from_share(settled, &flow, &asset, TransferType::PerpFundingWin, TransferType::PerpFundingLoss));
            } else {
                total_win = total_win.add(flow.amount);
                wins.push(MtmTransfer::from_share(settled, &flow, &asset, TransferType::PerpFundingWin, TransferType::PerpFundingLoss));
            }

            if debug {
                tracing::debug!(market = %self.market, party = %position.party(), flow = %flow.amount, loss = flow.is_loss, "funding flow");
            }
        }

        // the winning side may not add up to a single unit
        if wins.is_empty() {
            wins = zero;
        }

        let residual = if total_loss <= total_win {
            Amount::new(delta.abs().trunc().to_u128().unwrap_or(0))
        } else {
            let round = total_loss.saturating_sub(total_win);
            let explained = delta.ceil().abs().to_u128().unwrap_or(u128::MAX);
            if explained < round.value() {
                tracing::error!(
                    market = %self.market,
                    loss_win_delta = %round,
                    rounding_delta = %delta.abs(),
                    "excess funding loss cannot be explained by rounding"
                );
                panic!("excess loss transfer amount found, cannot be explained by rounding");
            }
            round
        };

        losses.append(&mut wins);
        FundingResult {
            transfers: losses,
            residual,
        }
    }
}
