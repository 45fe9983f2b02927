// 6.0: win/loss distribution. MTM shares are truncated to whole units, so the losses
// collected can exceed the wins paid out by a few units. this module orders the
// transfers (losses first) and hands the leftover units back to winners so that
// total losses == total wins, exactly.

use crate::mtm::MtmShare;
use crate::position::SettledPosition;
use crate::transfer::MtmTransfer;
use crate::types::{Amount, Price};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Exact running total of decimal shares: whole units plus a fraction kept in [0, 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecimalTotal {
    whole: Amount,
    fraction: Decimal,
}

impl DecimalTotal {
    pub fn add_share(&mut self, share: &MtmShare) {
        self.whole = self.whole.add(share.amount);
        self.add_fraction(share.remainder);
    }

    pub fn add_whole(&mut self, units: Amount) {
        self.whole = self.whole.add(units);
    }

    fn add_fraction(&mut self, fraction: Decimal) {
        let sum = self.fraction + fraction;
        let carry = sum.trunc();
        self.fraction = sum - carry;
        self.whole = self.whole.add(Amount::new(carry.to_u128().unwrap_or_default()));
    }

    pub fn whole(&self) -> Amount {
        self.whole
    }

    pub fn fraction(&self) -> Decimal {
        self.fraction
    }
}

#[derive(Debug)]
pub struct WinLossDistributor {
    asset: String,
    losses: Vec<MtmTransfer>,
    wins: Vec<MtmTransfer>,
    // indices into wins: parties in the market whose win truncated to zero
    zero_shares: Vec<usize>,
    largest: Option<(usize, MtmShare)>,
    loss_total: Amount,
    win_total: Amount,
    loss_exact: DecimalTotal,
    win_exact: DecimalTotal,
}

impl WinLossDistributor {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            losses: Vec::new(),
            wins: Vec::new(),
            zero_shares: Vec::new(),
            largest: None,
            loss_total: Amount::ZERO,
            win_total: Amount::ZERO,
            loss_exact: DecimalTotal::default(),
            win_exact: DecimalTotal::default(),
        }
    }

    pub fn with_capacity(asset: impl Into<String>, capacity: usize) -> Self {
        let mut distributor = Self::new(asset);
        distributor.losses.reserve(capacity);
        distributor.wins.reserve(capacity / 2);
        distributor
    }

    // 6.1: a zero loss lands in the win bucket but never receives rounding units.
    // `holds_position` is false for potential-only parties, who are excluded from top-ups.
    pub fn push(&mut self, transfer: MtmTransfer, share: MtmShare, holds_position: bool) {
        if !share.is_loss {
            let index = self.wins.len();
            self.wins.push(transfer);
            self.win_total = self.win_total.add(share.amount);
            self.win_exact.add_share(&share);

            if holds_position && share.amount.is_zero() {
                self.zero_shares.push(index);
            }
            let beats_largest = match &self.largest {
                Some((_, largest)) => share.magnitude_cmp(largest) == Ordering::Greater,
                None => !share.is_zero_magnitude(),
            };
            if beats_largest {
                self.largest = Some((index, share));
            }
        } else if share.amount.is_zero() {
            self.wins.push(transfer);
            self.loss_exact.add_share(&share);
        } else {
            self.losses.push(transfer);
            self.loss_total = self.loss_total.add(share.amount);
            self.loss_exact.add_share(&share);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty() && self.wins.is_empty()
    }

    // 6.2: one unit to each zero win in arrival order, the rest to the largest win.
    // with no winner at all the network takes the remainder.
    pub fn finish(mut self, mark_price: Price) -> Vec<MtmTransfer> {
        if self.loss_total < self.win_total {
            self.claw_back();
            let mut transfers = self.losses;
            transfers.append(&mut self.wins);
            return transfers;
        }
        let mut delta = self.loss_total.value() - self.win_total.value();

        let mut network = MtmTransfer {
            position: SettledPosition::network(0, mark_price),
            transfer: None,
        };
        let fallback = self.largest.is_none();

        if delta != 0 {
            if !self.zero_shares.is_empty() {
                let recipients = self.zero_shares.len() + usize::from(fallback);
                self.check_rounding(recipients);

                for &index in &self.zero_shares {
                    self.wins[index].credit(Amount::ONE, &self.asset);
                    delta -= 1;
                    if delta == 0 {
                        break;
                    }
                }
                if fallback && delta != 0 {
                    network.credit(Amount::ONE, &self.asset);
                    delta -= 1;
                }
            }

            let remainder = Amount::new(delta);
            match self.largest {
                Some((index, _)) => self.wins[index].credit(remainder, &self.asset),
                None => network.credit(remainder, &self.asset),
            }
        }

        let mut transfers = self.losses;
        transfers.append(&mut self.wins);
        if !transfers.is_empty() && fallback && network.transfer.is_some() {
            transfers.push(network);
        }
        transfers
    }

    // 6.3: truncated losses can fall below the whole wins. the excess comes back out of
    // the largest win first, then the other wins in arrival order
    fn claw_back(&mut self) {
        let mut paid = DecimalTotal::default();
        paid.add_whole(self.win_total);
        if self.loss_exact < paid {
            tracing::error!(
                loss_total = %self.loss_total,
                win_total = %self.win_total,
                loss_whole = %self.loss_exact.whole(),
                loss_fraction = %self.loss_exact.fraction(),
                "MTM wins exceed losses beyond rounding"
            );
            panic!(
                "MTM wins exceed losses beyond rounding: losses {}, wins {}",
                self.loss_total, self.win_total
            );
        }

        let mut excess = self.win_total.value() - self.loss_total.value();
        let largest = self.largest.map(|(index, _)| index);
        let order = largest
            .into_iter()
            .chain((0..self.wins.len()).filter(|&i| Some(i) != largest));
        for index in order {
            if excess == 0 {
                break;
            }
            excess -= self.wins[index].debit(Amount::new(excess)).value();
        }
    }

    // the truncated wins can trail the exact losses by at most one unit per zero share
    fn check_rounding(&self, recipients: usize) {
        let mut allowance = self.win_exact;
        allowance.add_whole(Amount::new(recipients as u128));
        if self.win_exact < self.loss_exact && allowance < self.loss_exact {
            tracing::error!(
                loss_whole = %self.loss_exact.whole(),
                loss_fraction = %self.loss_exact.fraction(),
                win_whole = %self.win_exact.whole(),
                win_fraction = %self.win_exact.fraction(),
                "MTM wins trail losses beyond rounding"
            );
            panic!("there are less MTM wins than losses, even accounting for decimals");
        }
    }
}
