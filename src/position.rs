// 4.0: positions. the engine never owns a caller's position; it reads one through
// MarketPosition and keeps only the size it last settled.
// 4.1 has the Position value object with entry price averaging and pnl at the bottom.

use crate::mtm::{divide_by_factor, price_to_i256, MtmShare};
use crate::types::{Amount, PartyId, PositionFactor, Price};
use ethnum::{I256, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read access to a party's position in one market, as reported by the positions engine.
pub trait MarketPosition {
    fn party(&self) -> &PartyId;
    fn size(&self) -> i64;
    // potential volume from resting orders
    fn buy(&self) -> i64;
    fn sell(&self) -> i64;
    fn price(&self) -> Price;
    fn average_entry_price(&self) -> Price;
}

/// A position with the collateral balances needed to close it out.
pub trait MarginPosition: MarketPosition {
    fn margin_balance(&self) -> Amount;
    fn general_balance(&self) -> Amount;
}

/// Owned copy of a position as it was at settlement time. carried by MTM transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledPosition {
    pub party: PartyId,
    pub size: i64,
    pub buy: i64,
    pub sell: i64,
    pub price: Price,
    pub average_entry_price: Price,
}

impl SettledPosition {
    pub fn from_position<P: MarketPosition + ?Sized>(position: &P) -> Self {
        Self {
            party: position.party().clone(),
            size: position.size(),
            buy: position.buy(),
            sell: position.sell(),
            price: position.price(),
            average_entry_price: position.average_entry_price(),
        }
    }

    // stub for the network party, always at the current mark price
    pub fn network(size: i64, mark_price: Price) -> Self {
        Self {
            party: PartyId::network(),
            size,
            buy: 0,
            sell: 0,
            price: mark_price,
            average_entry_price: Price::ZERO,
        }
    }

    // same position, re-priced at the mark it was just settled against
    pub fn at_price(&self, price: Price) -> Self {
        Self {
            price,
            ..self.clone()
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0 && self.buy == 0 && self.sell == 0
    }
}

impl MarketPosition for SettledPosition {
    fn party(&self) -> &PartyId {
        &self.party
    }

    fn size(&self) -> i64 {
        self.size
    }

    fn buy(&self) -> i64 {
        self.buy
    }

    fn sell(&self) -> i64 {
        self.sell
    }

    fn price(&self) -> Price {
        self.price
    }

    fn average_entry_price(&self) -> Price {
        self.average_entry_price
    }
}

/// Distressed party handed to the engine for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyMargin {
    pub position: SettledPosition,
    pub margin_balance: Amount,
    pub general_balance: Amount,
}

impl MarketPosition for PartyMargin {
    fn party(&self) -> &PartyId {
        &self.position.party
    }

    fn size(&self) -> i64 {
        self.position.size
    }

    fn buy(&self) -> i64 {
        self.position.buy
    }

    fn sell(&self) -> i64 {
        self.position.sell
    }

    fn price(&self) -> Price {
        self.position.price
    }

    fn average_entry_price(&self) -> Price {
        self.position.average_entry_price
    }
}

impl MarginPosition for PartyMargin {
    fn margin_balance(&self) -> Amount {
        self.margin_balance
    }

    fn general_balance(&self) -> Amount {
        self.general_balance
    }
}

// 4.1: full position record. pnl kept as a high precision decimal and as whole asset units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub party: PartyId,
    pub open_volume: i64,
    pub buy: i64,
    pub sell: i64,
    pub average_entry_price: Price,
    pub price: Price,
    pub realised_pnl: Decimal,
    pub realised_pnl_units: i128,
    pub unrealised_pnl: Decimal,
    pub unrealised_pnl_units: i128,
}

impl Position {
    pub fn new(party: impl Into<PartyId>) -> Self {
        Self {
            party: party.into(),
            open_volume: 0,
            buy: 0,
            sell: 0,
            average_entry_price: Price::ZERO,
            price: Price::ZERO,
            realised_pnl: Decimal::ZERO,
            realised_pnl_units: 0,
            unrealised_pnl: Decimal::ZERO,
            unrealised_pnl_units: 0,
        }
    }

    pub fn with_open_volume(party: impl Into<PartyId>, open_volume: i64, price: Price) -> Self {
        Self {
            open_volume,
            average_entry_price: if open_volume == 0 { Price::ZERO } else { price },
            price,
            ..Self::new(party)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open_volume == 0
    }

    pub fn with_potentials(mut self, buy: i64, sell: i64) -> Self {
        self.buy = buy;
        self.sell = sell;
        self
    }

    // 4.2: increase re-averages the entry, reduce realises, flip does both
    pub fn apply_trade(&mut self, size: i64, price: Price, factor: PositionFactor) {
        if size == 0 {
            return;
        }
        let old = self.open_volume;
        let new = old.saturating_add(size);

        if old == 0 || old.signum() == size.signum() {
            self.average_entry_price = average_entry(old, self.average_entry_price, size, price, new);
        } else {
            let closed = size.unsigned_abs().min(old.unsigned_abs());
            let per_unit = price_to_i256(price) - price_to_i256(self.average_entry_price);
            let raw = I256::from(old.signum()) * I256::from(closed) * per_unit;
            let realised = signed_decimal(raw, factor);
            self.add_realised(realised);

            self.average_entry_price = match new.signum() {
                0 => Price::ZERO,
                s if s != old.signum() => price,
                _ => self.average_entry_price,
            };
        }

        self.open_volume = new;
        self.mark_to_market(price, factor);
    }

    // 4.3: unrealised = open_volume * (mark - entry) / factor
    pub fn mark_to_market(&mut self, price: Price, factor: PositionFactor) {
        self.price = price;
        let raw = I256::from(self.open_volume)
            * (price_to_i256(price) - price_to_i256(self.average_entry_price));
        self.unrealised_pnl = signed_decimal(raw, factor);
        self.unrealised_pnl_units = to_units(self.unrealised_pnl);
    }

    fn add_realised(&mut self, amount: Decimal) {
        self.realised_pnl = self.realised_pnl.saturating_add(amount);
        self.realised_pnl_units = to_units(self.realised_pnl);
    }
}

impl MarketPosition for Position {
    fn party(&self) -> &PartyId {
        &self.party
    }

    fn size(&self) -> i64 {
        self.open_volume
    }

    fn buy(&self) -> i64 {
        self.buy
    }

    fn sell(&self) -> i64 {
        self.sell
    }

    fn price(&self) -> Price {
        self.price
    }

    fn average_entry_price(&self) -> Price {
        self.average_entry_price
    }
}

// volume weighted, truncated to whole price units
fn average_entry(old: i64, old_entry: Price, size: i64, price: Price, new: i64) -> Price {
    if new == 0 {
        return Price::ZERO;
    }
    let weighted = U256::from(old.unsigned_abs()) * U256::new(old_entry.value())
        + U256::from(size.unsigned_abs()) * U256::new(price.value());
    let (_, low) = (weighted / U256::from(new.unsigned_abs())).into_words();
    Price::new(low)
}

// pnl is bookkeeping, not a transfer: saturate rather than halt on absurd values
fn signed_decimal(raw: I256, factor: PositionFactor) -> Decimal {
    let (amount, remainder) = divide_by_factor(raw.unsigned_abs(), factor);
    let share = MtmShare {
        amount,
        remainder,
        is_loss: raw.is_negative(),
    };
    let magnitude = share
        .amount
        .to_decimal()
        .map(|whole| whole + share.remainder)
        .unwrap_or(Decimal::MAX);
    if share.is_loss {
        -magnitude
    } else {
        magnitude
    }
}

fn to_units(value: Decimal) -> i128 {
    value.trunc().to_i128().unwrap_or_default()
}
