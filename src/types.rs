// 1.0: primitives shared by every settlement path. ids, prices, amounts, timestamps,
// the position factor. each is a newtype so a price never ends up where an amount belongs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// synthetic counterparty for forced close-outs of distressed parties
pub const NETWORK_PARTY: &str = "network";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ordered by id: final settlement walks parties alphabetically
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn network() -> Self {
        Self(NETWORK_PARTY.to_string())
    }

    pub fn is_network(&self) -> bool {
        self.0 == NETWORK_PARTY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PartyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 1.1: price in asset units. unsigned, zero means "never marked".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u128);

impl Price {
    pub const ZERO: Price = Price(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<u128> for Price {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.2: transfer amount in asset units. always a magnitude, the transfer type carries direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const ONE: Amount = Amount(1);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    // totals past u128 cannot come from real balances; treat as a broken ledger
    pub fn add(&self, other: Amount) -> Self {
        match self.0.checked_add(other.0) {
            Some(sum) => Self(sum),
            None => panic!("amount overflow: {} + {}", self.0, other.0),
        }
    }

    pub fn saturating_sub(&self, other: Amount) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::try_from_i128_with_scale(i128::try_from(self.0).ok()?, 0).ok()
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: nanosecond timestamp, as handed out by the time service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }
}

// 1.4: position factor. 10^position_decimals, converts integer volume into
const MAX_DECIMALS: u32 = 28;

// the market's decimal precision. always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFactor(Decimal);

impl PositionFactor {
    pub const ONE: PositionFactor = PositionFactor(Decimal::ONE);

    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value.normalize()))
        } else {
            None
        }
    }

    // negative decimals are allowed: -2 gives 0.01. beyond 28 either way there is no
    // decimal to hold the factor
    #[must_use]
    pub fn from_decimals(position_decimals: i32) -> Option<Self> {
        let exponent = position_decimals.unsigned_abs();
        if exponent > MAX_DECIMALS {
            return None;
        }
        if position_decimals >= 0 {
            Some(Self(Decimal::from_i128_with_scale(10i128.pow(exponent), 0)))
        } else {
            Some(Self(Decimal::new(1, exponent)))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    // integer volume expressed in market precision. None when a tiny factor pushes
    // it past what a decimal can hold
    pub fn scale_size(&self, size: i64) -> Option<Decimal> {
        Decimal::from(size).checked_div(self.0)
    }
}

impl Default for PositionFactor {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for PositionFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
