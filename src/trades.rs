// 2.0: trade accumulator. buffers every trade since the last MTM cycle, per party,
// so the next cycle can mark each change in position at the exact price it traded at.

use crate::types::{PartyId, Price};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A matched trade as delivered by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub buyer: PartyId,
    pub seller: PartyId,
    pub price: Price,
    // mark price at the time of the trade
    pub market_price: Price,
    // always a positive magnitude, the side decides the sign
    pub size: u64,
}

impl Trade {
    pub fn new(buyer: impl Into<PartyId>, seller: impl Into<PartyId>, price: Price, size: u64) -> Self {
        Self {
            buyer: buyer.into(),
            seller: seller.into(),
            price,
            market_price: price,
            size,
        }
    }
}

/// One party's side of a trade, signed, with the running position after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub party: PartyId,
    pub size: i64,
    pub price: Price,
    pub market_price: Price,
    pub new_size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TradeAccumulator {
    trades: BTreeMap<PartyId, Vec<TradeRecord>>,
}

impl TradeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    // 2.1: one record per side. a self-trade appends two records to the same party,
    // the second one starting from the first one's running size.
    pub fn add_trade<F>(&mut self, trade: &Trade, settled_size: F)
    where
        F: Fn(&PartyId) -> Option<i64>,
    {
        // positions are i64 everywhere downstream, a size that does not fit cannot be settled
        let size = i64::try_from(trade.size).unwrap_or_else(|_| {
            tracing::error!(buyer = %trade.buyer, seller = %trade.seller, size = trade.size, "trade size out of range");
            panic!("trade size out of range: {}", trade.size)
        });

        let buyer_size = self.running_size(&trade.buyer, &settled_size);
        self.push(TradeRecord {
            party: trade.buyer.clone(),
            size,
            price: trade.price,
            market_price: trade.market_price,
            new_size: checked_position(&trade.buyer, buyer_size.checked_add(size), buyer_size, size),
        });

        let seller_size = self.running_size(&trade.seller, &settled_size);
        self.push(TradeRecord {
            party: trade.seller.clone(),
            size: -size,
            price: trade.price,
            market_price: trade.market_price,
            new_size: checked_position(&trade.seller, seller_size.checked_sub(size), seller_size, -size),
        });
    }

    // last size seen this cycle, else the settled position, else flat
    fn running_size<F>(&self, party: &PartyId, settled_size: &F) -> i64
    where
        F: Fn(&PartyId) -> Option<i64>,
    {
        match self.trades.get(party).and_then(|records| records.last()) {
            Some(last) => last.new_size,
            None => settled_size(party).unwrap_or(0),
        }
    }

    fn push(&mut self, record: TradeRecord) {
        self.trades.entry(record.party.clone()).or_default().push(record);
    }

    pub fn has_traded(&self) -> bool {
        !self.trades.is_empty()
    }

    pub fn contains(&self, party: &PartyId) -> bool {
        self.trades.contains_key(party)
    }

    pub fn get(&self, party: &PartyId) -> Option<&[TradeRecord]> {
        self.trades.get(party).map(Vec::as_slice)
    }

    pub fn remove(&mut self, party: &PartyId) -> Option<Vec<TradeRecord>> {
        self.trades.remove(party)
    }

    // drains the whole buffer; called once at the start of every MTM cycle
    pub fn take(&mut self) -> BTreeMap<PartyId, Vec<TradeRecord>> {
        std::mem::take(&mut self.trades)
    }

    // party order, then insertion order
    pub fn records(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trades.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.trades.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn clear(&mut self) {
        self.trades.clear();
    }

    pub(crate) fn restore(records: impl IntoIterator<Item = TradeRecord>) -> Self {
        let mut acc = Self::new();
        for record in records {
            acc.push(record);
        }
        acc
    }
}

fn checked_position(party: &PartyId, new_size: Option<i64>, current: i64, size: i64) -> i64 {
    new_size.unwrap_or_else(|| {
        tracing::error!(party = %party, current, size, "running position overflows");
        panic!("running position overflows for party {party}: {current} + {size}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_positions(_: &PartyId) -> Option<i64> {
        None
    }

    #[test]
    fn records_both_sides() {
        let mut acc = TradeAccumulator::new();
        acc.add_trade(&Trade::new("alice", "bob", Price::new(1000), 3), no_positions);

        let alice = acc.get(&"alice".into()).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].size, 3);
        assert_eq!(alice[0].new_size, 3);

        let bob = acc.get(&"bob".into()).unwrap();
        assert_eq!(bob[0].size, -3);
        assert_eq!(bob[0].new_size, -3);
    }

    #[test]
    fn running_size_starts_from_settled_position() {
        let mut acc = TradeAccumulator::new();
        let settled = |party: &PartyId| (party.as_str() == "alice").then_some(10);

        acc.add_trade(&Trade::new("alice", "bob", Price::new(1000), 2), settled);
        acc.add_trade(&Trade::new("bob", "alice", Price::new(1010), 5), settled);

        let alice = acc.get(&"alice".into()).unwrap();
        assert_eq!(alice[0].new_size, 12);
        assert_eq!(alice[1].new_size, 7);
        assert_eq!(acc.get(&"bob".into()).unwrap()[1].new_size, 3);
    }

    #[test]
    fn self_trade_leaves_running_size_unchanged() {
        let mut acc = TradeAccumulator::new();
        acc.add_trade(&Trade::new("carol", "carol", Price::new(1000), 1), no_positions);

        let carol = acc.get(&"carol".into()).unwrap();
        assert_eq!(carol.len(), 2);
        assert_eq!(carol[0].new_size, 1);
        assert_eq!(carol[1].new_size, 0);
    }

    #[test]
    fn take_drains_everything() {
        let mut acc = TradeAccumulator::new();
        acc.add_trade(&Trade::new("alice", "bob", Price::new(1000), 1), no_positions);
        assert!(acc.has_traded());
        assert_eq!(acc.len(), 2);

        let drained = acc.take();
        assert_eq!(drained.len(), 2);
        assert!(!acc.has_traded());
    }

    #[test]
    fn records_iterate_in_party_order() {
        let mut acc = TradeAccumulator::new();
        acc.add_trade(&Trade::new("zed", "amy", Price::new(1), 1), no_positions);
        acc.add_trade(&Trade::new("zed", "amy", Price::new(2), 1), no_positions);

        let parties: Vec<_> = acc.records().map(|r| (r.party.as_str().to_string(), r.price.value())).collect();
        assert_eq!(
            parties,
            vec![
                ("amy".to_string(), 1),
                ("amy".to_string(), 2),
                ("zed".to_string(), 1),
                ("zed".to_string(), 2)
            ]
        );
    }

    #[test]
    #[should_panic(expected = "trade size out of range")]
    fn oversized_trade_halts() {
        let mut acc = TradeAccumulator::new();
        acc.add_trade(&Trade::new("alice", "bob", Price::new(1000), u64::MAX), no_positions);
    }

    #[test]
    #[should_panic(expected = "running position overflows for party alice")]
    fn running_position_overflow_halts() {
        let mut acc = TradeAccumulator::new();
        let settled = |party: &PartyId| (party.as_str() == "alice").then_some(i64::MAX - 1);
        acc.add_trade(&Trade::new("alice", "bob", Price::new(1000), 2), settled);
    }

    #[test]
    fn largest_short_fits() {
        let mut acc = TradeAccumulator::new();
        acc.add_trade(&Trade::new("alice", "bob", Price::new(1000), i64::MAX as u64), no_positions);
        assert_eq!(acc.get(&"bob".into()).unwrap()[0].new_size, -i64::MAX);
    }
}
