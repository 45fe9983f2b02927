// 9.0: events emitted to the broker. every settled party gets a settle-position event,
// every distressed party a settle-distressed event. the broker is fire-and-forget.

use crate::trades::TradeRecord;
use crate::types::{Amount, MarketId, PartyId, PositionFactor, Price, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(timestamp: Timestamp, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn party(&self) -> &PartyId {
        match &self.payload {
            EventPayload::SettlePosition(e) => &e.party,
            EventPayload::SettleDistressed(e) => &e.party,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SettlePosition(SettlePositionEvent),
    SettleDistressed(SettleDistressedEvent),
}

/// A single trade as it was marked: signed size, trade price, mark at trade time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSettlement {
    pub size: i64,
    pub price: Price,
    pub market_price: Price,
}

impl From<&TradeRecord> for TradeSettlement {
    fn from(record: &TradeRecord) -> Self {
        Self {
            size: record.size,
            price: record.price,
            market_price: record.market_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePositionEvent {
    pub market_id: MarketId,
    pub party: PartyId,
    pub price: Price,
    pub trades: Vec<TradeSettlement>,
    pub position_factor: PositionFactor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleDistressedEvent {
    pub market_id: MarketId,
    pub party: PartyId,
    pub price: Price,
    // margin + general balance, the basis the party is closed out on
    pub margin: Amount,
}

pub trait Broker: Send + Sync {
    fn send(&self, event: Event);
    fn send_batch(&self, events: Vec<Event>);
}

/// In-memory broker. keeps every event in the order it was sent.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<Event>>,
    batches: Mutex<usize>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn batch_count(&self) -> usize {
        *self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.batches.lock().unwrap_or_else(PoisonError::into_inner) = 0;
    }
}

impl Broker for EventCollector {
    fn send(&self, event: Event) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    fn send_batch(&self, events: Vec<Event>) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).extend(events);
        *self.batches.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}
