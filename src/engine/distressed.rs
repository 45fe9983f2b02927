//! Distressed party removal.

use super::core::Engine;
use crate::events::{Event, EventPayload, SettleDistressedEvent};
use crate::position::MarginPosition;

impl Engine {
    /// Drops everything held for parties being closed out. One settle-distressed event
    /// per party, even when nothing was held for it.
    pub fn remove_distressed<M: MarginPosition>(&self, parties: &[M]) {
        let now = self.time.get_time_now();
        let mut events = Vec::with_capacity(parties.len());
        {
            let mut state = self.lock();
            for party in parties {
                let key = party.party();
                let margin = party.margin_balance().add(party.general_balance());
                tracing::debug!(market = %self.market, party = %key, margin = %margin, "removing distressed party");

                events.push(Event::new(
                    now,
                    EventPayload::SettleDistressed(SettleDistressedEvent {
                        market_id: self.market.clone(),
                        party: key.clone(),
                        price: party.price(),
                        margin,
                    }),
                ));
                state.remove_position(key);
                state.trades.remove(key);
            }
        }
        self.broker.send_batch(events);
    }
}
