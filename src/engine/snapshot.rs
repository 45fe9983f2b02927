//! Snapshot and restore of the settlement state.

use super::core::Engine;
use crate::snapshot::{self, PartySettledPosition, SettlementState, SnapshotError, SnapshotTrade, NAMESPACE};
use crate::trades::{TradeAccumulator, TradeRecord};

impl Engine {
    pub fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    pub fn keys(&self) -> Vec<String> {
        vec![self.market.as_str().to_string()]
    }

    fn state_for(&self, key: &str) -> Result<SettlementState, SnapshotError> {
        if key != self.market.as_str() {
            return Err(SnapshotError::InvalidKey(key.to_string()));
        }
        let state = self.lock();
        Ok(SettlementState {
            market_id: self.market.clone(),
            last_mark_price: state.last_mark_price,
            last_settled_positions: state
                .settled_positions
                .iter()
                .map(|(party, &size)| PartySettledPosition {
                    party: party.clone(),
                    size,
                })
                .collect(),
            trades: state.trades.records().map(SnapshotTrade::from).collect(),
        })
    }

    /// Encoded settlement state for `key`. Equal states give equal bytes.
    pub fn get_state(&self, key: &str) -> Result<Vec<u8>, SnapshotError> {
        snapshot::encode(&self.state_for(key)?)
    }

    pub fn state_hash(&self, key: &str) -> Result<String, SnapshotError> {
        Ok(snapshot::payload_hash(&self.get_state(key)?))
    }

    // replaces everything; a payload for another market is rejected before anything changes
    pub fn load_state(&self, payload: &[u8]) -> Result<(), SnapshotError> {
        let restored = snapshot::decode(payload, self.market.as_str())?;

        let mut state = self.lock();
        state.last_mark_price = restored.last_mark_price;
        state.settled_positions = restored
            .last_settled_positions
            .into_iter()
            .map(|p| (p.party, p.size))
            .collect();
        state.trades = TradeAccumulator::restore(restored.trades.into_iter().map(TradeRecord::from));

        tracing::info!(
            market = %self.market,
            positions = state.settled_positions.len(),
            trades = state.trades.len(),
            "restored settlement state"
        );
        Ok(())
    }
}
