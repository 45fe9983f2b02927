// 12.0 engine/core.rs: settlement engine for one market. owns the settled positions,
// the trades since the last MTM cycle and the last mark price. every mutating call takes
// the state lock for its whole duration; broker sends happen after it is released.

use crate::clock::TimeService;
use crate::config::SettlementConfig;
use crate::events::Broker;
use crate::position::MarketPosition;
use crate::product::Product;
use crate::trades::{Trade, TradeAccumulator};
use crate::types::{MarketId, PartyId, PositionFactor, Price};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/** 12.1: engine state. this is exactly what a snapshot carries */
#[derive(Debug, Default)]
pub(super) struct EngineState {
    pub(super) settled_positions: BTreeMap<PartyId, i64>,
    pub(super) trades: TradeAccumulator,
    pub(super) last_mark_price: Option<Price>,
}

impl EngineState {
    // a party seen for the first time starts flat at a zero price
    pub(super) fn current_position(&mut self, party: &PartyId, size: i64) -> (i64, Price) {
        match self.settled_positions.get(party) {
            Some(&current) => (current, self.last_mark_price.unwrap_or(Price::ZERO)),
            None => {
                self.settled_positions.insert(party.clone(), size);
                (0, Price::ZERO)
            }
        }
    }

    pub(super) fn remove_position(&mut self, party: &PartyId) {
        self.settled_positions.remove(party);
    }
}

pub struct Engine {
    pub(super) config: RwLock<SettlementConfig>,
    pub(super) product: RwLock<Arc<dyn Product>>,
    pub(super) market: MarketId,
    pub(super) time: Arc<dyn TimeService>,
    pub(super) broker: Arc<dyn Broker>,
    pub(super) position_factor: PositionFactor,
    pub(super) state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(
        config: SettlementConfig,
        product: Arc<dyn Product>,
        market: MarketId,
        time: Arc<dyn TimeService>,
        broker: Arc<dyn Broker>,
        position_factor: PositionFactor,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            product: RwLock::new(product),
            market,
            time,
            broker,
            position_factor,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market
    }

    pub fn position_factor(&self) -> PositionFactor {
        self.position_factor
    }

    pub fn config(&self) -> SettlementConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reload_conf(&self, config: SettlementConfig) {
        tracing::info!(market = %self.market, "reloading configuration");
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if current.level != config.level {
            tracing::info!(old = %current.level, new = %config.level, "updating log level");
        }
        *current = config;
    }

    pub fn update_product(&self, product: Arc<dyn Product>) {
        *self.product.write().unwrap_or_else(PoisonError::into_inner) = product;
    }

    // seeds settled positions directly, bypassing MTM. bootstrap and tests only
    pub fn update<P: MarketPosition>(&self, positions: &[P]) {
        let mut state = self.lock();
        for position in positions {
            state
                .settled_positions
                .insert(position.party().clone(), position.size());
            state.last_mark_price = Some(position.price());
        }
    }

    // 12.2: every change in position has to be marked at the exact price it traded at
    pub fn add_trade(&self, trade: &Trade) {
        let mut state = self.lock();
        let EngineState {
            settled_positions,
            trades,
            ..
        } = &mut *state;
        trades.add_trade(trade, |party| settled_positions.get(party).copied());
    }

    pub fn has_traded(&self) -> bool {
        self.lock().trades.has_traded()
    }

    // a settled position alone is not enough, the party must have traded this cycle too
    pub fn has_position(&self, party: &PartyId) -> bool {
        let state = self.lock();
        state.settled_positions.contains_key(party) && state.trades.contains(party)
    }

    pub fn settled_position(&self, party: &PartyId) -> Option<i64> {
        self.lock().settled_positions.get(party).copied()
    }

    pub fn last_mark_price(&self) -> Option<Price> {
        self.lock().last_mark_price
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn product(&self) -> Arc<dyn Product> {
        self.product.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(super) fn is_debug(&self) -> bool {
        self.config.read().unwrap_or_else(PoisonError::into_inner).level.is_debug()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("market", &self.market)
            .field("position_factor", &self.position_factor)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}
