//! Mark-to-market settlement.

use super::core::Engine;
use crate::distribution::WinLossDistributor;
use crate::events::{Event, EventPayload, SettlePositionEvent, TradeSettlement};
use crate::mtm::calculate_mtm;
use crate::position::{MarketPosition, SettledPosition};
use crate::transfer::{MtmTransfer, TransferType};
use crate::types::{PartyId, Price, Timestamp};

impl Engine {
    /// Marks every position to `mark_price`, including the volume traded since the last
    /// cycle at its own trade price. Losses come first in the result, then wins and
    /// zero-value placeholders, each in position-list order.
    pub fn settle_mtm<P: MarketPosition>(
        &self,
        now: Timestamp,
        mark_price: Price,
        positions: &[P],
    ) -> Vec<MtmTransfer> {
        let asset = self.product().asset().to_string();
        let factor = self.position_factor;
        let debug = self.is_debug();
        let mut events = Vec::with_capacity(positions.len());

        let distributor = {
            let mut state = self.lock();
            let capacity = state.settled_positions.len().max(positions.len());
            let mut distributor = WinLossDistributor::with_capacity(asset.as_str(), capacity);
            let mut trades = state.trades.take();

            // 12.3: the network is marked before anyone else, from its close-out trades, the
            // size reported in the position list, or the position it carried from earlier cycles
            let network = PartyId::network();
            let reported = positions
                .iter()
                .find(|p| p.party().is_network())
                .map(|p| p.size());
            let carried = state.settled_positions.get(&network).copied();
            let traded = trades.remove(&network);
            if traded.is_some() || reported.is_some() || carried.is_some() {
                let has_traded = traded.is_some();
                let traded = traded.unwrap_or_default();
                let size = traded
                    .last()
                    .map(|t| t.new_size)
                    .or(reported)
                    .or(carried)
                    .unwrap_or(0);
                let (current, last_price) = state.current_position(&network, size);
                let empty = current == 0 && last_price.is_zero();

                if !has_traded && (last_price == mark_price || empty) {
                    if size == 0 {
                        state.remove_position(&network);
                    }
                } else {
                    let share = calculate_mtm(mark_price, last_price, current, &traded, factor);
                    state.settled_positions.insert(network.clone(), size);
                    if size == 0 {
                        state.remove_position(&network);
                    }
                    if debug {
                        tracing::debug!(market = %self.market, party = %network, amount = %share.amount, loss = share.is_loss, "network MTM");
                    }
                    let transfer = MtmTransfer::from_share(
                        SettledPosition::network(size, mark_price),
                        &share,
                        &asset,
                        TransferType::MtmWin,
                        TransferType::MtmLoss,
                    );
                    distributor.push(transfer, share, has_traded || size != 0);
                }
            }

            for position in positions {
                let party = position.party();
                // already marked above
                if party.is_network() {
                    continue;
                }
                let (current, last_price) = state.current_position(party, position.size());
                let traded = trades.remove(party);
                let has_traded = traded.is_some();
                let traded = traded.unwrap_or_default();

                // flat, never priced, no potentials: nothing that could be marked
                let empty = current == 0
                    && last_price.is_zero()
                    && position.buy() == 0
                    && position.sell() == 0;
                if !has_traded && (last_price == mark_price || empty) {
                    // flat parties keep no entry
                    if position.size() == 0 && position.buy() == 0 && position.sell() == 0 {
                        state.remove_position(party);
                    }
                    continue;
                }

                events.push(Event::new(
                    now,
                    EventPayload::SettlePosition(SettlePositionEvent {
                        market_id: self.market.clone(),
                        party: party.clone(),
                        price: position.price(),
                        trades: traded.iter().map(TradeSettlement::from).collect(),
                        position_factor: factor,
                    }),
                ));

                // the old volume at the old mark, plus each trade at its own price
                let share = calculate_mtm(mark_price, last_price, current, &traded, factor);

                state.settled_positions.insert(party.clone(), position.size());
                let settled = SettledPosition::from_position(position).at_price(mark_price);
                if settled.is_flat() {
                    state.remove_position(party);
                }

                if debug {
                    tracing::debug!(
                        market = %self.market,
                        party = %party,
                        amount = %share.amount,
                        remainder = %share.remainder,
                        loss = share.is_loss,
                        "MTM share"
                    );
                }

                // potential-only positions never get rounding units
                let holds_position = has_traded || position.size() != 0;
                let transfer = MtmTransfer::from_share(
                    settled,
                    &share,
                    &asset,
                    TransferType::MtmWin,
                    TransferType::MtmLoss,
                );
                distributor.push(transfer, share, holds_position);
            }

            state.last_mark_price = Some(mark_price);
            distributor
        };

        let transfers = distributor.finish(mark_price);
        if !events.is_empty() {
            self.broker.send_batch(events);
        }
        transfers
    }
}
