//! Property-based tests for the settlement engine.
//!
//! These tests verify invariants hold under random trade flow and price paths.

use proptest::prelude::*;
use settlement_core::*;
use std::collections::BTreeMap;
use std::sync::Arc;

// the network takes part like anyone else: it trades, and carries volume between cycles
const PARTIES: [&str; 6] = ["alice", "bob", "carol", "dave", "erin", "network"];

// Strategies for generating test data
fn trade_strategy() -> impl Strategy<Value = (usize, usize, u128, u64)> {
    (0..PARTIES.len(), 0..PARTIES.len(), 900u128..1100u128, 1u64..50u64)
}

fn cycle_strategy() -> impl Strategy<Value = (Vec<(usize, usize, u128, u64)>, u128)> {
    (prop::collection::vec(trade_strategy(), 0..6), 900u128..1100u128)
}

fn factor_strategy() -> impl Strategy<Value = PositionFactor> {
    (0i32..=3i32).prop_map(|decimals| PositionFactor::from_decimals(decimals).unwrap())
}

fn engine(factor: PositionFactor) -> Engine {
    Engine::new(
        SettlementConfig::default(),
        Arc::new(CashSettledProduct::new("USD")),
        MarketId::new("ETH/DEC24"),
        Arc::new(FixedClock::new(Timestamp::from_nanos(0))),
        Arc::new(EventCollector::new()),
        factor,
    )
}

/// Applies one cycle's trades to the engine and the caller-side book,
/// returning the positions as the positions engine would report them.
fn trade_cycle(
    engine: &Engine,
    sizes: &mut BTreeMap<&'static str, i64>,
    trades: &[(usize, usize, u128, u64)],
    mark: u128,
) -> Vec<Position> {
    for &(buyer, seller, price, size) in trades {
        engine.add_trade(&Trade::new(PARTIES[buyer], PARTIES[seller], Price::new(price), size));
        *sizes.entry(PARTIES[buyer]).or_default() += size as i64;
        *sizes.entry(PARTIES[seller]).or_default() -= size as i64;
    }
    PARTIES
        .iter()
        .map(|party| Position::with_open_volume(*party, sizes.get(party).copied().unwrap_or(0), Price::new(mark)))
        .collect()
}

fn sum(transfers: &[MtmTransfer]) -> (u128, u128) {
    let (loss, win) = totals(transfers.iter().filter_map(MtmTransfer::transfer));
    (loss.value(), win.value())
}

proptest! {
    /// Every MTM cycle moves exactly as much out of losers as into winners
    #[test]
    fn mtm_conserves_value(
        factor in factor_strategy(),
        cycles in prop::collection::vec(cycle_strategy(), 1..8),
    ) {
        let engine = engine(factor);
        let mut sizes = BTreeMap::new();

        for (trades, mark) in &cycles {
            let positions = trade_cycle(&engine, &mut sizes, trades, *mark);
            let transfers = engine.settle_mtm(Timestamp::from_nanos(1), Price::new(*mark), &positions);
            let (loss, win) = sum(&transfers);
            prop_assert_eq!(loss, win);
        }
    }

    /// No loss ever appears after a win
    #[test]
    fn losses_precede_wins(
        factor in factor_strategy(),
        cycles in prop::collection::vec(cycle_strategy(), 1..8),
    ) {
        let engine = engine(factor);
        let mut sizes = BTreeMap::new();

        for (trades, mark) in &cycles {
            let positions = trade_cycle(&engine, &mut sizes, trades, *mark);
            let transfers = engine.settle_mtm(Timestamp::from_nanos(1), Price::new(*mark), &positions);
            let first_win = transfers.iter().position(|t| !t.is_loss()).unwrap_or(transfers.len());
            prop_assert!(transfers[first_win..].iter().all(|t| !t.is_loss()));
        }
    }

    /// Settling twice at the same mark with no new trades is a no-op
    #[test]
    fn repeat_cycle_is_empty(
        factor in factor_strategy(),
        cycle in cycle_strategy(),
    ) {
        let engine = engine(factor);
        let mut sizes = BTreeMap::new();
        let (trades, mark) = cycle;

        let positions = trade_cycle(&engine, &mut sizes, &trades, mark);
        engine.settle_mtm(Timestamp::from_nanos(1), Price::new(mark), &positions);
        let again = engine.settle_mtm(Timestamp::from_nanos(2), Price::new(mark), &positions);
        prop_assert!(again.is_empty());
        prop_assert!(!engine.has_traded());
    }

    /// Flat parties never keep a ledger entry after a cycle
    #[test]
    fn flat_parties_are_removed(
        cycles in prop::collection::vec(cycle_strategy(), 1..6),
    ) {
        let engine = engine(PositionFactor::ONE);
        let mut sizes = BTreeMap::new();

        for (trades, mark) in &cycles {
            let positions = trade_cycle(&engine, &mut sizes, trades, *mark);
            engine.settle_mtm(Timestamp::from_nanos(1), Price::new(*mark), &positions);
            for position in &positions {
                if position.open_volume == 0 {
                    prop_assert_eq!(engine.settled_position(&position.party), None);
                }
            }
        }
    }

    /// A restored engine encodes to the same bytes, pending trades included
    #[test]
    fn snapshot_round_trip(
        factor in factor_strategy(),
        cycles in prop::collection::vec(cycle_strategy(), 1..5),
        pending in prop::collection::vec(trade_strategy(), 0..6),
    ) {
        let source = engine(factor);
        let mut sizes = BTreeMap::new();
        for (trades, mark) in &cycles {
            let positions = trade_cycle(&source, &mut sizes, trades, *mark);
            source.settle_mtm(Timestamp::from_nanos(1), Price::new(*mark), &positions);
        }
        trade_cycle(&source, &mut sizes, &pending, 1000);

        let payload = source.get_state("ETH/DEC24").unwrap();
        let restored = engine(factor);
        restored.load_state(&payload).unwrap();
        prop_assert_eq!(restored.get_state("ETH/DEC24").unwrap(), payload);
    }

    /// Final settlement residual never exceeds one unit per settled party
    #[test]
    fn final_settlement_residual_is_dust(
        factor in factor_strategy(),
        cycle in cycle_strategy(),
        settlement in 800u128..1200u128,
    ) {
        let engine = engine(factor);
        let mut sizes = BTreeMap::new();
        let (trades, mark) = cycle;
        let positions = trade_cycle(&engine, &mut sizes, &trades, mark);
        engine.settle_mtm(Timestamp::from_nanos(1), Price::new(mark), &positions);

        let result = engine.settle(Timestamp::from_nanos(2), Price::new(settlement)).unwrap();
        let first_win = result.transfers.iter().position(|t| t.transfer_type.is_win()).unwrap_or(result.transfers.len());
        prop_assert!(result.transfers[first_win..].iter().all(|t| t.transfer_type.is_win()));
        prop_assert!(result.residual.value() <= PARTIES.len() as u128);
    }
}
