//! Settlement engine simulation.
//!
//! Runs one market through its lifecycle: mark-to-market cycles with trades,
//! a distressed close-out through the network, funding, a snapshot restore
//! and final settlement at expiry. Set RUST_LOG=debug for per-party output.

use settlement_core::*;
use std::sync::Arc;

const ONE_SECOND: i64 = 1_000_000_000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    println!("Settlement Engine Simulation");
    println!("Single Market, Cash Settled, Full Lifecycle\n");

    let clock = Arc::new(FixedClock::new(Timestamp::from_nanos(ONE_SECOND)));
    let broker = Arc::new(EventCollector::new());
    let level = if tracing::enabled!(tracing::Level::DEBUG) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let engine = Engine::new(
        SettlementConfig::with_level(level),
        Arc::new(CashSettledProduct::new("USD")),
        MarketId::new("ETH/DEC24"),
        clock.clone(),
        broker.clone(),
        PositionFactor::ONE,
    );

    let mut book = Book::default();
    scenario_1_opening_trades(&engine, &clock, &mut book);
    scenario_2_price_moves(&engine, &clock, &mut book);
    scenario_3_distressed_close_out(&engine, &clock, &mut book);
    scenario_4_funding(&engine, &book);
    let engine = scenario_5_snapshot_restore(engine, &clock, &broker);
    scenario_6_final_settlement(&engine, &clock);

    println!("\n{} events sent to the broker", broker.events().len());
    println!("All simulations completed successfully.");
}

/// Position book kept on the caller's side, the way the positions engine would.
#[derive(Default)]
struct Book {
    positions: Vec<Position>,
}

impl Book {
    fn apply(&mut self, trade: &Trade) {
        for (party, size) in [(&trade.buyer, trade.size as i64), (&trade.seller, -(trade.size as i64))] {
            let index = match self.positions.iter().position(|p| &p.party == party) {
                Some(index) => index,
                None => {
                    self.positions.push(Position::new(party.clone()));
                    self.positions.len() - 1
                }
            };
            self.positions[index].apply_trade(size, trade.price, PositionFactor::ONE);
        }
    }

    fn marked(&mut self, mark: Price) -> Vec<Position> {
        for position in &mut self.positions {
            position.mark_to_market(mark, PositionFactor::ONE);
        }
        self.positions.clone()
    }
}

fn trade(engine: &Engine, book: &mut Book, buyer: &str, seller: &str, price: u128, size: u64) {
    let trade = Trade::new(buyer, seller, Price::new(price), size);
    engine.add_trade(&trade);
    book.apply(&trade);
    println!("  {buyer} buys {size} from {seller} @ {price}");
}

fn print_transfers(transfers: &[MtmTransfer]) {
    for t in transfers {
        match t.transfer() {
            Some(tf) => println!("    {:<8} {:?} {}", t.party().as_str(), tf.transfer_type, tf.amount),
            None => println!("    {:<8} (nothing to move)", t.party().as_str()),
        }
    }
    let (loss, win) = totals(transfers.iter().filter_map(MtmTransfer::transfer));
    println!("    losses {loss} == wins {win}\n");
}

fn scenario_1_opening_trades(engine: &Engine, clock: &FixedClock, book: &mut Book) {
    println!("Scenario 1: Opening Trades\n");

    trade(engine, book, "alice", "bob", 1000, 10);
    trade(engine, book, "carol", "bob", 1005, 4);

    clock.advance(ONE_SECOND);
    let mark = Price::new(1000);
    let transfers = engine.settle_mtm(clock.get_time_now(), mark, &book.marked(mark));
    println!("  MTM @ {mark}:");
    print_transfers(&transfers);
}

fn scenario_2_price_moves(engine: &Engine, clock: &FixedClock, book: &mut Book) {
    println!("Scenario 2: Price Moves\n");

    for mark in [1000u128, 1100, 1050] {
        clock.advance(ONE_SECOND);
        let mark = Price::new(mark);
        let transfers = engine.settle_mtm(clock.get_time_now(), mark, &book.marked(mark));
        println!("  MTM @ {mark}: {} transfers", transfers.len());
        if !transfers.is_empty() {
            print_transfers(&transfers);
        }
    }
    println!();
}

fn scenario_3_distressed_close_out(engine: &Engine, clock: &FixedClock, book: &mut Book) {
    println!("Scenario 3: Distressed Close Out\n");

    let bob = book
        .positions
        .iter()
        .find(|p| p.party.as_str() == "bob")
        .cloned()
        .unwrap_or_else(|| Position::new("bob"));
    let volume = bob.open_volume.unsigned_abs();

    // the network takes over the short at the last mark, then buys it back in the book
    trade(engine, book, "bob", "network", 1050, volume);
    engine.remove_distressed(&[PartyMargin {
        position: SettledPosition::from_position(&bob),
        margin_balance: Amount::new(150),
        general_balance: Amount::ZERO,
    }]);
    println!("  bob is distressed, the network now holds a short of {volume}");

    book.positions.retain(|p| p.party.as_str() != "bob");
    trade(engine, book, "network", "dave", 1060, volume);
    book.positions.retain(|p| !p.party.is_network());

    clock.advance(ONE_SECOND);
    let mark = Price::new(1070);
    let transfers = engine.settle_mtm(clock.get_time_now(), mark, &book.marked(mark));
    println!("  MTM @ {mark}:");
    print_transfers(&transfers);
}

fn scenario_4_funding(engine: &Engine, book: &Book) {
    println!("Scenario 4: Funding Period\n");

    let result = engine.settle_funding_period(&book.positions, 2);
    println!("  funding payment 2 per unit:");
    print_transfers(&result.transfers);
    println!("  left in settlement account: {}\n", result.residual);
}

fn scenario_5_snapshot_restore(engine: Engine, clock: &Arc<FixedClock>, broker: &Arc<EventCollector>) -> Engine {
    println!("Scenario 5: Snapshot Restore\n");

    let key = engine.market_id().as_str().to_string();
    let payload = match engine.get_state(&key) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("  snapshot failed: {err}");
            return engine;
        }
    };
    let restored = Engine::new(
        engine.config(),
        Arc::new(CashSettledProduct::new("USD")),
        engine.market_id().clone(),
        clock.clone(),
        broker.clone(),
        engine.position_factor(),
    );
    if let Err(err) = restored.load_state(&payload) {
        eprintln!("  restore failed: {err}");
        return engine;
    }

    let before = engine.state_hash(&key).unwrap_or_default();
    let after = restored.state_hash(&key).unwrap_or_default();
    println!("  {} bytes, hash {}", payload.len(), &before[..16.min(before.len())]);
    println!("  restored hash matches: {}\n", before == after);
    restored
}

fn scenario_6_final_settlement(engine: &Engine, clock: &FixedClock) {
    println!("Scenario 6: Final Settlement\n");

    clock.advance(ONE_SECOND);
    match engine.settle(clock.get_time_now(), Price::new(1120)) {
        Ok(result) => {
            for tf in &result.transfers {
                println!("    {:<8} {:?} {}", tf.owner.as_str(), tf.transfer_type, tf.amount);
            }
            let (loss, win) = totals(&result.transfers);
            println!("    losses {loss}, wins {win}, dust {}", result.residual);
        }
        Err(err) => eprintln!("  settlement failed: {err}"),
    }
}
