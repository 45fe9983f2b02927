// settlement-core: deterministic settlement for a derivatives market.
// every node replays the same trades and prices and must produce byte-identical
// transfers, so all ordering is explicit and all arithmetic is exact.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, PartyId, Price, Amount, PositionFactor
//   2.x  trades.rs: trades since the last MTM cycle, per party
//   3.x  mtm.rs: MTM and funding flow maths, division by the position factor
//   4.x  position.rs: position traits, settled snapshot, Position value object
//   5.x  transfer.rs: transfers handed to the collateral ledger
//   6.x  distribution.rs: loss-before-win ordering, rounding redistribution
//   7.x  product.rs: product capability for final settlement
//   8.x  clock.rs: time service capability
//   9.x  events.rs: settle-position / settle-distressed events, broker
//   10.x snapshot.rs: versioned binary snapshot codec
//   11.x config.rs: log level, reloadable
//   12.x engine/: MTM, final settlement, funding, distressed removal, snapshots

pub mod clock;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod events;
pub mod mtm;
pub mod position;
pub mod product;
pub mod snapshot;
pub mod trades;
pub mod transfer;
pub mod types;

// re exports for convenience
pub use clock::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use position::*;
pub use product::*;
pub use trades::*;
pub use transfer::*;
pub use types::*;
pub use distribution::WinLossDistributor;
pub use mtm::{calculate_funding_flow, calculate_mtm, MtmShare};
pub use snapshot::{SettlementState, SnapshotError};
