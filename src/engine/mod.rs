// 12.0: settlement engine. one engine per market: MTM, final settlement, funding,
// distressed removal and snapshots. all state sits behind one lock.

mod core;
mod distressed;
mod funding;
mod mtm;
mod results;
mod settle;
mod snapshot;

pub use core::Engine;
pub use results::{FundingResult, SettlementError, SettlementResult};
