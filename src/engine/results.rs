// 12.0.2: result types and errors for settlement operations.

use crate::product::ProductError;
use crate::transfer::{MtmTransfer, Transfer};
use crate::types::{Amount, PartyId};

/// Final settlement at market expiry. `residual` is the whole part of the rounding
/// dust left in the settlement account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementResult {
    pub transfers: Vec<Transfer>,
    pub residual: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundingResult {
    pub transfers: Vec<MtmTransfer>,
    pub residual: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("product settlement failed for party {party}: {source}")]
    Product {
        party: PartyId,
        #[source]
        source: ProductError,
    },

    #[error("net position {size} of party {party} is out of range for the position factor")]
    NetPosition { party: PartyId, size: i64 },
}
