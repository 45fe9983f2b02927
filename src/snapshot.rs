// 10.0: snapshot codec. the settlement state of one market, wrapped in a versioned
// envelope and encoded with bincode (varint integers, little endian). two nodes with
// the same state must produce the same bytes, so both lists are kept sorted.

use crate::trades::TradeRecord;
use crate::types::{MarketId, PartyId, Price};
use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const NAMESPACE: &str = "settlement";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unknown snapshot key {0:?}")]
    InvalidKey(String),

    #[error("snapshot namespace {found:?} does not match {expected:?}")]
    NamespaceMismatch { expected: String, found: String },

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("encode: {0}")]
    Encode(#[source] bincode::Error),

    #[error("decode: {0}")]
    Decode(#[source] bincode::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySettledPosition {
    pub party: PartyId,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTrade {
    pub party: PartyId,
    pub price: Price,
    pub market_price: Price,
    pub size: i64,
    pub new_size: i64,
}

impl From<&TradeRecord> for SnapshotTrade {
    fn from(record: &TradeRecord) -> Self {
        Self {
            party: record.party.clone(),
            price: record.price,
            market_price: record.market_price,
            size: record.size,
            new_size: record.new_size,
        }
    }
}

impl From<SnapshotTrade> for TradeRecord {
    fn from(trade: SnapshotTrade) -> Self {
        Self {
            party: trade.party,
            size: trade.size,
            price: trade.price,
            market_price: trade.market_price,
            new_size: trade.new_size,
        }
    }
}

/// Everything the engine needs to resume mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementState {
    pub market_id: MarketId,
    pub last_mark_price: Option<Price>,
    // sorted by party
    pub last_settled_positions: Vec<PartySettledPosition>,
    // sorted by party, then insertion order
    pub trades: Vec<SnapshotTrade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    namespace: String,
    key: String,
    state: SettlementState,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_varint_encoding()
        .with_little_endian()
}

// 10.1: the key of a settlement snapshot is the market id
pub fn encode(state: &SettlementState) -> Result<Vec<u8>, SnapshotError> {
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        namespace: NAMESPACE.to_string(),
        key: state.market_id.as_str().to_string(),
        state: state.clone(),
    };
    codec().serialize(&envelope).map_err(SnapshotError::Encode)
}

pub fn decode(payload: &[u8], expected_key: &str) -> Result<SettlementState, SnapshotError> {
    let envelope: Envelope = codec().deserialize(payload).map_err(SnapshotError::Decode)?;

    if envelope.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(envelope.version));
    }
    if envelope.namespace != NAMESPACE {
        return Err(SnapshotError::NamespaceMismatch {
            expected: NAMESPACE.to_string(),
            found: envelope.namespace,
        });
    }
    if envelope.key != expected_key || envelope.state.market_id.as_str() != expected_key {
        return Err(SnapshotError::InvalidKey(envelope.key));
    }
    Ok(envelope.state)
}

pub fn payload_hash(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
