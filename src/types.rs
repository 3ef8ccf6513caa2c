//! Common value types exchanged between the host, the embedded engine, and
//! the enclosing node.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Logical epoch counter maintained by the epoch-time backend.
pub type EpochTime = u64;

/// Epoch value reserved for "no epoch available".
pub const EPOCH_INVALID: EpochTime = u64::MAX;

/// Block height selector accepted by the host's query surface.
///
/// `Latest` resolves through the application multiplexer's notion of the
/// latest committed height, never through the engine's block store, because
/// the engine may report blocks whose application state has not materialized
/// yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Height {
    Latest,
    At(u64),
}

impl From<u64> for Height {
    fn from(height: u64) -> Self {
        Height::At(height)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Height::Latest => write!(f, "latest"),
            Height::At(height) => write!(f, "{height}"),
        }
    }
}

/// Vote recorded in a block's commit for the previous block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitSignature {
    pub validator_address: Vec<u8>,
    pub absent: bool,
}

/// Committed engine block as surfaced to host consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: Vec<u8>,
    pub previous_hash: Vec<u8>,
    pub time: SystemTime,
    pub state_root: Vec<u8>,
    pub proposer_address: Vec<u8>,
    pub last_commit: Vec<CommitSignature>,
    pub transactions: Vec<Vec<u8>>,
}

/// Consensus-layer address advertised to the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusAddress {
    /// Peer-to-peer public key identifying this node, hex encoded.
    pub id: String,
    /// Routable `host:port` address.
    pub address: String,
}

/// Capability bits advertised through the host API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMask(u8);

impl FeatureMask {
    /// Host exposes domain service clients.
    pub const SERVICES: FeatureMask = FeatureMask(1 << 0);
    /// Host runs a full node with a local block store.
    pub const FULL_NODE: FeatureMask = FeatureMask(1 << 1);

    pub fn union(self, other: FeatureMask) -> FeatureMask {
        FeatureMask(self.0 | other.0)
    }

    pub fn contains(self, other: FeatureMask) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Byzantine-behavior proof blob forwarded to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
    /// Engine-specific serialized evidence payload.
    pub meta: Vec<u8>,
}

/// Snapshot of the host state assembled by `get_status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Status {
    pub version: String,
    pub backend: String,
    pub features: FeatureMask,
    pub genesis_height: u64,
    pub genesis_hash: Option<String>,
    pub last_retained_height: u64,
    pub last_retained_hash: Option<String>,
    pub latest_height: u64,
    pub latest_hash: Option<String>,
    pub latest_time: Option<SystemTime>,
    pub latest_state_root: Option<String>,
    pub node_peers: Vec<String>,
    pub is_validator: bool,
}
