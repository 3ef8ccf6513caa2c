//! Contract of the embedded BFT engine.
//!
//! The engine (consensus algorithm, mempool, p2p stack, WAL) lives outside
//! this crate. The host reaches it exclusively through the traits below;
//! in-process tests drive the same traits with mock engines. Constructing
//! the engine node performs block replay and chain initialization
//! synchronously, which is why construction is deferred behind
//! [`EngineFactory`] until every domain application has been registered.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::errors::{HostError, HostResult};
use crate::genesis::Document;
use crate::mux::Multiplexer;
use crate::types::Block;

/// Name of the consensus backend implemented by this host. Genesis documents
/// must declare it.
pub const BACKEND_NAME: &str = "helix-bft";

/// Database subsystem identifier whose open call carries the validator
/// store handle.
pub const STATE_SUBSYSTEM: &str = "state";

/// Event queries understood by the engine event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventQuery {
    /// Every newly committed block.
    NewBlock,
    /// The commit of the transaction with exactly these serialized bytes.
    Tx(Vec<u8>),
    /// Domain events tagged for the named service.
    Service(String),
}

/// Result of executing (or checking) a single transaction.
#[derive(Clone, Debug, Default)]
pub struct TxResult {
    pub code: u32,
    pub module: String,
    pub log: String,
    pub events: Vec<ServiceEvent>,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Domain event emitted by an application during block execution.
#[derive(Clone, Debug)]
pub struct ServiceEvent {
    /// Service tag, e.g. `staking`.
    pub service: String,
    pub height: u64,
    pub payload: serde_json::Value,
}

/// Payload delivered on an engine subscription.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    NewBlock(Block),
    Tx { tx: Vec<u8>, result: TxResult },
    Service(ServiceEvent),
}

/// Raw engine subscription: a bounded delivery channel plus a cancellation
/// watch. The engine force-cancels slow consumers by flipping the watch and
/// dropping its sender; consumers that must never stall the engine wrap
/// this in the pubsub buffer shim.
pub struct EngineSubscription {
    pub out: mpsc::Receiver<EngineEvent>,
    pub cancelled: watch::Receiver<bool>,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Subscribe to `query` under the unique subscriber identifier.
    ///
    /// Returns `Ok(None)` when the engine is shutting down; callers surface
    /// that as a cancelled subscription.
    async fn subscribe(
        &self,
        subscriber: &str,
        query: EventQuery,
    ) -> HostResult<Option<EngineSubscription>>;

    async fn unsubscribe(&self, subscriber: &str, query: EventQuery) -> HostResult<()>;
}

/// Mempool admission failure modes distinguished by the submission protocol.
#[derive(Debug)]
pub enum CheckTxError {
    /// Transaction already in the mempool or recently evicted from it.
    InCache,
    /// Transport-level failure talking to the mempool.
    Transport(String),
}

/// Execution results for every transaction of one block.
#[derive(Clone, Debug, Default)]
pub struct BlockResults {
    pub height: u64,
    pub results: Vec<TxResult>,
}

/// Decoded Byzantine-behavior evidence accepted by the engine.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EngineEvidence {
    pub height: u64,
    pub validator_address: Vec<u8>,
    pub kind: EvidenceKind,
}

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub enum EvidenceKind {
    DuplicateVote,
    LightClientAttack,
}

impl EngineEvidence {
    /// Decode the engine wire form carried inside a host evidence blob.
    pub fn decode(meta: &[u8]) -> HostResult<Self> {
        let evidence: EngineEvidence = bincode::deserialize(meta)
            .map_err(|err| HostError::MalformedEvidence(format!("unmarshal failed: {err}")))?;
        if evidence.validator_address.is_empty() {
            return Err(HostError::MalformedEvidence(
                "conversion failed: empty validator address".into(),
            ));
        }
        Ok(evidence)
    }
}

/// Validator set pinned at one height.
#[derive(Clone, Debug, Default)]
pub struct ValidatorSet {
    pub addresses: Vec<Vec<u8>>,
}

impl ValidatorSet {
    pub fn has_address(&self, address: &[u8]) -> bool {
        self.addresses.iter().any(|entry| entry == address)
    }
}

/// Read-only view of the engine's state database, captured when the engine
/// opens the `state` subsystem. The only supported way to reach the
/// validator set directly.
pub trait ValidatorStore: Send + Sync {
    fn validator_set(&self, height: u64) -> HostResult<ValidatorSet>;
}

/// Out-parameter fulfilled by the engine factory the moment the `state`
/// database subsystem is opened. Construction of the host fails if the
/// engine never fulfills it.
#[derive(Clone, Default)]
pub struct StateStoreSlot {
    cell: Arc<OnceLock<Arc<dyn ValidatorStore>>>,
}

impl StateStoreSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the engine factory; the first call wins.
    pub fn fulfill(&self, store: Arc<dyn ValidatorStore>) {
        let _ = self.cell.set(store);
    }

    pub fn get(&self) -> Option<Arc<dyn ValidatorStore>> {
        self.cell.get().cloned()
    }
}

/// Engine-side configuration materialized from genesis parameters and host
/// options. Peer identifier fields are comma-delimited and already
/// lowercased: the engine compares them byte-exactly.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    pub timeout_commit: Duration,
    pub skip_timeout_commit: bool,
    pub empty_block_interval: Duration,
    pub replay_recover_corrupted_wal: bool,
    pub listen_address: String,
    pub external_address: String,
    pub persistent_peers: String,
    pub persistent_peers_max_dial_period: Duration,
    pub private_peer_ids: String,
    pub unconditional_peer_ids: String,
    pub seeds: String,
    pub pex_enabled: bool,
    pub addr_book_strict: bool,
    pub allow_duplicate_ip: bool,
    pub max_num_inbound_peers: usize,
    pub max_num_outbound_peers: usize,
    pub send_rate: u64,
    pub recv_rate: u64,
    pub state_sync: Option<StateSyncProviderConfig>,
}

/// Light-client trust anchor for state-sync bootstrap.
#[derive(Clone, Debug)]
pub struct StateSyncProviderConfig {
    pub trust_period: Duration,
    pub trust_height: u64,
    pub trust_hash: Vec<u8>,
    pub consensus_nodes: Vec<String>,
}

/// Everything the engine factory needs to construct the node. Constructing
/// the node triggers replay and chain initialization against the supplied
/// multiplexer.
pub struct EngineLaunchSpec {
    pub config: EngineConfig,
    pub genesis: Arc<Document>,
    pub validator_key_path: PathBuf,
    pub mux: Arc<dyn Multiplexer>,
    pub state_slot: StateStoreSlot,
}

pub trait EngineFactory: Send + Sync {
    /// Construct the engine node. Blocks for the duration of replay; panics
    /// raised during replay are recovered by the caller.
    fn build(&self, spec: EngineLaunchSpec) -> HostResult<Arc<dyn EngineNode>>;
}

#[async_trait]
pub trait EngineNode: Send + Sync {
    async fn start(&self) -> HostResult<()>;
    async fn stop(&self);

    /// Closes (flips to `true`) when the engine node has fully terminated.
    fn terminated(&self) -> watch::Receiver<bool>;
    /// Closes when the consensus state machine terminates; observed by the
    /// failure monitor.
    fn consensus_terminated(&self) -> watch::Receiver<bool>;

    fn event_bus(&self) -> Arc<dyn EventBus>;

    /// Submit to the local mempool. `Ok` carries the CheckTx result, which
    /// may still be non-OK at the application level.
    async fn check_tx(&self, tx: Vec<u8>) -> Result<TxResult, CheckTxError>;
    /// Transactions currently pending in the mempool.
    fn unconfirmed_txs(&self) -> Vec<Vec<u8>>;

    /// Whether the engine is still bulk-fetching blocks. `None` once the
    /// consensus reactor has been torn down.
    fn is_fast_syncing(&self) -> Option<bool>;

    async fn block(&self, height: u64) -> HostResult<Option<Block>>;
    async fn block_results(&self, height: u64) -> HostResult<BlockResults>;
    async fn broadcast_evidence(&self, evidence: EngineEvidence) -> HostResult<()>;

    /// Connected peers in `id@address` form.
    fn peers(&self) -> Vec<String>;
}

/// Create the on-disk layout the engine expects under its state directory.
pub fn init_data_dir(state_dir: &Path) -> HostResult<()> {
    for sub in ["config", "data"] {
        std::fs::create_dir_all(state_dir.join(sub))?;
    }
    Ok(())
}
