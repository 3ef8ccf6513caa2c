use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{HostError, HostResult};

/// Directory under the host data directory holding all engine state.
pub const STATE_DIR: &str = "consensus";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneStrategy {
    /// Keep everything.
    None,
    /// Keep the most recent `num_kept` versions.
    KeepN,
}

impl Default for PruneStrategy {
    fn default() -> Self {
        PruneStrategy::None
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub strategy: PruneStrategy,
    pub num_kept: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            strategy: PruneStrategy::default(),
            num_kept: 3_600,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointerConfig {
    pub disabled: bool,
    pub check_interval_secs: u64,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            check_interval_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    pub listen_address: String,
    pub external_address: String,
    /// Persistent peers in `id@host:port` form.
    pub persistent_peers: Vec<String>,
    pub persistent_peers_max_dial_period_secs: u64,
    pub unconditional_peer_ids: Vec<String>,
    pub seeds: Vec<String>,
    pub disable_peer_exchange: bool,
    pub max_num_inbound_peers: usize,
    pub max_num_outbound_peers: usize,
    pub send_rate: u64,
    pub recv_rate: u64,
    /// Debug: relax address book strictness. Honored only with
    /// `debug.allow_unsafe`.
    pub debug_addr_book_lenient: bool,
    /// Debug: allow multiple peers from one IP. Honored only with
    /// `debug.allow_unsafe`.
    pub debug_allow_duplicate_ip: bool,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_address: "tcp://0.0.0.0:26656".to_string(),
            external_address: String::new(),
            persistent_peers: Vec::new(),
            persistent_peers_max_dial_period_secs: 0,
            unconditional_peer_ids: Vec::new(),
            seeds: Vec::new(),
            disable_peer_exchange: false,
            max_num_inbound_peers: 40,
            max_num_outbound_peers: 10,
            send_rate: 5_120_000,
            recv_rate: 5_120_000,
            debug_addr_book_lenient: false,
            debug_allow_duplicate_ip: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentryConfig {
    /// Upstream validators this node fronts, in `id@host:port` form. Their
    /// IDs become private and unconditional peers.
    pub upstream_addresses: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSyncConfig {
    pub enabled: bool,
    /// Consensus nodes trusted to serve light-client headers and snapshots.
    pub consensus_nodes: Vec<String>,
    pub trust_period_secs: u64,
    pub trust_height: u64,
    /// Hex-encoded trusted header hash.
    pub trust_hash: String,
}

impl Default for StateSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            consensus_nodes: Vec::new(),
            trust_period_secs: 24 * 3600,
            trust_height: 0,
            trust_hash: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Master switch gating every unsafe debug toggle below.
    pub allow_unsafe: bool,
    /// Skip CheckTx on incoming transactions (UNSAFE).
    pub disable_check_tx: bool,
    /// Recover from a corrupted engine WAL during replay (UNSAFE).
    pub unsafe_replay_recover_corrupted_wal: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplementarySanityConfig {
    pub enabled: bool,
    /// Check interval in blocks.
    pub interval: u64,
}

impl Default for SupplementarySanityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 10,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Static gas price used by the submission manager.
    pub gas_price: u64,
    /// Upper bound on the fee the submission manager will attach; 0 means
    /// unlimited.
    pub max_fee: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

/// Top-level host configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub data_dir: PathBuf,
    pub min_gas_price: u64,
    pub prune: PruneConfig,
    pub checkpointer: CheckpointerConfig,
    pub p2p: P2pConfig,
    pub sentry: SentryConfig,
    pub state_sync: StateSyncConfig,
    pub debug: DebugConfig,
    pub supplementary_sanity: SupplementarySanityConfig,
    pub submission: SubmissionConfig,
    pub metrics: MetricsConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            min_gas_price: 0,
            prune: PruneConfig::default(),
            checkpointer: CheckpointerConfig::default(),
            p2p: P2pConfig::default(),
            sentry: SentryConfig::default(),
            state_sync: StateSyncConfig::default(),
            debug: DebugConfig::default(),
            supplementary_sanity: SupplementarySanityConfig::default(),
            submission: SubmissionConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> HostResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| HostError::Config(format!("unable to parse host config: {err}")))
    }

    pub fn save(&self, path: &Path) -> HostResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| HostError::Config(format!("unable to encode host config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn validate(&self) -> HostResult<()> {
        if self.prune.strategy == PruneStrategy::KeepN && self.prune.num_kept == 0 {
            return Err(HostError::Config(
                "prune.num_kept must be greater than 0 with the keep_n strategy".into(),
            ));
        }
        if self.state_sync.enabled {
            if self.state_sync.trust_height == 0 {
                return Err(HostError::Config(
                    "state_sync.trust_height is required when state sync is enabled".into(),
                ));
            }
            if hex::decode(&self.state_sync.trust_hash).is_err() {
                return Err(HostError::Config(
                    "state_sync.trust_hash must be a hex-encoded header hash".into(),
                ));
            }
            if self.state_sync.consensus_nodes.is_empty() {
                return Err(HostError::Config(
                    "state_sync requires at least one consensus node".into(),
                ));
            }
        }
        for address in self
            .sentry
            .upstream_addresses
            .iter()
            .chain(self.p2p.persistent_peers.iter())
        {
            if address.split('@').count() != 2 {
                return Err(HostError::Config(format!(
                    "malformed peer address (want id@host:port): {address}"
                )));
            }
        }
        Ok(())
    }

    pub fn ensure_directories(&self) -> HostResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Engine state directory under the host data directory.
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join(STATE_DIR)
    }

    /// True when the unsafe CheckTx bypass is both requested and permitted.
    pub fn check_tx_disabled(&self) -> bool {
        self.debug.disable_check_tx && self.debug.allow_unsafe
    }

    /// True when corrupted-WAL replay recovery is both requested and
    /// permitted.
    pub fn replay_recovery_enabled(&self) -> bool {
        self.debug.unsafe_replay_recover_corrupted_wal && self.debug.allow_unsafe
    }
}

/// Join peer specifications into the engine's comma-delimited form.
///
/// The engine matches peer identifiers with a byte-exact, case-sensitive
/// comparison, so every user-supplied identifier is lowercased on ingest.
pub fn join_peers_lowercase(peers: &[String]) -> String {
    peers
        .iter()
        .map(|peer| peer.trim().to_lowercase())
        .filter(|peer| !peer.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
