//! Genesis document handling.
//!
//! The document is the single source of truth for chain identity, engine
//! consensus parameters, and the initial state of every domain subsystem.
//! Domain sections are carried as opaque JSON values: the host merges and
//! forwards them but never interprets their contents.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{HostError, HostResult};
use crate::types::{EPOCH_INVALID, EpochTime};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochTimeParameters {
    /// Number of blocks per epoch.
    pub interval: u64,
    /// Use the debug mock epoch-time backend instead of the block-driven one.
    pub debug_mock_backend: bool,
}

impl Default for EpochTimeParameters {
    fn default() -> Self {
        Self {
            interval: 600,
            debug_mock_backend: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochTimeGenesis {
    pub parameters: EpochTimeParameters,
    /// Epoch the chain starts in.
    pub base: EpochTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParameters {
    pub timeout_commit_ms: u64,
    pub skip_timeout_commit: bool,
    pub empty_block_interval_ms: u64,
    /// Hex-encoded public keys barred from signature verification.
    pub public_key_blacklist: Vec<String>,
}

impl Default for ConsensusParameters {
    fn default() -> Self {
        Self {
            timeout_commit_ms: 1_000,
            skip_timeout_commit: false,
            empty_block_interval_ms: 0,
            public_key_blacklist: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusGenesis {
    /// Name of the consensus backend the document was produced for.
    pub backend: String,
    pub parameters: ConsensusParameters,
}

impl Default for ConsensusGenesis {
    fn default() -> Self {
        Self {
            backend: crate::engine::BACKEND_NAME.to_string(),
            parameters: ConsensusParameters::default(),
        }
    }
}

/// The genesis document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub chain_id: String,
    /// Height the chain starts at.
    pub height: u64,
    pub time: SystemTime,
    /// Epoch at which the network is scheduled to halt for an upgrade.
    pub halt_epoch: EpochTime,
    pub epochtime: EpochTimeGenesis,
    pub consensus: ConsensusGenesis,
    pub beacon: Value,
    pub keymanager: Value,
    pub registry: Value,
    pub roothash: Value,
    pub scheduler: Value,
    pub staking: Value,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            chain_id: "helix-local".to_string(),
            height: 1,
            time: SystemTime::UNIX_EPOCH,
            halt_epoch: EPOCH_INVALID,
            epochtime: EpochTimeGenesis::default(),
            consensus: ConsensusGenesis::default(),
            beacon: Value::Null,
            keymanager: Value::Null,
            registry: Value::Null,
            roothash: Value::Null,
            scheduler: Value::Null,
            staking: Value::Null,
        }
    }
}

impl Document {
    pub fn load(path: &Path) -> HostResult<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|err| HostError::Config(format!("unable to parse genesis document: {err}")))
    }

    pub fn save(&self, path: &Path) -> HostResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = serde_json::to_string_pretty(self)
            .map_err(|err| HostError::Config(format!("unable to encode genesis document: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }
}

/// Source of the genesis document used to bootstrap the host.
pub trait GenesisProvider: Send + Sync {
    fn genesis_document(&self) -> HostResult<Document>;
}

/// Provider serving an already-materialized document.
pub struct StaticGenesisProvider {
    document: Document,
}

impl StaticGenesisProvider {
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl GenesisProvider for StaticGenesisProvider {
    fn genesis_document(&self) -> HostResult<Document> {
        Ok(self.document.clone())
    }
}

/// Provider reading the document from a JSON file on every request.
pub struct FileGenesisProvider {
    path: std::path::PathBuf,
}

impl FileGenesisProvider {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GenesisProvider for FileGenesisProvider {
    fn genesis_document(&self) -> HostResult<Document> {
        Document::load(&self.path)
    }
}
