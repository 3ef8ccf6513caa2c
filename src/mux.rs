//! Contract of the application multiplexer.
//!
//! The multiplexer routes committed transactions to registered domain
//! applications and is the arbiter of the latest committed height. Its
//! internals live outside this crate; the host drives it through the traits
//! here and receives invalidation notifications for in-flight transactions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::PublicKey;
use tokio::sync::mpsc;

use crate::config::PruneConfig;
use crate::errors::{HostError, HostResult};
use crate::services::EpochTimeBackend;
use crate::transaction::Transaction;
use crate::types::EpochTime;

/// Hook invoked when the configured halt epoch is reached.
pub type HaltHook = Box<dyn Fn(u64, EpochTime) + Send + Sync>;

/// Domain application registered with the multiplexer. Dispatch internals
/// are the multiplexer's concern; the host only registers and names them.
pub trait Application: Send + Sync {
    fn name(&self) -> &'static str;
}

/// Nonce oracle consulted for transaction signers.
#[async_trait]
pub trait TransactionAuthHandler: Send + Sync {
    async fn signer_nonce(&self, signer: &PublicKey) -> HostResult<u64>;
}

/// Construction parameters handed to the multiplexer factory.
#[derive(Clone, Debug)]
pub struct MuxConfig {
    pub data_dir: PathBuf,
    pub pruning: PruneConfig,
    pub halt_epoch: EpochTime,
    pub min_gas_price: u64,
    pub own_tx_signer: PublicKey,
    pub disable_check_tx: bool,
    pub checkpointer_disabled: bool,
    pub checkpointer_check_interval: Duration,
    pub initial_height: u64,
}

/// Notification stream for a transaction evicted from the mempool after
/// failing recheck. At most one error is ever delivered.
pub struct InvalidationWatch {
    receiver: mpsc::UnboundedReceiver<HostError>,
}

impl InvalidationWatch {
    pub fn new(receiver: mpsc::UnboundedReceiver<HostError>) -> Self {
        Self { receiver }
    }

    /// Wait for the invalidation notification. Returns `None` when the
    /// watch closes without the transaction being invalidated.
    pub async fn recv(&mut self) -> Option<HostError> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait Multiplexer: Send + Sync {
    async fn start(&self) -> HostResult<()>;
    async fn stop(&self);

    fn register_application(&self, app: Arc<dyn Application>) -> HostResult<()>;
    fn set_transaction_auth_handler(
        &self,
        handler: Arc<dyn TransactionAuthHandler>,
    ) -> HostResult<()>;
    fn transaction_auth_handler(&self) -> Option<Arc<dyn TransactionAuthHandler>>;
    fn register_halt_hook(&self, hook: HaltHook);

    /// Wire the epoch-time backend the multiplexer consults for halt-epoch
    /// tracking. Called once during host initialization.
    fn set_epochtime(&self, backend: Arc<dyn EpochTimeBackend>) -> HostResult<()>;

    /// Latest height whose application state has been committed. Zero means
    /// no committed blocks.
    fn block_height(&self) -> u64;
    /// Earliest state version still retained under the pruning policy.
    fn last_retained_version(&self) -> HostResult<u64>;

    /// Dry-run gas estimation against current state.
    fn estimate_gas(&self, signer: &PublicKey, transaction: &Transaction) -> HostResult<u64>;

    /// Register an invalidation watch for the transaction with the given
    /// content hash.
    fn watch_invalidated_tx(&self, tx_hash: [u8; 32]) -> HostResult<InvalidationWatch>;
}

/// Builds the multiplexer during lazy initialization, before any domain
/// application exists.
pub trait MuxFactory: Send + Sync {
    fn build(
        &self,
        upgrader: Arc<dyn UpgradeBackend>,
        config: MuxConfig,
    ) -> HostResult<Arc<dyn Multiplexer>>;
}

/// Upgrade coordinator consulted by the multiplexer around halt epochs.
pub trait UpgradeBackend: Send + Sync {
    /// Name of the pending upgrade descriptor, if one is armed.
    fn pending_upgrade(&self) -> Option<String>;
}

/// Periodic whole-state invariant checker, registered with the multiplexer
/// as an ordinary application when enabled.
pub struct SupplementarySanityApp {
    interval: u64,
}

impl SupplementarySanityApp {
    pub fn new(interval: u64) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }
}

impl Application for SupplementarySanityApp {
    fn name(&self) -> &'static str {
        "supplementary-sanity"
    }
}
