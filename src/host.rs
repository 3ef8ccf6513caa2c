//! The full-node consensus host.
//!
//! [`Host`] embeds the BFT engine behind the contracts in [`crate::engine`],
//! multiplexes the application layer over it, and exposes the replicated
//! ledger to the domain subsystems. Invariants maintained here:
//!
//! * No domain application is registered with the multiplexer before the
//!   multiplexer exists or after the engine has been constructed.
//! * The engine is constructed exactly once, behind the deferred start
//!   function, and only after every domain application is registered,
//!   because engine construction performs replay and chain initialization
//!   synchronously.
//! * Engine subscriptions created before start block until the started
//!   signal fires; afterwards creation is direct.
//! * The synced signal fires at most once, and only after replay completed.
//! * Subscriber identifiers are unique for the life of the process.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use ed25519_dalek::PublicKey;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::{HostConfig, join_peers_lowercase};
use crate::crypto::{self, Identity};
use crate::engine::{
    self, BACKEND_NAME, BlockResults, CheckTxError, EngineConfig, EngineEvent, EngineFactory,
    EngineLaunchSpec, EngineNode, EngineSubscription, EventQuery, StateStoreSlot,
    StateSyncProviderConfig, TxResult,
};
use crate::errors::{HostError, HostResult};
use crate::genesis::{Document, EpochTimeGenesis, GenesisProvider};
use crate::monitor::FailureMonitor;
use crate::mux::{
    Application, HaltHook, Multiplexer, MuxConfig, MuxFactory, SupplementarySanityApp,
    TransactionAuthHandler, UpgradeBackend,
};
use crate::pubsub::{Broker, BrokerSubscription, BufferedSubscription};
use crate::services::{Backend, DomainBackends, EpochTimeBackend, ServiceClient,
    ServiceClientFactory};
use crate::submission::{StaticPriceDiscovery, SubmissionManager, result_error};
use crate::supervisor::Supervisor;
use crate::transaction::{SignedTransaction, Transaction};
use crate::types::{Block, ConsensusAddress, EpochTime, Evidence, FeatureMask, Height, Status};

/// Prefix of every internal engine pubsub subscriber identifier.
const SUBSCRIBER_PREFIX: &str = "helix-consensus";

/// Subscriber identifier of the block notifier worker.
const BLOCK_NOTIFIER_SUBSCRIBER: &str = "helix-consensus/block-notifier";

/// Poll interval of the sync-state reporter.
const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Freshness threshold applied to the latest block time when deciding that
/// initial sync has finished. Only used during initial sync.
const SYNC_FRESHNESS_THRESHOLD: Duration = Duration::from_secs(60);

const METRIC_PROPOSED_BLOCKS: &str = "helix_consensus_proposed_blocks_total";
const METRIC_SIGNED_BLOCKS: &str = "helix_consensus_signed_blocks_total";

/// External collaborators the host is built over.
pub struct HostDependencies {
    pub genesis_provider: Arc<dyn GenesisProvider>,
    pub upgrader: Arc<dyn UpgradeBackend>,
    pub mux_factory: Arc<dyn MuxFactory>,
    pub engine_factory: Arc<dyn EngineFactory>,
    pub service_factory: Arc<dyn ServiceClientFactory>,
}

/// Transactions of one block together with their execution results.
#[derive(Clone, Debug, Default)]
pub struct TransactionsWithResults {
    pub transactions: Vec<Vec<u8>>,
    pub results: Vec<TxResult>,
}

struct LifecycleFlags {
    initialized: bool,
    started: bool,
}

type StartFn = Arc<dyn Fn() -> HostResult<Arc<dyn EngineNode>> + Send + Sync>;

struct HostInner {
    config: HostConfig,
    identity: Identity,
    genesis: Arc<Document>,
    upgrader: Arc<dyn UpgradeBackend>,
    mux_factory: Arc<dyn MuxFactory>,
    engine_factory: Arc<dyn EngineFactory>,
    service_factory: Arc<dyn ServiceClientFactory>,

    flags: Mutex<LifecycleFlags>,
    started_tx: watch::Sender<bool>,
    synced_tx: watch::Sender<bool>,
    next_subscriber_id: AtomicU64,

    block_broker: Broker<Block>,
    supervisor: Supervisor,
    submission: SubmissionManager,
    state_slot: StateStoreSlot,

    mux: OnceLock<Arc<dyn Multiplexer>>,
    engine: OnceLock<Arc<dyn EngineNode>>,
    monitor: OnceLock<FailureMonitor>,
    backends: OnceLock<DomainBackends>,
    service_clients: Mutex<Vec<Arc<dyn ServiceClient>>>,
    start_fn: OnceLock<StartFn>,
}

/// Handle to the consensus host. Clones share the same underlying service.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    /// Construct the host: fetch and verify the genesis document, allocate
    /// the submission manager, and run lazy initialization.
    pub fn new(
        config: HostConfig,
        identity: Identity,
        dependencies: HostDependencies,
    ) -> HostResult<Self> {
        config.validate()?;
        config.ensure_directories()?;

        let genesis = dependencies.genesis_provider.genesis_document()?;
        if genesis.consensus.backend != BACKEND_NAME {
            return Err(HostError::Config(format!(
                "genesis document declares incorrect consensus backend: {}",
                genesis.consensus.backend
            )));
        }

        info!(chain_id = %genesis.chain_id, "starting a full consensus node");

        let submission = SubmissionManager::new(
            Box::new(StaticPriceDiscovery::new(config.submission.gas_price)),
            config.submission.max_fee,
        );
        let (started_tx, _) = watch::channel(false);
        let (synced_tx, _) = watch::channel(false);

        let host = Self {
            inner: Arc::new(HostInner {
                config,
                identity,
                genesis: Arc::new(genesis),
                upgrader: dependencies.upgrader,
                mux_factory: dependencies.mux_factory,
                engine_factory: dependencies.engine_factory,
                service_factory: dependencies.service_factory,
                flags: Mutex::new(LifecycleFlags {
                    initialized: false,
                    started: false,
                }),
                started_tx,
                synced_tx,
                next_subscriber_id: AtomicU64::new(0),
                block_broker: Broker::new(),
                supervisor: Supervisor::new(),
                submission,
                state_slot: StateStoreSlot::new(),
                mux: OnceLock::new(),
                engine: OnceLock::new(),
                monitor: OnceLock::new(),
                backends: OnceLock::new(),
                service_clients: Mutex::new(Vec::new()),
                start_fn: OnceLock::new(),
            }),
        };
        host.initialize()?;
        Ok(host)
    }

    // ------------------------------------------------------------------
    // Lifecycle.
    // ------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.inner.flags.lock().initialized
    }

    pub fn is_started(&self) -> bool {
        self.inner.flags.lock().started
    }

    pub fn is_synced(&self) -> bool {
        *self.inner.synced_tx.borrow()
    }

    /// Wait for the started signal. Errors with [`HostError::Canceled`] if
    /// the host is dropped before starting.
    pub async fn wait_started(&self) -> HostResult<()> {
        let mut watcher = self.inner.started_tx.subscribe();
        watcher
            .wait_for(|started| *started)
            .await
            .map(|_| ())
            .map_err(|_| HostError::Canceled)
    }

    /// Wait for the one-shot synced signal.
    pub async fn wait_synced(&self) -> HostResult<()> {
        let mut watcher = self.inner.synced_tx.subscribe();
        watcher
            .wait_for(|synced| *synced)
            .await
            .map(|_| ())
            .map_err(|_| HostError::Canceled)
    }

    pub fn supported_features(&self) -> FeatureMask {
        FeatureMask::SERVICES.union(FeatureMask::FULL_NODE)
    }

    /// Two-phase start: multiplexer, then the deferred engine construction
    /// (replay), then the engine node and all background workers.
    pub async fn start(&self) -> HostResult<()> {
        if self.is_started() {
            return Err(HostError::Internal("service already started".into()));
        }

        if self.is_initialized() {
            self.mux()?.start().await?;

            let start_fn = self
                .inner
                .start_fn
                .get()
                .cloned()
                .ok_or_else(|| HostError::Internal("engine start function missing".into()))?;
            // Engine construction replays the chain synchronously and can
            // panic before the failure monitor exists; recover the panic
            // into a start error.
            let engine = tokio::task::spawn_blocking(move || {
                match catch_unwind(AssertUnwindSafe(|| (*start_fn)())) {
                    Ok(result) => result,
                    Err(panic) => Err(HostError::Engine(describe_panic(panic))),
                }
            })
            .await
            .map_err(|err| HostError::Internal(format!("engine construction task: {err}")))??;

            let monitor = FailureMonitor::new(engine.consensus_terminated());
            engine.start().await?;
            let _ = self.inner.engine.set(engine);
            let _ = self.inner.monitor.set(monitor);

            let clients = self.inner.service_clients.lock().clone();
            for client in clients {
                let host = self.clone();
                self.inner.supervisor.spawn("service-client", async move {
                    service_client_worker(host, client).await
                });
            }
            let host = self.clone();
            self.inner
                .supervisor
                .spawn("sync", async move { sync_worker(host).await });
            let host = self.clone();
            self.inner
                .supervisor
                .spawn("block-notifier", async move {
                    block_notifier_worker(host).await
                });
            if self.inner.config.metrics.enabled {
                let host = self.clone();
                self.inner
                    .supervisor
                    .spawn("metrics", async move { metrics_worker(host).await });
            }
        } else {
            // A host that never initialized has nothing to sync.
            let _ = self.inner.synced_tx.send(true);
        }

        self.inner.flags.lock().started = true;
        let _ = self.inner.started_tx.send(true);
        Ok(())
    }

    /// Stop the engine and every worker. Safe to call only after start.
    pub async fn stop(&self) {
        if !self.is_initialized() || !self.is_started() {
            return;
        }

        if let Some(monitor) = self.inner.monitor.get() {
            monitor.mark_clean_shutdown();
        }
        if let Some(engine) = self.inner.engine.get() {
            engine.stop().await;
        }
        self.inner.supervisor.shutdown().await;
        if let Some(mux) = self.inner.mux.get() {
            mux.stop().await;
        }
        if let Some(engine) = self.inner.engine.get() {
            let mut terminated = engine.terminated();
            let _ = terminated.wait_for(|done| *done).await;
        }
    }

    /// Completes when the engine node has terminated. Pending until the
    /// host has been started.
    pub async fn quit(&self) {
        if self.wait_started().await.is_err() {
            return;
        }
        if let Some(engine) = self.inner.engine.get() {
            let mut terminated = engine.terminated();
            let _ = terminated.wait_for(|done| *done).await;
        }
    }

    /// Drain remaining background workers.
    pub async fn cleanup(&self) {
        self.inner.supervisor.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Initialization.
    // ------------------------------------------------------------------

    fn initialize(&self) -> HostResult<()> {
        let mut flags = self.inner.flags.lock();
        if flags.initialized {
            return Ok(());
        }

        self.lazy_init()?;

        // Apply the genesis public key blacklist to the process-wide
        // signature verifier.
        for raw in &self.inner.genesis.consensus.parameters.public_key_blacklist {
            let public_key = crypto::public_key_from_hex(raw).map_err(|err| {
                error!(?err, key = %raw, "initialize: failed to blacklist key");
                err
            })?;
            crypto::blacklist_public_key(&public_key)?;
        }

        let mux = self.mux()?;

        // Epoch-time first: the multiplexer and every other backend depend
        // on it.
        let epochtime = self.inner.service_factory.epochtime(&self.inner.genesis)?;
        mux.set_epochtime(epochtime.backend.clone())?;

        // Remaining backends, in dependency order.
        let beacon = self.inner.service_factory.beacon()?;
        let keymanager = self.inner.service_factory.keymanager()?;
        let registry = self.inner.service_factory.registry()?;
        let staking = self.inner.service_factory.staking()?;
        let scheduler = self.inner.service_factory.scheduler()?;
        let roothash = self
            .inner
            .service_factory
            .roothash(&self.inner.config.data_dir)?;

        {
            let mut clients = self.inner.service_clients.lock();
            clients.push(epochtime.client.clone());
            clients.push(beacon.client.clone());
            clients.push(keymanager.client.clone());
            clients.push(registry.client.clone());
            clients.push(staking.client.clone());
            clients.push(scheduler.client.clone());
            clients.push(roothash.client.clone());
        }
        let _ = self.inner.backends.set(DomainBackends {
            epochtime: epochtime.backend,
            beacon: beacon.backend,
            keymanager: keymanager.backend,
            registry: registry.backend,
            staking: staking.backend,
            scheduler: scheduler.backend,
            roothash: roothash.backend,
        });

        if self.inner.config.supplementary_sanity.enabled {
            info!("supplementary sanity checks are enabled");
            mux.register_application(Arc::new(SupplementarySanityApp::new(
                self.inner.config.supplementary_sanity.interval,
            )))?;
        }

        flags.initialized = true;
        Ok(())
    }

    /// Build the multiplexer and the deferred engine start function. No
    /// domain application is registered yet when this runs.
    fn lazy_init(&self) -> HostResult<()> {
        let config = &self.inner.config;
        let genesis = &self.inner.genesis;
        let state_dir = config.state_dir();

        let mux = self.inner.mux_factory.build(
            self.inner.upgrader.clone(),
            MuxConfig {
                data_dir: state_dir.clone(),
                pruning: config.prune.clone(),
                halt_epoch: genesis.halt_epoch,
                min_gas_price: config.min_gas_price,
                own_tx_signer: self.inner.identity.node.public,
                disable_check_tx: config.check_tx_disabled(),
                checkpointer_disabled: config.checkpointer.disabled,
                checkpointer_check_interval: Duration::from_secs(
                    config.checkpointer.check_interval_secs,
                ),
                initial_height: genesis.height,
            },
        )?;
        let _ = self.inner.mux.set(mux.clone());

        engine::init_data_dir(&state_dir)?;

        let engine_config = self.materialize_engine_config(&state_dir)?;
        let validator_key_path =
            crypto::persist_validator_key(&state_dir, &self.inner.identity.consensus)?;

        // Constructing the engine node triggers replay and chain
        // initialization, which must not happen before every application is
        // registered with the multiplexer. Defer it behind the start
        // function invoked during start.
        let engine_factory = self.inner.engine_factory.clone();
        let launch_genesis = self.inner.genesis.clone();
        let state_slot = self.inner.state_slot.clone();
        let start_fn: StartFn = Arc::new(move || {
            let node = engine_factory.build(EngineLaunchSpec {
                config: engine_config.clone(),
                genesis: launch_genesis.clone(),
                validator_key_path: validator_key_path.clone(),
                mux: mux.clone(),
                state_slot: state_slot.clone(),
            })?;
            if state_slot.get().is_none() {
                // Sanity check for the state capture hook in case the
                // engine's database provider changes.
                return Err(HostError::Internal(
                    "state database handle not captured during engine construction".into(),
                ));
            }
            Ok(node)
        });
        let _ = self.inner.start_fn.set(start_fn);

        Ok(())
    }

    /// Materialize the engine configuration from genesis parameters and
    /// host options.
    fn materialize_engine_config(
        &self,
        state_dir: &std::path::Path,
    ) -> HostResult<EngineConfig> {
        let config = &self.inner.config;
        let params = &self.inner.genesis.consensus.parameters;

        // Peer identifiers are matched byte-exactly (and therefore
        // case-sensitively) by the engine; lowercase everything on ingest.
        let mut persistent_peers = join_peers_lowercase(&config.p2p.persistent_peers);
        let mut private_peer_ids = String::new();
        let mut unconditional_peer_ids = join_peers_lowercase(&config.p2p.unconditional_peer_ids);
        let seeds = join_peers_lowercase(&config.p2p.seeds);

        if !config.sentry.upstream_addresses.is_empty() {
            info!(addresses = ?config.sentry.upstream_addresses, "acting as a consensus sentry");

            let upstream = join_peers_lowercase(&config.sentry.upstream_addresses);
            if !persistent_peers.is_empty() {
                persistent_peers.push(',');
            }
            persistent_peers.push_str(&upstream);

            let mut upstream_ids = Vec::new();
            for address in &config.sentry.upstream_addresses {
                let mut parts = address.splitn(2, '@');
                match (parts.next(), parts.next()) {
                    (Some(id), Some(_)) if !id.is_empty() => {
                        upstream_ids.push(id.to_string());
                    }
                    _ => {
                        return Err(HostError::Config(format!(
                            "malformed sentry upstream address: {address}"
                        )));
                    }
                }
            }
            let upstream_ids = join_peers_lowercase(&upstream_ids);
            private_peer_ids = upstream_ids.clone();
            if !unconditional_peer_ids.is_empty() {
                unconditional_peer_ids.push(',');
            }
            unconditional_peer_ids.push_str(&upstream_ids);
        }

        let pex_enabled = !config.p2p.disable_peer_exchange;
        if !pex_enabled {
            info!("peer exchange disabled");
        }

        let state_sync = if config.state_sync.enabled {
            info!("state sync enabled");
            let trust_hash = hex::decode(&config.state_sync.trust_hash).map_err(|err| {
                HostError::Config(format!("invalid state sync trust hash: {err}"))
            })?;
            Some(StateSyncProviderConfig {
                trust_period: Duration::from_secs(config.state_sync.trust_period_secs),
                trust_height: config.state_sync.trust_height,
                trust_hash,
                consensus_nodes: config.state_sync.consensus_nodes.clone(),
            })
        } else {
            None
        };

        Ok(EngineConfig {
            state_dir: state_dir.to_path_buf(),
            timeout_commit: Duration::from_millis(params.timeout_commit_ms),
            skip_timeout_commit: params.skip_timeout_commit,
            empty_block_interval: Duration::from_millis(params.empty_block_interval_ms),
            replay_recover_corrupted_wal: config.replay_recovery_enabled(),
            listen_address: config.p2p.listen_address.clone(),
            external_address: config.p2p.external_address.clone(),
            persistent_peers,
            persistent_peers_max_dial_period: Duration::from_secs(
                config.p2p.persistent_peers_max_dial_period_secs,
            ),
            private_peer_ids,
            unconditional_peer_ids,
            seeds,
            pex_enabled,
            addr_book_strict: !(config.p2p.debug_addr_book_lenient && config.debug.allow_unsafe),
            allow_duplicate_ip: config.p2p.debug_allow_duplicate_ip && config.debug.allow_unsafe,
            max_num_inbound_peers: config.p2p.max_num_inbound_peers,
            max_num_outbound_peers: config.p2p.max_num_outbound_peers,
            send_rate: config.p2p.send_rate,
            recv_rate: config.p2p.recv_rate,
            state_sync,
        })
    }

    // ------------------------------------------------------------------
    // Submission.
    // ------------------------------------------------------------------

    /// Broadcast a signed transaction and wait for it to be committed.
    ///
    /// At-most-once-committed delivery: the commit subscription is created
    /// strictly before the mempool broadcast, so the commit event cannot be
    /// missed. Returns when the transaction commits, is invalidated on
    /// recheck, or the subscription is cancelled; dropping the returned
    /// future releases every resource held by the call.
    pub async fn submit_tx(&self, tx: &SignedTransaction) -> HostResult<()> {
        let data = tx.to_bytes()?;
        let query = EventQuery::Tx(data.clone());
        let subscriber = self.next_subscriber_id();

        let mut commit_sub = self.subscribe(&subscriber, query.clone()).await?;
        let outcome = self.wait_tx_outcome(&mut commit_sub, &data).await;
        if let Err(err) = self.unsubscribe(&subscriber, query).await {
            debug!(?err, subscriber, "failed to release commit subscription");
        }
        outcome
    }

    async fn wait_tx_outcome(
        &self,
        commit_sub: &mut BufferedSubscription,
        data: &[u8],
    ) -> HostResult<()> {
        // Watch for mempool invalidation before broadcasting; the watch and
        // the commit subscription race fairly afterwards.
        let tx_hash = crypto::tx_hash(data);
        let mut invalidation = self.mux()?.watch_invalidated_tx(tx_hash)?;

        self.broadcast_tx_raw(data.to_vec()).await?;

        let mut invalidation_open = true;
        loop {
            tokio::select! {
                invalidated = invalidation.recv(), if invalidation_open => {
                    match invalidated {
                        Some(err) => return Err(err),
                        None => invalidation_open = false,
                    }
                }
                event = commit_sub.recv() => match event {
                    Some(EngineEvent::Tx { result, .. }) => {
                        if result.is_ok() {
                            return Ok(());
                        }
                        return Err(result_error(&result.module, result.code, &result.log));
                    }
                    Some(other) => {
                        debug!(?other, "ignoring unexpected event on commit subscription");
                    }
                    None => return Err(HostError::Canceled),
                },
            }
        }
    }

    async fn broadcast_tx_raw(&self, data: Vec<u8>) -> HostResult<()> {
        let engine = self.engine()?;
        match engine.check_tx(data).await {
            Ok(result) if result.is_ok() => Ok(()),
            Ok(result) => Err(result_error(&result.module, result.code, &result.log)),
            Err(CheckTxError::InCache) => Err(HostError::DuplicateTx),
            Err(CheckTxError::Transport(message)) => Err(HostError::Engine(format!(
                "failed to submit to local mempool: {message}"
            ))),
        }
    }

    /// Submit Byzantine-behavior evidence through the engine.
    pub async fn submit_evidence(&self, evidence: &Evidence) -> HostResult<()> {
        let decoded = engine::EngineEvidence::decode(&evidence.meta)?;
        self.engine()?
            .broadcast_evidence(decoded)
            .await
            .map_err(|err| HostError::Engine(format!("broadcast evidence failed: {err}")))
    }

    /// Dry-run gas estimation through the multiplexer.
    pub fn estimate_gas(&self, signer: &PublicKey, transaction: &Transaction) -> HostResult<u64> {
        self.mux()?.estimate_gas(signer, transaction)
    }

    pub async fn get_signer_nonce(&self, signer: &PublicKey) -> HostResult<u64> {
        let handler = self
            .mux()?
            .transaction_auth_handler()
            .ok_or(HostError::Unsupported)?;
        handler.signer_nonce(signer).await
    }

    /// Price, sign, and submit a transaction under the node identity.
    pub async fn sign_and_submit(&self, transaction: Transaction) -> HostResult<()> {
        let estimated_gas = if transaction.fee.is_none() {
            self.estimate_gas(&self.inner.identity.node.public, &transaction)?
        } else {
            0
        };
        let signed =
            self.inner
                .submission
                .sign_transaction(&self.inner.identity.node, transaction, estimated_gas)?;
        self.submit_tx(&signed).await
    }

    pub fn submission_manager(&self) -> &SubmissionManager {
        &self.inner.submission
    }

    // ------------------------------------------------------------------
    // Queries.
    // ------------------------------------------------------------------

    pub async fn get_block(&self, height: Height) -> HostResult<Block> {
        self.engine_block(height)
            .await?
            .ok_or(HostError::NoCommittedBlocks)
    }

    pub async fn get_transactions(&self, height: Height) -> HostResult<Vec<Vec<u8>>> {
        Ok(self.get_block(height).await?.transactions)
    }

    pub async fn get_transactions_with_results(
        &self,
        height: Height,
    ) -> HostResult<TransactionsWithResults> {
        let block = self.get_block(height).await?;
        let results = self.block_results(block.height).await?;
        Ok(TransactionsWithResults {
            transactions: block.transactions,
            results: results.results,
        })
    }

    pub fn get_unconfirmed_transactions(&self) -> HostResult<Vec<Vec<u8>>> {
        Ok(self.engine()?.unconfirmed_txs())
    }

    pub fn get_last_retained_version(&self) -> HostResult<u64> {
        self.mux()?.last_retained_version()
    }

    pub async fn get_status(&self) -> HostResult<Status> {
        let genesis = &self.inner.genesis;
        let mut status = Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: BACKEND_NAME.to_string(),
            features: self.supported_features(),
            genesis_height: genesis.height,
            genesis_hash: None,
            last_retained_height: genesis.height,
            last_retained_hash: None,
            latest_height: 0,
            latest_hash: None,
            latest_time: None,
            latest_state_root: None,
            node_peers: Vec::new(),
            is_validator: false,
        };

        if self.is_started() {
            // Only fetch blocks once started; earlier requests would block
            // on the started signal.
            if let Ok(block) = self.get_block(Height::At(genesis.height)).await {
                status.genesis_hash = Some(hex::encode(&block.hash));
            }

            let mut last_retained_height = self.get_last_retained_version()?;
            // Some pruning configurations return 0 instead of a valid
            // height; clamp to the genesis height.
            if last_retained_height < genesis.height {
                last_retained_height = genesis.height;
            }
            status.last_retained_height = last_retained_height;
            if let Ok(block) = self.get_block(Height::At(last_retained_height)).await {
                status.last_retained_hash = Some(hex::encode(&block.hash));
            }

            match self.get_block(Height::Latest).await {
                Ok(block) => {
                    status.latest_height = block.height;
                    status.latest_hash = Some(hex::encode(&block.hash));
                    status.latest_time = Some(block.time);
                    status.latest_state_root = Some(hex::encode(&block.state_root));
                }
                Err(HostError::NoCommittedBlocks) => {}
                Err(err) => return Err(err),
            }

            status.node_peers = self.engine()?.peers();
        }

        // Whether the local node is in the validator set for the latest
        // (uncommitted) block.
        if let Some(store) = self.inner.state_slot.get() {
            let mut valset_height = status.latest_height + 1;
            if valset_height < genesis.height {
                valset_height = genesis.height;
            }
            let consensus_addr = crypto::consensus_address(&self.inner.identity.consensus.public);
            status.is_validator = store
                .validator_set(valset_height)?
                .has_address(&consensus_addr);
        }

        Ok(status)
    }

    /// Merge per-domain state snapshots pinned at `height` with the chain
    /// identity carried over from the initial genesis document.
    pub async fn state_to_genesis(&self, height: Height) -> HostResult<Document> {
        let block = self.get_block(height).await?;
        let pinned_height = block.height;
        let genesis = &self.inner.genesis;
        let backends = self.backends()?;

        let epochtime_raw = backends.epochtime.state_to_genesis(pinned_height).await?;
        let epochtime: EpochTimeGenesis = serde_json::from_value(epochtime_raw).map_err(|err| {
            HostError::Internal(format!("epochtime genesis snapshot malformed: {err}"))
        })?;

        Ok(Document {
            chain_id: genesis.chain_id.clone(),
            height: pinned_height,
            time: block.time,
            halt_epoch: genesis.halt_epoch,
            epochtime,
            consensus: genesis.consensus.clone(),
            // The beacon state is carried over from the initial document.
            beacon: genesis.beacon.clone(),
            keymanager: backends.keymanager.state_to_genesis(pinned_height).await?,
            registry: backends.registry.state_to_genesis(pinned_height).await?,
            roothash: backends.roothash.state_to_genesis(pinned_height).await?,
            scheduler: backends.scheduler.state_to_genesis(pinned_height).await?,
            staking: backends.staking.state_to_genesis(pinned_height).await?,
        })
    }

    pub fn genesis_document(&self) -> Arc<Document> {
        self.inner.genesis.clone()
    }

    pub async fn get_epoch(&self, height: Height) -> HostResult<EpochTime> {
        let backends = self.backends()?;
        let resolved = match height {
            Height::Latest => self.mux()?.block_height(),
            Height::At(height) => height,
        };
        backends.epochtime.epoch_at(resolved).await
    }

    /// Block until the epoch-time backend reports an epoch at or past
    /// `epoch`.
    pub async fn wait_epoch(&self, epoch: EpochTime) -> HostResult<()> {
        let backends = self.backends()?;
        let mut watcher = backends.epochtime.watch_epochs();
        watcher
            .wait_for(|current| *current >= epoch)
            .await
            .map(|_| ())
            .map_err(|_| HostError::Canceled)
    }

    pub fn get_addresses(&self) -> HostResult<Vec<ConsensusAddress>> {
        let external = &self.inner.config.p2p.external_address;
        if external.is_empty() {
            return Err(HostError::Config(
                "p2p.external_address is not configured".into(),
            ));
        }
        Ok(vec![ConsensusAddress {
            id: hex::encode(self.inner.identity.p2p.public.to_bytes()),
            address: external.clone(),
        }])
    }

    pub fn consensus_key(&self) -> PublicKey {
        self.inner.identity.consensus.public
    }

    /// Stream of committed blocks. Late subscribers only observe blocks
    /// committed after subscription; dropping the handle detaches it.
    pub fn watch_blocks(&self) -> BrokerSubscription<Block> {
        self.inner.block_broker.subscribe()
    }

    // ------------------------------------------------------------------
    // Extension points.
    // ------------------------------------------------------------------

    pub fn register_application(&self, app: Arc<dyn Application>) -> HostResult<()> {
        self.mux()?.register_application(app)
    }

    pub fn set_transaction_auth_handler(
        &self,
        handler: Arc<dyn TransactionAuthHandler>,
    ) -> HostResult<()> {
        self.mux()?.set_transaction_auth_handler(handler)
    }

    pub fn register_halt_hook(&self, hook: HaltHook) {
        if !self.is_initialized() {
            return;
        }
        if let Some(mux) = self.inner.mux.get() {
            mux.register_halt_hook(hook);
        }
    }

    // ------------------------------------------------------------------
    // Domain backend accessors.
    // ------------------------------------------------------------------

    pub fn epochtime(&self) -> HostResult<Arc<dyn EpochTimeBackend>> {
        Ok(self.backends()?.epochtime.clone())
    }

    pub fn beacon(&self) -> HostResult<Arc<dyn Backend>> {
        Ok(self.backends()?.beacon.clone())
    }

    pub fn keymanager(&self) -> HostResult<Arc<dyn Backend>> {
        Ok(self.backends()?.keymanager.clone())
    }

    pub fn registry(&self) -> HostResult<Arc<dyn Backend>> {
        Ok(self.backends()?.registry.clone())
    }

    pub fn staking(&self) -> HostResult<Arc<dyn Backend>> {
        Ok(self.backends()?.staking.clone())
    }

    pub fn scheduler(&self) -> HostResult<Arc<dyn Backend>> {
        Ok(self.backends()?.scheduler.clone())
    }

    pub fn roothash(&self) -> HostResult<Arc<dyn Backend>> {
        Ok(self.backends()?.roothash.clone())
    }

    // ------------------------------------------------------------------
    // Internals.
    // ------------------------------------------------------------------

    fn mux(&self) -> HostResult<Arc<dyn Multiplexer>> {
        self.inner
            .mux
            .get()
            .cloned()
            .ok_or_else(|| HostError::Internal("application multiplexer not available".into()))
    }

    fn engine(&self) -> HostResult<Arc<dyn EngineNode>> {
        self.inner
            .engine
            .get()
            .cloned()
            .ok_or_else(|| HostError::Internal("engine node not available".into()))
    }

    fn backends(&self) -> HostResult<&DomainBackends> {
        self.inner.backends.get().ok_or(HostError::Unsupported)
    }

    fn next_subscriber_id(&self) -> String {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{SUBSCRIBER_PREFIX}/subscriber-{id}")
    }

    /// Subscribe to an engine event query through the buffer shim.
    /// Blocks until the started signal when called before start: the engine
    /// node does not exist earlier, since creating it triggers replay.
    async fn subscribe(
        &self,
        subscriber: &str,
        query: EventQuery,
    ) -> HostResult<BufferedSubscription> {
        if !self.is_started() {
            debug!(subscriber, "subscribe: node not available yet, blocking");
            self.wait_started().await?;
        }

        let engine = self.engine()?;
        match engine.event_bus().subscribe(subscriber, query).await? {
            Some(raw) => Ok(BufferedSubscription::new(raw)),
            // The engine returns no subscription while shutting down;
            // surface it as a cancellation.
            None => Err(HostError::Canceled),
        }
    }

    async fn unsubscribe(&self, subscriber: &str, query: EventQuery) -> HostResult<()> {
        if !self.is_started() {
            return Err(HostError::Internal(
                "unsubscribe called with no backing service".into(),
            ));
        }
        self.engine()?.event_bus().unsubscribe(subscriber, query).await
    }

    /// Fetch a block through the mux-aware path. `Height::Latest` resolves
    /// through the multiplexer's committed height, never the engine's block
    /// store, because the engine may report blocks whose application state
    /// has not materialized yet.
    async fn engine_block(&self, height: Height) -> HostResult<Option<Block>> {
        self.wait_started().await?;

        let resolved = match height {
            Height::Latest => {
                let mux_height = self.mux()?.block_height();
                if mux_height == 0 {
                    return Ok(None);
                }
                mux_height
            }
            Height::At(height) => height,
        };
        self.engine()?.block(resolved).await
    }

    async fn block_results(&self, height: u64) -> HostResult<BlockResults> {
        self.engine()?.block_results(height).await
    }
}

fn describe_panic(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "engine construction panicked".to_string()
    }
}

// ----------------------------------------------------------------------
// Background workers.
// ----------------------------------------------------------------------

/// Dispatch decoded engine events into one domain service client.
async fn service_client_worker(host: Host, client: Arc<dyn ServiceClient>) -> anyhow::Result<()> {
    let descriptor = client.descriptor();
    let subscriber = format!("{SUBSCRIBER_PREFIX}/{}", descriptor.name);
    let mut subscription = match host.subscribe(&subscriber, descriptor.query.clone()).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(service = descriptor.name, ?err, "service client subscription failed");
            return Ok(());
        }
    };

    while let Some(event) = subscription.recv().await {
        if let Err(err) = client.deliver_event(&event).await {
            warn!(service = descriptor.name, ?err, "service client failed to process event");
        }
    }
    debug!(service = descriptor.name, "service client event stream closed");
    let _ = host.unsubscribe(&subscriber, descriptor.query).await;
    Ok(())
}

/// Poll the engine for fast-sync completion and close the synced signal
/// once the chain head is fresh.
async fn sync_worker(host: Host) -> anyhow::Result<()> {
    let engine = host.engine()?;
    let mut terminated = engine.terminated();
    let mut ticker = time::interval(SYNC_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        if *terminated.borrow() {
            return Ok(());
        }
        tokio::select! {
            changed = terminated.changed() => {
                match changed {
                    Ok(()) => {
                        if *terminated.borrow() {
                            return Ok(());
                        }
                    }
                    Err(_) => return Ok(()),
                }
            }
            _ = ticker.tick() => {
                // The reactor disappears when the engine is torn down
                // mid-poll; exit without closing the signal.
                eprintln!("DEBUG tick");
                let Some(is_fast_syncing) = engine.is_fast_syncing() else {
                    warn!("consensus reactor gone, engine terminated?");
                    return Ok(());
                };
                eprintln!("DEBUG is_fast_syncing={is_fast_syncing}");
                if is_fast_syncing {
                    continue;
                }

                let block = match host.engine_block(Height::Latest).await {
                    Ok(block) => block,
                    Err(err) => {
                        eprintln!("DEBUG engine_block err={err:?}");
                        error!(?err, "failed to fetch latest block");
                        return Ok(());
                    }
                };
                eprintln!("DEBUG block={block:?}");

                let now = SystemTime::now();
                let fresh = match &block {
                    None => true,
                    Some(block) => now
                        .duration_since(block.time)
                        .map(|age| age < SYNC_FRESHNESS_THRESHOLD)
                        .unwrap_or(true),
                };
                if fresh {
                    info!("initial sync complete");
                    let _ = host.inner.synced_tx.send(true);
                    return Ok(());
                }
                debug!(height = block.as_ref().map(|b| b.height), "node still syncing");
            }
        }
    }
}

/// Ingest new-block events once and fan them out to every attached watcher.
async fn block_notifier_worker(host: Host) -> anyhow::Result<()> {
    let engine = host.engine()?;
    let raw = match engine
        .event_bus()
        .subscribe(BLOCK_NOTIFIER_SUBSCRIBER, EventQuery::NewBlock)
        .await
    {
        Ok(Some(raw)) => raw,
        // Nil subscription: the engine is already shutting down.
        Ok(None) => return Ok(()),
        Err(err) => {
            error!(?err, "failed to subscribe to new block events");
            return Ok(());
        }
    };

    let EngineSubscription {
        mut out,
        mut cancelled,
    } = raw;
    loop {
        // Must not exit on host shutdown signals: that could deadlock the
        // engine during its own stop sequence. Only subscription
        // cancellation terminates the worker.
        tokio::select! {
            _ = cancelled.wait_for(|done| *done) => break,
            event = out.recv() => match event {
                Some(EngineEvent::NewBlock(block)) => {
                    host.inner.block_broker.broadcast(block);
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    let _ = engine
        .event_bus()
        .unsubscribe(BLOCK_NOTIFIER_SUBSCRIBER, EventQuery::NewBlock)
        .await;
    Ok(())
}

/// Update block production metrics from the notifier stream.
async fn metrics_worker(host: Host) -> anyhow::Result<()> {
    let engine = host.engine()?;
    let mut terminated = engine.terminated();
    let mut blocks = host.watch_blocks();
    let my_address = crypto::consensus_address(&host.inner.identity.consensus.public);

    loop {
        let block = tokio::select! {
            _ = terminated.wait_for(|done| *done) => return Ok(()),
            block = blocks.recv() => match block {
                Some(block) => block,
                None => return Ok(()),
            },
        };

        if block.proposer_address == my_address {
            metrics::counter!(METRIC_PROPOSED_BLOCKS, 1);
        }
        for signature in &block.last_commit {
            if signature.absent {
                continue;
            }
            if signature.validator_address == my_address {
                metrics::counter!(METRIC_SIGNED_BLOCKS, 1);
                break;
            }
        }
    }
}
