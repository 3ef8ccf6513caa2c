//! In-process mock collaborators for driving the host through its full
//! lifecycle without a real engine.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use helix_consensus::config::HostConfig;
use helix_consensus::crypto::{self, Identity};
use helix_consensus::engine::{
    BlockResults, CheckTxError, EngineConfig, EngineEvent, EngineEvidence, EngineFactory,
    EngineLaunchSpec, EngineNode, EngineSubscription, EventBus, EventQuery, TxResult,
    ValidatorSet, ValidatorStore,
};
use helix_consensus::errors::{HostError, HostResult};
use helix_consensus::genesis::{Document, EpochTimeGenesis, StaticGenesisProvider};
use helix_consensus::host::{Host, HostDependencies};
use helix_consensus::mux::{
    Application, HaltHook, InvalidationWatch, Multiplexer, MuxConfig, MuxFactory,
    TransactionAuthHandler, UpgradeBackend,
};
use helix_consensus::services::{
    Backend, EpochTimeBackend, EpochTimeHandle, ServiceClient, ServiceClientFactory,
    ServiceDescriptor, ServiceHandle,
};
use helix_consensus::transaction::{SignedTransaction, Transaction};
use helix_consensus::types::{Block, EpochTime, Evidence};

// ----------------------------------------------------------------------
// Shared chain state (engine block store + mux committed height).
// ----------------------------------------------------------------------

pub struct ChainState {
    genesis_height: u64,
    blocks: Mutex<Vec<Block>>,
    committed_height: AtomicU64,
    results: Mutex<HashMap<u64, BlockResults>>,
}

impl ChainState {
    pub fn new(genesis_height: u64) -> Arc<Self> {
        Arc::new(Self {
            genesis_height,
            blocks: Mutex::new(Vec::new()),
            committed_height: AtomicU64::new(0),
            results: Mutex::new(HashMap::new()),
        })
    }

    pub fn next_height(&self) -> u64 {
        let blocks = self.blocks.lock();
        blocks
            .last()
            .map(|block| block.height + 1)
            .unwrap_or(self.genesis_height)
    }

    pub fn block_at(&self, height: u64) -> Option<Block> {
        let blocks = self.blocks.lock();
        blocks.iter().find(|block| block.height == height).cloned()
    }

    pub fn committed_height(&self) -> u64 {
        self.committed_height.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------
// Engine event bus.
// ----------------------------------------------------------------------

struct SubEntry {
    query: EventQuery,
    sender: mpsc::Sender<EngineEvent>,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
pub struct MockEventBus {
    subs: Mutex<HashMap<String, SubEntry>>,
    subscribers_seen: Mutex<Vec<String>>,
    shutting_down: AtomicBool,
}

fn sub_key(subscriber: &str, query: &EventQuery) -> String {
    format!("{subscriber}|{query:?}")
}

fn query_matches(query: &EventQuery, event: &EngineEvent) -> bool {
    match (query, event) {
        (EventQuery::NewBlock, EngineEvent::NewBlock(_)) => true,
        (EventQuery::Tx(wanted), EngineEvent::Tx { tx, .. }) => wanted == tx,
        (EventQuery::Service(name), EngineEvent::Service(event)) => *name == event.service,
        _ => false,
    }
}

impl MockEventBus {
    pub fn publish(&self, event: &EngineEvent) {
        let subs = self.subs.lock();
        for entry in subs.values() {
            if query_matches(&entry.query, event) {
                let _ = entry.sender.try_send(event.clone());
            }
        }
    }

    pub fn cancel_all(&self) {
        let mut subs = self.subs.lock();
        for (_, entry) in subs.drain() {
            let _ = entry.cancel.send(true);
        }
    }

    pub fn set_shutting_down(&self, value: bool) {
        self.shutting_down.store(value, Ordering::SeqCst);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subs.lock().len()
    }

    pub fn subscribers_seen(&self) -> Vec<String> {
        self.subscribers_seen.lock().clone()
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn subscribe(
        &self,
        subscriber: &str,
        query: EventQuery,
    ) -> HostResult<Option<EngineSubscription>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let (sender, out) = mpsc::channel(16);
        let (cancel, cancelled) = watch::channel(false);
        self.subs.lock().insert(
            sub_key(subscriber, &query),
            SubEntry {
                query,
                sender,
                cancel,
            },
        );
        self.subscribers_seen.lock().push(subscriber.to_string());
        Ok(Some(EngineSubscription { out, cancelled }))
    }

    async fn unsubscribe(&self, subscriber: &str, query: EventQuery) -> HostResult<()> {
        if let Some(entry) = self.subs.lock().remove(&sub_key(subscriber, &query)) {
            let _ = entry.cancel.send(true);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Engine node.
// ----------------------------------------------------------------------

pub struct MockEngine {
    state: Arc<ChainState>,
    pub bus: Arc<MockEventBus>,
    terminated_tx: watch::Sender<bool>,
    consensus_tx: watch::Sender<bool>,
    fast_syncing: AtomicBool,
    reactor_gone: AtomicBool,
    auto_commit: AtomicBool,
    block_age: Mutex<Duration>,
    proposer: Mutex<Vec<u8>>,
    check_cache: Mutex<HashSet<[u8; 32]>>,
    mempool: Mutex<Vec<Vec<u8>>>,
    pub check_responses: Mutex<HashMap<Vec<u8>, TxResult>>,
    pub commit_results: Mutex<HashMap<Vec<u8>, TxResult>>,
    pub peers_list: Mutex<Vec<String>>,
    pub evidence: Mutex<Vec<EngineEvidence>>,
    pub evidence_fails: AtomicBool,
}

impl MockEngine {
    pub fn new(state: Arc<ChainState>) -> Arc<Self> {
        let (terminated_tx, _) = watch::channel(false);
        let (consensus_tx, _) = watch::channel(false);
        Arc::new(Self {
            state,
            bus: Arc::new(MockEventBus::default()),
            terminated_tx,
            consensus_tx,
            fast_syncing: AtomicBool::new(false),
            reactor_gone: AtomicBool::new(false),
            auto_commit: AtomicBool::new(true),
            block_age: Mutex::new(Duration::ZERO),
            proposer: Mutex::new(vec![0xee; 20]),
            check_cache: Mutex::new(HashSet::new()),
            mempool: Mutex::new(Vec::new()),
            check_responses: Mutex::new(HashMap::new()),
            commit_results: Mutex::new(HashMap::new()),
            peers_list: Mutex::new(Vec::new()),
            evidence: Mutex::new(Vec::new()),
            evidence_fails: AtomicBool::new(false),
        })
    }

    pub fn set_fast_syncing(&self, value: bool) {
        self.fast_syncing.store(value, Ordering::SeqCst);
    }

    pub fn set_reactor_gone(&self) {
        self.reactor_gone.store(true, Ordering::SeqCst);
    }

    pub fn set_auto_commit(&self, value: bool) {
        self.auto_commit.store(value, Ordering::SeqCst);
    }

    /// Age applied to the timestamp of subsequently committed blocks.
    pub fn set_block_age(&self, age: Duration) {
        *self.block_age.lock() = age;
    }

    pub fn set_proposer(&self, address: Vec<u8>) {
        *self.proposer.lock() = address;
    }

    /// Commit a block carrying `transactions`, publishing the new-block and
    /// per-transaction commit events the way the engine does.
    pub fn commit_block(&self, transactions: Vec<Vec<u8>>) -> Block {
        let height = self.state.next_height();
        let time = SystemTime::now()
            .checked_sub(*self.block_age.lock())
            .unwrap_or_else(SystemTime::now);
        let block = Block {
            height,
            hash: crypto::tx_hash(&height.to_le_bytes()).to_vec(),
            previous_hash: crypto::tx_hash(&height.wrapping_sub(1).to_le_bytes()).to_vec(),
            time,
            state_root: vec![height as u8; 32],
            proposer_address: self.proposer.lock().clone(),
            last_commit: Vec::new(),
            transactions: transactions.clone(),
        };

        let results = BlockResults {
            height,
            results: transactions
                .iter()
                .map(|tx| {
                    self.commit_results
                        .lock()
                        .get(tx)
                        .cloned()
                        .unwrap_or_default()
                })
                .collect(),
        };
        self.state.blocks.lock().push(block.clone());
        self.state.results.lock().insert(height, results);
        self.state.committed_height.store(height, Ordering::SeqCst);

        self.bus.publish(&EngineEvent::NewBlock(block.clone()));
        for tx in &transactions {
            let result = self
                .commit_results
                .lock()
                .get(tx)
                .cloned()
                .unwrap_or_default();
            self.bus.publish(&EngineEvent::Tx {
                tx: tx.clone(),
                result,
            });
            self.mempool.lock().retain(|pending| pending != tx);
        }
        block
    }
}

#[async_trait]
impl EngineNode for MockEngine {
    async fn start(&self) -> HostResult<()> {
        Ok(())
    }

    async fn stop(&self) {
        self.bus.set_shutting_down(true);
        self.bus.cancel_all();
        let _ = self.consensus_tx.send(true);
        let _ = self.terminated_tx.send(true);
    }

    fn terminated(&self) -> watch::Receiver<bool> {
        self.terminated_tx.subscribe()
    }

    fn consensus_terminated(&self) -> watch::Receiver<bool> {
        self.consensus_tx.subscribe()
    }

    fn event_bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    async fn check_tx(&self, tx: Vec<u8>) -> Result<TxResult, CheckTxError> {
        let hash = crypto::tx_hash(&tx);
        if !self.check_cache.lock().insert(hash) {
            return Err(CheckTxError::InCache);
        }
        if let Some(result) = self.check_responses.lock().get(&tx) {
            if !result.is_ok() {
                return Ok(result.clone());
            }
        }
        self.mempool.lock().push(tx.clone());
        if self.auto_commit.load(Ordering::SeqCst) {
            self.commit_block(vec![tx]);
        }
        Ok(TxResult::default())
    }

    fn unconfirmed_txs(&self) -> Vec<Vec<u8>> {
        self.mempool.lock().clone()
    }

    fn is_fast_syncing(&self) -> Option<bool> {
        if self.reactor_gone.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.fast_syncing.load(Ordering::SeqCst))
    }

    async fn block(&self, height: u64) -> HostResult<Option<Block>> {
        Ok(self.state.block_at(height))
    }

    async fn block_results(&self, height: u64) -> HostResult<BlockResults> {
        self.state
            .results
            .lock()
            .get(&height)
            .cloned()
            .ok_or_else(|| HostError::Engine(format!("no results for height {height}")))
    }

    async fn broadcast_evidence(&self, evidence: EngineEvidence) -> HostResult<()> {
        if self.evidence_fails.load(Ordering::SeqCst) {
            return Err(HostError::Engine("evidence channel unavailable".into()));
        }
        self.evidence.lock().push(evidence);
        Ok(())
    }

    fn peers(&self) -> Vec<String> {
        self.peers_list.lock().clone()
    }
}

// ----------------------------------------------------------------------
// Engine factory + validator store.
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct MockValidatorStore {
    pub validators: Mutex<Vec<Vec<u8>>>,
}

impl ValidatorStore for MockValidatorStore {
    fn validator_set(&self, _height: u64) -> HostResult<ValidatorSet> {
        Ok(ValidatorSet {
            addresses: self.validators.lock().clone(),
        })
    }
}

pub struct MockEngineFactory {
    engine: Arc<MockEngine>,
    pub validators: Arc<MockValidatorStore>,
    pub captured_config: Mutex<Option<EngineConfig>>,
    pub fail_with: Mutex<Option<String>>,
    pub panic_with: Mutex<Option<String>>,
    pub skip_state_capture: AtomicBool,
    pub build_calls: AtomicUsize,
}

impl MockEngineFactory {
    pub fn new(engine: Arc<MockEngine>, validators: Arc<MockValidatorStore>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            validators,
            captured_config: Mutex::new(None),
            fail_with: Mutex::new(None),
            panic_with: Mutex::new(None),
            skip_state_capture: AtomicBool::new(false),
            build_calls: AtomicUsize::new(0),
        })
    }
}

impl EngineFactory for MockEngineFactory {
    fn build(&self, spec: EngineLaunchSpec) -> HostResult<Arc<dyn EngineNode>> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        *self.captured_config.lock() = Some(spec.config.clone());
        if let Some(message) = self.panic_with.lock().clone() {
            panic!("{message}");
        }
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(HostError::Engine(message));
        }
        if !self.skip_state_capture.load(Ordering::SeqCst) {
            spec.state_slot.fulfill(self.validators.clone());
        }
        Ok(self.engine.clone())
    }
}

// ----------------------------------------------------------------------
// Application multiplexer.
// ----------------------------------------------------------------------

pub struct MockMux {
    state: Arc<ChainState>,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    pub last_retained: AtomicU64,
    pub gas_per_tx: AtomicU64,
    pub apps: Mutex<Vec<&'static str>>,
    auth: Mutex<Option<Arc<dyn TransactionAuthHandler>>>,
    pub epochtime_wired: AtomicBool,
    invalidations: Mutex<HashMap<[u8; 32], mpsc::UnboundedSender<HostError>>>,
    halt_hooks: Mutex<Vec<HaltHook>>,
}

impl MockMux {
    pub fn new(state: Arc<ChainState>) -> Arc<Self> {
        Arc::new(Self {
            state,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            last_retained: AtomicU64::new(0),
            gas_per_tx: AtomicU64::new(100),
            apps: Mutex::new(Vec::new()),
            auth: Mutex::new(None),
            epochtime_wired: AtomicBool::new(false),
            invalidations: Mutex::new(HashMap::new()),
            halt_hooks: Mutex::new(Vec::new()),
        })
    }

    /// Simulate a recheck eviction for the transaction with `hash`.
    pub fn invalidate(&self, hash: [u8; 32], err: HostError) -> bool {
        match self.invalidations.lock().get(&hash) {
            Some(sender) => sender.send(err).is_ok(),
            None => false,
        }
    }

    pub fn watch_count(&self) -> usize {
        self.invalidations.lock().len()
    }
}

#[async_trait]
impl Multiplexer for MockMux {
    async fn start(&self) -> HostResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn register_application(&self, app: Arc<dyn Application>) -> HostResult<()> {
        self.apps.lock().push(app.name());
        Ok(())
    }

    fn set_transaction_auth_handler(
        &self,
        handler: Arc<dyn TransactionAuthHandler>,
    ) -> HostResult<()> {
        *self.auth.lock() = Some(handler);
        Ok(())
    }

    fn transaction_auth_handler(&self) -> Option<Arc<dyn TransactionAuthHandler>> {
        self.auth.lock().clone()
    }

    fn register_halt_hook(&self, hook: HaltHook) {
        self.halt_hooks.lock().push(hook);
    }

    fn set_epochtime(&self, _backend: Arc<dyn EpochTimeBackend>) -> HostResult<()> {
        self.epochtime_wired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn block_height(&self) -> u64 {
        self.state.committed_height()
    }

    fn last_retained_version(&self) -> HostResult<u64> {
        Ok(self.last_retained.load(Ordering::SeqCst))
    }

    fn estimate_gas(&self, _signer: &ed25519_dalek::PublicKey, _tx: &Transaction) -> HostResult<u64> {
        Ok(self.gas_per_tx.load(Ordering::SeqCst))
    }

    fn watch_invalidated_tx(&self, tx_hash: [u8; 32]) -> HostResult<InvalidationWatch> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.invalidations.lock().insert(tx_hash, sender);
        Ok(InvalidationWatch::new(receiver))
    }
}

pub struct MockMuxFactory {
    mux: Arc<MockMux>,
    pub captured_config: Mutex<Option<MuxConfig>>,
}

impl MockMuxFactory {
    pub fn new(mux: Arc<MockMux>) -> Arc<Self> {
        Arc::new(Self {
            mux,
            captured_config: Mutex::new(None),
        })
    }
}

impl MuxFactory for MockMuxFactory {
    fn build(
        &self,
        _upgrader: Arc<dyn UpgradeBackend>,
        config: MuxConfig,
    ) -> HostResult<Arc<dyn Multiplexer>> {
        *self.captured_config.lock() = Some(config);
        Ok(self.mux.clone())
    }
}

pub struct NullUpgrader;

impl UpgradeBackend for NullUpgrader {
    fn pending_upgrade(&self) -> Option<String> {
        None
    }
}

// ----------------------------------------------------------------------
// Domain services.
// ----------------------------------------------------------------------

pub struct RecordingClient {
    name: &'static str,
    pub delivered: AtomicUsize,
}

impl RecordingClient {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            delivered: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ServiceClient for RecordingClient {
    fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name,
            query: EventQuery::Service(self.name.to_string()),
        }
    }

    async fn deliver_event(&self, _event: &EngineEvent) -> HostResult<()> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct NullBackend {
    name: &'static str,
}

#[async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn state_to_genesis(&self, height: u64) -> HostResult<serde_json::Value> {
        Ok(serde_json::json!({ "service": self.name, "height": height }))
    }
}

pub struct MockEpochTime {
    interval: u64,
    base: EpochTime,
    epoch_tx: watch::Sender<EpochTime>,
    pub mock_backend: bool,
}

impl MockEpochTime {
    pub fn new(genesis: &Document) -> Arc<Self> {
        let (epoch_tx, _) = watch::channel(genesis.epochtime.base);
        Arc::new(Self {
            interval: genesis.epochtime.parameters.interval.max(1),
            base: genesis.epochtime.base,
            epoch_tx,
            mock_backend: genesis.epochtime.parameters.debug_mock_backend,
        })
    }

    pub fn set_epoch(&self, epoch: EpochTime) {
        let _ = self.epoch_tx.send(epoch);
    }
}

#[async_trait]
impl Backend for MockEpochTime {
    fn name(&self) -> &'static str {
        "epochtime"
    }

    async fn state_to_genesis(&self, height: u64) -> HostResult<serde_json::Value> {
        let genesis = EpochTimeGenesis {
            parameters: helix_consensus::genesis::EpochTimeParameters {
                interval: self.interval,
                debug_mock_backend: self.mock_backend,
            },
            base: self.base + height / self.interval,
        };
        serde_json::to_value(genesis)
            .map_err(|err| HostError::Internal(format!("epochtime snapshot: {err}")))
    }
}

#[async_trait]
impl EpochTimeBackend for MockEpochTime {
    async fn epoch_at(&self, height: u64) -> HostResult<EpochTime> {
        Ok(self.base + height / self.interval)
    }

    fn watch_epochs(&self) -> watch::Receiver<EpochTime> {
        self.epoch_tx.subscribe()
    }
}

#[derive(Default)]
pub struct MockServiceFactory {
    pub epochtime: Mutex<Option<Arc<MockEpochTime>>>,
    pub clients: Mutex<Vec<Arc<RecordingClient>>>,
    pub build_order: Mutex<Vec<&'static str>>,
}

impl MockServiceFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn service(&self, name: &'static str) -> HostResult<ServiceHandle> {
        self.build_order.lock().push(name);
        let client = RecordingClient::new(name);
        self.clients.lock().push(client.clone());
        Ok(ServiceHandle {
            backend: Arc::new(NullBackend { name }),
            client,
        })
    }
}

impl ServiceClientFactory for MockServiceFactory {
    fn epochtime(&self, genesis: &Document) -> HostResult<EpochTimeHandle> {
        self.build_order.lock().push("epochtime");
        let backend = MockEpochTime::new(genesis);
        *self.epochtime.lock() = Some(backend.clone());
        let client = RecordingClient::new("epochtime");
        self.clients.lock().push(client.clone());
        Ok(EpochTimeHandle { backend, client })
    }

    fn beacon(&self) -> HostResult<ServiceHandle> {
        self.service("beacon")
    }

    fn keymanager(&self) -> HostResult<ServiceHandle> {
        self.service("keymanager")
    }

    fn registry(&self) -> HostResult<ServiceHandle> {
        self.service("registry")
    }

    fn staking(&self) -> HostResult<ServiceHandle> {
        self.service("staking")
    }

    fn scheduler(&self) -> HostResult<ServiceHandle> {
        self.service("scheduler")
    }

    fn roothash(&self, _data_dir: &std::path::Path) -> HostResult<ServiceHandle> {
        self.service("roothash")
    }
}

// ----------------------------------------------------------------------
// Test environment.
// ----------------------------------------------------------------------

pub struct TestEnv {
    pub host: Host,
    pub engine: Arc<MockEngine>,
    pub mux: Arc<MockMux>,
    pub engine_factory: Arc<MockEngineFactory>,
    pub mux_factory: Arc<MockMuxFactory>,
    pub services: Arc<MockServiceFactory>,
    pub genesis: Document,
    _data_dir: TempDir,
}

pub fn try_build_env(
    tweak: impl FnOnce(&mut HostConfig, &mut Document, &MockEngineFactory),
) -> HostResult<TestEnv> {
    let data_dir = TempDir::new().expect("temp dir");
    let mut config = HostConfig::default();
    config.data_dir = data_dir.path().join("data");

    let mut genesis = Document::default();
    genesis.chain_id = "helix-test".to_string();

    let state = ChainState::new(genesis.height);
    let engine = MockEngine::new(state.clone());
    let validators = Arc::new(MockValidatorStore::default());
    let engine_factory = MockEngineFactory::new(engine.clone(), validators);
    let mux = MockMux::new(state);
    let mux_factory = MockMuxFactory::new(mux.clone());
    let services = MockServiceFactory::new();

    tweak(&mut config, &mut genesis, engine_factory.as_ref());

    let identity =
        Identity::load_or_generate(&data_dir.path().join("identity")).expect("identity");
    let host = Host::new(
        config,
        identity,
        HostDependencies {
            genesis_provider: Arc::new(StaticGenesisProvider::new(genesis.clone())),
            upgrader: Arc::new(NullUpgrader),
            mux_factory: mux_factory.clone(),
            engine_factory: engine_factory.clone(),
            service_factory: services.clone(),
        },
    )?;

    Ok(TestEnv {
        host,
        engine,
        mux,
        engine_factory,
        mux_factory,
        services,
        genesis,
        _data_dir: data_dir,
    })
}

pub fn build_env() -> TestEnv {
    try_build_env(|_, _, _| {}).expect("build test environment")
}

pub fn build_env_with(tweak: impl FnOnce(&mut HostConfig, &mut Document)) -> TestEnv {
    try_build_env(|config, genesis, _| tweak(config, genesis)).expect("build test environment")
}

/// Poll `condition` until it holds, panicking after a couple of seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within timeout");
}

/// A signed transfer with a throwaway signer.
pub fn signed_transfer(nonce: u64) -> SignedTransaction {
    let signer = crypto::generate_keypair();
    let mut tx = Transaction::new(nonce, "staking.Transfer", nonce.to_le_bytes().to_vec());
    tx.fee = Some(helix_consensus::transaction::Fee {
        amount: 10,
        gas: 1_000,
    });
    tx.sign(&signer).expect("sign transfer")
}

/// Well-formed evidence blob in the engine wire form.
pub fn evidence_blob(height: u64) -> Evidence {
    let evidence = EngineEvidence {
        height,
        validator_address: vec![0xaa; 20],
        kind: helix_consensus::engine::EvidenceKind::DuplicateVote,
    };
    Evidence {
        meta: bincode::serialize(&evidence).expect("serialize evidence"),
    }
}
