//! Domain backends and their service clients.
//!
//! Each domain subsystem (beacon, epoch-time, registry, staking, scheduler,
//! key-manager, root-hash) plugs into the host through two surfaces: a
//! backend handle exposing its queries, and a service client the host feeds
//! decoded engine events to through a dedicated worker. The business logic
//! behind both lives outside this crate.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::engine::{EngineEvent, EventQuery};
use crate::errors::HostResult;
use crate::genesis::Document;
use crate::types::EpochTime;

/// Query surface common to every domain backend.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Snapshot the domain state at `height` as a genesis section.
    async fn state_to_genesis(&self, height: u64) -> HostResult<Value>;
}

/// Epoch-time backend; the only domain surface the host consumes directly.
#[async_trait]
pub trait EpochTimeBackend: Backend {
    /// Epoch active at the given committed height.
    async fn epoch_at(&self, height: u64) -> HostResult<EpochTime>;

    /// Watch channel tracking the current epoch.
    fn watch_epochs(&self) -> watch::Receiver<EpochTime>;
}

/// Identifies the event stream a service client consumes.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub query: EventQuery,
}

/// Domain hook fed by a dedicated host worker after engine start.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    fn descriptor(&self) -> ServiceDescriptor;

    /// Ingest one decoded engine event. Errors are logged by the worker and
    /// do not terminate the stream.
    async fn deliver_event(&self, event: &EngineEvent) -> HostResult<()>;
}

/// A constructed domain subsystem: its query backend plus its event client.
pub struct ServiceHandle {
    pub backend: Arc<dyn Backend>,
    pub client: Arc<dyn ServiceClient>,
}

/// Epoch-time variant of [`ServiceHandle`].
pub struct EpochTimeHandle {
    pub backend: Arc<dyn EpochTimeBackend>,
    pub client: Arc<dyn ServiceClient>,
}

/// Constructs the domain service clients during host initialization.
///
/// Construction order is significant and owned by the host: beacon →
/// key-manager → registry → staking → scheduler → root-hash, because later
/// clients query earlier ones while initializing. Epoch-time is built before
/// all of them, mock or block-driven per the genesis document.
pub trait ServiceClientFactory: Send + Sync {
    fn epochtime(&self, genesis: &Document) -> HostResult<EpochTimeHandle>;
    fn beacon(&self) -> HostResult<ServiceHandle>;
    fn keymanager(&self) -> HostResult<ServiceHandle>;
    fn registry(&self) -> HostResult<ServiceHandle>;
    fn staking(&self) -> HostResult<ServiceHandle>;
    fn scheduler(&self) -> HostResult<ServiceHandle>;
    fn roothash(&self, data_dir: &Path) -> HostResult<ServiceHandle>;
}

/// Backends wired into the host once initialization completes.
pub struct DomainBackends {
    pub epochtime: Arc<dyn EpochTimeBackend>,
    pub beacon: Arc<dyn Backend>,
    pub keymanager: Arc<dyn Backend>,
    pub registry: Arc<dyn Backend>,
    pub staking: Arc<dyn Backend>,
    pub scheduler: Arc<dyn Backend>,
    pub roothash: Arc<dyn Backend>,
}
