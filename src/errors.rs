use std::collections::HashMap;
use std::io;

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no committed blocks")]
    NoCommittedBlocks,
    #[error("duplicate transaction")]
    DuplicateTx,
    #[error("backend unsupported")]
    Unsupported,
    #[error("malformed evidence: {0}")]
    MalformedEvidence(String),
    #[error("operation canceled")]
    Canceled,
    #[error("{module}: {message} (code {code})")]
    Domain {
        module: String,
        code: u32,
        message: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cryptography error: {0}")]
    Crypto(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Process-wide registry mapping `(module, code)` pairs emitted by domain
/// applications back to typed errors. Domain backends register their error
/// space once at construction; results carried in check/deliver responses are
/// reconstructed through [`from_code`].
static DOMAIN_ERRORS: RwLock<Option<HashMap<(String, u32), String>>> = RwLock::new(None);

pub fn register_domain_error(module: &str, code: u32, message: &str) {
    let mut registry = DOMAIN_ERRORS.write();
    registry
        .get_or_insert_with(HashMap::new)
        .insert((module.to_string(), code), message.to_string());
}

/// Reconstruct a domain error from a `(module, code)` pair. Returns `None`
/// when the pair was never registered; callers fall back to the raw log line
/// carried next to the code.
pub fn from_code(module: &str, code: u32) -> Option<HostError> {
    let registry = DOMAIN_ERRORS.read();
    registry
        .as_ref()
        .and_then(|map| map.get(&(module.to_string(), code)))
        .map(|message| HostError::Domain {
            module: module.to_string(),
            code,
            message: message.clone(),
        })
}
