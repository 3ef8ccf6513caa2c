//! Key material handling for the host: the three node identities, the
//! process-wide signature blacklist, and content digests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Keypair, PublicKey, SecretKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::errors::{HostError, HostResult};

/// Number of bytes of the digest used for consensus-layer addresses.
const ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKeypair {
    public_key: String,
    secret_key: String,
}

/// Long-term signing identities of the node.
///
/// The consensus signer doubles as the engine's validator key, the node
/// signer is the `OwnTxSigner` identity registered with the multiplexer, and
/// the p2p signer identifies the node on the engine's peer-to-peer network.
pub struct Identity {
    pub consensus: Keypair,
    pub node: Keypair,
    pub p2p: Keypair,
}

impl Identity {
    /// Load the three identity keypairs from `dir`, generating any that are
    /// missing.
    pub fn load_or_generate(dir: &Path) -> HostResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            consensus: load_or_generate_keypair(&dir.join("consensus.toml"))?,
            node: load_or_generate_keypair(&dir.join("node.toml"))?,
            p2p: load_or_generate_keypair(&dir.join("p2p.toml"))?,
        })
    }
}

pub fn generate_keypair() -> Keypair {
    Keypair::generate(&mut OsRng)
}

pub fn load_or_generate_keypair(path: &Path) -> HostResult<Keypair> {
    if path.exists() {
        load_keypair(path)
    } else {
        let keypair = generate_keypair();
        save_keypair(path, &keypair)?;
        Ok(keypair)
    }
}

pub fn save_keypair(path: &Path, keypair: &Keypair) -> HostResult<()> {
    let stored = StoredKeypair {
        public_key: hex::encode(keypair.public.to_bytes()),
        secret_key: hex::encode(keypair.secret.to_bytes()),
    };
    let encoded = toml::to_string_pretty(&stored)
        .map_err(|err| HostError::Config(format!("failed to encode keypair: {err}")))?;
    fs::create_dir_all(path.parent().unwrap_or_else(|| Path::new(".")))?;
    fs::write(path, encoded)?;
    Ok(())
}

pub fn load_keypair(path: &Path) -> HostResult<Keypair> {
    let raw = fs::read_to_string(path)?;
    let stored: StoredKeypair = toml::from_str(&raw)
        .map_err(|err| HostError::Config(format!("failed to decode keypair: {err}")))?;
    let secret_bytes = hex::decode(stored.secret_key)
        .map_err(|err| HostError::Config(format!("invalid secret key encoding: {err}")))?;
    let public_bytes = hex::decode(stored.public_key)
        .map_err(|err| HostError::Config(format!("invalid public key encoding: {err}")))?;
    let secret = SecretKey::from_bytes(&secret_bytes)
        .map_err(|err| HostError::Config(format!("invalid secret key bytes: {err}")))?;
    let public = PublicKey::from_bytes(&public_bytes)
        .map_err(|err| HostError::Config(format!("invalid public key bytes: {err}")))?;
    Ok(Keypair { secret, public })
}

/// Persist the engine's private validator key under the engine state
/// directory, derived from the consensus signer. Returns the key file path
/// handed to the engine constructor.
pub fn persist_validator_key(state_dir: &Path, consensus: &Keypair) -> HostResult<PathBuf> {
    let path = state_dir.join("config").join("priv_validator_key.toml");
    if !path.exists() {
        save_keypair(&path, consensus)?;
    }
    Ok(path)
}

pub fn public_key_from_hex(data: &str) -> HostResult<PublicKey> {
    let bytes = hex::decode(data)
        .map_err(|err| HostError::Config(format!("invalid public key encoding: {err}")))?;
    PublicKey::from_bytes(&bytes)
        .map_err(|err| HostError::Config(format!("invalid public key bytes: {err}")))
}

/// Content digest of serialized transaction bytes.
pub fn tx_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Engine-side address of a consensus public key: a truncated digest, the
/// same derivation the engine applies to validator set entries.
pub fn consensus_address(public_key: &PublicKey) -> Vec<u8> {
    blake3::hash(public_key.as_bytes()).as_bytes()[..ADDRESS_LEN].to_vec()
}

// The blacklist is intentionally process-wide: signature verification happens
// in domain code paths that have no reference back to the host.
static BLACKLIST: RwLock<Option<HashSet<[u8; 32]>>> = RwLock::new(None);

/// Add a public key to the process-wide signature blacklist.
pub fn blacklist_public_key(public_key: &PublicKey) -> HostResult<()> {
    let mut blacklist = BLACKLIST.write();
    blacklist
        .get_or_insert_with(HashSet::new)
        .insert(public_key.to_bytes());
    Ok(())
}

pub fn is_blacklisted(public_key: &PublicKey) -> bool {
    let blacklist = BLACKLIST.read();
    blacklist
        .as_ref()
        .map(|set| set.contains(&public_key.to_bytes()))
        .unwrap_or(false)
}
