//! Consensus-layer transaction envelope and its canonical byte form.

use ed25519_dalek::{Keypair, PublicKey, Signature, Signer, Verifier};
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::errors::{HostError, HostResult};

/// Domain separation prefix for transaction signatures.
const SIGNATURE_CONTEXT: &[u8] = b"helix-consensus/tx: ";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: u64,
    pub gas: u64,
}

/// Unsigned consensus transaction. The body is an opaque method-specific
/// payload produced by the originating domain backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub fee: Option<Fee>,
    pub method: String,
    pub body: Vec<u8>,
}

impl Transaction {
    pub fn new(nonce: u64, method: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            nonce,
            fee: None,
            method: method.into(),
            body,
        }
    }

    fn signing_bytes(&self) -> HostResult<Vec<u8>> {
        let mut message = SIGNATURE_CONTEXT.to_vec();
        message.extend(bincode::serialize(self)?);
        Ok(message)
    }

    pub fn sign(&self, signer: &Keypair) -> HostResult<SignedTransaction> {
        let signature = signer.sign(&self.signing_bytes()?);
        Ok(SignedTransaction {
            transaction: self.clone(),
            public_key: signer.public.to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

/// Signed transaction envelope; the unit the submission protocol operates on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    /// Canonical serialized form: the exact bytes broadcast to the mempool
    /// and embedded in committed blocks.
    pub fn to_bytes(&self) -> HostResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> HostResult<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Content hash of the canonical byte form.
    pub fn hash(&self) -> HostResult<[u8; 32]> {
        Ok(crypto::tx_hash(&self.to_bytes()?))
    }

    pub fn signer(&self) -> HostResult<PublicKey> {
        PublicKey::from_bytes(&self.public_key)
            .map_err(|err| HostError::Crypto(format!("invalid signer public key: {err}")))
    }

    pub fn verify(&self) -> HostResult<()> {
        let public_key = self.signer()?;
        if crypto::is_blacklisted(&public_key) {
            return Err(HostError::Crypto("signer public key blacklisted".into()));
        }
        let signature = Signature::from_bytes(&self.signature)
            .map_err(|err| HostError::Crypto(format!("invalid signature bytes: {err}")))?;
        public_key
            .verify(&self.transaction.signing_bytes()?, &signature)
            .map_err(|err| HostError::Crypto(format!("signature verification failed: {err}")))
    }
}
