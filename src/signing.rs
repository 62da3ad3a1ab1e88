//! Commit signing with ed25519 keys

use crate::dataset::Dataset;
use crate::error::{DatasnapError, Result};
use crate::hash::hash_bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde_json::json;
use std::fmt;

/// Holds a private key and signs commit payloads
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Fresh key seeded from the OS random source behind uuid v4
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        seed[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        seed[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self::from_seed(seed)
    }

    /// Parse a base64 encoded 32-byte seed
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DatasnapError::sign(format!("decoding private key: {}", e)))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DatasnapError::sign("private key must be 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    pub fn seed_base64(&self) -> String {
        STANDARD.encode(self.key.to_bytes())
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.key.verifying_key().to_bytes())
    }

    /// Stable identifier of the key holder, derived from the public key
    pub fn author_id(&self) -> String {
        hash_bytes(self.key.verifying_key().as_bytes())
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        STANDARD.encode(self.key.sign(payload).to_bytes())
    }

    pub fn sign_dataset(&self, ds: &Dataset) -> Result<String> {
        Ok(self.sign(&signing_payload(ds)?))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signer({})", self.public_key_base64())
    }
}

/// Bytes covered by a commit signature: the commit timestamp, the body
/// address and every component reference, as compact JSON with sorted keys
pub fn signing_payload(ds: &Dataset) -> Result<Vec<u8>> {
    let timestamp = ds
        .commit
        .as_ref()
        .and_then(|c| c.timestamp)
        .ok_or_else(|| DatasnapError::sign("commit timestamp is required for signing"))?;
    let payload = json!({
        "bodyPath": ds.body_path,
        "meta": ds.meta.as_ref().and_then(|m| m.path.clone()),
        "previousPath": ds.previous_path,
        "readme": ds.readme.as_ref().and_then(|r| r.path.clone()),
        "structure": ds.structure.as_ref().and_then(|s| s.path.clone()),
        "timestamp": timestamp.to_rfc3339(),
        "transform": ds.transform.as_ref().and_then(|t| t.path.clone()),
    });
    Ok(serde_json::to_vec(&payload)?)
}

/// Check a base64 signature against a base64 public key
pub fn verify(public_key: &str, payload: &[u8], signature: &str) -> Result<()> {
    let key_bytes: [u8; 32] = decode(public_key, "public key")?
        .try_into()
        .map_err(|_| DatasnapError::sign("public key must be 32 bytes"))?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| DatasnapError::sign(e.to_string()))?;
    let sig_bytes: [u8; 64] = decode(signature, "signature")?
        .try_into()
        .map_err(|_| DatasnapError::sign("signature must be 64 bytes"))?;
    key.verify(payload, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| DatasnapError::sign("signature does not match"))
}

/// Verify the signature stored in a dataset's commit
pub fn verify_dataset(public_key: &str, ds: &Dataset) -> Result<()> {
    let signature = ds
        .commit
        .as_ref()
        .and_then(|c| c.signature.as_deref())
        .ok_or_else(|| DatasnapError::sign("dataset commit is not signed"))?;
    verify(public_key, &signing_payload(ds)?, signature)
}

fn decode(encoded: &str, what: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| DatasnapError::sign(format!("decoding {}: {}", what, e)))
}
