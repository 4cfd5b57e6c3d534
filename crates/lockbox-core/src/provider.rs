use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::ProviderError;

/// Contract for the device-local asymmetric crypto backend.
///
/// A keypair is identified solely by an opaque `handle`; implementations
/// own key material and never expose it to callers. All operations are
/// asynchronous because real backends cross into platform keystores.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Create a keypair for `handle`, replacing any existing one.
    async fn generate_keypair(&self, handle: &str) -> Result<(), ProviderError>;

    /// True iff a keypair is present for `handle`.
    async fn public_key_exists(&self, handle: &str) -> Result<bool, ProviderError>;

    /// Encrypt `plaintext` against the public key of `handle`.
    async fn encrypt(&self, plaintext: &str, handle: &str) -> Result<String, ProviderError>;

    /// Decrypt a string previously produced by `encrypt` for `handle`.
    async fn decrypt(&self, ciphertext: &str, handle: &str) -> Result<String, ProviderError>;

    /// Remove the keypair for `handle`. Fails if none exists.
    async fn delete_keypair(&self, handle: &str) -> Result<(), ProviderError>;
}

/// In-memory provider that simulates encryption for tests and smoke runs.
/// This is not cryptographically secure; production callers must use a
/// sealed-box provider backed by the OS keychain.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCryptoProvider {
    // One random pad per handle, so ciphertexts are bound to the handle
    // that produced them.
    pads: Arc<Mutex<HashMap<String, [u8; 32]>>>,
}

impl InMemoryCryptoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn pad_for(&self, handle: &str) -> Result<[u8; 32], ProviderError> {
        let pads = self.pads.lock().map_err(|err| ProviderError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        pads.get(handle)
            .copied()
            .ok_or_else(|| ProviderError::NoKeypair {
                handle: handle.to_string(),
            })
    }
}

#[async_trait]
impl CryptoProvider for InMemoryCryptoProvider {
    async fn generate_keypair(&self, handle: &str) -> Result<(), ProviderError> {
        let mut pad = [0u8; 32];
        OsRng.fill_bytes(&mut pad);

        let mut pads = self.pads.lock().map_err(|err| ProviderError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        pads.insert(handle.to_string(), pad);
        Ok(())
    }

    async fn public_key_exists(&self, handle: &str) -> Result<bool, ProviderError> {
        let pads = self.pads.lock().map_err(|err| ProviderError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(pads.contains_key(handle))
    }

    async fn encrypt(&self, plaintext: &str, handle: &str) -> Result<String, ProviderError> {
        let pad = self.pad_for(handle)?;
        let masked = mask(plaintext.as_bytes(), &pad);
        Ok(URL_SAFE_NO_PAD.encode(masked))
    }

    async fn decrypt(&self, ciphertext: &str, handle: &str) -> Result<String, ProviderError> {
        let pad = self.pad_for(handle)?;
        let masked = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|e| ProviderError::Malformed {
                reason: format!("base64 decode failed: {e}"),
            })?;

        String::from_utf8(mask(&masked, &pad)).map_err(|e| ProviderError::Malformed {
            reason: format!("plaintext not utf-8: {e}"),
        })
    }

    async fn delete_keypair(&self, handle: &str) -> Result<(), ProviderError> {
        let mut pads = self.pads.lock().map_err(|err| ProviderError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        match pads.remove(handle) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NoKeypair {
                handle: handle.to_string(),
            }),
        }
    }
}

fn mask(input: &[u8], pad: &[u8; 32]) -> Vec<u8> {
    input
        .iter()
        .zip(pad.iter().cycle())
        .map(|(b, p)| b ^ p)
        .collect()
}
