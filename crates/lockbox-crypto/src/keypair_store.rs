use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use lockbox_core::error::ProviderError;

/// Persists x25519 private keys by handle (OS keychain in production;
/// memory in tests). Key bytes never leave the crypto crate.
#[async_trait]
pub trait KeypairStore: Send + Sync {
    async fn load(&self, handle: &str) -> Result<Option<[u8; 32]>, ProviderError>;

    async fn save(&self, handle: &str, secret: &[u8; 32]) -> Result<(), ProviderError>;

    /// Remove the secret for `handle`; returns whether one was present.
    async fn remove(&self, handle: &str) -> Result<bool, ProviderError>;
}

/// OS keyring-backed store. Uses the `keyring` crate with one entry per
/// handle under a fixed service name.
pub struct KeyringKeypairStore {
    service: String,
}

impl KeyringKeypairStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, handle: &str) -> Result<keyring::Entry, ProviderError> {
        keyring::Entry::new(&self.service, handle).map_err(|e| ProviderError::Storage {
            reason: format!("keyring entry: {e}"),
        })
    }
}

#[async_trait]
impl KeypairStore for KeyringKeypairStore {
    async fn load(&self, handle: &str) -> Result<Option<[u8; 32]>, ProviderError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        match self.entry(handle)?.get_password() {
            Ok(secret) => decode_secret(&secret).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ProviderError::Storage {
                reason: format!("keyring get: {e}"),
            }),
        }
    }

    async fn save(&self, handle: &str, secret: &[u8; 32]) -> Result<(), ProviderError> {
        self.entry(handle)?
            .set_password(&general_purpose::STANDARD.encode(secret))
            .map_err(|e| ProviderError::Storage {
                reason: format!("keyring set: {e}"),
            })
    }

    async fn remove(&self, handle: &str) -> Result<bool, ProviderError> {
        match self.entry(handle)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(ProviderError::Storage {
                reason: format!("keyring delete: {e}"),
            }),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeypairStore {
    inner: Arc<Mutex<HashMap<String, [u8; 32]>>>,
}

impl InMemoryKeypairStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, [u8; 32]>>, ProviderError> {
        self.inner.lock().map_err(|err| ProviderError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl KeypairStore for InMemoryKeypairStore {
    async fn load(&self, handle: &str) -> Result<Option<[u8; 32]>, ProviderError> {
        Ok(self.lock()?.get(handle).copied())
    }

    async fn save(&self, handle: &str, secret: &[u8; 32]) -> Result<(), ProviderError> {
        self.lock()?.insert(handle.to_string(), *secret);
        Ok(())
    }

    async fn remove(&self, handle: &str) -> Result<bool, ProviderError> {
        Ok(self.lock()?.remove(handle).is_some())
    }
}

fn decode_secret(secret: &str) -> Result<[u8; 32], ProviderError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| ProviderError::Storage {
            reason: format!("secret decode failed: {e}"),
        })?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProviderError::Storage {
            reason: format!("expected 32 secret bytes, got {}", bytes.len()),
        })
}
