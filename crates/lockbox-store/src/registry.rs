use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use lockbox_core::{
    error::{ProviderError, StoreError},
    keys::validate_ident,
    provider::CryptoProvider,
};
use tracing::instrument;

use crate::handle::StoreHandle;

/// Namespace prefix for derived keypair handles, keeping lockbox keypairs
/// apart from unrelated keys the platform keystore may hold.
pub const HANDLE_PREFIX: &str = "lockbox.tag.";

/// The opaque identifier passed to the crypto provider for `tag`.
pub fn derived_handle(tag: &str) -> String {
    format!("{HANDLE_PREFIX}{tag}")
}

pub(crate) type EntryMap = HashMap<String, HashMap<String, String>>;

/// Registry mapping tags to keypairs and encrypted entry collections.
///
/// Clones share state, so one registry per process (or per test) is the
/// intended shape; all entry mutations happen under a single lock, which
/// keeps every update atomic from a reader's point of view. Concurrent
/// store/dispose operations on the same tag are not serialized beyond
/// that; callers must not overlap them if consistency matters.
pub struct StoreRegistry<P: CryptoProvider> {
    provider: Arc<P>,
    entries: Arc<Mutex<EntryMap>>,
}

impl<P: CryptoProvider> Clone for StoreRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<P: CryptoProvider> StoreRegistry<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ensure a keypair and an entry collection exist for `tag`.
    /// Idempotent: an already-initialized tag keeps its keypair and
    /// entries untouched.
    #[instrument(skip_all, fields(tag))]
    pub async fn ensure_store(&self, tag: &str) -> Result<(), StoreError> {
        validate_ident(tag, "tag")?;

        let handle = derived_handle(tag);
        if !self.provider.public_key_exists(&handle).await? {
            self.provider.generate_keypair(&handle).await?;
        }

        self.lock_entries()?.entry(tag.to_string()).or_default();
        Ok(())
    }

    /// Delete the keypair for `tag`, then drop its entry collection.
    /// Keypair deletion comes first so a provider failure leaves the
    /// registry unchanged and the dispose can be retried.
    #[instrument(skip_all, fields(tag))]
    pub async fn dispose_store(&self, tag: &str) -> Result<(), StoreError> {
        validate_ident(tag, "tag")?;

        let handle = derived_handle(tag);
        if !self.provider.public_key_exists(&handle).await? {
            return Err(StoreError::NotFound {
                what: format!("keys already disposed for tag '{tag}'"),
            });
        }

        self.provider.delete_keypair(&handle).await?;
        self.lock_entries()?.remove(tag);
        Ok(())
    }

    /// True iff the crypto provider holds a keypair for `tag`. This is
    /// the single source of truth for "is this store live"; entry
    /// collection presence is a consequence of it.
    pub async fn store_exists(&self, tag: &str) -> Result<bool, StoreError> {
        validate_ident(tag, "tag")?;
        Ok(self.provider.public_key_exists(&derived_handle(tag)).await?)
    }

    /// Sole entry point for obtaining a [`StoreHandle`]: validates the
    /// tag, ensures the store exists, then binds a handle to it.
    pub async fn get_or_create_store(&self, tag: &str) -> Result<StoreHandle<P>, StoreError> {
        self.ensure_store(tag).await?;
        Ok(StoreHandle::bind(self.clone(), tag))
    }

    pub(crate) fn provider(&self) -> &P {
        &self.provider
    }

    pub(crate) fn lock_entries(&self) -> Result<MutexGuard<'_, EntryMap>, StoreError> {
        self.entries.lock().map_err(|err| {
            StoreError::Provider(ProviderError::Storage {
                reason: format!("registry lock poisoned: {err}"),
            })
        })
    }
}
