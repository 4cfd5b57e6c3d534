//! Locker: a convenience layer over a store handle that generates item
//! keys itself, so callers pass around key strings instead of values.
//!
//! Lockers come in two flavors: common (one well-known tag shared by
//! every common locker on the same registry) and private (a freshly
//! generated tag with its own keypair).

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use lockbox_core::{error::StoreError, keys::random_key, provider::CryptoProvider};
use lockbox_store::{handle::StoreHandle, registry::StoreRegistry};
use tracing::instrument;

/// Tag bound by every locker acquired in common mode.
pub const COMMON_TAG: &str = "lockbox-common";

/// Bounds for caller-supplied item-key lengths.
pub const MIN_ITEM_KEY_LEN: usize = 6;
pub const MAX_ITEM_KEY_LEN: usize = 32;
/// Item-key length used by [`Locker::store_item`].
pub const DEFAULT_ITEM_KEY_LEN: usize = 6;

/// Number of random characters prefixed to the timestamp in a private tag.
const PRIVATE_TAG_PREFIX_LEN: usize = 4;

/// A store handle plus auto-generated item keys and an eviction latch.
///
/// A locker never reconnects after eviction; acquire a new one, which
/// regenerates a keypair if the tag is reused.
pub struct Locker<P: CryptoProvider> {
    registry: StoreRegistry<P>,
    store: StoreHandle<P>,
    evicted: AtomicBool,
}

impl<P: CryptoProvider> std::fmt::Debug for Locker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("tag", &self.store.tag())
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl<P: CryptoProvider> Locker<P> {
    /// Acquire a locker. Common mode resolves the shared [`COMMON_TAG`]
    /// store; private mode generates a fresh tag (short random prefix
    /// plus a microsecond timestamp) and its own keypair.
    #[instrument(skip_all, fields(common))]
    pub async fn acquire(registry: &StoreRegistry<P>, common: bool) -> Result<Self, StoreError> {
        let tag = if common {
            COMMON_TAG.to_string()
        } else {
            private_tag()?
        };

        let store = registry.get_or_create_store(&tag).await?;
        Ok(Self {
            registry: registry.clone(),
            store,
            evicted: AtomicBool::new(false),
        })
    }

    /// The friendly tag this locker is bound to.
    pub fn id(&self) -> &str {
        self.store.tag()
    }

    /// Whether this locker's store is still usable. Once known evicted,
    /// answers from the local latch without touching the provider.
    ///
    /// A provider failure during the existence check is treated as
    /// eviction: at this layer "can I still use this locker" and "why
    /// did the provider fail" are not distinguishable, so this fails
    /// open and may report a false positive on a transient platform
    /// error.
    pub async fn is_evicted(&self) -> bool {
        if self.evicted.load(Ordering::Relaxed) {
            return true;
        }
        match self.registry.store_exists(self.id()).await {
            Ok(true) => false,
            Ok(false) | Err(_) => {
                self.evicted.store(true, Ordering::Relaxed);
                true
            }
        }
    }

    /// Dispose the keypair and entries behind this locker. Registry
    /// errors (a second evict reports NotFound) propagate unchanged.
    #[instrument(skip_all, fields(tag = %self.id()))]
    pub async fn evict(&self) -> Result<&Self, StoreError> {
        self.registry.dispose_store(self.id()).await?;
        self.evicted.store(true, Ordering::Relaxed);
        Ok(self)
    }

    /// Whether `key` currently maps to an entry in this locker's store.
    pub fn key_in_use(&self, key: &str) -> Result<bool, StoreError> {
        self.store.has_item(key)
    }

    /// Retrieve and remove the item stored under `key`.
    pub async fn retrieve_item(&self, key: &str) -> Result<String, StoreError> {
        self.store.retrieve_item(key, true).await
    }

    /// Store `item` under a generated key of the default length and
    /// return that key, the caller's only way back to the item.
    pub async fn store_item(&self, item: &str) -> Result<String, StoreError> {
        self.store_item_with_len(item, DEFAULT_ITEM_KEY_LEN).await
    }

    /// Store `item` under a generated key of `key_len` lowercase
    /// characters. Generation retries on collision until a free key is
    /// found; the key space dwarfs realistic entry counts, so the loop
    /// terminates after a handful of draws at worst.
    #[instrument(skip_all, fields(tag = %self.id(), key_len))]
    pub async fn store_item_with_len(
        &self,
        item: &str,
        key_len: usize,
    ) -> Result<String, StoreError> {
        if item.is_empty() {
            return Err(StoreError::InvalidArgument {
                reason: "item must be non-empty".to_string(),
            });
        }
        if !(MIN_ITEM_KEY_LEN..=MAX_ITEM_KEY_LEN).contains(&key_len) {
            return Err(StoreError::InvalidArgument {
                reason: format!(
                    "key length {key_len} outside [{MIN_ITEM_KEY_LEN}, {MAX_ITEM_KEY_LEN}]"
                ),
            });
        }

        let key = loop {
            let candidate = random_key(key_len)?;
            if !self.store.has_item(&candidate)? {
                break candidate;
            }
        };

        self.store.store_item(&key, item).await?;
        Ok(key)
    }
}

/// Fresh tag for a private locker: 4 random lowercase characters plus a
/// microsecond timestamp. Not a strong uniqueness guarantee, but the
/// collision window under realistic acquisition rates is negligible.
fn private_tag() -> Result<String, StoreError> {
    let prefix = random_key(PRIVATE_TAG_PREFIX_LEN)?;
    Ok(format!("{prefix}{}", Utc::now().timestamp_micros()))
}
