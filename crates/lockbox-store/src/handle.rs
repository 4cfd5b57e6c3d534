use lockbox_core::{error::StoreError, keys::validate_ident, provider::CryptoProvider};
use tracing::instrument;

use crate::registry::{derived_handle, StoreRegistry};

/// View over one tag's encrypted entries. Not storage itself: every
/// handle bound to a tag observes the same registry collection, and any
/// of them is interchangeable with any other.
///
/// Obtained only through [`StoreRegistry::get_or_create_store`], which
/// guarantees the keypair and entry collection exist at bind time.
pub struct StoreHandle<P: CryptoProvider> {
    registry: StoreRegistry<P>,
    tag: String,
    handle: String,
}

impl<P: CryptoProvider> std::fmt::Debug for StoreHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("tag", &self.tag)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<P: CryptoProvider> Clone for StoreHandle<P> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            tag: self.tag.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<P: CryptoProvider> StoreHandle<P> {
    pub(crate) fn bind(registry: StoreRegistry<P>, tag: &str) -> Self {
        Self {
            registry,
            handle: derived_handle(tag),
            tag: tag.to_string(),
        }
    }

    /// The friendly tag this handle is bound to.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Number of entries currently stored under the tag.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.with_entries(|entries| entries.is_empty())
    }

    /// Drop every entry for the tag, leaving the store live but empty.
    pub fn clear(&self) -> Result<&Self, StoreError> {
        let mut all = self.registry.lock_entries()?;
        let entries = all
            .get_mut(&self.tag)
            .ok_or_else(|| self.disposed())?;
        *entries = Default::default();
        Ok(self)
    }

    /// Membership test; the key is not validated for this check.
    pub fn has_item(&self, key: &str) -> Result<bool, StoreError> {
        self.with_entries(|entries| entries.contains_key(key))
    }

    /// Encrypt `value` against the tag's public key and record the
    /// ciphertext under `key`. Existing keys are never overwritten.
    #[instrument(skip_all, fields(tag = %self.tag))]
    pub async fn store_item(&self, key: &str, value: &str) -> Result<&Self, StoreError> {
        validate_ident(key, "key")?;
        if self.has_item(key)? {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }

        let ciphertext = self.registry.provider().encrypt(value, &self.handle).await?;

        // The store may have been disposed (or the key taken) while the
        // provider call was in flight; re-check before recording.
        let mut all = self.registry.lock_entries()?;
        let entries = all
            .get_mut(&self.tag)
            .ok_or_else(|| self.disposed())?;
        if entries.contains_key(key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        entries.insert(key.to_string(), ciphertext);
        Ok(self)
    }

    /// Decrypt the entry under `key`. With `remove` set, the entry is
    /// deleted afterwards; removal only happens once decryption has
    /// succeeded, so a provider failure leaves the entry available for
    /// retry.
    #[instrument(skip_all, fields(tag = %self.tag))]
    pub async fn retrieve_item(&self, key: &str, remove: bool) -> Result<String, StoreError> {
        validate_ident(key, "key")?;
        let ciphertext = self.with_entries(|entries| entries.get(key).cloned())?.ok_or_else(
            || StoreError::NotFound {
                what: format!("entry for key '{key}'"),
            },
        )?;

        let plaintext = self
            .registry
            .provider()
            .decrypt(&ciphertext, &self.handle)
            .await?;

        if remove {
            let mut all = self.registry.lock_entries()?;
            if let Some(entries) = all.get_mut(&self.tag) {
                entries.remove(key);
            }
        }
        Ok(plaintext)
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&std::collections::HashMap<String, String>) -> T,
    ) -> Result<T, StoreError> {
        let all = self.registry.lock_entries()?;
        let entries = all.get(&self.tag).ok_or_else(|| self.disposed())?;
        Ok(f(entries))
    }

    fn disposed(&self) -> StoreError {
        StoreError::Disposed {
            tag: self.tag.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use lockbox_core::provider::InMemoryCryptoProvider;

    use super::*;

    async fn fresh_handle(tag: &str) -> StoreHandle<InMemoryCryptoProvider> {
        StoreRegistry::new(InMemoryCryptoProvider::new())
            .get_or_create_store(tag)
            .await
            .expect("acquire store")
    }

    #[tokio::test]
    async fn round_trip_without_removal_keeps_entry() {
        let handle = fresh_handle("t").await;
        handle.store_item("k", "secret").await.expect("store");

        let value = handle.retrieve_item("k", false).await.expect("retrieve");
        assert_eq!(value, "secret");
        assert!(handle.has_item("k").expect("has"));
    }

    #[tokio::test]
    async fn retrieval_with_removal_deletes_entry() {
        let handle = fresh_handle("t").await;
        handle.store_item("k", "secret").await.expect("store");

        let value = handle.retrieve_item("k", true).await.expect("retrieve");
        assert_eq!(value, "secret");
        assert!(!handle.has_item("k").expect("has"));

        let err = handle.retrieve_item("k", true).await.expect_err("gone");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected_not_overwritten() {
        let handle = fresh_handle("t").await;
        handle.store_item("k", "first").await.expect("store");

        let err = handle.store_item("k", "second").await.expect_err("dup");
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let value = handle.retrieve_item("k", false).await.expect("retrieve");
        assert_eq!(value, "first");
    }

    #[tokio::test]
    async fn malformed_keys_fail_before_any_provider_call() {
        let handle = fresh_handle("t").await;
        for bad in ["", "has space"] {
            let err = handle.store_item(bad, "v").await.expect_err("store");
            assert!(matches!(err, StoreError::InvalidArgument { .. }));
            let err = handle.retrieve_item(bad, true).await.expect_err("retrieve");
            assert!(matches!(err, StoreError::InvalidArgument { .. }));
        }
    }

    #[tokio::test]
    async fn stored_values_are_ciphertext_in_the_registry() {
        let registry = StoreRegistry::new(InMemoryCryptoProvider::new());
        let handle = registry.get_or_create_store("t").await.expect("store");
        handle.store_item("k", "plain-secret").await.expect("store");

        let all = registry.lock_entries().expect("lock");
        let stored = all.get("t").expect("collection").get("k").expect("entry");
        assert_ne!(stored, "plain-secret");
        assert!(!stored.contains("plain-secret"));
    }

    #[tokio::test]
    async fn handles_for_the_same_tag_share_entries() {
        let registry = StoreRegistry::new(InMemoryCryptoProvider::new());
        let first = registry.get_or_create_store("t").await.expect("store");
        let second = registry.get_or_create_store("t").await.expect("store");

        first.store_item("k", "v").await.expect("store");
        assert!(second.has_item("k").expect("has"));
        assert_eq!(second.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn clear_empties_but_keeps_store_live() {
        let handle = fresh_handle("t").await;
        handle.store_item("a", "1").await.expect("store");
        handle.store_item("b", "2").await.expect("store");

        handle.clear().expect("clear");
        assert!(handle.is_empty().expect("empty"));

        // Still usable after clearing.
        handle.store_item("a", "1").await.expect("store again");
        assert_eq!(handle.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn operations_on_a_disposed_store_fail() {
        let registry = StoreRegistry::new(InMemoryCryptoProvider::new());
        let handle = registry.get_or_create_store("t").await.expect("store");
        registry.dispose_store("t").await.expect("dispose");

        assert!(matches!(handle.len(), Err(StoreError::Disposed { .. })));
        assert!(matches!(
            handle.clear(),
            Err(StoreError::Disposed { .. })
        ));
        let err = handle.store_item("k", "v").await.expect_err("store");
        assert!(matches!(err, StoreError::Disposed { .. }));
        let err = handle.retrieve_item("k", true).await.expect_err("retrieve");
        assert!(matches!(err, StoreError::Disposed { .. }));
    }
}
