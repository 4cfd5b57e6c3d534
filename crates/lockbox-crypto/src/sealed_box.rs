use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use lockbox_core::{error::ProviderError, provider::CryptoProvider};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::keypair_store::KeypairStore;

const NONCE_LEN: usize = 12;

/// Sealed-box crypto provider: each handle owns an x25519 keypair whose
/// private half lives in a [`KeypairStore`]. Encryption derives a fresh
/// ephemeral shared secret per message and seals the payload with
/// AES-256-GCM, so ciphertexts can be produced against the public key
/// alone and opened only with the stored private key.
pub struct SealedBoxProvider<S: KeypairStore> {
    keys: S,
}

impl<S: KeypairStore> SealedBoxProvider<S> {
    pub fn new(keys: S) -> Self {
        Self { keys }
    }

    async fn secret_for(&self, handle: &str) -> Result<StaticSecret, ProviderError> {
        let bytes = self
            .keys
            .load(handle)
            .await?
            .ok_or_else(|| ProviderError::NoKeypair {
                handle: handle.to_string(),
            })?;
        Ok(StaticSecret::from(bytes))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedBlob {
    epk: String,
    nonce: String,
    ciphertext: String,
}

#[async_trait]
impl<S: KeypairStore> CryptoProvider for SealedBoxProvider<S> {
    #[instrument(skip_all, fields(handle))]
    async fn generate_keypair(&self, handle: &str) -> Result<(), ProviderError> {
        let secret = StaticSecret::random_from_rng(OsRng);
        self.keys.save(handle, &secret.to_bytes()).await
    }

    async fn public_key_exists(&self, handle: &str) -> Result<bool, ProviderError> {
        Ok(self.keys.load(handle).await?.is_some())
    }

    #[instrument(skip_all, fields(handle))]
    async fn encrypt(&self, plaintext: &str, handle: &str) -> Result<String, ProviderError> {
        // Recipient public key is derived from the stored private half.
        let recipient = PublicKey::from(&self.secret_for(handle).await?);

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let epk = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient);

        let cipher = build_cipher(shared.as_bytes())?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| ProviderError::Crypto {
                reason: format!("encrypt failed: {e}"),
            })?;

        let blob = SealedBlob {
            epk: URL_SAFE_NO_PAD.encode(epk.as_bytes()),
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(sealed),
        };
        let json = serde_json::to_vec(&blob).map_err(|e| ProviderError::Crypto {
            reason: format!("blob encode failed: {e}"),
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    #[instrument(skip_all, fields(handle))]
    async fn decrypt(&self, ciphertext: &str, handle: &str) -> Result<String, ProviderError> {
        let secret = self.secret_for(handle).await?;

        let json = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|e| malformed(format!("blob decode failed: {e}")))?;
        let blob: SealedBlob = serde_json::from_slice(&json)
            .map_err(|e| malformed(format!("blob parse failed: {e}")))?;

        let epk_bytes: [u8; 32] = URL_SAFE_NO_PAD
            .decode(blob.epk)
            .map_err(|e| malformed(format!("ephemeral key decode failed: {e}")))?
            .as_slice()
            .try_into()
            .map_err(|_| malformed("ephemeral key must be 32 bytes".to_string()))?;
        let shared = secret.diffie_hellman(&PublicKey::from(epk_bytes));

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(blob.nonce)
            .map_err(|e| malformed(format!("nonce decode failed: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(malformed(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = URL_SAFE_NO_PAD
            .decode(blob.ciphertext)
            .map_err(|e| malformed(format!("ciphertext decode failed: {e}")))?;

        let cipher = build_cipher(shared.as_bytes())?;
        let plaintext = cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|e| ProviderError::Crypto {
                reason: format!("decrypt failed: {e}"),
            })?;

        String::from_utf8(plaintext).map_err(|e| malformed(format!("plaintext not utf-8: {e}")))
    }

    #[instrument(skip_all, fields(handle))]
    async fn delete_keypair(&self, handle: &str) -> Result<(), ProviderError> {
        if self.keys.remove(handle).await? {
            Ok(())
        } else {
            Err(ProviderError::NoKeypair {
                handle: handle.to_string(),
            })
        }
    }
}

fn build_cipher(key: &[u8; 32]) -> Result<Aes256Gcm, ProviderError> {
    Aes256Gcm::new_from_slice(key).map_err(|e| ProviderError::Crypto {
        reason: format!("cipher init failed: {e}"),
    })
}

fn malformed(reason: String) -> ProviderError {
    ProviderError::Malformed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair_store::InMemoryKeypairStore;

    fn provider() -> SealedBoxProvider<InMemoryKeypairStore> {
        SealedBoxProvider::new(InMemoryKeypairStore::new())
    }

    #[tokio::test]
    async fn round_trip_encrypts_and_decrypts() {
        let provider = provider();
        provider.generate_keypair("h").await.expect("generate");

        let ciphertext = provider
            .encrypt("hello-lockbox", "h")
            .await
            .expect("encrypt");
        assert!(
            !ciphertext.contains("hello-lockbox"),
            "plaintext must not appear in ciphertext"
        );

        let plaintext = provider.decrypt(&ciphertext, "h").await.expect("decrypt");
        assert_eq!(plaintext, "hello-lockbox");
    }

    #[tokio::test]
    async fn each_encryption_uses_a_fresh_ephemeral_key() {
        let provider = provider();
        provider.generate_keypair("h").await.expect("generate");

        let first = provider.encrypt("same", "h").await.expect("encrypt");
        let second = provider.encrypt("same", "h").await.expect("encrypt");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn encrypt_without_keypair_fails() {
        let err = provider()
            .encrypt("v", "missing")
            .await
            .expect_err("no keypair");
        assert!(matches!(err, ProviderError::NoKeypair { .. }));
    }

    #[tokio::test]
    async fn decrypt_rejects_malformed_blobs() {
        let provider = provider();
        provider.generate_keypair("h").await.expect("generate");

        let err = provider
            .decrypt("not-a-sealed-blob", "h")
            .await
            .expect_err("malformed");
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    #[tokio::test]
    async fn regeneration_invalidates_old_ciphertexts() {
        let provider = provider();
        provider.generate_keypair("h").await.expect("generate");
        let ciphertext = provider.encrypt("v", "h").await.expect("encrypt");

        provider.generate_keypair("h").await.expect("regenerate");
        let err = provider
            .decrypt(&ciphertext, "h")
            .await
            .expect_err("old key gone");
        assert!(matches!(err, ProviderError::Crypto { .. }));
    }

    #[tokio::test]
    async fn delete_then_decrypt_reports_no_keypair() {
        let provider = provider();
        provider.generate_keypair("h").await.expect("generate");
        let ciphertext = provider.encrypt("v", "h").await.expect("encrypt");

        provider.delete_keypair("h").await.expect("delete");
        let err = provider
            .decrypt(&ciphertext, "h")
            .await
            .expect_err("keypair deleted");
        assert!(matches!(err, ProviderError::NoKeypair { .. }));

        let err = provider.delete_keypair("h").await.expect_err("double delete");
        assert!(matches!(err, ProviderError::NoKeypair { .. }));
    }
}
