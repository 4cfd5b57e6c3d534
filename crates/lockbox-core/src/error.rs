use thiserror::Error;

/// Errors produced by crypto provider implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// No keypair exists for the requested handle.
    #[error("no keypair for handle: {handle}")]
    NoKeypair { handle: String },
    /// Ciphertext could not be decoded into a sealed blob.
    #[error("malformed ciphertext: {reason}")]
    Malformed { reason: String },
    /// Underlying storage failure (platform keyring, poisoned lock).
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    /// Cryptographic operation failure.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
}

/// Errors surfaced by the store registry, store handles, and lockers.
///
/// Validation errors are raised before any provider call is made;
/// provider failures pass through unwrapped via [`StoreError::Provider`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Malformed tag/key or out-of-range length parameter.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    /// The tag's backing store does not exist or may have been disposed.
    #[error("store for tag '{tag}' does not exist or may have been disposed")]
    Disposed { tag: String },
    /// Requested entry (or keypair, for dispose) does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },
    /// Store operation targets a key already present.
    #[error("entry already exists for key: {key}")]
    AlreadyExists { key: String },
    /// Crypto provider failure, propagated unchanged.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
