//! Encrypted store registry and per-tag store handles.
//!
//! The registry maps a tag to a keypair in the crypto provider plus a
//! collection of encrypted entries; handles are views over one tag's
//! collection and encrypt/decrypt on access.

pub mod handle;
pub mod registry;
