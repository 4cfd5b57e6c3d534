//! Core abstractions for Lockbox: error types, the crypto provider
//! contract, and key-string rules.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod error;
pub mod keys;
pub mod provider;
