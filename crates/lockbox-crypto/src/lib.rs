//! Production crypto provider: x25519 sealed boxes with AES-GCM, private
//! keys sourced from the OS keyring (or test doubles).

pub mod keypair_store;
pub mod sealed_box;
