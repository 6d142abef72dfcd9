// src/wallet/mod.rs
pub mod credential_storage;
pub mod key_derivation;
pub mod key_management;
pub mod secret;
