// src/services/mod.rs
pub mod api_server;
pub mod client;
pub mod credential_issuer;
pub mod error;
pub mod verifier;
