// src/identity/mod.rs
//! Identity agent: DID management, credential signing and verification.
//!
//! Callers only see the [`agent::IdentityAgent`] trait. The bundled
//! [`local_agent::LocalAgent`] implements it with `did:key` identifiers over
//! secp256k1, keys sealed in the embedded [`AgentStore`], and two proof
//! formats (compact JWT and embedded linked-data proof).
//!
//! [`AgentStore`]: crate::storage::agent_store::AgentStore

pub mod agent;
pub mod did_key;
pub mod jwt_proof;
pub mod ld_proof;
pub mod local_agent;

use crate::storage::agent_store::AgentStoreError;
use crate::wallet::key_management::KeyError;
use thiserror::Error;

/// JOSE algorithm name for ECDSA over secp256k1 with SHA-256.
pub const ES256K: &str = "ES256K";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent store: {0}")]
    Store(#[from] AgentStoreError),

    #[error("key management: {0}")]
    Key(#[from] KeyError),

    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("identifier not found: {0}")]
    NotFound(String),

    #[error("alias already in use: {0}")]
    AliasTaken(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;
