// src/identity/agent.rs
//! The identity agent interface.
//!
//! Everything above this layer (issuer, verifier, HTTP handlers, CLI) talks
//! to an `Arc<dyn IdentityAgent>`, so the signing backend can be swapped
//! without touching them.

use crate::identity::{AgentError, AgentResult};
use crate::models::credential::{
    detect_proof_format, CredentialPayload, ProofFormat, VerifiableCredential, VerificationResult,
};
use crate::models::did::{DidDocument, ManagedIdentifier};
use async_trait::async_trait;
use serde::Serialize;

/// Alias given to the issuer identity created on first use.
pub const DEFAULT_ISSUER_ALIAS: &str = "default";

#[async_trait]
pub trait IdentityAgent: Send + Sync {
    /// Creates a fresh identifier; fails with `AliasTaken` if `alias` exists.
    async fn create_identifier(&self, alias: &str) -> AgentResult<ManagedIdentifier>;

    /// Registers an identifier for an existing 32-byte secp256k1 private key.
    async fn import_identifier(&self, alias: &str, private_key: &[u8]) -> AgentResult<ManagedIdentifier>;

    async fn get_identifier_by_alias(&self, alias: &str) -> AgentResult<Option<ManagedIdentifier>>;

    /// All managed identifiers, oldest first.
    async fn find_identifiers(&self) -> AgentResult<Vec<ManagedIdentifier>>;

    /// Signs `payload` with the key of its issuer DID.
    async fn sign_credential(
        &self,
        payload: &CredentialPayload,
        format: ProofFormat,
    ) -> AgentResult<VerifiableCredential>;

    /// Checks `credential` in exactly one proof format.
    async fn verify_credential(
        &self,
        credential: &VerifiableCredential,
        format: ProofFormat,
    ) -> AgentResult<VerificationResult>;

    async fn resolve_did(&self, did: &str) -> AgentResult<DidDocument>;

    /// The first managed identifier, creating `"default"` if there is none.
    async fn create_or_get_issuer_identity(&self) -> AgentResult<ManagedIdentifier> {
        match self.find_identifiers().await?.into_iter().next() {
            Some(identifier) => Ok(identifier),
            None => {
                log::info!("no identifiers yet; creating '{}'", DEFAULT_ISSUER_ALIAS);
                self.create_identifier(DEFAULT_ISSUER_ALIAS).await
            }
        }
    }

    /// The identifier aliased `alias`, created on first request.
    ///
    /// Losing a creation race to another caller returns the winner's
    /// identifier.
    async fn get_or_create_identifier(&self, alias: &str) -> AgentResult<ManagedIdentifier> {
        if let Some(identifier) = self.get_identifier_by_alias(alias).await? {
            return Ok(identifier);
        }
        match self.create_identifier(alias).await {
            Err(AgentError::AliasTaken(_)) => self
                .get_identifier_by_alias(alias)
                .await?
                .ok_or_else(|| AgentError::NotFound(format!("alias {}", alias))),
            other => other,
        }
    }
}

/// Result of a verification probe across proof formats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub verified: bool,
    /// Formats attempted, in order.
    pub tried_formats: Vec<ProofFormat>,
    /// Result of the last attempt.
    pub result: VerificationResult,
}

/// Verifies `credential`, trying the likely proof format first and falling
/// back to the other one.
///
/// The first format is `preferred` if given, else the detected one, else
/// `lds`. At most two attempts are made and the probe stops at the first
/// success. Agent errors count as a failed attempt.
pub async fn verify_with_fallback(
    agent: &dyn IdentityAgent,
    credential: &VerifiableCredential,
    preferred: Option<ProofFormat>,
) -> ProbeOutcome {
    let first = preferred
        .or_else(|| detect_proof_format(credential))
        .unwrap_or(ProofFormat::Lds);

    let mut tried = Vec::with_capacity(2);
    let mut last = VerificationResult::failed("no verification attempted");
    for format in [first, first.other()] {
        tried.push(format);
        last = match agent.verify_credential(credential, format).await {
            Ok(result) => result,
            Err(e) => {
                log::debug!("verification as {} failed: {}", format, e);
                VerificationResult::failed(e.to_string())
            }
        };
        if last.verified {
            break;
        }
    }

    ProbeOutcome {
        verified: last.verified,
        tried_formats: tried,
        result: last,
    }
}

/// Maps an agent failure onto a one-line message for CLI output.
pub fn describe(error: &AgentError) -> String {
    match error {
        AgentError::Key(_) => format!("{} (is KMS_SECRET_KEY the one the store was created with?)", error),
        other => other.to_string(),
    }
}
