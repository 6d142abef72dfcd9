// src/services/verifier.rs
//! Verifier Service
//!
//! Two kinds of verification live here:
//! - SAP lookup: a registered student's stored fields are echoed back as
//!   the "verified" certificate
//! - credential verification: a signed credential blob is checked by the
//!   identity agent, probing both proof formats

use crate::identity::agent::{verify_with_fallback, IdentityAgent, ProbeOutcome};
use crate::models::credential::{ProofFormat, VerifiableCredential};
use crate::models::user::UserRecord;
use crate::storage::meta_store::MetaStore;
use crate::storage::StoreResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Certificate details returned for a verified SAP id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedStudent {
    pub name: String,
    pub email: String,
    pub sap: String,
    /// The record's `context`.
    #[serde(default)]
    pub course: Option<String>,
    /// The record's `createdAt`.
    #[serde(default)]
    pub issue_date: Option<String>,
}

impl From<UserRecord> for VerifiedStudent {
    fn from(user: UserRecord) -> Self {
        Self {
            name: user.name,
            email: user.email,
            sap: user.sap,
            course: user.context,
            issue_date: user.created_at,
        }
    }
}

pub struct Verifier {
    meta: MetaStore,
    agent: Arc<dyn IdentityAgent>,
}

impl Verifier {
    /// Creates a new Verifier
    ///
    /// # Arguments
    /// * `meta` - Store holding registered students
    /// * `agent` - Identity agent used to check signatures
    pub fn new(meta: MetaStore, agent: Arc<dyn IdentityAgent>) -> Self {
        Self { meta, agent }
    }

    /// Looks up a SAP id in the meta file.
    ///
    /// # Returns
    /// - `Ok(Some(student))` for the first record with this SAP id
    /// - `Ok(None)` if no record matches (including a missing meta file)
    pub async fn verify_sap(&self, sap: &str) -> StoreResult<Option<VerifiedStudent>> {
        let found = self.meta.find_by_sap(sap.trim()).await?;
        if found.is_none() {
            log::info!("no certificate for SAP {}", sap.trim());
        }
        Ok(found.map(VerifiedStudent::from))
    }

    /// Verifies a signed credential.
    ///
    /// # Arguments
    /// * `credential` - The credential as issued
    /// * `preferred` - Format to try first; detected from the credential when `None`
    pub async fn verify_credential(
        &self,
        credential: &VerifiableCredential,
        preferred: Option<ProofFormat>,
    ) -> ProbeOutcome {
        let outcome = verify_with_fallback(self.agent.as_ref(), credential, preferred).await;
        log::info!(
            "credential verification: verified={} tried={:?}",
            outcome.verified,
            outcome.tried_formats
        );
        outcome
    }

    /// The meta document as stored, for listing.
    pub async fn users_document(&self) -> StoreResult<Value> {
        self.meta.raw().await
    }
}
