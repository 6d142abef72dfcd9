// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Builds credential payloads for registered students, has the identity
//! agent sign them, and records every issuance in the JSON logs:
//! - `verifiedUsers.json`: students issued a `StudentID` over the API
//! - `database.json`: students recorded by `POST /issue-user`

use crate::identity::agent::IdentityAgent;
use crate::identity::AgentError;
use crate::models::credential::{
    CredentialPayload, IssuanceEntry, Issuer, ProofFormat, VerifiableCredential,
    CREDENTIALS_V1_CONTEXT, SECP256K1_2019_CONTEXT, VERIFIABLE_CREDENTIAL_TYPE,
};
use crate::models::user::UserRecord;
use crate::storage::json_store::JsonCollection;
use crate::storage::StoreError;
use crate::utils::now_rfc3339;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const STUDENT_ID_TYPE: &str = "StudentID";
pub const STUDENT_CREDENTIAL_TYPE: &str = "StudentCredential";

#[derive(Debug, Error)]
pub enum IssuerError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The three fields every issuance request carries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentDetails {
    pub name: String,
    pub sap: String,
    pub email: String,
}

impl StudentDetails {
    /// Builds details from request fields, `None` if any is missing or blank.
    pub fn from_fields(name: Option<&str>, sap: Option<&str>, email: Option<&str>) -> Option<Self> {
        let field = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Some(Self {
            name: field(name)?,
            sap: field(sap)?,
            email: field(email)?,
        })
    }

    fn entry(&self, issued_at: String) -> IssuanceEntry {
        IssuanceEntry {
            name: self.name.clone(),
            sap: self.sap.clone(),
            email: self.email.clone(),
            issued_at,
        }
    }
}

/// Payload of the API's `StudentID` credential.
pub fn student_id_payload(issuer_did: &str, student: &StudentDetails, issued_at: &str) -> CredentialPayload {
    let mut subject = Map::new();
    subject.insert("name".into(), json!(student.name));
    subject.insert("sap".into(), json!(student.sap));
    subject.insert("email".into(), json!(student.email));

    CredentialPayload {
        context: vec![CREDENTIALS_V1_CONTEXT.to_string()],
        id: None,
        types: vec![VERIFIABLE_CREDENTIAL_TYPE.to_string(), STUDENT_ID_TYPE.to_string()],
        issuer: Issuer::Did(issuer_did.to_string()),
        issuance_date: issued_at.to_string(),
        credential_subject: subject,
    }
}

/// Payload of the operator tools' `StudentCredential`.
///
/// The subject id is `did:example:<id | email | sap>`; `sap` is omitted
/// when the record has none.
pub fn student_credential_payload(issuer_did: &str, user: &UserRecord, issued_at: &str) -> CredentialPayload {
    let mut subject = Map::new();
    subject.insert("id".into(), json!(format!("did:example:{}", user.subject_handle())));
    subject.insert("name".into(), json!(user.name));
    if !user.sap.is_empty() {
        subject.insert("sap".into(), json!(user.sap));
    }
    subject.insert("org".into(), json!(user.org_or_default()));

    CredentialPayload {
        context: vec![
            CREDENTIALS_V1_CONTEXT.to_string(),
            SECP256K1_2019_CONTEXT.to_string(),
            user.context_or_default().to_string(),
        ],
        id: Some(format!("urn:uuid:{}", uuid::Uuid::new_v4())),
        types: vec![VERIFIABLE_CREDENTIAL_TYPE.to_string(), STUDENT_CREDENTIAL_TYPE.to_string()],
        issuer: Issuer::Object {
            id: issuer_did.to_string(),
        },
        issuance_date: issued_at.to_string(),
        credential_subject: subject,
    }
}

/// Service issuing student credentials through an [`IdentityAgent`].
pub struct CredentialIssuer {
    agent: Arc<dyn IdentityAgent>,
    verified_users: JsonCollection<IssuanceEntry>,
    issued_users: JsonCollection<IssuanceEntry>,
}

impl CredentialIssuer {
    /// Creates a new CredentialIssuer
    ///
    /// # Arguments
    /// * `agent` - Identity agent holding the issuer keys
    /// * `verified_users_path` - Log of API issuances (`verifiedUsers.json`)
    /// * `issued_users_path` - Log of recorded users (`database.json`)
    pub fn new(
        agent: Arc<dyn IdentityAgent>,
        verified_users_path: impl Into<PathBuf>,
        issued_users_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent,
            verified_users: JsonCollection::new(verified_users_path),
            issued_users: JsonCollection::new(issued_users_path),
        }
    }

    /// Issues a `StudentID` JWT credential signed by the student's own
    /// identifier (aliased by SAP id, created on first issuance), then logs
    /// the issuance.
    ///
    /// # Returns
    /// The signed credential as produced by the agent
    pub async fn issue_student_id(&self, student: &StudentDetails) -> Result<VerifiableCredential, IssuerError> {
        let identifier = self.agent.get_or_create_identifier(&student.sap).await?;
        let issued_at = now_rfc3339();
        let payload = student_id_payload(&identifier.did, student, &issued_at);

        let credential = self.agent.sign_credential(&payload, ProofFormat::Jwt).await?;
        self.verified_users.append(&student.entry(issued_at)).await?;
        log::info!("issued StudentID for SAP {} by {}", student.sap, identifier.did);
        Ok(credential)
    }

    /// Issues a `StudentCredential` for a meta-file user, signed by the
    /// agent's issuer identity.
    pub async fn issue_student_credential(
        &self,
        user: &UserRecord,
        format: ProofFormat,
    ) -> Result<VerifiableCredential, IssuerError> {
        let issuer = self.agent.create_or_get_issuer_identity().await?;
        let payload = student_credential_payload(&issuer.did, user, &now_rfc3339());
        let credential = self.agent.sign_credential(&payload, format).await?;
        log::info!(
            "issued StudentCredential ({}) for {} by {}",
            format,
            user.display_name(),
            issuer.did
        );
        Ok(credential)
    }

    /// Appends a student to the issued-users log without signing anything.
    pub async fn record_issued_user(&self, student: &StudentDetails) -> Result<IssuanceEntry, IssuerError> {
        let entry = student.entry(now_rfc3339());
        self.issued_users.append(&entry).await?;
        Ok(entry)
    }

    /// The verified-users log as stored.
    pub async fn verified_users(&self) -> Result<Vec<Value>, IssuerError> {
        Ok(self.verified_users.raw().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::agent::verify_with_fallback;
    use crate::identity::local_agent::LocalAgent;
    use crate::wallet::secret::normalize;
    use tempfile::tempdir;

    fn student() -> StudentDetails {
        StudentDetails::from_fields(Some("Asha"), Some("500012"), Some("asha@upes.ac.in")).unwrap()
    }

    fn issuer(dir: &std::path::Path) -> (Arc<dyn IdentityAgent>, CredentialIssuer) {
        let agent: Arc<dyn IdentityAgent> = Arc::new(LocalAgent::temporary(&normalize("0x42")).unwrap());
        let issuer = CredentialIssuer::new(
            agent.clone(),
            dir.join("verifiedUsers.json"),
            dir.join("database.json"),
        );
        (agent, issuer)
    }

    #[test]
    fn test_details_require_every_field() {
        assert!(StudentDetails::from_fields(Some("A"), Some("1"), None).is_none());
        assert!(StudentDetails::from_fields(Some(" "), Some("1"), Some("a@x")).is_none());
        assert_eq!(
            StudentDetails::from_fields(Some(" A "), Some("1"), Some("a@x")).unwrap().name,
            "A"
        );
    }

    #[test]
    fn test_student_id_payload_shape() {
        let payload = student_id_payload("did:key:z1", &student(), "2024-03-01T10:00:00.000Z");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["@context"], json!([CREDENTIALS_V1_CONTEXT]));
        assert_eq!(value["type"], json!(["VerifiableCredential", "StudentID"]));
        assert_eq!(value["issuer"], "did:key:z1");
        assert_eq!(
            value["credentialSubject"],
            json!({"name": "Asha", "sap": "500012", "email": "asha@upes.ac.in"})
        );
    }

    #[test]
    fn test_student_credential_payload_shape() {
        let mut user = UserRecord::new("Asha", "", "asha@upes.ac.in");
        user.context = Some("UPES Academic Identity".into());
        let payload = student_credential_payload("did:key:z1", &user, "2024-03-01T10:00:00.000Z");

        assert_eq!(payload.context.len(), 3);
        assert_eq!(payload.context[2], "UPES Academic Identity");
        assert!(payload.id.as_deref().unwrap().starts_with("urn:uuid:"));
        assert_eq!(payload.issuer, Issuer::Object { id: "did:key:z1".into() });
        assert_eq!(payload.credential_subject["id"], "did:example:asha@upes.ac.in");
        assert_eq!(payload.credential_subject["org"], "UPES");
        assert!(!payload.credential_subject.contains_key("sap"));
    }

    #[tokio::test]
    async fn test_issue_student_id_logs_and_reuses_identifier() {
        let dir = tempdir().unwrap();
        let (agent, issuer) = issuer(dir.path());

        let first = issuer.issue_student_id(&student()).await.unwrap();
        let second = issuer.issue_student_id(&student()).await.unwrap();
        assert_eq!(agent.find_identifiers().await.unwrap().len(), 1);
        assert_eq!(first.as_value()["issuer"], second.as_value()["issuer"]);

        let log = issuer.verified_users().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0]["sap"], "500012");
        assert!(log[0]["issuedAt"].is_string());

        let outcome = verify_with_fallback(agent.as_ref(), &first, None).await;
        assert!(outcome.verified);
    }

    #[tokio::test]
    async fn test_issue_student_credential_uses_issuer_identity() {
        let dir = tempdir().unwrap();
        let (agent, issuer) = issuer(dir.path());
        let user = UserRecord::new("Asha", "500012", "asha@upes.ac.in");

        let vc = issuer.issue_student_credential(&user, ProofFormat::Lds).await.unwrap();
        let default = agent.create_or_get_issuer_identity().await.unwrap();
        assert_eq!(vc.as_value()["issuer"]["id"], default.did);
        assert!(verify_with_fallback(agent.as_ref(), &vc, None).await.verified);
    }

    #[tokio::test]
    async fn test_record_issued_user() {
        let dir = tempdir().unwrap();
        let (_, issuer) = issuer(dir.path());
        let entry = issuer.record_issued_user(&student()).await.unwrap();
        assert_eq!(entry.sap, "500012");

        let raw = std::fs::read_to_string(dir.path().join("database.json")).unwrap();
        assert!(raw.contains("\"issuedAt\""));
    }
}
