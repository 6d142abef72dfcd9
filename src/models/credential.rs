// src/models/credential.rs
//! Verifiable Credential data model.
//!
//! Unsigned payloads follow the [W3C Verifiable Credentials Data Model
//! 1.1](https://www.w3.org/TR/vc-data-model/). Signed credentials are treated
//! as opaque JSON: whatever the identity agent produced is persisted and
//! re-loaded untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const SECP256K1_2019_CONTEXT: &str = "https://w3id.org/security/suites/secp256k1-2019/v1";
pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// Signature encoding used for a credential's proof.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProofFormat {
    /// Compact JWT (VC-JWT), `JwtProof2020`.
    Jwt,
    /// Embedded linked-data style proof with a detached JWS.
    Lds,
}

impl ProofFormat {
    /// The other enumerated format; the verifier's fallback.
    pub fn other(self) -> Self {
        match self {
            ProofFormat::Jwt => ProofFormat::Lds,
            ProofFormat::Lds => ProofFormat::Jwt,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProofFormat::Jwt => "jwt",
            ProofFormat::Lds => "lds",
        }
    }
}

impl fmt::Display for ProofFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jwt" => Ok(ProofFormat::Jwt),
            "lds" | "ld" => Ok(ProofFormat::Lds),
            other => Err(format!("unknown proof format '{}' (expected jwt or lds)", other)),
        }
    }
}

/// Credential issuer: either a bare DID or `{ "id": did }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Issuer {
    Did(String),
    Object { id: String },
}

impl Issuer {
    pub fn did(&self) -> &str {
        match self {
            Issuer::Did(did) => did,
            Issuer::Object { id } => id,
        }
    }
}

/// An unsigned credential, ready to be handed to the agent's signer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialPayload {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub types: Vec<String>,

    pub issuer: Issuer,

    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,

    #[serde(rename = "credentialSubject")]
    pub credential_subject: Map<String, Value>,
}

/// A signed credential exactly as the agent produced it.
///
/// Either a JSON object carrying a `proof`, or a bare compact JWT string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct VerifiableCredential(pub Value);

impl VerifiableCredential {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The `proof` entries, normalized to a list.
    pub fn proofs(&self) -> Vec<&Value> {
        match self.0.get("proof") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(proof) => vec![proof],
            None => Vec::new(),
        }
    }

    /// The compact JWT carried by this credential, if any.
    pub fn jwt(&self) -> Option<&str> {
        if let Value::String(jwt) = &self.0 {
            return Some(jwt);
        }
        self.proofs()
            .into_iter()
            .find_map(|p| p.get("jwt").and_then(Value::as_str))
            .or_else(|| self.0.get("jwt").and_then(Value::as_str))
    }
}

/// Guesses which proof format a credential carries.
///
/// A bare string or a proof with a `jwt` member is a JWT; a proof whose
/// `type` names a signature suite is linked-data. Returns `None` when
/// nothing recognizable is present.
pub fn detect_proof_format(credential: &VerifiableCredential) -> Option<ProofFormat> {
    let value = credential.as_value();
    if value.is_string() {
        return Some(ProofFormat::Jwt);
    }
    if !value.is_object() {
        return None;
    }
    for proof in credential.proofs() {
        if proof.get("jwt").map_or(false, Value::is_string) {
            return Some(ProofFormat::Jwt);
        }
        if let Some(kind) = proof.get("type").and_then(Value::as_str) {
            if ["Signature", "LinkedData", "DataIntegrity"]
                .iter()
                .any(|marker| kind.contains(marker))
            {
                return Some(ProofFormat::Lds);
            }
        }
    }
    if value.get("jwt").map_or(false, Value::is_string) {
        return Some(ProofFormat::Jwt);
    }
    None
}

/// Outcome of one verification attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// The verified claims (the JWT payload, or the credential body).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn verified(issuer: impl Into<String>, payload: Value) -> Self {
        Self {
            verified: true,
            issuer: Some(issuer.into()),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// One line of an issuance log (`verifiedUsers.json`, `database.json`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceEntry {
    pub name: String,
    pub sap: String,
    pub email: String,
    pub issued_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vc(value: Value) -> VerifiableCredential {
        VerifiableCredential(value)
    }

    #[test]
    fn test_detect_jwt_forms() {
        assert_eq!(detect_proof_format(&vc(json!("a.b.c"))), Some(ProofFormat::Jwt));
        assert_eq!(
            detect_proof_format(&vc(json!({"proof": {"type": "JwtProof2020", "jwt": "a.b.c"}}))),
            Some(ProofFormat::Jwt)
        );
        assert_eq!(detect_proof_format(&vc(json!({"jwt": "a.b.c"}))), Some(ProofFormat::Jwt));
    }

    #[test]
    fn test_detect_linked_data_forms() {
        assert_eq!(
            detect_proof_format(&vc(json!({"proof": {"type": "EcdsaSecp256k1Signature2019"}}))),
            Some(ProofFormat::Lds)
        );
        assert_eq!(
            detect_proof_format(&vc(json!({"proof": [{"type": "Ed25519Signature2018"}]}))),
            Some(ProofFormat::Lds)
        );
    }

    #[test]
    fn test_detect_nothing() {
        assert_eq!(detect_proof_format(&vc(json!({"issuer": "did:x"}))), None);
        assert_eq!(detect_proof_format(&vc(json!(42))), None);
    }

    #[test]
    fn test_payload_serializes_w3c_names() {
        let payload = CredentialPayload {
            context: vec![CREDENTIALS_V1_CONTEXT.into()],
            id: None,
            types: vec![VERIFIABLE_CREDENTIAL_TYPE.into()],
            issuer: Issuer::Object { id: "did:key:z1".into() },
            issuance_date: "2024-01-01T00:00:00.000Z".into(),
            credential_subject: Map::new(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["@context"][0], CREDENTIALS_V1_CONTEXT);
        assert_eq!(value["issuer"]["id"], "did:key:z1");
        assert!(value.get("id").is_none());
        assert!(value.get("credentialSubject").is_some());
    }

    #[test]
    fn test_proof_format_parsing() {
        assert_eq!("JWT".parse::<ProofFormat>().unwrap(), ProofFormat::Jwt);
        assert_eq!("lds".parse::<ProofFormat>().unwrap(), ProofFormat::Lds);
        assert!("cwt".parse::<ProofFormat>().is_err());
        assert_eq!(ProofFormat::Jwt.other(), ProofFormat::Lds);
    }
}
