// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! Defines the W3C [DID Core](https://www.w3.org/TR/did-core/) document shape
//! returned by resolution, and the agent's record of an identifier it
//! controls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DID_V1_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// A DID Document describing the keys bound to a DID.
///
/// # DID Format
/// ```text
/// did:<method>:<method-specific-id>
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The DID this document describes.
    pub id: String,

    pub verification_method: Vec<VerificationMethod>,

    pub authentication: Vec<String>,
    pub assertion_method: Vec<String>,
    pub capability_invocation: Vec<String>,
    pub capability_delegation: Vec<String>,
}

impl DidDocument {
    /// Looks up a verification method by full id (`did#fragment`) or bare
    /// fragment.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|vm| {
            vm.id == id || vm.id.rsplit_once('#').map(|(_, frag)| frag) == id.strip_prefix('#')
        })
    }
}

/// A public key entry of a DID Document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub controller: String,

    /// Public key as a JWK (`kty: EC`, `crv: secp256k1`).
    pub public_key_jwk: Value,
}

/// A key held by the agent's KMS.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedKey {
    /// Key id; the hex encoding of the compressed public key.
    pub kid: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub public_key_hex: String,

    /// Name of the KMS holding the private half.
    pub kms: String,
}

/// An identifier the agent controls.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIdentifier {
    pub did: String,
    pub alias: String,
    pub provider: String,
    pub controller_key_id: String,
    pub keys: Vec<ManagedKey>,
    pub created_at: String,
}
