// src/identity/ld_proof.rs
//! Embedded linked-data proofs (`EcdsaSecp256k1Signature2019`).
//!
//! The proof travels inside the credential as a detached JWS:
//!
//! ```text
//! proof.jws     = b64url(header) ".." b64url(signature)
//! signing input = b64url(header) "." sha256(canon(proof options)) || sha256(canon(document))
//! ```
//!
//! where `header = {"alg":"ES256K","b64":false,"crit":["b64"]}`, the
//! document is the credential without `proof`, the proof options are the
//! proof without `jws`, and `canon` is JSON with recursively sorted keys.

use crate::identity::{did_key, AgentError, AgentResult, ES256K};
use crate::models::credential::{VerifiableCredential, VerificationResult};
use crate::utils::crypto::{b64url_decode, b64url_encode, sha256};
use crate::utils::serialization::canonical_json;
use crate::wallet::key_management::KeyManager;
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

pub const LD_PROOF_TYPE: &str = "EcdsaSecp256k1Signature2019";
pub const ASSERTION_METHOD: &str = "assertionMethod";

fn jws_header() -> Value {
    json!({ "alg": ES256K, "b64": false, "crit": ["b64"] })
}

fn signing_input(header_b64: &str, document: &Value, options: &Value) -> Vec<u8> {
    let mut input = Vec::with_capacity(header_b64.len() + 1 + 64);
    input.extend_from_slice(header_b64.as_bytes());
    input.push(b'.');
    input.extend_from_slice(&sha256(canonical_json(options).as_bytes()));
    input.extend_from_slice(&sha256(canonical_json(document).as_bytes()));
    input
}

/// Attaches a linked-data proof to `document`.
///
/// # Arguments
/// * `document` - Credential body (a JSON object, without `proof`)
/// * `verification_method` - DID URL of the signing key
/// * `key` - The matching private key
/// * `created` - RFC 3339 timestamp recorded in the proof
pub fn sign(
    mut document: Value,
    verification_method: &str,
    key: &SigningKey,
    created: &str,
) -> AgentResult<VerifiableCredential> {
    let obj = document
        .as_object_mut()
        .ok_or_else(|| AgentError::InvalidCredential("credential must be a JSON object".into()))?;
    obj.remove("proof");

    let mut proof = json!({
        "type": LD_PROOF_TYPE,
        "created": created,
        "proofPurpose": ASSERTION_METHOD,
        "verificationMethod": verification_method,
    });
    let header_b64 = b64url_encode(&serde_json::to_vec(&jws_header())?);
    let signature = KeyManager::sign(key, &signing_input(&header_b64, &document, &proof));
    proof["jws"] = json!(format!("{}..{}", header_b64, b64url_encode(&signature)));

    if let Some(obj) = document.as_object_mut() {
        obj.insert("proof".into(), proof);
    }
    Ok(VerifiableCredential(document))
}

/// Verifies the `EcdsaSecp256k1Signature2019` proof on `credential`.
///
/// # Returns
/// - `Ok(verified)` with the credential body as payload
/// - `Ok(failed)` when the signature or issuer binding does not hold
/// - `Err` if no usable proof is present or its key cannot be resolved
pub fn verify(credential: &VerifiableCredential) -> AgentResult<VerificationResult> {
    let proof = credential
        .proofs()
        .into_iter()
        .find(|p| p.get("type").and_then(Value::as_str) == Some(LD_PROOF_TYPE))
        .cloned()
        .ok_or_else(|| AgentError::InvalidCredential(format!("no {} proof present", LD_PROOF_TYPE)))?;

    let jws = proof
        .get("jws")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidCredential("proof has no jws".into()))?;
    let (header_b64, signature_b64) = split_detached(jws)?;

    let header_bytes = b64url_decode(header_b64)
        .map_err(|e| AgentError::InvalidCredential(format!("jws header is not base64url: {}", e)))?;
    let header: Value = serde_json::from_slice(&header_bytes)?;
    if header.get("alg").and_then(Value::as_str) != Some(ES256K) {
        return Err(AgentError::InvalidCredential("jws alg must be ES256K".into()));
    }
    let signature = b64url_decode(signature_b64)
        .map_err(|e| AgentError::InvalidCredential(format!("jws signature is not base64url: {}", e)))?;

    let verification_method = proof
        .get("verificationMethod")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidCredential("proof has no verificationMethod".into()))?;
    let doc = did_key::resolve(verification_method)?;
    let method = doc
        .verification_method(verification_method)
        .ok_or_else(|| AgentError::InvalidDid(format!("{} not in DID document", verification_method)))?;
    let public_key = did_key::public_key_from_did(&method.controller)?;

    let mut options = proof.clone();
    if let Some(obj) = options.as_object_mut() {
        obj.remove("jws");
    }
    let mut document = credential.as_value().clone();
    if let Some(obj) = document.as_object_mut() {
        obj.remove("proof");
    }

    let input = signing_input(header_b64, &document, &options);
    if KeyManager::verify(&public_key, &input, &signature).is_err() {
        return Ok(VerificationResult::failed("linked-data proof signature is invalid"));
    }

    let issuer = match document.get("issuer") {
        Some(Value::String(did)) => Some(did.clone()),
        Some(other) => other.get("id").and_then(Value::as_str).map(str::to_string),
        None => None,
    };
    match issuer {
        Some(issuer) if issuer == doc.id => Ok(VerificationResult::verified(issuer, document)),
        Some(issuer) => Ok(VerificationResult::failed(format!(
            "proof key belongs to {}, not issuer {}",
            doc.id, issuer
        ))),
        None => Ok(VerificationResult::failed("credential has no issuer")),
    }
}

fn split_detached(jws: &str) -> AgentResult<(&str, &str)> {
    let mut parts = jws.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(""), Some(signature), None) => Ok((header, signature)),
        _ => Err(AgentError::InvalidCredential(
            "jws must be a detached compact JWS (header..signature)".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(key: &SigningKey) -> VerifiableCredential {
        let did = did_key::did_from_public_key(&KeyManager::public_key_bytes(key));
        let vm = did_key::verification_method_id(&did).unwrap();
        let body = json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "StudentCredential"],
            "issuer": { "id": did },
            "issuanceDate": "2024-03-01T10:00:00.000Z",
            "credentialSubject": { "id": "did:example:alice", "name": "Alice", "org": "UPES" }
        });
        sign(body, &vm, key, "2024-03-01T10:00:00.000Z").unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let key = KeyManager::generate_key();
        let vc = signed(&key);

        let proof = &vc.as_value()["proof"];
        assert_eq!(proof["type"], LD_PROOF_TYPE);
        assert_eq!(proof["proofPurpose"], ASSERTION_METHOD);
        assert!(proof["jws"].as_str().unwrap().contains(".."));

        let result = verify(&vc).unwrap();
        assert!(result.verified, "{:?}", result.error);
        assert_eq!(result.payload.unwrap()["credentialSubject"]["name"], "Alice");
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let key = KeyManager::generate_key();
        let vc = signed(&key);
        // Re-serializing through a string keeps semantics; canonical form ignores order.
        let reparsed: Value = serde_json::from_str(&vc.as_value().to_string()).unwrap();
        assert!(verify(&VerifiableCredential(reparsed)).unwrap().verified);
    }

    #[test]
    fn test_tampered_subject_fails() {
        let key = KeyManager::generate_key();
        let mut value = signed(&key).into_value();
        value["credentialSubject"]["name"] = json!("Mallory");
        assert!(!verify(&VerifiableCredential(value)).unwrap().verified);
    }

    #[test]
    fn test_foreign_signer_fails_issuer_binding() {
        let issuer_key = KeyManager::generate_key();
        let mut value = signed(&issuer_key).into_value();
        let other = did_key::did_from_public_key(&KeyManager::public_key_bytes(
            &KeyManager::generate_key(),
        ));
        value["issuer"] = json!({ "id": other });
        // Issuer edited after signing: the signature no longer matches either.
        assert!(!verify(&VerifiableCredential(value)).unwrap().verified);
    }

    #[test]
    fn test_jwt_credential_is_not_an_ld_proof() {
        let vc = VerifiableCredential(json!({ "proof": { "type": "JwtProof2020", "jwt": "a.b.c" } }));
        assert!(matches!(verify(&vc), Err(AgentError::InvalidCredential(_))));
    }

    #[test]
    fn test_jws_must_be_detached() {
        assert!(split_detached("a..b").is_ok());
        assert!(split_detached("a.b.c").is_err());
        assert!(split_detached("a..b.c").is_err());
    }
}
