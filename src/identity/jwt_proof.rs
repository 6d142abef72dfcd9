// src/identity/jwt_proof.rs
//! VC-JWT proofs (`JwtProof2020`).
//!
//! A credential is signed as a compact ES256K JWT whose claims carry the
//! credential under `vc`. The signed form handed back to callers is the
//! credential body with `proof: { type: "JwtProof2020", jwt }`, the JWT
//! being the only part that is verified.

use crate::identity::{did_key, AgentError, AgentResult, ES256K};
use crate::models::credential::{CredentialPayload, VerifiableCredential, VerificationResult};
use crate::utils::crypto::{b64url_decode, b64url_encode};
use crate::wallet::key_management::KeyManager;
use chrono::{DateTime, Utc};
use k256::ecdsa::SigningKey;
use serde_json::{json, Map, Value};

pub const JWT_PROOF_TYPE: &str = "JwtProof2020";

/// A split compact JWT.
#[derive(Debug)]
pub struct DecodedJwt {
    pub header: Value,
    pub claims: Value,
    pub signing_input: String,
    pub signature: Vec<u8>,
}

/// Signs `payload` as a VC-JWT and returns the wrapped credential.
///
/// # Arguments
/// * `payload` - Unsigned credential; its issuer must be the DID owning `key`
/// * `kid` - Verification method id placed in the JOSE header
/// * `key` - The issuer's private key
pub fn sign(payload: &CredentialPayload, kid: &str, key: &SigningKey) -> AgentResult<VerifiableCredential> {
    let jwt = encode(payload, kid, key)?;

    let mut body = serde_json::to_value(payload)?;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("issuer".into(), json!({ "id": payload.issuer.did() }));
        obj.insert("proof".into(), json!({ "type": JWT_PROOF_TYPE, "jwt": jwt }));
    }
    Ok(VerifiableCredential(body))
}

/// Encodes the compact JWT for `payload`.
pub fn encode(payload: &CredentialPayload, kid: &str, key: &SigningKey) -> AgentResult<String> {
    let header = json!({ "alg": ES256K, "typ": "JWT", "kid": kid });
    let claims = claims_for(payload)?;

    let signing_input = format!(
        "{}.{}",
        b64url_encode(&serde_json::to_vec(&header)?),
        b64url_encode(&serde_json::to_vec(&claims)?)
    );
    let signature = KeyManager::sign(key, signing_input.as_bytes());
    Ok(format!("{}.{}", signing_input, b64url_encode(&signature)))
}

/// Maps a credential onto registered JWT claims (`iss`, `sub`, `nbf`, `jti`).
fn claims_for(payload: &CredentialPayload) -> AgentResult<Value> {
    let issued = DateTime::parse_from_rfc3339(&payload.issuance_date).map_err(|e| {
        AgentError::InvalidCredential(format!(
            "issuanceDate '{}' is not RFC 3339: {}",
            payload.issuance_date, e
        ))
    })?;

    let mut subject = payload.credential_subject.clone();
    let subject_id = subject.remove("id");

    let mut vc = Map::new();
    vc.insert("@context".into(), json!(payload.context));
    vc.insert("type".into(), json!(payload.types));
    vc.insert("credentialSubject".into(), Value::Object(subject));

    let mut claims = Map::new();
    claims.insert("vc".into(), Value::Object(vc));
    claims.insert("iss".into(), json!(payload.issuer.did()));
    if let Some(sub) = subject_id {
        claims.insert("sub".into(), sub);
    }
    claims.insert("nbf".into(), json!(issued.timestamp()));
    if let Some(id) = &payload.id {
        claims.insert("jti".into(), json!(id));
    }
    Ok(Value::Object(claims))
}

/// Splits and decodes a compact JWT without checking the signature.
pub fn decode(jwt: &str) -> AgentResult<DecodedJwt> {
    let parts: Vec<&str> = jwt.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(AgentError::InvalidCredential(format!(
            "expected 3 JWT segments, found {}",
            parts.len()
        )));
    }
    let segment = |index: usize, what: &str| -> AgentResult<Vec<u8>> {
        b64url_decode(parts[index])
            .map_err(|e| AgentError::InvalidCredential(format!("JWT {} is not base64url: {}", what, e)))
    };

    let header: Value = serde_json::from_slice(&segment(0, "header")?)?;
    let claims: Value = serde_json::from_slice(&segment(1, "payload")?)?;
    Ok(DecodedJwt {
        header,
        claims,
        signing_input: format!("{}.{}", parts[0], parts[1]),
        signature: segment(2, "signature")?,
    })
}

/// Verifies a compact VC-JWT against the public key in its `iss` DID.
///
/// # Returns
/// - `Ok(verified)` with the JWT claims as payload
/// - `Ok(failed)` if the signature does not match or the token expired
/// - `Err` if the token is malformed or names an unsupported issuer
pub fn verify(jwt: &str) -> AgentResult<VerificationResult> {
    let decoded = decode(jwt)?;

    let alg = decoded.header.get("alg").and_then(Value::as_str).unwrap_or_default();
    if alg != ES256K {
        return Err(AgentError::InvalidCredential(format!("unsupported JWT alg '{}'", alg)));
    }
    let issuer = decoded
        .claims
        .get("iss")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidCredential("JWT has no iss claim".into()))?
        .to_string();

    let public_key = did_key::public_key_from_did(&issuer)?;
    if KeyManager::verify(&public_key, decoded.signing_input.as_bytes(), &decoded.signature).is_err() {
        return Ok(VerificationResult::failed("JWT signature does not match issuer key"));
    }

    if let Some(exp) = decoded.claims.get("exp").and_then(Value::as_i64) {
        if exp < Utc::now().timestamp() {
            return Ok(VerificationResult::failed("JWT has expired"));
        }
    }
    Ok(VerificationResult::verified(issuer, decoded.claims))
}

/// Verifies the JWT carried by `credential`, checking that the wrapper's
/// declared issuer (if any) agrees with the token.
pub fn verify_credential(credential: &VerifiableCredential) -> AgentResult<VerificationResult> {
    let jwt = credential
        .jwt()
        .ok_or_else(|| AgentError::InvalidCredential("credential carries no JWT".into()))?;
    let result = verify(jwt)?;

    let declared = credential.as_value().get("issuer").and_then(|issuer| match issuer {
        Value::String(did) => Some(did.as_str()),
        other => other.get("id").and_then(Value::as_str),
    });
    match (declared, result.issuer.as_deref()) {
        (Some(declared), Some(signed)) if result.verified && declared != signed => Ok(
            VerificationResult::failed(format!("issuer {} does not match JWT issuer {}", declared, signed)),
        ),
        _ => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::{Issuer, CREDENTIALS_V1_CONTEXT};

    fn payload_for(key: &SigningKey) -> CredentialPayload {
        let did = did_key::did_from_public_key(&KeyManager::public_key_bytes(key));
        let mut subject = Map::new();
        subject.insert("id".into(), json!("did:example:alice"));
        subject.insert("name".into(), json!("Alice"));
        CredentialPayload {
            context: vec![CREDENTIALS_V1_CONTEXT.into()],
            id: Some("urn:uuid:1234".into()),
            types: vec!["VerifiableCredential".into(), "StudentID".into()],
            issuer: Issuer::Did(did),
            issuance_date: "2024-03-01T10:00:00.000Z".into(),
            credential_subject: subject,
        }
    }

    #[test]
    fn test_sign_then_verify() {
        let key = KeyManager::generate_key();
        let payload = payload_for(&key);
        let vc = sign(&payload, "kid-1", &key).unwrap();

        assert_eq!(vc.as_value()["proof"]["type"], JWT_PROOF_TYPE);
        assert_eq!(vc.as_value()["issuer"]["id"], payload.issuer.did());

        let result = verify_credential(&vc).unwrap();
        assert!(result.verified, "{:?}", result.error);
        assert_eq!(result.issuer.as_deref(), Some(payload.issuer.did()));
        let claims = result.payload.unwrap();
        assert_eq!(claims["sub"], "did:example:alice");
        assert_eq!(claims["jti"], "urn:uuid:1234");
        assert_eq!(claims["nbf"], 1709287200);
        assert_eq!(claims["vc"]["credentialSubject"]["name"], "Alice");
    }

    #[test]
    fn test_header_names_es256k_and_kid() {
        let key = KeyManager::generate_key();
        let jwt = encode(&payload_for(&key), "did:key:z#z", &key).unwrap();
        let decoded = decode(&jwt).unwrap();
        assert_eq!(decoded.header["alg"], "ES256K");
        assert_eq!(decoded.header["typ"], "JWT");
        assert_eq!(decoded.header["kid"], "did:key:z#z");
        assert_eq!(decoded.signature.len(), 64);
    }

    #[test]
    fn test_tampered_claims_fail() {
        let key = KeyManager::generate_key();
        let jwt = encode(&payload_for(&key), "kid", &key).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();

        let mut claims: Value = serde_json::from_slice(&b64url_decode(parts[1]).unwrap()).unwrap();
        claims["vc"]["credentialSubject"]["name"] = json!("Mallory");
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            b64url_encode(&serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );
        assert!(!verify(&forged).unwrap().verified);
    }

    #[test]
    fn test_wrapper_issuer_must_match() {
        let key = KeyManager::generate_key();
        let mut vc = sign(&payload_for(&key), "kid", &key).unwrap().into_value();
        vc["issuer"] = json!({ "id": "did:key:zSomeoneElse" });
        let result = verify_credential(&VerifiableCredential(vc)).unwrap();
        assert!(!result.verified);
    }

    #[test]
    fn test_malformed_tokens_error() {
        assert!(decode("only.two").is_err());
        assert!(decode("!!.??.##").is_err());
        assert!(verify_credential(&VerifiableCredential(json!({"proof": {}}))).is_err());
    }

    #[test]
    fn test_bad_issuance_date_rejected() {
        let key = KeyManager::generate_key();
        let mut payload = payload_for(&key);
        payload.issuance_date = "yesterday".into();
        assert!(matches!(encode(&payload, "kid", &key), Err(AgentError::InvalidCredential(_))));
    }
}
