// src/identity/did_key.rs
//! The `did:key` method for secp256k1 keys.
//!
//! Format: `did:key:z<base58btc(0xe7 0x01 || compressed SEC1 key)>`.
//! Resolution is local: the DID document is derived from the DID string.

use crate::identity::{AgentError, AgentResult};
use crate::models::credential::SECP256K1_2019_CONTEXT;
use crate::models::did::{DidDocument, VerificationMethod, DID_V1_CONTEXT};
use crate::utils::crypto::b64url_encode;
use k256::ecdsa::VerifyingKey;
use serde_json::{json, Value};

pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multicodec varint for `secp256k1-pub`.
const SECP256K1_MULTICODEC: [u8; 2] = [0xe7, 0x01];

/// Multibase prefix for base58btc.
const BASE58BTC: char = 'z';

const VERIFICATION_KEY_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// Builds the DID for a compressed secp256k1 public key.
pub fn did_from_public_key(compressed: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(SECP256K1_MULTICODEC.len() + compressed.len());
    bytes.extend_from_slice(&SECP256K1_MULTICODEC);
    bytes.extend_from_slice(compressed);
    format!("{}{}{}", DID_KEY_PREFIX, BASE58BTC, bs58::encode(bytes).into_string())
}

/// Strips a fragment or query from a DID URL.
pub fn did_of(did_url: &str) -> &str {
    did_url
        .split(|c| c == '#' || c == '?')
        .next()
        .unwrap_or(did_url)
}

/// `<did>#<multibase key>`, the id of the DID's only verification method.
pub fn verification_method_id(did: &str) -> AgentResult<String> {
    let did = did_of(did);
    let multibase = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| AgentError::InvalidDid(format!("{} is not a did:key", did)))?;
    Ok(format!("{}#{}", did, multibase))
}

/// Extracts the compressed public key from a `did:key` DID (or DID URL).
pub fn public_key_from_did(did: &str) -> AgentResult<Vec<u8>> {
    let did = did_of(did);
    let multibase = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| AgentError::InvalidDid(format!("{} is not a did:key", did)))?;
    let encoded = multibase
        .strip_prefix(BASE58BTC)
        .ok_or_else(|| AgentError::InvalidDid("expected base58btc multibase ('z')".into()))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| AgentError::InvalidDid(format!("invalid base58: {}", e)))?;

    let key = bytes
        .strip_prefix(&SECP256K1_MULTICODEC[..])
        .ok_or_else(|| AgentError::InvalidDid("unsupported key type (expected secp256k1-pub)".into()))?;
    VerifyingKey::from_sec1_bytes(key)
        .map_err(|e| AgentError::InvalidDid(format!("invalid secp256k1 key: {}", e)))?;
    Ok(key.to_vec())
}

/// Public key as a JWK (`kty: EC`, `crv: secp256k1`).
pub fn public_key_jwk(sec1: &[u8]) -> AgentResult<Value> {
    let key = VerifyingKey::from_sec1_bytes(sec1)
        .map_err(|e| AgentError::InvalidDid(format!("invalid secp256k1 key: {}", e)))?;
    let point = key.to_encoded_point(false);
    let bytes = point.as_bytes();
    Ok(json!({
        "kty": "EC",
        "crv": "secp256k1",
        "x": b64url_encode(&bytes[1..33]),
        "y": b64url_encode(&bytes[33..65]),
    }))
}

/// Resolves a `did:key` DID (or DID URL) into its DID Document.
pub fn resolve(did_url: &str) -> AgentResult<DidDocument> {
    let did = did_of(did_url);
    let public_key = public_key_from_did(did)?;
    let vm_id = verification_method_id(did)?;

    Ok(DidDocument {
        context: vec![DID_V1_CONTEXT.to_string(), SECP256K1_2019_CONTEXT.to_string()],
        id: did.to_string(),
        verification_method: vec![VerificationMethod {
            id: vm_id.clone(),
            kind: VERIFICATION_KEY_TYPE.to_string(),
            controller: did.to_string(),
            public_key_jwk: public_key_jwk(&public_key)?,
        }],
        authentication: vec![vm_id.clone()],
        assertion_method: vec![vm_id.clone()],
        capability_invocation: vec![vm_id.clone()],
        capability_delegation: vec![vm_id],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::KeyManager;

    #[test]
    fn test_did_roundtrips_public_key() {
        let key = KeyManager::generate_key();
        let public = KeyManager::public_key_bytes(&key);
        let did = did_from_public_key(&public);

        // secp256k1 did:key identifiers start with "zQ3s".
        assert!(did.starts_with("did:key:zQ3s"), "got {}", did);
        assert_eq!(public_key_from_did(&did).unwrap(), public);
        assert_eq!(public_key_from_did(&format!("{}#frag", did)).unwrap(), public);
    }

    #[test]
    fn test_resolve_builds_document() {
        let public = KeyManager::public_key_bytes(&KeyManager::generate_key());
        let did = did_from_public_key(&public);
        let doc = resolve(&did).unwrap();

        assert_eq!(doc.id, did);
        assert_eq!(doc.verification_method.len(), 1);
        let vm = &doc.verification_method[0];
        assert_eq!(vm.controller, did);
        assert_eq!(vm.public_key_jwk["crv"], "secp256k1");
        assert_eq!(doc.assertion_method, vec![vm.id.clone()]);
        assert!(doc.verification_method(&vm.id).is_some());
    }

    #[test]
    fn test_rejects_foreign_dids() {
        assert!(matches!(resolve("did:web:example.com"), Err(AgentError::InvalidDid(_))));
        assert!(matches!(resolve("did:key:f1234"), Err(AgentError::InvalidDid(_))));
        // Ed25519 did:key: wrong multicodec.
        assert!(matches!(
            resolve("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"),
            Err(AgentError::InvalidDid(_))
        ));
    }
}
