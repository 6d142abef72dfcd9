// src/utils/crypto.rs
//! Hashing and encoding helpers shared by the wallet and identity layers.
//!
//! SHA-256 is used everywhere a digest is needed: the secret normalizer's
//! fallback path, the linked-data proof's signing input and JWT signatures.

use ring::digest::{digest, SHA256};

/// Computes a SHA-256 digest of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash
///
/// # Returns
/// Fixed-size 32-byte array containing the digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Lowercase hex encoding of the SHA-256 digest of `data`.
#[cfg(test)]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Encodes bytes as unpadded base64url.
pub fn b64url_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Decodes base64url, tolerating trailing `=` padding.
///
/// # Errors
/// Returns the decoder error for invalid symbols or an impossible length.
pub fn b64url_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::decode_config(data.trim_end_matches('='), base64::URL_SAFE_NO_PAD)
}
