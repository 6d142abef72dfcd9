// src/wallet/secret.rs
//! KMS secret normalization.
//!
//! The local key-management secret box needs exactly 32 bytes of key
//! material, but secrets reach us as 64-char hex, short hex, `0x`-prefixed
//! hex, base64url seeds, or arbitrary strings. [`normalize`] maps every one
//! of these onto a [`NormalizedSecret`] deterministically, so a secret that
//! sealed a key yesterday reopens it today.

use crate::utils::crypto::{b64url_decode, sha256};
use std::fmt;

/// Number of bytes in a normalized secret.
pub const SECRET_LEN: usize = 32;

/// Number of hex characters in a normalized secret.
pub const SECRET_HEX_LEN: usize = SECRET_LEN * 2;

/// A canonical 32-byte secret, rendered as 64 lowercase hex characters.
///
/// Construct with [`normalize`] or [`NormalizedSecret::from_bytes`]; there is
/// no way to build one of any other length.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedSecret([u8; SECRET_LEN]);

impl NormalizedSecret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// The 64-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// First 12 hex characters, the only part of a secret that is ever logged.
    pub fn fingerprint(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    /// Builds a secret from a string of hex digits: truncated to 64
    /// characters, right-padded with `'0'`.
    fn from_hex_digits(digits: &str) -> Self {
        let mut nibbles = [0u8; SECRET_HEX_LEN];
        for (slot, c) in nibbles.iter_mut().zip(digits.chars()) {
            *slot = c.to_digit(16).unwrap_or(0) as u8;
        }
        let mut bytes = [0u8; SECRET_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (nibbles[2 * i] << 4) | nibbles[2 * i + 1];
        }
        Self(bytes)
    }

    /// Builds a secret from decoded bytes: first 32 bytes kept, zero-filled
    /// when shorter.
    fn from_decoded(decoded: &[u8]) -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        let n = decoded.len().min(SECRET_LEN);
        bytes[..n].copy_from_slice(&decoded[..n]);
        Self(bytes)
    }
}

impl fmt::Display for NormalizedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NormalizedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NormalizedSecret({}...)", self.fingerprint())
    }
}

/// Normalizes an arbitrary string into a 32-byte secret.
///
/// Total and deterministic. Precedence:
/// 1. trim whitespace and wrapping quote characters
/// 2. strip every leading `0x` / `0X`
/// 3. all hex digits: truncate to 64, pad with `'0'`, lowercase
/// 4. all base64url characters: decode, keep the first 32 bytes, zero-pad
/// 5. otherwise (or if decoding fails): SHA-256 of the trimmed input
///
/// An empty input is not rejected here. Callers treat a blank secret as
/// missing configuration before they get this far.
pub fn normalize(input: &str) -> NormalizedSecret {
    let trimmed = strip_wrapping(input);
    let body = strip_hex_prefixes(trimmed);

    if is_hex(body) {
        return NormalizedSecret::from_hex_digits(body);
    }

    if is_base64url(body) {
        if let Ok(decoded) = b64url_decode(body) {
            return NormalizedSecret::from_decoded(&decoded);
        }
    }

    NormalizedSecret(sha256(trimmed.as_bytes()))
}

/// Trims whitespace and any run of `"` / `'` wrapping the value.
pub fn strip_wrapping(input: &str) -> &str {
    input
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
}

fn strip_hex_prefixes(mut s: &str) -> &str {
    while s.len() >= 2 && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
    }
    s
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Matches `^[A-Za-z0-9_-]+=*$`.
fn is_base64url(s: &str) -> bool {
    let body = s.trim_end_matches('=');
    !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::sha256_hex;

    #[test]
    fn test_short_prefixed_hex_is_padded_and_lowercased() {
        let expected = format!("ab{}", "0".repeat(62));
        assert_eq!(normalize("0xAB").to_hex(), expected);
    }

    #[test]
    fn test_garbage_falls_back_to_sha256() {
        let input = "not-valid-hex-or-b64!!";
        assert_eq!(normalize(input).to_hex(), sha256_hex(input.as_bytes()));
    }

    #[test]
    fn test_fallback_hashes_trimmed_input() {
        assert_eq!(normalize("  abc!  ").to_hex(), sha256_hex(b"abc!"));
    }

    #[test]
    fn test_hex_output_is_fixed_point() {
        let inputs = [
            "0",
            "abc",
            "deadbeef",
            "00112233445566778899aabbccddeeff",
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        ];
        for input in inputs {
            let first = normalize(input).to_hex();
            assert_eq!(first.len(), SECRET_HEX_LEN);
            assert!(first.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
            assert_eq!(normalize(&first).to_hex(), first, "input {input}");
        }
    }

    #[test]
    fn test_long_hex_is_truncated() {
        let input = format!("{}{}", "1".repeat(64), "ffff");
        assert_eq!(normalize(&input).to_hex(), "1".repeat(64));
    }

    #[test]
    fn test_repeated_prefixes_and_quotes_are_stripped() {
        let expected = normalize("ab").to_hex();
        assert_eq!(normalize("0x0XAB").to_hex(), expected);
        assert_eq!(normalize("\"0xab\"").to_hex(), expected);
        assert_eq!(normalize(" '0xab' \n").to_hex(), expected);
    }

    #[test]
    fn test_base64url_seed_is_decoded() {
        // "SGVsbG8" is base64url for "Hello" and contains non-hex characters.
        let expected = format!("48656c6c6f{}", "0".repeat(54));
        assert_eq!(normalize("SGVsbG8").to_hex(), expected);
        assert_eq!(normalize("SGVsbG8=").to_hex(), expected);
    }

    #[test]
    fn test_base64url_longer_than_32_bytes_is_truncated() {
        let seed: Vec<u8> = (0u8..48).collect();
        let encoded = crate::utils::crypto::b64url_encode(&seed);
        assert_eq!(normalize(&encoded).as_bytes()[..], seed[..32]);
    }

    #[test]
    fn test_hex_with_trailing_garbage_is_not_hex() {
        // Not hex, not base64url: must hash rather than keep the hex prefix.
        let out = normalize("abcdef!").to_hex();
        assert_eq!(out, sha256_hex(b"abcdef!"));
        assert!(!out.starts_with("abcdef0"));
    }

    #[test]
    fn test_undecodable_base64url_falls_back_to_sha256() {
        // Base64url alphabet, but a dangling symbol ("x") or non-zero
        // trailing bits ("ABh") make the decoder reject them.
        for input in ["ABh", "x"] {
            assert_eq!(normalize(input).to_hex(), sha256_hex(input.as_bytes()), "input {input}");
        }
    }

    #[test]
    fn test_normalization_is_deterministic() {
        for input in ["x", "0x", "hello world", "SGVsbG8", "0xAB", "ÿ unicode ✓"] {
            assert_eq!(normalize(input), normalize(input));
            assert_eq!(normalize(input).to_hex().len(), SECRET_HEX_LEN);
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let secret = normalize("0xAB");
        let debug = format!("{:?}", secret);
        assert!(debug.contains("ab0000000000"));
        assert!(!debug.contains(&secret.to_hex()));
    }
}
