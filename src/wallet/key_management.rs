// src/wallet/key_management.rs
//! Cryptographic key management for the local identity agent.
//!
//! Provides:
//! - A secret box (AES-256-GCM) keyed by the normalized KMS secret, used to
//!   seal private keys before they touch disk
//! - secp256k1 key generation and import (via the `k256` crate)
//! - ES256K signing and verification (ECDSA over SHA-256, RFC 6979, low-S)

use crate::wallet::secret::NormalizedSecret;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secret box rejected the key material")]
    SecretBox,
    #[error("random number generator failure")]
    Rng,
    #[error("sealed key could not be opened (wrong KMS secret or corrupted data)")]
    Decrypt,
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("signature verification failed")]
    BadSignature,
}

/// Authenticated symmetric encryption keyed by a [`NormalizedSecret`].
///
/// Sealed output layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct SecretBox {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl SecretBox {
    pub fn new(secret: &NormalizedSecret) -> Result<Self, KeyError> {
        let unbound =
            UnboundKey::new(&AES_256_GCM, secret.as_bytes()).map_err(|_| KeyError::SecretBox)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| KeyError::Rng)?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| KeyError::SecretBox)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Decrypts data produced by [`SecretBox::seal`].
    ///
    /// # Errors
    /// `KeyError::Decrypt` if the data is truncated, tampered with, or was
    /// sealed under a different secret.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, KeyError> {
        if sealed.len() < NONCE_LEN {
            return Err(KeyError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| KeyError::Decrypt)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| KeyError::Decrypt)?;
        Ok(plaintext.to_vec())
    }
}

/// Key management for the agent: generation, sealing and signing.
///
/// Private keys only ever leave this type sealed by the secret box.
pub struct KeyManager {
    secret_box: SecretBox,
}

impl KeyManager {
    /// Creates a KeyManager whose secret box is seeded by `secret`.
    pub fn new(secret: &NormalizedSecret) -> Result<Self, KeyError> {
        Ok(Self {
            secret_box: SecretBox::new(secret)?,
        })
    }

    /// Generates a new secp256k1 signing key from the thread RNG.
    pub fn generate_key() -> SigningKey {
        SigningKey::random(&mut rand::thread_rng())
    }

    /// Builds a signing key from 32 raw scalar bytes.
    pub fn import_key(bytes: &[u8]) -> Result<SigningKey, KeyError> {
        SigningKey::from_slice(bytes).map_err(|e| KeyError::InvalidKey(e.to_string()))
    }

    pub fn seal_private_key(&self, key: &SigningKey) -> Result<Vec<u8>, KeyError> {
        self.secret_box.seal(key.to_bytes().as_slice())
    }

    pub fn open_private_key(&self, sealed: &[u8]) -> Result<SigningKey, KeyError> {
        let raw = self.secret_box.open(sealed)?;
        Self::import_key(&raw)
    }

    /// Compressed SEC1 encoding (33 bytes) of the key's public half.
    pub fn public_key_bytes(key: &SigningKey) -> Vec<u8> {
        key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
    }

    /// Signs `message` with ES256K.
    ///
    /// # Returns
    /// 64-byte compact signature (R || S).
    pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
        let signature: Signature = key.sign(message);
        signature.to_bytes().to_vec()
    }

    /// Verifies an ES256K signature against a SEC1-encoded public key.
    pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let signature = Signature::from_slice(signature).map_err(|_| KeyError::BadSignature)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| KeyError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::secret::normalize;

    #[test]
    fn test_seal_open_roundtrip() {
        let secret_box = SecretBox::new(&normalize("0x01")).unwrap();
        let sealed = secret_box.seal(b"private key bytes").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"private key bytes");
        assert_eq!(secret_box.open(&sealed).unwrap(), b"private key bytes");
    }

    #[test]
    fn test_open_with_other_secret_fails() {
        let sealed = SecretBox::new(&normalize("0x01")).unwrap().seal(b"data").unwrap();
        let other = SecretBox::new(&normalize("0x02")).unwrap();
        assert!(matches!(other.open(&sealed), Err(KeyError::Decrypt)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let secret_box = SecretBox::new(&normalize("0x01")).unwrap();
        let mut sealed = secret_box.seal(b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(secret_box.open(&sealed), Err(KeyError::Decrypt)));
        assert!(matches!(secret_box.open(&[1, 2, 3]), Err(KeyError::Decrypt)));
    }

    #[test]
    fn test_private_key_survives_sealing() {
        let manager = KeyManager::new(&normalize("0xabc")).unwrap();
        let key = KeyManager::generate_key();
        let sealed = manager.seal_private_key(&key).unwrap();
        let reopened = manager.open_private_key(&sealed).unwrap();
        assert_eq!(key.to_bytes(), reopened.to_bytes());
    }

    #[test]
    fn test_sign_and_verify() {
        let key = KeyManager::generate_key();
        let public = KeyManager::public_key_bytes(&key);
        assert_eq!(public.len(), 33);

        let signature = KeyManager::sign(&key, b"hello");
        assert_eq!(signature.len(), 64);
        assert!(KeyManager::verify(&public, b"hello", &signature).is_ok());
        assert!(KeyManager::verify(&public, b"hellO", &signature).is_err());

        let other = KeyManager::public_key_bytes(&KeyManager::generate_key());
        assert!(KeyManager::verify(&other, b"hello", &signature).is_err());
    }
}
