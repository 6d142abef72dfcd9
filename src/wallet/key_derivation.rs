// src/wallet/key_derivation.rs
//! Deterministic KMS secret derivation from a user's identity fields.
//!
//! Users registered without a stored secret still need a stable secret box
//! key. It is re-derived on demand from `name|id|sap|org|context` with scrypt
//! and a fixed salt, so nothing has to be persisted. The salt is a known
//! constant: this scheme is for demos, not for protecting real keys.

use crate::models::user::UserRecord;
use crate::wallet::secret::{normalize, NormalizedSecret, SECRET_LEN};
use scrypt::{scrypt, Params};
use thiserror::Error;

/// Salt shared by every derivation.
pub const DERIVATION_SALT: &[u8] = b"fixed-salt-for-demo";

// N = 2^14, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("invalid scrypt parameters: {0}")]
    Params(String),
    #[error("scrypt output length rejected: {0}")]
    Output(String),
}

/// The exact string fed to scrypt for a user.
///
/// `id` falls back to `email`; `org` and `context` fall back to their
/// defaults. Empty strings count as missing.
pub fn derivation_input(record: &UserRecord) -> String {
    let id = record
        .id
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(&record.email);
    format!(
        "{}|{}|{}|{}|{}",
        record.name,
        id,
        record.sap,
        record.org_or_default(),
        record.context_or_default()
    )
}

/// Derives a 32-byte secret from the user's identity fields.
///
/// # Errors
/// Only if the hard-coded scrypt parameters are rejected by the library.
pub fn derive_secret(record: &UserRecord) -> Result<NormalizedSecret, DerivationError> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, SECRET_LEN)
        .map_err(|e| DerivationError::Params(e.to_string()))?;
    let mut out = [0u8; SECRET_LEN];
    scrypt(
        derivation_input(record).as_bytes(),
        DERIVATION_SALT,
        &params,
        &mut out,
    )
    .map_err(|e| DerivationError::Output(e.to_string()))?;
    Ok(NormalizedSecret::from_bytes(out))
}

/// The secret a user's agent session runs under: the stored secret
/// normalized when one exists, otherwise the derived one.
pub fn secret_for(record: &UserRecord) -> Result<NormalizedSecret, DerivationError> {
    match record.stored_secret() {
        Some(stored) => Ok(normalize(stored)),
        None => derive_secret(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> UserRecord {
        UserRecord::new("Asha", "500012", "asha@upes.ac.in")
    }

    #[test]
    fn test_derivation_input_defaults() {
        let input = derivation_input(&student());
        assert_eq!(
            input,
            format!(
                "Asha|asha@upes.ac.in|500012|UPES|{}",
                crate::models::user::DEFAULT_CONTEXT
            )
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_secret(&student()).unwrap();
        let b = derive_secret(&student()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_every_field_changes_the_secret() {
        let base = derive_secret(&student()).unwrap();

        let mutations: Vec<Box<dyn Fn(&mut UserRecord)>> = vec![
            Box::new(|u| u.name = "Asha K".into()),
            Box::new(|u| u.id = Some("ext-1".into())),
            Box::new(|u| u.sap = "500013".into()),
            Box::new(|u| u.org = Some("IIT".into())),
            Box::new(|u| u.context = Some("https://example.edu/ctx".into())),
        ];
        for mutate in mutations {
            let mut user = student();
            mutate(&mut user);
            assert_ne!(derive_secret(&user).unwrap(), base);
        }
    }

    #[test]
    fn test_stored_secret_wins_over_derivation() {
        let mut user = student();
        user.secret_key_hex = Some("0xAB".into());
        assert_eq!(secret_for(&user).unwrap(), normalize("ab"));

        let derived = secret_for(&student()).unwrap();
        assert_eq!(derived, derive_secret(&student()).unwrap());
    }
}
