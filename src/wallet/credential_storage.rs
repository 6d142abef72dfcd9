// src/wallet/credential_storage.rs
//! Credential storage for the key-data directory.
//!
//! Signed credentials are stored one per file as pretty-printed JSON, exactly
//! as the identity agent returned them, so they can be handed to a verifier
//! unchanged.

use crate::models::credential::VerifiableCredential;
use crate::storage::json_store::JsonFile;
use crate::storage::StoreResult;
use std::path::{Path, PathBuf};

/// Output of the `issue` command.
pub const CREDENTIAL_FILE: &str = "credential.json";

/// Output of the `demo` command.
pub const GENERATED_CREDENTIAL_FILE: &str = "credential.generated.json";

/// File-backed storage for Verifiable Credentials.
///
/// # Note
/// Files are named by the caller; storing under an existing name replaces
/// the earlier credential.
pub struct CredentialStorage {
    dir: PathBuf,
}

impl CredentialStorage {
    /// Creates storage rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes a credential to `<dir>/<name>` through a temp file and rename.
    ///
    /// # Returns
    /// The path written.
    pub async fn store_credential(
        &self,
        name: &str,
        credential: &VerifiableCredential,
    ) -> StoreResult<PathBuf> {
        let path = self.path_of(name);
        JsonFile::new(&path).write(credential).await?;
        Ok(path)
    }

    /// Reads `<dir>/<name>`.
    ///
    /// # Returns
    /// - `Some(credential)` if the file exists and parses as JSON
    /// - `None` if the file does not exist
    pub async fn get_credential(&self, name: &str) -> StoreResult<Option<VerifiableCredential>> {
        load_credential(&self.path_of(name)).await
    }

    pub async fn contains_credential(&self, name: &str) -> bool {
        tokio::fs::metadata(self.path_of(name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

/// Loads a credential from any path.
pub async fn load_credential(path: &Path) -> StoreResult<Option<VerifiableCredential>> {
    Ok(JsonFile::new(path).read_value().await?.map(VerifiableCredential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use serde_json::json;
    use tempfile::tempdir;

    fn credential(name: &str) -> VerifiableCredential {
        VerifiableCredential(json!({
            "credentialSubject": { "name": name },
            "proof": { "type": "JwtProof2020", "jwt": "a.b.c" }
        }))
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let dir = tempdir().unwrap();
        let storage = CredentialStorage::new(dir.path().join("key-data"));

        assert!(!storage.contains_credential(CREDENTIAL_FILE).await);
        let path = storage.store_credential(CREDENTIAL_FILE, &credential("Alice")).await.unwrap();
        assert_eq!(path, dir.path().join("key-data").join(CREDENTIAL_FILE));
        assert!(storage.contains_credential(CREDENTIAL_FILE).await);

        let loaded = storage.get_credential(CREDENTIAL_FILE).await.unwrap().unwrap();
        assert_eq!(loaded, credential("Alice"));
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let dir = tempdir().unwrap();
        let storage = CredentialStorage::new(dir.path());
        storage.store_credential(GENERATED_CREDENTIAL_FILE, &credential("Old")).await.unwrap();
        storage.store_credential(GENERATED_CREDENTIAL_FILE, &credential("New")).await.unwrap();

        let loaded = storage.get_credential(GENERATED_CREDENTIAL_FILE).await.unwrap().unwrap();
        assert_eq!(loaded.as_value()["credentialSubject"]["name"], "New");
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load_credential(&path).await, Err(StoreError::Json { .. })));
    }
}
