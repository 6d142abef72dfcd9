// src/storage/agent_store.rs
//! Embedded store backing the local identity agent.
//!
//! Built on sled. Each tree is an independent keyspace:
//!
//! | Tree           | Key                   | Value                       |
//! |----------------|-----------------------|-----------------------------|
//! | `identifiers`  | DID (UTF-8)           | JSON `ManagedIdentifier`    |
//! | `aliases`      | alias (UTF-8)         | DID (UTF-8)                 |
//! | `private_keys` | key id (UTF-8)        | secret-box sealed key bytes |
//! | `creation`     | sequence (8B BE)      | DID (UTF-8)                 |
//!
//! The `creation` tree keys are big-endian so that iteration yields
//! identifiers in the order they were created.

use crate::models::did::ManagedIdentifier;
use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentStoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type AgentStoreResult<T> = Result<T, AgentStoreError>;

/// Keys, identifiers and aliases held by the agent.
///
/// sled is thread-safe; clones share the same database.
#[derive(Debug, Clone)]
pub struct AgentStore {
    db: Db,
    identifiers: Tree,
    aliases: Tree,
    private_keys: Tree,
    creation: Tree,
}

impl AgentStore {
    /// Opens the store at `path`, creating an empty one if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> AgentStoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop; used by tests and the demo command.
    pub fn open_temporary() -> AgentStoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> AgentStoreResult<Self> {
        Ok(Self {
            identifiers: db.open_tree("identifiers")?,
            aliases: db.open_tree("aliases")?,
            private_keys: db.open_tree("private_keys")?,
            creation: db.open_tree("creation")?,
            db,
        })
    }

    /// Persists a new identifier together with its sealed controller key.
    ///
    /// The alias is claimed with a compare-and-swap, so of several writers
    /// racing on one alias exactly one wins.
    ///
    /// # Returns
    /// `false` if the alias already belongs to another DID; nothing of the
    /// new identifier is left listed in that case.
    pub fn put_identifier(
        &self,
        identifier: &ManagedIdentifier,
        sealed_key: &[u8],
    ) -> AgentStoreResult<bool> {
        let body = serde_json::to_vec(identifier)
            .map_err(|e| AgentStoreError::Serialization(e.to_string()))?;

        // Key and document go in first so a claimed alias always resolves.
        self.private_keys
            .insert(identifier.controller_key_id.as_bytes(), sealed_key)?;
        self.identifiers.insert(identifier.did.as_bytes(), body)?;

        let claim = self.aliases.compare_and_swap(
            identifier.alias.as_bytes(),
            None as Option<&[u8]>,
            Some(identifier.did.as_bytes()),
        )?;
        if let Err(taken) = claim {
            let owner = taken.current.as_deref();
            if owner != Some(identifier.did.as_bytes()) {
                self.identifiers.remove(identifier.did.as_bytes())?;
                self.private_keys
                    .remove(identifier.controller_key_id.as_bytes())?;
            }
            return Ok(false);
        }

        let seq = self.db.generate_id()?;
        self.creation
            .insert(seq.to_be_bytes(), identifier.did.as_bytes())?;

        self.db.flush()?;
        Ok(true)
    }

    pub fn get_identifier(&self, did: &str) -> AgentStoreResult<Option<ManagedIdentifier>> {
        match self.identifiers.get(did.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AgentStoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn get_by_alias(&self, alias: &str) -> AgentStoreResult<Option<ManagedIdentifier>> {
        match self.aliases.get(alias.as_bytes())? {
            Some(did) => self.get_identifier(&String::from_utf8_lossy(&did)),
            None => Ok(None),
        }
    }

    /// All identifiers, oldest first.
    pub fn list_identifiers(&self) -> AgentStoreResult<Vec<ManagedIdentifier>> {
        let mut out = Vec::new();
        for entry in self.creation.iter() {
            let (_, did) = entry?;
            if let Some(identifier) = self.get_identifier(&String::from_utf8_lossy(&did))? {
                out.push(identifier);
            }
        }
        Ok(out)
    }

    pub fn sealed_key(&self, kid: &str) -> AgentStoreResult<Option<Vec<u8>>> {
        Ok(self.private_keys.get(kid.as_bytes())?.map(|v| v.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::did::ManagedKey;

    fn identifier(did: &str, alias: &str) -> ManagedIdentifier {
        ManagedIdentifier {
            did: did.into(),
            alias: alias.into(),
            provider: "did:key".into(),
            controller_key_id: format!("kid-{}", alias),
            keys: vec![ManagedKey {
                kid: format!("kid-{}", alias),
                kind: "Secp256k1".into(),
                public_key_hex: "02ab".into(),
                kms: "local".into(),
            }],
            created_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn test_identifiers_list_in_creation_order() {
        let store = AgentStore::open_temporary().unwrap();
        // DIDs chosen so lexical order differs from creation order.
        store.put_identifier(&identifier("did:key:zB", "second-lexically"), b"k1").unwrap();
        store.put_identifier(&identifier("did:key:zA", "first-lexically"), b"k2").unwrap();

        let dids: Vec<String> = store
            .list_identifiers()
            .unwrap()
            .into_iter()
            .map(|i| i.did)
            .collect();
        assert_eq!(dids, vec!["did:key:zB", "did:key:zA"]);
    }

    #[test]
    fn test_alias_and_key_lookup() {
        let store = AgentStore::open_temporary().unwrap();
        store.put_identifier(&identifier("did:key:z1", "500012"), b"sealed").unwrap();

        let found = store.get_by_alias("500012").unwrap().unwrap();
        assert_eq!(found.did, "did:key:z1");
        assert_eq!(store.sealed_key("kid-500012").unwrap().unwrap(), b"sealed");
        assert!(store.get_by_alias("missing").unwrap().is_none());
        assert!(store.get_identifier("did:key:nope").unwrap().is_none());
    }

    #[test]
    fn test_alias_is_claimed_once() {
        let store = AgentStore::open_temporary().unwrap();
        assert!(store.put_identifier(&identifier("did:key:z1", "500012"), b"k1").unwrap());

        let mut rival = identifier("did:key:z2", "500012");
        rival.controller_key_id = "kid-rival".into();
        assert!(!store.put_identifier(&rival, b"k2").unwrap());

        assert_eq!(store.get_by_alias("500012").unwrap().unwrap().did, "did:key:z1");
        assert_eq!(store.list_identifiers().unwrap().len(), 1);
        assert!(store.get_identifier("did:key:z2").unwrap().is_none());
        assert!(store.sealed_key("kid-rival").unwrap().is_none());
        assert!(store.sealed_key("kid-500012").unwrap().is_some());
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = AgentStore::open(dir.path().join("agent")).unwrap();
            store.put_identifier(&identifier("did:key:z1", "default"), b"k").unwrap();
        }
        let store = AgentStore::open(dir.path().join("agent")).unwrap();
        assert_eq!(store.list_identifiers().unwrap().len(), 1);
    }
}
