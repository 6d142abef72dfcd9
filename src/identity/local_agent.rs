// src/identity/local_agent.rs
//! Self-contained identity agent.
//!
//! Identifiers are `did:key` DIDs over secp256k1. Private keys are sealed
//! with the KMS secret box and kept in the embedded [`AgentStore`]; opening
//! a store with a different KMS secret lists identifiers fine but fails to
//! sign.

use crate::identity::agent::IdentityAgent;
use crate::identity::{did_key, jwt_proof, ld_proof, AgentError, AgentResult};
use crate::models::credential::{CredentialPayload, ProofFormat, VerifiableCredential, VerificationResult};
use crate::models::did::{DidDocument, ManagedIdentifier, ManagedKey};
use crate::storage::agent_store::AgentStore;
use crate::utils::now_rfc3339;
use crate::wallet::key_management::KeyManager;
use crate::wallet::secret::NormalizedSecret;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use k256::ecdsa::SigningKey;
use std::path::Path;

pub const DID_KEY_PROVIDER: &str = "did:key";
pub const LOCAL_KMS: &str = "local";
const KEY_TYPE: &str = "Secp256k1";

pub struct LocalAgent {
    store: AgentStore,
    keys: KeyManager,
}

impl LocalAgent {
    pub fn new(store: AgentStore, secret: &NormalizedSecret) -> AgentResult<Self> {
        Ok(Self {
            store,
            keys: KeyManager::new(secret)?,
        })
    }

    /// Opens (or creates) the agent store at `path`.
    pub fn open(path: &Path, secret: &NormalizedSecret) -> AgentResult<Self> {
        log::debug!(
            "opening agent store at {} (kms secret {})",
            path.display(),
            secret.fingerprint()
        );
        Self::new(AgentStore::open(path)?, secret)
    }

    /// Agent over a throwaway in-memory store.
    pub fn temporary(secret: &NormalizedSecret) -> AgentResult<Self> {
        Self::new(AgentStore::open_temporary()?, secret)
    }

    fn persist(&self, alias: &str, key: &SigningKey) -> AgentResult<ManagedIdentifier> {
        if self.store.get_by_alias(alias)?.is_some() {
            return Err(AgentError::AliasTaken(alias.to_string()));
        }

        let public_key = KeyManager::public_key_bytes(key);
        let kid = hex::encode(&public_key);
        let identifier = ManagedIdentifier {
            did: did_key::did_from_public_key(&public_key),
            alias: alias.to_string(),
            provider: DID_KEY_PROVIDER.to_string(),
            controller_key_id: kid.clone(),
            keys: vec![ManagedKey {
                kid: kid.clone(),
                kind: KEY_TYPE.to_string(),
                public_key_hex: kid,
                kms: LOCAL_KMS.to_string(),
            }],
            created_at: now_rfc3339(),
        };

        let sealed = self.keys.seal_private_key(key)?;
        if !self.store.put_identifier(&identifier, &sealed)? {
            return Err(AgentError::AliasTaken(alias.to_string()));
        }
        log::info!("created identifier {} (alias '{}')", identifier.did, alias);
        Ok(identifier)
    }

    /// Opens the private key controlling `did`.
    fn signing_key(&self, did: &str) -> AgentResult<SigningKey> {
        let identifier = self
            .store
            .get_identifier(did)?
            .ok_or_else(|| AgentError::NotFound(format!("issuer {} is not managed by this agent", did)))?;
        let sealed = self
            .store
            .sealed_key(&identifier.controller_key_id)?
            .ok_or_else(|| AgentError::NotFound(format!("key {}", identifier.controller_key_id)))?;
        Ok(self.keys.open_private_key(&sealed)?)
    }
}

#[async_trait]
impl IdentityAgent for LocalAgent {
    async fn create_identifier(&self, alias: &str) -> AgentResult<ManagedIdentifier> {
        self.persist(alias, &KeyManager::generate_key())
    }

    async fn import_identifier(&self, alias: &str, private_key: &[u8]) -> AgentResult<ManagedIdentifier> {
        let key = KeyManager::import_key(private_key)?;
        let did = did_key::did_from_public_key(&KeyManager::public_key_bytes(&key));
        if let Some(existing) = self.store.get_identifier(&did)? {
            log::info!("key already managed as {} (alias '{}')", existing.did, existing.alias);
            return Ok(existing);
        }
        self.persist(alias, &key)
    }

    async fn get_identifier_by_alias(&self, alias: &str) -> AgentResult<Option<ManagedIdentifier>> {
        Ok(self.store.get_by_alias(alias)?)
    }

    async fn find_identifiers(&self) -> AgentResult<Vec<ManagedIdentifier>> {
        Ok(self.store.list_identifiers()?)
    }

    async fn sign_credential(
        &self,
        payload: &CredentialPayload,
        format: ProofFormat,
    ) -> AgentResult<VerifiableCredential> {
        let issuer = payload.issuer.did();
        let key = self.signing_key(issuer)?;
        let verification_method = did_key::verification_method_id(issuer)?;

        match format {
            ProofFormat::Jwt => jwt_proof::sign(payload, &verification_method, &key),
            ProofFormat::Lds => {
                let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                ld_proof::sign(serde_json::to_value(payload)?, &verification_method, &key, &created)
            }
        }
    }

    async fn verify_credential(
        &self,
        credential: &VerifiableCredential,
        format: ProofFormat,
    ) -> AgentResult<VerificationResult> {
        match format {
            ProofFormat::Jwt => jwt_proof::verify_credential(credential),
            ProofFormat::Lds => ld_proof::verify(credential),
        }
    }

    async fn resolve_did(&self, did: &str) -> AgentResult<DidDocument> {
        did_key::resolve(did)
    }
}
