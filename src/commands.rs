// src/commands.rs
//! Subcommand implementations.
//!
//! Each command returns what it produced so it can be exercised without
//! parsing stdout; printing is limited to the human-facing summary.

use crate::cli::{
    CheckArgs, CreateIdentifierArgs, DemoArgs, ImportKeyArgs, IssueArgs, RegisterArgs, ServeArgs,
    VerifyCredentialArgs,
};
use crate::config::Settings;
use crate::identity::agent::{describe, verify_with_fallback, IdentityAgent, ProbeOutcome};
use crate::identity::did_key;
use crate::identity::local_agent::LocalAgent;
use crate::models::credential::{ProofFormat, VerifiableCredential};
use crate::models::did::{DidDocument, ManagedIdentifier};
use crate::models::user::UserRecord;
use crate::services::api_server::ApiServer;
use crate::services::client::{VerifyClient, VerifyResponse};
use crate::services::credential_issuer::CredentialIssuer;
use crate::storage::json_store::JsonFile;
use crate::storage::meta_store::{collect_meta_paths, find_meta_path, read_meta_file, read_selected_user, MetaStore};
use crate::utils::crypto::{b64url_decode, b64url_encode};
use crate::utils::now_rfc3339;
use crate::utils::serialization::to_pretty_json;
use crate::wallet::credential_storage::{
    load_credential, CredentialStorage, CREDENTIAL_FILE, GENERATED_CREDENTIAL_FILE,
};
use crate::wallet::key_derivation::secret_for;
use crate::wallet::key_management::KeyManager;
use crate::wallet::secret::NormalizedSecret;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Context recorded for students registered from the command line.
pub const REGISTERED_CONTEXT: &str = "UPES Academic Identity";

fn open_agent(settings: &Settings, secret: &NormalizedSecret) -> Result<Arc<dyn IdentityAgent>> {
    let agent = LocalAgent::open(&settings.agent_store_path, secret)
        .with_context(|| format!("failed to open agent store at {}", settings.agent_store_path.display()))?;
    Ok(Arc::new(agent))
}

fn kms_agent(settings: &Settings) -> Result<Arc<dyn IdentityAgent>> {
    let secret = settings.kms_secret()?;
    open_agent(settings, &secret)
}

fn issuer_for(settings: &Settings, agent: Arc<dyn IdentityAgent>) -> CredentialIssuer {
    CredentialIssuer::new(agent, settings.verified_users_path(), settings.database_path())
}

pub async fn serve(settings: &Settings, args: ServeArgs) -> Result<()> {
    let agent = kms_agent(settings)?;
    let addr = args.bind.unwrap_or_else(|| settings.bind_addr());
    ApiServer::new(settings, agent)
        .run(&addr)
        .await
        .with_context(|| format!("server on {} failed", addr))
}

/// Registers a student under a new random secp256k1 secret and writes the
/// matching private JWK.
pub async fn register(settings: &Settings, args: RegisterArgs) -> Result<UserRecord> {
    let key = KeyManager::generate_key();
    let secret = key.to_bytes();

    let mut user = UserRecord::new(args.name.trim(), args.sap.trim(), args.email.trim());
    user.org = Some(crate::models::user::DEFAULT_ORG.to_string());
    user.context = Some(REGISTERED_CONTEXT.to_string());
    user.created_at = Some(now_rfc3339());
    user.secret_key_hex = Some(hex::encode(secret.as_slice()));
    user.secret_key_base64 = Some(b64url_encode(secret.as_slice()));

    MetaStore::new(settings.meta_path()).append(&user).await?;

    let mut jwk = did_key::public_key_jwk(&KeyManager::public_key_bytes(&key))?;
    jwk["d"] = Value::String(b64url_encode(secret.as_slice()));
    JsonFile::new(settings.private_jwk_path()).write(&jwk).await?;

    println!("Registered {} (SAP {})", user.name, user.sap);
    println!("  meta:  {}", settings.meta_path().display());
    println!("  jwk:   {}", settings.private_jwk_path().display());
    Ok(user)
}

/// One row of the `keys` listing.
#[derive(Debug)]
pub struct KeyListing {
    pub user: UserRecord,
    pub secret: NormalizedSecret,
    pub derived: bool,
}

pub async fn keys(settings: &Settings) -> Result<Vec<KeyListing>> {
    let users = MetaStore::new(settings.meta_path()).list_all().await?;
    if users.is_empty() {
        println!("No users in {}", settings.meta_path().display());
    }

    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let secret = secret_for(&user)?;
        let derived = user.stored_secret().is_none();
        println!(
            "{} (SAP {}): secretKeyHex={} secretKeyBase64={} [{}]",
            user.display_name(),
            if user.sap.is_empty() { "-" } else { user.sap.as_str() },
            secret,
            user.secret_key_base64.as_deref().unwrap_or("-"),
            if derived { "derived" } else { "stored" }
        );
        out.push(KeyListing { user, secret, derived });
    }
    Ok(out)
}

/// Creates (or returns) the identifier aliased by a student's SAP id, with
/// the agent running under that student's secret.
pub async fn create_identifier(settings: &Settings, args: CreateIdentifierArgs) -> Result<ManagedIdentifier> {
    let meta = MetaStore::new(settings.meta_path());
    let user = match &args.sap {
        Some(sap) => meta
            .find_by_sap(sap)
            .await?
            .ok_or_else(|| anyhow!("no registered user with SAP {}", sap))?,
        None => meta
            .newest()
            .await?
            .ok_or_else(|| anyhow!("no users in {}; run `register` first", meta.path().display()))?,
    };

    let secret = secret_for(&user)?;
    let agent = open_agent(settings, &secret)?;
    let alias = if user.sap.is_empty() { user.subject_handle() } else { user.sap.as_str() };
    let identifier = agent
        .get_or_create_identifier(alias)
        .await
        .map_err(|e| anyhow!(describe(&e)))?;

    println!("{}", to_pretty_json(&identifier)?);
    Ok(identifier)
}

pub async fn list_identifiers(settings: &Settings) -> Result<Vec<ManagedIdentifier>> {
    let identifiers = kms_agent(settings)?.find_identifiers().await?;
    println!("{}", to_pretty_json(&identifiers)?);
    Ok(identifiers)
}

/// Issues a `StudentCredential` for the user in the (discovered) meta file
/// and writes it to `credential.json`.
pub async fn issue(settings: &Settings, args: IssueArgs) -> Result<PathBuf> {
    let meta_path = match args.meta {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            find_meta_path(&cwd, &settings.key_data_dir)
                .await
                .ok_or_else(|| anyhow!("no meta file found in . or {}", settings.key_data_dir.display()))?
        }
    };
    log::info!("issuing from {}", meta_path.display());
    let user = read_selected_user(&meta_path)
        .await?
        .ok_or_else(|| anyhow!("{} holds no recognizable user", meta_path.display()))?;

    let issuer = issuer_for(settings, kms_agent(settings)?);
    let credential = issuer.issue_student_credential(&user, args.format).await?;
    let storage = CredentialStorage::new(&settings.key_data_dir);
    if storage.contains_credential(CREDENTIAL_FILE).await {
        log::info!("replacing {}", storage.path_of(CREDENTIAL_FILE).display());
    }
    let path = storage.store_credential(CREDENTIAL_FILE, &credential).await?;

    println!("Issued {} credential for {} -> {}", args.format, user.display_name(), path.display());
    Ok(path)
}

/// Verifies a stored credential.
///
/// # Returns
/// The probe outcome; the caller turns `verified: false` into a failing exit.
pub async fn verify_credential(settings: &Settings, args: VerifyCredentialArgs) -> Result<ProbeOutcome> {
    let credential = match &args.file {
        Some(path) => load_credential(path).await?,
        None => {
            CredentialStorage::new(&settings.key_data_dir)
                .get_credential(CREDENTIAL_FILE)
                .await?
        }
    };
    let credential = credential.ok_or_else(|| {
        let path = args
            .file
            .clone()
            .unwrap_or_else(|| settings.key_data_dir.join(CREDENTIAL_FILE));
        anyhow!("credential file {} not found", path.display())
    })?;

    let agent = kms_agent(settings)?;
    let outcome = verify_with_fallback(agent.as_ref(), &credential, args.format).await;
    print_outcome(&outcome)?;
    Ok(outcome)
}

fn print_outcome(outcome: &ProbeOutcome) -> Result<()> {
    let tried: Vec<&str> = outcome.tried_formats.iter().map(|f| f.as_str()).collect();
    println!("Tried formats: {}", tried.join(", "));
    println!("Verified: {}", outcome.verified);
    println!("{}", to_pretty_json(&outcome.result)?);
    Ok(())
}

/// What the demo produced.
#[derive(Debug)]
pub struct DemoReport {
    pub user: UserRecord,
    pub credential_path: PathBuf,
    pub credential: VerifiableCredential,
    pub outcome: ProbeOutcome,
    pub issuer_document: DidDocument,
}

/// Runs issue → verify → resolve for one user under that user's secret.
///
/// The agent uses a throwaway store: the session secret differs per user,
/// and keys sealed under it would be unusable by the configured agent.
pub async fn demo(settings: &Settings, args: DemoArgs) -> Result<DemoReport> {
    let mut users = Vec::new();
    for path in collect_meta_paths(&settings.key_data_dir).await {
        users.extend(read_meta_file(&path).await);
    }
    if users.is_empty() {
        bail!("no users found in meta files under {}", settings.key_data_dir.display());
    }
    for (i, user) in users.iter().enumerate() {
        println!("  [{}] {} ({})", i + 1, user.display_name(), user.subject_handle());
    }
    let user = args
        .user
        .checked_sub(1)
        .and_then(|i| users.get(i))
        .cloned()
        .ok_or_else(|| anyhow!("--user must be between 1 and {}", users.len()))?;

    let secret = secret_for(&user)?;
    log::info!("demo session secret {}... for {}", secret.fingerprint(), user.display_name());
    let agent: Arc<dyn IdentityAgent> = Arc::new(LocalAgent::temporary(&secret)?);

    let credential = issuer_for(settings, agent.clone())
        .issue_student_credential(&user, ProofFormat::Jwt)
        .await?;
    let credential_path = CredentialStorage::new(&settings.key_data_dir)
        .store_credential(GENERATED_CREDENTIAL_FILE, &credential)
        .await?;
    println!("Credential written to {}", credential_path.display());

    let outcome = verify_with_fallback(agent.as_ref(), &credential, None).await;
    print_outcome(&outcome)?;

    let issuer = agent.create_or_get_issuer_identity().await?;
    let issuer_document = agent.resolve_did(&issuer.did).await?;
    println!("{}", to_pretty_json(&issuer_document)?);

    Ok(DemoReport {
        user,
        credential_path,
        credential,
        outcome,
        issuer_document,
    })
}

pub async fn check(settings: &Settings, args: CheckArgs) -> Result<VerifyResponse> {
    let base_url = args.backend_url.unwrap_or_else(|| settings.backend_url.clone());
    let response = VerifyClient::new(base_url)
        .with_retry_delay(Duration::from_millis(args.retry_delay_ms))
        .check(&args.sap)
        .await?;
    println!("{}", response.render());
    Ok(response)
}

/// Reads the private scalar out of a secp256k1 JWK, checking `x`/`y` when
/// present.
pub fn private_key_from_jwk(jwk: &Value) -> Result<Vec<u8>> {
    let field = |name: &str| jwk.get(name).and_then(Value::as_str);
    if field("kty") != Some("EC") || field("crv") != Some("secp256k1") {
        bail!("JWK must have kty \"EC\" and crv \"secp256k1\"");
    }
    let d = field("d").ok_or_else(|| anyhow!("JWK has no private component \"d\""))?;
    let secret = b64url_decode(d).map_err(|e| anyhow!("JWK \"d\" is not base64url: {}", e))?;
    if secret.len() != 32 {
        bail!("JWK \"d\" must be 32 bytes, found {}", secret.len());
    }

    let key = KeyManager::import_key(&secret)?;
    let expected = did_key::public_key_jwk(&KeyManager::public_key_bytes(&key))?;
    for coordinate in ["x", "y"] {
        if let Some(given) = field(coordinate) {
            if Some(given) != expected[coordinate].as_str() {
                bail!("JWK \"{}\" does not match its private key", coordinate);
            }
        }
    }
    Ok(secret)
}

pub async fn import_key(settings: &Settings, args: ImportKeyArgs) -> Result<ManagedIdentifier> {
    let jwk = JsonFile::new(&args.jwk)
        .read_value()
        .await?
        .ok_or_else(|| anyhow!("{} not found", args.jwk.display()))?;
    let secret = private_key_from_jwk(&jwk)?;

    let identifier = kms_agent(settings)?
        .import_identifier(&args.alias, &secret)
        .await
        .map_err(|e| anyhow!(describe(&e)))?;
    println!("{}", to_pretty_json(&identifier)?);
    Ok(identifier)
}
