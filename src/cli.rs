// src/cli.rs
//! # CLI Interface
//!
//! Defines the command-line structure for `academic-id` using `clap`
//! derive: the HTTP backend plus the operator tools for registering
//! students, managing identifiers, and issuing and checking credentials.

use crate::models::credential::ProofFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Academic credential issuance and verification.
///
/// Settings come from `academic-id.toml` and the environment (`.env` is
/// loaded first). `KMS_SECRET_KEY` seeds the agent's key store.
#[derive(Parser, Debug)]
#[command(name = "academic-id", about = "Academic credential issuance and verification", version)]
pub struct Cli {
    /// Settings file to use instead of `academic-id.toml` and the environment.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP backend.
    Serve(ServeArgs),
    /// Register a student with a freshly generated secp256k1 secret.
    Register(RegisterArgs),
    /// List registered students with their effective KMS secrets.
    Keys,
    /// Create a did:key identifier for a registered student.
    CreateIdentifier(CreateIdentifierArgs),
    /// Print the agent's identifiers as JSON.
    ListIdentifiers,
    /// Issue a StudentCredential for a meta-file user.
    Issue(IssueArgs),
    /// Verify a stored credential, probing both proof formats.
    VerifyCredential(VerifyCredentialArgs),
    /// Issue, verify and resolve in one go, under a user's derived secret.
    Demo(DemoArgs),
    /// Ask a running backend to verify a SAP id.
    Check(CheckArgs),
    /// Import a secp256k1 private JWK as a new identifier.
    ImportKey(ImportKeyArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address; overrides the configured host and port.
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    pub name: String,
    pub sap: String,
    pub email: String,
}

#[derive(Parser, Debug)]
pub struct CreateIdentifierArgs {
    /// SAP id of the student; defaults to the newest registration.
    #[arg(long)]
    pub sap: Option<String>,
}

#[derive(Parser, Debug)]
pub struct IssueArgs {
    /// Meta file holding the user; discovered when omitted.
    #[arg(long)]
    pub meta: Option<PathBuf>,

    /// Proof format of the issued credential.
    #[arg(long, default_value = "lds")]
    pub format: ProofFormat,
}

#[derive(Parser, Debug)]
pub struct VerifyCredentialArgs {
    /// Credential file; defaults to `<key-data>/credential.json`.
    pub file: Option<PathBuf>,

    /// Format to try first instead of the detected one.
    #[arg(long)]
    pub format: Option<ProofFormat>,
}

#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// 1-based index into the users found across all meta files.
    #[arg(long, default_value_t = 1)]
    pub user: usize,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    pub sap: String,

    /// Backend base URL; overrides the configured one.
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Pause before the single retry of a failed request.
    #[arg(long, default_value_t = 2000)]
    pub retry_delay_ms: u64,
}

#[derive(Parser, Debug)]
pub struct ImportKeyArgs {
    /// JWK file with `kty: EC`, `crv: secp256k1` and a private `d`.
    pub jwk: PathBuf,

    /// Alias of the new identifier.
    #[arg(long, default_value = "imported")]
    pub alias: String,
}
