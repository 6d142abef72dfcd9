// src/main.rs

//! # Academic Identity - Main Entry Point
//!
//! Parses the command line, loads settings and logging, then hands off to
//! the selected command. `serve` runs the HTTP backend; the rest are
//! operator tools over the same key data and agent store.
//!
//! ## Layers
//! 1. **Identity**: did:key identifiers and credential proofs (`identity`)
//! 2. **Services**: issuance, verification and the HTTP API (`services`)
//! 3. **Storage**: JSON data files and the embedded agent store (`storage`)
//! 4. **Wallet**: secret normalization, derivation and key sealing (`wallet`)

use crate::cli::{Cli, Commands};
use crate::config::Settings;
use anyhow::{bail, Result};
use clap::Parser;
use dotenv::dotenv;

mod cli;
mod commands;
mod config;
mod identity;
mod logging;
mod models;
mod services;
mod storage;
mod utils;
mod wallet;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    logging::init_logging(&settings.log_level);

    match cli.command {
        Commands::Serve(args) => commands::serve(&settings, args).await?,
        Commands::Register(args) => {
            commands::register(&settings, args).await?;
        }
        Commands::Keys => {
            commands::keys(&settings).await?;
        }
        Commands::CreateIdentifier(args) => {
            commands::create_identifier(&settings, args).await?;
        }
        Commands::ListIdentifiers => {
            commands::list_identifiers(&settings).await?;
        }
        Commands::Issue(args) => {
            commands::issue(&settings, args).await?;
        }
        Commands::VerifyCredential(args) => {
            if !commands::verify_credential(&settings, args).await?.verified {
                bail!("credential did not verify");
            }
        }
        Commands::Demo(args) => {
            if !commands::demo(&settings, args).await?.outcome.verified {
                bail!("demo credential did not verify");
            }
        }
        Commands::Check(args) => {
            if !commands::check(&settings, args).await?.success {
                bail!("backend did not verify the SAP id");
            }
        }
        Commands::ImportKey(args) => {
            commands::import_key(&settings, args).await?;
        }
    }
    Ok(())
}
