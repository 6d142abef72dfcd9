// src/config.rs
//! Runtime settings.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `academic-id.toml` in the working directory (optional)
//! 3. process environment, after `.env` has been loaded by `main`
//!
//! Environment keys are the setting names in upper case (`PORT`,
//! `KEY_DATA_DIR`, `KMS_SECRET_KEY`, ...).

use crate::storage::meta_store::META_FILE_NAME;
use crate::wallet::secret::{normalize, strip_wrapping, NormalizedSecret};
use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base name of the optional settings file.
pub const SETTINGS_FILE: &str = "academic-id";

pub const VERIFIED_USERS_FILE: &str = "verifiedUsers.json";
pub const DATABASE_FILE: &str = "database.json";
pub const PRIVATE_JWK_FILE: &str = "private.jwk.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("KMS_SECRET_KEY is not set. Provide the agent's KMS secret (hex, base64url or passphrase).")]
    MissingSecret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub key_data_dir: PathBuf,
    pub data_dir: PathBuf,
    pub agent_store_path: PathBuf,
    pub kms_secret_key: Option<String>,
    pub backend_url: String,
    pub log_level: String,
}

impl Settings {
    /// Loads defaults, the optional settings file, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::default())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Loads defaults overlaid with one settings file; ignores the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from(path).required(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 5000i64)?
            .set_default("key_data_dir", "key-data")?
            .set_default("data_dir", "data")?
            .set_default("agent_store_path", "agent-store")?
            .set_default("backend_url", "http://127.0.0.1:5000")?
            .set_default("log_level", "info")?)
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The KMS secret, normalized.
    ///
    /// # Errors
    /// `ConfigError::MissingSecret` when the key is unset or blank (after
    /// stripping quotes). Any other value is accepted.
    pub fn kms_secret(&self) -> Result<NormalizedSecret, ConfigError> {
        let raw = self
            .kms_secret_key
            .as_deref()
            .filter(|raw| !strip_wrapping(raw).is_empty())
            .ok_or(ConfigError::MissingSecret)?;
        let secret = normalize(raw);
        log::debug!("KMS secret loaded ({}...)", secret.fingerprint());
        Ok(secret)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.key_data_dir.join(META_FILE_NAME)
    }

    pub fn verified_users_path(&self) -> PathBuf {
        self.key_data_dir.join(VERIFIED_USERS_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn private_jwk_path(&self) -> PathBuf {
        self.key_data_dir.join(PRIVATE_JWK_FILE)
    }

    /// Settings rooted in `dir`, with the given KMS secret; for tests.
    #[cfg(test)]
    pub fn for_dir(dir: &Path, kms_secret_key: Option<&str>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            key_data_dir: dir.join("key-data"),
            data_dir: dir.join("data"),
            agent_store_path: dir.join("agent-store"),
            kms_secret_key: kms_secret_key.map(str::to_string),
            backend_url: "http://127.0.0.1:5000".into(),
            log_level: "debug".into(),
        }
    }
}
