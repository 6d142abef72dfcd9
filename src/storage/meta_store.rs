// src/storage/meta_store.rs
//! The meta file: registered user records.
//!
//! Records are appended by the registration tool and never updated or
//! deleted. Lookups scan linearly and return the first match, so duplicate
//! SAP ids resolve to the earliest registration.

use crate::models::user::{user_from_value, MetaDocument, UserRecord};
use crate::storage::json_store::JsonFile;
use crate::storage::{StoreError, StoreResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File name of the primary meta document.
pub const META_FILE_NAME: &str = "meta.json";

/// Flat-file collection of [`UserRecord`]s.
pub struct MetaStore {
    file: JsonFile,
}

impl MetaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Appends a record, promoting a single-object document to an array.
    pub async fn append(&self, record: &UserRecord) -> StoreResult<()> {
        let value = serde_json::to_value(record).map_err(|source| StoreError::Json {
            path: self.path().to_path_buf(),
            source,
        })?;
        let _guard = self.file.lock().await;
        let mut items = self.file.read_array().await?;
        items.push(value);
        self.file.write(&items).await
    }

    /// All recognizable user records in insertion order.
    pub async fn list_all(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(records_from_value(self.raw().await?))
    }

    /// First record whose SAP id equals `sap`.
    pub async fn find_by_sap(&self, sap: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.list_all().await?.into_iter().find(|u| u.sap == sap))
    }

    /// Most recently appended record.
    pub async fn newest(&self) -> StoreResult<Option<UserRecord>> {
        Ok(self.list_all().await?.pop())
    }

    /// The document exactly as stored; missing or malformed files read as `[]`.
    pub async fn raw(&self) -> StoreResult<Value> {
        match self.file.read_value().await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(Value::Array(Vec::new())),
            Err(StoreError::Json { path, source }) => {
                log::warn!("treating malformed {} as empty: {}", path.display(), source);
                Ok(Value::Array(Vec::new()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Normalizes any accepted meta document shape into records.
pub fn records_from_value(value: Value) -> Vec<UserRecord> {
    match serde_json::from_value::<MetaDocument>(value) {
        Ok(doc) => doc.into_records(),
        Err(e) => {
            log::warn!("meta document matches no accepted shape: {}", e);
            Vec::new()
        }
    }
}

/// Reads every user out of one meta file; unreadable files yield nothing.
pub async fn read_meta_file(path: &Path) -> Vec<UserRecord> {
    match MetaStore::new(path).list_all().await {
        Ok(users) => users,
        Err(e) => {
            log::warn!("skipping meta file: {}", e);
            Vec::new()
        }
    }
}

/// `meta.json`, `meta-*.json` or `*-meta.json`, case-insensitively.
pub fn is_meta_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == META_FILE_NAME
        || lower.ends_with("-meta.json")
        || (lower.starts_with("meta-") && lower.ends_with(".json"))
}

/// Every meta file directly inside `key_data_dir`, sorted by name.
pub async fn collect_meta_paths(key_data_dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = meta_entries(key_data_dir)
        .await
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    found.sort();
    found
}

/// Locates the meta file the issuing tools should use.
///
/// Preference: `<working_dir>/meta.json`, then `<key_data_dir>/meta.json`,
/// then the most recently modified `meta-*.json` / `*-meta.json` in
/// `key_data_dir`.
pub async fn find_meta_path(working_dir: &Path, key_data_dir: &Path) -> Option<PathBuf> {
    for candidate in [working_dir.join(META_FILE_NAME), key_data_dir.join(META_FILE_NAME)] {
        if tokio::fs::metadata(&candidate).await.map(|m| m.is_file()).unwrap_or(false) {
            return Some(candidate);
        }
    }
    meta_entries(key_data_dir)
        .await
        .into_iter()
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

async fn meta_entries(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return out,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if !is_meta_file_name(&name.to_string_lossy()) {
            continue;
        }
        if let Ok(meta) = entry.metadata().await {
            if meta.is_file() {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                out.push((entry.path(), modified));
            }
        }
    }
    out
}

/// Parses a single user object (or `selectedUser` wrapper) from a file that
/// the LD issuing tool was pointed at.
pub async fn read_selected_user(path: &Path) -> StoreResult<Option<UserRecord>> {
    let value = JsonFile::new(path).read_value().await?;
    Ok(value.and_then(|v| match v {
        Value::Array(items) => items.iter().find_map(user_from_value),
        other => user_from_value(&other),
    }))
}
