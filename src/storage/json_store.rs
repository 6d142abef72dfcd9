// src/storage/json_store.rs
//! Whole-file JSON documents.
//!
//! Every read loads the file from disk and every write replaces it in full.
//! Writes from this process to one file are serialized by a mutex and land
//! through a temp file plus rename, so readers never see a half-written
//! document. Separate processes writing the same file still race: last
//! writer wins.

use crate::storage::{StoreError, StoreResult};
use crate::utils::serialization::{deserialize, to_pretty_json};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

/// A single JSON document on disk.
pub struct JsonFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holds the writer lock for a read-modify-write cycle.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Reads and parses the document.
    ///
    /// # Returns
    /// - `Ok(None)` if the file does not exist
    /// - `Err(StoreError::Json)` if it exists but is not valid JSON
    pub async fn read_value(&self) -> StoreResult<Option<Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        deserialize(&raw).map(Some).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Reads the document as a JSON array.
    ///
    /// A missing or malformed file is an empty array; a lone object is
    /// promoted to a one-element array.
    pub async fn read_array(&self) -> StoreResult<Vec<Value>> {
        match self.read_value().await {
            Ok(Some(Value::Array(items))) => Ok(items),
            Ok(Some(Value::Null)) | Ok(None) => Ok(Vec::new()),
            Ok(Some(other)) => Ok(vec![other]),
            Err(StoreError::Json { path, source }) => {
                log::warn!("treating malformed {} as empty: {}", path.display(), source);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Replaces the document with `value`, creating parent directories.
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> StoreResult<()> {
        let body = to_pretty_json(value).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// An append-only JSON array of `T`.
///
/// Entries already in the file are kept verbatim on append, even ones that
/// do not parse as `T`.
pub struct JsonCollection<T> {
    file: JsonFile,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonCollection<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
            _marker: PhantomData,
        }
    }

    /// Entries that parse as `T`, in file order.
    pub async fn list(&self) -> StoreResult<Vec<T>> {
        Ok(self
            .file
            .read_array()
            .await?
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// The stored array as raw JSON.
    pub async fn raw(&self) -> StoreResult<Vec<Value>> {
        self.file.read_array().await
    }

    pub async fn append(&self, item: &T) -> StoreResult<()> {
        let value = serde_json::to_value(item).map_err(|source| StoreError::Json {
            path: self.file.path().to_path_buf(),
            source,
        })?;
        let _guard = self.file.lock().await;
        let mut items = self.file.read_array().await?;
        items.push(value);
        self.file.write(&items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::IssuanceEntry;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn entry(sap: &str) -> IssuanceEntry {
        IssuanceEntry {
            name: "A".into(),
            sap: sap.into(),
            email: "a@x.com".into(),
            issued_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store: JsonCollection<IssuanceEntry> = JsonCollection::new(dir.path().join("none.json"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_creates_parent_dirs_and_keeps_order() {
        let dir = tempdir().unwrap();
        let store = JsonCollection::new(dir.path().join("nested/log.json"));
        store.append(&entry("1")).await.unwrap();
        store.append(&entry("2")).await.unwrap();

        let saps: Vec<String> = store.list().await.unwrap().into_iter().map(|e: IssuanceEntry| e.sap).collect();
        assert_eq!(saps, vec!["1", "2"]);
        assert!(!dir.path().join("nested/log.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_malformed_file_is_replaced_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonCollection::new(&path);
        assert!(store.list().await.unwrap().is_empty());
        store.append(&entry("9")).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![entry("9")]);
    }

    #[tokio::test]
    async fn test_unparseable_entries_survive_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, r#"[{"legacy": true}]"#).unwrap();

        let store = JsonCollection::new(&path);
        store.append(&entry("1")).await.unwrap();
        let raw = store.raw().await.unwrap();
        assert_eq!(raw[0], json!({"legacy": true}));
        assert_eq!(store.list().await.unwrap(), vec![entry("1")]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_in_process_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonCollection::new(dir.path().join("log.json")));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(&entry(&i.to_string())).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 16);
    }
}
