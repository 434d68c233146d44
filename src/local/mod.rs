//! Client-only state that never reaches the backend: practice queues, style
//! votes, role rotation and form drafts. Everything lives in one JSON file of
//! namespaced keys; the last write wins.

pub mod drafts;
pub mod practice_queue;
pub mod role_rotation;
pub mod style_vote;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::errors::AppError;

const NAMESPACE: &str = "dancebase";

/// `dancebase:{feature}:{scope...}`
pub fn storage_key(feature: &str, scope: &[&str]) -> String {
    let mut key = format!("{NAMESPACE}:{feature}");
    for part in scope {
        key.push(':');
        key.push_str(part);
    }
    key
}

#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl LocalStore {
    /// Opens the store, starting empty if the file is missing or unreadable.
    pub async fn open(path: &Path) -> Self {
        let entries = match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    error!("failed to parse local store {}: {err}", path.display());
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                error!("failed to read local store {}: {err}", path.display());
                BTreeMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Reads `key`, falling back to `default` when absent or malformed.
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.entries.get(key) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("ignoring malformed value under {key}: {err}");
                    default
                }
            },
            None => default,
        }
    }

    pub async fn save<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), AppError> {
        self.entries.insert(key.to_string(), serde_json::to_value(value)?);
        self.persist().await
    }

    pub async fn remove(&mut self, key: &str) -> Result<bool, AppError> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn persist(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let payload = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&self.path, payload).await?;
        debug!("local store written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            storage_key("practice-queue", &["g1", "p1"]),
            "dancebase:practice-queue:g1:p1"
        );
        assert_eq!(storage_key("style-vote", &["group-123"]), "dancebase:style-vote:group-123");
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut store = LocalStore::open(&path).await;
        store.save("dancebase:test:a", &vec![1, 2, 3]).await.unwrap();

        let reopened = LocalStore::open(&path).await;
        let values: Vec<i32> = reopened.load("dancebase:test:a", Vec::new());
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn last_write_wins_and_remove_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = LocalStore::open(&path).await;

        store.save("k", &"first").await.unwrap();
        store.save("k", &"second").await.unwrap();
        assert_eq!(store.load("k", String::new()), "second");

        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
        assert_eq!(store.load("k", "none".to_string()), "none");
    }

    #[tokio::test]
    async fn corrupt_file_or_value_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let mut store = LocalStore::open(&path).await;
        assert_eq!(store.load("k", 7), 7);

        store.save("k", &"text").await.unwrap();
        assert_eq!(store.load::<i32>("k", 7), 7);
    }
}
