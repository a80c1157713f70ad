//! Persistence for history snapshots, the ledger and the audit trail.
//!
//! Keys map to `<state_dir>/<key>.json` (snapshots) and `<state_dir>/<key>.jsonl`
//! (append-only records). The engine never depends on the layout.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;

pub const HISTORY_KEY: &str = "status-history";
pub const LEDGER_KEY: &str = "operation-ledger";
pub const IN_FLIGHT_KEY: &str = "in-flight";
pub const AUDIT_KEY: &str = "audit";

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append one record to the log under `key`
    async fn append(&self, key: &str, record: Value) -> Result<(), StoreError>;

    /// All records appended under `key`, oldest first
    async fn read_all(&self, key: &str) -> Result<Vec<Value>, StoreError>;

    /// Replace the snapshot under `key`
    async fn snapshot(&self, key: &str, record: Value) -> Result<(), StoreError>;

    async fn read_snapshot(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn clear_snapshot(&self, key: &str) -> Result<(), StoreError>;
}

// ============================================================================
// JSON file store
// ============================================================================

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str, ext: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", key, ext)))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn append(&self, key: &str, record: Value) -> Result<(), StoreError> {
        let path = self.path_for(key, "jsonl")?;
        create_dir_all(&self.dir).await?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        let path = self.path_for(key, "jsonl")?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str(line) {
                Ok(value) => records.push(value),
                // A torn final line after a crash is expected
                Err(e) => debug!("Skipping unreadable record in {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }

    async fn snapshot(&self, key: &str, record: Value) -> Result<(), StoreError> {
        let path = self.path_for(key, "json")?;
        let tmp = self.path_for(key, "json.tmp")?;
        create_dir_all(&self.dir).await?;

        let content = serde_json::to_string_pretty(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_snapshot(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key, "json")?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_snapshot(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key, "json")?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store kept entirely in memory; optionally refuses writes
#[derive(Default)]
pub struct MemoryStore {
    logs: Mutex<HashMap<String, Vec<Value>>>,
    snapshots: Mutex<HashMap<String, Value>>,
    fail_writes: Mutex<bool>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later write returns an IO error until turned off again
    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    /// Successful writes so far, appends and snapshots together
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if *lock(&self.fail_writes) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store refusing writes",
            )));
        }
        *lock(&self.writes) += 1;
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn append(&self, key: &str, record: Value) -> Result<(), StoreError> {
        self.check_write()?;
        lock(&self.logs).entry(key.to_string()).or_default().push(record);
        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        Ok(lock(&self.logs).get(key).cloned().unwrap_or_default())
    }

    async fn snapshot(&self, key: &str, record: Value) -> Result<(), StoreError> {
        self.check_write()?;
        lock(&self.snapshots).insert(key.to_string(), record);
        Ok(())
    }

    async fn read_snapshot(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.snapshots).get(key).cloned())
    }

    async fn clear_snapshot(&self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        lock(&self.snapshots).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_append_and_read() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path().join("state"));

        assert!(store.read_all(AUDIT_KEY).await.unwrap().is_empty());

        store.append(AUDIT_KEY, json!({"n": 1})).await.unwrap();
        store.append(AUDIT_KEY, json!({"n": 2})).await.unwrap();

        let records = store.read_all(AUDIT_KEY).await.unwrap();
        assert_eq!(records, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_file_store_snapshot_replaces() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());

        assert!(store.read_snapshot(LEDGER_KEY).await.unwrap().is_none());
        store.snapshot(LEDGER_KEY, json!({"v": 1})).await.unwrap();
        store.snapshot(LEDGER_KEY, json!({"v": 2})).await.unwrap();
        assert_eq!(
            store.read_snapshot(LEDGER_KEY).await.unwrap(),
            Some(json!({"v": 2}))
        );
        assert!(!temp.path().join("operation-ledger.json.tmp").exists());

        store.clear_snapshot(LEDGER_KEY).await.unwrap();
        assert!(store.read_snapshot(LEDGER_KEY).await.unwrap().is_none());
        // Clearing twice is fine
        store.clear_snapshot(LEDGER_KEY).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_skips_torn_line() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());
        store.append(AUDIT_KEY, json!({"ok": true})).await.unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(temp.path().join("audit.jsonl"))
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"{\"half"))
            .unwrap();

        let records = store.read_all(AUDIT_KEY).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());
        let err = store.append("../escape", json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_memory_store_fail_writes() {
        let store = MemoryStore::new();
        store.snapshot(HISTORY_KEY, json!([])).await.unwrap();
        assert_eq!(store.write_count(), 1);

        store.set_fail_writes(true);
        assert!(store.append(AUDIT_KEY, json!({})).await.is_err());
        assert_eq!(store.write_count(), 1);
    }
}
