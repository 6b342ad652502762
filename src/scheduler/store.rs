//! Persistence adapter for reminder records.
//!
//! The store is the source of truth for the schedule. Timers are an
//! in-memory optimisation rebuilt from it on every start.

use crate::error::{AlarmError, Result};
use crate::reminder::Reminder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Durable key-value store for reminder records.
///
/// Only last-write-wins on `put` is assumed; no transactions.
#[async_trait]
pub trait ReminderStore: Send + Sync + 'static {
    /// Insert or replace the record with the same id.
    async fn put(&self, reminder: &Reminder) -> Result<()>;

    /// All stored records, in id order.
    async fn get_all(&self) -> Result<Vec<Reminder>>;

    /// Delete by id. Removing an absent id is not an error.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Fetch a single record.
    async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|reminder| reminder.id == id))
    }
}

#[async_trait]
impl<S: ReminderStore + ?Sized> ReminderStore for Arc<S> {
    async fn put(&self, reminder: &Reminder) -> Result<()> {
        (**self).put(reminder).await
    }

    async fn get_all(&self) -> Result<Vec<Reminder>> {
        (**self).get_all().await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        (**self).remove(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        (**self).get(id).await
    }
}

// ─── MemoryReminderStore ─────────────────────────────────────────────────────

/// Process-local store. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryReminderStore {
    records: Mutex<BTreeMap<String, Reminder>>,
}

impl MemoryReminderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. to simulate records left by a previous process.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Reminder>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }
}

#[async_trait]
impl ReminderStore for MemoryReminderStore {
    async fn put(&self, reminder: &Reminder) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(reminder.id.clone(), reminder.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Reminder>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.records.lock().await.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        Ok(self.records.lock().await.get(id).cloned())
    }
}

// ─── JsonFileReminderStore ───────────────────────────────────────────────────

const STORE_VERSION: u8 = 1;

/// On-disk layout. Records stay as raw JSON until decoded one by one so a
/// single corrupt entry does not make the whole file unreadable.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "default_store_version")]
    version: u8,
    #[serde(default)]
    reminders: Vec<serde_json::Value>,
}

fn default_store_version() -> u8 {
    STORE_VERSION
}

/// Pretty-printed JSON snapshot file, rewritten atomically on every change.
pub struct JsonFileReminderStore {
    path: PathBuf,
    // Serialises read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl JsonFileReminderStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Reminder>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(AlarmError::Persistence(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| {
            AlarmError::Persistence(format!("cannot parse {}: {e}", self.path.display()))
        })?;

        let mut records = BTreeMap::new();
        for raw in file.reminders {
            match serde_json::from_value::<Reminder>(raw) {
                Ok(reminder) => {
                    records.insert(reminder.id.clone(), reminder);
                }
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "skipping corrupt reminder record"
                ),
            }
        }
        Ok(records)
    }

    async fn save(&self, records: &BTreeMap<String, Reminder>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AlarmError::Persistence(format!("cannot create store dir: {e}")))?;
        }

        let reminders = records
            .values()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AlarmError::Persistence(format!("cannot serialize reminder: {e}")))?;
        let file = StoreFile {
            version: STORE_VERSION,
            reminders,
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| AlarmError::Persistence(format!("cannot serialize store: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| AlarmError::Persistence(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AlarmError::Persistence(format!("cannot replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), count = records.len(), "reminder store saved");
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for JsonFileReminderStore {
    async fn put(&self, reminder: &Reminder) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        records.insert(reminder.id.clone(), reminder.clone());
        self.save(&records).await
    }

    async fn get_all(&self) -> Result<Vec<Reminder>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.load().await?.into_values().collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        if records.remove(id).is_some() {
            self.save(&records).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::reminder::{ReminderDescriptor, ReminderStatus};

    fn reminder(id: &str, at: u64) -> Reminder {
        let desc = ReminderDescriptor::at("Water plants", at as i64);
        Reminder::pending(id.to_owned(), &desc, at, at - 1_000, 10)
    }

    #[tokio::test]
    async fn memory_store_put_is_upsert() {
        let store = MemoryReminderStore::new();
        store.put(&reminder("a", 10_000)).await.unwrap();
        store.put(&reminder("a", 20_000)).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].scheduled_at_epoch_ms, 20_000);
    }

    #[tokio::test]
    async fn memory_store_remove_absent_is_ok() {
        let store = MemoryReminderStore::new();
        store.remove("ghost").await.unwrap();
        assert!(store.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileReminderStore::new(dir.path().join("reminders.json"));
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reminders.json");

        let store = JsonFileReminderStore::new(&path);
        store.put(&reminder("a", 10_000)).await.unwrap();
        let mut fired = reminder("b", 20_000);
        fired.status = ReminderStatus::Fired;
        store.put(&fired).await.unwrap();
        store.remove("a").await.unwrap();
        drop(store);

        let reopened = JsonFileReminderStore::new(&path);
        let all = reopened.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "b");
        assert_eq!(all[0].status, ReminderStatus::Fired);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        let good = serde_json::to_value(reminder("ok", 10_000)).unwrap();
        let file = serde_json::json!({
            "version": 1,
            "reminders": [good, {"id": "broken", "label": 7}]
        });
        std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let store = JsonFileReminderStore::new(&path);
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "ok");
    }

    #[tokio::test]
    async fn file_store_unparseable_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileReminderStore::new(&path);
        assert!(matches!(
            store.get_all().await,
            Err(AlarmError::Persistence(_))
        ));
    }
}
