//! Watermarks persisted in a JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::threading::{ThreadId, WatermarkStore};

/// Keeps every thread's watermark in one JSON object, keyed by thread id.
///
/// ```json
/// { "12345": 87, "67890": 3 }
/// ```
///
/// Writes go through a temporary file and a rename, so a crash never leaves
/// a half-written file behind. Concurrent writers in the same process are
/// serialized; separate processes race with last-writer-wins.
#[derive(Debug)]
pub struct JsonFileWatermarkStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileWatermarkStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(Error::Store(format!("{}: {e}", self.path.display()))),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Store(format!(
                "{}: expected a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(Error::Store(format!("{}: {e}", self.path.display()))),
        }
    }
}

#[async_trait]
impl WatermarkStore for JsonFileWatermarkStore {
    async fn get(&self, thread: &ThreadId) -> Result<Option<String>> {
        let map = self.load().await?;
        Ok(map.get(thread.as_str()).map(|value| match value {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }))
    }

    async fn set(&self, thread: &ThreadId, floor: u32) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        // Unreadable files are replaced
        let mut map = self.load().await.unwrap_or_else(|e| {
            log::warn!("rewriting unreadable watermark file: {e}");
            Map::new()
        });
        map.insert(thread.as_str().to_string(), Value::from(floor));

        let json = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| Error::Store(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threading::{PriorWatermark, ReadWatermarkTracker};

    #[tokio::test]
    async fn test_missing_file_is_first_visit() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileWatermarkStore::new(dir.path().join("marks.json"));
        assert_eq!(store.get(&ThreadId::from("1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("marks.json");
        let store = JsonFileWatermarkStore::new(&path);

        store.set(&ThreadId::from("1"), 15).await.unwrap();
        store.set(&ThreadId::from("2"), 3).await.unwrap();
        store.set(&ThreadId::from("1"), 20).await.unwrap();

        assert_eq!(store.get(&ThreadId::from("1")).await.unwrap().as_deref(), Some("20"));
        assert_eq!(store.get(&ThreadId::from("2")).await.unwrap().as_deref(), Some("3"));

        let reopened = JsonFileWatermarkStore::new(&path);
        assert_eq!(reopened.get(&ThreadId::from("2")).await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_corrupted_entry_normalizes_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marks.json");
        tokio::fs::write(&path, r#"{"9": "abc", "10": -4}"#).await.unwrap();

        let tracker = ReadWatermarkTracker::new(JsonFileWatermarkStore::new(&path));
        assert_eq!(tracker.prior(&ThreadId::from("9")).await, PriorWatermark::Seen(0));
        assert_eq!(tracker.prior(&ThreadId::from("10")).await, PriorWatermark::Seen(0));
    }

    #[tokio::test]
    async fn test_unparsable_file_is_unavailable_then_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marks.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let store = JsonFileWatermarkStore::new(&path);

        assert!(matches!(
            store.get(&ThreadId::from("1")).await,
            Err(Error::Store(_))
        ));

        store.set(&ThreadId::from("1"), 5).await.unwrap();
        assert_eq!(store.get(&ThreadId::from("1")).await.unwrap().as_deref(), Some("5"));
    }
}
