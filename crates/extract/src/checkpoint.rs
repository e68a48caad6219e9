use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

/// A JSON file replaced wholesale on every write. Writers are serialized and
/// each write goes through a sibling temp file plus rename, so readers see
/// either the previous snapshot or the new one.
pub struct JsonCheckpoint {
    path: PathBuf,
    lock: Mutex<()>,
    writes: AtomicUsize,
}

impl JsonCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of completed writes through this handle.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// `None` when the file is absent or unreadable as `T`; a corrupt
    /// checkpoint means starting fresh, not failing the run.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .await
            .context(format!("Failed to read checkpoint: {:?}", self.path))?;

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Checkpoint is not valid JSON, starting fresh");
                Ok(None)
            }
        }
    }

    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize checkpoint")?;

        let _guard = self.lock.lock().await;

        let tmp = self.temp_path();
        fs::write(&tmp, json)
            .await
            .context(format!("Failed to write checkpoint: {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .await
            .context(format!("Failed to replace checkpoint: {:?}", self.path))?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
