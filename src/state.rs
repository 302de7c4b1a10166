use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use parking_lot::Mutex;
use tracing::debug;

/// Fixed namespace/key pair the sync cursor is stored under.
pub const STATE_NAMESPACE: &str = "matrix-chat-bridge";
pub const CURSOR_KEY: &str = "since";

/// Durable key-value storage for the sync cursor. The cursor is read once
/// and written once per processing cycle; a single writer is assumed.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, cursor: &str) -> Result<()>;
    /// Explicit reset is the only sanctioned way to rewind the cursor.
    async fn reset(&self) -> Result<()>;
}

/// File-backed store persisting a small JSON map atomically
/// (write-temp-then-rename).
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn storage_key() -> String {
        format!("{STATE_NAMESPACE}::{CURSOR_KEY}")
    }

    async fn read_map(&self) -> Result<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("corrupt state file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        let serialized = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serialized)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<Option<String>> {
        let map = self.read_map().await?;
        Ok(map.get(&Self::storage_key()).cloned())
    }

    async fn save(&self, cursor: &str) -> Result<()> {
        let mut map = self.read_map().await?;
        map.insert(Self::storage_key(), cursor.to_string());
        map.insert(
            format!("{STATE_NAMESPACE}::updated_at"),
            chrono::Utc::now().to_rfc3339(),
        );
        self.write_map(&map).await?;
        debug!("persisted sync cursor {}", cursor);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut map = self.read_map().await?;
        if map.remove(&Self::storage_key()).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<String>>,
    history: Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: &str) -> Self {
        let store = Self::default();
        *store.cursor.lock() = Some(cursor.to_string());
        store
    }

    /// Every value ever persisted, in write order.
    pub fn persisted_history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.cursor.lock().clone())
    }

    async fn save(&self, cursor: &str) -> Result<()> {
        *self.cursor.lock() = Some(cursor.to_string());
        self.history.lock().push(cursor.to_string());
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.cursor.lock() = None;
        Ok(())
    }
}
