//! Durable identity cache (`./users.json`) plus debounced persistence
//! (root spec §4.8: "writes debounce to disk with a 2-second timer;
//! shutdown flushes synchronously").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

pub const DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CachedIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fight_point: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<i64>,
}

/// `./users.json`: map uid-string -> cached identity.
#[derive(Debug, Default)]
pub struct UserCache {
    pub entries: RwLock<HashMap<String, CachedIdentity>>,
}

impl UserCache {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let entries = serde_json::from_str(&raw)?;
        Ok(Self { entries: RwLock::new(entries) })
    }

    pub fn flush(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(&*self.entries.read())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Coalesces bursts of identity updates into at most one disk write per
/// [`DEBOUNCE`] window: every call to [`CacheDebouncer::mark_dirty`] resets
/// the timer, and the write only fires once a quiet period elapses.
/// Shutdown should call [`UserCache::flush`] directly instead, synchronously
/// (root spec §4.10).
pub struct CacheDebouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl CacheDebouncer {
    pub fn spawn(cache: Arc<UserCache>, path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            loop {
                if rx.recv().await.is_none() {
                    return;
                }
                loop {
                    match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_elapsed) => break,
                    }
                }
                if let Err(err) = cache.flush(&path) {
                    warn!(%err, "identity cache flush failed, will retry on next debounce");
                }
            }
        });
        Self { tx }
    }

    pub fn mark_dirty(&self) {
        let _ = self.tx.send(());
    }

    /// A debouncer with no background task backing it; `mark_dirty` is a
    /// no-op. Used where a manager needs the field populated but nothing
    /// should actually be persisted (tests without a tokio runtime).
    #[must_use]
    pub fn noop() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UserCache::load(&dir.path().join("users.json")).unwrap();
        assert!(cache.entries.read().is_empty());
    }

    #[test]
    fn flush_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let cache = UserCache::default();
        cache.entries.write().insert(
            "114514".into(),
            CachedIdentity { name: Some("Aria".into()), profession: None, fight_point: Some(12_000), max_hp: None },
        );
        cache.flush(&path).unwrap();

        let reloaded = UserCache::load(&path).unwrap();
        let entries = reloaded.entries.read();
        assert_eq!(entries.get("114514").unwrap().name.as_deref(), Some("Aria"));
        assert_eq!(entries.get("114514").unwrap().fight_point, Some(12_000));
    }

    #[tokio::test]
    async fn debouncer_coalesces_bursts_into_one_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let cache = Arc::new(UserCache::default());
        cache.entries.write().insert("1".into(), CachedIdentity::default());

        let debouncer = CacheDebouncer::spawn(cache.clone(), path.clone());
        for _ in 0..5 {
            debouncer.mark_dirty();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists(), "burst of dirty signals should not have flushed yet");

        tokio::time::sleep(DEBOUNCE + Duration::from_millis(500)).await;
        assert!(path.exists(), "debounced flush should have fired after the quiet period");
    }
}
