//! Checkpoint persistence
//!
//! Two on-disk JSON snapshots make a long crawl interruptible: one holds
//! the visited set, the frontier, and the first-page flag; the other holds
//! the deferred-resource map (`url -> local path`). Both are opaque to
//! every other component; only this module reads or writes them.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Point-in-time copy of the crawl bookkeeping
///
/// Taken only while no fetch or mutation is in flight; the copy does not
/// alias the live collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// URL keys already dequeued and processed
    pub visited: Vec<String>,

    /// URL keys awaiting visitation, in FIFO order
    pub frontier: Vec<String>,

    /// Whether the root document has been claimed this run
    pub first_page_saved: bool,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

/// Reads and writes the two checkpoint files
#[derive(Debug, Clone)]
pub struct StateStore {
    crawl_path: PathBuf,
    deferred_path: PathBuf,
}

impl StateStore {
    pub fn new(crawl_path: impl Into<PathBuf>, deferred_path: impl Into<PathBuf>) -> Self {
        Self {
            crawl_path: crawl_path.into(),
            deferred_path: deferred_path.into(),
        }
    }

    /// Persists a snapshot and the deferred map
    ///
    /// Each file is written to a sibling temp path and renamed into place,
    /// so an interruption mid-write never corrupts the previous snapshot.
    pub fn persist(
        &self,
        checkpoint: &Checkpoint,
        deferred: &BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        write_json(&self.crawl_path, checkpoint)?;
        write_json(&self.deferred_path, deferred)?;

        tracing::info!(
            "Checkpoint persisted: {} visited, {} in frontier, {} deferred",
            checkpoint.visited.len(),
            checkpoint.frontier.len(),
            deferred.len()
        );
        Ok(())
    }

    /// Restores the previous snapshot, if one exists
    ///
    /// Returns `None` for a fresh start. A missing deferred file next to an
    /// existing crawl snapshot restores as an empty map.
    pub fn restore(&self) -> Result<Option<(Checkpoint, BTreeMap<String, PathBuf>)>> {
        if !self.crawl_path.exists() {
            return Ok(None);
        }

        let checkpoint: Checkpoint = serde_json::from_str(&fs::read_to_string(&self.crawl_path)?)?;

        let deferred = if self.deferred_path.exists() {
            serde_json::from_str(&fs::read_to_string(&self.deferred_path)?)?
        } else {
            BTreeMap::new()
        };

        Ok(Some((checkpoint, deferred)))
    }

    /// Removes any previous snapshot (fresh-start mode)
    pub fn clear(&self) -> Result<()> {
        for path in [&self.crawl_path, &self.deferred_path] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(
            dir.path().join("state.json"),
            dir.path().join("deferred.json"),
        )
    }

    fn sample_checkpoint() -> Checkpoint {
        Checkpoint {
            visited: vec![
                "https://example.com/".to_string(),
                "https://example.com/about".to_string(),
            ],
            frontier: vec![
                "https://example.com/gallery".to_string(),
                "https://example.com/contact".to_string(),
            ],
            first_page_saved: true,
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn test_restore_fresh_start() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).restore().unwrap().is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let checkpoint = sample_checkpoint();
        let mut deferred = BTreeMap::new();
        deferred.insert(
            "https://cdn.example/x.png".to_string(),
            PathBuf::from("/mirror/resources/x.png"),
        );

        store.persist(&checkpoint, &deferred).unwrap();
        let (restored, restored_deferred) = store.restore().unwrap().unwrap();

        assert_eq!(restored.visited, checkpoint.visited);
        assert_eq!(restored.frontier, checkpoint.frontier);
        assert_eq!(restored.first_page_saved, checkpoint.first_page_saved);
        assert_eq!(restored_deferred, deferred);
    }

    #[test]
    fn test_missing_deferred_file_restores_empty_map() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist(&sample_checkpoint(), &BTreeMap::new()).unwrap();
        fs::remove_file(dir.path().join("deferred.json")).unwrap();

        let (_, deferred) = store.restore().unwrap().unwrap();
        assert!(deferred.is_empty());
    }

    #[test]
    fn test_persist_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut checkpoint = sample_checkpoint();
        store.persist(&checkpoint, &BTreeMap::new()).unwrap();

        checkpoint.frontier.clear();
        store.persist(&checkpoint, &BTreeMap::new()).unwrap();

        let (restored, _) = store.restore().unwrap().unwrap();
        assert!(restored.frontier.is_empty());
    }

    #[test]
    fn test_clear_removes_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.persist(&sample_checkpoint(), &BTreeMap::new()).unwrap();
        store.clear().unwrap();

        assert!(store.restore().unwrap().is_none());
    }
}
