//! Crawl frontier and shared bookkeeping
//!
//! This module owns the four collections every other component observes:
//! the FIFO frontier, the visited set, the saved-path set, and the
//! deferred-resource map. All of them live behind one lock, so "pop and
//! mark visited" is atomic and a checkpoint snapshot can never observe a
//! half-applied mutation. The same lock serves multi-session crawls and
//! the checkpoint monitor's out-of-band snapshot alike.

use crate::state::Checkpoint;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct CrawlState {
    /// URL keys awaiting visitation, breadth-first
    frontier: VecDeque<String>,

    /// Membership mirror of the frontier, for O(1) dedupe on push
    enqueued: HashSet<String>,

    /// URL keys already dequeued and processed
    visited: HashSet<String>,

    /// Local paths already written this run
    saved_paths: HashSet<PathBuf>,

    /// Cross-origin resources awaiting the proxied batch phase
    deferred: BTreeMap<String, PathBuf>,

    /// Whether the root document has been claimed
    first_page_saved: bool,
}

/// Handle to the crawl bookkeeping, cloneable across tasks
///
/// Mutation happens only through these accessors; each takes the lock for
/// the duration of one logical step.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<CrawlState>>,
}

impl SharedState {
    /// Fresh state holding only the seed URL
    pub fn seeded(seed_key: String) -> Self {
        let mut state = CrawlState::default();
        state.enqueued.insert(seed_key.clone());
        state.frontier.push_back(seed_key);
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// State restored from a checkpoint
    pub fn from_checkpoint(checkpoint: Checkpoint, deferred: BTreeMap<String, PathBuf>) -> Self {
        let mut state = CrawlState {
            visited: checkpoint.visited.into_iter().collect(),
            deferred,
            first_page_saved: checkpoint.first_page_saved,
            ..Default::default()
        };

        for key in checkpoint.frontier {
            if !state.visited.contains(&key) && state.enqueued.insert(key.clone()) {
                state.frontier.push_back(key);
            }
        }

        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Pops the next unvisited key and marks it visited, atomically
    pub fn pop_next(&self) -> Option<String> {
        let mut state = self.inner.lock().unwrap();
        while let Some(key) = state.frontier.pop_front() {
            state.enqueued.remove(&key);
            if state.visited.insert(key.clone()) {
                return Some(key);
            }
        }
        None
    }

    /// Enqueues a discovered key unless it was already visited or enqueued
    ///
    /// Returns true if the key joined the frontier.
    pub fn push_discovered(&self, key: String) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.visited.contains(&key) || !state.enqueued.insert(key.clone()) {
            return false;
        }
        state.frontier.push_back(key);
        true
    }

    /// Returns true if the path has already been written this run
    pub fn is_saved(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().saved_paths.contains(path)
    }

    /// Records a written path; returns true if it was new
    ///
    /// Doubles as a reservation: a download worker claims the path before
    /// fetching, and a `false` return means another worker already owns it.
    pub fn mark_saved(&self, path: PathBuf) -> bool {
        self.inner.lock().unwrap().saved_paths.insert(path)
    }

    /// Releases a reserved path after a failed write, so a later retry
    /// (e.g. a deferred re-flush) is not skipped
    pub fn release_saved(&self, path: &Path) {
        self.inner.lock().unwrap().saved_paths.remove(path);
    }

    /// Registers a cross-origin resource for the deferred flush
    pub fn defer(&self, key: String, local_path: PathBuf) {
        self.inner.lock().unwrap().deferred.insert(key, local_path);
    }

    /// Copy of the deferred map for one flush pass
    pub fn deferred_batch(&self) -> Vec<(String, PathBuf)> {
        self.inner
            .lock()
            .unwrap()
            .deferred
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Removes flushed entries from the deferred map
    pub fn clear_deferred(&self, keys: &[String]) {
        let mut state = self.inner.lock().unwrap();
        for key in keys {
            state.deferred.remove(key);
        }
    }

    pub fn frontier_is_empty(&self) -> bool {
        self.inner.lock().unwrap().frontier.is_empty()
    }

    pub fn frontier_len(&self) -> usize {
        self.inner.lock().unwrap().frontier.len()
    }

    pub fn visited_len(&self) -> usize {
        self.inner.lock().unwrap().visited.len()
    }

    pub fn saved_len(&self) -> usize {
        self.inner.lock().unwrap().saved_paths.len()
    }

    pub fn deferred_is_empty(&self) -> bool {
        self.inner.lock().unwrap().deferred.is_empty()
    }

    pub fn deferred_len(&self) -> usize {
        self.inner.lock().unwrap().deferred.len()
    }

    pub fn first_page_saved(&self) -> bool {
        self.inner.lock().unwrap().first_page_saved
    }

    pub fn set_first_page_saved(&self) {
        self.inner.lock().unwrap().first_page_saved = true;
    }

    /// Point-in-time copy of everything a checkpoint needs
    ///
    /// Taken under the same lock as every mutation, so the copy is always a
    /// consistent state between two frontier operations.
    pub fn snapshot(&self) -> (Checkpoint, BTreeMap<String, PathBuf>) {
        let state = self.inner.lock().unwrap();

        let mut visited: Vec<String> = state.visited.iter().cloned().collect();
        visited.sort();

        let checkpoint = Checkpoint {
            visited,
            frontier: state.frontier.iter().cloned().collect(),
            first_page_saved: state.first_page_saved,
            taken_at: Utc::now(),
        };

        (checkpoint, state.deferred.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_state_pops_seed() {
        let state = SharedState::seeded("https://example.com/".to_string());
        assert_eq!(state.pop_next().unwrap(), "https://example.com/");
        assert!(state.pop_next().is_none());
    }

    #[test]
    fn test_duplicate_push_is_rejected() {
        let state = SharedState::seeded("https://example.com/".to_string());
        assert!(state.push_discovered("https://example.com/a".to_string()));
        assert!(!state.push_discovered("https://example.com/a".to_string()));
        assert_eq!(state.frontier_len(), 2);
    }

    #[test]
    fn test_visited_key_never_reenqueued() {
        let state = SharedState::seeded("https://example.com/".to_string());
        assert_eq!(state.pop_next().unwrap(), "https://example.com/");
        assert!(!state.push_discovered("https://example.com/".to_string()));
        assert!(state.pop_next().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let state = SharedState::seeded("https://example.com/".to_string());
        state.push_discovered("https://example.com/a".to_string());
        state.push_discovered("https://example.com/b".to_string());

        assert_eq!(state.pop_next().unwrap(), "https://example.com/");
        assert_eq!(state.pop_next().unwrap(), "https://example.com/a");
        assert_eq!(state.pop_next().unwrap(), "https://example.com/b");
    }

    #[test]
    fn test_each_distinct_key_visited_at_most_once() {
        let state = SharedState::seeded("https://example.com/".to_string());
        for _ in 0..3 {
            state.push_discovered("https://example.com/dup".to_string());
        }
        state.push_discovered("https://example.com/other".to_string());

        let mut visited = Vec::new();
        while let Some(key) = state.pop_next() {
            visited.push(key);
        }

        let distinct: HashSet<_> = visited.iter().collect();
        assert_eq!(visited.len(), distinct.len());
        assert_eq!(visited.len(), 3);
    }

    #[test]
    fn test_mark_saved_idempotence() {
        let state = SharedState::seeded("https://example.com/".to_string());
        let path = PathBuf::from("/mirror/index.html");

        assert!(!state.is_saved(&path));
        assert!(state.mark_saved(path.clone()));
        assert!(!state.mark_saved(path.clone()));
        assert!(state.is_saved(&path));
    }

    #[test]
    fn test_deferred_batch_and_clear() {
        let state = SharedState::seeded("https://example.com/".to_string());
        state.defer(
            "https://cdn.example/a.png".to_string(),
            PathBuf::from("/mirror/resources/a.png"),
        );
        state.defer(
            "https://cdn.example/b.png".to_string(),
            PathBuf::from("/mirror/resources/b.png"),
        );

        let batch = state.deferred_batch();
        assert_eq!(batch.len(), 2);

        state.clear_deferred(&["https://cdn.example/a.png".to_string()]);
        assert_eq!(state.deferred_len(), 1);
        assert_eq!(state.deferred_batch()[0].0, "https://cdn.example/b.png");
    }

    #[test]
    fn test_snapshot_matches_live_state() {
        let state = SharedState::seeded("https://example.com/".to_string());
        state.pop_next();
        state.push_discovered("https://example.com/a".to_string());
        state.defer(
            "https://cdn.example/x.png".to_string(),
            PathBuf::from("/mirror/resources/x.png"),
        );
        state.set_first_page_saved();

        let (checkpoint, deferred) = state.snapshot();
        assert_eq!(checkpoint.visited, vec!["https://example.com/".to_string()]);
        assert_eq!(checkpoint.frontier, vec!["https://example.com/a".to_string()]);
        assert!(checkpoint.first_page_saved);
        assert_eq!(deferred.len(), 1);
    }

    #[test]
    fn test_checkpoint_round_trip_restores_equal_state() {
        let state = SharedState::seeded("https://example.com/".to_string());
        state.pop_next();
        state.push_discovered("https://example.com/a".to_string());
        state.push_discovered("https://example.com/b".to_string());
        state.defer(
            "https://cdn.example/x.png".to_string(),
            PathBuf::from("/mirror/resources/x.png"),
        );

        let (checkpoint, deferred) = state.snapshot();
        let restored = SharedState::from_checkpoint(checkpoint, deferred);

        let (original, original_deferred) = state.snapshot();
        let (round_trip, round_trip_deferred) = restored.snapshot();

        assert_eq!(original.visited, round_trip.visited);
        assert_eq!(original.frontier, round_trip.frontier);
        assert_eq!(original.first_page_saved, round_trip.first_page_saved);
        assert_eq!(original_deferred, round_trip_deferred);
    }

    #[test]
    fn test_restore_drops_visited_keys_from_frontier() {
        let checkpoint = Checkpoint {
            visited: vec!["https://example.com/a".to_string()],
            frontier: vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
            first_page_saved: true,
            taken_at: Utc::now(),
        };

        let state = SharedState::from_checkpoint(checkpoint, BTreeMap::new());
        assert_eq!(state.pop_next().unwrap(), "https://example.com/b");
        assert!(state.pop_next().is_none());
    }
}
