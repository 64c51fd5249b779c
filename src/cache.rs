//! Process-wide dataset cache.
//!
//! Keyed by dataset path. The first lookup reads and validates the CSV; later
//! lookups hand back the same `Arc<TrainingDataset>` without touching storage.
//! The cache is an ordinary value owned by whoever builds the pipeline, never
//! a global.
//!
//! Staleness checks are opt-in (`reload_on_change`): when enabled, each lookup
//! compares the file's modification time against the one recorded at load and
//! reloads on mismatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::dataset::{DatasetError, TrainingDataset};

/// In-memory dataset cache.
pub struct DatasetCache {
    entries: Mutex<HashMap<PathBuf, Arc<TrainingDataset>>>,
    reload_on_change: bool,
    loads: AtomicU64,
    hits: AtomicU64,
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DatasetCache {
    pub fn new(reload_on_change: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            reload_on_change,
            loads: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Return the cached dataset for `path`, loading it on first use.
    ///
    /// Load failures are returned to the caller and nothing is cached, so a
    /// fixed file is picked up on the next call.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<TrainingDataset>, DatasetError> {
        if let Some(dataset) = self.lookup(path) {
            if !self.reload_on_change || !is_stale(&dataset, path) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(path = %path.display(), "dataset cache hit");
                return Ok(dataset);
            }
            info!(path = %path.display(), "dataset changed on disk, reloading");
        }

        // Loading happens outside the lock; a concurrent first load of the
        // same path may read the file twice, and the last insert wins.
        let dataset = Arc::new(TrainingDataset::load(path)?);
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(path.to_path_buf(), Arc::clone(&dataset));
        Ok(dataset)
    }

    /// Drop the entry for `path`. Returns true if one was present.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.lock().remove(path).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of reads from storage so far.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn reload_on_change(&self) -> bool {
        self.reload_on_change
    }

    fn lookup(&self, path: &Path) -> Option<Arc<TrainingDataset>> {
        self.lock().get(path).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<TrainingDataset>>> {
        // Entries are only ever whole Arcs, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_stale(dataset: &TrainingDataset, path: &Path) -> bool {
    let current = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not stat dataset; keeping cached copy");
            return false;
        }
    };
    dataset.modified() != Some(current)
}
