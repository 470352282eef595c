//! Per-job registry of worker status cells.
//!
//! The map itself sits behind one `RwLock` that is only held long enough to
//! look up or clone cell handles. Each cell carries its own `Mutex`, so
//! updates for different tags never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::error::BackupError;
use super::models::{Worker, WorkerSummary};

/// One worker's state behind its own lock.
#[derive(Debug)]
pub struct WorkerCell {
    tag: String,
    state: Mutex<Worker>,
}

impl WorkerCell {
    fn new(tag: String) -> Self {
        Self {
            state: Mutex::new(Worker::new(tag.clone())),
            tag,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Lock this cell. Never hold the guard across an `.await` or while
    /// locking another cell.
    pub fn lock(&self) -> MutexGuard<'_, Worker> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn summary(&self) -> WorkerSummary {
        self.lock().summary()
    }
}

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    cells: RwLock<HashMap<String, Arc<WorkerCell>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-populated with `tags`.
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        registry.register(tags);
        registry
    }

    /// Replace the registry contents with a fresh cell per tag.
    pub fn register<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fresh: HashMap<String, Arc<WorkerCell>> = tags
            .into_iter()
            .map(Into::into)
            .map(|tag: String| (tag.clone(), Arc::new(WorkerCell::new(tag))))
            .collect();

        *self.cells.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    pub fn get(&self, tag: &str) -> Result<Arc<WorkerCell>, BackupError> {
        self.cells
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tag)
            .cloned()
            .ok_or_else(|| BackupError::UnknownWorker {
                tag: tag.to_string(),
            })
    }

    /// Snapshot every worker, sorted by tag.
    ///
    /// Cell handles are cloned under the map lock, which is then released;
    /// each cell is read under its own lock, one at a time.
    pub fn all(&self) -> Vec<WorkerSummary> {
        let cells: Vec<Arc<WorkerCell>> = self
            .cells
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        let mut summaries: Vec<WorkerSummary> = cells.iter().map(|cell| cell.summary()).collect();
        summaries.sort_by(|a, b| a.tag.cmp(&b.tag));
        summaries
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .cells
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.cells.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cells.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
