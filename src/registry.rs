use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Error;
use crate::parse::ProcessConfig;
use crate::watcher::ProcessWatcher;

/// Owns every process watcher, in insertion order.
///
/// The mutex makes `add_entry`, `purge_all` and `for_each` mutually
/// exclusive, so the collection can never be mutated mid-iteration.
#[derive(Default)]
pub struct ProcessRegistry {
    watchers: Mutex<Vec<ProcessWatcher>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a watcher for `config` and appends it to the collection.
    ///
    /// On spawn failure the watcher is discarded, the error is propagated and
    /// the collection is left unchanged. On success returns the child PID.
    pub async fn add_entry(&self, config: ProcessConfig) -> Result<u32, Error> {
        let mut watchers = self.watchers.lock().await;
        let mut watcher = ProcessWatcher::new();
        watcher.start(config).await?;
        let pid = watcher.pid().unwrap_or(0);
        watchers.push(watcher);
        Ok(pid)
    }

    /// Stops and releases every watcher, leaving the collection empty.
    ///
    /// Teardown runs in parallel with no ordering between watchers. Safe to
    /// call when already empty, safe to call repeatedly.
    pub async fn purge_all(&self) {
        let mut watchers = std::mem::take(&mut *self.watchers.lock().await);
        if watchers.is_empty() {
            return;
        }
        info!(count = watchers.len(), "purging watchers");
        join_all(watchers.iter_mut().map(ProcessWatcher::stop)).await;
    }

    /// Visits each watcher in insertion order, read-only.
    pub async fn for_each(&self, mut visit: impl FnMut(&ProcessWatcher)) {
        for watcher in self.watchers.lock().await.iter() {
            visit(watcher);
        }
    }

    pub async fn len(&self) -> usize {
        self.watchers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
