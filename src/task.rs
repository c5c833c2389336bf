use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::Error;

/// A slot owning at most one supervised unit of work.
///
/// The work runs as its own tokio task and finishes with a `u32` exit code.
/// `start` hands the future its state by move, so the caller may reuse or drop
/// its own copies as soon as `start` returns.
#[derive(Default)]
pub struct TaskSlot {
    handle: Option<JoinHandle<u32>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Launches `work`. Fails with `AlreadyRunning` if a previous task is
    /// still held and has not been joined.
    pub fn start<F>(&mut self, work: F) -> Result<(), Error>
    where
        F: Future<Output = u32> + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(Error::AlreadyRunning);
        }
        self.handle = Some(tokio::spawn(work));
        Ok(())
    }

    /// Waits for the task to finish and clears the slot.
    ///
    /// Returns the exit code, or `None` when there is nothing to join: the
    /// slot was never started, was already joined, or the task was aborted or
    /// panicked.
    pub async fn join(&mut self) -> Option<u32> {
        let handle = self.handle.take()?;
        handle.await.ok()
    }

    /// Aborts the task without letting it clean up. Last resort only; the
    /// normal stop path is a stop signal followed by `join`.
    pub fn kill(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// True while a held task has not finished.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}
