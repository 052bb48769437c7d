//! Registry of detached period tasks

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

/// Keeps the handles of spawned tasks so shutdown can wait for them
#[derive(Default)]
pub struct TaskRegistry {
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task without awaiting it; finished handles are pruned here
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock();
        handles.retain(|(_, handle)| !handle.is_finished());
        handles.push((name, handle));
        trace!(task = name, tracked = handles.len(), "task spawned");
    }

    /// Tasks spawned and not yet observed finished
    pub fn active(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Wait for every tracked task, giving up after `timeout`.
    ///
    /// Returns `false` when some task was still running at the deadline; such
    /// tasks keep running detached.
    pub async fn join_all(&self, timeout: Duration) -> bool {
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return true;
        }

        let joined = async move {
            for (name, handle) in handles {
                if let Err(e) = handle.await {
                    error!(task = name, error = %e, "task failed");
                }
            }
        };

        match tokio::time::timeout(timeout, joined).await {
            Ok(()) => true,
            Err(_) => {
                warn!(?timeout, "tasks still running after timeout");
                false
            }
        }
    }
}
