//! Per-run completion signals for creation tasks.
//!
//! Every container created in a run gets a `watch` channel registered
//! under its name before any task is spawned. Dependents subscribe to it
//! and block until the owning task publishes a final status.

use std::collections::HashMap;

use tokio::sync::watch;

/// Status published by a creation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        self != TaskStatus::Pending
    }
}

/// Completion signals of one deployment run, keyed by container name.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    signals: HashMap<String, watch::Receiver<TaskStatus>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` and return the sender its task publishes on.
    pub fn register(&mut self, name: &str) -> watch::Sender<TaskStatus> {
        let (tx, rx) = watch::channel(TaskStatus::Pending);
        self.signals.insert(name.to_string(), rx);
        tx
    }

    /// Subscribe to `name`'s completion, if it is created in this run.
    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<TaskStatus>> {
        self.signals.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Block until the watched task publishes a final status. A task that went
/// away without publishing counts as failed.
pub async fn completion(mut signal: watch::Receiver<TaskStatus>) -> TaskStatus {
    match signal.wait_for(|s| s.is_finished()).await {
        Ok(status) => *status,
        Err(_) => TaskStatus::Failed,
    }
}
