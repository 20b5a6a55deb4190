//! Collaborators shared by every lifecycle operation of a deployment.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use shipyard_core::Settings;
use shipyard_exec::{ExecutorFactory, Waiter};

use crate::artifact::{ArtifactProvider, UrlArtifactProvider};
use crate::mutator::{ConfigMutators, MutatorSet};

/// Deployment-wide cancellation signal.
///
/// Set by a failing creation; checked by pending creations before they
/// touch a remote host.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a lifecycle operation needs besides the container itself.
#[derive(Clone)]
pub struct LifecycleContext {
    pub executors: Arc<dyn ExecutorFactory>,
    pub waiter: Waiter,
    pub artifacts: Arc<dyn ArtifactProvider>,
    pub mutators: Arc<dyn ConfigMutators>,
    pub settings: Arc<Settings>,
    pub cancel: CancelFlag,
}

impl LifecycleContext {
    pub fn new(executors: Arc<dyn ExecutorFactory>, settings: Settings) -> Self {
        Self {
            executors,
            waiter: Waiter::new(&settings.wait),
            artifacts: Arc::new(UrlArtifactProvider::new(settings.artifact_url.clone())),
            mutators: Arc::new(MutatorSet::new()),
            settings: Arc::new(settings),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_waiter(mut self, waiter: Waiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactProvider>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_mutators(mut self, mutators: Arc<dyn ConfigMutators>) -> Self {
        self.mutators = mutators;
        self
    }
}

impl std::fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("waiter", &self.waiter)
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_set())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::default();
        let clone = flag.clone();
        clone.set();
        assert!(flag.is_set());
        flag.reset();
        assert!(!clone.is_set());
    }
}
