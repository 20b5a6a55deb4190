//! Configuration file edits applied to an installation before it starts.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use shipyard_exec::{ExecError, RemoteExecutor};

#[derive(Debug, Error)]
pub enum MutatorError {
    #[error("editing {file} ({key}) on {host} failed: {source}")]
    Apply {
        host: String,
        file: String,
        key: String,
        #[source]
        source: ExecError,
    },
}

/// Which hosts an edit applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutatorScope {
    AllHosts,
    Host(String),
}

impl MutatorScope {
    fn matches(&self, host: &str) -> bool {
        match self {
            MutatorScope::AllHosts => true,
            MutatorScope::Host(h) => h == host,
        }
    }
}

/// Set `key=value` in a properties file relative to the installation home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEdit {
    pub file: String,
    pub key: String,
    pub value: String,
}

impl PropertyEdit {
    pub fn new(file: &str, key: &str, value: impl ToString) -> Self {
        Self {
            file: file.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Shell command that replaces the key in place, or appends it.
    pub fn command(&self, home: &str) -> String {
        let path = format!("{home}/{}", self.file);
        let key = &self.key;
        let value = &self.value;
        format!(
            "grep -q '^{key}[ =]' {path} && sed -i 's|^{key}[ =].*|{key}={value}|' {path} || echo '{key}={value}' >> {path}"
        )
    }
}

/// Scoped configuration edits.
#[async_trait]
pub trait ConfigMutators: Send + Sync {
    fn add(&self, scope: MutatorScope, edit: PropertyEdit);

    /// Apply every edit for `host` followed by `extra`; returns how many ran.
    async fn apply(
        &self,
        exec: &dyn RemoteExecutor,
        host: &str,
        home: &str,
        extra: &[PropertyEdit],
    ) -> Result<usize, MutatorError>;

    fn clear(&self);
}

/// In-memory [`ConfigMutators`] applying edits over the node shell.
#[derive(Debug, Default)]
pub struct MutatorSet {
    edits: Mutex<Vec<(MutatorScope, PropertyEdit)>>,
}

impl MutatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn edits(&self) -> MutexGuard<'_, Vec<(MutatorScope, PropertyEdit)>> {
        self.edits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Edits that apply to `host`, in registration order.
    pub fn applicable(&self, host: &str) -> Vec<PropertyEdit> {
        self.edits()
            .iter()
            .filter(|(scope, _)| scope.matches(host))
            .map(|(_, edit)| edit.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edits().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConfigMutators for MutatorSet {
    fn add(&self, scope: MutatorScope, edit: PropertyEdit) {
        self.edits().push((scope, edit));
    }

    async fn apply(
        &self,
        exec: &dyn RemoteExecutor,
        host: &str,
        home: &str,
        extra: &[PropertyEdit],
    ) -> Result<usize, MutatorError> {
        let mut edits = self.applicable(host);
        edits.extend_from_slice(extra);

        for edit in &edits {
            exec.execute_command(&edit.command(home))
                .await
                .map_err(|source| MutatorError::Apply {
                    host: host.to_string(),
                    file: edit.file.clone(),
                    key: edit.key.clone(),
                    source,
                })?;
        }
        debug!(%host, applied = edits.len(), "configuration edits applied");
        Ok(edits.len())
    }

    fn clear(&self) {
        self.edits().clear();
    }
}
