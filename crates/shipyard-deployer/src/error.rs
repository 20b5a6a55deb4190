//! Orchestrator error types.

use thiserror::Error;

use shipyard_container::ContainerError;
use shipyard_exec::ExecError;

/// Errors that can occur while deploying or tearing down a fleet.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("parent {parent} of container {container} is not in the deployment")]
    UnresolvedParent { container: String, parent: String },

    #[error("container not found: {0}")]
    UnknownContainer(String),

    #[error("container already registered: {0}")]
    DuplicateName(String),

    #[error("containers form a parent cycle: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("ensemble member not found: {0}")]
    EnsembleMemberNotFound(String),

    #[error("no root container in the ensemble member list")]
    NoEnsembleCoordinator,

    #[error("no containers matching filter {0}")]
    NoMatchingContainers(String),

    #[error("deployment has no root container")]
    NoRoot,

    #[error("deployment failed at container {container}: {source}")]
    Aggregate {
        container: String,
        #[source]
        source: ContainerError,
    },

    #[error("parent {parent} of container {container} failed to deploy")]
    ParentFailed { container: String, parent: String },

    #[error("creation of container {0} was cancelled")]
    Cancelled(String),

    #[error("failed to destroy container {container}: {source}")]
    Destroy {
        container: String,
        #[source]
        source: ContainerError,
    },

    #[error("creation task panicked: {0}")]
    TaskPanicked(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl DeployError {
    /// Whether this error originates in a container's own creation rather
    /// than in a failure propagated from elsewhere.
    pub fn is_originating(&self) -> bool {
        !matches!(
            self,
            DeployError::ParentFailed { .. }
                | DeployError::Cancelled(_)
                | DeployError::Aggregate {
                    source: ContainerError::Cancelled(_),
                    ..
                }
        )
    }
}

pub type DeployResult<T> = Result<T, DeployError>;

/// Outcome of a non-strict teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Containers removed from their hosts, in teardown order.
    pub destroyed: Vec<String>,
    /// Containers whose teardown failed; they stay in the deployment.
    pub failures: Vec<(String, ContainerError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
