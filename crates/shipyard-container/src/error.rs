//! Container lifecycle error types.

use thiserror::Error;

use shipyard_exec::{ExecError, WaitError};

use crate::artifact::ArtifactError;
use crate::lifecycle::LifecycleState;
use crate::mutator::MutatorError;

/// Errors raised by container lifecycle operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container {0} has no parent")]
    MissingParent(String),

    #[error("parent {parent} of container {container} has been dropped")]
    ParentGone { container: String, parent: String },

    #[error("container {container} cannot move from {from} to {to}")]
    InvalidTransition {
        container: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("another middleware process is already running on {host}: {detail}")]
    PortInUse { host: String, detail: String },

    #[error("container {container} shares a node with {target}, which is not linked")]
    SameNodeUnlinked { container: String, target: String },

    #[error("container {0} has no installation on its node")]
    NotInstalled(String),

    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error("creation of container {0} was cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Mutator(#[from] MutatorError),
}

pub type ContainerResult<T> = Result<T, ContainerError>;
