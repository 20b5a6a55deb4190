//! Container lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a container is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Non-root container whose parent is not linked yet.
    Unresolved,
    /// Ready to be created.
    NotCreated,
    /// Creation in progress.
    Creating,
    /// Remote artifact laid down, not yet confirmed online.
    Created,
    /// Provisioned and running.
    Online,
    /// Created but not running.
    Stopped,
    /// Removed from its host. Terminal.
    Destroyed,
}

impl LifecycleState {
    /// Whether the container exists remotely.
    pub fn is_created(&self) -> bool {
        matches!(
            self,
            LifecycleState::Created | LifecycleState::Online | LifecycleState::Stopped
        )
    }

    pub fn is_online(&self) -> bool {
        matches!(self, LifecycleState::Online)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Unresolved, NotCreated)
                | (NotCreated, NotCreated)
                | (NotCreated, Creating)
                | (Creating, Created)
                | (Creating, NotCreated)
                | (Created, Online)
                | (Created, Stopped)
                | (Created, Destroyed)
                | (Online, Stopped)
                | (Online, Destroyed)
                | (Stopped, Online)
                | (Stopped, Destroyed)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Unresolved => "unresolved",
            LifecycleState::NotCreated => "not-created",
            LifecycleState::Creating => "creating",
            LifecycleState::Created => "created",
            LifecycleState::Online => "online",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
