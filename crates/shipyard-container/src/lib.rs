//! shipyard-container — the container model and its lifecycle operations.
//!
//! A [`Container`] is shared as `Arc<Container>`: its name and kind are
//! immutable, everything else sits behind an internal lock that is never
//! held across a remote call.
//!
//! # Lifecycle
//!
//! ```text
//! Unresolved ──link parent──▶ NotCreated ──▶ Creating ──▶ Created ──▶ Online ⇄ Stopped
//!                                 ▲              │           │          │        │
//!                                 └── early fail ┘           └──────────┴────────┴──▶ Destroyed
//! ```
//!
//! # Variants
//!
//! ```text
//! Root   installs the archive on its node, boots, optionally creates a fabric
//! Child  container-create-child on the parent's shell
//! Ssh    container-create-ssh on the parent's shell, targeting another node
//! Join   installs like a root, then fabric:join to the parent's fabric
//! ```

pub mod artifact;
pub mod context;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod model;
pub mod mutator;
pub mod variants;

pub use artifact::{ArtifactError, ArtifactProvider, UrlArtifactProvider};
pub use context::{CancelFlag, LifecycleContext};
pub use error::{ContainerError, ContainerResult};
pub use lifecycle::LifecycleState;
pub use model::{Container, ContainerBuilder, ContainerSnapshot};
pub use mutator::{ConfigMutators, MutatorError, MutatorScope, MutatorSet, PropertyEdit};
