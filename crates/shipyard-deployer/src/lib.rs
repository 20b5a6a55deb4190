//! shipyard-deployer — deployment orchestration for a container fleet.
//!
//! The [`Deployer`] owns the ordered deployment collection and drives it
//! through creation and teardown:
//!
//! - Resolves parents and same-node aliases by name
//! - Rewrites SSH containers on Windows hosts to join containers
//! - Creates containers concurrently, each waiting for its parent first
//! - Forms the coordination ensemble once its members are online
//! - Tears everything down in reverse order
//!
//! # Architecture
//!
//! ```text
//! Deployer
//!   ├── Vec<Arc<Container>> (deployment collection, registration order)
//!   ├── LifecycleContext (executors, waiter, artifacts, mutators, cancel flag)
//!   ├── Ensemble (member names + formed flag)
//!   └── per run
//!       ├── TaskRegistry (watch channel per pending container)
//!       ├── Semaphore (pool_size permits, taken after the parent barrier)
//!       └── JoinSet (one creation task per pending container)
//! ```

pub mod deployer;
pub mod ensemble;
pub mod error;
pub mod platform;
pub mod registry;

pub use deployer::{DeploymentPlan, Deployer};
pub use ensemble::Ensemble;
pub use error::{DeployError, DeployResult, TeardownReport};
pub use registry::{TaskRegistry, TaskStatus};
