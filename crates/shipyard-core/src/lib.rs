pub mod config;
pub mod options;
pub mod types;

pub use config::{ContainerConfig, DeployConfig, Settings, WaitConfig, WaitSettings};
pub use options::{OptionKey, Options};
pub use types::*;
