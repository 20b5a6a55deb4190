//! Shared types used across Shipyard crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default SSH port of a node's operating system shell.
pub const DEFAULT_NODE_PORT: u16 = 22;

/// Default port of the middleware's own administrative shell.
pub const DEFAULT_RUNTIME_PORT: u16 = 8101;

/// Where a container lives: the host and the OS-level login used to reach it.
///
/// Locations are always owned by value. "Same node as" aliasing copies the
/// target's location instead of sharing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLocation {
    pub host: String,
    #[serde(default = "default_node_port")]
    pub port: u16,
    #[serde(default = "default_login")]
    pub username: String,
    #[serde(default = "default_login")]
    pub password: String,
}

impl NodeLocation {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_NODE_PORT,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host:port`, used in log fields and executor targets.
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl Default for NodeLocation {
    fn default() -> Self {
        Self::new("localhost", "fuse", "fuse")
    }
}

fn default_node_port() -> u16 {
    DEFAULT_NODE_PORT
}

fn default_login() -> String {
    "fuse".to_string()
}

/// Login for the middleware's administrative shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin", "admin")
    }
}

/// The closed set of container variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Top-level instance installed directly on a node.
    Root,
    /// Instance spawned by its parent on the parent's host.
    Child,
    /// Instance provisioned by its parent onto another host over SSH.
    Ssh,
    /// Independently installed instance that joins an existing fabric.
    Join,
}

impl ContainerKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContainerKind::Root => "root",
            ContainerKind::Child => "child",
            ContainerKind::Ssh => "ssh",
            ContainerKind::Join => "join",
        }
    }

    /// Whether a container of this kind must be linked to a parent before it
    /// can be created.
    pub fn needs_parent(&self) -> bool {
        !matches!(self, ContainerKind::Root)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
