//! Deployment file (`shipyard.toml`) parser.
//!
//! ```toml
//! ensemble = ["root", "ssh-1"]
//!
//! [settings]
//! pool_size = 4
//! artifact_url = "http://repo/fuse.zip"
//!
//! [settings.wait.provision]
//! interval_ms = 5000
//! timeout_secs = 600
//!
//! [[container]]
//! name = "root"
//! kind = "root"
//! node = { host = "10.0.0.1" }
//!
//! [[container]]
//! name = "ssh-1"
//! kind = "ssh"
//! parent = "root"
//! node = { host = "10.0.0.2" }
//! options = { profile = ["default"] }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::Options;
use crate::types::{ContainerKind, Credentials, NodeLocation};

/// Top-level deployment file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Names of the containers forming the coordination ensemble.
    #[serde(default)]
    pub ensemble: Vec<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "container")]
    pub containers: Vec<ContainerConfig>,
}

/// Orchestrator-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Create independent containers concurrently.
    pub with_threads: bool,
    /// Maximum number of concurrent creations.
    pub pool_size: usize,
    /// Skip teardown entirely.
    pub keep_containers: bool,
    /// Probe SSH hosts and rewrite them to join containers where needed.
    pub detect_platform: bool,
    /// Containers are pre-provisioned; create/destroy become no-ops.
    pub suppress_start: bool,
    /// Abort teardown on the first failure instead of collecting failures.
    pub strict_teardown: bool,
    /// Where installable archives are fetched from.
    pub artifact_url: Option<String>,
    /// Install directory for root containers, relative to the login home.
    pub base_dir: String,
    /// Host for the root injected when no containers are declared.
    pub default_host: Option<NodeLocation>,
    /// Bundles installed on the first root after it comes online.
    pub default_bundles: Vec<String>,
    /// Commands run on the first root after it comes online.
    pub default_commands: Vec<String>,
    /// Middleware shell login shared by all containers unless overridden.
    pub credentials: Credentials,
    pub wait: WaitSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            with_threads: true,
            pool_size: 10,
            keep_containers: false,
            detect_platform: true,
            suppress_start: false,
            strict_teardown: false,
            artifact_url: None,
            base_dir: "shipyard".to_string(),
            default_host: None,
            default_bundles: Vec::new(),
            default_commands: Vec::new(),
            credentials: Credentials::default(),
            wait: WaitSettings::default(),
        }
    }
}

impl Settings {
    /// Apply `SHIPYARD_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SHIPYARD_WITH_THREADS").and_then(|v| parse_bool(&v)) {
            self.with_threads = v;
        }
        if let Some(v) = lookup("SHIPYARD_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.pool_size = v;
        }
        if let Some(v) = lookup("SHIPYARD_KEEP_CONTAINERS").and_then(|v| parse_bool(&v)) {
            self.keep_containers = v;
        }
        if let Some(v) = lookup("SHIPYARD_DETECT_PLATFORM").and_then(|v| parse_bool(&v)) {
            self.detect_platform = v;
        }
        if let Some(v) = lookup("SHIPYARD_SUPPRESS_START").and_then(|v| parse_bool(&v)) {
            self.suppress_start = v;
        }
        if let Some(v) = lookup("SHIPYARD_ARTIFACT_URL") {
            self.artifact_url = Some(v);
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Polling configuration for every remote wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    pub boot: WaitConfig,
    pub shutdown: WaitConfig,
    pub provision: WaitConfig,
    pub patch: WaitConfig,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            boot: WaitConfig::new(3_000, 120, 0),
            shutdown: WaitConfig::new(5_000, 60, 0),
            provision: WaitConfig::new(3_000, 300, 10_000),
            patch: WaitConfig::new(3_000, 300, 0),
        }
    }
}

/// A single bounded-retry polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Delay between probes.
    pub interval_ms: u64,
    /// Give up once this much polling time has accumulated.
    pub timeout_secs: u64,
    /// Sleep before the first probe.
    #[serde(default)]
    pub grace_ms: u64,
}

impl WaitConfig {
    pub const fn new(interval_ms: u64, timeout_secs: u64, grace_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_secs,
            grace_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// One declared container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub kind: ContainerKind,
    /// Name of the parent container (required for all kinds but `root`).
    pub parent: Option<String>,
    pub node: Option<NodeLocation>,
    pub credentials: Option<Credentials>,
    /// Whether a root creates a fabric after boot (default true).
    pub fabric: Option<bool>,
    /// Port of the middleware shell.
    pub runtime_port: Option<u16>,
    #[serde(default)]
    pub options: Options,
}

impl DeployConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DeployConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
