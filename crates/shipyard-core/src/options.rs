//! Declared container options.
//!
//! Options form a multi-valued map: most keys carry a single value, but
//! `jvm_opts`, `env`, `profile`, `commands` and `bundles` accumulate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Recognised option keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    Profile,
    JvmOpts,
    Env,
    Commands,
    Bundles,
    Version,
    MinPort,
    MaxPort,
    Resolver,
    ManualIp,
    WorkingDirectory,
    SameNodeAs,
    ZookeeperPassword,
    JavaHome,
    FabricCreate,
}

impl OptionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::Profile => "profile",
            OptionKey::JvmOpts => "jvm_opts",
            OptionKey::Env => "env",
            OptionKey::Commands => "commands",
            OptionKey::Bundles => "bundles",
            OptionKey::Version => "version",
            OptionKey::MinPort => "min_port",
            OptionKey::MaxPort => "max_port",
            OptionKey::Resolver => "resolver",
            OptionKey::ManualIp => "manual_ip",
            OptionKey::WorkingDirectory => "working_directory",
            OptionKey::SameNodeAs => "same_node_as",
            OptionKey::ZookeeperPassword => "zookeeper_password",
            OptionKey::JavaHome => "java_home",
            OptionKey::FabricCreate => "fabric_create",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-valued option map. `Clone` is a deep copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<OptionKey, Vec<String>>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`.
    pub fn add(&mut self, key: OptionKey, value: impl Into<String>) -> &mut Self {
        self.0.entry(key).or_default().push(value.into());
        self
    }

    /// Replace all values under `key` with a single value.
    pub fn set(&mut self, key: OptionKey, value: impl Into<String>) -> &mut Self {
        self.0.insert(key, vec![value.into()]);
        self
    }

    pub fn extend(&mut self, key: OptionKey, values: impl IntoIterator<Item = String>) -> &mut Self {
        self.0.entry(key).or_default().extend(values);
        self
    }

    pub fn remove(&mut self, key: OptionKey) -> Option<Vec<String>> {
        self.0.remove(&key)
    }

    /// All values under `key` (empty when absent).
    pub fn values(&self, key: OptionKey) -> &[String] {
        self.0.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First non-empty value under `key`.
    pub fn first(&self, key: OptionKey) -> Option<&str> {
        self.values(key)
            .iter()
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }

    /// First value under `key`, or the empty string.
    pub fn string(&self, key: OptionKey) -> &str {
        self.first(key).unwrap_or("")
    }

    pub fn contains(&self, key: OptionKey) -> bool {
        !self.values(key).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionKey, &[String])> {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}
