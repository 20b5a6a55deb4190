//! Provisioning wait protocol.
//!
//! Every wait is a bounded-retry poll: an optional grace sleep, then probe,
//! sleep `interval`, repeat. The poll fails once the accumulated interval
//! time exceeds the ceiling, so a wait never runs longer than
//! `grace + ceiling + interval`. A probe that fails at the transport level
//! triggers a silent reconnect and counts as "not yet".

use std::time::Duration;

use tracing::{debug, warn};

use shipyard_core::{WaitConfig, WaitSettings};

use crate::error::{WaitError, WaitResult};
use crate::executor::RemoteExecutor;

/// Interval, ceiling and grace period of a single kind of wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
    pub grace: Duration,
}

impl WaitPolicy {
    pub fn new(interval: Duration, ceiling: Duration) -> Self {
        Self {
            interval,
            ceiling,
            grace: Duration::ZERO,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

impl From<WaitConfig> for WaitPolicy {
    fn from(config: WaitConfig) -> Self {
        Self {
            interval: config.interval(),
            ceiling: config.ceiling(),
            grace: config.grace(),
        }
    }
}

/// Outcome of one probe.
#[derive(Debug)]
enum Probe {
    Ready,
    Pending,
    /// The session itself failed; reconnect before the next probe.
    Broken(String),
}

enum Condition<'a> {
    /// Command output contains a marker.
    Output { command: String, marker: &'a str },
    /// The session accepts a connection.
    Connects,
    /// The session no longer accepts connections.
    Disconnected,
}

/// Runs the remote waits with per-kind policies.
#[derive(Debug, Clone)]
pub struct Waiter {
    boot: WaitPolicy,
    shutdown: WaitPolicy,
    provision: WaitPolicy,
    patch: WaitPolicy,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(&WaitSettings::default())
    }
}

impl Waiter {
    pub fn new(settings: &WaitSettings) -> Self {
        Self {
            boot: settings.boot.into(),
            shutdown: settings.shutdown.into(),
            provision: settings.provision.into(),
            patch: settings.patch.into(),
        }
    }

    pub fn with_boot(mut self, policy: WaitPolicy) -> Self {
        self.boot = policy;
        self
    }

    pub fn with_shutdown(mut self, policy: WaitPolicy) -> Self {
        self.shutdown = policy;
        self
    }

    pub fn with_provision(mut self, policy: WaitPolicy) -> Self {
        self.provision = policy;
        self
    }

    pub fn with_patch(mut self, policy: WaitPolicy) -> Self {
        self.patch = policy;
        self
    }

    /// Wait until `container-list` reports `name` as successfully provisioned.
    pub async fn wait_for_provisioning(
        &self,
        exec: &dyn RemoteExecutor,
        name: &str,
    ) -> WaitResult<()> {
        self.wait_for_provision_status(exec, name, "success").await
    }

    /// Wait until `container-list` reports `status` for `name`.
    pub async fn wait_for_provision_status(
        &self,
        exec: &dyn RemoteExecutor,
        name: &str,
        status: &str,
    ) -> WaitResult<()> {
        let condition = Condition::Output {
            command: format!("container-list | grep {name}"),
            marker: status,
        };
        self.poll(&self.provision, &format!("{name} to reach '{status}'"), exec, condition)
            .await
    }

    /// Wait until `container-list` reports `name` as stopped.
    pub async fn wait_for_container_stop(
        &self,
        exec: &dyn RemoteExecutor,
        name: &str,
    ) -> WaitResult<()> {
        let condition = Condition::Output {
            command: format!("container-list | grep {name}"),
            marker: "stopped",
        };
        // Stopping needs no grace period.
        let policy = WaitPolicy {
            grace: Duration::ZERO,
            ..self.provision
        };
        self.poll(&policy, &format!("{name} to stop"), exec, condition)
            .await
    }

    /// Wait until the session accepts a connection.
    pub async fn wait_for_boot(&self, exec: &dyn RemoteExecutor) -> WaitResult<()> {
        self.poll(
            &self.boot,
            &format!("{} to boot", exec.target()),
            exec,
            Condition::Connects,
        )
        .await
    }

    /// Wait until the session stops accepting connections.
    pub async fn wait_for_shutdown(&self, exec: &dyn RemoteExecutor) -> WaitResult<()> {
        self.poll(
            &self.shutdown,
            &format!("{} to shut down", exec.target()),
            exec,
            Condition::Disconnected,
        )
        .await
    }

    /// Wait until `patch:list` reports `patch` as installed.
    pub async fn wait_for_patch(&self, exec: &dyn RemoteExecutor, patch: &str) -> WaitResult<()> {
        let condition = Condition::Output {
            command: format!("patch:list | grep {patch}"),
            marker: "true",
        };
        self.poll(&self.patch, &format!("patch {patch} to install"), exec, condition)
            .await
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn poll(
        &self,
        policy: &WaitPolicy,
        description: &str,
        exec: &dyn RemoteExecutor,
        condition: Condition<'_>,
    ) -> WaitResult<()> {
        if !policy.grace.is_zero() {
            tokio::time::sleep(policy.grace).await;
        }

        let mut elapsed = Duration::ZERO;
        loop {
            if elapsed > policy.ceiling {
                warn!(condition = %description, ceiling = ?policy.ceiling, "wait timed out");
                return Err(WaitError::Timeout {
                    condition: description.to_string(),
                    ceiling: policy.ceiling,
                });
            }

            match probe(exec, &condition).await {
                Probe::Ready => {
                    debug!(condition = %description, ?elapsed, "wait satisfied");
                    return Ok(());
                }
                Probe::Pending => {
                    debug!(
                        condition = %description,
                        remaining = ?policy.ceiling.saturating_sub(elapsed),
                        "still waiting"
                    );
                }
                Probe::Broken(reason) => {
                    debug!(condition = %description, %reason, "probe failed, reconnecting");
                    if let Err(e) = exec.reconnect().await {
                        debug!(session = %exec.target(), error = %e, "reconnect failed");
                    }
                }
            }

            tokio::time::sleep(policy.interval).await;
            elapsed += policy.interval;
        }
    }
}

async fn probe(exec: &dyn RemoteExecutor, condition: &Condition<'_>) -> Probe {
    match condition {
        Condition::Output { command, marker } => match exec.execute_command(command).await {
            Ok(output) if output.contains(marker) => Probe::Ready,
            Ok(_) => Probe::Pending,
            Err(e) => Probe::Broken(e.to_string()),
        },
        Condition::Connects => match exec.connect().await {
            Ok(()) => Probe::Ready,
            Err(_) => Probe::Pending,
        },
        Condition::Disconnected => {
            if exec.is_connected().await {
                Probe::Pending
            } else {
                Probe::Ready
            }
        }
    }
}
