//! Executor backed by the system OpenSSH client.
//!
//! Each command runs as a separate `ssh` invocation. Password logins go
//! through `sshpass -e` when a password is configured; otherwise key-based
//! authentication in batch mode is used.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, trace};

use shipyard_core::NodeLocation;

use crate::error::{ExecError, ExecResult};
use crate::executor::{ExecutorFactory, RemoteExecutor, SessionKind};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Command used to check that a shell answers.
const PROBE_COMMAND: &str = "echo ready";

#[derive(Debug)]
pub struct OpenSshExecutor {
    target: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    connected: AtomicBool,
}

impl OpenSshExecutor {
    pub fn new(location: &NodeLocation, kind: &SessionKind) -> Self {
        let (port, user, password) = match kind {
            SessionKind::Node => (
                location.port,
                location.username.clone(),
                location.password.clone(),
            ),
            SessionKind::Runtime { port, credentials } => (
                *port,
                credentials.user.clone(),
                credentials.password.clone(),
            ),
        };
        Self {
            target: format!("{}:{}@{}:{}", kind.label(), user, location.host, port),
            host: location.host.clone(),
            port,
            user,
            password,
            connected: AtomicBool::new(false),
        }
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = if self.password.is_empty() {
            let mut cmd = Command::new("ssh");
            cmd.arg("-o").arg("BatchMode=yes");
            cmd
        } else {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").arg("ssh").env("SSHPASS", &self.password);
            cmd
        };
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", CONNECT_TIMEOUT.as_secs()))
            .arg("-p")
            .arg(self.port.to_string())
            .arg(format!("{}@{}", self.user, self.host))
            .arg(remote)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn connect(&self) -> ExecResult<()> {
        let result = self.execute_command(PROBE_COMMAND).await;
        self.connected.store(result.is_ok(), Ordering::SeqCst);
        result.map(|_| ()).map_err(|e| ExecError::Connection {
            target: self.target.clone(),
            reason: e.to_string(),
        })
    }

    async fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let address = format!("{}:{}", self.host, self.port);
        match tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(&address)).await {
            Ok(Ok(_)) => true,
            _ => {
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn execute_command(&self, command: &str) -> ExecResult<String> {
        trace!(session = %self.target, %command, "executing");
        let output = self.command(command).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::Command {
                target: self.target.clone(),
                command: command.to_string(),
                reason: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        debug!(session = %self.target, %command, bytes = stdout.len(), "command finished");
        Ok(stdout)
    }
}

/// Opens [`OpenSshExecutor`] sessions.
#[derive(Debug, Clone, Default)]
pub struct OpenSshFactory;

impl ExecutorFactory for OpenSshFactory {
    fn open(&self, location: &NodeLocation, kind: &SessionKind) -> Arc<dyn RemoteExecutor> {
        Arc::new(OpenSshExecutor::new(location, kind))
    }
}
