//! Remote execution port.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use shipyard_core::{Credentials, NodeLocation};

use crate::error::ExecResult;

/// Which shell a session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    /// The node's operating system shell (login from the `NodeLocation`).
    Node,
    /// The middleware's administrative shell listening on `port`.
    Runtime { port: u16, credentials: Credentials },
}

impl SessionKind {
    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Node => "node",
            SessionKind::Runtime { .. } => "runtime",
        }
    }
}

/// A session on a remote shell.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Human readable session target for logs.
    fn target(&self) -> &str;

    async fn connect(&self) -> ExecResult<()>;

    /// Whether the remote end currently accepts connections.
    async fn is_connected(&self) -> bool;

    async fn disconnect(&self);

    async fn reconnect(&self) -> ExecResult<()> {
        self.disconnect().await;
        self.connect().await
    }

    /// Run a command and return its output.
    async fn execute_command(&self, command: &str) -> ExecResult<String>;

    /// Run a command, swallowing failures into an empty output.
    async fn execute_command_silently(&self, command: &str) -> String {
        match self.execute_command(command).await {
            Ok(output) => output,
            Err(e) => {
                debug!(session = %self.target(), %command, error = %e, "silent command failed");
                String::new()
            }
        }
    }

    /// Run commands in order, stopping at the first failure.
    async fn execute_commands(&self, commands: &[String]) -> ExecResult<Vec<String>> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(self.execute_command(command).await?);
        }
        Ok(outputs)
    }
}

/// Opens sessions for a location. Opening never connects.
pub trait ExecutorFactory: Send + Sync {
    fn open(&self, location: &NodeLocation, kind: &SessionKind) -> Arc<dyn RemoteExecutor>;
}
