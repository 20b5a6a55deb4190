//! Lifecycle operations, dispatched on the container variant.

pub mod child;
pub mod join;
pub mod root;
pub mod ssh;

use tracing::{debug, error, info, warn};

use shipyard_core::ContainerKind;

use crate::context::LifecycleContext;
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::LifecycleState;
use crate::model::Container;

impl Container {
    /// Create the container remotely and wait until it is online.
    ///
    /// Already-created containers are skipped. A failure before any remote
    /// artifact exists returns the container to `NotCreated`.
    pub async fn create(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        if ctx.settings.suppress_start {
            debug!(container = %self.name(), "start suppressed, skipping create");
            return Ok(());
        }
        if self.is_created() {
            debug!(container = %self.name(), "already created");
            return Ok(());
        }
        if ctx.cancel.is_set() {
            return Err(ContainerError::Cancelled(self.name().to_string()));
        }
        if self.kind().needs_parent() {
            self.require_parent()?;
        }

        self.transition(LifecycleState::Creating)?;
        info!(container = %self.name(), kind = %self.kind(), host = %self.node().host, "creating container");

        let result = match self.kind() {
            ContainerKind::Root => root::create(self, ctx).await,
            ContainerKind::Child => child::create(self, ctx).await,
            ContainerKind::Ssh => ssh::create(self, ctx).await,
            ContainerKind::Join => join::create(self, ctx).await,
        };

        match &result {
            Ok(()) => info!(container = %self.name(), state = %self.state(), "container created"),
            Err(e) => {
                if self.state() == LifecycleState::Creating {
                    self.transition(LifecycleState::NotCreated)?;
                }
                error!(container = %self.name(), state = %self.state(), error = %e, "container creation failed");
            }
        }
        result
    }

    /// Remove the container from its host. Not-created containers are a no-op.
    pub async fn destroy(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        if ctx.settings.suppress_start || !self.is_created() {
            debug!(container = %self.name(), state = %self.state(), "nothing to destroy");
            return Ok(());
        }

        info!(container = %self.name(), "destroying container");
        match self.kind() {
            ContainerKind::Root => root::destroy(self, ctx).await?,
            ContainerKind::Child | ContainerKind::Ssh => child::destroy(self, ctx).await?,
            ContainerKind::Join => join::destroy(self, ctx).await?,
        }
        self.set_in_ensemble(false);
        self.transition(LifecycleState::Destroyed)
    }

    /// Start a created container. Starting an online container is a no-op.
    pub async fn start(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        match self.state() {
            LifecycleState::Online => return Ok(()),
            LifecycleState::Created | LifecycleState::Stopped => {}
            from => {
                return Err(ContainerError::InvalidTransition {
                    container: self.name().to_string(),
                    from,
                    to: LifecycleState::Online,
                });
            }
        }

        info!(container = %self.name(), "starting container");
        match self.kind() {
            ContainerKind::Root | ContainerKind::Join => root::start(self, ctx).await?,
            ContainerKind::Child | ContainerKind::Ssh => child::start(self, ctx).await?,
        }
        self.transition(LifecycleState::Online)
    }

    /// Stop a running container. Stopping a stopped container is a no-op.
    pub async fn stop(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        match self.state() {
            LifecycleState::Stopped => return Ok(()),
            LifecycleState::Created | LifecycleState::Online => {}
            from => {
                return Err(ContainerError::InvalidTransition {
                    container: self.name().to_string(),
                    from,
                    to: LifecycleState::Stopped,
                });
            }
        }

        info!(container = %self.name(), "stopping container");
        match self.kind() {
            ContainerKind::Root | ContainerKind::Join => root::stop(self, ctx).await?,
            ContainerKind::Child | ContainerKind::Ssh => child::stop(self, ctx).await?,
        }
        self.transition(LifecycleState::Stopped)
    }

    /// Stop then start. A failed start leaves the container `Stopped`.
    pub async fn restart(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        self.stop(ctx).await?;
        self.start(ctx).await
    }

    /// Forcibly terminate the container's process, bypassing the state
    /// machine. Recovery and failure-injection tool.
    pub async fn kill(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        warn!(container = %self.name(), "killing container");
        match self.kind() {
            ContainerKind::Root => root::kill(self, ctx).await?,
            ContainerKind::Child => child::kill(self, ctx).await?,
            ContainerKind::Ssh => ssh::kill(self, ctx).await?,
            ContainerKind::Join => join::kill(self, ctx).await?,
        }
        if self.is_created() {
            self.force_state(LifecycleState::Stopped);
        }
        Ok(())
    }

    /// Run a command in this container's middleware shell.
    pub async fn execute_command(
        &self,
        ctx: &LifecycleContext,
        command: &str,
    ) -> ContainerResult<String> {
        let output = match self.kind() {
            ContainerKind::Root | ContainerKind::Join => {
                self.runtime_executor(ctx).execute_command(command).await?
            }
            ContainerKind::Child | ContainerKind::Ssh => {
                self.shell(ctx)?
                    .execute_command(&format!("container-connect {} {command}", self.name()))
                    .await?
            }
        };
        Ok(output)
    }

    /// Run commands in order, stopping at the first failure.
    pub async fn execute_commands(
        &self,
        ctx: &LifecycleContext,
        commands: &[String],
    ) -> ContainerResult<Vec<String>> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(self.execute_command(ctx, command).await?);
        }
        Ok(outputs)
    }

    /// Run a command in the OS shell of this container's node.
    pub async fn execute_node_command(
        &self,
        ctx: &LifecycleContext,
        command: &str,
    ) -> ContainerResult<String> {
        Ok(self.node_executor(ctx).execute_command(command).await?)
    }

    pub async fn wait_for_provisioning(&self, ctx: &LifecycleContext) -> ContainerResult<()> {
        self.wait_for_provision_status(ctx, "success").await
    }

    pub async fn wait_for_provision_status(
        &self,
        ctx: &LifecycleContext,
        status: &str,
    ) -> ContainerResult<()> {
        let shell = self.shell(ctx)?;
        ctx.waiter
            .wait_for_provision_status(shell.as_ref(), self.name(), status)
            .await?;
        Ok(())
    }

    /// Wait for a patch to be reported installed in this container's shell.
    pub async fn wait_for_patch(&self, ctx: &LifecycleContext, patch: &str) -> ContainerResult<()> {
        let shell = self.shell(ctx)?;
        ctx.waiter.wait_for_patch(shell.as_ref(), patch).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use shipyard_core::{NodeLocation, Settings};
    use shipyard_exec::{MockExecutorFactory, WaitPolicy, Waiter};

    use crate::artifact::UrlArtifactProvider;
    use crate::context::LifecycleContext;

    /// A context over a healthy mock fleet with fast waits.
    pub fn context() -> (LifecycleContext, MockExecutorFactory) {
        let factory = MockExecutorFactory::new();
        let policy = WaitPolicy::new(Duration::from_secs(1), Duration::from_secs(5));
        let ctx = LifecycleContext::new(Arc::new(factory.clone()), Settings::default())
            .with_waiter(
                Waiter::default()
                    .with_boot(policy)
                    .with_shutdown(policy)
                    .with_provision(policy)
                    .with_patch(policy),
            )
            .with_artifacts(Arc::new(UrlArtifactProvider::new(Some(
                "http://repo/jboss-fuse-6.3.0.zip".to_string(),
            ))));
        (ctx, factory)
    }

    pub fn host(name: &str) -> NodeLocation {
        NodeLocation::new(name, "fuse", "fuse")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{context, host};
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_create_is_idempotent() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();

        root.create(&ctx).await.unwrap();
        let issued = factory.journal().commands().len();
        root.create(&ctx).await.unwrap();

        assert!(root.is_online());
        assert_eq!(factory.journal().commands().len(), issued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_parent() {
        let (ctx, factory) = context();
        let child = Container::child("c").parent_name("root").build();
        let err = child.create(&ctx).await.unwrap_err();
        assert!(matches!(err, ContainerError::MissingParent(_)));
        assert!(factory.journal().commands().is_empty());
        assert_eq!(child.state(), LifecycleState::Unresolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_create_issues_nothing() {
        let (ctx, factory) = context();
        ctx.cancel.set();
        let root = Container::root("root").build();
        assert!(matches!(root.create(&ctx).await, Err(ContainerError::Cancelled(_))));
        assert!(factory.journal().commands().is_empty());
        assert_eq!(root.state(), LifecycleState::NotCreated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppress_start() {
        let (mut ctx, factory) = context();
        let mut settings = (*ctx.settings).clone();
        settings.suppress_start = true;
        ctx.settings = Arc::new(settings);

        let root = Container::root("root").build();
        root.create(&ctx).await.unwrap();
        root.destroy(&ctx).await.unwrap();
        assert!(factory.journal().commands().is_empty());
        assert_eq!(root.state(), LifecycleState::NotCreated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_not_created_is_noop() {
        let (ctx, factory) = context();
        let root = Container::root("root").build();
        root.destroy(&ctx).await.unwrap();
        assert!(factory.journal().commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_destroy_fails() {
        let (ctx, _factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        root.create(&ctx).await.unwrap();
        root.destroy(&ctx).await.unwrap();

        let err = root.start(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ContainerError::InvalidTransition { from: LifecycleState::Destroyed, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_failure_leaves_stopped() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let child = Container::child("c").parent(&root).build();
        root.create(&ctx).await.unwrap();
        child.create(&ctx).await.unwrap();

        factory.script().on("container-list | grep c", "c  stopped");
        factory.script().fail_on("container-start c", "container not found");
        assert!(child.restart(&ctx).await.is_err());
        assert_eq!(child.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_forces_stopped() {
        let (ctx, _factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        root.create(&ctx).await.unwrap();
        root.kill(&ctx).await.unwrap();
        assert_eq!(root.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_command_routing() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let child = Container::child("c").parent(&root).build();

        root.execute_command(&ctx, "profile-list").await.unwrap();
        child.execute_command(&ctx, "osgi:list").await.unwrap();

        let journal = factory.journal();
        assert!(journal.contains("profile-list"));
        assert!(journal.contains("container-connect c osgi:list"));
        assert_eq!(journal.commands_on("runtime:admin@10.0.0.1").len(), 2);
    }
}
