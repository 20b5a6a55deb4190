//! SSH containers: provisioned by the parent onto another node.

use shipyard_core::{DEFAULT_NODE_PORT, OptionKey};

use crate::context::LifecycleContext;
use crate::error::ContainerResult;
use crate::format;
use crate::lifecycle::LifecycleState;
use crate::model::Container;

/// The `container-create-ssh` command for `container`.
pub fn create_command(container: &Container) -> String {
    let node = container.node();
    let options = container.options();

    let mut args = String::new();
    if node.port != DEFAULT_NODE_PORT {
        args.push_str(&format!(" --port {}", node.port));
    }
    args.push_str(&format::create_arguments(&options));
    if let Some(path) = options.first(OptionKey::WorkingDirectory) {
        args.push_str(&format!(" --path {path}"));
    }

    format!(
        "container-create-ssh --user {} --password {} --host {}{args} {}",
        node.username,
        node.password,
        node.host,
        container.name()
    )
}

pub(crate) async fn create(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let shell = container.shell(ctx)?;
    shell.execute_command(&create_command(container)).await?;
    container.transition(LifecycleState::Created)?;

    ctx.waiter
        .wait_for_provisioning(shell.as_ref(), container.name())
        .await?;
    container.transition(LifecycleState::Online)
}

/// Kill the container's process over its own node's shell.
pub(crate) async fn kill(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    container
        .node_executor(ctx)
        .execute_command_silently(&format!("pkill -9 -f containers/{}", container.name()))
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::testing::{context, host};

    #[test]
    fn test_create_command() {
        let root = Container::root("root").build();
        let ssh = Container::ssh("ssh-1")
            .parent(&root)
            .node(host("10.0.0.2").with_port(2222))
            .option(OptionKey::Env, "A=1")
            .option(OptionKey::Version, "1.1")
            .option(OptionKey::WorkingDirectory, "/opt/fuse")
            .build();

        assert_eq!(
            create_command(&ssh),
            "container-create-ssh --user fuse --password fuse --host 10.0.0.2 --port 2222 --env A=1 --version 1.1 --path /opt/fuse ssh-1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_through_parent() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let ssh = Container::ssh("ssh-1").parent(&root).node(host("10.0.0.2")).build();

        ssh.create(&ctx).await.unwrap();
        assert!(ssh.is_online());

        factory.script().on("container-list | grep ssh-1", "ssh-1 stopped");
        ssh.stop(&ctx).await.unwrap();
        factory.script().on("container-list | grep ssh-1", "ssh-1 success");
        ssh.start(&ctx).await.unwrap();
        ssh.destroy(&ctx).await.unwrap();

        let on_parent = factory.journal().commands_on("runtime:admin@10.0.0.1");
        for cmd in [
            "container-create-ssh --user fuse --password fuse --host 10.0.0.2 ssh-1",
            "container-stop ssh-1",
            "container-start ssh-1",
            "container-delete ssh-1",
        ] {
            assert!(on_parent.iter().any(|c| c == cmd), "missing {cmd}");
        }
        assert_eq!(ssh.state(), LifecycleState::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_on_own_node() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let ssh = Container::ssh("ssh-1").parent(&root).node(host("10.0.0.2")).build();
        ssh.create(&ctx).await.unwrap();

        ssh.kill(&ctx).await.unwrap();
        assert_eq!(
            factory.journal().commands_on("node:fuse@10.0.0.2"),
            ["pkill -9 -f containers/ssh-1"]
        );
        assert_eq!(ssh.state(), LifecycleState::Stopped);
    }
}
