//! Join containers: installed like a root, then joined to the parent's
//! fabric.
//!
//! Several join containers may share one node. Each one after the first
//! takes a port offset from the counter of the container it shares the
//! node with, and every well-known port is shifted by that offset.

use tracing::{info, warn};

use shipyard_core::{DEFAULT_RUNTIME_PORT, OptionKey};
use shipyard_exec::RemoteExecutor;

use crate::artifact;
use crate::context::LifecycleContext;
use crate::error::{ContainerError, ContainerResult};
use crate::format;
use crate::lifecycle::LifecycleState;
use crate::model::Container;
use crate::mutator::PropertyEdit;
use crate::variants::root;

pub const ACTIVEMQ_PORT: u32 = 61616;
pub const HTTP_PORT: u32 = 8181;
pub const RMI_REGISTRY_PORT: u32 = 1099;
pub const RMI_SERVER_PORT: u32 = 44444;

const SYSTEM_PROPERTIES: &str = "etc/system.properties";
const PAX_WEB_CFG: &str = "etc/org.ops4j.pax.web.cfg";
const SHELL_CFG: &str = "etc/org.apache.karaf.shell.cfg";
const MANAGEMENT_CFG: &str = "etc/org.apache.karaf.management.cfg";

const ZOOKEEPER_URI_MARKER: &str = "ZooKeeper URI:";

/// Configuration edits shifting every well-known port by `offset`.
pub fn port_edits(offset: u32) -> Vec<PropertyEdit> {
    let ssh_port = u32::from(DEFAULT_RUNTIME_PORT) + offset;
    vec![
        PropertyEdit::new(SYSTEM_PROPERTIES, "activemq.port", ACTIVEMQ_PORT + offset),
        PropertyEdit::new(SYSTEM_PROPERTIES, "org.osgi.service.http.port", HTTP_PORT + offset),
        PropertyEdit::new(PAX_WEB_CFG, "org.osgi.service.http.port", HTTP_PORT + offset),
        PropertyEdit::new(SHELL_CFG, "sshPort", ssh_port),
        PropertyEdit::new(MANAGEMENT_CFG, "rmiRegistryPort", RMI_REGISTRY_PORT + offset),
        PropertyEdit::new(MANAGEMENT_CFG, "rmiServerPort", RMI_SERVER_PORT + offset),
    ]
}

/// Workspace of the join container: `<working dir>containers/<name>`.
pub fn workspace_dir(container: &Container) -> String {
    format!(
        "{}containers/{}",
        container.options().string(OptionKey::WorkingDirectory),
        container.name()
    )
}

/// Extract the coordination connection string from `fabric:info` output.
pub fn parse_zookeeper_uri(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.split_once(ZOOKEEPER_URI_MARKER))
        .map(|(_, uri)| uri.trim().to_string())
        .filter(|uri| !uri.is_empty())
}

pub(crate) async fn create(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let parent = container.require_parent()?;
    // Nothing is installed yet, so there is nothing to clean up.
    let offset = allocate_port_offset(container).inspect_err(|e| {
        ctx.cancel.set();
        warn!(container = %container.name(), error = %e, "join failed before install");
    })?;
    let extra = if offset > 0 {
        let port = u16::try_from(u32::from(DEFAULT_RUNTIME_PORT) + offset).unwrap_or(u16::MAX);
        container.set_runtime_port(port);
        port_edits(offset)
    } else {
        Vec::new()
    };

    let node = container.node_executor(ctx);
    let dir = workspace_dir(container);
    info!(container = %container.name(), %dir, offset, "creating join container");

    match install_and_join(container, &parent, ctx, node.as_ref(), &dir, offset, &extra).await {
        Ok(()) => Ok(()),
        Err(e) => {
            ctx.cancel.set();
            warn!(container = %container.name(), error = %e, "join failed, cleaning up");
            clean(node.as_ref(), &dir).await;
            if container.is_created() {
                container.force_state(LifecycleState::NotCreated);
            }
            container.set_home(None);
            Err(e)
        }
    }
}

async fn install_and_join(
    container: &Container,
    parent: &Container,
    ctx: &LifecycleContext,
    node: &dyn RemoteExecutor,
    dir: &str,
    offset: u32,
    extra: &[PropertyEdit],
) -> ContainerResult<()> {
    let host = container.node().host;

    clean(node, dir).await;
    // A shared node already runs the instance this one was offset from.
    if offset == 0 {
        root::ensure_no_running_instance(node, &host).await?;
    }
    node.execute_command(&format!("mkdir -p {dir}")).await?;
    let archive = ctx.artifacts.stage(node, dir).await?;
    let home = artifact::unpack(node, &archive, dir).await?;
    container.set_home(Some(home.clone()));
    container.transition(LifecycleState::Created)?;

    ctx.mutators.apply(node, &host, &home, extra).await?;
    node.execute_command(&format!("{home}/bin/start")).await?;
    let shell = container.runtime_executor(ctx);
    ctx.waiter.wait_for_boot(shell.as_ref()).await?;

    let info = parent.shell(ctx)?.execute_command("fabric:info").await?;
    let zookeeper = parse_zookeeper_uri(&info).ok_or_else(|| ContainerError::UnexpectedOutput {
        command: "fabric:info".to_string(),
        output: info.clone(),
    })?;

    let default_password = container.credentials().password;
    let args = format::join_arguments(&container.options(), &default_password);
    shell.connect().await?;
    shell
        .execute_command(&format!("fabric:join{args} {zookeeper}"))
        .await?;
    ctx.waiter
        .wait_for_provisioning(shell.as_ref(), container.name())
        .await?;
    container.transition(LifecycleState::Online)
}

pub(crate) async fn destroy(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let node = container.node_executor(ctx);
    if container.is_online() {
        root::stop(container, ctx).await?;
    }
    clean(node.as_ref(), &workspace_dir(container)).await;
    container.set_home(None);
    Ok(())
}

pub(crate) async fn kill(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    container
        .node_executor(ctx)
        .execute_command_silently(&format!("pkill -9 -f {}", workspace_dir(container)))
        .await;
    Ok(())
}

// ── Internal helpers ────────────────────────────────────────────────

fn allocate_port_offset(container: &Container) -> ContainerResult<u32> {
    let Some(target) = container.same_node_as() else {
        return Ok(0);
    };
    let linked = container
        .same_node_target()
        .ok_or_else(|| ContainerError::SameNodeUnlinked {
            container: container.name().to_string(),
            target: target.clone(),
        })?;
    Ok(linked.next_port_offset())
}

async fn clean(node: &dyn RemoteExecutor, dir: &str) {
    node.execute_command_silently(&format!("pkill -9 -f {dir}"))
        .await;
    node.execute_command_silently(&format!("rm -rf {dir}")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::testing::{context, host};
    use shipyard_exec::ExecError;

    #[test]
    fn test_port_edits() {
        let edits = port_edits(2);
        let find = |file: &str, key: &str| {
            edits
                .iter()
                .find(|e| e.file == file && e.key == key)
                .map(|e| e.value.clone())
        };
        assert_eq!(find(SYSTEM_PROPERTIES, "activemq.port").as_deref(), Some("61618"));
        assert_eq!(find(PAX_WEB_CFG, "org.osgi.service.http.port").as_deref(), Some("8183"));
        assert_eq!(find(SHELL_CFG, "sshPort").as_deref(), Some("8103"));
        assert_eq!(find(MANAGEMENT_CFG, "rmiRegistryPort").as_deref(), Some("1101"));
        assert_eq!(find(MANAGEMENT_CFG, "rmiServerPort").as_deref(), Some("44446"));
    }

    #[test]
    fn test_parse_zookeeper_uri() {
        let info = "Fabric Release: 1.2.0\nZooKeeper URI:     10.0.0.1:2181\nMaven Upload URI: x\n";
        assert_eq!(parse_zookeeper_uri(info).as_deref(), Some("10.0.0.1:2181"));
        assert_eq!(parse_zookeeper_uri("Fabric Release: 1.2.0\n"), None);
        assert_eq!(parse_zookeeper_uri("ZooKeeper URI:\n"), None);
    }

    #[test]
    fn test_workspace_dir() {
        let join = Container::join("win-1")
            .option(OptionKey::WorkingDirectory, "/cygdrive/c/fuse/")
            .build();
        assert_eq!(workspace_dir(&join), "/cygdrive/c/fuse/containers/win-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_joins_parent_fabric() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let join = Container::join("win-1")
            .parent(&root)
            .node(host("10.0.0.5"))
            .option(OptionKey::Profile, "default")
            .build();

        join.create(&ctx).await.unwrap();
        assert!(join.is_online());
        assert_eq!(join.runtime_port(), DEFAULT_RUNTIME_PORT);

        let journal = factory.journal();
        let info = journal.position("fabric:info").unwrap();
        let joined = journal
            .position("fabric:join --zookeeper-password admin --profile default 10.0.0.1:2181")
            .unwrap();
        assert!(journal.position("mkdir -p containers/win-1").unwrap() < journal.position("bin/start").unwrap());
        assert!(journal.position("bin/start").unwrap() < info);
        assert!(info < joined);
        assert!(joined < journal.last_position("container-list | grep win-1").unwrap());
        assert!(journal.contains("ps aux | grep karaf.base"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_node_offsets_ports() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let first = Container::join("win-1").parent(&root).node(host("10.0.0.5")).build();
        let second = Container::join("win-2")
            .parent(&root)
            .node(host("10.0.0.5"))
            .option(OptionKey::SameNodeAs, "win-1")
            .build();
        second.link_same_node(&first);

        first.create(&ctx).await.unwrap();
        second.create(&ctx).await.unwrap();

        assert_eq!(second.runtime_port(), 8102);
        assert_eq!(first.port_offsets_issued(), 1);
        let journal = factory.journal();
        assert!(journal.contains("activemq.port=61617"));
        assert!(journal.contains("sshPort=8102"));
        // The second install skips the running-instance check.
        assert_eq!(journal.count("ps aux | grep karaf.base"), 1);
        assert!(factory.opened().contains(&"runtime:admin@10.0.0.5:8102".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlinked_same_node_target() {
        let (ctx, factory) = context();
        let root = Container::root("root").build();
        let join = Container::join("win-2")
            .parent(&root)
            .option(OptionKey::SameNodeAs, "win-1")
            .build();

        let err = join.create(&ctx).await.unwrap_err();
        assert!(matches!(err, ContainerError::SameNodeUnlinked { .. }));
        assert!(factory.journal().commands().is_empty());
        assert!(ctx.cancel.is_set());
        assert_eq!(join.state(), LifecycleState::NotCreated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cancels_and_cleans() {
        let (ctx, factory) = context();
        factory.script().fail_on("fabric:join", "authentication failed");
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let join = Container::join("win-1").parent(&root).node(host("10.0.0.5")).build();

        let err = join.create(&ctx).await.unwrap_err();
        assert!(matches!(err, ContainerError::Exec(ExecError::Command { .. })));
        assert!(ctx.cancel.is_set());
        assert_eq!(join.state(), LifecycleState::NotCreated);

        let journal = factory.journal();
        let failed = journal.position("fabric:join").unwrap();
        assert!(journal.last_position("rm -rf containers/win-1").unwrap() > failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_zookeeper_uri() {
        let (ctx, factory) = context();
        factory.script().on("fabric:info", "Fabric Release: 1.2.0\n");
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let join = Container::join("win-1").parent(&root).node(host("10.0.0.5")).build();

        let err = join.create(&ctx).await.unwrap_err();
        assert!(matches!(err, ContainerError::UnexpectedOutput { .. }));
        assert!(!factory.journal().contains("fabric:join"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_removes_workspace() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        let join = Container::join("win-1").parent(&root).node(host("10.0.0.5")).build();
        join.create(&ctx).await.unwrap();
        join.destroy(&ctx).await.unwrap();

        let journal = factory.journal();
        assert!(journal.last_position("rm -rf containers/win-1").unwrap() > journal.position("bin/stop").unwrap());
        assert_eq!(join.state(), LifecycleState::Destroyed);
    }
}
