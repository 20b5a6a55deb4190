//! Root containers: installed directly on a node.

use tracing::{debug, info};

use shipyard_core::OptionKey;
use shipyard_exec::RemoteExecutor;

use crate::artifact;
use crate::context::LifecycleContext;
use crate::error::{ContainerError, ContainerResult};
use crate::format;
use crate::lifecycle::LifecycleState;
use crate::model::Container;

/// Matches the command line of every running middleware instance.
const PROCESS_MARKER: &str = "karaf.base";

/// Install directory: `<working dir>/<base dir>`, or the base dir alone.
pub fn install_dir(container: &Container, ctx: &LifecycleContext) -> String {
    let base = &ctx.settings.base_dir;
    match container.options().first(OptionKey::WorkingDirectory) {
        Some(wd) => format!("{}/{base}", wd.trim_end_matches('/')),
        None => base.clone(),
    }
}

pub(crate) async fn create(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let node = container.node_executor(ctx);
    let shell = container.runtime_executor(ctx);
    let host = container.node().host;
    let dir = install_dir(container, ctx);

    debug!(container = %container.name(), %dir, "cleaning install directory");
    node.execute_command_silently(&format!("pkill -9 -f {PROCESS_MARKER}"))
        .await;
    node.execute_command(&format!("rm -rf {dir}")).await?;
    ensure_no_running_instance(node.as_ref(), &host).await?;

    node.execute_command(&format!("mkdir -p {dir}")).await?;
    let archive = ctx.artifacts.stage(node.as_ref(), &dir).await?;
    let home = artifact::unpack(node.as_ref(), &archive, &dir).await?;
    container.set_home(Some(home.clone()));
    container.transition(LifecycleState::Created)?;

    ctx.mutators.apply(node.as_ref(), &host, &home, &[]).await?;
    node.execute_command(&format!("{home}/bin/start")).await?;
    ctx.waiter.wait_for_boot(shell.as_ref()).await?;

    if container.fabric() {
        let args = format::fabric_create_arguments(&container.options());
        info!(container = %container.name(), "creating fabric");
        shell.execute_command(&format!("fabric:create{args}")).await?;
        ctx.waiter
            .wait_for_provisioning(shell.as_ref(), container.name())
            .await?;
        shell.reconnect().await?;
    }

    run_startup(container, shell.as_ref(), ctx).await?;
    container.transition(LifecycleState::Online)
}

pub(crate) async fn destroy(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let node = container.node_executor(ctx);
    let dir = install_dir(container, ctx);

    if container.is_online() {
        stop(container, ctx).await?;
    } else {
        node.execute_command_silently(&format!("pkill -9 -f {PROCESS_MARKER}"))
            .await;
    }
    node.execute_command(&format!("rm -rf {dir}")).await?;
    ctx.mutators.clear();
    container.set_home(None);
    Ok(())
}

pub(crate) async fn start(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let home = home(container)?;
    container
        .node_executor(ctx)
        .execute_command(&format!("{home}/bin/start"))
        .await?;
    ctx.waiter
        .wait_for_boot(container.runtime_executor(ctx).as_ref())
        .await?;
    Ok(())
}

pub(crate) async fn stop(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let home = home(container)?;
    container
        .node_executor(ctx)
        .execute_command(&format!("{home}/bin/stop"))
        .await?;
    ctx.waiter
        .wait_for_shutdown(container.runtime_executor(ctx).as_ref())
        .await?;
    Ok(())
}

pub(crate) async fn kill(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    container
        .node_executor(ctx)
        .execute_command_silently(&format!("pkill -9 -f {PROCESS_MARKER}"))
        .await;
    Ok(())
}

/// Fail if any middleware instance is still running on the node.
pub(crate) async fn ensure_no_running_instance(
    node: &dyn RemoteExecutor,
    host: &str,
) -> ContainerResult<()> {
    let running = node
        .execute_command_silently(&format!("ps aux | grep {PROCESS_MARKER} | grep -v grep"))
        .await;
    if running.trim().is_empty() {
        Ok(())
    } else {
        Err(ContainerError::PortInUse {
            host: host.to_string(),
            detail: running.lines().next().unwrap_or_default().trim().to_string(),
        })
    }
}

/// Startup commands, then bundle installs. With a fabric, wait for the
/// root to settle afterwards.
async fn run_startup(
    container: &Container,
    shell: &dyn RemoteExecutor,
    ctx: &LifecycleContext,
) -> ContainerResult<()> {
    let options = container.options();
    let commands = options.values(OptionKey::Commands);
    let bundles = options.values(OptionKey::Bundles);

    for command in commands {
        debug!(container = %container.name(), %command, "startup command");
        shell.execute_command(command).await?;
    }
    for bundle in bundles {
        debug!(container = %container.name(), %bundle, "installing bundle");
        shell
            .execute_command(&format!("osgi:install -s {bundle}"))
            .await?;
    }

    if container.fabric() && !(commands.is_empty() && bundles.is_empty()) {
        ctx.waiter
            .wait_for_provisioning(shell, container.name())
            .await?;
    }
    Ok(())
}

fn home(container: &Container) -> ContainerResult<String> {
    container
        .home()
        .ok_or_else(|| ContainerError::NotInstalled(container.name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::testing::{context, host};

    #[tokio::test(start_paused = true)]
    async fn test_create_sequence() {
        let (ctx, factory) = context();
        let root = Container::root("root")
            .node(host("10.0.0.1"))
            .option(OptionKey::Profile, "gateway")
            .option(OptionKey::Commands, "profile-edit --feature camel default")
            .option(OptionKey::Bundles, "mvn:org.example/app/1.0")
            .build();

        root.create(&ctx).await.unwrap();
        assert!(root.is_online());
        assert_eq!(root.home().as_deref(), Some("/home/fuse/shipyard/jboss-fuse-6.3.0"));

        let journal = factory.journal();
        let order = [
            "pkill -9 -f karaf.base",
            "rm -rf shipyard",
            "ps aux | grep karaf.base",
            "mkdir -p shipyard",
            "curl -sSfL -o shipyard/jboss-fuse-6.3.0.zip",
            "unzip -q -o shipyard/jboss-fuse-6.3.0.zip -d shipyard",
            "jboss-fuse-6.3.0/bin/start",
            "fabric:create --profile gateway",
            "container-list | grep root",
            "profile-edit --feature camel default",
            "osgi:install -s mvn:org.example/app/1.0",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|cmd| journal.position(cmd).unwrap_or_else(|| panic!("missing {cmd}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        // Provisioning is awaited again after the startup work.
        assert!(journal.last_position("container-list | grep root").unwrap() > positions[10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_fabric() {
        let (ctx, factory) = context();
        let root = Container::root("standalone").fabric(false).build();
        root.create(&ctx).await.unwrap();
        assert!(!factory.journal().contains("fabric:create"));
        assert!(root.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_instance_blocks_create() {
        let (ctx, factory) = context();
        factory
            .script()
            .on("ps aux", "fuse 4242 java -Dkaraf.base=/opt/other");
        let root = Container::root("root").node(host("10.0.0.1")).build();

        let err = root.create(&ctx).await.unwrap_err();
        assert!(matches!(err, ContainerError::PortInUse { ref host, .. } if host == "10.0.0.1"));
        assert_eq!(root.state(), LifecycleState::NotCreated);
        assert!(!factory.journal().contains("mkdir"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_timeout_leaves_created() {
        let (ctx, factory) = context();
        factory.script().set_unreachable("runtime:", true);
        let root = Container::root("root").node(host("10.0.0.1")).build();

        let err = root.create(&ctx).await.unwrap_err();
        assert!(matches!(err, ContainerError::Wait(_)));
        assert_eq!(root.state(), LifecycleState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_working_directory() {
        let (ctx, _factory) = context();
        let root = Container::root("root")
            .option(OptionKey::WorkingDirectory, "/opt/test/")
            .build();
        assert_eq!(install_dir(&root, &ctx), "/opt/test/shipyard");
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_and_cleans() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        root.create(&ctx).await.unwrap();
        root.destroy(&ctx).await.unwrap();

        let journal = factory.journal();
        let stop = journal.position("bin/stop").unwrap();
        let removed = journal.last_position("rm -rf shipyard").unwrap();
        assert!(stop < removed);
        assert_eq!(root.state(), LifecycleState::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_start_cycle() {
        let (ctx, factory) = context();
        let root = Container::root("root").node(host("10.0.0.1")).build();
        root.create(&ctx).await.unwrap();

        root.stop(&ctx).await.unwrap();
        assert_eq!(root.state(), LifecycleState::Stopped);
        root.start(&ctx).await.unwrap();
        assert!(root.is_online());
        assert_eq!(factory.journal().count("bin/start"), 2);
    }
}
