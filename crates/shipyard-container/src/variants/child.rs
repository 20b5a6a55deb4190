//! Child containers: spawned by the parent on the parent's host.
//!
//! Start, stop and delete go through the parent's shell for SSH containers
//! as well, so those live here.

use crate::context::LifecycleContext;
use crate::error::ContainerResult;
use crate::format;
use crate::lifecycle::LifecycleState;
use crate::model::Container;

pub(crate) async fn create(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let parent = container.require_parent()?;
    let shell = container.shell(ctx)?;
    let args = format::create_arguments(&container.options());

    shell
        .execute_command(&format!(
            "container-create-child{args} {} {}",
            parent.name(),
            container.name()
        ))
        .await?;
    container.transition(LifecycleState::Created)?;

    ctx.waiter
        .wait_for_provisioning(shell.as_ref(), container.name())
        .await?;
    container.transition(LifecycleState::Online)
}

pub(crate) async fn destroy(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    container
        .shell(ctx)?
        .execute_command(&format!("container-delete {}", container.name()))
        .await?;
    Ok(())
}

pub(crate) async fn start(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let shell = container.shell(ctx)?;
    shell
        .execute_command(&format!("container-start {}", container.name()))
        .await?;
    ctx.waiter
        .wait_for_provisioning(shell.as_ref(), container.name())
        .await?;
    Ok(())
}

pub(crate) async fn stop(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    let shell = container.shell(ctx)?;
    shell
        .execute_command(&format!("container-stop {}", container.name()))
        .await?;
    ctx.waiter
        .wait_for_container_stop(shell.as_ref(), container.name())
        .await?;
    Ok(())
}

/// Kill the child's process from the parent's node.
pub(crate) async fn kill(container: &Container, ctx: &LifecycleContext) -> ContainerResult<()> {
    container
        .require_parent()?
        .node_executor(ctx)
        .execute_command_silently(&format!("pkill -9 -f containers/{}", container.name()))
        .await;
    Ok(())
}
