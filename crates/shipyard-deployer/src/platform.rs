//! Platform detection and topology rewrite.
//!
//! SSH containers cannot be provisioned onto Windows hosts. Before
//! creation, every pending SSH container's node is probed with `uname`;
//! Cygwin and MinGW shells get the container rewritten in place to a join
//! container with the same identity.

use std::sync::Arc;

use tracing::{debug, info};

use shipyard_container::{Container, ContainerBuilder, LifecycleContext};
use shipyard_core::ContainerKind;

use crate::error::DeployResult;

/// Whether `uname` output comes from a Windows POSIX layer.
pub fn is_windows_shell(uname: &str) -> bool {
    let os = uname.to_ascii_lowercase();
    os.contains("cyg") || os.contains("mingw")
}

/// Probe pending SSH containers and replace those on Windows hosts with
/// join containers at the same index. Returns the rewritten names.
pub async fn rewrite_windows_hosts(
    containers: &mut [Arc<Container>],
    ctx: &LifecycleContext,
) -> DeployResult<Vec<String>> {
    let mut rewritten = Vec::new();

    for index in 0..containers.len() {
        let ssh = containers[index].clone();
        if ssh.kind() != ContainerKind::Ssh || ssh.is_created() {
            continue;
        }

        let node = ssh.node_executor(ctx);
        node.connect().await?;
        let os = node.execute_command_silently("uname").await;
        if !is_windows_shell(&os) {
            debug!(container = %ssh.name(), os = %os.trim(), "ssh host is not windows");
            continue;
        }

        info!(container = %ssh.name(), os = %os.trim(), "windows host detected, converting to join container");
        let join = ContainerBuilder::from_existing(&ssh)
            .kind(ContainerKind::Join)
            .build();
        join.set_replaced(ssh.snapshot());
        ssh.set_replaced_by(join.name());

        for child in containers
            .iter()
            .filter(|c| c.kind().needs_parent() && c.parent_name().as_deref() == Some(ssh.name()))
        {
            child.set_parent(&join);
        }
        containers[index] = join;
        rewritten.push(ssh.name().to_string());
    }

    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, host};
    use shipyard_core::OptionKey;

    #[test]
    fn test_windows_detection() {
        assert!(is_windows_shell("CYGWIN_NT-10.0"));
        assert!(is_windows_shell("MINGW64_NT-10.0-19045"));
        assert!(!is_windows_shell("Linux"));
        assert!(!is_windows_shell(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_preserves_index_and_children() {
        let (ctx, factory) = context();
        factory
            .script()
            .on_target("node:fuse@10.0.0.9", "uname", "CYGWIN_NT-10.0");

        let root = Container::root("root").node(host("10.0.0.1")).build();
        let linux = Container::ssh("ssh-linux").parent(&root).node(host("10.0.0.2")).build();
        let win = Container::ssh("ssh-win")
            .parent(&root)
            .node(host("10.0.0.9"))
            .option(OptionKey::Profile, "gateway")
            .build();
        let child = Container::child("nested").parent(&win).build();
        let mut containers = vec![root, linux, win.clone(), child.clone()];

        let rewritten = rewrite_windows_hosts(&mut containers, &ctx).await.unwrap();
        assert_eq!(rewritten, ["ssh-win"]);

        let join = &containers[2];
        assert_eq!(join.kind(), ContainerKind::Join);
        assert_eq!(join.name(), "ssh-win");
        assert_eq!(join.node().host, "10.0.0.9");
        assert_eq!(join.options().values(OptionKey::Profile), ["gateway"]);
        assert_eq!(join.parent_name().as_deref(), Some("root"));
        assert_eq!(join.replaced().map(|s| s.kind), Some(ContainerKind::Ssh));
        assert_eq!(win.replaced_by().as_deref(), Some("ssh-win"));

        assert!(Arc::ptr_eq(&child.parent().unwrap(), join));
        assert_eq!(containers[1].kind(), ContainerKind::Ssh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_containers_are_not_probed() {
        let (ctx, factory) = context();
        let root = Container::root("root").build();
        let ssh = Container::ssh("ssh-1").parent(&root).build();
        ssh.force_state(shipyard_container::LifecycleState::Online);
        let mut containers = vec![root, ssh];

        let rewritten = rewrite_windows_hosts(&mut containers, &ctx).await.unwrap();
        assert!(rewritten.is_empty());
        assert!(!factory.journal().contains("uname"));
    }
}
