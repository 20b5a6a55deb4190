//! Ensemble coordinator: forms and dissolves the coordination quorum
//! among a subset of the deployed containers.
//!
//! The first root in the member list coordinates; every other member is
//! added to (or removed from) the ensemble through its shell. Quorum logic
//! itself belongs to the remote fabric.

use std::sync::Arc;

use tracing::{debug, info};

use shipyard_container::{Container, LifecycleContext};

use crate::error::{DeployError, DeployResult};

/// Ensemble membership and whether it has been formed.
#[derive(Debug, Clone, Default)]
pub struct Ensemble {
    members: Vec<String>,
    formed: bool,
}

/// Members resolved against the deployment.
struct Roster {
    coordinator: Arc<Container>,
    members: Vec<Arc<Container>>,
    others: Vec<String>,
}

impl Ensemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append members, ignoring names already listed.
    pub fn add_members<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.members.contains(&name) {
                self.members.push(name);
            }
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_formed(&self) -> bool {
        self.formed
    }

    /// Every member is deployed and online.
    pub fn is_ready(&self, containers: &[Arc<Container>]) -> bool {
        !self.members.is_empty()
            && self
                .members
                .iter()
                .all(|name| find(containers, name).is_some_and(|c| c.is_online()))
    }

    /// Add the members to the coordinator's ensemble and wait for each of
    /// them to finish provisioning.
    pub async fn form(
        &mut self,
        containers: &[Arc<Container>],
        ctx: &LifecycleContext,
    ) -> DeployResult<()> {
        if self.members.is_empty() {
            return Ok(());
        }
        let roster = self.roster(containers)?;
        info!(
            coordinator = %roster.coordinator.name(),
            members = ?roster.others,
            "forming ensemble"
        );

        roster.coordinator.runtime_executor(ctx).reconnect().await?;
        if roster.others.is_empty() {
            debug!("coordinator is the only member, nothing to add");
        } else {
            roster
                .coordinator
                .execute_command(ctx, &format!("ensemble-add --force {}", roster.others.join(" ")))
                .await?;
        }

        for member in &roster.members {
            member.wait_for_provisioning(ctx).await?;
            member.set_in_ensemble(true);
        }
        self.formed = true;
        info!(size = roster.members.len(), "ensemble formed");
        Ok(())
    }

    /// Remove the members again. A no-op unless the ensemble was formed.
    pub async fn dissolve(
        &mut self,
        containers: &[Arc<Container>],
        ctx: &LifecycleContext,
    ) -> DeployResult<()> {
        if !self.formed || self.members.is_empty() {
            return Ok(());
        }
        let roster = self.roster(containers)?;
        if !roster.others.is_empty() {
            roster
                .coordinator
                .execute_command(
                    ctx,
                    &format!("ensemble-remove --force {}", roster.others.join(" ")),
                )
                .await?;
        }
        for member in &roster.members {
            member.set_in_ensemble(false);
        }
        self.formed = false;
        info!(coordinator = %roster.coordinator.name(), "ensemble dissolved");
        Ok(())
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Resolve every member before anything is sent to a remote host.
    fn roster(&self, containers: &[Arc<Container>]) -> DeployResult<Roster> {
        let mut coordinator = None;
        let mut members = Vec::with_capacity(self.members.len());
        let mut others = Vec::new();

        for name in &self.members {
            let container = find(containers, name)
                .cloned()
                .ok_or_else(|| DeployError::EnsembleMemberNotFound(name.clone()))?;
            if coordinator.is_none() && container.is_root() {
                coordinator = Some(container.clone());
            } else {
                others.push(name.clone());
            }
            members.push(container);
        }

        let coordinator = coordinator.ok_or(DeployError::NoEnsembleCoordinator)?;
        Ok(Roster {
            coordinator,
            members,
            others,
        })
    }
}

fn find<'a>(containers: &'a [Arc<Container>], name: &str) -> Option<&'a Arc<Container>> {
    containers.iter().find(|c| c.name() == name)
}
