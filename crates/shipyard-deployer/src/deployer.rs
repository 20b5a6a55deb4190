//! Deployer: creates and tears down the deployment collection.
//!
//! The `Deployer` is the orchestration loop that:
//! - Registers containers and resolves their parents by name
//! - Detects Windows hosts and rewrites the topology before creation
//! - Runs creations concurrently (bounded pool) or serially
//! - Forms the ensemble and tears everything down in reverse order

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use shipyard_container::{
    Container, ContainerBuilder, ContainerError, ContainerSnapshot, LifecycleContext,
    LifecycleState,
};
use shipyard_core::{DeployConfig, OptionKey};
use shipyard_exec::ExecutorFactory;

use crate::ensemble::Ensemble;
use crate::error::{DeployError, DeployResult, TeardownReport};
use crate::platform;
use crate::registry::{self, TaskRegistry, TaskStatus};

/// Name of the root injected when nothing is declared.
pub const DEFAULT_ROOT_NAME: &str = "root";

/// What `deploy` would do, in creation order.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    /// Containers grouped by dependency depth; each batch only depends on
    /// earlier ones.
    pub batches: Vec<Vec<String>>,
    pub ensemble: Vec<String>,
    pub containers: Vec<ContainerSnapshot>,
}

/// Orchestrates the deployment collection.
pub struct Deployer {
    /// Deployment collection in registration order.
    containers: Vec<Arc<Container>>,
    ensemble: Ensemble,
    ctx: LifecycleContext,
    /// Default bundles and commands have been handed to the first root.
    defaults_applied: bool,
}

impl Deployer {
    /// Create an empty deployer over `ctx`.
    pub fn new(ctx: LifecycleContext) -> Self {
        Self {
            containers: Vec::new(),
            ensemble: Ensemble::new(),
            ctx,
            defaults_applied: false,
        }
    }

    /// Build a deployer from a deployment file.
    pub fn from_config(
        config: &DeployConfig,
        executors: Arc<dyn ExecutorFactory>,
    ) -> DeployResult<Self> {
        let ctx = LifecycleContext::new(executors, config.settings.clone());
        let mut deployer = Self::new(ctx);
        for declared in &config.containers {
            let container = ContainerBuilder::from_config(declared, &config.settings).build();
            deployer.register(container)?;
        }
        deployer.add_ensemble_members(config.ensemble.iter().cloned());
        Ok(deployer)
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.ctx
    }

    pub fn containers(&self) -> &[Arc<Container>] {
        &self.containers
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// Append a container to the deployment.
    pub fn register(&mut self, container: Arc<Container>) -> DeployResult<()> {
        if self.find(container.name()).is_some() {
            return Err(DeployError::DuplicateName(container.name().to_string()));
        }
        debug!(container = %container.name(), kind = %container.kind(), "container registered");
        self.containers.push(container);
        Ok(())
    }

    pub fn add_ensemble_members<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensemble.add_members(names);
    }

    // ── Lookups ─────────────────────────────────────────────────────

    pub fn container(&self, name: &str) -> Option<&Arc<Container>> {
        self.find(name)
    }

    /// Names of every container whose name contains `filter`.
    pub fn containers_by_substring(&self, filter: &str) -> DeployResult<Vec<String>> {
        let names: Vec<String> = self
            .containers
            .iter()
            .filter(|c| c.name().contains(filter))
            .map(|c| c.name().to_string())
            .collect();
        if names.is_empty() {
            return Err(DeployError::NoMatchingContainers(filter.to_string()));
        }
        Ok(names)
    }

    /// Containers whose parent is `name`.
    pub fn children_of(&self, name: &str) -> Vec<Arc<Container>> {
        self.containers
            .iter()
            .filter(|c| c.kind().needs_parent() && c.parent_name().as_deref() == Some(name))
            .cloned()
            .collect()
    }

    /// The first root in the deployment.
    pub fn root(&self) -> DeployResult<&Arc<Container>> {
        self.containers
            .iter()
            .find(|c| c.is_root())
            .ok_or(DeployError::NoRoot)
    }

    /// Run a command in a container's middleware shell.
    pub async fn execute_command(&self, name: &str, command: &str) -> DeployResult<String> {
        let container = self
            .find(name)
            .ok_or_else(|| DeployError::UnknownContainer(name.to_string()))?;
        Ok(container.execute_command(&self.ctx, command).await?)
    }

    // ── Planning ────────────────────────────────────────────────────

    /// Group containers into batches by dependency depth. A container
    /// depends on its parent and on the container it shares a node with.
    pub fn creation_plan(&self) -> DeployResult<Vec<Vec<String>>> {
        let names: HashSet<&str> = self.containers.iter().map(|c| c.name()).collect();
        let mut remaining = Vec::with_capacity(self.containers.len());
        for container in &self.containers {
            let deps = dependencies(container)?;
            if let Some(parent) = parent_dependency(container)? {
                if !names.contains(parent.as_str()) {
                    return Err(DeployError::UnresolvedParent {
                        container: container.name().to_string(),
                        parent,
                    });
                }
            }
            if let Some(target) = container.same_node_as() {
                if !names.contains(target.as_str()) {
                    return Err(DeployError::UnknownContainer(target));
                }
            }
            remaining.push((container.name().to_string(), deps));
        }

        let mut placed: HashSet<String> = HashSet::new();
        let mut batches = Vec::new();
        while !remaining.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|(_, deps)| deps.iter().all(|d| placed.contains(d)));
            if ready.is_empty() {
                return Err(DeployError::DependencyCycle(
                    blocked.into_iter().map(|(name, _)| name).collect(),
                ));
            }
            let batch: Vec<String> = ready.into_iter().map(|(name, _)| name).collect();
            placed.extend(batch.iter().cloned());
            batches.push(batch);
            remaining = blocked;
        }
        Ok(batches)
    }

    pub fn plan(&self) -> DeployResult<DeploymentPlan> {
        Ok(DeploymentPlan {
            batches: self.creation_plan()?,
            ensemble: self.ensemble.members().to_vec(),
            containers: self.containers.iter().map(|c| c.snapshot()).collect(),
        })
    }

    // ── Deployment ──────────────────────────────────────────────────

    /// Create every container that is not created yet, then form the
    /// ensemble. Containers already created are left alone, so calling
    /// this again after a success issues no remote commands.
    pub async fn deploy(&mut self) -> DeployResult<()> {
        self.ctx.cancel.reset();
        self.inject_defaults();
        self.resolve_parents()?;
        self.copy_same_node_locations()?;
        self.creation_plan()?;

        let mut serial = !self.ctx.settings.with_threads;
        if self.ctx.settings.detect_platform {
            let rewritten = platform::rewrite_windows_hosts(&mut self.containers, &self.ctx).await?;
            if !rewritten.is_empty() {
                info!(containers = ?rewritten, "topology rewritten, deploying serially");
                serial = true;
            }
        }
        // Replacements from an earlier run still share their nodes.
        if !serial && self.pending_replacements() {
            info!("rewritten containers still pending, deploying serially");
            serial = true;
        }
        self.link_same_node_targets()?;

        if serial {
            info!(containers = self.containers.len(), "deploying serially");
            self.deploy_serial().await
        } else {
            info!(
                containers = self.containers.len(),
                pool_size = self.ctx.settings.pool_size,
                "deploying with threads"
            );
            self.deploy_concurrent().await
        }
    }

    /// Destroy the deployment in reverse registration order.
    ///
    /// With `force`, failures are logged and collected in the report and
    /// teardown continues; otherwise the first failure aborts. Destroyed and
    /// never-created containers leave the collection, failed ones stay.
    pub async fn destroy(&mut self, force: bool) -> DeployResult<TeardownReport> {
        let mut report = TeardownReport::default();
        if self.ctx.settings.keep_containers {
            info!("keeping containers, skipping teardown");
            return Ok(report);
        }

        if self.ensemble.is_formed() {
            info!("ensemble was formed, removing members before teardown");
            if let Err(e) = self.ensemble.dissolve(&self.containers, &self.ctx).await {
                if !force {
                    return Err(e);
                }
                warn!(error = %e, "failed to dissolve ensemble");
            }
        }

        for container in self.containers.clone().iter().rev() {
            let was_created = container.is_created();
            match container.destroy(&self.ctx).await {
                Ok(()) => {
                    if was_created {
                        report.destroyed.push(container.name().to_string());
                    }
                    self.containers.retain(|c| !Arc::ptr_eq(c, container));
                }
                Err(source) => {
                    if !force {
                        return Err(DeployError::Destroy {
                            container: container.name().to_string(),
                            source,
                        });
                    }
                    warn!(container = %container.name(), error = %source, "failed to destroy container");
                    report.failures.push((container.name().to_string(), source));
                }
            }
        }

        info!(
            destroyed = report.destroyed.len(),
            failed = report.failures.len(),
            "teardown finished"
        );
        Ok(report)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn find(&self, name: &str) -> Option<&Arc<Container>> {
        self.containers.iter().find(|c| c.name() == name)
    }

    /// Inject a default root when nothing is declared, and hand the
    /// default bundles and commands to the first root once.
    fn inject_defaults(&mut self) {
        let settings = self.ctx.settings.clone();
        if self.containers.is_empty() {
            if let Some(node) = &settings.default_host {
                info!(host = %node.host, "no containers declared, injecting default root");
                self.containers.push(
                    Container::root(DEFAULT_ROOT_NAME)
                        .node(node.clone())
                        .credentials(settings.credentials.clone())
                        .build(),
                );
            }
        }

        if self.defaults_applied
            || (settings.default_bundles.is_empty() && settings.default_commands.is_empty())
        {
            return;
        }
        if let Some(root) = self.containers.iter().find(|c| c.is_root()) {
            root.update_options(|options| {
                options.extend(OptionKey::Commands, settings.default_commands.iter().cloned());
                options.extend(OptionKey::Bundles, settings.default_bundles.iter().cloned());
            });
            debug!(container = %root.name(), "default bundles and commands assigned");
            self.defaults_applied = true;
        }
    }

    /// Link every unlinked container to its parent by name.
    fn resolve_parents(&self) -> DeployResult<()> {
        for container in &self.containers {
            if !container.kind().needs_parent() || container.parent().is_some() {
                continue;
            }
            let parent_name = container
                .parent_name()
                .ok_or_else(|| ContainerError::MissingParent(container.name().to_string()))?;
            let parent = self
                .find(&parent_name)
                .ok_or_else(|| DeployError::UnresolvedParent {
                    container: container.name().to_string(),
                    parent: parent_name.clone(),
                })?;
            container.set_parent(parent);
        }
        Ok(())
    }

    /// Give pending same-node containers a copy of their target's location.
    fn copy_same_node_locations(&self) -> DeployResult<()> {
        for container in &self.containers {
            let Some(target) = container.same_node_as() else {
                continue;
            };
            let target = self
                .find(&target)
                .ok_or(DeployError::UnknownContainer(target))?;
            if !container.is_created() {
                container.set_node(target.node());
            }
        }
        Ok(())
    }

    /// Link same-node targets for port offset allocation. Runs after the
    /// topology rewrite so the links point at the replacements.
    fn link_same_node_targets(&self) -> DeployResult<()> {
        for container in &self.containers {
            let Some(target) = container.same_node_as() else {
                continue;
            };
            let target = self
                .find(&target)
                .ok_or(DeployError::UnknownContainer(target))?;
            container.link_same_node(target);
        }
        Ok(())
    }

    async fn deploy_serial(&mut self) -> DeployResult<()> {
        for container in self.containers.clone() {
            if !container.is_created() {
                if let Err(source) = container.create(&self.ctx).await {
                    self.ctx.cancel.set();
                    return Err(DeployError::Aggregate {
                        container: container.name().to_string(),
                        source,
                    });
                }
            }
            if !self.ensemble.is_formed() && self.ensemble.is_ready(&self.containers) {
                self.ensemble.form(&self.containers, &self.ctx).await?;
            }
        }

        // Members that never became ready, missing ones included, fail here.
        if !self.ensemble.is_empty() && !self.ensemble.is_formed() {
            self.ensemble.form(&self.containers, &self.ctx).await?;
        }
        Ok(())
    }

    fn pending_replacements(&self) -> bool {
        self.containers
            .iter()
            .any(|c| !c.is_created() && c.replaced().is_some())
    }

    async fn deploy_concurrent(&mut self) -> DeployResult<()> {
        let pending: Vec<Arc<Container>> = self
            .containers
            .iter()
            .filter(|c| !c.is_created())
            .cloned()
            .collect();

        // Every signal exists before the first task can look for one.
        let mut registry = TaskRegistry::new();
        let publishers: Vec<watch::Sender<TaskStatus>> =
            pending.iter().map(|c| registry.register(c.name())).collect();

        let permits = Arc::new(Semaphore::new(self.ctx.settings.pool_size.max(1)));
        let mut tasks = JoinSet::new();
        for (container, done) in pending.iter().cloned().zip(publishers) {
            let barriers: Vec<(String, watch::Receiver<TaskStatus>)> = dependencies(&container)?
                .into_iter()
                .filter_map(|dep| registry.subscribe(&dep).map(|rx| (dep, rx)))
                .collect();
            let permits = permits.clone();
            let ctx = self.ctx.clone();
            tasks.spawn(async move {
                let result = run_creation(&container, barriers, &permits, &ctx).await;
                done.send_replace(if result.is_ok() {
                    TaskStatus::Succeeded
                } else {
                    TaskStatus::Failed
                });
                result
            });
        }
        debug!(tasks = registry.len(), "creation tasks spawned");

        let mut failure: Option<DeployError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Err(DeployError::TaskPanicked(e.to_string())),
            };
            let Err(e) = result else { continue };

            if failure.is_none() {
                error!(error = %e, "creation failed, cancelling outstanding tasks");
                self.ctx.cancel.set();
                tasks.abort_all();
            }
            // Keep the error that started the cascade.
            failure = match failure {
                Some(first) if first.is_originating() || !e.is_originating() => Some(first),
                _ => Some(e),
            };
        }

        if let Some(e) = failure {
            for container in &pending {
                if container.state() == LifecycleState::Creating {
                    warn!(container = %container.name(), "creation aborted");
                    container.force_state(LifecycleState::NotCreated);
                }
            }
            return Err(e);
        }

        if !self.ensemble.is_empty() && !self.ensemble.is_formed() {
            self.ensemble.form(&self.containers, &self.ctx).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("containers", &self.containers)
            .field("ensemble", &self.ensemble)
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// One creation task: wait for dependencies, take a pool permit, create.
async fn run_creation(
    container: &Container,
    barriers: Vec<(String, watch::Receiver<TaskStatus>)>,
    permits: &Semaphore,
    ctx: &LifecycleContext,
) -> DeployResult<()> {
    for (dep, signal) in barriers {
        if registry::completion(signal).await == TaskStatus::Failed {
            debug!(container = %container.name(), %dep, "dependency failed, skipping creation");
            return Err(DeployError::ParentFailed {
                container: container.name().to_string(),
                parent: dep,
            });
        }
    }

    let _permit = permits
        .acquire()
        .await
        .map_err(|_| DeployError::Cancelled(container.name().to_string()))?;
    if ctx.cancel.is_set() {
        return Err(DeployError::Cancelled(container.name().to_string()));
    }

    container
        .create(ctx)
        .await
        .map_err(|source| DeployError::Aggregate {
            container: container.name().to_string(),
            source,
        })
}

/// The parent a container needs, by name.
fn parent_dependency(container: &Container) -> DeployResult<Option<String>> {
    if !container.kind().needs_parent() {
        return Ok(None);
    }
    let name = container
        .parent()
        .map(|p| p.name().to_string())
        .or_else(|| container.parent_name())
        .ok_or_else(|| ContainerError::MissingParent(container.name().to_string()))?;
    Ok(Some(name))
}

/// Everything that must finish before `container` is created.
fn dependencies(container: &Container) -> DeployResult<Vec<String>> {
    let mut deps: Vec<String> = parent_dependency(container)?.into_iter().collect();
    if let Some(target) = container.same_node_as() {
        if !deps.contains(&target) {
            deps.push(target);
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, context_with, host};
    use shipyard_core::{ContainerConfig, ContainerKind, Settings};
    use shipyard_exec::MockExecutorFactory;

    fn deployer(settings: Settings) -> (Deployer, MockExecutorFactory) {
        let (ctx, factory) = context_with(settings);
        (Deployer::new(ctx), factory)
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (ctx, _) = context();
        let mut deployer = Deployer::new(ctx);
        deployer.register(Container::root("root").build()).unwrap();
        let err = deployer.register(Container::root("root").build()).unwrap_err();
        assert!(matches!(err, DeployError::DuplicateName(ref n) if n == "root"));
    }

    #[test]
    fn test_lookups() {
        let (ctx, _) = context();
        let mut deployer = Deployer::new(ctx);
        let root = Container::root("root").build();
        deployer.register(root.clone()).unwrap();
        deployer.register(Container::child("child-a").parent(&root).build()).unwrap();
        deployer.register(Container::child("child-b").parent(&root).build()).unwrap();

        assert_eq!(deployer.root().unwrap().name(), "root");
        assert_eq!(
            deployer.containers_by_substring("child").unwrap(),
            ["child-a", "child-b"]
        );
        assert!(matches!(
            deployer.containers_by_substring("nope"),
            Err(DeployError::NoMatchingContainers(_))
        ));
        assert_eq!(deployer.children_of("root").len(), 2);
        assert!(deployer.container("child-a").is_some());
    }

    #[test]
    fn test_creation_plan_batches() {
        let (ctx, _) = context();
        let mut deployer = Deployer::new(ctx);
        deployer.register(Container::root("root").build()).unwrap();
        deployer.register(Container::child("c2").parent_name("c1").build()).unwrap();
        deployer.register(Container::child("c1").parent_name("root").build()).unwrap();
        deployer.register(Container::ssh("s1").parent_name("root").build()).unwrap();

        let plan = deployer.creation_plan().unwrap();
        assert_eq!(plan, vec![vec!["root"], vec!["c1", "s1"], vec!["c2"]]);
    }

    #[test]
    fn test_creation_plan_detects_cycles() {
        let (ctx, _) = context();
        let mut deployer = Deployer::new(ctx);
        deployer.register(Container::root("root").build()).unwrap();
        deployer.register(Container::child("a").parent_name("b").build()).unwrap();
        deployer.register(Container::child("b").parent_name("a").build()).unwrap();

        let err = deployer.creation_plan().unwrap_err();
        assert!(matches!(err, DeployError::DependencyCycle(ref names) if names.len() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_parent_fails_before_remote_work() {
        let (mut deployer, factory) = deployer(Settings::default());
        deployer.register(Container::root("root").build()).unwrap();
        deployer.register(Container::child("c").parent_name("ghost").build()).unwrap();

        let err = deployer.deploy().await.unwrap_err();
        assert!(matches!(err, DeployError::UnresolvedParent { ref parent, .. } if parent == "ghost"));
        assert!(factory.journal().commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_same_node_target() {
        let (mut deployer, factory) = deployer(Settings::default());
        deployer
            .register(
                Container::root("root")
                    .option(OptionKey::SameNodeAs, "elsewhere")
                    .build(),
            )
            .unwrap();

        let err = deployer.deploy().await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownContainer(ref n) if n == "elsewhere"));
        assert!(factory.journal().commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_root_injected() {
        let settings = Settings {
            default_host: Some(host("10.0.0.7")),
            default_commands: vec!["profile-list".to_string()],
            default_bundles: vec!["mvn:org.example/app/1.0".to_string()],
            ..Settings::default()
        };
        let (mut deployer, factory) = deployer(settings);
        deployer.deploy().await.unwrap();

        let root = Arc::clone(deployer.root().unwrap());
        assert_eq!(root.name(), DEFAULT_ROOT_NAME);
        assert_eq!(root.node().host, "10.0.0.7");
        assert!(root.is_online());
        assert!(factory.journal().contains("osgi:install -s mvn:org.example/app/1.0"));

        // Defaults are handed out once.
        deployer.deploy().await.unwrap();
        assert_eq!(root.options().values(OptionKey::Commands), ["profile-list"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_node_location_is_copied() {
        let (mut deployer, _factory) = deployer(Settings::default());
        let root = Container::root("root").node(host("10.0.0.1")).build();
        deployer.register(root.clone()).unwrap();
        deployer
            .register(
                Container::join("j1")
                    .parent(&root)
                    .node(host("10.0.0.99"))
                    .option(OptionKey::SameNodeAs, "root")
                    .build(),
            )
            .unwrap();

        deployer.deploy().await.unwrap();
        let join = deployer.container("j1").unwrap();
        assert_eq!(join.node().host, "10.0.0.1");
        assert_eq!(join.runtime_port(), 8102);
        assert!(join.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let config = DeployConfig {
            ensemble: vec!["root".to_string()],
            settings: Settings::default(),
            containers: vec![
                ContainerConfig {
                    name: "root".to_string(),
                    kind: ContainerKind::Root,
                    parent: None,
                    node: Some(host("10.0.0.1")),
                    credentials: None,
                    fabric: None,
                    runtime_port: None,
                    options: Default::default(),
                },
                ContainerConfig {
                    name: "c1".to_string(),
                    kind: ContainerKind::Child,
                    parent: Some("root".to_string()),
                    node: None,
                    credentials: None,
                    fabric: None,
                    runtime_port: None,
                    options: Default::default(),
                },
            ],
        };
        let deployer =
            Deployer::from_config(&config, Arc::new(MockExecutorFactory::new())).unwrap();
        assert_eq!(deployer.containers().len(), 2);
        assert_eq!(deployer.ensemble().members(), ["root"]);
        assert_eq!(
            deployer.container("c1").unwrap().state(),
            LifecycleState::Unresolved
        );

        let plan = deployer.plan().unwrap();
        assert_eq!(plan.batches, vec![vec!["root"], vec!["c1"]]);
        assert_eq!(plan.containers[1].parent.as_deref(), Some("root"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_containers_skips_teardown() {
        let settings = Settings {
            keep_containers: true,
            ..Settings::default()
        };
        let (mut deployer, factory) = deployer(settings);
        deployer.register(Container::root("root").build()).unwrap();
        deployer.deploy().await.unwrap();
        let issued = factory.journal().commands().len();

        let report = deployer.destroy(true).await.unwrap();
        assert!(report.destroyed.is_empty());
        assert_eq!(factory.journal().commands().len(), issued);
        assert_eq!(deployer.containers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_command_unknown_container() {
        let (deployer, _factory) = deployer(Settings::default());
        let err = deployer.execute_command("ghost", "osgi:list").await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownContainer(_)));
    }
}
