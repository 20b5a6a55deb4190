//! Container descriptor and builder.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::debug;

use shipyard_core::{
    ContainerConfig, ContainerKind, Credentials, DEFAULT_RUNTIME_PORT, NodeLocation, OptionKey,
    Options, Settings,
};
use shipyard_exec::{RemoteExecutor, SessionKind};

use crate::context::LifecycleContext;
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::LifecycleState;

/// A deployable container.
///
/// Shared as `Arc<Container>`. The parent link is non-owning; the
/// deployment collection owns every container.
pub struct Container {
    name: String,
    kind: ContainerKind,
    /// Port offsets handed out to containers sharing this one's node.
    port_counter: AtomicU32,
    inner: Mutex<Inner>,
}

struct Inner {
    state: LifecycleState,
    parent: Option<Weak<Container>>,
    parent_name: Option<String>,
    node: NodeLocation,
    credentials: Credentials,
    runtime_port: u16,
    fabric: bool,
    options: Options,
    in_ensemble: bool,
    /// Product home on the node once unpacked.
    home: Option<String>,
    node_exec: Option<Arc<dyn RemoteExecutor>>,
    runtime_exec: Option<Arc<dyn RemoteExecutor>>,
    same_node: Option<Weak<Container>>,
    replaces: Option<ContainerSnapshot>,
    replaced_by: Option<String>,
}

/// Point-in-time copy of a container's descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSnapshot {
    pub name: String,
    pub kind: ContainerKind,
    pub state: LifecycleState,
    pub parent: Option<String>,
    pub host: String,
    #[serde(skip)]
    pub node: NodeLocation,
    pub options: Options,
    pub in_ensemble: bool,
}

impl Container {
    pub fn root(name: &str) -> ContainerBuilder {
        ContainerBuilder::new(name, ContainerKind::Root)
    }

    pub fn child(name: &str) -> ContainerBuilder {
        ContainerBuilder::new(name, ContainerKind::Child)
    }

    pub fn ssh(name: &str) -> ContainerBuilder {
        ContainerBuilder::new(name, ContainerKind::Ssh)
    }

    pub fn join(name: &str) -> ContainerBuilder {
        ContainerBuilder::new(name, ContainerKind::Join)
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.kind == ContainerKind::Root
    }

    pub fn state(&self) -> LifecycleState {
        self.inner().state
    }

    pub fn is_created(&self) -> bool {
        self.state().is_created()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    // ── Lifecycle state ─────────────────────────────────────────────

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&self, next: LifecycleState) -> ContainerResult<()> {
        let mut inner = self.inner();
        let from = inner.state;
        if !from.can_transition_to(next) {
            return Err(ContainerError::InvalidTransition {
                container: self.name.clone(),
                from,
                to: next,
            });
        }
        inner.state = next;
        debug!(container = %self.name, %from, to = %next, "state transition");
        Ok(())
    }

    /// Set the state without validation. Used by out-of-band operations.
    pub fn force_state(&self, next: LifecycleState) {
        let mut inner = self.inner();
        debug!(container = %self.name, from = %inner.state, to = %next, "forced state");
        inner.state = next;
    }

    // ── Topology ────────────────────────────────────────────────────

    pub fn parent(&self) -> Option<Arc<Container>> {
        self.inner().parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn parent_name(&self) -> Option<String> {
        self.inner().parent_name.clone()
    }

    /// Link `parent`, resolving an unresolved container.
    pub fn set_parent(&self, parent: &Arc<Container>) {
        let mut inner = self.inner();
        inner.parent = Some(Arc::downgrade(parent));
        inner.parent_name = Some(parent.name().to_string());
        if inner.state == LifecycleState::Unresolved {
            inner.state = LifecycleState::NotCreated;
        }
    }

    /// The linked parent, or an error naming what is missing.
    pub fn require_parent(&self) -> ContainerResult<Arc<Container>> {
        let inner = self.inner();
        match (&inner.parent, &inner.parent_name) {
            (Some(weak), name) => weak.upgrade().ok_or_else(|| ContainerError::ParentGone {
                container: self.name.clone(),
                parent: name.clone().unwrap_or_default(),
            }),
            (None, _) => Err(ContainerError::MissingParent(self.name.clone())),
        }
    }

    pub fn node(&self) -> NodeLocation {
        self.inner().node.clone()
    }

    /// Replace the node location, dropping any open sessions to the old one.
    pub fn set_node(&self, node: NodeLocation) {
        let mut inner = self.inner();
        inner.node = node;
        inner.node_exec = None;
        inner.runtime_exec = None;
    }

    pub fn credentials(&self) -> Credentials {
        self.inner().credentials.clone()
    }

    pub fn runtime_port(&self) -> u16 {
        self.inner().runtime_port
    }

    pub fn set_runtime_port(&self, port: u16) {
        let mut inner = self.inner();
        inner.runtime_port = port;
        inner.runtime_exec = None;
    }

    pub fn fabric(&self) -> bool {
        self.inner().fabric
    }

    pub fn options(&self) -> Options {
        self.inner().options.clone()
    }

    pub fn update_options(&self, f: impl FnOnce(&mut Options)) {
        f(&mut self.inner().options);
    }

    /// Name of the container whose node this one shares.
    pub fn same_node_as(&self) -> Option<String> {
        self.inner()
            .options
            .first(OptionKey::SameNodeAs)
            .map(str::to_string)
    }

    pub fn link_same_node(&self, target: &Arc<Container>) {
        self.inner().same_node = Some(Arc::downgrade(target));
    }

    pub fn same_node_target(&self) -> Option<Arc<Container>> {
        self.inner().same_node.as_ref().and_then(Weak::upgrade)
    }

    /// Hand out the next port offset for a container sharing this node.
    ///
    /// Offsets are never returned, so a failed creation leaves a gap.
    pub fn next_port_offset(&self) -> u32 {
        self.port_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of offsets handed out so far.
    pub fn port_offsets_issued(&self) -> u32 {
        self.port_counter.load(Ordering::SeqCst)
    }

    pub fn in_ensemble(&self) -> bool {
        self.inner().in_ensemble
    }

    pub fn set_in_ensemble(&self, in_ensemble: bool) {
        self.inner().in_ensemble = in_ensemble;
    }

    pub fn home(&self) -> Option<String> {
        self.inner().home.clone()
    }

    pub fn set_home(&self, home: Option<String>) {
        self.inner().home = home;
    }

    /// Snapshot of the descriptor this container replaced during a topology
    /// rewrite.
    pub fn replaced(&self) -> Option<ContainerSnapshot> {
        self.inner().replaces.clone()
    }

    pub fn set_replaced(&self, snapshot: ContainerSnapshot) {
        self.inner().replaces = Some(snapshot);
    }

    /// Name of the container that replaced this one.
    pub fn replaced_by(&self) -> Option<String> {
        self.inner().replaced_by.clone()
    }

    pub fn set_replaced_by(&self, name: &str) {
        self.inner().replaced_by = Some(name.to_string());
    }

    pub fn snapshot(&self) -> ContainerSnapshot {
        let inner = self.inner();
        ContainerSnapshot {
            name: self.name.clone(),
            kind: self.kind,
            state: inner.state,
            parent: inner.parent_name.clone(),
            host: inner.node.host.clone(),
            node: inner.node.clone(),
            options: inner.options.clone(),
            in_ensemble: inner.in_ensemble,
        }
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// Session on this container's node OS shell, opened on first use.
    pub fn node_executor(&self, ctx: &LifecycleContext) -> Arc<dyn RemoteExecutor> {
        let mut inner = self.inner();
        if let Some(exec) = &inner.node_exec {
            return exec.clone();
        }
        let exec = ctx.executors.open(&inner.node, &SessionKind::Node);
        inner.node_exec = Some(exec.clone());
        exec
    }

    /// Session on this container's own middleware shell, opened on first use.
    pub fn runtime_executor(&self, ctx: &LifecycleContext) -> Arc<dyn RemoteExecutor> {
        let mut inner = self.inner();
        if let Some(exec) = &inner.runtime_exec {
            return exec.clone();
        }
        let kind = SessionKind::Runtime {
            port: inner.runtime_port,
            credentials: inner.credentials.clone(),
        };
        let exec = ctx.executors.open(&inner.node, &kind);
        inner.runtime_exec = Some(exec.clone());
        exec
    }

    /// The middleware shell that administers this container: its own for
    /// roots and joins, the parent's for children and SSH containers.
    pub fn shell(&self, ctx: &LifecycleContext) -> ContainerResult<Arc<dyn RemoteExecutor>> {
        match self.kind {
            ContainerKind::Root | ContainerKind::Join => Ok(self.runtime_executor(ctx)),
            ContainerKind::Child | ContainerKind::Ssh => self.require_parent()?.shell(ctx),
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner();
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &inner.state)
            .field("parent", &inner.parent_name)
            .field("host", &inner.node.host)
            .finish()
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) on {}", self.name, self.kind, self.inner().node.host)
    }
}

/// Builds containers. Copying an existing container deep-copies its
/// options and location.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    name: String,
    kind: ContainerKind,
    parent: Option<Weak<Container>>,
    parent_name: Option<String>,
    node: NodeLocation,
    credentials: Credentials,
    runtime_port: u16,
    fabric: bool,
    options: Options,
}

impl ContainerBuilder {
    pub fn new(name: &str, kind: ContainerKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent: None,
            parent_name: None,
            node: NodeLocation::default(),
            credentials: Credentials::default(),
            runtime_port: DEFAULT_RUNTIME_PORT,
            fabric: true,
            options: Options::new(),
        }
    }

    /// Start from a copy of `container`'s descriptor.
    pub fn from_existing(container: &Container) -> Self {
        let inner = container.inner();
        Self {
            name: container.name.clone(),
            kind: container.kind,
            parent: inner.parent.clone(),
            parent_name: inner.parent_name.clone(),
            node: inner.node.clone(),
            credentials: inner.credentials.clone(),
            runtime_port: inner.runtime_port,
            fabric: inner.fabric,
            options: inner.options.clone(),
        }
    }

    /// Start from a declared container, filling gaps from `settings`.
    pub fn from_config(config: &ContainerConfig, settings: &Settings) -> Self {
        let mut builder = Self::new(&config.name, config.kind);
        builder.parent_name = config.parent.clone();
        builder.node = config
            .node
            .clone()
            .or_else(|| settings.default_host.clone())
            .unwrap_or_default();
        builder.credentials = config
            .credentials
            .clone()
            .unwrap_or_else(|| settings.credentials.clone());
        builder.runtime_port = config.runtime_port.unwrap_or(DEFAULT_RUNTIME_PORT);
        builder.fabric = config.fabric.unwrap_or(true);
        builder.options = config.options.clone();
        builder
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn kind(mut self, kind: ContainerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn parent(mut self, parent: &Arc<Container>) -> Self {
        self.parent = Some(Arc::downgrade(parent));
        self.parent_name = Some(parent.name().to_string());
        self
    }

    pub fn parent_name(mut self, name: &str) -> Self {
        self.parent = None;
        self.parent_name = Some(name.to_string());
        self
    }

    pub fn node(mut self, node: NodeLocation) -> Self {
        self.node = node;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn runtime_port(mut self, port: u16) -> Self {
        self.runtime_port = port;
        self
    }

    pub fn fabric(mut self, fabric: bool) -> Self {
        self.fabric = fabric;
        self
    }

    pub fn option(mut self, key: OptionKey, value: &str) -> Self {
        self.options.add(key, value);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Arc<Container> {
        let linked = self.parent.as_ref().is_some_and(|p| p.strong_count() > 0);
        let state = if !self.kind.needs_parent() || linked {
            LifecycleState::NotCreated
        } else {
            LifecycleState::Unresolved
        };

        Arc::new(Container {
            name: self.name,
            kind: self.kind,
            port_counter: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                state,
                parent: self.parent,
                parent_name: self.parent_name,
                node: self.node,
                credentials: self.credentials,
                runtime_port: self.runtime_port,
                fabric: self.fabric,
                options: self.options,
                in_ensemble: false,
                home: None,
                node_exec: None,
                runtime_exec: None,
                same_node: None,
                replaces: None,
                replaced_by: None,
            }),
        })
    }
}
