//! Scripted executors for tests and dry runs.
//!
//! A [`MockExecutorFactory`] hands out [`MockExecutor`]s that share one
//! [`MockScript`] (canned replies), one [`CommandJournal`] (every command
//! issued, globally sequenced) and a per-host "middleware running" flag.
//! Node commands containing `bin/start` raise the flag, `bin/stop` and
//! `pkill` lower it; runtime sessions only connect while it is raised.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use shipyard_core::NodeLocation;

use crate::error::{ExecError, ExecResult};
use crate::executor::{ExecutorFactory, RemoteExecutor, SessionKind};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One canned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Output(String),
    Fail(String),
}

impl MockReply {
    pub fn output(text: &str) -> Self {
        MockReply::Output(text.to_string())
    }

    pub fn fail(reason: &str) -> Self {
        MockReply::Fail(reason.to_string())
    }
}

/// A command recorded by the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub seq: usize,
    pub target: String,
    pub command: String,
}

/// Globally ordered record of every command issued through mock sessions.
#[derive(Debug, Clone, Default)]
pub struct CommandJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl CommandJournal {
    fn record(&self, target: &str, command: &str) {
        let mut entries = lock(&self.entries);
        let seq = entries.len();
        entries.push(JournalEntry {
            seq,
            target: target.to_string(),
            command: command.to_string(),
        });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        lock(&self.entries).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .map(|e| e.command.clone())
            .collect()
    }

    /// Sequence number of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        lock(&self.entries)
            .iter()
            .find(|e| e.command.contains(needle))
            .map(|e| e.seq)
    }

    /// Sequence number of the last command containing `needle`.
    pub fn last_position(&self, needle: &str) -> Option<usize> {
        lock(&self.entries)
            .iter()
            .rev()
            .find(|e| e.command.contains(needle))
            .map(|e| e.seq)
    }

    pub fn count(&self, needle: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.command.contains(needle))
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.count(needle) > 0
    }

    /// Commands issued on sessions whose target contains `target`.
    pub fn commands_on(&self, target: &str) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .filter(|e| e.target.contains(target))
            .map(|e| e.command.clone())
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[derive(Debug)]
struct Rule {
    target: Option<String>,
    pattern: String,
    replies: VecDeque<MockReply>,
    last: MockReply,
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<Rule>,
    delays: Vec<(String, Duration)>,
    unreachable: HashSet<String>,
    connect_failures: usize,
}

/// Canned replies keyed by command substring. The most recently added
/// matching rule wins; unmatched commands succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    state: Arc<Mutex<ScriptState>>,
}

impl MockScript {
    /// Reply `output` to every command containing `pattern`.
    pub fn on(&self, pattern: &str, output: &str) -> &Self {
        self.push(None, pattern, vec![MockReply::output(output)])
    }

    /// As [`on`](Self::on), restricted to sessions whose target contains `target`.
    pub fn on_target(&self, target: &str, pattern: &str, output: &str) -> &Self {
        self.push(Some(target), pattern, vec![MockReply::output(output)])
    }

    /// Reply with `replies` in order, repeating the last one.
    pub fn on_sequence(&self, pattern: &str, replies: Vec<MockReply>) -> &Self {
        self.push(None, pattern, replies)
    }

    pub fn fail_on(&self, pattern: &str, reason: &str) -> &Self {
        self.push(None, pattern, vec![MockReply::fail(reason)])
    }

    pub fn fail_on_target(&self, target: &str, pattern: &str, reason: &str) -> &Self {
        self.push(Some(target), pattern, vec![MockReply::fail(reason)])
    }

    /// Delay commands containing `pattern` by `delay` before replying.
    pub fn delay(&self, pattern: &str, delay: Duration) -> &Self {
        lock(&self.state).delays.push((pattern.to_string(), delay));
        self
    }

    /// Make connects to targets containing `host` fail (or succeed again).
    pub fn set_unreachable(&self, host: &str, unreachable: bool) -> &Self {
        let mut state = lock(&self.state);
        if unreachable {
            state.unreachable.insert(host.to_string());
        } else {
            state.unreachable.remove(host);
        }
        self
    }

    /// Fail the next `count` connects regardless of target.
    pub fn fail_connects(&self, count: usize) -> &Self {
        lock(&self.state).connect_failures = count;
        self
    }

    fn push(&self, target: Option<&str>, pattern: &str, replies: Vec<MockReply>) -> &Self {
        let last = replies
            .last()
            .cloned()
            .unwrap_or_else(|| MockReply::output(""));
        lock(&self.state).rules.push(Rule {
            target: target.map(str::to_string),
            pattern: pattern.to_string(),
            replies: replies.into(),
            last,
        });
        self
    }

    fn reply(&self, target: &str, command: &str) -> (MockReply, Option<Duration>) {
        let mut state = lock(&self.state);
        let delay = state
            .delays
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, d)| *d);

        let rule = state.rules.iter_mut().rev().find(|r| {
            command.contains(r.pattern.as_str())
                && r.target.as_deref().is_none_or(|t| target.contains(t))
        });
        let reply = match rule {
            Some(rule) => rule.replies.pop_front().unwrap_or_else(|| rule.last.clone()),
            None => MockReply::output(""),
        };
        (reply, delay)
    }

    fn try_connect(&self, target: &str) -> bool {
        let mut state = lock(&self.state);
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return false;
        }
        !state.unreachable.iter().any(|h| target.contains(h.as_str()))
    }
}

/// Whether the middleware process on each host is running.
#[derive(Debug, Clone, Default)]
struct HostStates {
    running: Arc<Mutex<HashMap<String, bool>>>,
}

impl HostStates {
    fn is_running(&self, host: &str) -> bool {
        lock(&self.running).get(host).copied().unwrap_or(true)
    }

    fn observe(&self, host: &str, command: &str) {
        let running = if command.contains("bin/start") {
            true
        } else if command.contains("bin/stop") || command.contains("pkill") {
            false
        } else {
            return;
        };
        lock(&self.running).insert(host.to_string(), running);
    }
}

/// A scripted session.
#[derive(Debug)]
pub struct MockExecutor {
    target: String,
    host: String,
    node_session: bool,
    connected: AtomicBool,
    connects: AtomicUsize,
    script: MockScript,
    journal: CommandJournal,
    hosts: HostStates,
}

impl MockExecutor {
    /// A standalone session with its own script and journal.
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            host: target.to_string(),
            node_session: false,
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            script: MockScript::default(),
            journal: CommandJournal::default(),
            hosts: HostStates::default(),
        }
    }

    pub fn script(&self) -> &MockScript {
        &self.script
    }

    pub fn journal(&self) -> &CommandJournal {
        &self.journal
    }

    /// Number of connect attempts, successful or not.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn connect(&self) -> ExecResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let up = self.node_session || self.hosts.is_running(&self.host);
        if up && self.script.try_connect(&self.target) {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            self.connected.store(false, Ordering::SeqCst);
            Err(ExecError::Connection {
                target: self.target.clone(),
                reason: "connection refused".to_string(),
            })
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && (self.node_session || self.hosts.is_running(&self.host))
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn execute_command(&self, command: &str) -> ExecResult<String> {
        self.journal.record(&self.target, command);
        let (reply, delay) = self.script.reply(&self.target, command);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        if self.node_session {
            self.hosts.observe(&self.host, command);
        }
        debug!(session = %self.target, %command, "[MOCK] command");

        match reply {
            MockReply::Output(output) => Ok(output),
            MockReply::Fail(reason) => Err(ExecError::Command {
                target: self.target.clone(),
                command: command.to_string(),
                reason,
            }),
        }
    }
}

/// Opens [`MockExecutor`]s sharing one script, journal and host table.
#[derive(Debug, Clone, Default)]
pub struct MockExecutorFactory {
    script: MockScript,
    journal: CommandJournal,
    hosts: HostStates,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockExecutorFactory {
    /// A factory whose hosts behave like a healthy middleware installation.
    pub fn new() -> Self {
        let factory = Self::bare();
        factory
            .script
            .on("uname", "Linux")
            .on("container-list", "success")
            .on("fabric:info", "Fabric Release: 1.2.0\nZooKeeper URI: 10.0.0.1:2181\n")
            .on("ls -d", "/home/fuse/shipyard/jboss-fuse-6.3.0/\n");
        factory
    }

    /// A factory with no canned replies.
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn script(&self) -> &MockScript {
        &self.script
    }

    pub fn journal(&self) -> &CommandJournal {
        &self.journal
    }

    /// Targets of every session opened so far.
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl ExecutorFactory for MockExecutorFactory {
    fn open(&self, location: &NodeLocation, kind: &SessionKind) -> Arc<dyn RemoteExecutor> {
        let target = match kind {
            SessionKind::Node => format!("node:{}", location.address()),
            SessionKind::Runtime { port, credentials } => {
                format!("runtime:{}@{}:{}", credentials.user, location.host, port)
            }
        };
        lock(&self.opened).push(target.clone());

        Arc::new(MockExecutor {
            target,
            host: location.host.clone(),
            node_session: matches!(kind, SessionKind::Node),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            script: self.script.clone(),
            journal: self.journal.clone(),
            hosts: self.hosts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::Credentials;

    fn runtime() -> SessionKind {
        SessionKind::Runtime {
            port: 8101,
            credentials: Credentials::default(),
        }
    }

    #[tokio::test]
    async fn test_latest_rule_wins() {
        let exec = MockExecutor::new("t");
        exec.script().on("uname", "Linux").on("uname", "CYGWIN_NT-6.1");
        assert_eq!(exec.execute_command("uname").await.unwrap(), "CYGWIN_NT-6.1");
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let exec = MockExecutor::new("t");
        exec.script()
            .on_sequence("x", vec![MockReply::output("1"), MockReply::output("2")]);
        assert_eq!(exec.execute_command("x").await.unwrap(), "1");
        assert_eq!(exec.execute_command("x").await.unwrap(), "2");
        assert_eq!(exec.execute_command("x").await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_failure_and_silent() {
        let exec = MockExecutor::new("t");
        exec.script().fail_on("boom", "exit 1");
        assert!(exec.execute_command("boom").await.is_err());
        assert_eq!(exec.execute_command_silently("boom").await, "");
        assert_eq!(exec.execute_command("other").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_execute_commands_stops_at_failure() {
        let exec = MockExecutor::new("t");
        exec.script().fail_on("second", "nope");
        let commands = vec!["first".to_string(), "second".to_string(), "third".to_string()];
        assert!(exec.execute_commands(&commands).await.is_err());
        assert_eq!(exec.journal().commands(), ["first", "second"]);
    }

    #[tokio::test]
    async fn test_factory_shares_journal_and_host_state() {
        let factory = MockExecutorFactory::new();
        let location = NodeLocation::new("10.0.0.1", "fuse", "fuse");
        let node = factory.open(&location, &SessionKind::Node);
        let shell = factory.open(&location, &runtime());

        shell.connect().await.unwrap();
        node.execute_command("shipyard/bin/stop").await.unwrap();
        assert!(!shell.is_connected().await);
        assert!(shell.connect().await.is_err());

        node.execute_command("shipyard/bin/start").await.unwrap();
        shell.connect().await.unwrap();
        assert!(shell.is_connected().await);

        let journal = factory.journal();
        assert_eq!(journal.position("bin/stop"), Some(0));
        assert_eq!(journal.position("bin/start"), Some(1));
        assert_eq!(factory.opened().len(), 2);
        assert_eq!(journal.commands_on("node:").len(), 2);
    }

    #[tokio::test]
    async fn test_target_scoped_rule() {
        let factory = MockExecutorFactory::new();
        factory.script().on_target("10.0.0.9", "uname", "CYGWIN_NT");
        let a = factory.open(&NodeLocation::new("10.0.0.1", "u", "p"), &SessionKind::Node);
        let b = factory.open(&NodeLocation::new("10.0.0.9", "u", "p"), &SessionKind::Node);
        assert_eq!(a.execute_command("uname").await.unwrap(), "Linux");
        assert_eq!(b.execute_command("uname").await.unwrap(), "CYGWIN_NT");
    }
}
