//! shipyard-exec — remote command execution and provisioning waits.
//!
//! Every interaction with a remote host goes through a [`RemoteExecutor`]
//! session. Two kinds of session exist per location: the node's operating
//! system shell and the middleware's administrative shell.
//!
//! # Architecture
//!
//! ```text
//! ExecutorFactory
//!   ├── open(location, Node)     → RemoteExecutor (OS shell)
//!   └── open(location, Runtime)  → RemoteExecutor (middleware shell)
//!
//! Waiter (bounded-retry polling)
//!   ├── boot / shutdown          → connect() / is_connected()
//!   ├── provisioning / stop      → container-list | grep <name>
//!   └── patch                    → patch:list | grep <patch>
//! ```
//!
//! [`OpenSshExecutor`] shells out to the system `ssh` client. The [`mock`]
//! module provides a scripted executor for tests.

pub mod error;
pub mod executor;
pub mod mock;
pub mod ssh;
pub mod wait;

pub use error::{ExecError, ExecResult, WaitError, WaitResult};
pub use executor::{ExecutorFactory, RemoteExecutor, SessionKind};
pub use mock::{CommandJournal, MockExecutor, MockExecutorFactory, MockReply, MockScript};
pub use ssh::{OpenSshExecutor, OpenSshFactory};
pub use wait::{WaitPolicy, Waiter};
