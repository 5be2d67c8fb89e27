//! # Orchestrator gateway
//!
//! Translates between the container orchestrator's command-line interface and
//! typed records. Everything here is pure plumbing: run a `docker` command with
//! a bounded timeout, parse its fixed-format output, and report failures as a
//! typed error carrying the captured stderr.
//!
//! The gateway understands both deployment modes the host may be in: swarm
//! stacks when cluster mode is active, compose projects otherwise. The mode is
//! probed on every deploy/remove call because it can change between calls.

#![warn(missing_docs)]

mod gateway;
mod records;

use std::time::Duration;

pub use gateway::{
    DeployMode, DockerGateway, NativeDeployment, NetworkAction, Orchestrator, StackAction,
};
pub use records::{
    ContainerRecord, ContainerStats, ReplicaState, ServiceClass, StatsSnapshot, classify,
    parse_container_list, parse_replicas, parse_stats,
};

/// Default deadline for orchestrator commands
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for long-running operations (deploys, copies, package installs)
pub const LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// Error types for gateway operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The orchestrator command exited non-zero
    #[error("command execution failed: {command} (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The named stack or project does not exist
    #[error("stack not found: {0}")]
    StackNotFound(String),

    /// The command could not be run at all (spawn failure, timeout)
    #[error("command executor error: {0}")]
    Executor(#[from] command_executor::Error),
}

impl Error {
    /// Whether this error means the requested object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::StackNotFound(_))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;
