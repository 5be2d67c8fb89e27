//! The `Orchestrator` trait and its docker CLI implementation.

use crate::records::{
    self, ContainerRecord, ContainerStats, LIST_FORMAT, ReplicaState, SERVICE_FORMAT,
    STATS_FORMAT, StatsSnapshot,
};
use crate::{DEFAULT_TIMEOUT, Error, LONG_TIMEOUT, Result};
use async_trait::async_trait;
use command_executor::{Command, CommandRunner, LocalRunner};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a stack is materialised on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// `docker stack` on an active swarm
    Swarm,
    /// `docker compose` project on a standalone engine
    Compose,
}

/// Whether a deploy created a new stack or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackAction {
    /// The stack did not exist before
    Created,
    /// The stack existed and was redeployed
    Updated,
}

/// Result of a native deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeDeployment {
    /// Mode the stack was deployed in
    pub mode: DeployMode,
    /// Create or update
    pub action: StackAction,
}

/// Outcome of [`Orchestrator::ensure_network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    /// The network already existed (or was created concurrently)
    Existing,
    /// The network was created by this call
    Created,
}

/// Operations the provisioning layer needs from the container orchestrator
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List all containers, running or not
    async fn list(&self) -> Result<Vec<ContainerRecord>>;

    /// Best-effort resource usage for all running containers
    async fn stats(&self) -> StatsSnapshot;

    /// Best-effort resource usage for one container
    async fn stats_for(&self, id: &str) -> ContainerStats;

    /// Start a container
    async fn start(&self, id: &str) -> Result<()>;

    /// Stop a container
    async fn stop(&self, id: &str) -> Result<()>;

    /// Restart a container
    async fn restart(&self, id: &str) -> Result<()>;

    /// Run a command inside a container and return its stdout
    async fn exec_in(&self, id: &str, cmd: &[String], timeout: Duration) -> Result<String>;

    /// Copy a host path into a container
    async fn copy_to(&self, id: &str, host_path: &str, container_path: &str) -> Result<()>;

    /// Copy a container path out to the host
    async fn copy_from(&self, id: &str, container_path: &str, host_path: &str) -> Result<()>;

    /// Whether cluster (swarm) mode is active right now
    async fn is_cluster_active(&self) -> Result<bool>;

    /// Make sure the named network exists
    async fn ensure_network(&self, name: &str) -> Result<NetworkAction>;

    /// Remove the named network; `Ok(false)` when it did not exist
    async fn remove_network(&self, name: &str) -> Result<bool>;

    /// Deploy or redeploy a stack from a service definition document
    async fn deploy_native(&self, name: &str, document: &str) -> Result<NativeDeployment>;

    /// Remove a stack; `StackNotFound` when there is nothing to remove
    async fn remove_native(&self, name: &str) -> Result<()>;

    /// Replica convergence for every service whose name starts with `prefix`
    async fn replica_states(&self, prefix: &str) -> Result<Vec<ReplicaState>>;
}

/// Orchestrator gateway backed by the `docker` command-line client
pub struct DockerGateway<R = LocalRunner> {
    runner: R,
    binary: String,
}

impl DockerGateway<LocalRunner> {
    /// Create a gateway running the local `docker` binary
    pub fn new() -> Self {
        Self::with_runner(LocalRunner)
    }
}

impl Default for DockerGateway<LocalRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> DockerGateway<R> {
    /// Create a gateway over a custom command runner
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            binary: "docker".to_string(),
        }
    }

    /// Override the docker binary (e.g. `podman`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Access the underlying runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn docker<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    /// Run a command and turn a non-zero exit into `CommandFailed`
    async fn run_checked(&self, cmd: Command, timeout: Duration) -> Result<String> {
        let rendered = cmd.to_string();
        let result = self.runner.run(cmd, timeout).await?;
        if result.success() {
            Ok(result.stdout)
        } else {
            debug!(command = %rendered, code = ?result.code, "command failed");
            Err(Error::CommandFailed {
                command: rendered,
                code: result.code,
                stderr: result.stderr.trim().to_string(),
            })
        }
    }

    async fn stack_exists(&self, name: &str, mode: DeployMode) -> Result<bool> {
        match mode {
            DeployMode::Swarm => {
                let output = self
                    .run_checked(
                        self.docker(["stack", "ls", "--format", "{{.Name}}"]),
                        DEFAULT_TIMEOUT,
                    )
                    .await?;
                Ok(output.lines().any(|line| line.trim() == name))
            }
            DeployMode::Compose => {
                let filter = format!("label=com.docker.compose.project={}", name);
                let output = self
                    .run_checked(
                        self.docker(["ps", "-a", "-q", "--filter", filter.as_str()]),
                        DEFAULT_TIMEOUT,
                    )
                    .await?;
                Ok(!output.trim().is_empty())
            }
        }
    }

    async fn probe_cluster(&self) -> Result<bool> {
        let output = self
            .run_checked(
                self.docker(["info", "--format", "{{.Swarm.LocalNodeState}}"]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(output.trim() == "active")
    }

    /// Never cached: cluster mode can be toggled between calls.
    async fn current_mode(&self) -> Result<DeployMode> {
        if self.probe_cluster().await? {
            Ok(DeployMode::Swarm)
        } else {
            Ok(DeployMode::Compose)
        }
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> Orchestrator for DockerGateway<R> {
    async fn list(&self) -> Result<Vec<ContainerRecord>> {
        let output = self
            .run_checked(
                self.docker(["ps", "-a", "--no-trunc", "--format", LIST_FORMAT]),
                DEFAULT_TIMEOUT,
            )
            .await?;
        Ok(records::parse_container_list(&output))
    }

    async fn stats(&self) -> StatsSnapshot {
        let cmd = self.docker(["stats", "--no-stream", "--format", STATS_FORMAT]);
        match self.run_checked(cmd, DEFAULT_TIMEOUT).await {
            Ok(output) => StatsSnapshot {
                available: true,
                containers: records::parse_stats(&output),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "stats collection unavailable");
                StatsSnapshot::unavailable(e.to_string())
            }
        }
    }

    async fn stats_for(&self, id: &str) -> ContainerStats {
        let cmd = self.docker(["stats", "--no-stream", "--format", STATS_FORMAT, id]);
        match self.run_checked(cmd, DEFAULT_TIMEOUT).await {
            Ok(output) => records::parse_stats(&output)
                .into_iter()
                .next()
                .unwrap_or_else(|| ContainerStats::unavailable(id)),
            Err(e) => {
                warn!(container = %id, error = %e, "stats collection unavailable");
                ContainerStats::unavailable(id)
            }
        }
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.run_checked(self.docker(["start", id]), DEFAULT_TIMEOUT)
            .await
            .map(drop)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.run_checked(self.docker(["stop", id]), DEFAULT_TIMEOUT)
            .await
            .map(drop)
    }

    async fn restart(&self, id: &str) -> Result<()> {
        self.run_checked(self.docker(["restart", id]), DEFAULT_TIMEOUT)
            .await
            .map(drop)
    }

    async fn exec_in(&self, id: &str, cmd: &[String], timeout: Duration) -> Result<String> {
        let mut exec = self.docker(["exec", id]);
        exec.args(cmd);
        self.run_checked(exec, timeout).await
    }

    async fn copy_to(&self, id: &str, host_path: &str, container_path: &str) -> Result<()> {
        let dest = format!("{}:{}", id, container_path);
        self.run_checked(self.docker(["cp", host_path, dest.as_str()]), LONG_TIMEOUT)
            .await
            .map(drop)
    }

    async fn copy_from(&self, id: &str, container_path: &str, host_path: &str) -> Result<()> {
        let source = format!("{}:{}", id, container_path);
        self.run_checked(self.docker(["cp", source.as_str(), host_path]), LONG_TIMEOUT)
            .await
            .map(drop)
    }

    async fn is_cluster_active(&self) -> Result<bool> {
        self.probe_cluster().await
    }

    async fn ensure_network(&self, name: &str) -> Result<NetworkAction> {
        let inspect = self
            .runner
            .run(self.docker(["network", "inspect", name]), DEFAULT_TIMEOUT)
            .await?;
        if inspect.success() {
            return Ok(NetworkAction::Existing);
        }

        let create = match self.current_mode().await? {
            DeployMode::Swarm => self.docker([
                "network",
                "create",
                "--driver",
                "overlay",
                "--attachable",
                name,
            ]),
            DeployMode::Compose => self.docker(["network", "create", "--driver", "bridge", name]),
        };
        match self.run_checked(create, DEFAULT_TIMEOUT).await {
            Ok(_) => {
                info!(network = %name, "created network");
                Ok(NetworkAction::Created)
            }
            // Lost a race with a concurrent creator.
            Err(Error::CommandFailed { stderr, .. }) if stderr.contains("already exists") => {
                Ok(NetworkAction::Existing)
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_network(&self, name: &str) -> Result<bool> {
        match self
            .run_checked(self.docker(["network", "rm", name]), DEFAULT_TIMEOUT)
            .await
        {
            Ok(_) => {
                info!(network = %name, "removed network");
                Ok(true)
            }
            Err(Error::CommandFailed { stderr, .. })
                if stderr.contains("not found") || stderr.contains("No such network") =>
            {
                debug!(network = %name, "network already gone");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn deploy_native(&self, name: &str, document: &str) -> Result<NativeDeployment> {
        let mode = self.current_mode().await?;
        let existed = self.stack_exists(name, mode).await?;

        let mut cmd = match mode {
            DeployMode::Swarm => self.docker([
                "stack",
                "deploy",
                "--with-registry-auth",
                "-c",
                "-",
                name,
            ]),
            DeployMode::Compose => self.docker([
                "compose",
                "-p",
                name,
                "-f",
                "-",
                "up",
                "-d",
                "--remove-orphans",
            ]),
        };
        cmd.stdin_bytes(document);
        self.run_checked(cmd, LONG_TIMEOUT).await?;

        let action = if existed {
            StackAction::Updated
        } else {
            StackAction::Created
        };
        info!(stack = %name, ?mode, ?action, "deployed stack natively");
        Ok(NativeDeployment { mode, action })
    }

    async fn remove_native(&self, name: &str) -> Result<()> {
        let mode = self.current_mode().await?;
        if !self.stack_exists(name, mode).await? {
            return Err(Error::StackNotFound(name.to_string()));
        }

        let cmd = match mode {
            DeployMode::Swarm => self.docker(["stack", "rm", name]),
            DeployMode::Compose => self.docker(["compose", "-p", name, "down", "--remove-orphans"]),
        };
        self.run_checked(cmd, LONG_TIMEOUT).await?;
        info!(stack = %name, ?mode, "removed stack natively");
        Ok(())
    }

    async fn replica_states(&self, prefix: &str) -> Result<Vec<ReplicaState>> {
        match self.current_mode().await? {
            DeployMode::Swarm => {
                let filter = format!("name={}", prefix);
                let output = self
                    .run_checked(
                        self.docker([
                            "service",
                            "ls",
                            "--filter",
                            filter.as_str(),
                            "--format",
                            SERVICE_FORMAT,
                        ]),
                        DEFAULT_TIMEOUT,
                    )
                    .await?;
                Ok(records::parse_replicas(&output)
                    .into_iter()
                    .filter(|state| {
                        state.name == prefix || state.name.starts_with(&format!("{}_", prefix))
                    })
                    .collect())
            }
            DeployMode::Compose => Ok(self
                .list()
                .await?
                .into_iter()
                .filter(|c| c.belongs_to(prefix))
                .map(|c| ReplicaState {
                    running: u32::from(c.is_running()),
                    desired: 1,
                    name: c.name,
                })
                .collect()),
        }
    }
}
