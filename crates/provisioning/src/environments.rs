//! Ephemeral environments: a private database, network and tool stacks
//! created and destroyed as a unit.

use crate::deploy::{Backend, DeploymentStrategy, Removal};
use crate::error::{ProvisionError, Result};
use crate::log::{LogEntry, LogSink, ProvisionLog};
use crate::model::{Environment, EnvironmentState, GlobalConfig};
use crate::workflow::{InstallSettings, Provisioner, Target, environment_network};
use regex::Regex;
use serde::Serialize;
use service_templates::Tool;
use std::sync::{Arc, LazyLock};

/// Tools that can be placed in an environment
pub const ENVIRONMENT_TOOLS: [Tool; 2] = [Tool::WorkflowEngine, Tool::MessagingGateway];

static ENVIRONMENT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,31}$").ok());

/// Check `name` against the environment naming rule
pub fn validate_environment_name(name: &str) -> Result<()> {
    let valid = ENVIRONMENT_NAME
        .as_ref()
        .is_some_and(|re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(ProvisionError::InvalidEnvironmentName(name.to_string()))
    }
}

/// How removing one stack went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    /// Removed by `backend`
    Removed {
        /// Backend that removed the stack
        backend: Backend,
    },
    /// Neither backend knew the stack
    AlreadyAbsent,
    /// Both backends failed
    Failed {
        /// Final error
        error: String,
    },
}

impl From<Removal> for RemovalOutcome {
    fn from(removal: Removal) -> Self {
        match removal {
            Removal::Removed { backend } => RemovalOutcome::Removed { backend },
            Removal::AlreadyAbsent => RemovalOutcome::AlreadyAbsent,
        }
    }
}

/// One stack of a destroyed environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackRemoval {
    /// Stack name
    pub stack: String,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: RemovalOutcome,
}

/// The private network of a destroyed environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkRemoval {
    /// Network name
    pub network: String,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: RemovalOutcome,
}

/// Per-stack result of [`EnvironmentManager::destroy`]
#[derive(Debug, Clone, Serialize)]
pub struct DestroyReport {
    /// Environment name
    pub name: String,
    /// Stacks in creation order
    pub stacks: Vec<StackRemoval>,
    /// The environment's network, removed after its stacks
    pub network: NetworkRemoval,
    /// Full transcript
    pub logs: Vec<LogEntry>,
}

impl DestroyReport {
    /// Stacks whose removal failed
    pub fn failures(&self) -> impl Iterator<Item = &StackRemoval> {
        self.stacks
            .iter()
            .filter(|s| matches!(s.outcome, RemovalOutcome::Failed { .. }))
    }

    /// Whether every stack and the network are gone
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
            && !matches!(self.network.outcome, RemovalOutcome::Failed { .. })
    }
}

/// Result of [`EnvironmentManager::create`] once deployment has started
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    /// Environment name
    pub name: String,
    /// Whether every stack was deployed
    pub success: bool,
    /// The record as stored after a successful create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full transcript
    pub logs: Vec<LogEntry>,
}

/// An environment joined with live orchestrator state
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    /// Persisted record
    #[serde(flatten)]
    pub environment: Environment,
    /// Running containers of the environment's stacks
    pub live: usize,
    /// All containers of the environment's stacks
    pub total: usize,
    /// Effective status
    #[serde(rename = "effective_status")]
    pub status: EnvironmentState,
}

/// Creates, destroys and reports on environments
pub struct EnvironmentManager {
    provisioner: Arc<Provisioner>,
}

impl EnvironmentManager {
    /// Manager sharing `provisioner`'s gateway, stores and options
    pub fn new(provisioner: Arc<Provisioner>) -> Self {
        Self { provisioner }
    }

    /// Create environment `name` with its own database and `tools`
    ///
    /// Invalid names, unsupported tools and duplicates are rejected as errors
    /// before anything is recorded or deployed. Once the record exists every
    /// outcome is reported through the returned [`CreateReport`] together with
    /// the transcript. The record is written before anything is deployed and
    /// every deployed stack is appended as soon as its deploy returns, so a
    /// failure part way leaves a `creating` record that
    /// [`EnvironmentManager::destroy`] can clean up.
    pub async fn create(
        &self,
        name: &str,
        tools: &[Tool],
        on_log: Option<LogSink<'_>>,
    ) -> Result<CreateReport> {
        validate_environment_name(name)?;
        let mut requested: Vec<Tool> = Vec::with_capacity(tools.len());
        for &tool in tools {
            if !ENVIRONMENT_TOOLS.contains(&tool) {
                return Err(ProvisionError::UnsupportedTool(tool.id().to_string()));
            }
            if !requested.contains(&tool) {
                requested.push(tool);
            }
        }

        let stores = self.provisioner.stores();
        let config = stores.config.load()?;
        if !stores.environments.create(Environment::new(name))? {
            return Err(ProvisionError::EnvironmentExists(name.to_string()));
        }

        let mut log = ProvisionLog::new(on_log);
        log.info(format!("creating environment {}", name));
        let created = match self.populate(name, &requested, &config, &mut log).await {
            Ok(()) => self.finish_create(name),
            Err(e) => Err(e),
        };

        match created {
            Ok(environment) => {
                log.success(format!("environment {} running", name));
                Ok(CreateReport {
                    name: name.to_string(),
                    success: true,
                    environment: Some(environment),
                    error: None,
                    logs: log.into_entries(),
                })
            }
            Err(e) => {
                log.error(format!(
                    "environment {} failed: {}; deployed stacks stay recorded for destroy",
                    name, e
                ));
                Ok(CreateReport {
                    name: name.to_string(),
                    success: false,
                    environment: None,
                    error: Some(e.to_string()),
                    logs: log.into_entries(),
                })
            }
        }
    }

    fn finish_create(&self, name: &str) -> Result<Environment> {
        let environments = &self.provisioner.stores().environments;
        environments.advance(name, EnvironmentState::Running)?;
        environments
            .get(name)?
            .ok_or_else(|| ProvisionError::EnvironmentNotFound(name.to_string()))
    }

    async fn populate(
        &self,
        name: &str,
        tools: &[Tool],
        config: &GlobalConfig,
        log: &mut ProvisionLog<'_>,
    ) -> Result<()> {
        let provisioner = &self.provisioner;
        let environments = &provisioner.stores().environments;
        let strategy = provisioner.strategy(config, Tool::Database);
        let settings = InstallSettings::default();

        provisioner
            .ensure_network(&environment_network(name), log)
            .await?;

        let db = Target::in_environment(Tool::Database, name, config);
        let deployed = provisioner
            .deploy_tool(config, &strategy, &db, &settings, log)
            .await?;
        environments.append_stack(name, &db.stack)?;
        environments.set_credentials(name, Tool::Database.id(), deployed.credentials)?;
        let readiness = provisioner
            .await_readiness(Tool::Database, &db.stack, log)
            .await;
        provisioner.settle_database(&db.stack, &readiness, log).await?;
        log.success(format!("database provisioned for {}", name));

        for &tool in tools {
            let target = Target::in_environment(tool, name, config);
            let deployed = provisioner
                .deploy_tool(config, &strategy, &target, &settings, log)
                .await?;
            environments.append_stack(name, &target.stack)?;
            environments.set_credentials(name, tool.id(), deployed.credentials)?;
            provisioner.await_readiness(tool, &target.stack, log).await;
        }
        Ok(())
    }

    /// Remove every stack of `name`, then the record
    ///
    /// The management API is authenticated once for the whole teardown. A
    /// stack that fails to go away is reported and skipped. The private
    /// network is removed after the stacks on a best-effort basis, and the
    /// record is deleted regardless.
    pub async fn destroy(&self, name: &str, on_log: Option<LogSink<'_>>) -> Result<DestroyReport> {
        let stores = self.provisioner.stores();
        let environment = stores
            .environments
            .get(name)?
            .ok_or_else(|| ProvisionError::EnvironmentNotFound(name.to_string()))?;
        let config = stores.config.load()?;

        let mut log = ProvisionLog::new(on_log);
        log.info(format!(
            "destroying environment {} ({} stacks)",
            name,
            environment.stacks.len()
        ));
        let strategy = DeploymentStrategy::connected(
            self.provisioner.orchestrator().clone(),
            self.provisioner.api_provider().as_ref(),
            config.management_api.as_ref(),
        )
        .await;
        if strategy.has_remote() {
            log.info("management API authenticated");
        } else {
            log.info("removing stacks with the native backend");
        }

        let mut stacks = Vec::with_capacity(environment.stacks.len());
        for stack in &environment.stacks {
            let outcome = match strategy.remove(stack).await {
                Ok(removal) => {
                    match removal {
                        Removal::Removed { backend } => {
                            log.success(format!("stack {} removed via {}", stack, backend))
                        }
                        Removal::AlreadyAbsent => log.info(format!("stack {} already gone", stack)),
                    }
                    removal.into()
                }
                Err(e) => {
                    log.error(format!("failed to remove stack {}: {}", stack, e));
                    RemovalOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            stacks.push(StackRemoval {
                stack: stack.clone(),
                outcome,
            });
        }

        let network = environment_network(name);
        let network_outcome = match self
            .provisioner
            .orchestrator()
            .remove_network(&network)
            .await
        {
            Ok(true) => {
                log.success(format!("network {} removed", network));
                RemovalOutcome::Removed {
                    backend: Backend::Native,
                }
            }
            Ok(false) => {
                log.info(format!("network {} already gone", network));
                RemovalOutcome::AlreadyAbsent
            }
            Err(e) => {
                log.error(format!("failed to remove network {}: {}", network, e));
                RemovalOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        stores
            .environments
            .advance(name, EnvironmentState::Destroyed)?;
        stores.environments.remove(name)?;
        let failed = stacks
            .iter()
            .filter(|s| matches!(s.outcome, RemovalOutcome::Failed { .. }))
            .count();
        if failed == 0 {
            log.success(format!("environment {} destroyed", name));
        } else {
            log.error(format!(
                "environment {} removed with {} stack(s) left behind",
                name, failed
            ));
        }

        Ok(DestroyReport {
            name: name.to_string(),
            stacks,
            network: NetworkRemoval {
                network,
                outcome: network_outcome,
            },
            logs: log.into_entries(),
        })
    }

    /// Every environment with live container counts
    ///
    /// An environment is effectively running when it has containers and all
    /// of them run; otherwise its persisted status stands.
    pub async fn status(&self) -> Result<Vec<EnvironmentStatus>> {
        let environments = self.provisioner.stores().environments.list()?;
        let containers = self.provisioner.orchestrator().list().await?;

        Ok(environments
            .into_iter()
            .map(|environment| {
                let owned: Vec<_> = containers
                    .iter()
                    .filter(|c| environment.stacks.iter().any(|s| c.belongs_to(s)))
                    .collect();
                let total = owned.len();
                let live = owned.iter().filter(|c| c.is_running()).count();
                let status = if total > 0 && live == total {
                    EnvironmentState::Running
                } else {
                    environment.status
                };
                EnvironmentStatus {
                    environment,
                    live,
                    total,
                    status,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_names() {
        for ok in ["qa", "pr-123", "0day", "a"] {
            assert!(validate_environment_name(ok).is_ok(), "{ok}");
        }
        let too_long = "x".repeat(33);
        for bad in ["", "-qa", "QA", "qa_1", "qa.1", too_long.as_str()] {
            assert!(validate_environment_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_stack_removal_serializes_flat() {
        let removal = StackRemoval {
            stack: "env-qa-n8n".into(),
            outcome: RemovalOutcome::Failed {
                error: "boom".into(),
            },
        };
        let json = serde_json::to_value(&removal).unwrap();
        assert_eq!(json["stack"], "env-qa-n8n");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["error"], "boom");
    }
}
