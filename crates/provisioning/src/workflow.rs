//! Install and uninstall workflows for catalog tools.

use crate::deploy::{Backend, Deployment, DeploymentStrategy, Removal};
use crate::error::{ProvisionError, Result};
use crate::log::{LogEntry, LogSink, ProvisionLog};
use crate::model::{CredentialRecord, GlobalConfig};
use crate::readiness::{DEFAULT_POLL_INTERVAL, Readiness, ReadinessPoller};
use crate::secrets::{KEY_BYTES, SECRET_BYTES, generate_secret};
use crate::store::Stores;
use async_io::Timer;
use management_api::{ManagementApiProvider, ManagementApiSettings};
use orchestrator_gateway::{DEFAULT_TIMEOUT, NetworkAction, Orchestrator, ServiceClass};
use serde::Serialize;
use service_templates::{
    DatabaseConfig, DbCoordinates, ManagementUiConfig, MessagingGatewayConfig, ResourceLimits,
    StackContext, Tool, ToolConfig, WorkflowEngineConfig, render,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Admin account created on the management UI
pub const MANAGEMENT_UI_ADMIN: &str = "admin";

const DATABASE_SUPERUSER: &str = "postgres";

/// Timing knobs for the workflows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Readiness budget for database stacks
    pub database_timeout: Duration,
    /// Readiness budget for every other tool
    pub tool_timeout: Duration,
    /// Pause after the database converges, before dependents use it
    pub settle_delay: Duration,
    /// Pause between readiness polls
    pub poll_interval: Duration,
    /// Status probes before giving up on the management UI bootstrap
    pub bootstrap_attempts: u32,
    /// Pause between status probes
    pub bootstrap_interval: Duration,
    /// Abort when a database never reports ready instead of continuing
    pub strict_database_readiness: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            database_timeout: Tool::Database.readiness_timeout(),
            tool_timeout: Tool::WorkflowEngine.readiness_timeout(),
            settle_delay: Duration::from_secs(5),
            poll_interval: DEFAULT_POLL_INTERVAL,
            bootstrap_attempts: 30,
            bootstrap_interval: Duration::from_secs(5),
            strict_database_readiness: true,
        }
    }
}

/// What to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Tool to install
    pub tool: Tool,
    /// Public domain to route to the tool
    pub domain: Option<String>,
    /// Optional overrides: `cpus`, `memory`, `timezone`
    pub settings: BTreeMap<String, String>,
}

impl InstallRequest {
    /// Install `tool` with defaults
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            domain: None,
            settings: BTreeMap::new(),
        }
    }

    /// Route `domain` to the tool
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Add an override
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

/// Result of an install, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    /// Whether the tool was installed
    pub success: bool,
    /// Stack the tool was deployed as
    #[serde(rename = "stackName", skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,
    /// Backend that deployed it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    /// Generated secrets and connection values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, String>>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full transcript
    pub logs: Vec<LogEntry>,
}

/// Result of an uninstall, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct UninstallOutcome {
    /// Whether the tool is gone
    pub success: bool,
    /// How the stack was removed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal: Option<Removal>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full transcript
    pub logs: Vec<LogEntry>,
}

/// Parsed install overrides
#[derive(Debug, Clone, Default)]
pub(crate) struct InstallSettings {
    cpus: Option<String>,
    memory: Option<String>,
    timezone: Option<String>,
}

impl InstallSettings {
    fn parse(settings: &BTreeMap<String, String>) -> Result<Self> {
        let mut parsed = Self::default();
        for (key, value) in settings {
            let slot = match key.as_str() {
                "cpus" => &mut parsed.cpus,
                "memory" => &mut parsed.memory,
                "timezone" => &mut parsed.timezone,
                other => return Err(ProvisionError::InvalidSetting(other.to_string())),
            };
            *slot = Some(value.clone());
        }
        Ok(parsed)
    }

    fn limits(&self, tool: Tool) -> ResourceLimits {
        let defaults = tool.default_limits();
        ResourceLimits::new(
            self.cpus.clone().unwrap_or(defaults.cpus),
            self.memory.clone().unwrap_or(defaults.memory),
        )
    }
}

/// Where one tool's stack goes and which database stack serves it
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub tool: Tool,
    pub stack: String,
    pub network: String,
    pub domain: Option<String>,
    pub db_stack: String,
}

impl Target {
    pub fn shared(tool: Tool, config: &GlobalConfig, domain: Option<String>) -> Self {
        Self {
            tool,
            stack: tool.stack_name(),
            network: config.network_name.clone(),
            domain,
            db_stack: Tool::Database.stack_name(),
        }
    }

    /// `tool` inside environment `env`, routed to `<tool>-<env>.<domain_base>`
    pub fn in_environment(tool: Tool, env: &str, config: &GlobalConfig) -> Self {
        Self {
            tool,
            stack: tool.environment_stack_name(env),
            network: environment_network(env),
            domain: (tool != Tool::Database)
                .then(|| format!("{}-{}.{}", tool.id(), env, config.domain_base)),
            db_stack: Tool::Database.environment_stack_name(env),
        }
    }
}

/// Isolated network of environment `env`
pub fn environment_network(env: &str) -> String {
    format!("env-{}-net", env)
}

/// A deployed tool and the secrets it was deployed with
#[derive(Debug, Clone)]
pub(crate) struct DeployedTool {
    pub deployment: Deployment,
    pub credentials: BTreeMap<String, String>,
}

/// Runs install and uninstall workflows
pub struct Provisioner {
    orchestrator: Arc<dyn Orchestrator>,
    api_provider: Arc<dyn ManagementApiProvider>,
    stores: Stores,
    options: ProvisionOptions,
}

impl Provisioner {
    /// Provisioner with default options
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        api_provider: Arc<dyn ManagementApiProvider>,
        stores: Stores,
    ) -> Self {
        Self {
            orchestrator,
            api_provider,
            stores,
            options: ProvisionOptions::default(),
        }
    }

    /// Replace the timing options
    pub fn with_options(mut self, options: ProvisionOptions) -> Self {
        self.options = options;
        self
    }

    /// Timing options in effect
    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }

    /// Backing stores
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Orchestrator gateway
    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    /// Management API client factory
    pub fn api_provider(&self) -> &Arc<dyn ManagementApiProvider> {
        &self.api_provider
    }

    /// Install a tool
    ///
    /// Never fails: errors are reported in the outcome together with the
    /// transcript up to the failing step.
    pub async fn install_tool(
        &self,
        request: &InstallRequest,
        on_log: Option<LogSink<'_>>,
    ) -> InstallOutcome {
        let mut log = ProvisionLog::new(on_log);
        let tool = request.tool;
        log.info(format!("installing {}", tool));

        match self.install(request, &mut log).await {
            Ok(deployed) => {
                log.success(format!("{} installed", tool));
                InstallOutcome {
                    success: true,
                    stack_name: Some(deployed.deployment.stack),
                    backend: Some(deployed.deployment.backend),
                    credentials: Some(deployed.credentials),
                    error: None,
                    logs: log.into_entries(),
                }
            }
            Err(e) => {
                log.error(format!("installation of {} failed: {}", tool, e));
                InstallOutcome {
                    success: false,
                    stack_name: None,
                    backend: None,
                    credentials: None,
                    error: Some(e.to_string()),
                    logs: log.into_entries(),
                }
            }
        }
    }

    async fn install(
        &self,
        request: &InstallRequest,
        log: &mut ProvisionLog<'_>,
    ) -> Result<DeployedTool> {
        let tool = request.tool;
        let settings = InstallSettings::parse(&request.settings)?;
        let config = self.stores.config.load()?;
        let strategy = self.strategy(&config, tool);

        self.ensure_network(&config.network_name, log).await?;
        if tool.requires_database() {
            self.ensure_shared_database(&config, &strategy, log).await?;
        }

        let target = Target::shared(tool, &config, request.domain.clone());
        let deployed = self
            .deploy_tool(&config, &strategy, &target, &settings, log)
            .await?;
        self.await_readiness(tool, &target.stack, log).await;

        if tool == Tool::ManagementUi {
            self.bootstrap_management_ui(&deployed.credentials, log)
                .await?;
        }

        self.stores.credentials.put(
            tool.id(),
            CredentialRecord::new(deployed.credentials.clone()),
        )?;
        log.info(format!("credentials for {} saved", tool));
        Ok(deployed)
    }

    /// Uninstall a tool
    ///
    /// A tool that was never installed, or whose stack is already gone, is
    /// uninstalled successfully. The credential record is deleted once the
    /// stack is gone.
    pub async fn uninstall_tool(&self, tool: Tool, on_log: Option<LogSink<'_>>) -> UninstallOutcome {
        let mut log = ProvisionLog::new(on_log);
        log.info(format!("uninstalling {}", tool));

        match self.uninstall(tool, &mut log).await {
            Ok(removal) => {
                log.success(format!("{} uninstalled", tool));
                UninstallOutcome {
                    success: true,
                    removal: Some(removal),
                    error: None,
                    logs: log.into_entries(),
                }
            }
            Err(e) => {
                log.error(format!("uninstall of {} failed: {}", tool, e));
                UninstallOutcome {
                    success: false,
                    removal: None,
                    error: Some(e.to_string()),
                    logs: log.into_entries(),
                }
            }
        }
    }

    async fn uninstall(&self, tool: Tool, log: &mut ProvisionLog<'_>) -> Result<Removal> {
        let config = self.stores.config.load()?;
        let strategy = self.strategy(&config, tool);
        let stack = tool.stack_name();

        log.info(format!("removing stack {}", stack));
        let removal = strategy.remove(&stack).await?;
        match removal {
            Removal::Removed { backend } => {
                log.success(format!("stack {} removed via {}", stack, backend))
            }
            Removal::AlreadyAbsent => log.info(format!("stack {} was not deployed", stack)),
        }

        if self.stores.credentials.remove(tool.id())? {
            log.info(format!("credentials for {} deleted", tool));
        }
        if tool == Tool::ManagementUi && config.management_api.is_some() {
            self.stores.config.set_management_api(None)?;
            log.info("management API settings cleared");
        }
        Ok(removal)
    }

    /// Deployment strategy for `tool`
    ///
    /// The management UI is always deployed natively: it is the API backend.
    pub(crate) fn strategy(&self, config: &GlobalConfig, tool: Tool) -> DeploymentStrategy {
        if tool == Tool::ManagementUi {
            return DeploymentStrategy::native_only(self.orchestrator.clone());
        }
        DeploymentStrategy::from_settings(
            self.orchestrator.clone(),
            self.api_provider.as_ref(),
            config.management_api.as_ref(),
        )
    }

    pub(crate) async fn ensure_network(&self, name: &str, log: &mut ProvisionLog<'_>) -> Result<()> {
        match self.orchestrator.ensure_network(name).await? {
            NetworkAction::Created => log.success(format!("network {} created", name)),
            NetworkAction::Existing => log.info(format!("network {} exists", name)),
        }
        Ok(())
    }

    async fn ensure_shared_database(
        &self,
        config: &GlobalConfig,
        strategy: &DeploymentStrategy,
        log: &mut ProvisionLog<'_>,
    ) -> Result<()> {
        let db_stack = Tool::Database.stack_name();
        let running = self.orchestrator.list().await?.iter().any(|c| {
            c.is_running() && c.class() == ServiceClass::Database && c.belongs_to(&db_stack)
        });
        if running {
            log.info("shared database already running");
            return Ok(());
        }

        log.info("shared database not running, provisioning it first");
        let target = Target::shared(Tool::Database, config, None);
        let deployed = self
            .deploy_tool(config, strategy, &target, &InstallSettings::default(), log)
            .await?;
        self.stores.credentials.put(
            Tool::Database.id(),
            CredentialRecord::new(deployed.credentials),
        )?;
        let readiness = self.await_readiness(Tool::Database, &db_stack, log).await;
        self.settle_database(&db_stack, &readiness, log).await?;
        log.success("database provisioned");
        Ok(())
    }

    /// Gate dependents on a database that was just deployed
    pub(crate) async fn settle_database(
        &self,
        db_stack: &str,
        readiness: &Readiness,
        log: &mut ProvisionLog<'_>,
    ) -> Result<()> {
        if !readiness.is_ready() {
            if self.options.strict_database_readiness {
                return Err(ProvisionError::DatabaseNotReady {
                    stack: db_stack.to_string(),
                    waited: self.options.database_timeout,
                });
            }
            log.warn(format!(
                "continuing although database {} never reported ready",
                db_stack
            ));
        }
        if !self.options.settle_delay.is_zero() {
            Timer::after(self.options.settle_delay).await;
        }
        Ok(())
    }

    /// Wait for `stack` to converge; a timeout is only logged
    pub(crate) async fn await_readiness(
        &self,
        tool: Tool,
        stack: &str,
        log: &mut ProvisionLog<'_>,
    ) -> Readiness {
        let timeout = match tool {
            Tool::Database => self.options.database_timeout,
            _ => self.options.tool_timeout,
        };
        log.info(format!("waiting for {} to become ready", stack));
        let poller = ReadinessPoller::new(self.orchestrator.clone(), self.options.poll_interval);
        let readiness = poller.wait(stack, timeout).await;
        match &readiness {
            Readiness::Ready => log.success(format!("{} is ready", stack)),
            Readiness::TimedOut { last_seen } => {
                let seen: Vec<String> = last_seen
                    .iter()
                    .map(|s| format!("{} {}/{}", s.name, s.running, s.desired))
                    .collect();
                log.warn(format!(
                    "{} not ready after {}s (last seen: {})",
                    stack,
                    timeout.as_secs(),
                    if seen.is_empty() {
                        "nothing".to_string()
                    } else {
                        seen.join(", ")
                    }
                ));
            }
            Readiness::Cancelled => log.warn(format!("readiness wait for {} cancelled", stack)),
        }
        readiness
    }

    /// Secrets, logical database, render and deploy for one tool
    pub(crate) async fn deploy_tool(
        &self,
        config: &GlobalConfig,
        strategy: &DeploymentStrategy,
        target: &Target,
        settings: &InstallSettings,
        log: &mut ProvisionLog<'_>,
    ) -> Result<DeployedTool> {
        let tool = target.tool;
        let mut context = StackContext::new(tool, &target.stack, &target.network)
            .with_cert_resolver(&config.cert_resolver)
            .with_limits(settings.limits(tool));
        if let Some(domain) = &target.domain {
            context = context.with_domain(domain);
        }
        let url = context.public_url(tool.port());
        let mut credentials = BTreeMap::new();

        let tool_config = match tool {
            Tool::Database => {
                let password = generate_secret(SECRET_BYTES);
                credentials.extend([
                    ("host".to_string(), Tool::Database.service_host(&target.stack)),
                    ("port".to_string(), tool.port().to_string()),
                    ("user".to_string(), DATABASE_SUPERUSER.to_string()),
                    ("password".to_string(), password.clone()),
                ]);
                ToolConfig::Database(DatabaseConfig {
                    context,
                    root_password: password,
                })
            }
            Tool::WorkflowEngine => {
                let db = self.logical_database(tool, &target.db_stack, log).await;
                let encryption_key = generate_secret(KEY_BYTES);
                credentials.extend(db_credentials(&db));
                credentials.insert("encryption_key".to_string(), encryption_key.clone());
                credentials.insert("url".to_string(), url);
                ToolConfig::WorkflowEngine(WorkflowEngineConfig {
                    context,
                    db,
                    encryption_key,
                    timezone: settings
                        .timezone
                        .clone()
                        .unwrap_or_else(|| config.timezone.clone()),
                })
            }
            Tool::MessagingGateway => {
                let db = self.logical_database(tool, &target.db_stack, log).await;
                let api_key = generate_secret(SECRET_BYTES);
                credentials.extend(db_credentials(&db));
                credentials.insert("api_key".to_string(), api_key.clone());
                credentials.insert("url".to_string(), url);
                ToolConfig::MessagingGateway(MessagingGatewayConfig {
                    context,
                    db,
                    api_key,
                })
            }
            Tool::ManagementUi => {
                credentials.insert("username".to_string(), MANAGEMENT_UI_ADMIN.to_string());
                credentials.insert("password".to_string(), generate_secret(SECRET_BYTES));
                credentials.insert("url".to_string(), url);
                ToolConfig::ManagementUi(ManagementUiConfig { context })
            }
        };
        if let Some(domain) = &target.domain {
            credentials.insert("domain".to_string(), domain.clone());
        }

        let document = render(&tool_config)?;
        log.info(format!("deploy started: {}", target.stack));
        let deployment = strategy.deploy(&target.stack, &document).await?;
        if let Some(reason) = &deployment.fallback_reason {
            log.warn(format!("management API unavailable ({}), used native deploy", reason));
        }
        log.success(format!(
            "stack {} {} via {}",
            deployment.stack, deployment.action, deployment.backend
        ));

        Ok(DeployedTool {
            deployment,
            credentials,
        })
    }

    /// Generate coordinates for `tool`'s own database and create it
    ///
    /// Failures are logged; a database or role that already exists is fine.
    async fn logical_database(
        &self,
        tool: Tool,
        db_stack: &str,
        log: &mut ProvisionLog<'_>,
    ) -> DbCoordinates {
        let db = DbCoordinates {
            host: Tool::Database.service_host(db_stack),
            port: Tool::Database.port(),
            database: tool.id().to_string(),
            user: tool.id().to_string(),
            password: generate_secret(SECRET_BYTES),
        };
        if let Err(e) = self.create_logical_database(db_stack, &db, log).await {
            log.error(format!("database setup for {} failed: {}", tool, e));
        }
        db
    }

    async fn create_logical_database(
        &self,
        db_stack: &str,
        db: &DbCoordinates,
        log: &mut ProvisionLog<'_>,
    ) -> Result<()> {
        let container = self
            .orchestrator
            .list()
            .await?
            .into_iter()
            .find(|c| c.is_running() && c.belongs_to(db_stack));
        let Some(container) = container else {
            log.error(format!("no running container for database stack {}", db_stack));
            return Ok(());
        };

        let upsert_role = format!(
            "DO $$ BEGIN \
             IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = '{user}') THEN \
             CREATE ROLE \"{user}\" LOGIN PASSWORD '{password}'; \
             ELSE ALTER ROLE \"{user}\" WITH LOGIN PASSWORD '{password}'; \
             END IF; END $$;",
            user = db.user,
            password = db.password,
        );
        self.psql(&container.id, &upsert_role).await?;

        let exists_sql = format!(
            "SELECT 1 FROM pg_database WHERE datname = '{}'",
            db.database
        );
        if self.psql(&container.id, &exists_sql).await?.trim() == "1" {
            log.info(format!("database {} already exists", db.database));
        } else {
            let create = format!(
                "CREATE DATABASE \"{}\" OWNER \"{}\"",
                db.database, db.user
            );
            self.psql(&container.id, &create).await?;
            log.success(format!("database created: {}", db.database));
        }

        let grant = format!(
            "GRANT ALL PRIVILEGES ON DATABASE \"{}\" TO \"{}\"",
            db.database, db.user
        );
        self.psql(&container.id, &grant).await?;
        Ok(())
    }

    async fn psql(&self, container: &str, sql: &str) -> Result<String> {
        let cmd: Vec<String> = [
            "psql",
            "-U",
            DATABASE_SUPERUSER,
            "-v",
            "ON_ERROR_STOP=1",
            "-tAc",
            sql,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Ok(self
            .orchestrator
            .exec_in(container, &cmd, DEFAULT_TIMEOUT)
            .await?)
    }

    /// Wait for the management UI, create its admin and remember the login
    async fn bootstrap_management_ui(
        &self,
        credentials: &BTreeMap<String, String>,
        log: &mut ProvisionLog<'_>,
    ) -> Result<()> {
        let field = |key: &str| credentials.get(key).cloned().unwrap_or_default();
        let settings = ManagementApiSettings {
            url: field("url"),
            username: field("username"),
            password: field("password"),
        };

        match self.api_provider.connect(&settings) {
            Ok(api) => {
                let attempts = self.options.bootstrap_attempts.max(1);
                let mut ready = false;
                for attempt in 1..=attempts {
                    if api.system_ready().await {
                        ready = true;
                        break;
                    }
                    if attempt < attempts && !self.options.bootstrap_interval.is_zero() {
                        Timer::after(self.options.bootstrap_interval).await;
                    }
                }
                if ready {
                    match api.init_admin(&settings.username, &settings.password).await {
                        Ok(()) => log.success("management UI admin account initialized"),
                        Err(e) => log.warn(format!(
                            "admin bootstrap failed, the account may already exist: {}",
                            e
                        )),
                    }
                } else {
                    log.warn(format!(
                        "management UI not answering after {} attempts, admin bootstrap skipped",
                        attempts
                    ));
                }
            }
            Err(e) => log.warn(format!("management API client unavailable: {}", e)),
        }

        self.stores.config.set_management_api(Some(settings))?;
        log.info("management API settings saved");
        Ok(())
    }
}

fn db_credentials(db: &DbCoordinates) -> [(String, String); 4] {
    [
        ("db_host".to_string(), db.host.clone()),
        ("db_name".to_string(), db.database.clone()),
        ("db_user".to_string(), db.user.clone()),
        ("db_password".to_string(), db.password.clone()),
    ]
}
