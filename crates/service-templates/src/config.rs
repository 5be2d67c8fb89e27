//! Typed inputs to the renderer.

use crate::Tool;
use crate::document::ResourceLimits;

/// Where and how a stack is placed, shared by every tool config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackContext {
    /// Stack the document will be deployed as
    pub stack_name: String,
    /// External network the service attaches to
    pub network: String,
    /// Public domain routed to the service, if any
    pub domain: Option<String>,
    /// TLS certificate resolver used by the edge router
    pub cert_resolver: String,
    /// Resource limits for the service
    pub limits: ResourceLimits,
}

impl StackContext {
    /// Context with the tool's default limits, no domain and the default resolver
    pub fn new(tool: Tool, stack_name: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            network: network.into(),
            domain: None,
            cert_resolver: "letsencryptresolver".to_string(),
            limits: tool.default_limits(),
        }
    }

    /// Route a public domain to the service
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Use a different certificate resolver
    pub fn with_cert_resolver(mut self, resolver: impl Into<String>) -> Self {
        self.cert_resolver = resolver.into();
        self
    }

    /// Override resource limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Externally visible base URL
    pub fn public_url(&self, port: u16) -> String {
        match &self.domain {
            Some(domain) => format!("https://{}", domain),
            None => format!("http://localhost:{}", port),
        }
    }
}

/// How a dependent tool reaches its logical database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCoordinates {
    /// Database host name on the stack network
    pub host: String,
    /// Database port
    pub port: u16,
    /// Logical database name
    pub database: String,
    /// Role owning the database
    pub user: String,
    /// Role password
    pub password: String,
}

impl DbCoordinates {
    /// `postgresql://` connection URI
    pub fn connection_uri(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Database stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Placement
    pub context: StackContext,
    /// Superuser password
    pub root_password: String,
}

/// Workflow engine stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEngineConfig {
    /// Placement
    pub context: StackContext,
    /// Database the engine stores its state in
    pub db: DbCoordinates,
    /// Key used to encrypt stored credentials
    pub encryption_key: String,
    /// `GENERIC_TIMEZONE` value
    pub timezone: String,
}

/// Messaging gateway stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingGatewayConfig {
    /// Placement
    pub context: StackContext,
    /// Database the gateway stores its state in
    pub db: DbCoordinates,
    /// Global API key
    pub api_key: String,
}

/// Management UI stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementUiConfig {
    /// Placement
    pub context: StackContext,
}

/// Configuration for exactly one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolConfig {
    /// See [`DatabaseConfig`]
    Database(DatabaseConfig),
    /// See [`WorkflowEngineConfig`]
    WorkflowEngine(WorkflowEngineConfig),
    /// See [`MessagingGatewayConfig`]
    MessagingGateway(MessagingGatewayConfig),
    /// See [`ManagementUiConfig`]
    ManagementUi(ManagementUiConfig),
}

impl ToolConfig {
    /// Tool this configuration renders
    pub fn tool(&self) -> Tool {
        match self {
            ToolConfig::Database(_) => Tool::Database,
            ToolConfig::WorkflowEngine(_) => Tool::WorkflowEngine,
            ToolConfig::MessagingGateway(_) => Tool::MessagingGateway,
            ToolConfig::ManagementUi(_) => Tool::ManagementUi,
        }
    }

    /// Placement shared by all variants
    pub fn context(&self) -> &StackContext {
        match self {
            ToolConfig::Database(c) => &c.context,
            ToolConfig::WorkflowEngine(c) => &c.context,
            ToolConfig::MessagingGateway(c) => &c.context,
            ToolConfig::ManagementUi(c) => &c.context,
        }
    }
}
