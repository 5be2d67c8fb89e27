//! The closed catalog of installable tools.

use crate::Error;
use crate::document::ResourceLimits;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// An installable tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    /// Shared relational database (PostgreSQL)
    Database,
    /// Workflow automation engine (n8n)
    WorkflowEngine,
    /// Messaging gateway (Evolution API)
    MessagingGateway,
    /// Container-management UI (Portainer)
    ManagementUi,
}

impl Tool {
    /// Every tool in the catalog
    pub const ALL: [Tool; 4] = [
        Tool::Database,
        Tool::WorkflowEngine,
        Tool::MessagingGateway,
        Tool::ManagementUi,
    ];

    /// Identifier used for stack names, credential keys and the CLI
    pub fn id(self) -> &'static str {
        match self {
            Tool::Database => "postgres",
            Tool::WorkflowEngine => "n8n",
            Tool::MessagingGateway => "evolution",
            Tool::ManagementUi => "portainer",
        }
    }

    /// Container image reference
    pub fn image(self) -> &'static str {
        match self {
            Tool::Database => "postgres:16-alpine",
            Tool::WorkflowEngine => "n8nio/n8n:latest",
            Tool::MessagingGateway => "atendai/evolution-api:v2.2.3",
            Tool::ManagementUi => "portainer/portainer-ce:latest",
        }
    }

    /// Port the service listens on inside its container
    pub fn port(self) -> u16 {
        match self {
            Tool::Database => 5432,
            Tool::WorkflowEngine => 5678,
            Tool::MessagingGateway => 8080,
            Tool::ManagementUi => 9000,
        }
    }

    /// Tools that must be running before this one is deployed
    pub fn dependencies(self) -> &'static [Tool] {
        match self {
            Tool::WorkflowEngine | Tool::MessagingGateway => &[Tool::Database],
            Tool::Database | Tool::ManagementUi => &[],
        }
    }

    /// Whether this tool stores its state in the database
    pub fn requires_database(self) -> bool {
        self.dependencies().contains(&Tool::Database)
    }

    /// Canonical stack name of the shared installation
    pub fn stack_name(self) -> String {
        self.id().to_string()
    }

    /// Stack name of this tool inside an environment
    pub fn environment_stack_name(self, environment: &str) -> String {
        format!("env-{}-{}", environment, self.id())
    }

    /// How long to wait for the tool's replicas to converge after deploy
    pub fn readiness_timeout(self) -> Duration {
        match self {
            Tool::Database => Duration::from_secs(120),
            _ => Duration::from_secs(180),
        }
    }

    /// Resource limits applied unless overridden
    pub fn default_limits(self) -> ResourceLimits {
        match self {
            Tool::ManagementUi => ResourceLimits::new("0.5", "512M"),
            Tool::Database | Tool::WorkflowEngine | Tool::MessagingGateway => {
                ResourceLimits::new("1", "1024M")
            }
        }
    }

    /// Host name the tool's service answers to on the stack network
    ///
    /// The `<stack>_<service>` form is the swarm service name and is added
    /// as a network alias in compose mode, so it resolves under both.
    pub fn service_host(self, stack: &str) -> String {
        format!("{}_{}", stack, self.id())
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Tool {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "database" => Ok(Tool::Database),
            "n8n" | "workflow-engine" => Ok(Tool::WorkflowEngine),
            "evolution" | "messaging-gateway" => Ok(Tool::MessagingGateway),
            "portainer" | "management-ui" => Ok(Tool::ManagementUi),
            _ => Err(Error::UnknownTool(s.to_string())),
        }
    }
}
