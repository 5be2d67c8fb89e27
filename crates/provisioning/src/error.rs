//! Error types for provisioning operations

use std::time::Duration;
use thiserror::Error;

/// Failures reading or writing the persisted documents
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not valid JSON of the expected shape
    #[error("store document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// The temporary file could not replace the document
    #[error("failed to persist store document: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// Config key not recognised by `GlobalConfig::set`
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// The in-process lock was poisoned by a panicking writer
    #[error("store lock poisoned")]
    Poisoned,
}

/// Failures of a single deployment backend
#[derive(Error, Debug)]
pub enum DeployError {
    /// The service definition document is not usable; no backend can help
    #[error("invalid service definition: {0}")]
    InvalidDocument(String),

    /// The management API rejected or failed the call
    #[error(transparent)]
    Remote(#[from] management_api::Error),

    /// The native orchestrator path failed
    #[error(transparent)]
    Native(#[from] orchestrator_gateway::Error),
}

impl DeployError {
    /// Whether the native backend should be tried after this error
    pub fn allows_fallback(&self) -> bool {
        matches!(self, DeployError::Remote(_))
    }

    /// Whether this error means the stack does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            DeployError::Remote(e) => e.is_not_found(),
            DeployError::Native(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Errors surfaced by the provisioning workflows
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Orchestrator command failure
    #[error(transparent)]
    Gateway(#[from] orchestrator_gateway::Error),

    /// Management API failure outside a deploy
    #[error(transparent)]
    Api(#[from] management_api::Error),

    /// Document rendering failure
    #[error(transparent)]
    Render(#[from] service_templates::Error),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Both deployment backends failed, or the document was rejected
    #[error("deploy failed: {0}")]
    Deploy(#[from] DeployError),

    /// The database never reported ready within its budget
    #[error("database stack {stack} not ready after {waited:?}")]
    DatabaseNotReady {
        /// Database stack name
        stack: String,
        /// How long readiness was awaited
        waited: Duration,
    },

    /// An environment with this name is already recorded
    #[error("environment already exists: {0}")]
    EnvironmentExists(String),

    /// No environment with this name is recorded
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    /// Name does not satisfy the naming rule
    #[error("invalid environment name {0:?}: use 1-32 lowercase letters, digits or '-', starting with a letter or digit")]
    InvalidEnvironmentName(String),

    /// Tool cannot be used in this context
    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    /// Install override not recognised
    #[error("unknown install setting {0:?} (expected cpus, memory or timezone)")]
    InvalidSetting(String),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
