//! # Service Templates
//!
//! The fixed catalog of installable tools and the renderer that turns a
//! typed per-tool configuration into a service definition document.
//!
//! Rendering is a pure function of its input: every map in the document
//! model is ordered, and secrets are passed in rather than generated here,
//! so rendering the same [`ToolConfig`] twice yields identical text.
//!
//! ```
//! use service_templates::{render, DatabaseConfig, StackContext, Tool, ToolConfig};
//!
//! let context = StackContext::new(Tool::Database, "postgres", "toolstack_public");
//! let yaml = render(&ToolConfig::Database(DatabaseConfig {
//!     context,
//!     root_password: "s3cret".into(),
//! }))
//! .unwrap();
//! assert!(yaml.contains("postgres:16-alpine"));
//! ```

#![warn(missing_docs)]

mod config;
mod document;
mod render;
mod tool;

pub use config::{
    DatabaseConfig, DbCoordinates, ManagementUiConfig, MessagingGatewayConfig, StackContext,
    ToolConfig, WorkflowEngineConfig,
};
pub use document::{
    ComposeDocument, DeploySpec, NetworkRef, Placement, ResourceLimits, Resources, RestartPolicy,
    ServiceNetwork, ServiceSpec, VolumeSpec,
};
pub use render::{build_document, render, routing_labels};
pub use tool::Tool;

/// Error types for catalog lookups and rendering
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Tool id not in the catalog
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Configuration rejected before rendering
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// YAML serialization failed
    #[error("failed to serialize document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for template operations
pub type Result<T> = std::result::Result<T, Error>;
