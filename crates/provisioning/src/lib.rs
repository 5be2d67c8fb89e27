#![warn(missing_docs)]

//! # Provisioning
//!
//! Install, uninstall and environment workflows for the tool catalog.
//!
//! A [`Provisioner`] drives one install or uninstall at a time over an
//! [`orchestrator_gateway::Orchestrator`], deploying through a
//! [`DeploymentStrategy`] that prefers the management API and falls back to
//! the native orchestrator CLI. An [`EnvironmentManager`] builds on the same
//! steps to create and destroy isolated sandboxes.
//!
//! Workflows never panic or propagate errors past their boundary: every
//! install and uninstall yields an outcome carrying a log transcript, so the
//! caller can always show what happened up to the failing step.
//!
//! ## Example
//!
//! ```rust,no_run
//! use orchestrator_gateway::DockerGateway;
//! use management_api::PortainerProvider;
//! use provisioning::{InstallRequest, Provisioner, Stores};
//! use service_templates::Tool;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let provisioner = Provisioner::new(
//!     Arc::new(DockerGateway::new()),
//!     Arc::new(PortainerProvider),
//!     Stores::open("/var/lib/toolstack"),
//! );
//! let request = InstallRequest::new(Tool::WorkflowEngine).with_domain("n8n.example.com");
//! let outcome = provisioner.install_tool(&request, None).await;
//! println!("installed: {}", outcome.success);
//! # }
//! ```

pub mod deploy;
pub mod environments;
pub mod error;
pub mod log;
pub mod model;
pub mod readiness;
pub mod secrets;
pub mod store;
pub mod workflow;

pub use deploy::{
    Backend, DeployAction, Deployment, DeploymentStrategy, NativeDeployer, Removal,
    RemoteDeployer, StackDeployer, validate_document,
};
pub use environments::{
    CreateReport, DestroyReport, ENVIRONMENT_TOOLS, EnvironmentManager, EnvironmentStatus,
    NetworkRemoval, RemovalOutcome, StackRemoval, validate_environment_name,
};
pub use error::{DeployError, ProvisionError, Result, StoreError};
pub use log::{LogEntry, LogKind, LogSink, ProvisionLog};
pub use model::{CredentialMap, CredentialRecord, Environment, EnvironmentState, GlobalConfig};
pub use readiness::{DEFAULT_POLL_INTERVAL, Readiness, ReadinessPoller};
pub use secrets::{KEY_BYTES, SECRET_BYTES, generate_secret};
pub use store::{ConfigStore, CredentialStore, EnvironmentStore, Stores};
pub use workflow::{
    InstallOutcome, InstallRequest, MANAGEMENT_UI_ADMIN, ProvisionOptions, Provisioner,
    UninstallOutcome, environment_network,
};
