//! Deploying and removing stacks through the management API with a native
//! fallback.

use crate::error::DeployError;
use async_trait::async_trait;
use futures::lock::Mutex;
use management_api::{ManagementApi, ManagementApiProvider, ManagementApiSettings, Session};
use orchestrator_gateway::Orchestrator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which backend served an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The remote management API
    Api,
    /// The orchestrator CLI
    Native,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Api => "api",
            Backend::Native => "native",
        })
    }
}

/// Whether a deploy created or updated the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    /// New stack
    Created,
    /// Existing stack redeployed
    Updated,
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployAction::Created => "created",
            DeployAction::Updated => "updated",
        })
    }
}

impl From<management_api::StackAction> for DeployAction {
    fn from(action: management_api::StackAction) -> Self {
        match action {
            management_api::StackAction::Created => DeployAction::Created,
            management_api::StackAction::Updated => DeployAction::Updated,
        }
    }
}

impl From<orchestrator_gateway::StackAction> for DeployAction {
    fn from(action: orchestrator_gateway::StackAction) -> Self {
        match action {
            orchestrator_gateway::StackAction::Created => DeployAction::Created,
            orchestrator_gateway::StackAction::Updated => DeployAction::Updated,
        }
    }
}

/// Outcome of a successful deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Stack name
    pub stack: String,
    /// Backend that served the deploy
    pub backend: Backend,
    /// Create or update
    pub action: DeployAction,
    /// Why the remote backend was skipped, when it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Outcome of a successful removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Removal {
    /// The stack existed and was removed
    Removed {
        /// Backend that removed it
        backend: Backend,
    },
    /// Neither backend knew the stack
    AlreadyAbsent,
}

/// One way of deploying and removing stacks
#[async_trait]
pub trait StackDeployer: Send + Sync {
    /// Which backend this is
    fn backend(&self) -> Backend;

    /// Create or update `name` from `document`
    async fn deploy(&self, name: &str, document: &str) -> Result<Deployment, DeployError>;

    /// Remove `name`; a missing stack is reported via [`DeployError::is_not_found`]
    async fn remove(&self, name: &str) -> Result<(), DeployError>;
}

/// Deploys through the management API
///
/// The session is established on first use and reused afterwards.
pub struct RemoteDeployer {
    api: Arc<dyn ManagementApi>,
    session: Mutex<Option<Session>>,
}

impl RemoteDeployer {
    /// Deployer authenticating lazily
    pub fn new(api: Arc<dyn ManagementApi>) -> Self {
        Self {
            api,
            session: Mutex::new(None),
        }
    }

    /// Establish the session now, failing if authentication fails
    pub async fn connect(api: Arc<dyn ManagementApi>) -> Result<Self, DeployError> {
        let session = api.authenticate().await?;
        Ok(Self {
            api,
            session: Mutex::new(Some(session)),
        })
    }

    async fn session(&self) -> Result<Session, DeployError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = self.api.authenticate().await?;
        debug!(endpoint = session.endpoint_id, "management API session established");
        *slot = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl StackDeployer for RemoteDeployer {
    fn backend(&self) -> Backend {
        Backend::Api
    }

    async fn deploy(&self, name: &str, document: &str) -> Result<Deployment, DeployError> {
        let session = self.session().await?;
        let deployed = self.api.deploy_stack(&session, name, document).await?;
        Ok(Deployment {
            stack: name.to_string(),
            backend: Backend::Api,
            action: deployed.action.into(),
            fallback_reason: None,
        })
    }

    async fn remove(&self, name: &str) -> Result<(), DeployError> {
        let session = self.session().await?;
        Ok(self.api.remove_stack_by_name(&session, name).await?)
    }
}

/// Deploys through the orchestrator CLI
pub struct NativeDeployer {
    orchestrator: Arc<dyn Orchestrator>,
}

impl NativeDeployer {
    /// Deployer over `orchestrator`
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl StackDeployer for NativeDeployer {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    async fn deploy(&self, name: &str, document: &str) -> Result<Deployment, DeployError> {
        let deployed = self.orchestrator.deploy_native(name, document).await?;
        Ok(Deployment {
            stack: name.to_string(),
            backend: Backend::Native,
            action: deployed.action.into(),
            fallback_reason: None,
        })
    }

    async fn remove(&self, name: &str) -> Result<(), DeployError> {
        Ok(self.orchestrator.remove_native(name).await?)
    }
}

/// Remote-first deployment with native fallback
pub struct DeploymentStrategy {
    remote: Option<Box<dyn StackDeployer>>,
    native: Box<dyn StackDeployer>,
}

impl DeploymentStrategy {
    /// Strategy trying `remote` (if any) before `native`
    pub fn new(remote: Option<Box<dyn StackDeployer>>, native: Box<dyn StackDeployer>) -> Self {
        Self { remote, native }
    }

    /// Native-only strategy
    pub fn native_only(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self::new(None, Box::new(NativeDeployer::new(orchestrator)))
    }

    /// Strategy built from stored settings
    ///
    /// No settings, or a client that cannot be built, yields a native-only
    /// strategy.
    pub fn from_settings(
        orchestrator: Arc<dyn Orchestrator>,
        provider: &dyn ManagementApiProvider,
        settings: Option<&ManagementApiSettings>,
    ) -> Self {
        let remote = settings.and_then(|settings| match provider.connect(settings) {
            Ok(api) => Some(Box::new(RemoteDeployer::new(api)) as Box<dyn StackDeployer>),
            Err(e) => {
                warn!(error = %e, "management API client unavailable, using native backend only");
                None
            }
        });
        Self::new(remote, Box::new(NativeDeployer::new(orchestrator)))
    }

    /// Strategy whose remote backend has already authenticated
    ///
    /// Authentication is attempted once; on failure the strategy is
    /// native-only for its whole lifetime.
    pub async fn connected(
        orchestrator: Arc<dyn Orchestrator>,
        provider: &dyn ManagementApiProvider,
        settings: Option<&ManagementApiSettings>,
    ) -> Self {
        let mut remote: Option<Box<dyn StackDeployer>> = None;
        if let Some(settings) = settings {
            match provider.connect(settings) {
                Ok(api) => match RemoteDeployer::connect(api).await {
                    Ok(deployer) => remote = Some(Box::new(deployer)),
                    Err(e) => warn!(error = %e, "management API authentication failed"),
                },
                Err(e) => warn!(error = %e, "management API client unavailable"),
            }
        }
        Self::new(remote, Box::new(NativeDeployer::new(orchestrator)))
    }

    /// Whether a remote backend is configured
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Deploy `document` as `name`
    ///
    /// The document must parse as a YAML mapping with a `services` key; a
    /// document that does not is rejected before any backend runs. Remote
    /// failures fall back to the native backend, whose error is final.
    pub async fn deploy(&self, name: &str, document: &str) -> Result<Deployment, DeployError> {
        validate_document(document)?;

        let mut fallback_reason = None;
        match &self.remote {
            Some(remote) => match remote.deploy(name, document).await {
                Ok(deployment) => {
                    info!(stack = %name, backend = %deployment.backend, action = %deployment.action, "stack deployed");
                    return Ok(deployment);
                }
                Err(e) if e.allows_fallback() => {
                    warn!(stack = %name, error = %e, "remote deploy failed, falling back to native");
                    fallback_reason = Some(e.to_string());
                }
                Err(e) => return Err(e),
            },
            None => debug!(stack = %name, "no management API configured"),
        }

        let mut deployment = self.native.deploy(name, document).await?;
        info!(stack = %name, backend = %deployment.backend, action = %deployment.action, "stack deployed");
        deployment.fallback_reason = fallback_reason;
        Ok(deployment)
    }

    /// Remove `name` from whichever backend knows it
    ///
    /// A remote "not found" or remote failure falls through to the native
    /// backend, since a stack may have been deployed natively by fallback. A
    /// native "not found" is reported as [`Removal::AlreadyAbsent`].
    pub async fn remove(&self, name: &str) -> Result<Removal, DeployError> {
        if let Some(remote) = &self.remote {
            match remote.remove(name).await {
                Ok(()) => {
                    info!(stack = %name, backend = %Backend::Api, "stack removed");
                    return Ok(Removal::Removed {
                        backend: Backend::Api,
                    });
                }
                Err(e) if e.is_not_found() => {
                    debug!(stack = %name, "stack unknown to management API, trying native");
                }
                Err(e) => {
                    warn!(stack = %name, error = %e, "remote removal failed, trying native");
                }
            }
        }

        match self.native.remove(name).await {
            Ok(()) => {
                info!(stack = %name, backend = %Backend::Native, "stack removed");
                Ok(Removal::Removed {
                    backend: Backend::Native,
                })
            }
            Err(e) if e.is_not_found() => {
                debug!(stack = %name, "stack not deployed");
                Ok(Removal::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }
}

/// Reject documents no backend could deploy
pub fn validate_document(document: &str) -> Result<(), DeployError> {
    let value: serde_yaml::Value = serde_yaml::from_str(document)
        .map_err(|e| DeployError::InvalidDocument(e.to_string()))?;
    let services = value
        .as_mapping()
        .and_then(|map| map.get("services"))
        .ok_or_else(|| DeployError::InvalidDocument("no services section".to_string()))?;
    match services.as_mapping() {
        Some(map) if !map.is_empty() => Ok(()),
        _ => Err(DeployError::InvalidDocument(
            "services section is empty".to_string(),
        )),
    }
}
