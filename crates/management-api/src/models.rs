//! Wire and domain types for the management API.

use serde::{Deserialize, Serialize};

/// Where the management API lives and how to log in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementApiSettings {
    /// Base URL, e.g. `https://portainer.example.com`
    pub url: String,
    /// Admin username
    pub username: String,
    /// Admin password
    pub password: String,
}

/// An authenticated session bound to one endpoint and cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token
    pub token: String,
    /// Selected endpoint id
    pub endpoint_id: i64,
    /// Cluster (swarm) id of that endpoint
    pub cluster_id: String,
}

/// A stack as known to the management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stack {
    /// Remote stack id
    pub id: i64,
    /// Stack name
    pub name: String,
    /// Endpoint the stack is deployed on
    #[serde(default)]
    pub endpoint_id: i64,
}

/// Whether a deploy created or updated the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackAction {
    /// New stack
    Created,
    /// Existing stack redeployed
    Updated,
}

/// Result of [`crate::ManagementApi::deploy_stack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDeployment {
    /// The stack after the call
    pub stack: Stack,
    /// Create or update
    pub action: StackAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub jwt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Endpoint {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SwarmInfo {
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateStackRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "SwarmID")]
    pub swarm_id: &'a str,
    pub stack_file_content: &'a str,
    pub env: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct UpdateStackRequest<'a> {
    pub stack_file_content: &'a str,
    pub env: Vec<serde_json::Value>,
    pub prune: bool,
    pub pull_image: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}
