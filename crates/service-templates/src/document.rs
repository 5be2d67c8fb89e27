//! Compose-format document model.
//!
//! Only the subset of the compose format the catalog needs is modelled.
//! Maps are `BTreeMap` so serialization order is stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level service definition document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeDocument {
    /// Compose file format version
    pub version: String,
    /// Services by name
    pub services: BTreeMap<String, ServiceSpec>,
    /// Networks referenced by the services
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkRef>,
    /// Named volumes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeSpec>,
}

/// One service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Image reference
    pub image: String,
    /// Command override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Volume mounts in `source:target` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Published ports in `published:target` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Network attachments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, ServiceNetwork>,
    /// Container labels, honoured in compose mode
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Compose-mode restart policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    /// Swarm-mode deployment settings
    pub deploy: DeploySpec,
}

/// Network attachment of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNetwork {
    /// Extra DNS names on that network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// Reference to a network created outside the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    /// The network is not managed by the stack
    pub external: bool,
    /// Actual network name
    pub name: String,
}

/// Named volume declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume driver, engine default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// Swarm deploy section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    /// Scheduling mode
    pub mode: String,
    /// Replica count
    pub replicas: u32,
    /// Placement constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    /// Resource limits
    pub resources: Resources,
    /// Restart policy
    pub restart_policy: RestartPolicy,
    /// Service labels, honoured in swarm mode
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Placement constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Constraint expressions, e.g. `node.role == manager`
    pub constraints: Vec<String>,
}

/// Resource section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Upper limits
    pub limits: ResourceLimits,
}

/// CPU and memory limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU share, e.g. `"0.5"`
    pub cpus: String,
    /// Memory, e.g. `"512M"`
    pub memory: String,
}

impl ResourceLimits {
    /// Build limits from compose-format strings
    pub fn new(cpus: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpus: cpus.into(),
            memory: memory.into(),
        }
    }
}

/// Swarm restart policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// `none`, `on-failure` or `any`
    pub condition: String,
}
