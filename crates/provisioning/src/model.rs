//! Persisted documents: global config, credential records, environments.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use management_api::ManagementApiSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Process-wide settings read at the start of every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Shared network every catalog stack attaches to
    pub network_name: String,
    /// Suffix for generated domains
    pub domain_base: String,
    /// TLS resolver named in routing labels
    pub cert_resolver: String,
    /// Timezone handed to tools that need one
    pub timezone: String,
    /// Management API login, present once the management UI is installed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_api: Option<ManagementApiSettings>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            network_name: "toolstack_public".to_string(),
            domain_base: "localhost".to_string(),
            cert_resolver: "letsencryptresolver".to_string(),
            timezone: "UTC".to_string(),
            management_api: None,
        }
    }
}

impl GlobalConfig {
    /// Keys accepted by [`GlobalConfig::set`]
    pub const KEYS: [&'static str; 4] = ["network_name", "domain_base", "cert_resolver", "timezone"];

    /// Set a plain string setting by key
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        let slot = match key {
            "network_name" => &mut self.network_name,
            "domain_base" => &mut self.domain_base,
            "cert_resolver" => &mut self.cert_resolver,
            "timezone" => &mut self.timezone,
            other => return Err(StoreError::UnknownKey(other.to_string())),
        };
        *slot = value.into();
        Ok(())
    }
}

/// Secrets and connection values of one installed tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Secret and connection fields, flattened into the record
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    /// When the tool was installed
    pub installed_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Record stamped with the current time
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self {
            fields,
            installed_at: Utc::now(),
        }
    }
}

/// Credential records keyed by tool id
pub type CredentialMap = BTreeMap<String, CredentialRecord>;

/// Lifecycle state of an environment; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentState {
    /// Stacks are being deployed
    Creating,
    /// Every requested stack was deployed
    Running,
    /// Teardown has run
    Destroyed,
}

impl std::fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EnvironmentState::Creating => "creating",
            EnvironmentState::Running => "running",
            EnvironmentState::Destroyed => "destroyed",
        })
    }
}

/// A named sandbox and the stacks it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique name
    pub name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Stacks to tear down together, in creation order
    pub stacks: Vec<String>,
    /// Last persisted state
    pub status: EnvironmentState,
    /// Generated credentials per tool id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, BTreeMap<String, String>>,
}

impl Environment {
    /// Fresh record in the `creating` state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            stacks: Vec::new(),
            status: EnvironmentState::Creating,
            credentials: BTreeMap::new(),
        }
    }

    /// Move to `next` if that is forward; returns whether the state changed
    pub fn advance(&mut self, next: EnvironmentState) -> bool {
        if next > self.status {
            self.status = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: GlobalConfig = serde_json::from_str(r#"{"domain_base":"example.com"}"#).unwrap();
        assert_eq!(config.domain_base, "example.com");
        assert_eq!(config.network_name, "toolstack_public");
        assert!(config.management_api.is_none());
    }

    #[test]
    fn test_config_set_rejects_unknown_key() {
        let mut config = GlobalConfig::default();
        config.set("timezone", "Europe/Lisbon").unwrap();
        assert_eq!(config.timezone, "Europe/Lisbon");
        assert!(matches!(config.set("password", "x"), Err(StoreError::UnknownKey(_))));
    }

    #[test]
    fn test_credential_record_is_flat() {
        let record = CredentialRecord::new(BTreeMap::from([("api_key".to_string(), "k".to_string())]));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["api_key"], "k");
        assert!(json["installed_at"].is_string());

        let back: CredentialRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_status_never_reverts() {
        let mut env = Environment::new("qa");
        assert!(env.advance(EnvironmentState::Running));
        assert!(!env.advance(EnvironmentState::Creating));
        assert_eq!(env.status, EnvironmentState::Running);
        assert!(env.advance(EnvironmentState::Destroyed));
    }
}
