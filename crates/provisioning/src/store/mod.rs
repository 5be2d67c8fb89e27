//! Durable stores for config, credentials and environments.
//!
//! Each store is a single JSON document. Read-modify-write cycles are
//! serialised by an in-process lock and the file is replaced atomically, so a
//! crash never leaves a half-written document. Writers in different
//! processes are not coordinated; the last write wins.

mod json;
mod memory;

pub use json::JsonFile;
pub use memory::InMemory;

use crate::error::StoreError;
use crate::model::{CredentialMap, CredentialRecord, Environment, EnvironmentState, GlobalConfig};
use management_api::ManagementApiSettings;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Global config file name inside the data directory
pub const CONFIG_FILE: &str = "config.json";
/// Credential store file name inside the data directory
pub const CREDENTIALS_FILE: &str = "credentials.json";
/// Environment list file name inside the data directory
pub const ENVIRONMENTS_FILE: &str = "environments.json";

type StoreResult<T> = std::result::Result<T, StoreError>;

/// A whole document that can be read and modified atomically
pub trait Document<T>: Send + Sync {
    /// Current contents, or the default when nothing is stored yet
    fn read(&self) -> StoreResult<T>;

    /// Apply `f` to the contents and persist the result
    fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> StoreResult<R>;
}

/// Global config persistence
pub trait ConfigStore: Send + Sync {
    /// Load the config, defaults when absent
    fn load(&self) -> StoreResult<GlobalConfig>;

    /// Replace the config
    fn save(&self, config: &GlobalConfig) -> StoreResult<()>;

    /// Record or clear the management API login
    fn set_management_api(&self, settings: Option<ManagementApiSettings>) -> StoreResult<()>;
}

/// Per-tool credential persistence
pub trait CredentialStore: Send + Sync {
    /// Record for `tool`, if installed
    fn get(&self, tool: &str) -> StoreResult<Option<CredentialRecord>>;

    /// Insert or replace the record for `tool`
    fn put(&self, tool: &str, record: CredentialRecord) -> StoreResult<()>;

    /// Delete the record for `tool`; returns whether one existed
    fn remove(&self, tool: &str) -> StoreResult<bool>;

    /// All records
    fn list(&self) -> StoreResult<CredentialMap>;
}

/// Environment list persistence
pub trait EnvironmentStore: Send + Sync {
    /// All environments
    fn list(&self) -> StoreResult<Vec<Environment>>;

    /// Environment by name
    fn get(&self, name: &str) -> StoreResult<Option<Environment>> {
        Ok(self.list()?.into_iter().find(|env| env.name == name))
    }

    /// Insert `env` unless the name is taken; returns whether it was inserted
    fn create(&self, env: Environment) -> StoreResult<bool>;

    /// Append a stack to an environment's list; returns whether it exists
    fn append_stack(&self, name: &str, stack: &str) -> StoreResult<bool>;

    /// Record generated credentials for one of the environment's tools
    fn set_credentials(
        &self,
        name: &str,
        tool: &str,
        fields: BTreeMap<String, String>,
    ) -> StoreResult<bool>;

    /// Advance the status; backwards transitions are ignored
    fn advance(&self, name: &str, status: EnvironmentState) -> StoreResult<bool>;

    /// Delete an environment; returns whether it existed
    fn remove(&self, name: &str) -> StoreResult<bool>;
}

impl<D: Document<GlobalConfig>> ConfigStore for D {
    fn load(&self) -> StoreResult<GlobalConfig> {
        self.read()
    }

    fn save(&self, config: &GlobalConfig) -> StoreResult<()> {
        self.modify(|current| *current = config.clone())
    }

    fn set_management_api(&self, settings: Option<ManagementApiSettings>) -> StoreResult<()> {
        self.modify(|config| config.management_api = settings)
    }
}

impl<D: Document<CredentialMap>> CredentialStore for D {
    fn get(&self, tool: &str) -> StoreResult<Option<CredentialRecord>> {
        Ok(self.read()?.remove(tool))
    }

    fn put(&self, tool: &str, record: CredentialRecord) -> StoreResult<()> {
        self.modify(|records| {
            records.insert(tool.to_string(), record);
        })
    }

    fn remove(&self, tool: &str) -> StoreResult<bool> {
        self.modify(|records| records.remove(tool).is_some())
    }

    fn list(&self) -> StoreResult<CredentialMap> {
        self.read()
    }
}

impl<D: Document<Vec<Environment>>> EnvironmentStore for D {
    fn list(&self) -> StoreResult<Vec<Environment>> {
        self.read()
    }

    fn create(&self, env: Environment) -> StoreResult<bool> {
        self.modify(|envs| {
            if envs.iter().any(|existing| existing.name == env.name) {
                return false;
            }
            envs.push(env);
            true
        })
    }

    fn append_stack(&self, name: &str, stack: &str) -> StoreResult<bool> {
        self.modify(|envs| match envs.iter_mut().find(|env| env.name == name) {
            Some(env) => {
                if !env.stacks.iter().any(|s| s == stack) {
                    env.stacks.push(stack.to_string());
                }
                true
            }
            None => false,
        })
    }

    fn set_credentials(
        &self,
        name: &str,
        tool: &str,
        fields: BTreeMap<String, String>,
    ) -> StoreResult<bool> {
        self.modify(|envs| match envs.iter_mut().find(|env| env.name == name) {
            Some(env) => {
                env.credentials.insert(tool.to_string(), fields);
                true
            }
            None => false,
        })
    }

    fn advance(&self, name: &str, status: EnvironmentState) -> StoreResult<bool> {
        self.modify(|envs| {
            envs.iter_mut()
                .find(|env| env.name == name)
                .is_some_and(|env| env.advance(status))
        })
    }

    fn remove(&self, name: &str) -> StoreResult<bool> {
        self.modify(|envs| {
            let before = envs.len();
            envs.retain(|env| env.name != name);
            envs.len() != before
        })
    }
}

/// The three stores an operation needs
#[derive(Clone)]
pub struct Stores {
    /// Global config
    pub config: Arc<dyn ConfigStore>,
    /// Tool credentials
    pub credentials: Arc<dyn CredentialStore>,
    /// Environment list
    pub environments: Arc<dyn EnvironmentStore>,
}

impl Stores {
    /// File-backed stores inside `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            config: Arc::new(JsonFile::<GlobalConfig>::new(dir.join(CONFIG_FILE))),
            credentials: Arc::new(JsonFile::<CredentialMap>::new(dir.join(CREDENTIALS_FILE))),
            environments: Arc::new(JsonFile::<Vec<Environment>>::new(
                dir.join(ENVIRONMENTS_FILE),
            )),
        }
    }

    /// Volatile stores, starting from `config`
    pub fn in_memory(config: GlobalConfig) -> Self {
        Self {
            config: Arc::new(InMemory::new(config)),
            credentials: Arc::new(InMemory::<CredentialMap>::default()),
            environments: Arc::new(InMemory::<Vec<Environment>>::default()),
        }
    }
}
