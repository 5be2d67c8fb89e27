//! The management API surface, independent of transport.

use crate::models::{ManagementApiSettings, Session, Stack, StackAction, StackDeployment};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Operations offered by the remote control plane
///
/// Implementors provide the primitives; `get_stack_by_name`, `deploy_stack`
/// and `remove_stack_by_name` are composed from them.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Log in, select the first endpoint and resolve its cluster identity
    ///
    /// No retries happen here; callers decide whether to try again.
    async fn authenticate(&self) -> Result<Session>;

    /// List all stacks visible to the session
    async fn list_stacks(&self, session: &Session) -> Result<Vec<Stack>>;

    /// Create a stack from a service definition document
    async fn create_stack(&self, session: &Session, name: &str, document: &str) -> Result<Stack>;

    /// Redeploy an existing stack with a new document
    async fn update_stack(&self, session: &Session, stack: &Stack, document: &str)
    -> Result<Stack>;

    /// Delete a stack
    async fn remove_stack(&self, session: &Session, stack: &Stack) -> Result<()>;

    /// Whether the control plane answers its status endpoint
    async fn system_ready(&self) -> bool;

    /// One-time creation of the initial admin account
    async fn init_admin(&self, username: &str, password: &str) -> Result<()>;

    /// Look a stack up by name; names are filtered client-side
    async fn get_stack_by_name(&self, session: &Session, name: &str) -> Result<Option<Stack>> {
        Ok(self
            .list_stacks(session)
            .await?
            .into_iter()
            .find(|stack| stack.name == name))
    }

    /// Update the stack if it exists, create it otherwise
    async fn deploy_stack(
        &self,
        session: &Session,
        name: &str,
        document: &str,
    ) -> Result<StackDeployment> {
        match self.get_stack_by_name(session, name).await? {
            Some(existing) => {
                let stack = self.update_stack(session, &existing, document).await?;
                info!(stack = %name, id = stack.id, "updated stack via management API");
                Ok(StackDeployment {
                    stack,
                    action: StackAction::Updated,
                })
            }
            None => {
                let stack = self.create_stack(session, name, document).await?;
                info!(stack = %name, id = stack.id, "created stack via management API");
                Ok(StackDeployment {
                    stack,
                    action: StackAction::Created,
                })
            }
        }
    }

    /// Remove a stack by name, `StackNotFound` if there is none
    async fn remove_stack_by_name(&self, session: &Session, name: &str) -> Result<()> {
        let stack = self
            .get_stack_by_name(session, name)
            .await?
            .ok_or_else(|| Error::StackNotFound(name.to_string()))?;
        self.remove_stack(session, &stack).await
    }
}

/// Builds API clients from stored settings
///
/// Settings change when the management UI itself is (re)installed, so callers
/// hold a provider rather than a long-lived client.
pub trait ManagementApiProvider: Send + Sync {
    /// Create a client for the given settings
    fn connect(&self, settings: &ManagementApiSettings) -> Result<Arc<dyn ManagementApi>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryApi {
        stacks: Mutex<Vec<Stack>>,
    }

    #[async_trait]
    impl ManagementApi for InMemoryApi {
        async fn authenticate(&self) -> Result<Session> {
            Ok(Session {
                token: "t".into(),
                endpoint_id: 1,
                cluster_id: "c".into(),
            })
        }

        async fn list_stacks(&self, _session: &Session) -> Result<Vec<Stack>> {
            Ok(self.stacks.lock().unwrap().clone())
        }

        async fn create_stack(&self, session: &Session, name: &str, _doc: &str) -> Result<Stack> {
            let mut stacks = self.stacks.lock().unwrap();
            let stack = Stack {
                id: stacks.len() as i64 + 1,
                name: name.to_string(),
                endpoint_id: session.endpoint_id,
            };
            stacks.push(stack.clone());
            Ok(stack)
        }

        async fn update_stack(&self, _s: &Session, stack: &Stack, _doc: &str) -> Result<Stack> {
            Ok(stack.clone())
        }

        async fn remove_stack(&self, _session: &Session, stack: &Stack) -> Result<()> {
            self.stacks.lock().unwrap().retain(|s| s.id != stack.id);
            Ok(())
        }

        async fn system_ready(&self) -> bool {
            true
        }

        async fn init_admin(&self, _username: &str, _password: &str) -> Result<()> {
            Ok(())
        }
    }

    #[smol_potat::test]
    async fn test_deploy_stack_creates_then_updates() {
        let api = InMemoryApi::default();
        let session = api.authenticate().await.unwrap();

        let first = api.deploy_stack(&session, "n8n", "a").await.unwrap();
        let second = api.deploy_stack(&session, "n8n", "b").await.unwrap();

        assert_eq!(first.action, StackAction::Created);
        assert_eq!(second.action, StackAction::Updated);
        assert_eq!(first.stack.id, second.stack.id);
        assert_eq!(api.list_stacks(&session).await.unwrap().len(), 1);
    }

    #[smol_potat::test]
    async fn test_remove_by_name_of_missing_stack_is_not_found() {
        let api = InMemoryApi::default();
        let session = api.authenticate().await.unwrap();

        assert_eq!(api.get_stack_by_name(&session, "ghost").await.unwrap(), None);
        let err = api.remove_stack_by_name(&session, "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[smol_potat::test]
    async fn test_remove_by_name_deletes_matching_stack() {
        let api = InMemoryApi::default();
        let session = api.authenticate().await.unwrap();
        api.deploy_stack(&session, "evolution", "doc").await.unwrap();

        api.remove_stack_by_name(&session, "evolution").await.unwrap();

        assert!(api.list_stacks(&session).await.unwrap().is_empty());
    }
}
