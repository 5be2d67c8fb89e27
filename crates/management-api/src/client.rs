//! reqwest-backed client for a Portainer-compatible API.

use crate::api::{ManagementApi, ManagementApiProvider};
use crate::models::{
    ApiErrorBody, AuthResponse, CreateStackRequest, Credentials, Endpoint, ManagementApiSettings,
    Session, Stack, SwarmInfo, UpdateStackRequest,
};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Deadline for authentication and read calls
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for calls that make the control plane deploy something
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Management API client
#[derive(Clone)]
pub struct PortainerClient {
    http: Client,
    settings: ManagementApiSettings,
}

impl PortainerClient {
    /// Create a client for the given settings
    pub fn new(settings: ManagementApiSettings) -> Result<Self> {
        let http = Client::builder().timeout(WRITE_TIMEOUT).build()?;
        Ok(Self { http, settings })
    }

    /// Settings this client was built from
    pub fn settings(&self) -> &ManagementApiSettings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.settings.url.trim_end_matches('/'), path)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Decode(format!("{}: {}", e, body.trim())))
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T> {
        let request = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .timeout(READ_TIMEOUT);
        Self::decode(Self::send(request).await?).await
    }
}

/// Extract a human-readable message from an error body
///
/// JSON bodies contribute their `message` and `details` fields; anything else
/// is surfaced verbatim.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            message: Some(message),
            details: Some(details),
        }) if !details.is_empty() && details != message => format!("{}: {}", message, details),
        Ok(ApiErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ApiErrorBody {
            details: Some(details),
            ..
        }) => details,
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl ManagementApi for PortainerClient {
    async fn authenticate(&self) -> Result<Session> {
        let login = self
            .http
            .post(self.url("/auth"))
            .json(&Credentials {
                username: &self.settings.username,
                password: &self.settings.password,
            })
            .timeout(READ_TIMEOUT);
        let auth: AuthResponse = match Self::send(login).await {
            Ok(response) => Self::decode(response).await?,
            Err(Error::Api { status, message }) => {
                return Err(Error::Auth(format!("login rejected ({}): {}", status, message)));
            }
            Err(e) => return Err(e),
        };

        let endpoints: Vec<Endpoint> = self
            .get_json(&auth.jwt, "/endpoints")
            .await
            .map_err(|e| Error::Auth(format!("could not list endpoints: {}", e)))?;
        let endpoint = endpoints
            .into_iter()
            .next()
            .ok_or_else(|| Error::Auth("no endpoints available".to_string()))?;
        debug!(endpoint = endpoint.id, name = %endpoint.name, "selected endpoint");

        let swarm: SwarmInfo = self
            .get_json(&auth.jwt, &format!("/endpoints/{}/docker/swarm", endpoint.id))
            .await
            .map_err(|e| Error::Auth(format!("could not resolve cluster identity: {}", e)))?;

        Ok(Session {
            token: auth.jwt,
            endpoint_id: endpoint.id,
            cluster_id: swarm.id,
        })
    }

    async fn list_stacks(&self, session: &Session) -> Result<Vec<Stack>> {
        self.get_json(&session.token, "/stacks").await
    }

    async fn create_stack(&self, session: &Session, name: &str, document: &str) -> Result<Stack> {
        let request = self
            .http
            .post(self.url("/stacks/create/swarm/string"))
            .query(&[("endpointId", session.endpoint_id)])
            .bearer_auth(&session.token)
            .json(&CreateStackRequest {
                name,
                swarm_id: &session.cluster_id,
                stack_file_content: document,
                env: Vec::new(),
            })
            .timeout(WRITE_TIMEOUT);
        Self::decode(Self::send(request).await?).await
    }

    async fn update_stack(
        &self,
        session: &Session,
        stack: &Stack,
        document: &str,
    ) -> Result<Stack> {
        let request = self
            .http
            .put(self.url(&format!("/stacks/{}", stack.id)))
            .query(&[("endpointId", session.endpoint_id)])
            .bearer_auth(&session.token)
            .json(&UpdateStackRequest {
                stack_file_content: document,
                env: Vec::new(),
                prune: true,
                pull_image: true,
            })
            .timeout(WRITE_TIMEOUT);
        Self::decode(Self::send(request).await?).await
    }

    async fn remove_stack(&self, session: &Session, stack: &Stack) -> Result<()> {
        let request = self
            .http
            .delete(self.url(&format!("/stacks/{}", stack.id)))
            .query(&[("endpointId", session.endpoint_id)])
            .bearer_auth(&session.token)
            .timeout(WRITE_TIMEOUT);
        Self::send(request).await.map(drop)
    }

    async fn system_ready(&self) -> bool {
        let request = self.http.get(self.url("/system/status")).timeout(READ_TIMEOUT);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "management API not reachable yet");
                false
            }
        }
    }

    async fn init_admin(&self, username: &str, password: &str) -> Result<()> {
        let request = self
            .http
            .post(self.url("/users/admin/init"))
            .json(&Credentials { username, password })
            .timeout(READ_TIMEOUT);
        Self::send(request).await.map(drop)
    }
}

/// Provider producing [`PortainerClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PortainerProvider;

impl ManagementApiProvider for PortainerProvider {
    fn connect(&self, settings: &ManagementApiSettings) -> Result<Arc<dyn ManagementApi>> {
        Ok(Arc::new(PortainerClient::new(settings.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(
            error_message(r#"{"message":"Invalid credentials","details":"Unauthorized"}"#),
            "Invalid credentials: Unauthorized"
        );
        assert_eq!(
            error_message(r#"{"message":"A stack with this name already exists"}"#),
            "A stack with this name already exists"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("502 Bad Gateway\n"), "502 Bad Gateway");
        assert_eq!(error_message(""), "");
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let client = PortainerClient::new(ManagementApiSettings {
            url: "https://portainer.example.com/".into(),
            username: "admin".into(),
            password: "secret".into(),
        })
        .unwrap();
        assert_eq!(
            client.url("/stacks/7"),
            "https://portainer.example.com/api/stacks/7"
        );
    }
}
