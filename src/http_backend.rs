//! HTTP client for the hosted identity and row store.
//!
//! Talks to two REST surfaces of the same project:
//! - `/auth/v1/*` - session issuance and user updates
//! - `/rest/v1/ideas` - row CRUD, filtered server-side by row-level security
//!
//! Every request carries the project's public `apikey`; row and user calls
//! also carry the session's bearer token.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::backend::{
    AuthBackend, AuthSession, AuthUser, IdeaBackend, IdeaRow, RemoteError, UserUpdate,
};
use crate::config::Config;
use crate::error::{VaultError, VaultResult};
use crate::models::{Idea, UserMetadata};

const IDEAS_TABLE: &str = "ideas";

/// Which REST surface a request went to; the two report failures differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Auth,
    Rows,
}

/// User as returned by the auth API
#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<WireUser> for AuthUser {
    fn from(user: WireUser) -> Self {
        AuthUser {
            id: user.id,
            email: user.email.filter(|e| !e.is_empty()),
            metadata: user.user_metadata.unwrap_or_default(),
        }
    }
}

/// Session as returned by the token and signup endpoints
#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: WireUser,
}

impl From<WireSession> for AuthSession {
    fn from(session: WireSession) -> Self {
        AuthSession {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            user: session.user.into(),
        }
    }
}

/// Backend client for the hosted service
pub struct HttpBackend {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl HttpBackend {
    /// Create a new client
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> VaultResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(VaultError::Config("backend_url is not set".to_string()));
        }
        if anon_key.trim().is_empty() {
            return Err(VaultError::Config("anon_key is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Remote(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            anon_key: anon_key.trim().to_string(),
        })
    }

    /// Create a client from saved configuration
    pub fn from_config(config: &Config) -> VaultResult<Self> {
        Self::new(
            config.backend_url(),
            config.anon_key(),
            Duration::from_secs(config.request_timeout_secs()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self, filter: Option<(&str, &str)>) -> String {
        match filter {
            Some((column, value)) => format!(
                "{}/rest/v1/{}?{}=eq.{}",
                self.base_url,
                IDEAS_TABLE,
                column,
                urlencoding::encode(value)
            ),
            None => format!("{}/rest/v1/{}", self.base_url, IDEAS_TABLE),
        }
    }

    /// Attach the project key and the caller's token (or the project key
    /// when there is no session yet).
    fn authorized(&self, request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    async fn send(
        &self,
        surface: Surface,
        request: RequestBuilder,
    ) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| status.to_string());
        tracing::debug!(status = status.as_u16(), ?surface, %message, "Backend request failed");

        Err(status_error(surface, status.as_u16(), message))
    }

    async fn session_from(&self, response: Response) -> Result<AuthSession, RemoteError> {
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        parse_session(value)
    }

    async fn rows_from(&self, response: Response) -> Result<Vec<Idea>, RemoteError> {
        response
            .json::<Vec<Idea>>()
            .await
            .map_err(|e| RemoteError::Decode(format!("Failed to parse ideas: {}", e)))
    }
}

/// Classify a failed response. The auth API reports bad credentials as
/// 400/422, while on the row API those mean a rejected payload.
fn status_error(surface: Surface, status: u16, message: String) -> RemoteError {
    match (surface, status) {
        (_, 401 | 403) => RemoteError::Auth(message),
        (Surface::Auth, 400 | 422) => RemoteError::Auth(message),
        (_, 404) => RemoteError::NotFound(message),
        (_, code) => RemoteError::Http {
            status: code,
            message,
        },
    }
}

/// Pull a human-readable message out of an error body from either API.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(String::from)
}

/// Signup answers with a session, or only a user when email confirmation is
/// required before the first login.
fn parse_session(value: serde_json::Value) -> Result<AuthSession, RemoteError> {
    if value.get("access_token").is_none() {
        return Err(RemoteError::Auth(
            "Check your email to confirm the account before signing in".to_string(),
        ));
    }
    serde_json::from_value::<WireSession>(value)
        .map(AuthSession::from)
        .map_err(|e| RemoteError::Decode(format!("Failed to parse session: {}", e)))
}

impl AuthBackend for HttpBackend {
    async fn sign_in_anonymously(
        &self,
        metadata: &UserMetadata,
    ) -> Result<AuthSession, RemoteError> {
        let request = self
            .client
            .post(self.auth_url("signup"))
            .json(&json!({ "data": metadata }));
        let response = self
            .send(Surface::Auth, self.authorized(request, None))
            .await?;
        self.session_from(response).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, RemoteError> {
        let request = self
            .client
            .post(self.auth_url("token?grant_type=password"))
            .json(&json!({ "email": email, "password": password }));
        let response = self
            .send(Surface::Auth, self.authorized(request, None))
            .await?;
        self.session_from(response).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError> {
        let request = self
            .client
            .post(self.auth_url("signup"))
            .json(&json!({ "email": email, "password": password }));
        let response = self
            .send(Surface::Auth, self.authorized(request, None))
            .await?;
        self.session_from(response).await
    }

    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), RemoteError> {
        let url = match redirect_to {
            Some(to) => format!("{}?redirect_to={}", self.auth_url("otp"), urlencoding::encode(to)),
            None => self.auth_url("otp"),
        };
        let request = self
            .client
            .post(url)
            .json(&json!({ "email": email, "create_user": true }));
        self.send(Surface::Auth, self.authorized(request, None))
            .await?;
        Ok(())
    }

    async fn update_user(
        &self,
        access_token: &str,
        update: &UserUpdate,
    ) -> Result<AuthSession, RemoteError> {
        let request = self.client.put(self.auth_url("user")).json(update);
        let response = self
            .send(Surface::Auth, self.authorized(request, Some(access_token)))
            .await?;
        let user: WireUser = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("Failed to parse user: {}", e)))?;

        // The user endpoint does not rotate tokens
        Ok(AuthSession {
            access_token: access_token.to_string(),
            refresh_token: None,
            user: user.into(),
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, RemoteError> {
        let request = self.client.get(self.auth_url("user"));
        let response = self
            .send(Surface::Auth, self.authorized(request, Some(access_token)))
            .await?;
        response
            .json::<WireUser>()
            .await
            .map(AuthUser::from)
            .map_err(|e| RemoteError::Decode(format!("Failed to parse user: {}", e)))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), RemoteError> {
        let request = self.client.post(self.auth_url("logout"));
        self.send(Surface::Auth, self.authorized(request, Some(access_token)))
            .await?;
        Ok(())
    }
}

impl IdeaBackend for HttpBackend {
    async fn select_ideas(&self, access_token: &str) -> Result<Vec<Idea>, RemoteError> {
        let url = format!("{}?select=*&order=created_at.desc", self.table_url(None));
        tracing::debug!(%url, "Fetching ideas");
        let request = self.client.get(url);
        let response = self
            .send(Surface::Rows, self.authorized(request, Some(access_token)))
            .await?;
        self.rows_from(response).await
    }

    async fn insert_idea(&self, access_token: &str, row: &IdeaRow) -> Result<Idea, RemoteError> {
        let request = self
            .client
            .post(self.table_url(None))
            .header("Prefer", "return=representation")
            .json(&[row]);
        let response = self
            .send(Surface::Rows, self.authorized(request, Some(access_token)))
            .await?;
        self.rows_from(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("insert returned no row".to_string()))
    }

    async fn update_idea(
        &self,
        access_token: &str,
        id: Uuid,
        row: &IdeaRow,
    ) -> Result<Idea, RemoteError> {
        let request = self
            .client
            .patch(self.table_url(Some(("id", &id.to_string()))))
            .header("Prefer", "return=representation")
            .json(row);
        let response = self
            .send(Surface::Rows, self.authorized(request, Some(access_token)))
            .await?;
        self.rows_from(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("idea {}", id)))
    }

    async fn delete_idea(&self, access_token: &str, id: Uuid) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.table_url(Some(("id", &id.to_string()))));
        self.send(Surface::Rows, self.authorized(request, Some(access_token)))
            .await?;
        Ok(())
    }

    async fn reassign_owner(
        &self,
        access_token: &str,
        from: Uuid,
        to: Uuid,
    ) -> Result<u64, RemoteError> {
        let request = self
            .client
            .patch(self.table_url(Some(("user_id", &from.to_string()))))
            .header("Prefer", "return=representation")
            .json(&json!({ "user_id": to }));
        let response = self
            .send(Surface::Rows, self.authorized(request, Some(access_token)))
            .await?;
        Ok(self.rows_from(response).await?.len() as u64)
    }
}
