//! Abstract remote identity and row store.
//!
//! The hosted backend is an external collaborator with two concerns:
//! - issuing sessions (anonymous, password, magic link) and updating users
//! - row CRUD over the `ideas` table, with ownership enforced server-side
//!
//! Implementations: `HttpBackend` for the hosted service and `MemoryBackend`
//! for tests and offline use.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VaultError;
use crate::models::{ActionType, Idea, IdeaInput, UserMetadata};

/// A user as reported by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: UserMetadata,
}

/// A session issued by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Changes to apply to the signed-in user in a single call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UserMetadata>,
}

/// Column values written on insert and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdeaRow {
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub action_type: ActionType,
    pub tags: Vec<String>,
}

impl IdeaRow {
    pub fn new(user_id: Uuid, input: &IdeaInput) -> Self {
        Self {
            user_id,
            title: input.title.clone(),
            content: input.content.clone(),
            action_type: input.action_type,
            tags: input.tags.clone(),
        }
    }
}

/// Errors reported by a remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Could not reach the service
    Network(String),
    /// The service answered with a failure status
    Http { status: u16, message: String },
    /// Credentials or session rejected
    Auth(String),
    /// The response body could not be understood
    Decode(String),
    /// The row does not exist or is not visible to this session
    NotFound(String),
}

impl std::error::Error for RemoteError {}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Network(msg) => write!(f, "Network error: {}", msg),
            RemoteError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            RemoteError::Auth(msg) => write!(f, "Authentication failed: {}", msg),
            RemoteError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            RemoteError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl From<RemoteError> for VaultError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Auth(msg) => VaultError::Auth(msg),
            RemoteError::NotFound(msg) => VaultError::NotFound(msg),
            other => VaultError::Remote(other.to_string()),
        }
    }
}

/// Session issuance and user management.
pub trait AuthBackend: Send + Sync {
    /// Create an anonymous user carrying `metadata` and return its session.
    fn sign_in_anonymously(
        &self,
        metadata: &UserMetadata,
    ) -> impl Future<Output = Result<AuthSession, RemoteError>> + Send;

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, RemoteError>> + Send;

    /// Register a new credentialed user and return its session.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, RemoteError>> + Send;

    /// Email a one-time login link.
    fn send_magic_link(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Apply `update` to the user owning `access_token` in one atomic call.
    ///
    /// The returned session may belong to a different user id than before;
    /// callers compare ids to decide whether owned rows must be migrated.
    fn update_user(
        &self,
        access_token: &str,
        update: &UserUpdate,
    ) -> impl Future<Output = Result<AuthSession, RemoteError>> + Send;

    fn get_user(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<AuthUser, RemoteError>> + Send;

    fn sign_out(&self, access_token: &str)
        -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Row access to the `ideas` table.
///
/// The backend only returns and modifies rows the session owns.
pub trait IdeaBackend: Send + Sync {
    /// Every visible idea, newest first.
    fn select_ideas(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<Idea>, RemoteError>> + Send;

    fn insert_idea(
        &self,
        access_token: &str,
        row: &IdeaRow,
    ) -> impl Future<Output = Result<Idea, RemoteError>> + Send;

    fn update_idea(
        &self,
        access_token: &str,
        id: Uuid,
        row: &IdeaRow,
    ) -> impl Future<Output = Result<Idea, RemoteError>> + Send;

    fn delete_idea(
        &self,
        access_token: &str,
        id: Uuid,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Move every row owned by `from` to `to`. Returns the number of rows moved.
    fn reassign_owner(
        &self,
        access_token: &str,
        from: Uuid,
        to: Uuid,
    ) -> impl Future<Output = Result<u64, RemoteError>> + Send;
}
