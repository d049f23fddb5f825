//! In-process implementation of the remote backend.
//!
//! Behaves like the hosted service for a single process: it issues sessions,
//! enforces row ownership on every query and keeps rows in creation order.
//! Rows only change owner along a guest promotion recorded by `update_user`.
//! Tests use `fail_next` to inject a failure into the next call of a given
//! operation, and `PromotionMode` to choose what `update_user` does to an
//! anonymous identity.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::backend::{
    AuthBackend, AuthSession, AuthUser, IdeaBackend, IdeaRow, RemoteError, UserUpdate,
};
use crate::models::{Idea, UserMetadata};

/// What `update_user` does when an anonymous user adds credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromotionMode {
    /// The anonymous identity gains the credentials and keeps its id
    #[default]
    InPlace,
    /// A new identity is issued; rows stay with the old id until migrated
    NewIdentity,
}

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    SignInAnonymously,
    SignInWithPassword,
    SignUp,
    SendMagicLink,
    UpdateUser,
    GetUser,
    SignOut,
    SelectIdeas,
    InsertIdea,
    UpdateIdea,
    DeleteIdea,
    ReassignOwner,
}

struct StoredUser {
    user: AuthUser,
    password: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, StoredUser>,
    tokens: HashMap<String, Uuid>,
    ideas: Vec<Idea>,
    failures: Vec<BackendOp>,
    magic_links: Vec<String>,
    /// Old anonymous id to the id issued when it was promoted
    promotions: HashMap<Uuid, Uuid>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn take_failure(&mut self, op: BackendOp) -> Result<(), RemoteError> {
        if let Some(pos) = self.failures.iter().position(|f| *f == op) {
            self.failures.remove(pos);
            return Err(RemoteError::Network(format!("injected failure for {:?}", op)));
        }
        Ok(())
    }

    fn user_for_token(&self, access_token: &str) -> Result<Uuid, RemoteError> {
        self.tokens
            .get(access_token)
            .copied()
            .ok_or_else(|| RemoteError::Auth("invalid or expired session".to_string()))
    }

    fn find_by_email(&self, email: &str) -> Option<Uuid> {
        let email = email.to_lowercase();
        self.users
            .values()
            .find(|u| u.user.email.as_deref().map(str::to_lowercase) == Some(email.clone()))
            .map(|u| u.user.id)
    }

    fn issue_session(&mut self, user_id: Uuid) -> Result<AuthSession, RemoteError> {
        let user = self
            .users
            .get(&user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("user {}", user_id)))?;
        let access_token = format!("mem-{}", Uuid::new_v4().simple());
        self.tokens.insert(access_token.clone(), user_id);
        Ok(AuthSession {
            access_token,
            refresh_token: Some(format!("mem-refresh-{}", Uuid::new_v4().simple())),
            user,
        })
    }

    fn create_user(
        &mut self,
        email: Option<String>,
        password: Option<String>,
        metadata: UserMetadata,
    ) -> Uuid {
        let id = Uuid::now_v7();
        self.users.insert(
            id,
            StoredUser {
                user: AuthUser {
                    id,
                    email,
                    metadata,
                },
                password,
            },
        );
        id
    }

    /// Strictly increasing timestamps so creation order is observable.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

/// Remote backend kept entirely in memory.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    promotion_mode: PromotionMode,
    plain_row_security: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_promotion_mode(promotion_mode: PromotionMode) -> Self {
        Self {
            promotion_mode,
            ..Self::default()
        }
    }

    /// Apply plain row-level security to `reassign_owner`: the caller can only
    /// touch rows it already owns, so a new identity moves nothing.
    pub fn with_plain_row_security(mut self, enabled: bool) -> Self {
        self.plain_row_security = enabled;
        self
    }

    pub fn promotion_mode(&self) -> PromotionMode {
        self.promotion_mode
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RemoteError> {
        self.state
            .lock()
            .map_err(|_| RemoteError::Network("backend state poisoned".to_string()))
    }

    /// Make the next call of `op` fail with a network error.
    pub fn fail_next(&self, op: BackendOp) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push(op);
        }
    }

    /// Every idea in the store regardless of owner.
    pub fn all_ideas(&self) -> Vec<Idea> {
        self.state
            .lock()
            .map(|s| s.ideas.clone())
            .unwrap_or_default()
    }

    /// Addresses that were sent a magic link, in order.
    pub fn magic_links_sent(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.magic_links.clone())
            .unwrap_or_default()
    }

    /// Simulate following a magic link: sign in the user with that email,
    /// creating it if needed.
    pub fn complete_magic_link(&self, email: &str) -> Result<AuthSession, RemoteError> {
        let mut state = self.lock()?;
        if !state.magic_links.iter().any(|e| e.eq_ignore_ascii_case(email)) {
            return Err(RemoteError::Auth("no login link was sent to this address".to_string()));
        }
        let user_id = match state.find_by_email(email) {
            Some(id) => id,
            None => state.create_user(Some(email.to_string()), None, UserMetadata::default()),
        };
        state.issue_session(user_id)
    }
}

impl AuthBackend for MemoryBackend {
    async fn sign_in_anonymously(
        &self,
        metadata: &UserMetadata,
    ) -> Result<AuthSession, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::SignInAnonymously)?;
        let user_id = state.create_user(None, None, metadata.clone());
        state.issue_session(user_id)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::SignInWithPassword)?;
        let user_id = state
            .find_by_email(email)
            .filter(|id| {
                state
                    .users
                    .get(id)
                    .and_then(|u| u.password.as_deref())
                    == Some(password)
            })
            .ok_or_else(|| RemoteError::Auth("Invalid login credentials".to_string()))?;
        state.issue_session(user_id)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::SignUp)?;
        if state.find_by_email(email).is_some() {
            return Err(RemoteError::Auth("User already registered".to_string()));
        }
        let user_id = state.create_user(
            Some(email.to_string()),
            Some(password.to_string()),
            UserMetadata::default(),
        );
        state.issue_session(user_id)
    }

    async fn send_magic_link(
        &self,
        email: &str,
        _redirect_to: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::SendMagicLink)?;
        state.magic_links.push(email.to_string());
        Ok(())
    }

    async fn update_user(
        &self,
        access_token: &str,
        update: &UserUpdate,
    ) -> Result<AuthSession, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::UpdateUser)?;
        let user_id = state.user_for_token(access_token)?;

        if let Some(email) = &update.email {
            if let Some(owner) = state.find_by_email(email) {
                if owner != user_id {
                    return Err(RemoteError::Auth(
                        "A user with this email address has already been registered".to_string(),
                    ));
                }
            }
        }

        let was_anonymous = state
            .users
            .get(&user_id)
            .map(|u| u.user.email.is_none())
            .unwrap_or(false);

        if was_anonymous && self.promotion_mode == PromotionMode::NewIdentity {
            let current = state
                .users
                .get(&user_id)
                .map(|u| u.user.metadata.clone())
                .unwrap_or_default();
            let new_id = state.create_user(
                update.email.clone(),
                update.password.clone(),
                update.metadata.clone().unwrap_or(current),
            );
            state.promotions.insert(user_id, new_id);
            return state.issue_session(new_id);
        }

        let stored = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| RemoteError::NotFound(format!("user {}", user_id)))?;
        if let Some(email) = &update.email {
            stored.user.email = Some(email.clone());
        }
        if let Some(password) = &update.password {
            stored.password = Some(password.clone());
        }
        if let Some(metadata) = &update.metadata {
            stored.user.metadata = metadata.clone();
        }
        let user = stored.user.clone();

        Ok(AuthSession {
            access_token: access_token.to_string(),
            refresh_token: None,
            user,
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::GetUser)?;
        let user_id = state.user_for_token(access_token)?;
        state
            .users
            .get(&user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("user {}", user_id)))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::SignOut)?;
        state.tokens.remove(access_token);
        Ok(())
    }
}

impl IdeaBackend for MemoryBackend {
    async fn select_ideas(&self, access_token: &str) -> Result<Vec<Idea>, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::SelectIdeas)?;
        let user_id = state.user_for_token(access_token)?;
        let mut ideas: Vec<Idea> = state
            .ideas
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        ideas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ideas)
    }

    async fn insert_idea(&self, access_token: &str, row: &IdeaRow) -> Result<Idea, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::InsertIdea)?;
        let user_id = state.user_for_token(access_token)?;
        if row.user_id != user_id {
            return Err(RemoteError::Auth(
                "new row violates row-level security policy".to_string(),
            ));
        }
        let now = state.next_timestamp();
        let idea = Idea {
            id: Uuid::now_v7(),
            user_id,
            title: row.title.clone(),
            content: row.content.clone(),
            action_type: row.action_type,
            tags: row.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        state.ideas.push(idea.clone());
        Ok(idea)
    }

    async fn update_idea(
        &self,
        access_token: &str,
        id: Uuid,
        row: &IdeaRow,
    ) -> Result<Idea, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::UpdateIdea)?;
        let user_id = state.user_for_token(access_token)?;
        if row.user_id != user_id {
            return Err(RemoteError::Auth(
                "row violates row-level security policy".to_string(),
            ));
        }
        let now = state.next_timestamp();
        let idea = state
            .ideas
            .iter_mut()
            .find(|i| i.id == id && i.user_id == user_id)
            .ok_or_else(|| RemoteError::NotFound(format!("idea {}", id)))?;
        idea.title = row.title.clone();
        idea.content = row.content.clone();
        idea.action_type = row.action_type;
        idea.tags = row.tags.clone();
        idea.updated_at = now;
        Ok(idea.clone())
    }

    async fn delete_idea(&self, access_token: &str, id: Uuid) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::DeleteIdea)?;
        let user_id = state.user_for_token(access_token)?;
        state.ideas.retain(|i| !(i.id == id && i.user_id == user_id));
        Ok(())
    }

    async fn reassign_owner(
        &self,
        access_token: &str,
        from: Uuid,
        to: Uuid,
    ) -> Result<u64, RemoteError> {
        let mut state = self.lock()?;
        state.take_failure(BackendOp::ReassignOwner)?;
        let caller = state.user_for_token(access_token)?;
        if caller != to && caller != from {
            return Err(RemoteError::Auth(
                "only the source or target user may reassign rows".to_string(),
            ));
        }
        if state.promotions.get(&from) != Some(&to) {
            return Err(RemoteError::Auth(
                "rows can only move from a guest to the account it was promoted to".to_string(),
            ));
        }
        let plain_row_security = self.plain_row_security;
        let mut moved = 0u64;
        for idea in state
            .ideas
            .iter_mut()
            .filter(|i| i.user_id == from && (!plain_row_security || i.user_id == caller))
        {
            idea.user_id = to;
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdeaInput;

    fn row(user_id: Uuid, title: &str) -> IdeaRow {
        IdeaRow::new(user_id, &IdeaInput::new(title, "body"))
    }

    #[tokio::test]
    async fn test_rows_are_private_to_their_owner() {
        let backend = MemoryBackend::new();
        let alice = backend
            .sign_in_anonymously(&UserMetadata::guest("a"))
            .await
            .unwrap();
        let bob = backend
            .sign_in_anonymously(&UserMetadata::guest("b"))
            .await
            .unwrap();

        backend
            .insert_idea(&alice.access_token, &row(alice.user.id, "mine"))
            .await
            .unwrap();

        assert_eq!(backend.select_ideas(&alice.access_token).await.unwrap().len(), 1);
        assert!(backend.select_ideas(&bob.access_token).await.unwrap().is_empty());

        // Bob cannot write a row owned by Alice
        assert!(backend
            .insert_idea(&bob.access_token, &row(alice.user.id, "forged"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_select_is_newest_first() {
        let backend = MemoryBackend::new();
        let s = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        for title in ["one", "two", "three"] {
            backend
                .insert_idea(&s.access_token, &row(s.user.id, title))
                .await
                .unwrap();
        }
        let titles: Vec<String> = backend
            .select_ideas(&s.access_token)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_fail_next_only_once() {
        let backend = MemoryBackend::new();
        let s = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        backend.fail_next(BackendOp::SelectIdeas);
        assert!(backend.select_ideas(&s.access_token).await.is_err());
        assert!(backend.select_ideas(&s.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_user_in_place_keeps_id() {
        let backend = MemoryBackend::with_promotion_mode(PromotionMode::InPlace);
        let s = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        let update = UserUpdate {
            email: Some("x@example.com".to_string()),
            password: Some("Secret-Pass-123".to_string()),
            metadata: None,
        };
        let promoted = backend.update_user(&s.access_token, &update).await.unwrap();
        assert_eq!(promoted.user.id, s.user.id);
        assert_eq!(promoted.user.email.as_deref(), Some("x@example.com"));

        let again = backend
            .sign_in_with_password("x@example.com", "Secret-Pass-123")
            .await
            .unwrap();
        assert_eq!(again.user.id, s.user.id);
    }

    #[tokio::test]
    async fn test_update_user_new_identity() {
        let backend = MemoryBackend::with_promotion_mode(PromotionMode::NewIdentity);
        let s = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        let update = UserUpdate {
            email: Some("x@example.com".to_string()),
            password: Some("Secret-Pass-123".to_string()),
            metadata: None,
        };
        let promoted = backend.update_user(&s.access_token, &update).await.unwrap();
        assert_ne!(promoted.user.id, s.user.id);
        assert_eq!(promoted.user.metadata.device_id.as_deref(), Some("d"));
    }

    async fn promoted_guest(backend: &MemoryBackend) -> (AuthSession, AuthSession) {
        let guest = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        backend
            .insert_idea(&guest.access_token, &row(guest.user.id, "a"))
            .await
            .unwrap();
        let update = UserUpdate {
            email: Some("y@example.com".to_string()),
            password: Some("Secret-Pass-123".to_string()),
            metadata: None,
        };
        let account = backend
            .update_user(&guest.access_token, &update)
            .await
            .unwrap();
        (guest, account)
    }

    #[tokio::test]
    async fn test_reassign_owner() {
        let backend = MemoryBackend::with_promotion_mode(PromotionMode::NewIdentity);
        let (guest, account) = promoted_guest(&backend).await;

        let moved = backend
            .reassign_owner(&account.access_token, guest.user.id, account.user.id)
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert!(backend
            .all_ideas()
            .iter()
            .all(|i| i.user_id == account.user.id));
    }

    #[tokio::test]
    async fn test_reassign_by_unrelated_user_rejected() {
        let backend = MemoryBackend::new();
        let victim = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        backend
            .insert_idea(&victim.access_token, &row(victim.user.id, "secret"))
            .await
            .unwrap();
        let other = backend.sign_up("z@example.com", "pw").await.unwrap();

        let err = backend
            .reassign_owner(&other.access_token, victim.user.id, other.user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Auth(_)));
        assert!(backend
            .select_ideas(&other.access_token)
            .await
            .unwrap()
            .is_empty());
        assert!(backend
            .all_ideas()
            .iter()
            .all(|i| i.user_id == victim.user.id));
    }

    #[tokio::test]
    async fn test_reassign_to_other_target_rejected() {
        let backend = MemoryBackend::with_promotion_mode(PromotionMode::NewIdentity);
        let (guest, _account) = promoted_guest(&backend).await;
        let other = backend.sign_up("z@example.com", "pw").await.unwrap();

        let err = backend
            .reassign_owner(&other.access_token, guest.user.id, other.user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Auth(_)));
    }

    #[tokio::test]
    async fn test_plain_row_security_moves_nothing() {
        let backend = MemoryBackend::with_promotion_mode(PromotionMode::NewIdentity)
            .with_plain_row_security(true);
        let (guest, account) = promoted_guest(&backend).await;

        let moved = backend
            .reassign_owner(&account.access_token, guest.user.id, account.user.id)
            .await
            .unwrap();
        assert_eq!(moved, 0);
        assert!(backend
            .all_ideas()
            .iter()
            .all(|i| i.user_id == guest.user.id));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_rejected() {
        let backend = MemoryBackend::new();
        backend.sign_up("x@example.com", "pw").await.unwrap();
        let err = backend.sign_up("X@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, RemoteError::Auth(_)));
    }

    #[tokio::test]
    async fn test_magic_link_flow() {
        let backend = MemoryBackend::new();
        assert!(backend.complete_magic_link("m@example.com").is_err());
        backend.send_magic_link("m@example.com", None).await.unwrap();
        assert_eq!(backend.magic_links_sent(), vec!["m@example.com"]);
        let session = backend.complete_magic_link("m@example.com").unwrap();
        assert_eq!(session.user.email.as_deref(), Some("m@example.com"));
    }

    #[tokio::test]
    async fn test_signed_out_token_is_rejected() {
        let backend = MemoryBackend::new();
        let s = backend
            .sign_in_anonymously(&UserMetadata::guest("d"))
            .await
            .unwrap();
        backend.sign_out(&s.access_token).await.unwrap();
        assert!(matches!(
            backend.select_ideas(&s.access_token).await,
            Err(RemoteError::Auth(_))
        ));
    }
}
