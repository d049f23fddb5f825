//! Guest Session Manager.
//!
//! Holds the single active session of a running instance and drives its
//! state machine:
//!
//! ```text
//! Unauthenticated -> Guest -> Credentialed
//! Unauthenticated -----------> Credentialed
//! any ------------------------> Unauthenticated   (sign out)
//! ```
//!
//! A credentialed session never goes back to guest. Promotion keeps the
//! guest's ideas: if the identity store issues a new user id, every row owned
//! by the old id is reassigned to the new one.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{AuthBackend, AuthSession, IdeaBackend, RemoteError, UserUpdate};
use crate::error::{VaultError, VaultResult};
use crate::models::UserMetadata;
use crate::preferences::PreferenceStore;
use crate::validation::{
    validate_email, validate_password, validate_password_confirmation,
};

/// Preference key holding the persisted session
pub const SESSION_KEY: &str = "session";

/// Preference key holding the old user id of an unfinished promotion
pub const PENDING_MIGRATION_KEY: &str = "pending_migration";

/// The authenticated session held by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: UserMetadata,
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        if self.metadata.is_guest {
            SessionKind::Guest
        } else {
            SessionKind::Credentialed
        }
    }

    pub fn is_guest(&self) -> bool {
        self.kind() == SessionKind::Guest
    }
}

impl From<AuthSession> for Session {
    fn from(auth: AuthSession) -> Self {
        Self {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user_id: auth.user.id,
            email: auth.user.email,
            metadata: auth.user.metadata,
        }
    }
}

/// Read the session saved by [`save_session`], if any.
///
/// A missing, unreadable or malformed entry reads as no session.
pub fn load_session(store: &dyn PreferenceStore) -> Option<Session> {
    let json = match store.get(SESSION_KEY) {
        Ok(value) => value?,
        Err(e) => {
            tracing::debug!(error = %e, "Saved session unavailable");
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed saved session");
            None
        }
    }
}

/// Persist `session`, or forget the saved one when `None`.
pub fn save_session(store: &dyn PreferenceStore, session: Option<&Session>) -> VaultResult<()> {
    match session {
        Some(session) => store.set(SESSION_KEY, &serde_json::to_string(session)?),
        None => store.remove(SESSION_KEY),
    }
}

/// Old user id whose ideas still wait for reassignment.
pub fn pending_migration(store: &dyn PreferenceStore) -> Option<Uuid> {
    store
        .get(PENDING_MIGRATION_KEY)
        .ok()
        .flatten()
        .and_then(|v| Uuid::parse_str(&v).ok())
}

pub fn set_pending_migration(store: &dyn PreferenceStore, old_user_id: Option<Uuid>) -> VaultResult<()> {
    match old_user_id {
        Some(id) => store.set(PENDING_MIGRATION_KEY, &id.to_string()),
        None => store.remove(PENDING_MIGRATION_KEY),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Unauthenticated,
    Guest,
    Credentialed,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Unauthenticated => "unauthenticated",
            SessionKind::Guest => "guest",
            SessionKind::Credentialed => "credentialed",
        }
    }
}

/// Session change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: Uuid, kind: SessionKind },
    Promoted { old_user_id: Uuid, user_id: Uuid },
    UserUpdated { user_id: Uuid },
    SignedOut,
}

/// Outcome of a successful guest promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub session: Session,
    pub old_user_id: Uuid,
    /// Rows reassigned to the new id; `None` when the identity kept its id
    pub migrated: Option<u64>,
}

type Listener = dyn Fn(&AuthEvent) + Send + Sync;

/// Keeps a subscription alive. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    _listener: Arc<Listener>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

pub struct SessionManager<B> {
    backend: Arc<B>,
    redirect_url: Option<String>,
    session: Mutex<Option<Session>>,
    listeners: Mutex<Vec<Weak<Listener>>>,
}

fn poisoned() -> VaultError {
    VaultError::Other("session state lock poisoned".to_string())
}

impl<B> SessionManager<B>
where
    B: AuthBackend + IdeaBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            redirect_url: None,
            session: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// URL the magic-link email sends the user back to.
    pub fn with_redirect_url(mut self, redirect_url: Option<String>) -> Self {
        self.redirect_url = redirect_url.filter(|u| !u.is_empty());
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn state(&self) -> VaultResult<MutexGuard<'_, Option<Session>>> {
        self.session.lock().map_err(|_| poisoned())
    }

    fn replace(&self, session: Option<Session>) -> VaultResult<()> {
        *self.state()? = session;
        Ok(())
    }

    pub fn current(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    pub fn kind(&self) -> SessionKind {
        self.current()
            .map(|s| s.kind())
            .unwrap_or(SessionKind::Unauthenticated)
    }

    /// The active session, or `NotAuthenticated`.
    pub fn require(&self) -> VaultResult<Session> {
        self.current().ok_or(VaultError::NotAuthenticated)
    }

    /// Register `callback` for session changes until the returned guard drops.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let listener: Arc<Listener> = Arc::new(callback);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|l| l.strong_count() > 0);
            listeners.push(Arc::downgrade(&listener));
        }
        Subscription {
            _listener: listener,
        }
    }

    fn emit(&self, event: AuthEvent) {
        let live: Vec<Arc<Listener>> = match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.retain(|l| l.strong_count() > 0);
                listeners.iter().filter_map(Weak::upgrade).collect()
            }
            Err(_) => return,
        };
        for listener in live {
            (*listener)(&event);
        }
    }

    fn establish(&self, session: Session) -> VaultResult<Session> {
        self.replace(Some(session.clone()))?;
        tracing::info!(user_id = %session.user_id, kind = session.kind().as_str(), "Signed in");
        self.emit(AuthEvent::SignedIn {
            user_id: session.user_id,
            kind: session.kind(),
        });
        Ok(session)
    }

    /// Adopt a previously persisted session without contacting the backend.
    ///
    /// An active guest can only be replaced by a session for the same user;
    /// its ideas would otherwise be stranded under an identity nobody holds.
    pub fn restore_session(&self, session: Session) -> VaultResult<Session> {
        if let Some(current) = self.current() {
            if current.kind() == SessionKind::Credentialed && session.kind() == SessionKind::Guest {
                return Err(VaultError::auth(
                    "cannot replace an account session with a guest session",
                ));
            }
            if current.is_guest() && session.user_id != current.user_id {
                return Err(VaultError::auth(
                    "a guest session is active; create an account to keep its ideas or sign out first",
                ));
            }
        }
        self.establish(session)
    }

    /// Re-read the user behind the active session.
    ///
    /// An auth rejection means the token is no longer valid: the session is
    /// dropped and the manager returns to unauthenticated.
    pub async fn refresh_user(&self) -> VaultResult<Session> {
        let session = self.require()?;
        let result = self.backend.get_user(&session.access_token).await;
        match result {
            Ok(user) => {
                let refreshed = Session {
                    user_id: user.id,
                    email: user.email,
                    metadata: user.metadata,
                    ..session
                };
                self.replace(Some(refreshed.clone()))?;
                Ok(refreshed)
            }
            Err(RemoteError::Auth(msg)) => {
                tracing::warn!(user_id = %session.user_id, "Stored session rejected, signing out locally");
                self.replace(None)?;
                self.emit(AuthEvent::SignedOut);
                Err(VaultError::Auth(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start an anonymous session tagged with this device.
    ///
    /// An existing guest session is returned unchanged.
    pub async fn sign_in_as_guest(&self, device_id: Option<&str>) -> VaultResult<Session> {
        let device_id = device_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VaultError::auth("device identifier is required for guest sign-in"))?;

        match self.current() {
            Some(existing) if existing.is_guest() => return Ok(existing),
            Some(_) => {
                return Err(VaultError::auth("already signed in with an account"));
            }
            None => {}
        }

        let metadata = UserMetadata::guest(device_id);
        let auth = self
            .backend
            .sign_in_anonymously(&metadata)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Guest sign-in failed");
                VaultError::auth(e.to_string())
            })?;

        let mut session = Session::from(auth);
        // The anonymous user always carries the guest flag, even if the
        // identity store echoes back partial metadata.
        session.metadata.is_guest = true;
        if session.metadata.device_id.is_none() {
            session.metadata.device_id = Some(device_id.to_string());
        }
        self.establish(session)
    }

    fn ensure_signed_out(&self) -> VaultResult<()> {
        match self.kind() {
            SessionKind::Unauthenticated => Ok(()),
            SessionKind::Guest => Err(VaultError::auth(
                "a guest session is active; promote it or sign out first",
            )),
            SessionKind::Credentialed => Err(VaultError::auth("already signed in")),
        }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> VaultResult<Session> {
        let email = email.trim();
        validate_email(email)?;
        if password.is_empty() {
            return Err(VaultError::validation("password", "password is required"));
        }
        self.ensure_signed_out()?;

        let auth = self.backend.sign_in_with_password(email, password).await?;
        self.establish(Session::from(auth))
    }

    /// Register a new account and sign in to it.
    pub async fn sign_up(&self, email: &str, password: &str) -> VaultResult<Session> {
        let email = email.trim();
        validate_email(email)?;
        validate_password(password)?;
        self.ensure_signed_out()?;

        let auth = self.backend.sign_up(email, password).await?;
        self.establish(Session::from(auth))
    }

    /// Request a one-time login link. The session is unchanged until the link
    /// is followed and the resulting session restored.
    pub async fn send_magic_link(&self, email: &str) -> VaultResult<()> {
        let email = email.trim();
        validate_email(email)?;
        self.backend
            .send_magic_link(email, self.redirect_url.as_deref())
            .await?;
        tracing::info!("Magic link requested");
        Ok(())
    }

    /// Turn the active guest session into an email/password account.
    ///
    /// Fails with `NotGuest` unless a guest session is active; the session and
    /// every idea are then left untouched. If the credentials are accepted but
    /// the ideas cannot be moved to the new identity, the session is already
    /// credentialed and `PartialMigration` is returned; call
    /// [`retry_migration`](Self::retry_migration) with the old id to finish.
    pub async fn promote_guest_to_account(
        &self,
        email: &str,
        password: &str,
    ) -> VaultResult<Promotion> {
        let guest = match self.current() {
            Some(session) if session.is_guest() => session,
            _ => return Err(VaultError::NotGuest),
        };
        let email = email.trim();
        validate_email(email)?;
        validate_password(password)?;

        let old_user_id = guest.user_id;
        let expected = self.backend.select_ideas(&guest.access_token).await?.len() as u64;
        let update = UserUpdate {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            metadata: Some(UserMetadata {
                device_id: guest.metadata.device_id.clone(),
                is_guest: false,
            }),
        };

        let auth = self
            .backend
            .update_user(&guest.access_token, &update)
            .await?;
        let mut session = Session::from(auth);
        session.metadata.is_guest = false;
        self.replace(Some(session.clone()))?;
        self.emit(AuthEvent::Promoted {
            old_user_id,
            user_id: session.user_id,
        });

        if session.user_id == old_user_id {
            tracing::info!(user_id = %session.user_id, "Guest promoted in place");
            return Ok(Promotion {
                session,
                old_user_id,
                migrated: None,
            });
        }

        let migrated = self.migrate(&session, old_user_id).await?;
        if migrated < expected {
            tracing::error!(
                user_id = %session.user_id,
                old_user_id = %old_user_id,
                moved = migrated,
                expected,
                "Idea migration moved fewer ideas than the guest owned"
            );
            return Err(VaultError::PartialMigration {
                user_id: session.user_id.to_string(),
                old_user_id: old_user_id.to_string(),
                message: format!(
                    "moved {migrated} of {expected} ideas; the rest still belong to the guest identity"
                ),
            });
        }
        tracing::info!(
            user_id = %session.user_id,
            old_user_id = %old_user_id,
            count = migrated,
            "Guest promoted to new identity"
        );
        Ok(Promotion {
            session,
            old_user_id,
            migrated: Some(migrated),
        })
    }

    async fn migrate(&self, session: &Session, old_user_id: Uuid) -> VaultResult<u64> {
        self.backend
            .reassign_owner(&session.access_token, old_user_id, session.user_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %session.user_id,
                    old_user_id = %old_user_id,
                    error = %e,
                    "Idea migration failed after promotion"
                );
                VaultError::PartialMigration {
                    user_id: session.user_id.to_string(),
                    old_user_id: old_user_id.to_string(),
                    message: e.to_string(),
                }
            })
    }

    /// Repeat the idea reassignment of an interrupted promotion.
    pub async fn retry_migration(&self, old_user_id: Uuid) -> VaultResult<u64> {
        let session = self.require()?;
        if session.is_guest() {
            return Err(VaultError::auth("promote the guest session before migrating ideas"));
        }
        if session.user_id == old_user_id {
            return Ok(0);
        }
        let migrated = self.migrate(&session, old_user_id).await?;
        tracing::info!(user_id = %session.user_id, count = migrated, "Idea migration completed");
        Ok(migrated)
    }

    /// Change the password of the credentialed account.
    pub async fn update_password(&self, password: &str, confirmation: &str) -> VaultResult<()> {
        let session = self.require()?;
        if session.is_guest() {
            return Err(VaultError::auth(
                "guest sessions have no password; create an account first",
            ));
        }
        validate_password(password)?;
        validate_password_confirmation(password, confirmation)?;

        let update = UserUpdate {
            password: Some(password.to_string()),
            ..Default::default()
        };
        let auth = self
            .backend
            .update_user(&session.access_token, &update)
            .await?;
        let updated = Session {
            email: auth.user.email,
            metadata: auth.user.metadata,
            ..session
        };
        self.replace(Some(updated.clone()))?;
        tracing::info!(user_id = %updated.user_id, "Password updated");
        self.emit(AuthEvent::UserUpdated {
            user_id: updated.user_id,
        });
        Ok(())
    }

    /// End the active session.
    ///
    /// The local session is always cleared; a failed remote sign-out only
    /// leaves the token to expire on its own.
    pub async fn sign_out(&self) -> VaultResult<()> {
        let taken = self.state()?.take();
        let Some(session) = taken else {
            return Ok(());
        };
        if let Err(e) = self.backend.sign_out(&session.access_token).await {
            tracing::warn!(user_id = %session.user_id, error = %e, "Remote sign-out failed");
        }
        tracing::info!(user_id = %session.user_id, "Signed out");
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }
}
