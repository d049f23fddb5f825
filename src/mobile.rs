//! Mobile bindings for Spark Vault.
//!
//! A blocking facade over the async core, exposed to Kotlin and Swift via
//! UniFFI. The client owns a single-threaded tokio runtime and drives every
//! backend call to completion before returning.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::Config;
use crate::device::DeviceIdentityProvider;
use crate::error::VaultError;
use crate::http_backend::HttpBackend;
use crate::models::{ActionType, Idea, IdeaInput};
use crate::preferences::{FilePreferenceStore, ViewPreferences};
use crate::repository::IdeaRepository;
use crate::search::IdeaQuery;
use crate::session::{
    load_session, pending_migration, save_session, set_pending_migration, Session,
    SessionManager,
};
use crate::validation::{check_password, parse_tags, validate_idea_id, PasswordStrength};

/// Error type exposed to Kotlin/Swift via UniFFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum VaultCoreError {
    #[error("Validation error: {msg}")]
    Validation { msg: String },
    #[error("Authentication error: {msg}")]
    Auth { msg: String },
    #[error("{msg}")]
    NotGuest { msg: String },
    #[error("{msg}")]
    PartialMigration { msg: String },
    #[error("Remote error: {msg}")]
    Remote { msg: String },
    #[error("Configuration error: {msg}")]
    Config { msg: String },
    #[error("IO error: {msg}")]
    Io { msg: String },
    #[error("Not found: {msg}")]
    NotFound { msg: String },
}

impl From<VaultError> for VaultCoreError {
    fn from(err: VaultError) -> Self {
        let msg = err.user_message();
        match err {
            VaultError::Validation { .. } | VaultError::Uuid(_) => VaultCoreError::Validation { msg },
            VaultError::Auth(_) | VaultError::NotAuthenticated => VaultCoreError::Auth { msg },
            VaultError::NotGuest => VaultCoreError::NotGuest { msg },
            VaultError::PartialMigration { .. } => VaultCoreError::PartialMigration { msg },
            VaultError::Remote(_) => VaultCoreError::Remote { msg },
            VaultError::Config(_) => VaultCoreError::Config { msg },
            VaultError::Io(_) | VaultError::Json(_) => VaultCoreError::Io { msg },
            VaultError::NotFound(_) => VaultCoreError::NotFound { msg },
            VaultError::Other(_) => VaultCoreError::Io { msg },
        }
    }
}

fn lock_failed() -> VaultCoreError {
    VaultCoreError::Io {
        msg: "internal state lock poisoned".to_string(),
    }
}

/// An idea as shown by the mobile UI
#[derive(Debug, Clone, uniffi::Record)]
pub struct IdeaData {
    pub id: String,
    pub title: String,
    pub content: String,
    pub action_type: String,
    pub action_label: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Idea> for IdeaData {
    fn from(idea: Idea) -> Self {
        Self {
            id: idea.id.to_string(),
            title: idea.title,
            content: idea.content,
            action_type: idea.action_type.as_str().to_string(),
            action_label: idea.action_type.label().to_string(),
            tags: idea.tags,
            created_at: idea.created_at.to_rfc3339(),
            updated_at: idea.updated_at.to_rfc3339(),
        }
    }
}

/// The active session, without its tokens
#[derive(Debug, Clone, uniffi::Record)]
pub struct SessionInfo {
    pub user_id: String,
    pub email: Option<String>,
    pub is_guest: bool,
    pub device_id: Option<String>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.to_string(),
            email: session.email.clone(),
            is_guest: session.is_guest(),
            device_id: session.metadata.device_id.clone(),
        }
    }
}

/// Saved list display settings
#[derive(Debug, Clone, uniffi::Record)]
pub struct ViewSettings {
    pub view_mode: String,
    pub sort_field: String,
    pub sort_order: String,
    pub form_collapsed: bool,
}

/// Rate a password candidate: "weak", "medium" or "strong"
#[uniffi::export]
pub fn password_strength(password: String) -> String {
    match check_password(&password).strength {
        PasswordStrength::Weak => "weak",
        PasswordStrength::Medium => "medium",
        PasswordStrength::Strong => "strong",
    }
    .to_string()
}

/// Main client for Spark Vault on mobile
#[derive(uniffi::Object)]
pub struct VaultClient {
    runtime: tokio::runtime::Runtime,
    prefs: FilePreferenceStore,
    device_id: String,
    sessions: SessionManager<HttpBackend>,
    repository: Mutex<IdeaRepository<HttpBackend>>,
}

impl VaultClient {
    fn repository(&self) -> Result<MutexGuard<'_, IdeaRepository<HttpBackend>>, VaultCoreError> {
        self.repository.lock().map_err(|_| lock_failed())
    }

    fn session(&self) -> Result<Session, VaultCoreError> {
        Ok(self.sessions.require()?)
    }

    fn persist_session(&self) {
        if let Err(e) = save_session(&self.prefs, self.sessions.current().as_ref()) {
            tracing::warn!(error = %e, "Could not save session");
        }
    }

    fn input(
        title: String,
        content: String,
        tags: String,
        action_type: String,
    ) -> Result<IdeaInput, VaultCoreError> {
        let action_type: ActionType = action_type.parse()?;
        Ok(IdeaInput::new(title, content)
            .with_tags(parse_tags(&tags))
            .with_action_type(action_type))
    }
}

#[uniffi::export]
impl VaultClient {
    /// Create a client storing its config and preferences in `data_dir`.
    ///
    /// `platform_device_id` is the native installation id, used the first
    /// time a device id is created.
    #[uniffi::constructor]
    pub fn new(
        data_dir: String,
        backend_url: String,
        anon_key: String,
        platform_device_id: Option<String>,
    ) -> Result<Arc<Self>, VaultCoreError> {
        let data_path = PathBuf::from(&data_dir);
        std::fs::create_dir_all(&data_path).map_err(|e| VaultCoreError::Io {
            msg: format!("Failed to create data directory: {}", e),
        })?;

        let mut config = Config::new(Some(data_path))?;
        if config.backend_url() != backend_url.trim_end_matches('/') {
            config.set("backend_url", &backend_url)?;
        }
        if config.anon_key() != anon_key {
            config.set("anon_key", &anon_key)?;
        }

        let prefs = FilePreferenceStore::open(config.preferences_file())?;
        let device_id = DeviceIdentityProvider::new(&prefs)
            .with_platform_id(platform_device_id)
            .get_or_create_device_id()
            .into_string();

        let backend = Arc::new(HttpBackend::new(
            config.backend_url(),
            config.anon_key(),
            Duration::from_secs(config.request_timeout_secs()),
        )?);
        let sessions = SessionManager::new(Arc::clone(&backend))
            .with_redirect_url(config.redirect_url().map(String::from));
        let repository = Mutex::new(IdeaRepository::new(backend));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| VaultCoreError::Io {
                msg: format!("Failed to create runtime: {}", e),
            })?;

        Ok(Arc::new(Self {
            runtime,
            prefs,
            device_id,
            sessions,
            repository,
        }))
    }

    pub fn device_id(&self) -> String {
        self.device_id.clone()
    }

    /// Resume the saved session, or start a guest session for this device.
    pub fn start(&self) -> Result<SessionInfo, VaultCoreError> {
        if let Some(saved) = load_session(&self.prefs) {
            self.sessions.restore_session(saved)?;
            match self.runtime.block_on(self.sessions.refresh_user()) {
                Ok(session) => {
                    self.persist_session();
                    return Ok(SessionInfo::from(&session));
                }
                Err(VaultError::Auth(_)) => {
                    tracing::info!("Saved session expired, starting a guest session");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let session = self
            .runtime
            .block_on(self.sessions.sign_in_as_guest(Some(&self.device_id)))?;
        self.persist_session();
        Ok(SessionInfo::from(&session))
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.sessions.current().as_ref().map(SessionInfo::from)
    }

    pub fn sign_in(&self, email: String, password: String) -> Result<SessionInfo, VaultCoreError> {
        let session = self
            .runtime
            .block_on(self.sessions.sign_in_with_password(&email, &password))?;
        self.persist_session();
        Ok(SessionInfo::from(&session))
    }

    pub fn send_magic_link(&self, email: String) -> Result<(), VaultCoreError> {
        Ok(self.runtime.block_on(self.sessions.send_magic_link(&email))?)
    }

    /// Fetch all ideas and return them filtered and sorted.
    ///
    /// `action_type` of `None` or "all" disables the action filter.
    pub fn list_ideas(
        &self,
        query: String,
        sort_field: String,
        sort_order: String,
        action_type: Option<String>,
    ) -> Result<Vec<IdeaData>, VaultCoreError> {
        let action_type = match action_type.as_deref() {
            None | Some("all") | Some("") => None,
            Some(value) => Some(value.parse::<ActionType>()?),
        };
        let query = IdeaQuery::new(query)
            .sorted_by(sort_field.parse()?, sort_order.parse()?)
            .with_action_type(action_type);

        let session = self.session()?;
        let mut repo = self.repository()?;
        self.runtime.block_on(repo.fetch_all(&session))?;
        Ok(repo.project(&query).into_iter().map(IdeaData::from).collect())
    }

    /// Message of the last failed list operation, if any
    pub fn last_error(&self) -> Option<String> {
        self.repository().ok()?.last_error().map(String::from)
    }

    pub fn create_idea(
        &self,
        title: String,
        content: String,
        tags: String,
        action_type: String,
    ) -> Result<IdeaData, VaultCoreError> {
        let input = Self::input(title, content, tags, action_type)?;
        let session = self.session()?;
        let mut repo = self.repository()?;
        let idea = self.runtime.block_on(repo.create(&session, &input))?;
        Ok(idea.into())
    }

    pub fn update_idea(
        &self,
        id: String,
        title: String,
        content: String,
        tags: String,
        action_type: String,
    ) -> Result<IdeaData, VaultCoreError> {
        let id = validate_idea_id(&id)?;
        let input = Self::input(title, content, tags, action_type)?;
        let session = self.session()?;
        let mut repo = self.repository()?;
        let idea = self.runtime.block_on(repo.update(&session, id, &input))?;
        Ok(idea.into())
    }

    pub fn delete_idea(&self, id: String) -> Result<(), VaultCoreError> {
        let id = validate_idea_id(&id)?;
        let session = self.session()?;
        let mut repo = self.repository()?;
        Ok(self.runtime.block_on(repo.remove(&session, id))?)
    }

    /// Turn the guest session into an email/password account.
    ///
    /// On `PartialMigration` the account exists and the session is saved;
    /// call `retry_migration` to move the remaining ideas.
    pub fn promote(&self, email: String, password: String) -> Result<SessionInfo, VaultCoreError> {
        let old_user_id = self.sessions.current().map(|s| s.user_id);
        let result = self
            .runtime
            .block_on(self.sessions.promote_guest_to_account(&email, &password));
        self.persist_session();

        match result {
            Ok(promotion) => Ok(SessionInfo::from(&promotion.session)),
            Err(e) => {
                if e.is_partial_migration() {
                    if let Err(save_err) = set_pending_migration(&self.prefs, old_user_id) {
                        tracing::warn!(error = %save_err, "Could not save pending migration");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Finish an interrupted promotion. Returns the number of ideas moved.
    pub fn retry_migration(&self) -> Result<u64, VaultCoreError> {
        let Some(old_user_id) = pending_migration(&self.prefs) else {
            return Ok(0);
        };
        let moved = self
            .runtime
            .block_on(self.sessions.retry_migration(old_user_id))?;
        set_pending_migration(&self.prefs, None)?;
        Ok(moved)
    }

    pub fn has_pending_migration(&self) -> bool {
        pending_migration(&self.prefs).is_some()
    }

    pub fn update_password(&self, password: String, confirmation: String) -> Result<(), VaultCoreError> {
        Ok(self
            .runtime
            .block_on(self.sessions.update_password(&password, &confirmation))?)
    }

    pub fn sign_out(&self) -> Result<(), VaultCoreError> {
        self.runtime.block_on(self.sessions.sign_out())?;
        self.repository()?.clear();
        save_session(&self.prefs, None)?;
        Ok(())
    }

    pub fn view_settings(&self) -> ViewSettings {
        let prefs = ViewPreferences::load(&self.prefs);
        ViewSettings {
            view_mode: prefs.view_mode.as_str().to_string(),
            sort_field: prefs.sort_field.as_str().to_string(),
            sort_order: prefs.sort_order.as_str().to_string(),
            form_collapsed: prefs.form_collapsed,
        }
    }

    pub fn save_view_settings(&self, settings: ViewSettings) -> Result<(), VaultCoreError> {
        let prefs = ViewPreferences {
            view_mode: settings.view_mode.parse()?,
            sort_field: settings.sort_field.parse()?,
            sort_order: settings.sort_order.parse()?,
            form_collapsed: settings.form_collapsed,
        };
        prefs.save(&self.prefs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: VaultCoreError = VaultError::NotGuest.into();
        assert!(matches!(err, VaultCoreError::NotGuest { .. }));

        let err: VaultCoreError = VaultError::validation("title", "title is required").into();
        assert!(matches!(err, VaultCoreError::Validation { ref msg } if msg == "title: title is required"));

        let err: VaultCoreError = VaultError::PartialMigration {
            user_id: "b".to_string(),
            old_user_id: "a".to_string(),
            message: "network".to_string(),
        }
        .into();
        assert!(matches!(err, VaultCoreError::PartialMigration { .. }));
    }

    #[test]
    fn test_password_strength_labels() {
        assert_eq!(password_strength("abc".to_string()), "weak");
        assert_eq!(password_strength("Correct-Horse-42".to_string()), "strong");
    }

    #[test]
    fn test_client_setup_persists_device_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        let first = VaultClient::new(
            data_dir.clone(),
            "https://example.invalid".to_string(),
            "anon".to_string(),
            Some("android-123".to_string()),
        )
        .unwrap();
        assert_eq!(first.device_id(), "android-123");
        assert!(first.session_info().is_none());

        let second = VaultClient::new(
            data_dir,
            "https://example.invalid".to_string(),
            "anon".to_string(),
            None,
        )
        .unwrap();
        assert_eq!(second.device_id(), "android-123");
        assert_eq!(second.view_settings().view_mode, "grid");
    }
}
