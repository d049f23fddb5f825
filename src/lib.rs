//! Spark Vault core: capture short "idea" notes against a hosted auth and
//! row store.
//!
//! The library provides:
//! - A per-installation device identifier
//! - Guest sessions that can later be promoted to an email/password account
//!   without losing their ideas
//! - An idea repository with validation, fetch, create, update and delete
//! - Client-side search and sorting, rendered through interchangeable views
//!
//! The remote store sits behind the [`backend::AuthBackend`] and
//! [`backend::IdeaBackend`] traits. [`http_backend::HttpBackend`] talks to the
//! hosted service; [`memory_backend::MemoryBackend`] keeps everything in
//! process.
//!
//! # Feature Flags
//!
//! - `desktop`: Resolve the config directory from the platform.
//! - `uniffi`: Generate UniFFI bindings for mobile platforms (Android, iOS).

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod http_backend;
pub mod memory_backend;
pub mod models;
pub mod preferences;
pub mod repository;
pub mod search;
pub mod session;
pub mod validation;
pub mod views;

// Mobile bindings module
#[cfg(feature = "uniffi")]
pub mod mobile;

// UniFFI scaffolding (must be at crate root)
#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();

// Re-export commonly used types
pub use backend::{AuthBackend, IdeaBackend, RemoteError};
pub use config::Config;
pub use device::{DeviceId, DeviceIdentityProvider};
pub use error::{ValidationError, ValidationReport, VaultError, VaultResult};
pub use models::{ActionType, Idea, IdeaInput, UserMetadata};
pub use preferences::{PreferenceStore, ViewPreferences};
pub use repository::IdeaRepository;
pub use search::{project, IdeaQuery, SortField, SortOrder};
pub use session::{AuthEvent, Promotion, Session, SessionKind, SessionManager};
pub use validation::validate;
pub use views::{render_view, IdeaRenderer, ViewMode};

// Re-export mobile types when uniffi feature is enabled
#[cfg(feature = "uniffi")]
pub use mobile::{IdeaData, SessionInfo, VaultClient, VaultCoreError, ViewSettings};
