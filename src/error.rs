//! Error types for Spark Vault.
//!
//! This module defines all error types used throughout the library.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias for Spark Vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Main error type for Spark Vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Any failed call to the remote identity/row store.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Current session is not a guest session")]
    NotGuest,

    /// The account exists but its ideas still belong to the old guest identity.
    #[error("Account created for {user_id} but ideas of {old_user_id} were not migrated: {message}")]
    PartialMigration {
        user_id: String,
        old_user_id: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl VaultError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        VaultError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new remote store error
    pub fn remote(message: impl Into<String>) -> Self {
        VaultError::Remote(message.into())
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        VaultError::Auth(message.into())
    }

    pub fn is_partial_migration(&self) -> bool {
        matches!(self, VaultError::PartialMigration { .. })
    }

    /// Message suitable for showing to the person using the app.
    pub fn user_message(&self) -> String {
        match self {
            VaultError::Validation { field, message } => format!("{}: {}", field, message),
            VaultError::Remote(_) => "Could not reach the server. Please try again.".to_string(),
            VaultError::Auth(msg) => msg.clone(),
            VaultError::NotAuthenticated => "Please sign in first.".to_string(),
            VaultError::NotGuest => "This account is not a guest account.".to_string(),
            VaultError::PartialMigration { .. } => {
                "Your account was created, but your ideas have not been moved to it yet. \
                 Retry the migration to finish."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Validation error with field and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for VaultError {
    fn from(err: ValidationError) -> Self {
        VaultError::Validation {
            field: err.field,
            message: err.message,
        }
    }
}

/// Field name to the message of the first rule it violated.
///
/// An empty report means the input is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: BTreeMap<String, String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation unless the field already has one.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Convert into a result, failing with the first field in name order.
    pub fn into_result(self) -> VaultResult<()> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some((field, message)) => Err(VaultError::Validation { field, message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("test_field", "test message");
        assert_eq!(err.to_string(), "test_field: test message");
    }

    #[test]
    fn test_vault_error_validation() {
        let err = VaultError::validation("field", "message");
        assert!(matches!(err, VaultError::Validation { .. }));
    }

    #[test]
    fn test_report_keeps_first_message_per_field() {
        let mut report = ValidationReport::new();
        report.add("title", "first");
        report.add("title", "second");
        assert_eq!(report.get("title"), Some("first"));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_report_into_result() {
        assert!(ValidationReport::new().into_result().is_ok());

        let mut report = ValidationReport::new();
        report.add("tags", "too many");
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, VaultError::Validation { ref field, .. } if field == "tags"));
    }

    #[test]
    fn test_partial_migration_is_distinct() {
        let err = VaultError::PartialMigration {
            user_id: "u".to_string(),
            old_user_id: "g".to_string(),
            message: "boom".to_string(),
        };
        assert!(err.is_partial_migration());
        assert!(!VaultError::remote("x").is_partial_migration());
        assert_ne!(err.user_message(), VaultError::remote("x").user_message());
    }
}
