//! Data models for Spark Vault.
//!
//! This module defines the core entities: Idea, its input form, and the
//! metadata attached to a backend user. Ids and timestamps are assigned by the
//! remote store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VaultError;

/// What the author intends to do with an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Turn the idea into an app
    BuildApp,
    /// Cover it with an existing tool
    UseExisting,
    /// Undecided
    #[default]
    Pending,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [
        ActionType::BuildApp,
        ActionType::UseExisting,
        ActionType::Pending,
    ];

    /// Wire value, as stored in the `action_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BuildApp => "build_app",
            ActionType::UseExisting => "use_existing",
            ActionType::Pending => "pending",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionType::BuildApp => "Build an app",
            ActionType::UseExisting => "Use existing tool",
            ActionType::Pending => "On hold",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ActionType::BuildApp => "🚀",
            ActionType::UseExisting => "🔧",
            ActionType::Pending => "⏸️",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build_app" => Ok(ActionType::BuildApp),
            "use_existing" => Ok(ActionType::UseExisting),
            "pending" => Ok(ActionType::Pending),
            other => Err(VaultError::validation(
                "action_type",
                format!("unknown action type '{}'", other),
            )),
        }
    }
}

/// A user-authored note record.
///
/// Every idea belongs to exactly one `user_id`; ownership only changes through
/// the bulk reassignment performed when a guest account is promoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    /// Assigned by the remote store on creation
    pub id: Uuid,
    /// Owner of the row
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Idea {
    /// Get the idea ID as a hex string
    pub fn id_hex(&self) -> String {
        self.id.simple().to_string()
    }

    /// Whether any tag equals `tag`, ignoring case
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == tag)
    }
}

/// Fields a user supplies when creating or editing an idea.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdeaInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl IdeaInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action_type(mut self, action_type: ActionType) -> Self {
        self.action_type = action_type;
        self
    }
}

impl From<&Idea> for IdeaInput {
    fn from(idea: &Idea) -> Self {
        Self {
            title: idea.title.clone(),
            content: idea.content.clone(),
            action_type: idea.action_type,
            tags: idea.tags.clone(),
        }
    }
}

/// Metadata attached to a backend user at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
}

impl UserMetadata {
    pub fn guest(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            is_guest: true,
        }
    }
}
