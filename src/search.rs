//! Search and ordering over the fetched idea list.
//!
//! Everything here is pure and synchronous: the full idea set is fetched once
//! and every view is a projection of it. Filtering and sorting happen on the
//! client, which caps practical list sizes at what one fetch can return.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use icu_collator::{Collator, CollatorOptions};

use crate::error::VaultError;
use crate::models::{ActionType, Idea};

/// Field the idea list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    ActionType,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::CreatedAt,
        SortField::UpdatedAt,
        SortField::Title,
        SortField::ActionType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Title => "title",
            SortField::ActionType => "action_type",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| VaultError::validation("sort_field", format!("unknown sort field '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(VaultError::validation(
                "sort_order",
                format!("unknown sort order '{}'", other),
            )),
        }
    }
}

/// Everything that shapes the displayed list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdeaQuery {
    /// Free text; empty means no text filter
    pub text: String,
    /// Restrict to one action type; `None` shows all
    pub action_type: Option<ActionType>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
}

impl IdeaQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_field = field;
        self.sort_order = order;
        self
    }

    pub fn with_action_type(mut self, action_type: Option<ActionType>) -> Self {
        self.action_type = action_type;
        self
    }

    /// Apply the action-type filter, then the text filter and sort.
    pub fn apply(&self, ideas: &[Idea]) -> Vec<Idea> {
        match self.action_type {
            Some(action_type) => {
                let subset: Vec<Idea> = ideas
                    .iter()
                    .filter(|i| i.action_type == action_type)
                    .cloned()
                    .collect();
                project(&subset, &self.text, self.sort_field, self.sort_order)
            }
            None => project(ideas, &self.text, self.sort_field, self.sort_order),
        }
    }
}

/// Whether the idea's title, content or any tag contains the already
/// lowercased `needle`.
pub fn matches_query(idea: &Idea, needle: &str) -> bool {
    idea.title.to_lowercase().contains(needle)
        || idea.content.to_lowercase().contains(needle)
        || idea.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Title order: Unicode collation for the root locale, exact text as
/// tie-break so the order is total.
enum TextOrder {
    Collated(Collator),
    Folded,
}

impl TextOrder {
    fn new() -> Self {
        match Collator::try_new(&Default::default(), CollatorOptions::new()) {
            Ok(collator) => TextOrder::Collated(collator),
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    "Collation data unavailable, ordering titles by lowercase text"
                );
                TextOrder::Folded
            }
        }
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        let primary = match self {
            TextOrder::Collated(collator) => collator.compare(a, b),
            TextOrder::Folded => a.to_lowercase().cmp(&b.to_lowercase()),
        };
        primary.then_with(|| a.cmp(b))
    }
}

/// Ascending comparison of two ideas on `field`.
fn compare(a: &Idea, b: &Idea, field: SortField, text: &TextOrder) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Title => text.compare(&a.title, &b.title),
        SortField::ActionType => a.action_type.as_str().cmp(b.action_type.as_str()),
    }
}

/// Filter by `query` and sort by `sort_field` in `sort_order`.
///
/// The sort is stable in both directions: ideas that compare equal keep their
/// input order. Empty `query` keeps every idea.
pub fn project(
    ideas: &[Idea],
    query: &str,
    sort_field: SortField,
    sort_order: SortOrder,
) -> Vec<Idea> {
    let needle = query.to_lowercase();
    let mut result: Vec<Idea> = if needle.is_empty() {
        ideas.to_vec()
    } else {
        ideas
            .iter()
            .filter(|i| matches_query(i, &needle))
            .cloned()
            .collect()
    };

    let text = TextOrder::new();
    match sort_order {
        SortOrder::Asc => result.sort_by(|a, b| compare(a, b, sort_field, &text)),
        SortOrder::Desc => result.sort_by(|a, b| compare(b, a, sort_field, &text)),
    }

    tracing::debug!(
        input = ideas.len(),
        output = result.len(),
        sort_field = %sort_field,
        sort_order = %sort_order,
        "Projected ideas"
    );

    result
}
