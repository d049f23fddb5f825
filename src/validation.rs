//! Input validation for Spark Vault.
//!
//! `validate` checks a whole idea form and reports the first violated rule per
//! field. The remaining validators cover single inputs and return
//! `VaultError::Validation` on failure. None of them touch the network.

use uuid::Uuid;

use crate::error::{ValidationReport, VaultError, VaultResult};
use crate::models::IdeaInput;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_CONTENT_LENGTH: usize = 5000;
pub const MAX_TAG_LENGTH: usize = 50;
pub const MAX_TAGS: usize = 10;
pub const MAX_SEARCH_QUERY_LENGTH: usize = 500;
pub const MIN_PASSWORD_LENGTH: usize = 12;

const PASSWORD_SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Validate an idea form.
///
/// Rules:
/// - `title` non-empty and at most MAX_TITLE_LENGTH characters
/// - `content` at most MAX_CONTENT_LENGTH characters (may be empty)
/// - each tag non-empty and at most MAX_TAG_LENGTH characters
/// - at most MAX_TAGS tags
pub fn validate(input: &IdeaInput) -> ValidationReport {
    let mut report = ValidationReport::new();

    let title_len = input.title.chars().count();
    if title_len == 0 {
        report.add("title", "title is required");
    } else if title_len > MAX_TITLE_LENGTH {
        report.add(
            "title",
            format!("cannot exceed {} characters (got {})", MAX_TITLE_LENGTH, title_len),
        );
    }

    let content_len = input.content.chars().count();
    if content_len > MAX_CONTENT_LENGTH {
        report.add(
            "content",
            format!(
                "cannot exceed {} characters (got {})",
                MAX_CONTENT_LENGTH, content_len
            ),
        );
    }

    for (i, tag) in input.tags.iter().enumerate() {
        let len = tag.chars().count();
        if len == 0 {
            report.add("tags", format!("item {}: tag cannot be empty", i));
        } else if len > MAX_TAG_LENGTH {
            report.add(
                "tags",
                format!("item {}: tag cannot exceed {} characters", i, MAX_TAG_LENGTH),
            );
        }
    }
    if input.tags.len() > MAX_TAGS {
        report.add(
            "tags",
            format!("at most {} tags allowed (got {})", MAX_TAGS, input.tags.len()),
        );
    }

    report
}

/// Validate an idea form, failing with the first reported field.
pub fn validate_idea_input(input: &IdeaInput) -> VaultResult<()> {
    validate(input).into_result()
}

/// Split comma-separated tag entry into trimmed, non-empty tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Validate and convert an idea ID (hyphenated or simple hex).
pub fn validate_idea_id(value: &str) -> VaultResult<Uuid> {
    let cleaned = value.trim().replace('-', "");
    Uuid::parse_str(&cleaned)
        .map_err(|e| VaultError::validation("idea_id", format!("invalid UUID format: {}", e)))
}

/// Validate a search query. Empty means no text filter.
pub fn validate_search_query(query: &str) -> VaultResult<()> {
    let len = query.chars().count();
    if len > MAX_SEARCH_QUERY_LENGTH {
        return Err(VaultError::validation(
            "search_query",
            format!(
                "cannot exceed {} characters (got {})",
                MAX_SEARCH_QUERY_LENGTH, len
            ),
        ));
    }
    Ok(())
}

/// Basic shape check for an email address before it is sent to the backend.
pub fn validate_email(email: &str) -> VaultResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(VaultError::validation("email", "email is required"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(VaultError::validation("email", "cannot contain whitespace"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            if domain.starts_with('.') || domain.ends_with('.') || domain.contains('@') {
                Err(VaultError::validation("email", "invalid email address"))
            } else {
                Ok(())
            }
        }
        _ => Err(VaultError::validation("email", "invalid email address")),
    }
}

/// Rough strength rating of a password candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

/// Outcome of checking a password against the password policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCheck {
    pub errors: Vec<String>,
    pub strength: PasswordStrength,
}

impl PasswordCheck {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a password against the policy.
///
/// At least MIN_PASSWORD_LENGTH characters, one uppercase letter, one
/// lowercase letter, one digit and one symbol. No failures is strong, one or
/// two is medium, anything more is weak.
pub fn check_password(password: &str) -> PasswordCheck {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("must contain a digit".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        errors.push("must contain a symbol (!@#$%^&* etc.)".to_string());
    }

    let strength = match errors.len() {
        0 => PasswordStrength::Strong,
        1 | 2 => PasswordStrength::Medium,
        _ => PasswordStrength::Weak,
    };

    PasswordCheck { errors, strength }
}

/// Validate a password, failing with the first policy violation.
pub fn validate_password(password: &str) -> VaultResult<()> {
    match check_password(password).errors.into_iter().next() {
        None => Ok(()),
        Some(message) => Err(VaultError::validation("password", message)),
    }
}

/// Validate that the confirmation matches the password.
pub fn validate_password_confirmation(password: &str, confirmation: &str) -> VaultResult<()> {
    if password != confirmation {
        return Err(VaultError::validation(
            "password_confirmation",
            "passwords do not match",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_input() {
        let input = IdeaInput::new("Title", "").with_tags(["a", "b"]);
        assert!(validate(&input).is_valid());
    }

    #[test]
    fn test_validate_empty_title_only_title_error() {
        let input = IdeaInput::new("", "x");
        let report = validate(&input);
        assert!(report.get("title").is_some());
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_validate_title_too_long() {
        let input = IdeaInput::new("t".repeat(MAX_TITLE_LENGTH + 1), "x");
        assert!(validate(&input).get("title").is_some());

        let input = IdeaInput::new("t".repeat(MAX_TITLE_LENGTH), "x");
        assert!(validate(&input).is_valid());
    }

    #[test]
    fn test_validate_counts_characters_not_bytes() {
        let input = IdeaInput::new("ア".repeat(MAX_TITLE_LENGTH), "x");
        assert!(validate(&input).is_valid());
    }

    #[test]
    fn test_validate_content_too_long() {
        let input = IdeaInput::new("T", "c".repeat(MAX_CONTENT_LENGTH + 1));
        let report = validate(&input);
        assert!(report.get("content").is_some());
        assert!(report.get("title").is_none());
    }

    #[test]
    fn test_validate_tag_too_long() {
        let input = IdeaInput::new("T", "x").with_tags(["a".repeat(MAX_TAG_LENGTH + 1)]);
        let report = validate(&input);
        let message = report.get("tags").unwrap();
        assert!(message.contains("cannot exceed"));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_validate_empty_tag() {
        let input = IdeaInput::new("T", "x").with_tags(["ok", ""]);
        assert!(validate(&input).get("tags").unwrap().contains("item 1"));
    }

    #[test]
    fn test_validate_too_many_tags() {
        let tags: Vec<String> = (0..=MAX_TAGS).map(|i| format!("t{}", i)).collect();
        let input = IdeaInput::new("T", "x").with_tags(tags);
        assert!(validate(&input).get("tags").unwrap().contains("at most"));
    }

    #[test]
    fn test_validate_idea_input_error_field() {
        let err = validate_idea_input(&IdeaInput::new("", "")).unwrap_err();
        assert!(matches!(err, VaultError::Validation { ref field, .. } if field == "title"));
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_tags("  , ,").is_empty());
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_validate_idea_id() {
        let id = Uuid::now_v7();
        assert_eq!(validate_idea_id(&id.to_string()).unwrap(), id);
        assert_eq!(validate_idea_id(&id.simple().to_string()).unwrap(), id);
        assert!(validate_idea_id("nope").is_err());
    }

    #[test]
    fn test_validate_search_query() {
        assert!(validate_search_query("").is_ok());
        assert!(validate_search_query(&"q".repeat(MAX_SEARCH_QUERY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("x@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_check_password_strong() {
        let check = check_password("Correct-Horse-9");
        assert!(check.is_valid());
        assert_eq!(check.strength, PasswordStrength::Strong);
    }

    #[test]
    fn test_check_password_medium() {
        // too short and no symbol
        let check = check_password("Short1a");
        assert_eq!(check.errors.len(), 2);
        assert_eq!(check.strength, PasswordStrength::Medium);
    }

    #[test]
    fn test_check_password_weak() {
        let check = check_password("abc");
        assert_eq!(check.strength, PasswordStrength::Weak);
        assert!(validate_password("abc").is_err());
    }

    #[test]
    fn test_password_confirmation() {
        assert!(validate_password_confirmation("a", "a").is_ok());
        assert!(validate_password_confirmation("a", "b").is_err());
    }
}
