//! Text renderers for the projected idea list.
//!
//! All view modes consume the same projection produced by
//! [`IdeaQuery::apply`](crate::search::IdeaQuery::apply); a renderer only
//! decides layout and never filters or reorders.

use std::fmt;
use std::str::FromStr;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use crate::error::VaultError;
use crate::models::Idea;
use crate::search::IdeaQuery;

pub const EMPTY_MESSAGE: &str = "No ideas yet. Capture your first spark!";
pub const NO_MATCHES_MESSAGE: &str = "No ideas match your search.";

const CARD_WIDTH: usize = 38;
const GRID_GAP: &str = "  ";
const LIST_PREVIEW_CHARS: usize = 120;
const COMPACT_TITLE_CHARS: usize = 40;
const TABLE_PREVIEW_CHARS: usize = 60;
const TABLE_MAX_TAGS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
    Compact,
    Table,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Grid,
        ViewMode::List,
        ViewMode::Compact,
        ViewMode::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Grid => "grid",
            ViewMode::List => "list",
            ViewMode::Compact => "compact",
            ViewMode::Table => "table",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Grid => "Grid",
            ViewMode::List => "List",
            ViewMode::Compact => "Compact",
            ViewMode::Table => "Table",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ViewMode::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| VaultError::validation("view_mode", format!("unknown view mode '{}'", s)))
    }
}

/// Lays out an already projected list of ideas.
pub trait IdeaRenderer {
    fn mode(&self) -> ViewMode;

    /// Render `ideas` in the given order. Called only with a non-empty slice.
    fn render(&self, ideas: &[Idea]) -> String;
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

/// Collapse newlines and runs of whitespace into single spaces.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tag_line(tags: &[String]) -> String {
    tags.iter()
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        text.to_string()
    } else {
        format!("{}{}", text, " ".repeat(width - len))
    }
}

pub struct GridRenderer;

impl GridRenderer {
    fn card(idea: &Idea) -> Vec<String> {
        let inner = CARD_WIDTH - 4;
        let mut body = vec![
            truncate_chars(&format!("{} {}", idea.action_type.icon(), idea.title), inner),
            truncate_chars(&single_line(&idea.content), inner),
        ];
        if !idea.tags.is_empty() {
            body.push(truncate_chars(&tag_line(&idea.tags), inner));
        }
        body.push(idea.created_at.format("%Y-%m-%d").to_string());

        let border = format!("+{}+", "-".repeat(CARD_WIDTH - 2));
        let mut lines = Vec::with_capacity(body.len() + 2);
        lines.push(border.clone());
        for line in body {
            lines.push(format!("| {} |", pad(&line, inner)));
        }
        lines.push(border);
        lines
    }
}

impl IdeaRenderer for GridRenderer {
    fn mode(&self) -> ViewMode {
        ViewMode::Grid
    }

    fn render(&self, ideas: &[Idea]) -> String {
        let mut out = Vec::new();
        for pair in ideas.chunks(2) {
            let left = Self::card(&pair[0]);
            let right = pair.get(1).map(Self::card).unwrap_or_default();
            let height = left.len().max(right.len());
            for row in 0..height {
                let l = left.get(row).map(String::as_str).unwrap_or("");
                match right.get(row) {
                    Some(r) => out.push(format!("{}{}{}", pad(l, CARD_WIDTH), GRID_GAP, r)),
                    None => out.push(l.trim_end().to_string()),
                }
            }
        }
        out.join("\n")
    }
}

pub struct ListRenderer;

impl IdeaRenderer for ListRenderer {
    fn mode(&self) -> ViewMode {
        ViewMode::List
    }

    fn render(&self, ideas: &[Idea]) -> String {
        let mut blocks = Vec::with_capacity(ideas.len());
        for idea in ideas {
            let mut block = format!(
                "{} {}  [{}]  {}",
                idea.action_type.icon(),
                idea.title,
                idea.action_type.label(),
                idea.created_at.format("%Y-%m-%d %H:%M")
            );
            if !idea.content.is_empty() {
                block.push_str("\n    ");
                block.push_str(&truncate_chars(&single_line(&idea.content), LIST_PREVIEW_CHARS));
            }
            if !idea.tags.is_empty() {
                block.push_str("\n    ");
                block.push_str(&tag_line(&idea.tags));
            }
            blocks.push(block);
        }
        blocks.join("\n\n")
    }
}

pub struct CompactRenderer;

impl IdeaRenderer for CompactRenderer {
    fn mode(&self) -> ViewMode {
        ViewMode::Compact
    }

    fn render(&self, ideas: &[Idea]) -> String {
        ideas
            .iter()
            .map(|idea| {
                format!(
                    "{} {} {}",
                    idea.action_type.icon(),
                    pad(&truncate_chars(&idea.title, COMPACT_TITLE_CHARS), COMPACT_TITLE_CHARS),
                    idea.created_at.format("%Y-%m-%d")
                )
                .trim_end()
                .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct TableRenderer;

impl TableRenderer {
    fn tags_cell(tags: &[String]) -> String {
        let mut shown: Vec<String> = tags.iter().take(TABLE_MAX_TAGS).cloned().collect();
        if tags.len() > TABLE_MAX_TAGS {
            shown.push(format!("+{}", tags.len() - TABLE_MAX_TAGS));
        }
        shown.join(", ")
    }
}

impl IdeaRenderer for TableRenderer {
    fn mode(&self) -> ViewMode {
        ViewMode::Table
    }

    fn render(&self, ideas: &[Idea]) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(120);
        table.set_header(vec!["Idea", "Action", "Tags", "Created"]);

        for idea in ideas {
            let preview = truncate_chars(&single_line(&idea.content), TABLE_PREVIEW_CHARS);
            let idea_cell = if preview.is_empty() {
                idea.title.clone()
            } else {
                format!("{}\n{}", idea.title, preview)
            };
            table.add_row(vec![
                Cell::new(idea_cell).add_attribute(Attribute::Bold),
                Cell::new(format!("{} {}", idea.action_type.icon(), idea.action_type.label())),
                Cell::new(Self::tags_cell(&idea.tags)),
                Cell::new(idea.created_at.format("%Y-%m-%d")),
            ]);
        }
        table.to_string()
    }
}

pub fn renderer_for(mode: ViewMode) -> Box<dyn IdeaRenderer> {
    match mode {
        ViewMode::Grid => Box::new(GridRenderer),
        ViewMode::List => Box::new(ListRenderer),
        ViewMode::Compact => Box::new(CompactRenderer),
        ViewMode::Table => Box::new(TableRenderer),
    }
}

/// Project `ideas` through `query` and render the result in `mode`.
pub fn render_view(ideas: &[Idea], query: &IdeaQuery, mode: ViewMode) -> String {
    if ideas.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    let projected = query.apply(ideas);
    if projected.is_empty() {
        return NO_MATCHES_MESSAGE.to_string();
    }
    renderer_for(mode).render(&projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionType;
    use crate::search::{SortField, SortOrder};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn idea(title: &str, tags: &[&str], minutes: i64) -> Idea {
        let created = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap() + Duration::minutes(minutes);
        Idea {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: title.to_string(),
            content: format!("Details about {}\nsecond line", title),
            action_type: ActionType::BuildApp,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: created,
            updated_at: created,
        }
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack.find(needle).unwrap()
    }

    #[test]
    fn test_view_mode_parse() {
        assert_eq!("Table".parse::<ViewMode>().unwrap(), ViewMode::Table);
        assert!("carousel".parse::<ViewMode>().is_err());
        for mode in ViewMode::ALL {
            assert_eq!(mode.as_str().parse::<ViewMode>().unwrap(), mode);
            assert_eq!(renderer_for(mode).mode(), mode);
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_chars("ééééé", 5), "ééééé");
    }

    #[test]
    fn test_empty_and_no_match_messages() {
        let query = IdeaQuery::default();
        assert_eq!(render_view(&[], &query, ViewMode::Grid), EMPTY_MESSAGE);

        let ideas = vec![idea("Alpha", &[], 0)];
        let query = IdeaQuery::new("zzz");
        assert_eq!(render_view(&ideas, &query, ViewMode::List), NO_MATCHES_MESSAGE);
    }

    #[test]
    fn test_all_modes_show_same_order() {
        let ideas = vec![idea("Alpha", &[], 0), idea("Bravo", &[], 1), idea("Charlie", &[], 2)];
        let query = IdeaQuery::default().sorted_by(SortField::CreatedAt, SortOrder::Desc);

        for mode in ViewMode::ALL {
            let out = render_view(&ideas, &query, mode);
            let c = position(&out, "Charlie");
            let b = position(&out, "Bravo");
            let a = position(&out, "Alpha");
            assert!(c < b && b < a, "mode {} out of order:\n{}", mode, out);
        }
    }

    #[test]
    fn test_filtered_ideas_not_rendered() {
        let ideas = vec![idea("Alpha", &["work"], 0), idea("Bravo", &["home"], 1)];
        let query = IdeaQuery::new("HOME");
        for mode in ViewMode::ALL {
            let out = render_view(&ideas, &query, mode);
            assert!(out.contains("Bravo"));
            assert!(!out.contains("Alpha"));
        }
    }

    #[test]
    fn test_table_limits_tags() {
        let ideas = vec![idea("Tagged", &["a1", "b2", "c3", "d4", "e5"], 0)];
        let out = TableRenderer.render(&ideas);
        assert!(out.contains("a1, b2, c3, +2"));
        assert!(!out.contains("d4"));
    }

    #[test]
    fn test_compact_is_one_line_per_idea() {
        let ideas = vec![idea("Alpha", &["x"], 0), idea("Bravo", &[], 1)];
        let out = CompactRenderer.render(&ideas);
        assert_eq!(out.lines().count(), 2);
        assert!(!out.contains("Details"));
    }

    #[test]
    fn test_grid_places_two_cards_per_row() {
        let ideas = vec![idea("Alpha", &[], 0), idea("Bravo", &[], 1), idea("Charlie", &[], 2)];
        let out = GridRenderer.render(&ideas);
        let first_row = out.lines().nth(1).unwrap();
        assert!(first_row.contains("Alpha") && first_row.contains("Bravo"));
        assert!(!first_row.contains("Charlie"));
    }

    #[test]
    fn test_list_shows_tags_and_preview() {
        let ideas = vec![idea("Alpha", &["work", "later"], 0)];
        let out = ListRenderer.render(&ideas);
        assert!(out.contains("#work #later"));
        assert!(out.contains("Details about Alpha second line"));
    }
}
