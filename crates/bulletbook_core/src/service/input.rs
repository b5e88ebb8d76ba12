//! Command-word parsing shared by desk use-cases.
//!
//! Words are split on whitespace, so callers may pass argv-style lists or
//! whole sentences.

use crate::catalog::{CatalogError, CatalogResult};
use crate::config::board_label;
use crate::model::bullet::Priority;

/// Description plus the options embedded in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub description: String,
    pub boards: Vec<String>,
    pub tags: Vec<String>,
    pub priority: Priority,
}

/// Extracts `p:1..3`, `@board` and `+tag` options from `words`.
///
/// The first priority option wins. Items without a board land on
/// `default_board`. Empty descriptions are rejected.
pub fn parse_input<T: AsRef<str>>(words: &[T], default_board: &str) -> CatalogResult<ParsedInput> {
    let mut description: Vec<&str> = Vec::new();
    let mut boards: Vec<String> = Vec::new();
    let mut tags: Vec<String> = Vec::new();
    let mut priority: Option<Priority> = None;

    for word in words.iter().flat_map(|word| word.as_ref().split_whitespace()) {
        if let Some(level) = parse_priority(word) {
            priority.get_or_insert(level);
        } else if is_board_option(word) {
            push_unique(&mut boards, word);
        } else if is_tag_option(word) {
            push_unique(&mut tags, word);
        } else {
            description.push(word);
        }
    }

    if description.is_empty() {
        return Err(CatalogError::MissingDescription);
    }
    if boards.is_empty() {
        boards.push(board_label(default_board));
    }

    Ok(ParsedInput {
        description: description.join(" "),
        boards,
        tags,
        priority: priority.unwrap_or_default(),
    })
}

pub fn is_board_option(word: &str) -> bool {
    word.len() > 1 && word.starts_with('@')
}

pub fn is_tag_option(word: &str) -> bool {
    word.len() > 1 && word.starts_with('+')
}

/// Normalizes a tag to its `+`-prefixed form.
pub fn tag_label(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('+') {
        name.to_string()
    } else {
        format!("+{name}")
    }
}

fn parse_priority(word: &str) -> Option<Priority> {
    let level = word.strip_prefix("p:")?.parse::<u8>().ok()?;
    Priority::try_from(level).ok()
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}
