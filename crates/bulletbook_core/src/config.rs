//! Core configuration value.
//!
//! # Responsibility
//! - Carry the settings core behavior depends on, with defaults.
//!
//! # Invariants
//! - Built once by the caller and passed by reference; core never reads
//!   configuration from ambient state.
//! - Missing fields fall back to [`CoreConfig::default`].

use serde::{Deserialize, Serialize};

/// Behavior of a batch transfer after one item fails to move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPolicy {
    /// Keep moving the remaining items and report every failure.
    #[default]
    Continue,
    /// Stop at the first failure; items already moved stay moved.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Board assigned to items created without one.
    pub default_board: String,
    pub default_context: String,
    /// Durations above this many hours are reported as suspicious on check.
    pub suspicious_duration_hours: u32,
    pub highlight_tags: Vec<String>,
    /// Editor command used by comment editing front-ends.
    pub editor: String,
    pub event_board: String,
    pub goal_board: String,
    pub transfer_policy: TransferPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_board: "backlog".to_string(),
            default_context: "default".to_string(),
            suspicious_duration_hours: 3,
            highlight_tags: Vec::new(),
            editor: "vi".to_string(),
            event_board: "calendar".to_string(),
            goal_board: "goals".to_string(),
            transfer_policy: TransferPolicy::Continue,
        }
    }
}

impl CoreConfig {
    /// Parses a JSON configuration document; absent keys take defaults.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    pub fn default_board_label(&self) -> String {
        board_label(&self.default_board)
    }

    pub fn event_board_label(&self) -> String {
        board_label(&self.event_board)
    }

    pub fn goal_board_label(&self) -> String {
        board_label(&self.goal_board)
    }

    /// Threshold in milliseconds.
    pub fn suspicious_duration_ms(&self) -> i64 {
        i64::from(self.suspicious_duration_hours) * 60 * 60 * 1000
    }
}

/// Normalizes a board name to its `@`-prefixed label.
pub fn board_label(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('@') {
        name.to_string()
    } else {
        format!("@{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            CoreConfig::from_json_str(r#"{"defaultBoard": "inbox", "transferPolicy": "stop"}"#)
                .unwrap();
        assert_eq!(config.default_board_label(), "@inbox");
        assert_eq!(config.transfer_policy, TransferPolicy::Stop);
        assert_eq!(config.suspicious_duration_hours, 3);
        assert_eq!(config.goal_board, "goals");
    }

    #[test]
    fn board_label_is_idempotent() {
        assert_eq!(board_label("@work"), "@work");
        assert_eq!(board_label(" work "), "@work");
    }
}
