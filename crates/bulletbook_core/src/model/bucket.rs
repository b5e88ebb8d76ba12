//! Bucket partitions of a context's store.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Named partition of one context's store.
///
/// The bullet schema is the same in every bucket; only membership and the
/// bucket-scoped `id` differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Active items.
    Desk,
    /// Completed or removed items kept as history.
    Archive,
    /// Trash.
    Bin,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Desk, Bucket::Archive, Bucket::Bin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desk => "desk",
            Self::Archive => "archive",
            Self::Bin => "bin",
        }
    }

    /// Parses a stored bucket name. `index` is the legacy name of the desk.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desk" | "index" => Some(Self::Desk),
            "archive" => Some(Self::Archive),
            "bin" | "trash" => Some(Self::Bin),
            _ => None,
        }
    }
}

impl Display for Bucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
