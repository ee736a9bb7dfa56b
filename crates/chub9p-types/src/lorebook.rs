//! Lorebooks (world info).

use serde::{Deserialize, Serialize};

/// One lorebook entry, injected into context when a trigger key matches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorebookEntry {
    pub id: String,
    /// Trigger keys.
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub priority: i32,
    /// Insertion depth.
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub enabled: bool,
}

/// A lorebook with its ordered entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lorebook {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub entries: Vec<LorebookEntry>,
    /// When this record was last fetched (Unix millis). Stamped by the cache.
    #[serde(default)]
    pub fetched_at: u64,
}

impl Lorebook {
    /// Create an empty lorebook.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn scalar(&self, field: &str) -> Option<&str> {
        match field {
            "name" => Some(&self.name),
            "description" => Some(&self.description),
            _ => None,
        }
    }
}
