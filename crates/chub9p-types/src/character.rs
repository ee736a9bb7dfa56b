//! Character cards.

use serde::{Deserialize, Serialize};

/// A character card as returned by the remote content API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    /// Opening message the character greets with.
    #[serde(default)]
    pub first_mes: String,
    #[serde(default)]
    pub avatar_url: String,
    /// Linked lorebook id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lorebook_id: Option<String>,
    /// When this record was last fetched (Unix millis). Stamped by the cache.
    #[serde(default)]
    pub fetched_at: u64,
}

impl Character {
    /// Create a character with just an id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Scalar value behind a field file, or `None` for non-scalar fields.
    pub(crate) fn scalar(&self, field: &str) -> Option<&str> {
        let value = match field {
            "name" => &self.name,
            "description" => &self.description,
            "personality" => &self.personality,
            "scenario" => &self.scenario,
            "first_mes" => &self.first_mes,
            "avatar" => &self.avatar_url,
            "lorebook" => return Some(self.lorebook_id.as_deref().unwrap_or("")),
            _ => return None,
        };
        Some(value)
    }
}
