//! Resource kinds and their per-kind field tables.

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Top-level entries of the namespace root, in listing order.
///
/// `config` and `models` are informational: they appear in the listing but
/// cannot be walked into.
pub const ROOT_ENTRIES: &[&str] = &["characters", "lorebooks", "sessions", "ctl", "config", "models"];

const CHARACTER_FIELDS: &[&str] = &[
    "meta",
    "name",
    "description",
    "personality",
    "scenario",
    "first_mes",
    "avatar",
    "lorebook",
];

const LOREBOOK_FIELDS: &[&str] = &["meta", "name", "description", "entries"];

const SESSION_FIELDS: &[&str] = &["meta", "character", "messages", "created", "updated"];

/// Kind of remote resource.
///
/// Determines the category directory a resource lives under and which field
/// files its resource directory exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ResourceKind {
    /// Character card.
    #[strum(serialize = "characters", serialize = "character")]
    Character,
    /// Lorebook (world info).
    #[strum(serialize = "lorebooks", serialize = "lorebook")]
    Lorebook,
    /// Chat session.
    #[strum(serialize = "sessions", serialize = "session", serialize = "chats", serialize = "chat")]
    Session,
}

impl ResourceKind {
    /// Every kind, in root listing order.
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Character,
        ResourceKind::Lorebook,
        ResourceKind::Session,
    ];

    /// Category directory name under the namespace root.
    pub fn category(self) -> &'static str {
        match self {
            ResourceKind::Character => "characters",
            ResourceKind::Lorebook => "lorebooks",
            ResourceKind::Session => "sessions",
        }
    }

    /// Exact category-name lookup, as used when walking from the root.
    ///
    /// Unlike `FromStr`, this accepts only the canonical directory names.
    pub fn from_category(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.category() == name)
    }

    /// Path segment used by the remote content API for this kind.
    pub fn api_segment(self) -> &'static str {
        match self {
            ResourceKind::Character => "characters",
            ResourceKind::Lorebook => "lorebooks",
            ResourceKind::Session => "chats",
        }
    }

    /// Field names exposed inside a resource directory, in listing order.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Character => CHARACTER_FIELDS,
            ResourceKind::Lorebook => LOREBOOK_FIELDS,
            ResourceKind::Session => SESSION_FIELDS,
        }
    }

    /// Look up a field name, returning the table's `'static` copy.
    pub fn field(self, name: &str) -> Option<&'static str> {
        self.fields().iter().copied().find(|f| *f == name)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_category_is_exact() {
        assert_eq!(ResourceKind::from_category("characters"), Some(ResourceKind::Character));
        assert_eq!(ResourceKind::from_category("sessions"), Some(ResourceKind::Session));
        assert_eq!(ResourceKind::from_category("character"), None);
        assert_eq!(ResourceKind::from_category("Characters"), None);
        assert_eq!(ResourceKind::from_category("ctl"), None);
    }

    #[test]
    fn test_from_str_accepts_aliases() {
        assert_eq!("character".parse::<ResourceKind>().unwrap(), ResourceKind::Character);
        assert_eq!("LOREBOOKS".parse::<ResourceKind>().unwrap(), ResourceKind::Lorebook);
        assert_eq!("chat".parse::<ResourceKind>().unwrap(), ResourceKind::Session);
        assert!("models".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_character_field_table() {
        assert_eq!(
            ResourceKind::Character.fields(),
            &["meta", "name", "description", "personality", "scenario", "first_mes", "avatar", "lorebook"]
        );
        assert_eq!(ResourceKind::Character.field("first_mes"), Some("first_mes"));
        assert_eq!(ResourceKind::Character.field("entries"), None);
    }

    #[test]
    fn test_api_segment() {
        assert_eq!(ResourceKind::Session.api_segment(), "chats");
        assert_eq!(ResourceKind::Session.category(), "sessions");
        assert_eq!(ResourceKind::Lorebook.to_string(), "lorebooks");
    }
}
