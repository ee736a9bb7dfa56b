//! Fetched resource payloads and field rendering.

use thiserror::Error;

use crate::{Character, Lorebook, ResourceKind, Session};

/// Failure to render a field file.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Field is not in the kind's field table.
    #[error("no field {field} on {kind}")]
    UnknownField { kind: ResourceKind, field: String },

    /// Structured rendering failed.
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A resource fetched from the remote content API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceRecord {
    Character(Character),
    Lorebook(Lorebook),
    Session(Session),
}

impl ResourceRecord {
    /// Decode an API response body for the given kind.
    pub fn from_json(kind: ResourceKind, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ResourceKind::Character => Self::Character(serde_json::from_slice(body)?),
            ResourceKind::Lorebook => Self::Lorebook(serde_json::from_slice(body)?),
            ResourceKind::Session => Self::Session(serde_json::from_slice(body)?),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Character(_) => ResourceKind::Character,
            Self::Lorebook(_) => ResourceKind::Lorebook,
            Self::Session(_) => ResourceKind::Session,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Character(c) => &c.id,
            Self::Lorebook(l) => &l.id,
            Self::Session(s) => &s.id,
        }
    }

    pub fn fetched_at(&self) -> u64 {
        match self {
            Self::Character(c) => c.fetched_at,
            Self::Lorebook(l) => l.fetched_at,
            Self::Session(s) => s.fetched_at,
        }
    }

    /// Stamp the last-fetch time (Unix millis).
    pub fn set_fetched_at(&mut self, millis: u64) {
        match self {
            Self::Character(c) => c.fetched_at = millis,
            Self::Lorebook(l) => l.fetched_at = millis,
            Self::Session(s) => s.fetched_at = millis,
        }
    }

    /// The full record as indented JSON (the `meta` file).
    pub fn meta(&self) -> Result<Vec<u8>, RenderError> {
        let bytes = match self {
            Self::Character(c) => serde_json::to_vec_pretty(c)?,
            Self::Lorebook(l) => serde_json::to_vec_pretty(l)?,
            Self::Session(s) => serde_json::to_vec_pretty(s)?,
        };
        Ok(bytes)
    }

    /// Render one field file's content.
    ///
    /// `meta` is the structured form; every other field is its value
    /// followed by a newline.
    pub fn render(&self, field: &str) -> Result<Vec<u8>, RenderError> {
        if field == "meta" {
            return self.meta();
        }

        let text = match self {
            Self::Character(c) => c.scalar(field).map(str::to_owned),
            Self::Lorebook(l) => match field {
                "entries" => Some(serde_json::to_string_pretty(&l.entries)?),
                _ => l.scalar(field).map(str::to_owned),
            },
            Self::Session(s) => match field {
                "character" => Some(s.character_id.clone()),
                "created" => Some(s.created_at.to_string()),
                "updated" => Some(s.updated_at.to_string()),
                // Transcript lines already end in newlines.
                "messages" => return Ok(s.transcript().into_bytes()),
                _ => None,
            },
        };

        match text {
            Some(mut text) => {
                text.push('\n');
                Ok(text.into_bytes())
            }
            None => Err(RenderError::UnknownField {
                kind: self.kind(),
                field: field.to_string(),
            }),
        }
    }
}

impl From<Character> for ResourceRecord {
    fn from(c: Character) -> Self {
        Self::Character(c)
    }
}

impl From<Lorebook> for ResourceRecord {
    fn from(l: Lorebook) -> Self {
        Self::Lorebook(l)
    }
}

impl From<Session> for ResourceRecord {
    fn from(s: Session) -> Self {
        Self::Session(s)
    }
}
