//! Chat sessions.
//!
//! A `Session` here is a remote chat transcript, not a protocol connection.

use serde::{Deserialize, Serialize};

/// One chat message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker role (`user`, `assistant`, `system`, ...).
    pub role: String,
    #[serde(default)]
    pub content: String,
    /// Unix millis.
    #[serde(default)]
    pub time: u64,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            time: 0,
        }
    }
}

/// A chat session and its ordered messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Character the chat is held with.
    #[serde(default)]
    pub character_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Unix millis.
    #[serde(default)]
    pub created_at: u64,
    /// Unix millis.
    #[serde(default)]
    pub updated_at: u64,
    /// When this record was last fetched (Unix millis). Stamped by the cache.
    #[serde(default)]
    pub fetched_at: u64,
}

impl Session {
    pub fn new(id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            character_id: character_id.into(),
            ..Default::default()
        }
    }

    /// Render the transcript, one `role: content` line per message.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for msg in &self.messages {
            out.push_str(&msg.role);
            out.push_str(": ");
            out.push_str(&msg.content);
            out.push('\n');
        }
        out
    }
}
