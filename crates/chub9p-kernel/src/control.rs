//! The `/ctl` control file.
//!
//! Reading `/ctl` yields cache status, one `key value` pair per line.
//! Writing accepts one command per write:
//!
//! ```text
//! flush
//! evict characters abc123
//! refresh lorebooks lb1
//! ```

use std::fmt;
use std::str::FromStr;

use chub9p_types::ResourceKind;

use crate::cache::CacheStats;
use crate::vfs::VfsError;

/// A parsed control-file command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Drop every cache entry.
    Flush,
    /// Drop one cache entry.
    Evict { kind: ResourceKind, id: String },
    /// Re-fetch one resource regardless of freshness.
    Refresh { kind: ResourceKind, id: String },
}

impl FromStr for ControlCommand {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        match words.as_slice() {
            ["flush"] => Ok(ControlCommand::Flush),
            ["evict", category, id] => Ok(ControlCommand::Evict {
                kind: parse_kind(category)?,
                id: (*id).to_string(),
            }),
            ["refresh", category, id] => Ok(ControlCommand::Refresh {
                kind: parse_kind(category)?,
                id: (*id).to_string(),
            }),
            [] => Err(VfsError::invalid_control("empty command")),
            [cmd, ..] => Err(VfsError::invalid_control(format!(
                "{cmd}: expected `flush`, `evict <category> <id>` or `refresh <category> <id>`"
            ))),
        }
    }
}

impl ControlCommand {
    /// Parse a raw write payload.
    pub fn parse(data: &[u8]) -> Result<Self, VfsError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| VfsError::invalid_control("not utf-8"))?;
        text.parse()
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Flush => write!(f, "flush"),
            ControlCommand::Evict { kind, id } => write!(f, "evict {} {}", kind.category(), id),
            ControlCommand::Refresh { kind, id } => {
                write!(f, "refresh {} {}", kind.category(), id)
            }
        }
    }
}

fn parse_kind(category: &str) -> Result<ResourceKind, VfsError> {
    category
        .parse()
        .map_err(|_| VfsError::invalid_control(format!("unknown category: {category}")))
}

/// Status text served when `/ctl` is read.
pub fn render_status(stats: &CacheStats) -> Vec<u8> {
    format!(
        "ttl_secs {}\ncharacters {}\nlorebooks {}\nsessions {}\n",
        stats.ttl.as_secs(),
        stats.characters,
        stats.lorebooks,
        stats.sessions,
    )
    .into_bytes()
}
