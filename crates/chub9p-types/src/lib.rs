//! Shared resource types for chub9p.
//!
//! This crate is the data foundation: the resource kinds the gateway exposes,
//! the records fetched from the remote content API, and the per-kind field
//! tables that decide which files appear inside a resource directory. It has
//! **no internal chub9p dependencies**.
//!
//! # Namespace Overview
//!
//! ```text
//! /
//! ├── characters/<id>/{meta,name,description,personality,scenario,first_mes,avatar,lorebook}
//! ├── lorebooks/<id>/{meta,name,description,entries}
//! ├── sessions/<id>/{meta,character,messages,created,updated}
//! ├── ctl
//! ├── config   (listed only)
//! └── models   (listed only)
//! ```
//!
//! # Key Types
//!
//! |--------------------|---------------------------------------------|
//! | Type               | Purpose                                     |
//! |--------------------|---------------------------------------------|
//! | [`ResourceKind`]   | Which category a resource lives under       |
//! | [`ResourceRecord`] | Fetched payload (character/lorebook/chat)   |
//! | [`Character`]      | Character card                              |
//! | [`Lorebook`]       | Lorebook with ordered entries               |
//! | [`Session`]        | Chat session with ordered messages          |
//! | [`RenderError`]    | Field rendering failure                     |
//! |--------------------|---------------------------------------------|

pub mod character;
pub mod kind;
pub mod lorebook;
pub mod record;
pub mod session;

pub use character::Character;
pub use kind::{ROOT_ENTRIES, ResourceKind};
pub use lorebook::{Lorebook, LorebookEntry};
pub use record::{RenderError, ResourceRecord};
pub use session::{Message, Session};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
