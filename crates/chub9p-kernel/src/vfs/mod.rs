//! Virtual namespace types.
//!
//! - [`VirtualNode`] - Closed set of node kinds (root, category, resource,
//!   field, control)
//! - [`Qid`] - Stable path identity
//! - [`VfsError`] - Symbolic errors returned to the transport
//!
//! ## Design Decisions
//!
//! - **Path-derived identity**: qids hash the normalized path, so they never
//!   depend on fetched content or allocation order.
//! - **Forward-only nodes**: a node knows its own path but not its parent;
//!   there is no `..`.

mod error;
mod node;
mod types;

pub use error::{ErrorCode, VfsError, VfsResult};
pub use node::{FieldFile, VirtualNode};
pub use types::{
    hash_path, join_path, DirEntry, FileType, Qid, QID_CHARACTERS, QID_CTL, QID_LOREBOOKS,
    QID_ROOT, QID_SESSIONS,
};
