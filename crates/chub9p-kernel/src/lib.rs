//! # chub9p-kernel
//!
//! Core of the chub9p gateway: a virtual namespace over the remote content
//! API, served through 9P-style handle operations.
//!
//! The gateway:
//! - Owns a [`ResourceCache`] shared by every connection
//! - Fills the cache through a [`ResourceFetcher`] (HTTP or in-memory)
//! - Resolves path segments into [`VirtualNode`]s with stable [`Qid`]s
//! - Hands each connection a [`Session`] holding its fid table
//! - Exposes a `/ctl` control file for cache maintenance

pub mod cache;
pub mod control;
pub mod fetch;
pub mod gateway;
pub mod resolver;
pub mod session;
pub mod vfs;

pub use cache::{CacheHit, CacheStats, ResourceCache};
pub use control::ControlCommand;
pub use fetch::{FetchError, FetchResult, HttpFetcher, MemoryFetcher, ResourceFetcher};
pub use gateway::{Gateway, GatewayConfig};
pub use resolver::{Resolver, WalkOutcome};
pub use session::{Fid, NodeStat, Session};
pub use vfs::{DirEntry, ErrorCode, FieldFile, FileType, Qid, VfsError, VfsResult, VirtualNode};
