//! Core VFS types: file types, qids, and directory entries.

use serde::{Deserialize, Serialize};

/// Reserved qid path of `/`.
pub const QID_ROOT: u64 = 0;
/// Reserved qid path of `/characters`.
pub const QID_CHARACTERS: u64 = 1;
/// Reserved qid path of `/lorebooks`.
pub const QID_LOREBOOKS: u64 = 2;
/// Reserved qid path of `/sessions`.
pub const QID_SESSIONS: u64 = 3;
/// Reserved qid path of `/ctl`.
pub const QID_CTL: u64 = 4;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Path identity.
///
/// Derived only from the normalized path string, never from content, so the
/// same path always yields the same qid within and across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qid {
    pub kind: FileType,
    pub path: u64,
}

impl Qid {
    /// Identity of an absolute, normalized path (`/`, `/characters/abc123`, ...).
    pub fn for_path(path: &str, kind: FileType) -> Self {
        let path_id = match path {
            "/" => QID_ROOT,
            "/characters" => QID_CHARACTERS,
            "/lorebooks" => QID_LOREBOOKS,
            "/sessions" => QID_SESSIONS,
            "/ctl" => QID_CTL,
            other => hash_path(other),
        };
        Self { kind, path: path_id }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// djb2 over the path bytes: `h = 5381; h = h * 33 + byte`, wrapping.
pub fn hash_path(path: &str) -> u64 {
    path.bytes().fold(5381u64, |h, b| {
        (h << 5).wrapping_add(h).wrapping_add(u64::from(b))
    })
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
    /// Identity of the entry's full path.
    pub qid: Qid,
}

impl DirEntry {
    /// Create an entry for `name` inside the directory at `parent`.
    pub fn new(parent: &str, name: impl Into<String>, kind: FileType) -> Self {
        let name = name.into();
        let path = join_path(parent, &name);
        Self {
            qid: Qid::for_path(&path, kind),
            name,
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(parent: &str, name: impl Into<String>) -> Self {
        Self::new(parent, name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(parent: &str, name: impl Into<String>) -> Self {
        Self::new(parent, name, FileType::Directory)
    }
}

/// Join a child name onto an absolute directory path.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}
