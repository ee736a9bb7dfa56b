//! VFS error types.

use std::io;
use thiserror::Error;

use chub9p_types::RenderError;

/// Symbolic error code handed back to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    PermissionDenied,
    NotADirectory,
    IoError,
    Unauthenticated,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Bad path segment, unknown field, or unresolvable resource id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write on a read-only node.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Walk past a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Render failure, or fetch failure with nothing cached to fall back on.
    #[error("I/O error: {0}")]
    Io(String),

    /// Attach carried an auth fid; this gateway performs no authentication.
    #[error("authentication not required")]
    AuthNotRequired,

    /// Fid is not bound on this connection.
    #[error("unknown fid: {0}")]
    UnknownFid(u32),

    /// Fid is already bound on this connection.
    #[error("fid already in use: {0}")]
    FidInUse(u32),

    /// Malformed write to the control file.
    #[error("bad control message: {0}")]
    InvalidControl(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an InvalidControl error.
    pub fn invalid_control(msg: impl Into<String>) -> Self {
        Self::InvalidControl(msg.into())
    }

    /// Symbolic code for the transport.
    pub fn code(&self) -> ErrorCode {
        match self {
            VfsError::NotFound(_) => ErrorCode::NotFound,
            VfsError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            VfsError::NotADirectory(_) => ErrorCode::NotADirectory,
            VfsError::AuthNotRequired => ErrorCode::Unauthenticated,
            VfsError::Io(_)
            | VfsError::UnknownFid(_)
            | VfsError::FidInUse(_)
            | VfsError::InvalidControl(_) => ErrorCode::IoError,
        }
    }

    /// Plan 9 error string sent in Rerror.
    pub fn ename(&self) -> &'static str {
        match self {
            VfsError::NotFound(_) => "file does not exist",
            VfsError::PermissionDenied(_) => "permission denied",
            VfsError::NotADirectory(_) => "not a directory",
            VfsError::Io(_) => "i/o error",
            VfsError::AuthNotRequired => "authentication not required",
            VfsError::UnknownFid(_) => "unknown fid",
            VfsError::FidInUse(_) => "fid already in use",
            VfsError::InvalidControl(_) => "bad control message",
        }
    }
}

impl From<RenderError> for VfsError {
    fn from(e: RenderError) -> Self {
        VfsError::Io(e.to_string())
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::AuthNotRequired => {
                io::Error::new(io::ErrorKind::Unsupported, "authentication not required")
            }
            VfsError::InvalidControl(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
