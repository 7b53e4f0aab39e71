//! Error and violation types for the path gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use super::roots::SandboxRootSet;

pub type Result<T, E = SandboxError> = std::result::Result<T, E>;

/// The only domain failure the gate raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    #[serde(rename = "OUTSIDE_SANDBOX")]
    OutsideSandbox,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::OutsideSandbox => "OUTSIDE_SANDBOX",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A path that resolved outside every configured sandbox root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// The resolved (not the caller-supplied) path.
    pub path: PathBuf,
    /// Every root that was checked.
    pub roots: Vec<PathBuf>,
    pub message: String,
}

impl Violation {
    pub fn outside_sandbox(path: &Path, roots: &SandboxRootSet) -> Self {
        Self {
            kind: ViolationKind::OutsideSandbox,
            path: path.to_path_buf(),
            roots: roots.iter().map(Path::to_path_buf).collect(),
            message: format!(
                "{} is outside the sandbox directories ({})",
                path.display(),
                roots.display_joined()
            ),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("{0}")]
    OutsideSandbox(Violation),

    /// Any filesystem error other than non-existence, passed through as-is.
    #[error("failed to inspect {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("too many levels of symbolic links resolving {} (limit {limit})", path.display())]
    SymlinkLoop { path: PathBuf, limit: u32 },

    #[error("sandbox root set must not be empty")]
    EmptyRootSet,
}

impl SandboxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SandboxError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, SandboxError::OutsideSandbox(_))
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            SandboxError::OutsideSandbox(v) => Some(v),
            _ => None,
        }
    }

    /// Recover a sandbox error carried inside an `io::Error` produced by
    /// [`GuardedFs`](super::GuardedFs).
    pub fn from_io(err: &io::Error) -> Option<&SandboxError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<SandboxError>())
    }
}

impl From<SandboxError> for io::Error {
    fn from(err: SandboxError) -> Self {
        match err {
            // Resolution errors keep their original kind and payload.
            SandboxError::Io { source, .. } => source,
            SandboxError::OutsideSandbox(_) => io::Error::new(io::ErrorKind::PermissionDenied, err),
            SandboxError::SymlinkLoop { .. } | SandboxError::EmptyRootSet => io::Error::other(err),
        }
    }
}
