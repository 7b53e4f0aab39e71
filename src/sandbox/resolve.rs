//! Real-path resolution that tolerates missing trailing components.
//!
//! `std::fs::canonicalize` fails outright when any component is missing,
//! which is exactly the case for a file about to be created. This resolver
//! walks the path one component at a time instead:
//!
//! - existing components are inspected with `symlink_metadata`, and symlinks
//!   are expanded in place (relative targets against the link's directory,
//!   absolute targets from their own root);
//! - `..` pops the already-resolved physical directory, as the kernel would;
//! - once a component is missing, the rest is appended without touching the
//!   filesystem, collapsing `..` lexically inside that missing tail.
//!
//! Symlink expansion is bounded by a hop budget so cycles terminate with
//! [`SandboxError::SymlinkLoop`].

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};
use tracing::debug;

use super::error::{Result, SandboxError};

/// Matches Linux `MAXSYMLINKS`.
pub const DEFAULT_MAX_SYMLINKS: u32 = 40;

/// Canonical absolute path: the longest existing prefix fully
/// symlink-resolved, followed by the components that do not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    path: PathBuf,
    missing_components: usize,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }

    /// Number of trailing components that did not exist at resolution time.
    pub fn missing_components(&self) -> usize {
        self.missing_components
    }

    pub fn exists(&self) -> bool {
        self.missing_components == 0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.display().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolver {
    max_symlinks: u32,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

enum Step {
    Parent,
    Name(OsString),
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            max_symlinks: DEFAULT_MAX_SYMLINKS,
        }
    }

    pub fn with_max_symlinks(max_symlinks: u32) -> Self {
        Self { max_symlinks }
    }

    pub fn max_symlinks(&self) -> u32 {
        self.max_symlinks
    }

    /// Resolve `path` against the live filesystem.
    ///
    /// Non-existence anywhere along the path is not an error. Every other
    /// filesystem error (permission denied, not a directory, I/O) is
    /// returned unchanged inside [`SandboxError::Io`].
    pub fn resolve(&self, path: &Path) -> Result<ResolvedPath> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| SandboxError::io(path, source))?
                .join(path)
        };

        let (anchor, steps) = split(&absolute);
        let mut resolved = anchor.unwrap_or_else(|| PathBuf::from(MAIN_SEPARATOR_STR));
        let mut queue: VecDeque<Step> = steps.into();
        let mut missing: Vec<OsString> = Vec::new();
        let mut hops = 0u32;

        while let Some(step) = queue.pop_front() {
            let name = match step {
                Step::Parent => {
                    if missing.pop().is_none() {
                        resolved.pop();
                    }
                    continue;
                }
                Step::Name(name) => name,
            };

            if !missing.is_empty() {
                missing.push(name);
                continue;
            }

            let candidate = resolved.join(&name);
            match fs::symlink_metadata(&candidate) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    hops += 1;
                    if hops > self.max_symlinks {
                        return Err(SandboxError::SymlinkLoop {
                            path: absolute,
                            limit: self.max_symlinks,
                        });
                    }
                    let target = fs::read_link(&candidate)
                        .map_err(|source| SandboxError::io(&candidate, source))?;
                    debug!("{} -> {}", candidate.display(), target.display());

                    let (target_anchor, target_steps) = split(&target);
                    if let Some(root) = target_anchor {
                        resolved = root;
                    }
                    for step in target_steps.into_iter().rev() {
                        queue.push_front(step);
                    }
                }
                Ok(_) => resolved = candidate,
                Err(e) if e.kind() == io::ErrorKind::NotFound => missing.push(name),
                Err(source) => return Err(SandboxError::io(candidate, source)),
            }
        }

        let missing_components = missing.len();
        resolved.extend(missing);
        Ok(ResolvedPath {
            path: resolved,
            missing_components,
        })
    }
}

/// Resolve with the default symlink budget.
pub fn resolve(path: impl AsRef<Path>) -> Result<ResolvedPath> {
    Resolver::new().resolve(path.as_ref())
}

/// Split a path into its anchor (prefix + root, if any) and walkable steps.
fn split(path: &Path) -> (Option<PathBuf>, Vec<Step>) {
    let mut anchor: Option<PathBuf> = None;
    let mut steps = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                anchor
                    .get_or_insert_with(PathBuf::new)
                    .push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => steps.push(Step::Parent),
            Component::Normal(name) => steps.push(Step::Name(name.to_os_string())),
        }
    }
    (anchor, steps)
}
