use serde::Serialize;
use std::path::{Path, PathBuf};

use super::containment::is_contained;
use super::error::{Result, SandboxError};
use super::resolve::Resolver;

/// The directories writes are confined to for one activation.
///
/// Roots are resolved on construction so that aliases such as `/tmp` on
/// macOS (really `/private/tmp`) compare against resolved candidates. The
/// set is never mutated after construction; re-enabling builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SandboxRootSet {
    roots: Vec<PathBuf>,
}

impl SandboxRootSet {
    pub fn new<I, P>(roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::with_resolver(roots, &Resolver::new())
    }

    pub fn with_resolver<I, P>(roots: I, resolver: &Resolver) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let resolved = roots
            .into_iter()
            .map(|root| resolver.resolve(root.as_ref()).map(|r| r.into_path_buf()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_canonical(resolved)
    }

    /// Build a set from paths that are already canonical, without touching
    /// the filesystem.
    pub fn from_canonical(roots: Vec<PathBuf>) -> Result<Self> {
        let mut unique: Vec<PathBuf> = Vec::with_capacity(roots.len());
        for root in roots {
            if !unique.contains(&root) {
                unique.push(root);
            }
        }
        if unique.is_empty() {
            return Err(SandboxError::EmptyRootSet);
        }
        Ok(Self { roots: unique })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether an already-resolved path equals or descends from any root.
    pub fn contains(&self, resolved: &Path) -> bool {
        self.roots.iter().any(|root| is_contained(resolved, root, true))
    }

    pub fn display_joined(&self) -> String {
        self.roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
