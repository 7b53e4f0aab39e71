use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::info;

use super::async_ops::{AsyncFileSystem, GuardedAsyncFs, RealAsyncFs};
use super::error::Result;
use super::gate::Gate;
use super::ops::{FileSystem, GuardedFs, RealFs};
use super::resolve::{ResolvedPath, Resolver};
use super::roots::SandboxRootSet;

/// Everything that changes on enable/disable, swapped as one unit.
struct Active {
    roots: Option<Arc<SandboxRootSet>>,
    fs: Arc<dyn FileSystem>,
    async_fs: Arc<dyn AsyncFileSystem>,
}

/// Owns the enabled/disabled toggle and the operation set callers use.
///
/// Readers load an `Arc` snapshot of the active state before touching the
/// filesystem, so a concurrent `enable` is seen either fully or not at all.
pub struct Sandbox {
    real: Arc<dyn FileSystem>,
    real_async: Arc<dyn AsyncFileSystem>,
    gate: Gate,
    active: ArcSwap<Active>,
}

static GLOBAL: LazyLock<Sandbox> = LazyLock::new(Sandbox::new);

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_fs(Arc::new(RealFs), Resolver::new())
    }

    /// Use `real` as the unguarded blocking operation set.
    pub fn with_fs(real: Arc<dyn FileSystem>, resolver: Resolver) -> Self {
        Self::with_backends(real, Arc::new(RealAsyncFs), resolver)
    }

    pub fn with_backends(
        real: Arc<dyn FileSystem>,
        real_async: Arc<dyn AsyncFileSystem>,
        resolver: Resolver,
    ) -> Self {
        let active = Active {
            roots: None,
            fs: real.clone(),
            async_fs: real_async.clone(),
        };
        Self {
            real,
            real_async,
            gate: Gate::new(resolver),
            active: ArcSwap::from_pointee(active),
        }
    }

    /// Process-wide instance used by the free functions in this module.
    pub fn global() -> &'static Sandbox {
        &GLOBAL
    }

    fn snapshot(&self) -> Arc<Active> {
        self.active.load_full()
    }

    fn swap(&self, next: Active) {
        self.active.store(Arc::new(next));
    }

    /// Confine subsequent operations to `roots`, replacing any previous set.
    ///
    /// On error (empty list, unresolvable root) the previous state is kept.
    pub fn enable<I, P>(&self, roots: I) -> Result<Arc<SandboxRootSet>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = Arc::new(SandboxRootSet::with_resolver(
            roots,
            self.gate.resolver(),
        )?);
        let guarded = GuardedFs::with_gate(self.real.clone(), roots.clone(), self.gate);
        let guarded_async =
            GuardedAsyncFs::with_gate(self.real_async.clone(), roots.clone(), self.gate);
        self.swap(Active {
            roots: Some(roots.clone()),
            fs: Arc::new(guarded),
            async_fs: Arc::new(guarded_async),
        });
        info!("Sandbox enabled for {}", roots.display_joined());
        Ok(roots)
    }

    pub fn disable(&self) {
        self.swap(Active {
            roots: None,
            fs: self.real.clone(),
            async_fs: self.real_async.clone(),
        });
        info!("Sandbox disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.snapshot().roots.is_some()
    }

    pub fn roots(&self) -> Option<Arc<SandboxRootSet>> {
        self.snapshot().roots.clone()
    }

    /// The operation set currently in force.
    pub fn fs(&self) -> Arc<dyn FileSystem> {
        self.snapshot().fs.clone()
    }

    pub fn fs_async(&self) -> Arc<dyn AsyncFileSystem> {
        self.snapshot().async_fs.clone()
    }

    /// Verify `path` against the active roots. `Ok(None)` when disabled.
    pub fn verify(&self, path: &Path, expects_link: bool) -> Result<Option<ResolvedPath>> {
        match self.roots() {
            Some(roots) => self.gate.verify_path(path, &roots, expects_link).map(Some),
            None => Ok(None),
        }
    }
}

pub fn enable<I, P>(roots: I) -> Result<Arc<SandboxRootSet>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    Sandbox::global().enable(roots)
}

pub fn disable() {
    Sandbox::global().disable()
}

pub fn is_enabled() -> bool {
    Sandbox::global().is_enabled()
}

pub fn fs() -> Arc<dyn FileSystem> {
    Sandbox::global().fs()
}

pub fn fs_async() -> Arc<dyn AsyncFileSystem> {
    Sandbox::global().fs_async()
}
