//! Async counterpart of [`ops`](super::ops) on top of `tokio::fs`.
//!
//! Path checks read the filesystem synchronously, so [`GuardedAsyncFs`] runs
//! them on the blocking pool before awaiting the real operation.

use async_trait::async_trait;
use std::fs::{FileTimes, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::gate::Gate;
use super::ops::{FileSystem, OpenMode, RealFs};
use super::roots::SandboxRootSet;
use super::schema::CallArg;

/// Same operations as [`FileSystem`], awaited.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AsyncFileSystem: Send + Sync {
    async fn access(&self, path: &Path, mode: i32) -> io::Result<()>;
    async fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;
    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;
    async fn create_dir(&self, path: &Path) -> io::Result<()>;
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    async fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;
    async fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;
    async fn open(&self, path: &Path, mode: &OpenMode) -> io::Result<File>;
    async fn remove_dir(&self, path: &Path) -> io::Result<()>;
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    async fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()>;
    async fn set_times(&self, path: &Path, times: FileTimes) -> io::Result<()>;
    async fn symlink(&self, original: &Path, link: &Path) -> io::Result<()>;
    async fn truncate(&self, path: &Path, len: u64) -> io::Result<()>;
    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

/// Unguarded operations on `tokio::fs`. Calls tokio has no wrapper for
/// (`access`, ownership, times, symlinks) go through [`RealFs`] on the
/// blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealAsyncFs;

#[async_trait]
impl AsyncFileSystem for RealAsyncFs {
    async fn access(&self, path: &Path, mode: i32) -> io::Result<()> {
        let path = path.to_path_buf();
        blocking(move || RealFs.access(&path, mode)).await
    }

    async fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::from(OpenMode::append().options())
            .open(path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await
    }

    async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        let path = path.to_path_buf();
        blocking(move || RealFs.chown(&path, uid, gid)).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to).await
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(original, link).await
    }

    async fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        let path = path.to_path_buf();
        blocking(move || RealFs.lchown(&path, uid, gid)).await
    }

    async fn open(&self, path: &Path, mode: &OpenMode) -> io::Result<File> {
        OpenOptions::from(mode.options()).open(path).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        fs::set_permissions(path, permissions).await
    }

    async fn set_times(&self, path: &Path, times: FileTimes) -> io::Result<()> {
        let path = path.to_path_buf();
        blocking(move || RealFs.set_times(&path, times)).await
    }

    async fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        let original = original.to_path_buf();
        let link = link.to_path_buf();
        blocking(move || RealFs.symlink(&original, &link)).await
    }

    async fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(len).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents).await
    }
}

/// Async [`GuardedFs`](super::GuardedFs): same schema, same errors.
pub struct GuardedAsyncFs {
    inner: Arc<dyn AsyncFileSystem>,
    roots: Arc<SandboxRootSet>,
    gate: Gate,
}

impl GuardedAsyncFs {
    pub fn new(inner: Arc<dyn AsyncFileSystem>, roots: Arc<SandboxRootSet>) -> Self {
        Self::with_gate(inner, roots, Gate::default())
    }

    pub fn with_gate(
        inner: Arc<dyn AsyncFileSystem>,
        roots: Arc<SandboxRootSet>,
        gate: Gate,
    ) -> Self {
        Self { inner, roots, gate }
    }

    pub fn roots(&self) -> &Arc<SandboxRootSet> {
        &self.roots
    }

    /// `paths` fill the leading positions; `mode` (access mode or open
    /// flags) follows them.
    async fn guard(
        &self,
        operation: &'static str,
        paths: &[&Path],
        mode: Option<i64>,
    ) -> io::Result<()> {
        let gate = self.gate;
        let roots = self.roots.clone();
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.to_path_buf()).collect();

        blocking(move || {
            let mut args: Vec<CallArg<'_>> = paths.iter().map(|p| CallArg::Path(p)).collect();
            args.extend(mode.map(CallArg::Int));
            gate.check_call(operation, &args, &roots)
                .map_err(io::Error::from)
        })
        .await
    }
}

#[async_trait]
impl AsyncFileSystem for GuardedAsyncFs {
    async fn access(&self, path: &Path, mode: i32) -> io::Result<()> {
        self.guard("access", &[path], Some(mode.into())).await?;
        self.inner.access(path, mode).await
    }

    async fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.guard("append_file", &[path], None).await?;
        self.inner.append_file(path, contents).await
    }

    async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.guard("chown", &[path], None).await?;
        self.inner.chown(path, uid, gid).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.guard("copy_file", &[from, to], None).await?;
        self.inner.copy_file(from, to).await
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.guard("create_dir", &[path], None).await?;
        self.inner.create_dir(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.guard("create_dir_all", &[path], None).await?;
        self.inner.create_dir_all(path).await
    }

    async fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.guard("hard_link", &[original, link], None).await?;
        self.inner.hard_link(original, link).await
    }

    async fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.guard("lchown", &[path], None).await?;
        self.inner.lchown(path, uid, gid).await
    }

    async fn open(&self, path: &Path, mode: &OpenMode) -> io::Result<File> {
        self.guard("open", &[path], Some(mode.to_flags().into()))
            .await?;
        self.inner.open(path, mode).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.guard("remove_dir", &[path], None).await?;
        self.inner.remove_dir(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.guard("remove_dir_all", &[path], None).await?;
        self.inner.remove_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.guard("remove_file", &[path], None).await?;
        self.inner.remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.guard("rename", &[from, to], None).await?;
        self.inner.rename(from, to).await
    }

    async fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        self.guard("set_permissions", &[path], None).await?;
        self.inner.set_permissions(path, permissions).await
    }

    async fn set_times(&self, path: &Path, times: FileTimes) -> io::Result<()> {
        self.guard("set_times", &[path], None).await?;
        self.inner.set_times(path, times).await
    }

    async fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.guard("symlink", &[original, link], None).await?;
        self.inner.symlink(original, link).await
    }

    async fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        self.guard("truncate", &[path], None).await?;
        self.inner.truncate(path, len).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.guard("write_file", &[path], None).await?;
        self.inner.write_file(path, contents).await
    }
}
