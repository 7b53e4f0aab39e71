//! The filesystem operation set, in a real and a guarded flavour.
//!
//! Callers hold an `Arc<dyn FileSystem>` and never learn which one backs
//! it; [`Sandbox`](super::Sandbox) decides by swapping the reference.

use std::fs::{self, File, FileTimes, OpenOptions, Permissions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use super::gate::Gate;
use super::roots::SandboxRootSet;
use super::schema::CallArg;

/// How to open a file, mirroring the classic `fopen`-style flag strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
}

impl OpenMode {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// `"w"`: create or truncate.
    pub fn write() -> Self {
        Self {
            write: true,
            truncate: true,
            create: true,
            ..Self::default()
        }
    }

    /// `"a"`: create if missing, append.
    pub fn append() -> Self {
        Self {
            append: true,
            create: true,
            ..Self::default()
        }
    }

    /// Parse `r`, `r+`, `w`, `wx`, `w+`, `wx+`, `a`, `ax`, `a+`, `ax+`
    /// (an `s` sync marker is accepted and ignored).
    pub fn parse(flags: &str) -> io::Result<Self> {
        let normalized: String = flags.chars().filter(|c| *c != 's').collect();
        let mode = match normalized.as_str() {
            "r" => Self::read_only(),
            "r+" => Self {
                read: true,
                write: true,
                ..Self::default()
            },
            "w" => Self::write(),
            "wx" | "xw" => Self {
                write: true,
                create_new: true,
                ..Self::default()
            },
            "w+" => Self {
                read: true,
                ..Self::write()
            },
            "wx+" | "xw+" => Self {
                read: true,
                write: true,
                create_new: true,
                ..Self::default()
            },
            "a" => Self::append(),
            "ax" | "xa" => Self {
                append: true,
                create_new: true,
                ..Self::default()
            },
            "a+" => Self {
                read: true,
                ..Self::append()
            },
            "ax+" | "xa+" => Self {
                read: true,
                append: true,
                create_new: true,
                ..Self::default()
            },
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown open flags: {flags:?}"),
                ));
            }
        };
        Ok(mode)
    }

    /// Equivalent `open(2)` flag bits.
    pub fn to_flags(&self) -> i32 {
        let writes = self.write || self.append;
        let mut bits = match (self.read, writes) {
            (true, true) => libc::O_RDWR,
            (false, true) => libc::O_WRONLY,
            _ => libc::O_RDONLY,
        };
        if self.append {
            bits |= libc::O_APPEND;
        }
        if self.truncate {
            bits |= libc::O_TRUNC;
        }
        if self.create {
            bits |= libc::O_CREAT;
        }
        if self.create_new {
            bits |= libc::O_CREAT | libc::O_EXCL;
        }
        bits
    }

    pub fn has_write_intent(&self) -> bool {
        self.write || self.append || self.truncate || self.create || self.create_new
    }

    pub fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create)
            .create_new(self.create_new);
        options
    }
}

/// Filesystem operations that can be gated. One method per entry in
/// [`OPERATIONS`](super::schema::OPERATIONS).
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// `mode` is a combination of `F_OK`, `R_OK`, `W_OK`, `X_OK`.
    fn access(&self, path: &Path, mode: i32) -> io::Result<()>;
    fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;
    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;
    fn open(&self, path: &Path, mode: &OpenMode) -> io::Result<File>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()>;
    fn set_times(&self, path: &Path, times: FileTimes) -> io::Result<()>;
    /// Create a symlink at `link` pointing to `original`.
    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()>;
    fn truncate(&self, path: &Path, len: u64) -> io::Result<()>;
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Unguarded operations straight onto `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

#[cfg(not(unix))]
fn unsupported(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{operation} is not supported on this platform"),
    )
}

impl FileSystem for RealFs {
    #[cfg(unix)]
    fn access(&self, path: &Path, mode: i32) -> io::Result<()> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let rc = unsafe { libc::access(c_path.as_ptr(), mode) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn access(&self, path: &Path, mode: i32) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        if mode & super::schema::W_OK != 0 && meta.permissions().readonly() {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }

    fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        OpenMode::append().options().open(path)?.write_all(contents)
    }

    #[cfg(unix)]
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        std::os::unix::fs::chown(path, uid, gid)
    }

    #[cfg(not(unix))]
    fn chown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> io::Result<()> {
        Err(unsupported("chown"))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(original, link)
    }

    #[cfg(unix)]
    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        std::os::unix::fs::lchown(path, uid, gid)
    }

    #[cfg(not(unix))]
    fn lchown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> io::Result<()> {
        Err(unsupported("lchown"))
    }

    fn open(&self, path: &Path, mode: &OpenMode) -> io::Result<File> {
        mode.options().open(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        fs::set_permissions(path, permissions)
    }

    fn set_times(&self, path: &Path, times: FileTimes) -> io::Result<()> {
        File::open(path)?.set_times(times)
    }

    #[cfg(unix)]
    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(original, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _original: &Path, _link: &Path) -> io::Result<()> {
        Err(unsupported("symlink"))
    }

    fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        OpenOptions::new().write(true).open(path)?.set_len(len)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }
}

/// Verifies every schema-declared path argument, then delegates.
///
/// A failed check surfaces as an `io::Error` (`PermissionDenied` for a
/// violation) and the inner operation is not invoked. Use
/// [`SandboxError::from_io`](super::SandboxError::from_io) to get the
/// structured [`Violation`](super::Violation) back.
pub struct GuardedFs {
    inner: Arc<dyn FileSystem>,
    roots: Arc<SandboxRootSet>,
    gate: Gate,
}

impl GuardedFs {
    pub fn new(inner: Arc<dyn FileSystem>, roots: Arc<SandboxRootSet>) -> Self {
        Self::with_gate(inner, roots, Gate::default())
    }

    pub fn with_gate(inner: Arc<dyn FileSystem>, roots: Arc<SandboxRootSet>, gate: Gate) -> Self {
        Self { inner, roots, gate }
    }

    pub fn roots(&self) -> &Arc<SandboxRootSet> {
        &self.roots
    }

    fn guard(&self, operation: &str, args: &[CallArg<'_>]) -> io::Result<()> {
        self.gate
            .check_call(operation, args, &self.roots)
            .map_err(io::Error::from)
    }
}

impl FileSystem for GuardedFs {
    fn access(&self, path: &Path, mode: i32) -> io::Result<()> {
        self.guard("access", &[CallArg::Path(path), CallArg::Int(mode.into())])?;
        self.inner.access(path, mode)
    }

    fn append_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.guard(
            "append_file",
            &[CallArg::Path(path), CallArg::Bytes(contents)],
        )?;
        self.inner.append_file(path, contents)
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.guard("chown", &[CallArg::Path(path), CallArg::Other, CallArg::Other])?;
        self.inner.chown(path, uid, gid)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.guard("copy_file", &[CallArg::Path(from), CallArg::Path(to)])?;
        self.inner.copy_file(from, to)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.guard("create_dir", &[CallArg::Path(path)])?;
        self.inner.create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.guard("create_dir_all", &[CallArg::Path(path)])?;
        self.inner.create_dir_all(path)
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.guard("hard_link", &[CallArg::Path(original), CallArg::Path(link)])?;
        self.inner.hard_link(original, link)
    }

    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.guard("lchown", &[CallArg::Path(path), CallArg::Other, CallArg::Other])?;
        self.inner.lchown(path, uid, gid)
    }

    fn open(&self, path: &Path, mode: &OpenMode) -> io::Result<File> {
        self.guard(
            "open",
            &[CallArg::Path(path), CallArg::Int(mode.to_flags().into())],
        )?;
        self.inner.open(path, mode)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.guard("remove_dir", &[CallArg::Path(path)])?;
        self.inner.remove_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.guard("remove_dir_all", &[CallArg::Path(path)])?;
        self.inner.remove_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.guard("remove_file", &[CallArg::Path(path)])?;
        self.inner.remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.guard("rename", &[CallArg::Path(from), CallArg::Path(to)])?;
        self.inner.rename(from, to)
    }

    fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        self.guard("set_permissions", &[CallArg::Path(path), CallArg::Other])?;
        self.inner.set_permissions(path, permissions)
    }

    fn set_times(&self, path: &Path, times: FileTimes) -> io::Result<()> {
        self.guard("set_times", &[CallArg::Path(path), CallArg::Other])?;
        self.inner.set_times(path, times)
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.guard("symlink", &[CallArg::Path(original), CallArg::Path(link)])?;
        self.inner.symlink(original, link)
    }

    fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        self.guard(
            "truncate",
            &[CallArg::Path(path), CallArg::Int(len.try_into().unwrap_or(i64::MAX))],
        )?;
        self.inner.truncate(path, len)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.guard(
            "write_file",
            &[CallArg::Path(path), CallArg::Bytes(contents)],
        )?;
        self.inner.write_file(path, contents)
    }
}
