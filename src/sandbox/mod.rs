//! Path gate for filesystem-mutating operations.
//!
//! Every path argument of a gated operation must resolve, after following
//! symlinks and allowing for components that do not exist yet, to a
//! location inside one of the configured sandbox roots.
//!
//! - [`resolve`]: real-path resolution tolerant of missing trailing components
//! - [`containment`]: lexical "is this under that root" checks
//! - [`schema`]: which argument positions of which operations are paths
//! - [`gate`]: resolution + containment, raising [`Violation`]s
//! - [`ops`]: the [`FileSystem`] trait with real and guarded implementations
//! - [`async_ops`]: the same on `tokio::fs`
//! - [`controller`]: enable/disable and the swappable active operation set
//!
//! Verification does not protect against the filesystem changing between
//! the check and the real operation (e.g. a symlink swapped in afterwards).

pub mod async_ops;
pub mod containment;
pub mod controller;
pub mod error;
pub mod gate;
pub mod ops;
pub mod resolve;
pub mod roots;
pub mod schema;

pub use async_ops::{AsyncFileSystem, GuardedAsyncFs, RealAsyncFs};
pub use containment::{is_contained, relative_path};
pub use controller::{Sandbox, disable, enable, fs, fs_async, is_enabled};
pub use error::{SandboxError, Violation, ViolationKind};
pub use gate::{Gate, check_call, verify, verify_arg, verify_async};
pub use ops::{FileSystem, GuardedFs, OpenMode, RealFs};
pub use resolve::{DEFAULT_MAX_SYMLINKS, ResolvedPath, Resolver, resolve};
pub use roots::SandboxRootSet;
pub use schema::{CallArg, OPERATIONS, OperationSpec, PathArg, descriptors_for};
