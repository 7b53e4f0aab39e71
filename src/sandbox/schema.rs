//! Static table of gated filesystem operations.
//!
//! Each entry names the positional arguments that carry paths and whether
//! the path denotes an existing target (resolved fully, through symlinks)
//! or a leaf that may not exist yet / is the link itself (only its parent
//! directory is resolved). Operations absent from the table are not gated.

use std::path::Path;

/// Positional argument of an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallArg<'a> {
    Path(&'a Path),
    /// A string in a path or flag position (`"w+"`, `"/tmp/x"`).
    Text(&'a str),
    Int(i64),
    /// Pre-opened file descriptor or handle. Never verified.
    Descriptor(i64),
    Bytes(&'a [u8]),
    Other,
}

impl<'a> CallArg<'a> {
    /// The path this argument names, if it is string-like.
    pub fn as_path(&self) -> Option<&'a Path> {
        match *self {
            CallArg::Path(p) => Some(p),
            CallArg::Text(s) => Some(Path::new(s)),
            _ => None,
        }
    }
}

/// One path-bearing argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathArg {
    pub index: usize,
    pub expects_link: bool,
}

impl PathArg {
    pub const fn target(index: usize) -> Self {
        Self {
            index,
            expects_link: false,
        }
    }

    pub const fn link(index: usize) -> Self {
        Self {
            index,
            expects_link: true,
        }
    }
}

#[cfg(unix)]
pub const F_OK: i32 = libc::F_OK;
#[cfg(unix)]
pub const R_OK: i32 = libc::R_OK;
#[cfg(unix)]
pub const W_OK: i32 = libc::W_OK;
#[cfg(unix)]
pub const X_OK: i32 = libc::X_OK;

#[cfg(not(unix))]
pub const F_OK: i32 = 0;
#[cfg(not(unix))]
pub const R_OK: i32 = 4;
#[cfg(not(unix))]
pub const W_OK: i32 = 2;
#[cfg(not(unix))]
pub const X_OK: i32 = 1;

/// Open flag bits that imply the file may be written, created or truncated.
pub const OPEN_WRITE_FLAGS: i32 =
    libc::O_WRONLY | libc::O_RDWR | libc::O_CREAT | libc::O_APPEND | libc::O_TRUNC;

/// When the declared path arguments are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gating {
    Always,
    /// Only when the access mode at `mode_index` contains `W_OK`.
    WriteAccess { mode_index: usize },
    /// Only when the open flags at `flags_index` imply write, create or append.
    WriteOpen { flags_index: usize },
}

impl Gating {
    pub fn applies(&self, args: &[CallArg<'_>]) -> bool {
        match *self {
            Gating::Always => true,
            Gating::WriteAccess { mode_index } => match args.get(mode_index) {
                Some(CallArg::Int(mode)) => mode & i64::from(W_OK) != 0,
                _ => false,
            },
            Gating::WriteOpen { flags_index } => match args.get(flags_index) {
                Some(CallArg::Text(flags)) => flags_imply_write(flags),
                Some(CallArg::Int(bits)) => bits & i64::from(OPEN_WRITE_FLAGS) != 0,
                _ => false,
            },
        }
    }
}

/// `"w"`, `"a+"`, `"r+"`, `"WX"`... anything with `a`, `w` or `+`.
pub fn flags_imply_write(flags: &str) -> bool {
    flags
        .chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'a' | 'w' | '+'))
}

#[derive(Debug)]
pub struct OperationSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub paths: &'static [PathArg],
    pub gating: Gating,
}

impl OperationSpec {
    fn help_line(&self) -> String {
        let args = self
            .paths
            .iter()
            .map(|p| {
                if p.expects_link {
                    format!("{}L", p.index)
                } else {
                    p.index.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let gate = match self.gating {
            Gating::Always => "",
            Gating::WriteAccess { .. } => " (write mode only)",
            Gating::WriteOpen { .. } => " (write flags only)",
        };
        format!("  {:<16}[{}]{:<20} {}", self.name, args, gate, self.description)
    }
}

pub const OPERATIONS: &[OperationSpec] = &[
    OperationSpec {
        name: "access",
        description: "Check accessibility of a path",
        paths: &[PathArg::target(0)],
        gating: Gating::WriteAccess { mode_index: 1 },
    },
    OperationSpec {
        name: "append_file",
        description: "Append bytes to a file, creating it if needed",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "chown",
        description: "Change owner, following symlinks",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "copy_file",
        description: "Copy a file to a destination",
        paths: &[PathArg::target(1)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "create_dir",
        description: "Create a directory",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "create_dir_all",
        description: "Create a directory and missing parents",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "hard_link",
        description: "Create a hard link to an existing file",
        paths: &[PathArg::target(0), PathArg::link(1)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "lchown",
        description: "Change owner of a symlink itself",
        paths: &[PathArg::link(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "open",
        description: "Open a file",
        paths: &[PathArg::target(0)],
        gating: Gating::WriteOpen { flags_index: 1 },
    },
    OperationSpec {
        name: "remove_dir",
        description: "Remove an empty directory",
        paths: &[PathArg::link(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "remove_dir_all",
        description: "Remove a directory tree",
        paths: &[PathArg::link(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "remove_file",
        description: "Remove a file or symlink",
        paths: &[PathArg::link(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "rename",
        description: "Move a file, directory or symlink",
        paths: &[PathArg::link(0), PathArg::link(1)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "set_permissions",
        description: "Change permission bits",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "set_times",
        description: "Change access and modification times",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "symlink",
        description: "Create a symlink at the second path",
        paths: &[PathArg::link(1)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "truncate",
        description: "Resize a file",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
    OperationSpec {
        name: "write_file",
        description: "Write bytes to a file, replacing its contents",
        paths: &[PathArg::target(0)],
        gating: Gating::Always,
    },
];

pub fn lookup(operation: &str) -> Option<&'static OperationSpec> {
    OPERATIONS.iter().find(|op| op.name == operation)
}

/// Path descriptors for `operation`; empty means "do not intercept".
pub fn descriptors_for(operation: &str) -> &'static [PathArg] {
    lookup(operation).map(|op| op.paths).unwrap_or(&[])
}

pub fn format_table() -> String {
    let mut lines = vec!["Operations (path argument indexes, L = link/leaf):".to_string()];
    for op in OPERATIONS {
        lines.push(op.help_line());
    }
    lines.join("\n")
}
