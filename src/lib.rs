//! sandboxfs - confine filesystem mutation to a set of sandbox directories
//!
//! This crate provides:
//! - A real-path resolver that follows symlinks and tolerates paths that
//!   do not exist yet
//! - A verification gate applying a static schema of path-bearing
//!   operation arguments
//! - A guarded [`sandbox::FileSystem`] that checks every path before
//!   delegating, plus a process-wide enable/disable switch
//! - The `sandboxfs` CLI for checking paths and dry-running calls

pub mod cli;
pub mod config;
pub mod paths;
pub mod sandbox;

pub use config::Config;
pub use sandbox::{SandboxError, SandboxRootSet, Violation};
