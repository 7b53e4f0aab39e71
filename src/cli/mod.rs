pub mod call;
pub mod check;
pub mod config;
pub mod resolve;
pub mod schema;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::sandbox::SandboxRootSet;

#[derive(Parser)]
#[command(name = "sandboxfs")]
#[command(
    author,
    version,
    about = "Confine filesystem writes to a set of sandbox directories"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "SANDBOXFS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify that paths resolve inside the sandbox
    Check(check::CheckArgs),

    /// Dry-run the gate for one intercepted operation
    Call(call::CallArgs),

    /// Print the resolved form of a path
    Resolve(resolve::ResolveArgs),

    /// List the gated operations and their path arguments
    Schema,

    /// Configuration management
    Config(config::ConfigArgs),
}

/// Roots from `--root`, falling back to `sandbox.roots` in the config.
pub fn sandbox_roots(explicit: &[PathBuf], config: &Config) -> Result<SandboxRootSet> {
    let roots = if explicit.is_empty() {
        config.sandbox_roots()
    } else {
        explicit.to_vec()
    };

    if roots.is_empty() {
        anyhow::bail!(
            "No sandbox roots given. Pass --root or set sandbox.roots in {}",
            config.path.display()
        );
    }

    Ok(SandboxRootSet::with_resolver(roots, &config.resolver())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_roots_win_over_config() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        let mut config = Config::default();
        config.sandbox.roots = vec!["/nonexistent/configured".to_string()];

        let roots = sandbox_roots(&[base.clone()], &config).unwrap();
        assert_eq!(roots.as_slice(), &[base]);
    }

    #[test]
    fn falls_back_to_config_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        let mut config = Config::default();
        config.sandbox.roots = vec![base.to_string_lossy().into_owned()];

        let roots = sandbox_roots(&[], &config).unwrap();
        assert_eq!(roots.as_slice(), &[base]);
    }

    #[test]
    fn no_roots_anywhere_is_an_error() {
        assert!(sandbox_roots(&[], &Config::default()).is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sandboxfs", "check", "/tmp/x", "--verbose", "-r", "/tmp"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("/tmp/x")]);
                assert_eq!(args.roots, vec![PathBuf::from("/tmp")]);
            }
            _ => panic!("expected check"),
        }
    }
}
