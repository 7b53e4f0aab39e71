//! CLI subcommand: `sandboxfs check`
//!
//! Verifies each path concurrently on the blocking pool and reports one
//! line per path. Exits non-zero when any path is rejected.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::sandbox::{Gate, SandboxError, Violation};

#[derive(Args)]
pub struct CheckArgs {
    /// Paths to verify
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Sandbox root directory (repeatable; default: sandbox.roots)
    #[arg(short, long = "root")]
    pub roots: Vec<PathBuf>,

    /// Treat paths as leaves to be created or unlinked (only the parent is checked)
    #[arg(short, long)]
    pub link: bool,

    /// Print one JSON object per path
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    path: PathBuf,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    violation: Option<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckReport {
    fn new(path: PathBuf, outcome: Result<PathBuf, SandboxError>) -> Self {
        match outcome {
            Ok(resolved) => Self {
                path,
                ok: true,
                resolved: Some(resolved),
                violation: None,
                error: None,
            },
            Err(SandboxError::OutsideSandbox(violation)) => Self {
                path,
                ok: false,
                resolved: None,
                violation: Some(violation),
                error: None,
            },
            Err(e) => Self {
                path,
                ok: false,
                resolved: None,
                violation: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn line(&self) -> String {
        match (&self.resolved, &self.violation, &self.error) {
            (Some(resolved), _, _) => {
                format!("ok      {} -> {}", self.path.display(), resolved.display())
            }
            (_, Some(violation), _) => format!("DENIED  {}: {}", self.path.display(), violation),
            (_, _, Some(error)) => format!("ERROR   {}: {}", self.path.display(), error),
            _ => format!("?       {}", self.path.display()),
        }
    }
}

pub async fn run(args: CheckArgs, config: &Config) -> Result<()> {
    let roots = Arc::new(super::sandbox_roots(&args.roots, config)?);
    let gate = Gate::new(config.resolver());

    let checks = args.paths.iter().map(|path| {
        let roots = roots.clone();
        async move {
            let outcome = gate
                .verify_async(path.clone(), roots, args.link)
                .await
                .map(|resolved| resolved.into_path_buf());
            CheckReport::new(path.clone(), outcome)
        }
    });
    let reports = futures::future::join_all(checks).await;

    for report in &reports {
        if args.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            println!("{}", report.line());
        }
    }

    let rejected = reports.iter().filter(|r| !r.ok).count();
    if rejected > 0 {
        anyhow::bail!("{} of {} paths rejected", rejected, reports.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_with_root(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.sandbox.roots = vec![root.to_string_lossy().into_owned()];
        config
    }

    #[tokio::test]
    async fn all_inside_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        fs::write(base.join("a"), "a").unwrap();

        let args = CheckArgs {
            paths: vec![base.join("a"), base.join("new/b")],
            roots: vec![],
            link: false,
            json: false,
        };
        run(args, &config_with_root(&base)).await.unwrap();
    }

    #[tokio::test]
    async fn any_outside_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        let sandbox = base.join("box");
        fs::create_dir(&sandbox).unwrap();

        let args = CheckArgs {
            paths: vec![sandbox.join("ok"), base.join("escape")],
            roots: vec![sandbox.clone()],
            link: false,
            json: true,
        };
        let err = run(args, &Config::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 paths rejected");
    }

    #[test]
    fn report_serializes_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        let roots = crate::sandbox::SandboxRootSet::new([&base]).unwrap();
        let violation = Violation::outside_sandbox(std::path::Path::new("/elsewhere"), &roots);

        let report = CheckReport::new(
            PathBuf::from("/elsewhere"),
            Err(SandboxError::OutsideSandbox(violation)),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["violation"]["kind"], "OUTSIDE_SANDBOX");
        assert!(json.get("resolved").is_none());
        assert!(report.line().starts_with("DENIED"));
    }
}
