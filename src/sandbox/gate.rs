use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{Result, SandboxError, Violation};
use super::resolve::{ResolvedPath, Resolver};
use super::roots::SandboxRootSet;
use super::schema::{self, CallArg};

/// Resolves path arguments and checks them against a root set.
///
/// Holds no state besides the resolver configuration; every call only
/// reads the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gate {
    resolver: Resolver,
}

impl Gate {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Verify one path.
    ///
    /// With `expects_link`, only the parent directory is resolved and
    /// checked: the leaf may not exist yet, or may be the symlink being
    /// created or removed. A path without a named leaf (ending in `..` or
    /// `.`, or a bare root) is resolved in full instead.
    pub fn verify_path(
        &self,
        path: &Path,
        roots: &SandboxRootSet,
        expects_link: bool,
    ) -> Result<ResolvedPath> {
        let subject = if expects_link {
            link_subject(path)
        } else {
            path
        };
        let resolved = self.resolver.resolve(subject)?;

        if roots.contains(resolved.as_path()) {
            debug!(
                "verified {} -> {} (link: {})",
                path.display(),
                resolved,
                expects_link
            );
            return Ok(resolved);
        }

        let violation = Violation::outside_sandbox(resolved.as_path(), roots);
        warn!("{}", violation.message);
        Err(SandboxError::OutsideSandbox(violation))
    }

    /// Verify a positional argument. Non-string arguments are skipped and
    /// yield `Ok(None)`.
    pub fn verify(
        &self,
        arg: &CallArg<'_>,
        roots: &SandboxRootSet,
        expects_link: bool,
    ) -> Result<Option<ResolvedPath>> {
        match arg.as_path() {
            Some(path) => self.verify_path(path, roots, expects_link).map(Some),
            None => Ok(None),
        }
    }

    /// [`Gate::verify_path`] on the blocking pool, for async callers.
    pub async fn verify_async(
        &self,
        path: PathBuf,
        roots: Arc<SandboxRootSet>,
        expects_link: bool,
    ) -> Result<ResolvedPath> {
        let gate = *self;
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || gate.verify_path(&task_path, &roots, expects_link))
            .await
            .map_err(|e| SandboxError::io(path, std::io::Error::other(e)))?
    }

    /// Apply the operation schema to a full call.
    ///
    /// Unknown operations pass. Missing arguments at a declared position
    /// are treated like non-path arguments.
    pub fn check_call(
        &self,
        operation: &str,
        args: &[CallArg<'_>],
        roots: &SandboxRootSet,
    ) -> Result<()> {
        let Some(spec) = schema::lookup(operation) else {
            return Ok(());
        };
        if !spec.gating.applies(args) {
            debug!("{} not gated for these arguments", operation);
            return Ok(());
        }
        for path_arg in spec.paths {
            if let Some(arg) = args.get(path_arg.index) {
                self.verify(arg, roots, path_arg.expects_link)?;
            }
        }
        Ok(())
    }
}

/// Path whose containment governs a link-like argument.
///
/// Only a trailing `Normal` component is a leaf that can be spared from
/// resolution. `root/..` names the directory above `root`, so it is
/// resolved as-is rather than cut back to `root`.
fn link_subject(path: &Path) -> &Path {
    match path.components().next_back() {
        Some(Component::Normal(_)) => match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => path,
        },
        _ => path,
    }
}

/// Verify `path` with the default resolver.
pub fn verify(
    path: impl AsRef<Path>,
    roots: &SandboxRootSet,
    expects_link: bool,
) -> Result<ResolvedPath> {
    Gate::default().verify_path(path.as_ref(), roots, expects_link)
}

/// Verify a positional argument with the default resolver.
pub fn verify_arg(
    arg: &CallArg<'_>,
    roots: &SandboxRootSet,
    expects_link: bool,
) -> Result<Option<ResolvedPath>> {
    Gate::default().verify(arg, roots, expects_link)
}

/// Apply the schema for `operation` with the default resolver.
pub fn check_call(operation: &str, args: &[CallArg<'_>], roots: &SandboxRootSet) -> Result<()> {
    Gate::default().check_call(operation, args, roots)
}

/// Run [`verify`] on the blocking pool for async callers.
pub async fn verify_async(
    path: PathBuf,
    roots: Arc<SandboxRootSet>,
    expects_link: bool,
) -> Result<ResolvedPath> {
    Gate::default().verify_async(path, roots, expects_link).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Fixture {
        _tmp: tempfile::TempDir,
        base: PathBuf,
        sandbox: PathBuf,
        roots: SandboxRootSet,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        let sandbox = base.join("the-sandbox");
        fs::create_dir(&sandbox).unwrap();
        fs::write(sandbox.join("good-file"), "good").unwrap();
        fs::write(base.join("bad-file"), "bad").unwrap();
        let roots = SandboxRootSet::new([&sandbox]).unwrap();
        Fixture {
            _tmp: tmp,
            base,
            sandbox,
            roots,
        }
    }

    #[test]
    fn descendant_passes() {
        let f = fixture();
        let resolved = verify(f.sandbox.join("good-file"), &f.roots, false).unwrap();
        assert_eq!(resolved.as_path(), f.sandbox.join("good-file"));
    }

    #[test]
    fn outside_path_is_a_violation() {
        let f = fixture();
        let err = verify(f.base.join("bad-file"), &f.roots, false).unwrap_err();
        let violation = err.violation().expect("violation");
        assert_eq!(violation.path, f.base.join("bad-file"));
        assert_eq!(violation.roots, vec![f.sandbox.clone()]);
        assert_eq!(violation.kind.as_str(), "OUTSIDE_SANDBOX");
    }

    #[test]
    fn root_itself_passes() {
        let f = fixture();
        assert!(verify(&f.sandbox, &f.roots, false).is_ok());
    }

    #[test]
    fn new_subdirectory_passes() {
        let f = fixture();
        assert!(verify(f.sandbox.join("newdir/file"), &f.roots, false).is_ok());
    }

    #[test]
    fn traversal_out_of_missing_dir_is_caught() {
        let f = fixture();
        let err = verify(f.sandbox.join("ghost/../../bad-file"), &f.roots, false).unwrap_err();
        assert!(err.is_violation());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_governs() {
        let f = fixture();
        let link = f.sandbox.join("escape");
        std::os::unix::fs::symlink(f.base.join("bad-file"), &link).unwrap();

        let err = verify(&link, &f.roots, false).unwrap_err();
        assert_eq!(err.violation().unwrap().path, f.base.join("bad-file"));
    }

    #[cfg(unix)]
    #[test]
    fn expects_link_checks_only_parent() {
        let f = fixture();
        let link = f.sandbox.join("escape");
        std::os::unix::fs::symlink(f.base.join("bad-file"), &link).unwrap();

        let resolved = verify(&link, &f.roots, true).unwrap();
        assert_eq!(resolved.as_path(), f.sandbox);
        assert!(verify(f.sandbox.join("not-yet"), &f.roots, true).is_ok());
        assert!(verify(f.base.join("not-yet"), &f.roots, true).is_err());
    }

    #[test]
    fn link_subject_edge_cases() {
        assert_eq!(link_subject(Path::new("/a/b")), Path::new("/a"));
        assert_eq!(link_subject(Path::new("b")), Path::new("."));
        assert_eq!(link_subject(Path::new("/")), Path::new("/"));
        assert_eq!(link_subject(Path::new("/a/..")), Path::new("/a/.."));
        assert_eq!(link_subject(Path::new("..")), Path::new(".."));
        assert_eq!(link_subject(Path::new(".")), Path::new("."));
    }

    #[test]
    fn link_operations_on_dotdot_are_judged_by_the_parent_directory() {
        let f = fixture();
        fs::create_dir(f.sandbox.join("sub")).unwrap();
        let up = f.sandbox.join("..");
        let up_twice = f.sandbox.join("sub/../..");
        let inside = f.sandbox.join("good-file");

        for escape in [&up, &up_twice] {
            for op in ["remove_dir_all", "remove_dir", "lchown", "remove_file"] {
                let err = check_call(op, &[CallArg::Path(escape)], &f.roots).unwrap_err();
                assert_eq!(err.violation().unwrap().path, f.base, "{op} {}", escape.display());
            }
            assert!(
                check_call("rename", &[CallArg::Path(escape), CallArg::Path(&inside)], &f.roots)
                    .unwrap_err()
                    .is_violation()
            );
            assert!(
                check_call("rename", &[CallArg::Path(&inside), CallArg::Path(escape)], &f.roots)
                    .unwrap_err()
                    .is_violation()
            );
        }

        // One level down and back up is the root itself.
        let resolved = verify(f.sandbox.join("sub/.."), &f.roots, true).unwrap();
        assert_eq!(resolved.as_path(), f.sandbox);
    }

    #[test]
    fn non_string_arguments_are_skipped() {
        let f = fixture();
        assert!(verify_arg(&CallArg::Descriptor(7), &f.roots, false).unwrap().is_none());
        assert!(verify_arg(&CallArg::Int(7), &f.roots, false).unwrap().is_none());
    }

    #[test]
    fn open_for_write_inside_passes() {
        let f = fixture();
        let good = f.sandbox.join("good");
        check_call("open", &[CallArg::Path(&good), CallArg::Text("w")], &f.roots).unwrap();
    }

    #[test]
    fn open_for_write_outside_fails() {
        let f = fixture();
        let bad = f.base.join("bad");
        let err = check_call("open", &[CallArg::Path(&bad), CallArg::Text("w")], &f.roots)
            .unwrap_err();
        assert_eq!(err.violation().unwrap().path, bad);
    }

    #[test]
    fn open_for_read_is_not_verified() {
        let f = fixture();
        let bad = f.base.join("bad-file");
        check_call("open", &[CallArg::Path(&bad), CallArg::Text("r")], &f.roots).unwrap();
        check_call("open", &[CallArg::Path(&bad)], &f.roots).unwrap();
    }

    #[test]
    fn access_read_only_is_not_verified() {
        let f = fixture();
        let bad = f.base.join("bad-file");
        check_call(
            "access",
            &[CallArg::Path(&bad), CallArg::Int(schema::R_OK.into())],
            &f.roots,
        )
        .unwrap();
    }

    #[test]
    fn access_write_is_verified() {
        let f = fixture();
        let inside = f.sandbox.join("x");
        let bad = f.base.join("bad-file");
        let write = CallArg::Int(schema::W_OK.into());
        check_call("access", &[CallArg::Path(&inside), write], &f.roots).unwrap();
        assert!(check_call("access", &[CallArg::Path(&bad), write], &f.roots).is_err());
    }

    #[test]
    fn rename_checks_both_arguments() {
        let f = fixture();
        let inside = f.sandbox.join("good-file");
        let outside = f.base.join("moved");
        let err = check_call(
            "rename",
            &[CallArg::Path(&inside), CallArg::Path(&outside)],
            &f.roots,
        )
        .unwrap_err();
        assert_eq!(err.violation().unwrap().path, f.base);
    }

    #[test]
    fn unknown_operation_passes() {
        let f = fixture();
        let bad = f.base.join("bad-file");
        check_call("read_to_string", &[CallArg::Path(&bad)], &f.roots).unwrap();
    }

    #[test]
    fn repeated_verification_is_stable() {
        let f = fixture();
        let bad = f.base.join("bad-file");
        let first = verify(&bad, &f.roots, false).unwrap_err().to_string();
        let second = verify(&bad, &f.roots, false).unwrap_err().to_string();
        assert_eq!(first, second);
        assert_eq!(
            verify(f.sandbox.join("good-file"), &f.roots, false).unwrap(),
            verify(f.sandbox.join("good-file"), &f.roots, false).unwrap()
        );
    }

    #[tokio::test]
    async fn async_verification_matches_blocking() {
        let f = fixture();
        let roots = Arc::new(f.roots.clone());
        let ok = verify_async(f.sandbox.join("good-file"), roots.clone(), false)
            .await
            .unwrap();
        assert_eq!(ok.as_path(), f.sandbox.join("good-file"));

        let err = verify_async(f.base.join("bad-file"), roots, false)
            .await
            .unwrap_err();
        assert!(err.is_violation());
    }

    /// (operation, positions resolved in full, positions checked by parent)
    const EXPECTED: &[(&str, &[usize], &[usize])] = &[
        ("access", &[0], &[]),
        ("append_file", &[0], &[]),
        ("chown", &[0], &[]),
        ("copy_file", &[1], &[]),
        ("create_dir", &[0], &[]),
        ("create_dir_all", &[0], &[]),
        ("hard_link", &[0], &[1]),
        ("lchown", &[], &[0]),
        ("open", &[0], &[]),
        ("remove_dir", &[], &[0]),
        ("remove_dir_all", &[], &[0]),
        ("remove_file", &[], &[0]),
        ("rename", &[], &[0, 1]),
        ("set_permissions", &[0], &[]),
        ("set_times", &[0], &[]),
        ("symlink", &[], &[1]),
        ("truncate", &[0], &[]),
        ("write_file", &[0], &[]),
    ];

    /// Call arguments with write intent, paths taken from `slots`.
    fn call_args<'a>(operation: &str, slots: [&'a Path; 2]) -> Vec<CallArg<'a>> {
        match operation {
            "access" => vec![CallArg::Path(slots[0]), CallArg::Int(schema::W_OK.into())],
            "open" => vec![CallArg::Path(slots[0]), CallArg::Text("w")],
            _ => vec![CallArg::Path(slots[0]), CallArg::Path(slots[1])],
        }
    }

    fn slot_count(operation: &str) -> usize {
        if matches!(operation, "access" | "open") { 1 } else { 2 }
    }

    #[test]
    fn every_operation_has_an_expectation() {
        let mut listed: Vec<&str> = EXPECTED.iter().map(|(name, _, _)| *name).collect();
        let mut table: Vec<&str> = schema::OPERATIONS.iter().map(|op| op.name).collect();
        listed.sort_unstable();
        table.sort_unstable();
        assert_eq!(listed, table);
    }

    #[test]
    fn every_operation_passes_inside() {
        let f = fixture();
        let inside = f.sandbox.join("good-file");
        for (op, _, _) in EXPECTED {
            check_call(op, &call_args(op, [&inside, &inside]), &f.roots)
                .unwrap_or_else(|e| panic!("{op}: {e}"));
        }
    }

    #[test]
    fn every_operation_checks_exactly_its_path_positions() {
        let f = fixture();
        let inside = f.sandbox.join("good-file");
        let outside = f.base.join("not-yet");

        for (op, targets, links) in EXPECTED {
            for pos in 0..slot_count(op) {
                let mut slots = [inside.as_path(), inside.as_path()];
                slots[pos] = outside.as_path();
                let result = check_call(op, &call_args(op, slots), &f.roots);
                let checked = targets.contains(&pos) || links.contains(&pos);
                assert_eq!(result.is_err(), checked, "{op} position {pos}");
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn every_operation_distinguishes_link_from_target() {
        let f = fixture();
        let inside = f.sandbox.join("good-file");
        let escape = f.sandbox.join("escape");
        std::os::unix::fs::symlink(f.base.join("bad-file"), &escape).unwrap();

        for (op, targets, _) in EXPECTED {
            for pos in 0..slot_count(op) {
                let mut slots = [inside.as_path(), inside.as_path()];
                slots[pos] = escape.as_path();
                let result = check_call(op, &call_args(op, slots), &f.roots);
                assert_eq!(result.is_err(), targets.contains(&pos), "{op} position {pos}");
            }
        }
    }

    #[test]
    fn hard_link_to_an_outside_file_is_denied() {
        let f = fixture();
        let original = f.base.join("bad-file");
        let link = f.sandbox.join("x");
        let err = check_call(
            "hard_link",
            &[CallArg::Path(&original), CallArg::Path(&link)],
            &f.roots,
        )
        .unwrap_err();
        assert_eq!(err.violation().unwrap().path, original);
    }
}
