//! Lexical containment checks between already-resolved paths.

use std::path::{Component, Path, PathBuf};

/// Relative path from `from` to `to`, computed component-wise.
///
/// When the two paths do not share an anchor (different drive, or one is
/// relative and the other absolute) `to` is returned unchanged.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();
    let to_components: Vec<Component<'_>> = to
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    if anchor(&from) != anchor(&to_components) {
        return to.to_path_buf();
    }

    let common = from
        .iter()
        .zip(&to_components)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push(Component::ParentDir.as_os_str());
    }
    for component in &to_components[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

fn anchor<'a>(components: &'a [Component<'a>]) -> &'a [Component<'a>] {
    let len = components
        .iter()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .count();
    &components[..len]
}

/// Whether `candidate` lies under `root`.
///
/// With `inclusive`, a candidate equal to the root counts as contained.
pub fn is_contained(candidate: &Path, root: &Path, inclusive: bool) -> bool {
    let relative = relative_path(root, candidate);
    match relative.components().next() {
        None => inclusive,
        // Rejects `..`, `../x`, and anything carrying its own root or drive.
        Some(Component::Normal(_)) => true,
        Some(_) => false,
    }
}
