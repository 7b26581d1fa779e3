//! Lexical path helpers.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// A `..` that would climb above the root is kept as-is.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Returns true if `path` lies inside `dir` (or is `dir` itself) after both are normalized.
///
/// Used to make sure entries declared in pack configuration, such as extra
/// symlinked directories, cannot escape the pack with `../` segments.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    let path = normalize_path(path);
    let dir = normalize_path(dir);
    path.starts_with(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_drops_dots() {
        assert_eq!(
            normalize_path(Path::new("/packs/./skyblock/./config")),
            PathBuf::from("/packs/skyblock/config")
        );
    }

    #[test]
    fn test_normalize_path_resolves_parent() {
        assert_eq!(
            normalize_path(Path::new("/packs/skyblock/mods/../config")),
            PathBuf::from("/packs/skyblock/config")
        );
        assert_eq!(
            normalize_path(Path::new("kubejs/../../outside")),
            PathBuf::from("../outside")
        );
    }

    #[test]
    fn test_normalize_path_only_dots() {
        assert_eq!(normalize_path(Path::new("./././.")), PathBuf::from(""));
    }

    #[test]
    fn test_is_path_under_inside() {
        let pack = Path::new("/packs/skyblock");
        assert!(is_path_under(Path::new("/packs/skyblock/kubejs"), pack));
        assert!(is_path_under(Path::new("/packs/skyblock"), pack));
        assert!(is_path_under(Path::new("/packs/skyblock/./config/../defaultconfigs"), pack));
    }

    #[test]
    fn test_is_path_under_rejects_escape() {
        let pack = Path::new("/packs/skyblock");
        assert!(!is_path_under(Path::new("/packs/skyblock/../other"), pack));
        assert!(!is_path_under(Path::new("/packs/skyblock-extra"), pack));
        assert!(!is_path_under(Path::new("/packs"), pack));
    }

    #[cfg(windows)]
    #[test]
    fn test_is_path_under_windows() {
        let pack = Path::new("C:\\packs\\skyblock");
        assert!(is_path_under(Path::new("C:\\packs\\skyblock\\config"), pack));
        assert!(!is_path_under(Path::new("C:\\packs\\skyblock\\..\\other"), pack));
    }
}
