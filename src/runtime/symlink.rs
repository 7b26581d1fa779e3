use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

#[tracing::instrument]
pub(super) fn create(original: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(original, link)
        .with_context(|| format!("Failed to link {:?} to {:?}", link, original))?;

    // Windows needs to know the kind of target up front. Deploy always links
    // absolute paths, so `is_dir` sees the real target.
    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};
        let created = if original.is_dir() {
            symlink_dir(original, link)
        } else {
            symlink_file(original, link)
        };
        created.with_context(|| {
            format!(
                "Failed to link {:?} to {:?} (Windows needs Developer Mode or admin rights for symlinks)",
                link, original
            )
        })?;
    }
    Ok(())
}

pub(super) fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

#[tracing::instrument]
pub(super) fn remove(path: &Path) -> Result<()> {
    // A directory link on Windows is removed as a directory.
    #[cfg(windows)]
    if fs::remove_dir(path).is_ok() {
        return Ok(());
    }
    fs::remove_file(path).with_context(|| format!("Failed to remove link {:?}", path))
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use tempfile::tempdir;

    #[cfg_attr(
        modsmith_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set MODSMITH_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_directory_link() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let config = dir.path().join("pack/config");
        runtime.create_dir_all(&config).unwrap();
        runtime.write(&config.join("sodium-options.json"), b"{}").unwrap();

        let link = dir.path().join("config");
        runtime.symlink(&config, &link).unwrap();
        assert!(runtime.is_symlink(&link));
        assert!(!runtime.is_symlink(&config));
        assert!(runtime.exists(&link.join("sodium-options.json")));
        assert_eq!(runtime.canonicalize(&link).unwrap(), runtime.canonicalize(&config).unwrap());

        runtime.remove_symlink(&link).unwrap();
        assert!(!runtime.exists(&link));
        assert!(runtime.exists(&config.join("sodium-options.json")));
    }

    #[cfg_attr(
        modsmith_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set MODSMITH_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_file_link() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("sodium-0.5.8.jar");
        runtime.write(&artifact, b"jar").unwrap();

        let link = dir.path().join("mods-sodium.jar");
        runtime.symlink(&artifact, &link).unwrap();
        assert_eq!(runtime.read_to_string(&link).unwrap(), "jar");

        runtime.remove_symlink(&link).unwrap();
        assert!(runtime.exists(&artifact));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_link_is_still_a_link() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("evicted.jar");
        let link = dir.path().join("link.jar");
        runtime.write(&artifact, b"x").unwrap();
        runtime.symlink(&artifact, &link).unwrap();
        runtime.remove_file(&artifact).unwrap();

        assert!(!runtime.exists(&link));
        assert!(runtime.is_symlink(&link));
        runtime.remove_symlink(&link).unwrap();
        assert!(!runtime.is_symlink(&link));
    }
}
