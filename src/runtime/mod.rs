//! Everything that touches the machine: files, symlinks, environment and
//! platform directories.
//!
//! Code that works on a pack or the cache takes a `&impl Runtime` so tests can
//! run it against a [`MockRuntime`] or a temporary directory.

mod env;
mod fs;
pub mod path;
mod symlink;

use anyhow::Result;
use std::env as std_env;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub use path::{is_path_under, normalize_path};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;
    fn current_dir(&self) -> Result<PathBuf>;
    /// Base for the artifact cache, e.g. `~/.cache` on Linux.
    fn cache_dir(&self) -> Option<PathBuf>;
    /// Where launchers keep their data, e.g. `~/.local/share` on Linux.
    fn data_dir(&self) -> Option<PathBuf>;

    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
    /// Creates or truncates `path`.
    fn create_file(&self, path: &Path) -> Result<Box<dyn Write + Send>>;
    fn file_size(&self, path: &Path) -> Result<u64>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    /// Entries of `path`, sorted.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Follows symlinks, so a dangling link does not exist.
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Creates `link` pointing at `original`, a file or a directory.
    fn symlink(&self, original: &Path, link: &Path) -> Result<()>;
    /// True for any symlink, including one whose target is gone.
    fn is_symlink(&self, path: &Path) -> bool;
    /// Removes the link itself, never its target.
    fn remove_symlink(&self, path: &Path) -> Result<()>;
}

/// [`Runtime`] backed by `std::fs` and the `dirs` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        std_env::var(key)
    }

    fn current_dir(&self) -> Result<PathBuf> {
        env::current_dir()
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        dirs::cache_dir()
    }

    fn data_dir(&self) -> Option<PathBuf> {
        dirs::data_dir()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        fs::open(path)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        fs::create(path)
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        fs::file_size(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir_sorted(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        symlink::create(original, link)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        symlink::is_symlink(path)
    }

    fn remove_symlink(&self, path: &Path) -> Result<()> {
        symlink::remove(path)
    }
}
