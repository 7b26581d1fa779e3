//! Removal of half-written files when a batch is interrupted.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Temporary paths that must not survive an interrupted run.
#[derive(Debug, Default)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Deletes every registered path. Errors are logged, not returned: this
    /// runs on the way out of the process.
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            debug!("Removing partial file {:?}", path);
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
    }
}

pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Runs `f` on the shared context. A poisoned lock still holds a usable list.
pub fn with_context<T>(ctx: &SharedCleanupContext, f: impl FnOnce(&mut CleanupContext) -> T) -> T {
    let mut guard = ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Keeps a path registered until [`CleanupGuard::success`] is called.
/// Dropping the guard without success leaves the path registered.
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        with_context(&ctx, |c| c.add(path.clone()));
        Self { ctx, path }
    }

    pub fn success(self) {
        with_context(&self.ctx, |c| c.remove(&self.path));
    }
}
