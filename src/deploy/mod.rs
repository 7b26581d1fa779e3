//! Reconciles a game directory with the pack through symlinks.
//!
//! Every run first removes all symlinks under the managed paths, then links
//! the cached artifact of each indexed mod into `mods/` and each deployed
//! directory of the pack into place. Regular files in the target are never
//! touched, except a real directory standing where a deployed directory goes.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use log::{debug, info, warn};

use crate::cache::ArtifactCache;
use crate::download::Downloader;
use crate::error::ModError;
use crate::pack::{ModEntry, ModIndex, is_within_mods};
use crate::runtime::{Runtime, normalize_path};

pub mod prism;

pub use prism::instance_game_dir;

/// Suffix a player adds next to a mod in the target to keep it from being deployed.
pub const DISABLED_SUFFIX: &str = ".disabled";

/// Lookup of already-downloaded artifacts.
pub trait ArtifactSource {
    fn cached_path(&self, entry: &ModEntry) -> Option<PathBuf>;
}

impl<R: Runtime, D: Downloader> ArtifactSource for ArtifactCache<'_, R, D> {
    fn cached_path(&self, entry: &ModEntry) -> Option<PathBuf> {
        if self.contains(entry) {
            self.artifact_path(entry)
        } else {
            None
        }
    }
}

/// What to deploy.
#[derive(Debug, Clone)]
pub struct DeploySource<'a> {
    pub pack_dir: &'a Path,
    pub index: &'a ModIndex,
    /// Pack directories linked as a whole, in order. `config` comes first.
    pub directories: Vec<String>,
    /// Machine-local directories linked after the pack's own.
    pub extra_dirs: &'a [String],
}

#[derive(Debug, Default)]
pub struct DeployReport {
    pub removed_links: usize,
    pub linked_mods: Vec<String>,
    pub linked_dirs: Vec<String>,
    /// Mods skipped because a `.disabled` twin sits in the target.
    pub disabled: Vec<String>,
    /// Deployed directories the pack does not have.
    pub missing_dirs: Vec<String>,
    pub failures: Vec<ModError>,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct DeploymentReconciler<'a, R: Runtime, A: ArtifactSource> {
    runtime: &'a R,
    artifacts: &'a A,
}

impl<'a, R: Runtime, A: ArtifactSource> DeploymentReconciler<'a, R, A> {
    pub fn new(runtime: &'a R, artifacts: &'a A) -> Self {
        DeploymentReconciler { runtime, artifacts }
    }

    /// Deploys `source` into `target`.
    ///
    /// Fails without touching the target when an indexed mod has no cached
    /// artifact. Per-path failures after that are collected in the report.
    #[tracing::instrument(skip(self, source))]
    pub fn deploy(&self, source: &DeploySource<'_>, target: &Path) -> Result<DeployReport> {
        let mut managed = Vec::new();
        let mut missing = Vec::new();
        for entry in source.index.managed() {
            match self.artifacts.cached_path(entry) {
                Some(path) => managed.push((entry, path)),
                None => missing.push(entry.name.as_str()),
            }
        }
        if !missing.is_empty() {
            bail!(
                "{} mod(s) are not downloaded: {}. Run `modsmith download` first",
                missing.len(),
                missing.join(", ")
            );
        }

        let pack_dir = self.absolute(source.pack_dir);
        let target = self.absolute(target);
        let same_dir = pack_dir == target;
        let mods_dir = target.join("mods");
        self.runtime.create_dir_all(&mods_dir)?;

        let mut report = DeployReport::default();
        let mut directories: Vec<&String> = Vec::new();
        for dir in source.directories.iter().chain(source.extra_dirs) {
            if is_within_mods(dir) {
                report.failures.push(conflict(
                    &target.join(dir.as_str()),
                    "mods/ holds one link per mod and cannot be linked as a directory",
                ));
            } else {
                directories.push(dir);
            }
        }

        // Managed links go first so renamed or removed mods leave nothing behind.
        let mut stale: Vec<PathBuf> = self
            .runtime
            .read_dir(&mods_dir)?
            .into_iter()
            .filter(|p| self.runtime.is_symlink(p))
            .collect();
        stale.extend(
            directories
                .iter()
                .map(|d| target.join(d.as_str()))
                .filter(|p| self.runtime.is_symlink(p)),
        );
        for link in stale {
            match self.runtime.remove_symlink(&link) {
                Ok(()) => report.removed_links += 1,
                Err(e) => report.failures.push(conflict(&link, format!("{:#}", e))),
            }
        }

        for (entry, artifact) in &managed {
            self.link_mod(&mods_dir, &entry.filename, artifact, &mut report);
        }
        if !same_dir {
            for local in source.index.local_mods() {
                let original = pack_dir.join("mods").join(&local.filename);
                self.link_mod(&mods_dir, &local.filename, &original, &mut report);
            }
        }

        if same_dir {
            warn!("Deploying into the pack directory itself, directories are left alone");
        } else {
            for dir in directories {
                self.link_dir(&pack_dir, &target, dir, &mut report);
            }
        }

        info!(
            "Deployed {} mods and {} directories to {:?}",
            report.linked_mods.len(),
            report.linked_dirs.len(),
            target
        );
        Ok(report)
    }

    fn link_mod(&self, mods_dir: &Path, filename: &str, original: &Path, report: &mut DeployReport) {
        let link = mods_dir.join(filename);
        if self
            .runtime
            .exists(&mods_dir.join(format!("{}{}", filename, DISABLED_SUFFIX)))
        {
            debug!("{} is disabled in the target", filename);
            report.disabled.push(filename.to_string());
            return;
        }
        if self.runtime.is_symlink(&link) || self.runtime.exists(&link) {
            report
                .failures
                .push(conflict(&link, "a file not managed by modsmith is in the way"));
            return;
        }
        match self.runtime.symlink(original, &link) {
            Ok(()) => report.linked_mods.push(filename.to_string()),
            Err(e) => report.failures.push(conflict(&link, format!("{:#}", e))),
        }
    }

    fn link_dir(&self, pack_dir: &Path, target: &Path, dir: &str, report: &mut DeployReport) {
        let original = pack_dir.join(dir);
        if !self.runtime.is_dir(&original) {
            debug!("Pack has no {} directory", dir);
            report.missing_dirs.push(dir.to_string());
            return;
        }

        let link = target.join(dir);
        if self.runtime.is_symlink(&link) {
            report
                .failures
                .push(conflict(&link, "the previous link could not be removed"));
            return;
        }
        if self.runtime.exists(&link) {
            // The target copy is derived from the pack and is discarded.
            warn!("Replacing {:?} with a link to the pack", link);
            let removed = if self.runtime.is_dir(&link) {
                self.runtime.remove_dir_all(&link)
            } else {
                self.runtime.remove_file(&link)
            };
            if let Err(e) = removed {
                report.failures.push(conflict(&link, format!("{:#}", e)));
                return;
            }
        }

        let created = match link.parent() {
            Some(parent) => self.runtime.create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| self.runtime.symlink(&original, &link));
        match created {
            Ok(()) => report.linked_dirs.push(dir.to_string()),
            Err(e) => report.failures.push(conflict(&link, format!("{:#}", e))),
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        self.runtime
            .canonicalize(path)
            .unwrap_or_else(|_| normalize_path(path))
    }
}

fn conflict(path: &Path, reason: impl Into<String>) -> ModError {
    ModError::FilesystemConflict {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
