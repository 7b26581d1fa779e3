//! Content-addressed store of downloaded mod artifacts.
//!
//! Layout under the cache root:
//!
//! ```text
//! artifacts/<version_id>/<filename>
//! artifacts/<version_id>/entry.json
//! artifacts/<version_id>/.<filename>.part   (while downloading)
//! ```
//!
//! Artifacts are immutable once published, so entries are never rewritten
//! unless the recorded hash disagrees with the index.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tokio::sync::Mutex;

use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::download::Downloader;
use crate::error::ModError;
use crate::pack::ModEntry;
use crate::runtime::Runtime;

const ARTIFACTS_DIR: &str = "artifacts";
const ENTRY_FILE: &str = "entry.json";
/// Total attempts when the downloaded bytes fail hash verification.
const INTEGRITY_ATTEMPTS: u32 = 2;

/// Metadata stored next to each cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version_id: String,
    pub project_id: String,
    pub filename: String,
    pub size: u64,
    pub sha512: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    pub status: CacheStatus,
}

pub struct ArtifactCache<'a, R: Runtime, D: Downloader> {
    runtime: &'a R,
    downloader: &'a D,
    root: PathBuf,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    cleanup: SharedCleanupContext,
    verify_contents: bool,
}

impl<'a, R: Runtime, D: Downloader> ArtifactCache<'a, R, D> {
    pub fn new(runtime: &'a R, downloader: &'a D, cache_dir: &Path, cleanup: SharedCleanupContext) -> Self {
        ArtifactCache {
            runtime,
            downloader,
            root: cache_dir.join(ARTIFACTS_DIR),
            in_flight: DashMap::new(),
            cleanup,
            verify_contents: false,
        }
    }

    /// Re-hash cached files on every hit instead of trusting `entry.json`.
    pub fn with_content_verification(mut self) -> Self {
        self.verify_contents = true;
        self
    }

    /// Where the artifact of `entry` lives once cached. `None` for local mods.
    pub fn artifact_path(&self, entry: &ModEntry) -> Option<PathBuf> {
        let version_id = entry.version_id.as_deref()?;
        Some(self.root.join(version_id).join(&entry.filename))
    }

    /// Whether `entry` is cached with metadata matching the index.
    pub fn contains(&self, entry: &ModEntry) -> bool {
        match entry.version_id.as_deref() {
            Some(version_id) => self.is_cached(entry, version_id).unwrap_or(false),
            None => false,
        }
    }

    /// Returns the local path of `entry`'s artifact, downloading it first
    /// when it is missing or does not match the index.
    ///
    /// Concurrent calls for the same version id are serialized: the second
    /// caller waits and then finds a cache hit.
    #[tracing::instrument(skip(self, entry), fields(project = %entry.name))]
    pub async fn ensure(&self, entry: &ModEntry) -> Result<CachedArtifact> {
        let version_id = entry
            .version_id
            .as_deref()
            .ok_or_else(|| anyhow!("{} is a local mod and is not cached", entry.name))?;

        let flight = self
            .in_flight
            .entry(version_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let held = flight.lock().await;
        let result = self.ensure_locked(entry, version_id).await;
        drop(held);
        drop(flight);
        // Only the map's own handle left means nobody is waiting on this id.
        self.in_flight.remove_if(version_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn ensure_locked(&self, entry: &ModEntry, version_id: &str) -> Result<CachedArtifact> {
        let dir = self.root.join(version_id);
        let path = dir.join(&entry.filename);
        if self.is_cached(entry, version_id)? {
            debug!("Cache hit for {} ({})", entry.name, version_id);
            return Ok(CachedArtifact {
                path,
                status: CacheStatus::Hit,
            });
        }

        let url = entry
            .url
            .as_deref()
            .ok_or_else(|| download_error(entry, version_id, "no download url recorded in the index"))?;

        self.runtime
            .create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {:?}", dir))?;
        let part = dir.join(format!(".{}.part", entry.filename));

        let guard = CleanupGuard::new(Arc::clone(&self.cleanup), part.clone());
        let fetched = self.fetch_verified(entry, version_id, url, &part).await;
        if fetched.is_err() && self.runtime.exists(&part) {
            let _ = self.runtime.remove_file(&part);
        }
        guard.success();
        let (size, sha512) = fetched?;

        self.runtime
            .rename(&part, &path)
            .with_context(|| format!("Failed to move {:?} into the cache", part))?;

        let record = CacheEntry {
            version_id: version_id.to_string(),
            project_id: entry.project_id.clone(),
            filename: entry.filename.clone(),
            size,
            sha512,
            fetched_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record).context("Failed to encode cache entry")?;
        self.runtime
            .write(&dir.join(ENTRY_FILE), json.as_bytes())
            .with_context(|| format!("Failed to write cache entry for {}", version_id))?;

        Ok(CachedArtifact {
            path,
            status: CacheStatus::Downloaded,
        })
    }

    /// Downloads into `part`, re-downloading once on a hash mismatch.
    async fn fetch_verified(
        &self,
        entry: &ModEntry,
        version_id: &str,
        url: &str,
        part: &Path,
    ) -> Result<(u64, String)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.downloader
                .download(url, part)
                .await
                .map_err(|e| download_error(entry, version_id, format!("{:#}", e)))?;

            let actual = sha512_file(self.runtime, part)?;
            let expected = match entry.sha512.as_deref() {
                Some(expected) if !expected.eq_ignore_ascii_case(&actual) => expected,
                _ => {
                    let size = self.runtime.file_size(part)?;
                    return Ok((size, actual));
                }
            };

            self.runtime.remove_file(part)?;
            if attempt >= INTEGRITY_ATTEMPTS {
                return Err(ModError::Integrity {
                    project: entry.name.clone(),
                    version_id: version_id.to_string(),
                    expected: expected.to_string(),
                    actual,
                }
                .into());
            }
            warn!("Hash mismatch for {} ({}), downloading again", entry.name, version_id);
        }
    }

    fn is_cached(&self, entry: &ModEntry, version_id: &str) -> Result<bool> {
        let dir = self.root.join(version_id);
        let path = dir.join(&entry.filename);
        let record_path = dir.join(ENTRY_FILE);
        if !self.runtime.exists(&path) || !self.runtime.exists(&record_path) {
            return Ok(false);
        }

        let record: CacheEntry = match self
            .runtime
            .read_to_string(&record_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
        {
            Some(record) => record,
            None => {
                warn!("Ignoring unreadable cache entry {:?}", record_path);
                return Ok(false);
            }
        };

        if record.version_id != version_id || record.filename != entry.filename {
            return Ok(false);
        }
        if self.runtime.file_size(&path)? != record.size {
            debug!("Cached {:?} has the wrong size", path);
            return Ok(false);
        }
        if let Some(expected) = entry.sha512.as_deref() {
            if !expected.eq_ignore_ascii_case(&record.sha512) {
                warn!("Cached {} does not match the index hash, discarding", entry.name);
                return Ok(false);
            }
        }
        if self.verify_contents {
            let actual = sha512_file(self.runtime, &path)?;
            if !actual.eq_ignore_ascii_case(&record.sha512) {
                warn!("Cached {} is corrupt, discarding", entry.name);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn download_error(entry: &ModEntry, version_id: &str, reason: impl Into<String>) -> anyhow::Error {
    ModError::Download {
        project: entry.name.clone(),
        version_id: version_id.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Hex-encoded SHA-512 of a file.
pub fn sha512_file<R: Runtime>(runtime: &R, path: &Path) -> Result<String> {
    let mut reader = runtime.open(path)?;
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
