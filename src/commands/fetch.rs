use anyhow::{Result, bail};
use futures_util::{StreamExt, stream};
use log::warn;

use crate::cache::{ArtifactCache, CacheStatus};
use crate::download::Downloader;
use crate::error::ModError;
use crate::pack::ModEntry;
use crate::runtime::Runtime;

#[derive(Debug, Default)]
pub(crate) struct FetchOutcome {
    pub downloaded: usize,
    pub cached: usize,
    /// Project id and display name of each entry that could not be fetched.
    pub failed: Vec<(String, String)>,
}

impl FetchOutcome {
    /// Fails when an explicitly requested mod could not be fetched. Other
    /// failures only warn, since `download` can retry them later.
    pub fn check_roots(&self, roots: &[String]) -> Result<()> {
        let failed_roots: Vec<&str> = self
            .failed
            .iter()
            .filter(|(id, _)| roots.contains(id))
            .map(|(_, name)| name.as_str())
            .collect();
        if !failed_roots.is_empty() {
            bail!("Failed to download {}", failed_roots.join(", "));
        }
        if !self.failed.is_empty() {
            warn!(
                "{} dependencies failed to download, run `modsmith download` to retry",
                self.failed.len()
            );
        }
        Ok(())
    }

    pub fn check_all(&self) -> Result<()> {
        if self.failed.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = self.failed.iter().map(|(_, name)| name.as_str()).collect();
        bail!("Failed to download {}", names.join(", "))
    }
}

/// Category of a failed fetch for progress output.
fn failure_category(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<ModError>().map_or("error", ModError::category)
}

/// Ensures every entry is cached, at most `jobs` downloads at a time.
#[tracing::instrument(skip(cache, entries))]
pub(crate) async fn fetch_all<R: Runtime, D: Downloader>(
    cache: &ArtifactCache<'_, R, D>,
    entries: &[ModEntry],
    jobs: usize,
) -> FetchOutcome {
    let mut results = stream::iter(entries.iter().filter(|e| !e.local))
        .map(|entry| async move { (entry, cache.ensure(entry).await) })
        .buffer_unordered(jobs.max(1));

    let mut outcome = FetchOutcome::default();
    while let Some((entry, result)) = results.next().await {
        match result {
            Ok(artifact) if artifact.status == CacheStatus::Downloaded => {
                println!("  downloaded {} {}", entry.name, entry.version);
                outcome.downloaded += 1;
            }
            Ok(_) => {
                println!("      cached {} {}", entry.name, entry.version);
                outcome.cached += 1;
            }
            Err(e) => {
                eprintln!("      failed {} [{}]: {:#}", entry.name, failure_category(&e), e);
                outcome.failed.push((entry.project_id.clone(), entry.name.clone()));
            }
        }
    }
    outcome
}
