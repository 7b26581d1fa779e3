use anyhow::Result;

use super::fetch::fetch_all;
use super::{Config, artifact_cache, interruptible, open_pack};
use crate::cleanup::new_shared;
use crate::download::Downloader;
use crate::pack::ModEntry;
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

/// Makes sure every indexed mod is in the cache, re-checking cached files
/// against their recorded hashes.
#[tracing::instrument(skip(config))]
pub async fn download<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>) -> Result<()> {
    let pack = open_pack(config)?;
    let entries: Vec<ModEntry> = pack.index.managed().cloned().collect();
    if entries.is_empty() {
        println!("No mods to download.");
        return Ok(());
    }

    let cleanup = new_shared();
    let cache = artifact_cache(config, cleanup.clone()).with_content_verification();
    let outcome = interruptible(cleanup, fetch_all(&cache, &entries, config.jobs)).await;

    println!(
        "{} downloaded, {} already cached, {} failed",
        outcome.downloaded,
        outcome.cached,
        outcome.failed.len()
    );
    outcome.check_all()
}
