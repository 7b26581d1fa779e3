use anyhow::Result;

use super::fetch::fetch_all;
use super::{Config, artifact_cache, interruptible, open_pack};
use crate::cleanup::new_shared;
use crate::download::Downloader;
use crate::registry::RegistryClient;
use crate::resolve::DependencyResolver;
use crate::runtime::Runtime;

/// Moves every unpinned mod to its newest compatible version and drops
/// dependencies nothing requires anymore.
#[tracing::instrument(skip(config))]
pub async fn update<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>) -> Result<()> {
    let mut pack = open_pack(config)?;
    if pack.index.managed().next().is_none() {
        println!("No mods to update.");
        return pack.save_index(config.runtime.as_ref());
    }

    let constraints = pack.metadata.constraints();
    let resolution = DependencyResolver::new(&config.registry, &constraints)
        .update(&pack.index)
        .await?;

    for note in &resolution.skipped {
        println!("     skipped {}", note);
    }
    for entry in &resolution.pruned {
        println!("     removed {} (no longer required)", entry.name);
    }
    if resolution.changed.is_empty() && resolution.pruned.is_empty() {
        println!("Everything is up to date.");
    }

    let cleanup = new_shared();
    let cache = artifact_cache(config, cleanup.clone());
    let outcome = interruptible(cleanup, fetch_all(&cache, &resolution.changed, config.jobs)).await;

    pack.index = resolution.index;
    pack.save_index(config.runtime.as_ref())?;
    outcome.check_roots(&resolution.roots)
}
