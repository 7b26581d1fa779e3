use anyhow::{Result, bail};

use super::fetch::fetch_all;
use super::{Config, artifact_cache, interruptible, open_pack};
use crate::cleanup::new_shared;
use crate::download::Downloader;
use crate::registry::RegistryClient;
use crate::resolve::{DependencyResolver, ModRequest};
use crate::runtime::Runtime;

/// Adds the requested mods and their required dependencies, downloads what
/// changed, then writes the index.
#[tracing::instrument(skip(config))]
pub async fn add<R: Runtime, C: RegistryClient, D: Downloader>(
    config: &Config<R, C, D>,
    requests: &[ModRequest],
) -> Result<()> {
    if requests.is_empty() {
        bail!("Nothing to add: pass --project, --version or --search");
    }

    let mut pack = open_pack(config)?;
    let constraints = pack.metadata.constraints();
    for request in requests {
        println!("   resolving {}", request);
    }

    let resolution = DependencyResolver::new(&config.registry, &constraints)
        .add(requests, &pack.index)
        .await?;
    for note in &resolution.skipped {
        println!("     skipped {}", note);
    }
    if resolution.changed.is_empty() {
        println!("Nothing changed.");
    }

    let cleanup = new_shared();
    let cache = artifact_cache(config, cleanup.clone());
    let outcome = interruptible(cleanup, fetch_all(&cache, &resolution.changed, config.jobs)).await;

    pack.index = resolution.index;
    pack.save_index(config.runtime.as_ref())?;
    outcome.check_roots(&resolution.roots)
}
