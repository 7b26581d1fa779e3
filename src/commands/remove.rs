use anyhow::Result;

use super::{Config, open_pack};
use crate::download::Downloader;
use crate::error::ModError;
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

/// Removes mods from the index, along with dependencies nothing else needs.
#[tracing::instrument(skip(config))]
pub fn remove<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>, mods: &[String]) -> Result<()> {
    let mut pack = open_pack(config)?;
    let mut unknown = Vec::new();

    for query in mods {
        let Some(entry) = pack.index.find(query).cloned() else {
            unknown.push(query.clone());
            continue;
        };
        if entry.local {
            eprintln!(
                "     skipped {} (local jar, delete mods/{} instead)",
                entry.name, entry.filename
            );
            continue;
        }
        pack.index.remove(&entry.project_id);
        println!("     removed {} {}", entry.name, entry.version);
    }

    for orphan in pack.index.prune_orphans() {
        println!("     removed {} (no longer required)", orphan.name);
    }

    pack.save_index(config.runtime.as_ref())?;
    if !unknown.is_empty() {
        return Err(ModError::UnknownMod(unknown.join(", ")).into());
    }
    Ok(())
}
