use anyhow::Result;

use super::{Config, open_pack};
use crate::download::Downloader;
use crate::error::ModError;
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

/// Freezes mods at their current version.
pub fn pin<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>, mods: &[String]) -> Result<()> {
    set_pinned(config, mods, true)
}

pub fn unpin<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>, mods: &[String]) -> Result<()> {
    set_pinned(config, mods, false)
}

#[tracing::instrument(skip(config))]
fn set_pinned<R: Runtime, C: RegistryClient, D: Downloader>(
    config: &Config<R, C, D>,
    mods: &[String],
    pinned: bool,
) -> Result<()> {
    let mut pack = open_pack(config)?;
    let mut unknown = Vec::new();

    for query in mods {
        let Some(project_id) = pack.index.find(query).map(|e| e.project_id.clone()) else {
            unknown.push(query.clone());
            continue;
        };
        if let Some(entry) = pack.index.get_mut(&project_id) {
            if entry.pinned == pinned {
                println!("   unchanged {} {}", entry.name, entry.version);
            } else {
                entry.pinned = pinned;
                let verb = if pinned { "pinned" } else { "unpinned" };
                println!("{:>12} {} {}", verb, entry.name, entry.version);
            }
        }
    }

    pack.save_index(config.runtime.as_ref())?;
    if !unknown.is_empty() {
        return Err(ModError::UnknownMod(unknown.join(", ")).into());
    }
    Ok(())
}
