use anyhow::Result;
use std::future::Future;
use std::sync::Arc;

use crate::{
    cache::ArtifactCache,
    cleanup::{SharedCleanupContext, with_context},
    download::Downloader,
    pack::LocalPack,
    registry::RegistryClient,
    runtime::Runtime,
};

mod add;
pub mod config;
mod deploy;
mod download;
mod export;
mod fetch;
mod list;
mod pin;
mod remove;
mod update;

pub use add::add;
pub use config::{Config, GlobalOptions};
pub use deploy::{DeployTarget, deploy};
pub use download::download;
pub use export::export;
pub use list::list;
pub use pin::{pin, unpin};
pub use remove::remove;
pub use update::update;

/// Loads the pack and picks up jars dropped into or deleted from its `mods/`.
fn open_pack<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>) -> Result<LocalPack> {
    let runtime = config.runtime.as_ref();
    let mut pack = LocalPack::load(runtime, &config.pack_dir)?;
    let (added, removed) = pack.index.sync_local_mods(runtime, &pack.dir)?;
    for filename in added {
        println!("       local {}", filename);
    }
    for filename in removed {
        println!("     dropped {} (file is gone)", filename);
    }
    Ok(pack)
}

fn artifact_cache<'a, R: Runtime, C: RegistryClient, D: Downloader>(
    config: &'a Config<R, C, D>,
    cleanup: SharedCleanupContext,
) -> ArtifactCache<'a, R, D> {
    ArtifactCache::new(config.runtime.as_ref(), &config.downloader, &config.cache_dir, cleanup)
}

/// Runs `work` with a Ctrl-C handler that removes partial downloads and
/// exits with status 130.
async fn interruptible<T>(cleanup: SharedCleanupContext, work: impl Future<Output = T>) -> T {
    let ctx = Arc::clone(&cleanup);
    let ctrl_c_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            with_context(&ctx, |c| c.cleanup());
            std::process::exit(130);
        }
    });

    let result = work.await;
    ctrl_c_handler.abort();
    result
}
