use std::path::PathBuf;

use anyhow::{Result, bail};

use super::config::absolutize;
use super::{Config, artifact_cache, open_pack};
use crate::cleanup::new_shared;
use crate::deploy::{DeploySource, DeploymentReconciler, instance_game_dir};
use crate::download::Downloader;
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

/// Where to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployTarget {
    Directory(PathBuf),
    Instance(String),
    /// The instance named in `localpack.toml`.
    Default,
}

/// Links the pack into a game directory or Prism instance.
#[tracing::instrument(skip(config))]
pub fn deploy<R: Runtime, C: RegistryClient, D: Downloader>(
    config: &Config<R, C, D>,
    target: DeployTarget,
) -> Result<()> {
    let runtime = config.runtime.as_ref();
    let pack = open_pack(config)?;

    let target_dir = match target {
        DeployTarget::Directory(dir) => absolutize(runtime, &dir)?,
        DeployTarget::Instance(name) => instance_game_dir(runtime, &name)?,
        DeployTarget::Default => match &pack.local.instance_name {
            Some(name) => instance_game_dir(runtime, name)?,
            None => bail!("No deploy target: pass --directory or --instance, or set instance_name in localpack.toml"),
        },
    };
    println!("   deploying {} to {}", pack.metadata.name, target_dir.display());

    // Save the index so local jars picked up above stay recorded.
    pack.save_index(runtime)?;

    let cache = artifact_cache(config, new_shared());
    let source = DeploySource {
        pack_dir: &pack.dir,
        index: &pack.index,
        directories: pack.metadata.deployed_directories(),
        extra_dirs: &pack.local.extra_symlinked_dirs,
    };
    let report = DeploymentReconciler::new(runtime, &cache).deploy(&source, &target_dir)?;

    for name in &report.linked_mods {
        println!("      linked {}", name);
    }
    for dir in &report.linked_dirs {
        println!("      linked {}/", dir);
    }
    for name in &report.disabled {
        println!("    disabled {}", name);
    }
    for dir in &report.missing_dirs {
        println!("     missing {}/", dir);
    }
    for failure in &report.failures {
        eprintln!("      failed [{}] {}", failure.category(), failure);
    }
    println!(
        "Linked {} mods and {} directories, removed {} old links",
        report.linked_mods.len(),
        report.linked_dirs.len(),
        report.removed_links
    );

    if !report.is_success() {
        bail!("{} path(s) could not be deployed", report.failures.len());
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::commands::download;
    use crate::commands::test_support::{config, echo_downloader, write_pack};
    use crate::download::MockDownloader;
    use crate::pack::{ModIndex, test_entry};
    use crate::registry::MockRegistryClient;
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_deploy_to_directory() {
        let pack_dir = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        let game_dir = tempdir().unwrap();
        write_pack(pack_dir.path());
        fs::create_dir_all(pack_dir.path().join("config")).unwrap();
        let mut index = ModIndex::default();
        index.upsert(test_entry("sodium", "s1", &[]));
        index.save(&RealRuntime, pack_dir.path()).unwrap();

        let fill = config(pack_dir.path(), cache_dir.path(), MockRegistryClient::new(), echo_downloader());
        download(&fill).await.unwrap();

        let config = config(pack_dir.path(), cache_dir.path(), MockRegistryClient::new(), MockDownloader::new());
        deploy(&config, DeployTarget::Directory(game_dir.path().to_path_buf())).unwrap();

        let link = game_dir.path().join("mods/sodium-s1.jar");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(fs::symlink_metadata(game_dir.path().join("config")).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_deploy_without_target_fails() {
        let pack_dir = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        write_pack(pack_dir.path());
        let config = config(pack_dir.path(), cache_dir.path(), MockRegistryClient::new(), MockDownloader::new());

        let err = deploy(&config, DeployTarget::Default).unwrap_err();
        assert!(err.to_string().contains("No deploy target"));
    }
}
