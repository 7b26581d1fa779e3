//! Locating Prism Launcher instances.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use log::debug;

use crate::runtime::Runtime;

const PRISM_DIR: &str = "PrismLauncher";
const PRISM_CONFIG: &str = "prismlauncher.cfg";
const DEFAULT_INSTANCE_DIR: &str = "instances";

/// Value of `key=` in a Prism config file, resolved against `base_dir` when relative.
pub fn config_subdir(base_dir: &Path, config: &str, key: &str, default: &str) -> PathBuf {
    let value = config
        .lines()
        .filter_map(|line| line.trim().strip_prefix(key)?.strip_prefix('='))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(default);

    let dir = PathBuf::from(value);
    if dir.is_absolute() { dir } else { base_dir.join(dir) }
}

/// Prism's instances directory, honouring `InstanceDir` in its config.
pub fn instances_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let base = runtime
        .data_dir()
        .ok_or_else(|| anyhow!("Cannot determine the user data directory"))?
        .join(PRISM_DIR);
    let config_path = base.join(PRISM_CONFIG);
    let config = if runtime.exists(&config_path) {
        runtime.read_to_string(&config_path)?
    } else {
        debug!("No {:?}, assuming default instance directory", config_path);
        String::new()
    };
    Ok(config_subdir(&base, &config, "InstanceDir", DEFAULT_INSTANCE_DIR))
}

/// The game directory of a named instance: its `.minecraft` or `minecraft` subdirectory.
#[tracing::instrument(skip(runtime))]
pub fn instance_game_dir<R: Runtime>(runtime: &R, instance: &str) -> Result<PathBuf> {
    let instance_dir = instances_dir(runtime)?.join(instance);
    [".minecraft", "minecraft"]
        .iter()
        .map(|sub| instance_dir.join(sub))
        .find(|dir| runtime.is_dir(dir))
        .ok_or_else(|| anyhow!("Can't find the .minecraft directory of Prism instance {:?}", instance_dir))
}
