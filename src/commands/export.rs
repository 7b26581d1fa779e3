use std::path::PathBuf;

use anyhow::Result;

use super::config::absolutize;
use super::{Config, open_pack};
use crate::download::Downloader;
use crate::export::{self as mrpack, ExportOptions};
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

/// Writes the pack as a Modrinth modpack. Without `output` the file lands in
/// the pack directory as `<name>-<version>.mrpack`.
#[tracing::instrument(skip(config))]
pub async fn export<R: Runtime, C: RegistryClient, D: Downloader>(
    config: &Config<R, C, D>,
    output: Option<PathBuf>,
    ci_mode: bool,
    server_only: bool,
) -> Result<()> {
    let runtime = config.runtime.as_ref();
    let pack = open_pack(config)?;

    let output = match output {
        Some(path) => absolutize(runtime, &path)?,
        None => pack.dir.join(default_file_name(&pack.metadata.name, &pack.metadata.version, ci_mode)),
    };
    let options = ExportOptions {
        output,
        ci_mode,
        server_only,
        jobs: config.jobs,
    };

    let summary = mrpack::export(runtime, &config.registry, &pack, &options).await?;
    for name in &summary.skipped {
        println!("     skipped {} (client only)", name);
    }
    println!(
        "    exported {} mods and {} override files to {}",
        summary.mods,
        summary.overrides,
        summary.output.display()
    );
    Ok(())
}

fn default_file_name(name: &str, version: &str, ci_mode: bool) -> String {
    let stem: String = format!("{}-{}", name, version)
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if ci_mode { stem } else { format!("{}.mrpack", stem) }
}
