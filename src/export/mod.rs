//! Modrinth modpack (`.mrpack`) export.
//!
//! An mrpack is a zip holding `modrinth.index.json`, which lists registry
//! downloads, and an `overrides/` tree unpacked over the game directory.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::{StreamExt, TryStreamExt, stream};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ModError;
use crate::pack::{LocalPack, ModEntry, PACK_FILE};
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

pub const MRPACK_INDEX: &str = "modrinth.index.json";
pub const OVERRIDES_DIR: &str = "overrides";
pub const METADATA_FILE: &str = "modsmith.metadata";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackIndex {
    pub format_version: u32,
    pub game: String,
    pub version_id: String,
    pub name: String,
    pub dependencies: BTreeMap<String, String>,
    pub files: Vec<MrpackFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackFile {
    pub path: String,
    pub hashes: BTreeMap<String, String>,
    pub downloads: Vec<String>,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<MrpackEnv>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrpackEnv {
    pub client: String,
    pub server: String,
}

impl MrpackEnv {
    fn client_only() -> Self {
        MrpackEnv {
            client: "required".to_string(),
            server: "unsupported".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output: PathBuf,
    /// Write an unpacked directory instead of a zip.
    pub ci_mode: bool,
    pub server_only: bool,
    pub jobs: usize,
}

#[derive(Debug)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub mods: usize,
    pub overrides: usize,
    /// Client-only mods left out of a server export.
    pub skipped: Vec<String>,
}

/// Builds the mrpack index for `pack`, looking each version's file up in the
/// registry for its hashes.
#[tracing::instrument(skip(registry, pack))]
pub async fn build_index<C: RegistryClient>(
    registry: &C,
    pack: &LocalPack,
    server_only: bool,
    jobs: usize,
) -> Result<(MrpackIndex, Vec<String>)> {
    let metadata = &pack.metadata;
    let loader_version = metadata.loader.version.clone().ok_or_else(|| ModError::PackConfig {
        path: pack.dir.join(PACK_FILE),
        reason: "loader.version must be set to export a modpack".to_string(),
    })?;

    let (skipped, exported): (Vec<&ModEntry>, Vec<&ModEntry>) = pack
        .index
        .managed()
        .partition(|entry| server_only && entry.client_only);

    let files: Vec<MrpackFile> = stream::iter(exported)
        .map(|entry| mrpack_file(registry, entry))
        .buffered(jobs.max(1))
        .try_collect()
        .await?;

    let mut dependencies = BTreeMap::new();
    dependencies.insert("minecraft".to_string(), metadata.game_version.clone());
    dependencies.insert(metadata.loader.loader.mrpack_id().to_string(), loader_version);

    let index = MrpackIndex {
        format_version: 1,
        game: "minecraft".to_string(),
        version_id: metadata.version.clone(),
        name: metadata.name.clone(),
        dependencies,
        files,
    };
    Ok((index, skipped.into_iter().map(|e| e.name.clone()).collect()))
}

async fn mrpack_file<C: RegistryClient>(registry: &C, entry: &ModEntry) -> Result<MrpackFile> {
    let version_id = entry
        .version_id
        .as_deref()
        .with_context(|| format!("{} has no version id", entry.name))?;
    let version = registry
        .get_version(version_id)
        .await
        .with_context(|| format!("Failed to look up {} ({})", entry.name, version_id))?;
    let file = version.primary_file().ok_or_else(|| ModError::IncompatibleVersion {
        project: entry.name.clone(),
        version: entry.version.clone(),
        reason: "it has no primary file".to_string(),
    })?;

    let mut hashes = BTreeMap::new();
    match &file.sha1 {
        Some(sha1) => {
            hashes.insert("sha1".to_string(), sha1.clone());
        }
        None => warn!("Registry reports no sha1 for {}", entry.name),
    }
    if let Some(sha512) = file.sha512.as_ref().or(entry.sha512.as_ref()) {
        hashes.insert("sha512".to_string(), sha512.clone());
    }

    Ok(MrpackFile {
        path: format!("mods/{}", file.filename),
        hashes,
        downloads: vec![file.url.clone()],
        file_size: file.size,
        env: entry.client_only.then(MrpackEnv::client_only),
    })
}

/// Files placed under `overrides/`, as (path inside the pack, source file).
pub fn collect_overrides<R: Runtime>(runtime: &R, pack: &LocalPack) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for dir in pack.metadata.deployed_directories() {
        let source = pack.dir.join(&dir);
        if runtime.is_dir(&source) {
            walk(runtime, &source, &dir, &mut files)?;
        } else {
            debug!("Pack has no {} directory", dir);
        }
    }
    for local in pack.index.local_mods() {
        let source = pack.mods_dir().join(&local.filename);
        if runtime.exists(&source) {
            files.push((format!("mods/{}", local.filename), source));
        }
    }
    Ok(files)
}

fn walk<R: Runtime>(
    runtime: &R,
    dir: &Path,
    prefix: &str,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<()> {
    for path in runtime.read_dir(dir)? {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let archive_path = format!("{}/{}", prefix, name);
        if runtime.is_dir(&path) {
            walk(runtime, &path, &archive_path, out)?;
        } else {
            out.push((archive_path, path));
        }
    }
    Ok(())
}

fn metadata_file(pack: &LocalPack) -> String {
    format!("{}\n{}\n", pack.metadata.name, pack.metadata.version)
}

/// Exports `pack` to `options.output`.
#[tracing::instrument(skip(runtime, registry, pack))]
pub async fn export<R: Runtime, C: RegistryClient>(
    runtime: &R,
    registry: &C,
    pack: &LocalPack,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    let (index, skipped) = build_index(registry, pack, options.server_only, options.jobs).await?;
    let overrides = collect_overrides(runtime, pack)?;
    let json = serde_json::to_string_pretty(&index).context("Failed to encode modrinth.index.json")?;

    if options.ci_mode {
        write_directory(runtime, &options.output, &json, pack, &overrides)?;
    } else {
        write_zip(runtime, &options.output, &json, pack, &overrides)?;
    }

    Ok(ExportSummary {
        output: options.output.clone(),
        mods: index.files.len(),
        overrides: overrides.len(),
        skipped,
    })
}

fn write_directory<R: Runtime>(
    runtime: &R,
    output: &Path,
    index_json: &str,
    pack: &LocalPack,
    overrides: &[(String, PathBuf)],
) -> Result<()> {
    let overrides_dir = output.join(OVERRIDES_DIR);
    runtime.create_dir_all(&overrides_dir)?;
    runtime.write(&output.join(MRPACK_INDEX), index_json.as_bytes())?;
    runtime.write(&overrides_dir.join(METADATA_FILE), metadata_file(pack).as_bytes())?;

    for (archive_path, source) in overrides {
        let dest = overrides_dir.join(archive_path);
        if let Some(parent) = dest.parent() {
            runtime.create_dir_all(parent)?;
        }
        let mut reader = runtime.open(source)?;
        let mut writer = runtime.create_file(&dest)?;
        std::io::copy(&mut reader, &mut writer)
            .with_context(|| format!("Failed to copy {:?} to {:?}", source, dest))?;
    }
    Ok(())
}

fn write_zip<R: Runtime>(
    runtime: &R,
    output: &Path,
    index_json: &str,
    pack: &LocalPack,
    overrides: &[(String, PathBuf)],
) -> Result<()> {
    // zip needs Write + Seek, so the archive is assembled in memory.
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MRPACK_INDEX, options)?;
    zip.write_all(index_json.as_bytes())?;
    zip.start_file(format!("{}/{}", OVERRIDES_DIR, METADATA_FILE), options)?;
    zip.write_all(metadata_file(pack).as_bytes())?;

    for (archive_path, source) in overrides {
        let mut contents = Vec::new();
        runtime
            .open(source)?
            .read_to_end(&mut contents)
            .with_context(|| format!("Failed to read {:?}", source))?;
        zip.start_file(format!("{}/{}", OVERRIDES_DIR, archive_path), options)?;
        zip.write_all(&contents)?;
    }

    let bytes = zip.finish().context("Failed to finish mrpack archive")?.into_inner();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        runtime.create_dir_all(parent)?;
    }
    let part = output.with_extension("mrpack.part");
    runtime.write(&part, &bytes)?;
    runtime.rename(&part, output)?;
    Ok(())
}
