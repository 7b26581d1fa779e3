//! `pack.toml` and `localpack.toml`.

use std::path::Path;

use anyhow::Result;
use log::debug;
use serde::Deserialize;

use crate::error::ModError;
use crate::registry::{Loader, ReleaseChannel};
use crate::runtime::Runtime;

pub const PACK_FILE: &str = "pack.toml";
pub const LOCAL_PACK_FILE: &str = "localpack.toml";
pub const MODS_DIR: &str = "mods";

/// Pack-wide configuration. Read-only to this tool.
#[derive(Debug, Clone, PartialEq)]
pub struct PackMetadata {
    pub name: String,
    pub version: String,
    pub game_version: String,
    pub include_directories: Vec<String>,
    pub channel: ReleaseChannel,
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    pub loader: Loader,
    pub version: Option<String>,
    pub compat_mode: bool,
}

/// The subset of pack configuration that drives resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PackConstraints {
    pub game_version: String,
    pub loader: Loader,
    pub compat_mode: bool,
    pub channel: ReleaseChannel,
}

/// Machine-local deployment settings, never exported.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LocalMetadata {
    pub instance_name: Option<String>,
    #[serde(default)]
    pub extra_symlinked_dirs: Vec<String>,
}

#[derive(Deserialize)]
struct RawPack {
    name: String,
    version: String,
    game_version: String,
    #[serde(default)]
    include_directories: Vec<String>,
    #[serde(default)]
    channel: ReleaseChannel,
    loader: RawLoader,
}

#[derive(Deserialize)]
struct RawLoader {
    #[serde(rename = "type")]
    kind: String,
    version: Option<String>,
    #[serde(default, alias = "sinytra_compat")]
    compat_mode: bool,
}

impl PackMetadata {
    pub fn constraints(&self) -> PackConstraints {
        PackConstraints {
            game_version: self.game_version.clone(),
            loader: self.loader.loader,
            compat_mode: self.loader.compat_mode,
            channel: self.channel,
        }
    }

    /// Include directories in deploy order: `config` first, then the configured ones.
    pub fn deployed_directories(&self) -> Vec<String> {
        let mut dirs = vec!["config".to_string()];
        for dir in &self.include_directories {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, ModError> {
        let invalid = |reason: String| ModError::PackConfig {
            path: path.to_path_buf(),
            reason,
        };

        let raw: RawPack = toml::from_str(contents).map_err(|e| invalid(e.message().to_string()))?;
        let loader = raw.loader.kind.parse::<Loader>()?;

        for dir in &raw.include_directories {
            if !is_plain_relative(dir) {
                return Err(invalid(format!(
                    "include directory '{}' must be a relative path inside the pack",
                    dir
                )));
            }
            if is_within_mods(dir) {
                return Err(invalid(format!(
                    "include directory '{}' overlaps mods/, which is managed by modsmith",
                    dir
                )));
            }
        }

        Ok(PackMetadata {
            name: raw.name,
            version: raw.version,
            game_version: raw.game_version,
            include_directories: raw.include_directories,
            channel: raw.channel,
            loader: LoaderConfig {
                loader,
                version: raw.loader.version,
                compat_mode: raw.loader.compat_mode,
            },
        })
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, pack_dir: &Path) -> Result<Self> {
        let path = pack_dir.join(PACK_FILE);
        if !runtime.exists(&path) {
            return Err(ModError::PackConfig {
                path,
                reason: "file not found; is this a pack directory?".to_string(),
            }
            .into());
        }
        let contents = runtime.read_to_string(&path)?;
        Ok(Self::parse(&path, &contents)?)
    }
}

impl LocalMetadata {
    /// Loads `localpack.toml`, or the defaults when the file is absent.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, pack_dir: &Path) -> Result<Self> {
        let path = pack_dir.join(LOCAL_PACK_FILE);
        if !runtime.exists(&path) {
            debug!("no {} in {:?}", LOCAL_PACK_FILE, pack_dir);
            return Ok(Self::default());
        }
        let contents = runtime.read_to_string(&path)?;
        let local: LocalMetadata = toml::from_str(&contents).map_err(|e| ModError::PackConfig {
            path: path.clone(),
            reason: e.message().to_string(),
        })?;
        if let Some(dir) = local
            .extra_symlinked_dirs
            .iter()
            .find(|d| !is_plain_relative(d))
        {
            return Err(ModError::PackConfig {
                path,
                reason: format!("extra directory '{}' must be a relative path inside the pack", dir),
            }
            .into());
        }
        if let Some(dir) = local.extra_symlinked_dirs.iter().find(|d| is_within_mods(d)) {
            return Err(ModError::PackConfig {
                path,
                reason: format!("extra directory '{}' overlaps mods/, which is managed by modsmith", dir),
            }
            .into());
        }
        Ok(local)
    }
}

/// Relative, non-empty, and unable to climb out of the pack.
fn is_plain_relative(dir: &str) -> bool {
    let path = Path::new(dir);
    !dir.is_empty()
        && path.is_relative()
        && crate::runtime::is_path_under(&Path::new("pack").join(path), Path::new("pack"))
        && crate::runtime::normalize_path(path) != Path::new("")
}

/// `mods` itself or anything below it. Deploy owns that directory link by link.
pub fn is_within_mods(dir: &str) -> bool {
    crate::runtime::normalize_path(Path::new(dir)).starts_with(MODS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    const PACK: &str = r#"
        name = "Skyblock"
        version = "1.4.0"
        game_version = "1.20.1"
        include_directories = ["kubejs", "config"]

        [loader]
        type = "neoforge"
        version = "47.1.3"
        compat_mode = true
    "#;

    #[test]
    fn test_parse_pack() {
        let pack = PackMetadata::parse(Path::new("pack.toml"), PACK).unwrap();
        assert_eq!(pack.loader.loader, Loader::NeoForge);
        assert_eq!(pack.channel, ReleaseChannel::Release);
        assert_eq!(pack.deployed_directories(), vec!["config", "kubejs"]);

        let constraints = pack.constraints();
        assert!(constraints.compat_mode);
        assert_eq!(constraints.game_version, "1.20.1");
    }

    #[test]
    fn test_parse_pack_accepts_legacy_compat_key() {
        let contents = PACK.replace("compat_mode", "sinytra_compat");
        let pack = PackMetadata::parse(Path::new("pack.toml"), &contents).unwrap();
        assert!(pack.loader.compat_mode);
    }

    #[test]
    fn test_parse_pack_unknown_loader() {
        let contents = PACK.replace("neoforge", "rift");
        let err = PackMetadata::parse(Path::new("pack.toml"), &contents).unwrap_err();
        assert!(matches!(err, ModError::UnknownLoader(l) if l == "rift"));
    }

    #[test]
    fn test_parse_pack_rejects_escaping_include_dir() {
        let contents = PACK.replace("\"kubejs\"", "\"../outside\"");
        let err = PackMetadata::parse(Path::new("pack.toml"), &contents).unwrap_err();
        assert!(matches!(err, ModError::PackConfig { .. }));
    }

    #[test]
    fn test_parse_pack_rejects_include_dir_overlapping_mods() {
        for dir in ["mods", "./mods", "mods/extra", "kubejs/../mods"] {
            let contents = PACK.replace("\"kubejs\"", &format!("\"{}\"", dir));
            let err = PackMetadata::parse(Path::new("pack.toml"), &contents).unwrap_err();
            assert!(
                matches!(&err, ModError::PackConfig { reason, .. } if reason.contains("mods/")),
                "{} should be rejected, got {}",
                dir,
                err
            );
        }

        let contents = PACK.replace("\"kubejs\"", "\"modsets\"");
        assert!(PackMetadata::parse(Path::new("pack.toml"), &contents).is_ok());
    }

    #[test]
    fn test_parse_pack_missing_field() {
        let err = PackMetadata::parse(Path::new("pack.toml"), "name = \"x\"").unwrap_err();
        assert!(err.to_string().contains("pack.toml"));
    }

    #[test]
    fn test_load_missing_pack_file() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/packs/sky/pack.toml")))
            .returning(|_| false);

        let err = PackMetadata::load(&runtime, Path::new("/packs/sky")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModError>(),
            Some(ModError::PackConfig { .. })
        ));
    }

    #[test]
    fn test_local_metadata_defaults_when_absent() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);

        let local = LocalMetadata::load(&runtime, Path::new("/packs/sky")).unwrap();
        assert_eq!(local, LocalMetadata::default());
    }

    #[test]
    fn test_local_metadata_load() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime.expect_read_to_string().returning(|_| {
            Ok("instance_name = \"Skyblock Dev\"\nextra_symlinked_dirs = [\"saves\"]\n".into())
        });

        let local = LocalMetadata::load(&runtime, Path::new("/packs/sky")).unwrap();
        assert_eq!(local.instance_name.as_deref(), Some("Skyblock Dev"));
        assert_eq!(local.extra_symlinked_dirs, vec!["saves"]);
    }

    #[test]
    fn test_local_metadata_rejects_mods_dir() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("extra_symlinked_dirs = [\"saves\", \"mods\"]\n".into()));

        let err = LocalMetadata::load(&runtime, Path::new("/packs/sky")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModError>(),
            Some(ModError::PackConfig { reason, .. }) if reason.contains("'mods'")
        ));
    }
}
