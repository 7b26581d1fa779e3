//! Registry abstraction and the domain types it returns.
//!
//! Wire formats stay inside the concrete client; everything above this module
//! works with the closed enums defined here, so an unrecognized loader or
//! dependency type is rejected at the boundary instead of travelling as a string.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModError;

mod modrinth;

pub use modrinth::{DEFAULT_API_URL, ModrinthClient};

/// Mod loader a pack or version targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Loader {
    LegacyForge,
    NeoForge,
    Fabric,
    Quilt,
}

impl Loader {
    /// Name used in `pack.toml`.
    pub fn config_name(self) -> &'static str {
        match self {
            Loader::LegacyForge => "legacyforge",
            Loader::NeoForge => "neoforge",
            Loader::Fabric => "fabric",
            Loader::Quilt => "quilt",
        }
    }

    /// Loader tag the registry uses for versions and search facets.
    pub fn registry_name(self) -> &'static str {
        match self {
            Loader::LegacyForge => "forge",
            Loader::NeoForge => "neoforge",
            Loader::Fabric => "fabric",
            Loader::Quilt => "quilt",
        }
    }

    /// Dependency key in an mrpack `modrinth.index.json`.
    pub fn mrpack_id(self) -> &'static str {
        match self {
            Loader::LegacyForge => "forge",
            Loader::NeoForge => "neoforge",
            Loader::Fabric => "fabric-loader",
            Loader::Quilt => "quilt-loader",
        }
    }

    pub fn is_forge_family(self) -> bool {
        matches!(self, Loader::LegacyForge | Loader::NeoForge)
    }

    /// Maps a registry loader tag. Tags for loaders this tool does not
    /// manage (plugins, datapacks, shaders) yield `None`.
    pub fn from_registry(tag: &str) -> Option<Loader> {
        match tag {
            "forge" => Some(Loader::LegacyForge),
            "neoforge" => Some(Loader::NeoForge),
            "fabric" => Some(Loader::Fabric),
            "quilt" => Some(Loader::Quilt),
            _ => None,
        }
    }
}

impl FromStr for Loader {
    type Err = ModError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacyforge" | "legacy-forge" | "forge" => Ok(Loader::LegacyForge),
            "neoforge" => Ok(Loader::NeoForge),
            "fabric" => Ok(Loader::Fabric),
            "quilt" => Ok(Loader::Quilt),
            _ => Err(ModError::UnknownLoader(s.to_string())),
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// Release stability. Ordered from least to most stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Alpha,
    Beta,
    #[default]
    Release,
}

impl ReleaseChannel {
    /// True if a version published on `candidate` is acceptable for a pack
    /// tracking this channel.
    pub fn accepts(self, candidate: ReleaseChannel) -> bool {
        candidate >= self
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseChannel::Alpha => "alpha",
            ReleaseChannel::Beta => "beta",
            ReleaseChannel::Release => "release",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyType {
    Required,
    Optional,
    Incompatible,
    Embedded,
}

impl FromStr for DependencyType {
    type Err = ModError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(DependencyType::Required),
            "optional" => Ok(DependencyType::Optional),
            "incompatible" => Ok(DependencyType::Incompatible),
            "embedded" => Ok(DependencyType::Embedded),
            _ => Err(ModError::UnknownDependencyType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub project_id: Option<String>,
    pub version_id: Option<String>,
    pub file_name: Option<String>,
    pub dependency_type: DependencyType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionFile {
    pub url: String,
    pub filename: String,
    pub primary: bool,
    pub size: u64,
    pub sha1: Option<String>,
    pub sha512: Option<String>,
}

/// A single published version of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub version_id: String,
    pub project_id: String,
    pub name: String,
    pub version_number: String,
    pub game_versions: Vec<String>,
    pub loaders: Vec<Loader>,
    pub channel: ReleaseChannel,
    pub published_at: DateTime<Utc>,
    pub dependencies: Vec<Dependency>,
    pub files: Vec<VersionFile>,
}

impl VersionInfo {
    pub fn supports_game_version(&self, game_version: &str) -> bool {
        self.game_versions.iter().any(|v| v == game_version)
    }

    pub fn supports_loader(&self, loader: Loader) -> bool {
        self.loaders.contains(&loader)
    }

    /// The file flagged primary, or the only file when none is flagged.
    pub fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| match self.files.as_slice() {
                [only] => Some(only),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub project_id: String,
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectInfo {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub categories: Vec<String>,
    pub loaders: Vec<String>,
    pub client_side: String,
    pub server_side: String,
}

impl ProjectInfo {
    /// Whether the project advertises Fabric support, either as a category or a loader tag.
    pub fn is_fabric_tagged(&self) -> bool {
        self.categories
            .iter()
            .chain(self.loaders.iter())
            .any(|c| c == "fabric")
    }

    /// Mods that do nothing on a dedicated server.
    pub fn is_client_only(&self) -> bool {
        self.server_side == "unsupported" && self.client_side != "unsupported"
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Full-text project search restricted to the given game version and loaders.
    async fn search(
        &self,
        query: &str,
        game_version: &str,
        loaders: &[Loader],
    ) -> Result<Vec<ProjectSummary>>;

    /// Looks up a project by id or slug.
    async fn get_project(&self, id_or_slug: &str) -> Result<ProjectInfo>;

    /// Lists versions of a project declaring any of `loaders` for `game_version`,
    /// in registry order.
    async fn get_versions(
        &self,
        project_id: &str,
        loaders: &[Loader],
        game_version: &str,
    ) -> Result<Vec<VersionInfo>>;

    async fn get_version(&self, version_id: &str) -> Result<VersionInfo>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builders shared by resolver and command tests.

    use super::*;
    use chrono::TimeZone;

    pub fn project(id: &str, title: &str, categories: &[&str]) -> ProjectInfo {
        ProjectInfo {
            id: id.to_string(),
            slug: title.to_lowercase().replace(' ', "-"),
            title: title.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            loaders: Vec::new(),
            client_side: "required".to_string(),
            server_side: "required".to_string(),
        }
    }

    pub fn version(
        id: &str,
        project_id: &str,
        loaders: &[Loader],
        game_versions: &[&str],
        day: u32,
    ) -> VersionInfo {
        VersionInfo {
            version_id: id.to_string(),
            project_id: project_id.to_string(),
            name: id.to_string(),
            version_number: "1.0.0".to_string(),
            game_versions: game_versions.iter().map(|g| g.to_string()).collect(),
            loaders: loaders.to_vec(),
            channel: ReleaseChannel::Release,
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            dependencies: Vec::new(),
            files: vec![VersionFile {
                url: format!("https://cdn.example.org/{}/{}.jar", project_id, id),
                filename: format!("{}-{}.jar", project_id, id),
                primary: true,
                size: 3,
                sha1: None,
                sha512: None,
            }],
        }
    }

    pub fn requires(mut version: VersionInfo, project_ids: &[&str]) -> VersionInfo {
        for id in project_ids {
            version.dependencies.push(Dependency {
                project_id: Some(id.to_string()),
                version_id: None,
                file_name: None,
                dependency_type: DependencyType::Required,
            });
        }
        version
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_loader_parsing_is_strict() {
        assert_eq!("legacyforge".parse::<Loader>().unwrap(), Loader::LegacyForge);
        assert_eq!("NeoForge".parse::<Loader>().unwrap(), Loader::NeoForge);
        assert!(matches!(
            "rift".parse::<Loader>(),
            Err(ModError::UnknownLoader(s)) if s == "rift"
        ));
    }

    #[test]
    fn test_loader_names() {
        assert_eq!(Loader::LegacyForge.registry_name(), "forge");
        assert_eq!(Loader::Fabric.mrpack_id(), "fabric-loader");
        assert_eq!(Loader::from_registry("forge"), Some(Loader::LegacyForge));
        assert_eq!(Loader::from_registry("bukkit"), None);
        assert!(Loader::NeoForge.is_forge_family());
        assert!(!Loader::Quilt.is_forge_family());
    }

    #[test]
    fn test_channel_acceptance() {
        assert!(ReleaseChannel::Release.accepts(ReleaseChannel::Release));
        assert!(!ReleaseChannel::Release.accepts(ReleaseChannel::Beta));
        assert!(ReleaseChannel::Beta.accepts(ReleaseChannel::Release));
        assert!(ReleaseChannel::Alpha.accepts(ReleaseChannel::Beta));
    }

    #[test]
    fn test_dependency_type_parsing() {
        assert_eq!(
            "required".parse::<DependencyType>().unwrap(),
            DependencyType::Required
        );
        assert!(matches!(
            "suggested".parse::<DependencyType>(),
            Err(ModError::UnknownDependencyType(_))
        ));
    }

    #[test]
    fn test_primary_file_falls_back_to_single_file() {
        let mut v = version("v1", "p1", &[Loader::Fabric], &["1.20.1"], 1);
        v.files[0].primary = false;
        assert_eq!(v.primary_file().unwrap().filename, "p1-v1.jar");

        let mut second = v.files[0].clone();
        second.filename = "sources.jar".to_string();
        v.files.push(second);
        assert!(v.primary_file().is_none());
    }

    #[test]
    fn test_project_tags() {
        let mut p = project("p1", "Big Globe", &["worldgen", "fabric"]);
        assert!(p.is_fabric_tagged());
        assert!(!p.is_client_only());

        p.categories = vec!["worldgen".into()];
        p.loaders = vec!["fabric".into()];
        assert!(p.is_fabric_tagged());

        p.server_side = "unsupported".into();
        assert!(p.is_client_only());
    }
}
