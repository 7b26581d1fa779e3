use std::fmt;

use anyhow::Result;
use log::{debug, warn};

use super::compat::{CompatibilityRule, rewrite_target};
use crate::error::ModError;
use crate::pack::{ModEntry, PackConstraints};
use crate::registry::{ProjectInfo, ProjectSummary, RegistryClient, VersionInfo};

/// How the user named a mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModRequest {
    /// Project id or slug.
    Project(String),
    /// Exact version id.
    Version(String),
    /// Free-text search query.
    Search(String),
}

impl fmt::Display for ModRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModRequest::Project(id) => write!(f, "project {}", id),
            ModRequest::Version(id) => write!(f, "version {}", id),
            ModRequest::Search(query) => write!(f, "'{}'", query),
        }
    }
}

/// The single version chosen for a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVersion {
    pub project: ProjectInfo,
    pub version: VersionInfo,
    pub substituted: bool,
}

impl ResolvedVersion {
    /// Builds the index entry for this version. Edges and pin state are the
    /// caller's business.
    pub fn to_entry(&self) -> Result<ModEntry, ModError> {
        let file = self
            .version
            .primary_file()
            .ok_or_else(|| ModError::IncompatibleVersion {
                project: self.project.title.clone(),
                version: self.version.version_number.clone(),
                reason: "it has no primary file".to_string(),
            })?;

        Ok(ModEntry {
            project_id: self.project.id.clone(),
            version_id: Some(self.version.version_id.clone()),
            name: self.project.title.clone(),
            version: self.version.version_number.clone(),
            filename: file.filename.clone(),
            url: Some(file.url.clone()),
            sha512: file.sha512.clone(),
            size: Some(file.size),
            pinned: false,
            local: false,
            client_only: self.project.is_client_only(),
            dependency_of: Default::default(),
            extra: toml::Table::new(),
        })
    }
}

/// Picks one version of a project for the pack's constraints.
pub struct VersionResolver<'a, C: RegistryClient> {
    registry: &'a C,
    constraints: &'a PackConstraints,
    rule: CompatibilityRule,
}

impl<'a, C: RegistryClient> VersionResolver<'a, C> {
    pub fn new(registry: &'a C, constraints: &'a PackConstraints) -> Self {
        VersionResolver {
            registry,
            constraints,
            rule: CompatibilityRule::new(constraints),
        }
    }

    pub fn rule(&self) -> &CompatibilityRule {
        &self.rule
    }

    /// Resolves a user request to a concrete version.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, request: &ModRequest) -> Result<ResolvedVersion> {
        let (project, explicit) = self.identify(request).await?;
        self.resolve_project(&project, explicit).await
    }

    /// Looks up the project a user request refers to, plus the requested
    /// version when one was named.
    #[tracing::instrument(skip(self))]
    pub async fn identify(&self, request: &ModRequest) -> Result<(ProjectInfo, Option<VersionInfo>)> {
        let (project, explicit) = match request {
            ModRequest::Project(id) => (self.registry.get_project(id).await?, None),
            ModRequest::Version(id) => {
                let version = self.registry.get_version(id).await?;
                let project = self.registry.get_project(&version.project_id).await?;
                (project, Some(version))
            }
            ModRequest::Search(query) => (self.search(query).await?, None),
        };

        if self.constraints.loader.is_forge_family() {
            if let Some(replacement) = rewrite_target(&project.id) {
                return Err(ModError::IncompatibleVersion {
                    project: project.title.clone(),
                    version: explicit
                        .map(|v| v.version_number)
                        .unwrap_or_else(|| "any version".to_string()),
                    reason: format!(
                        "it is a Fabric-only library; add project {} instead",
                        replacement
                    ),
                }
                .into());
            }
        }

        Ok((project, explicit))
    }

    async fn search(&self, query: &str) -> Result<ProjectInfo> {
        let hits = self
            .registry
            .search(query, &self.constraints.game_version, &self.rule.query_loaders())
            .await?;
        let hit = pick_search_hit(query, &hits)?;
        debug!("search '{}' resolved to {} ({})", query, hit.title, hit.project_id);
        self.registry.get_project(&hit.project_id).await
    }

    /// Selects a version of `project`, or validates `explicit` when given.
    #[tracing::instrument(skip(self, project, explicit), fields(project = %project.title))]
    pub async fn resolve_project(
        &self,
        project: &ProjectInfo,
        explicit: Option<VersionInfo>,
    ) -> Result<ResolvedVersion> {
        if let Some(version) = explicit {
            return self.check_explicit(project, version);
        }

        let versions = self
            .registry
            .get_versions(&project.id, &self.rule.query_loaders(), &self.constraints.game_version)
            .await?;
        let on_game_version: Vec<&VersionInfo> = versions
            .iter()
            .filter(|v| v.supports_game_version(&self.constraints.game_version))
            .collect();
        let eligible = self.rule.eligible(project, &on_game_version);

        let channel = self.constraints.channel;
        let preferred: Vec<&VersionInfo> = eligible
            .iter()
            .copied()
            .filter(|v| channel.accepts(v.channel))
            .collect();

        let chosen = if preferred.is_empty() {
            let fallback = newest(&eligible);
            if let Some(v) = fallback {
                warn!(
                    "no {} version of {} found, falling back to {} {}",
                    channel, project.title, v.channel, v.version_number
                );
            }
            fallback
        } else {
            newest(&preferred)
        };

        let version = chosen.ok_or_else(|| ModError::NoCompatibleVersion {
            project: project.title.clone(),
            loader: self.constraints.loader.to_string(),
            game_version: self.constraints.game_version.clone(),
        })?;

        Ok(ResolvedVersion {
            project: project.clone(),
            version: version.clone(),
            substituted: self.rule.is_substituted(version),
        })
    }

    fn check_explicit(&self, project: &ProjectInfo, version: VersionInfo) -> Result<ResolvedVersion> {
        let incompatible = |reason: String| ModError::IncompatibleVersion {
            project: project.title.clone(),
            version: version.version_number.clone(),
            reason,
        };

        if version.project_id != project.id {
            return Err(incompatible(format!("it belongs to project {}", version.project_id)).into());
        }
        if !version.supports_game_version(&self.constraints.game_version) {
            return Err(incompatible(format!(
                "it does not support Minecraft {}",
                self.constraints.game_version
            ))
            .into());
        }
        self.rule
            .check_explicit(project, &version)
            .map_err(incompatible)?;

        let substituted = self.rule.is_substituted(&version);
        Ok(ResolvedVersion {
            project: project.clone(),
            version,
            substituted,
        })
    }
}

/// Newest by publish time. Equal timestamps fall back to the higher semantic
/// version when both parse, then to the first in registry order.
pub fn newest<'a>(candidates: &[&'a VersionInfo]) -> Option<&'a VersionInfo> {
    let mut best: Option<&'a VersionInfo> = None;
    for &candidate in candidates {
        best = match best {
            Some(current) if !is_newer(candidate, current) => Some(current),
            _ => Some(candidate),
        };
    }
    best
}

fn is_newer(a: &VersionInfo, b: &VersionInfo) -> bool {
    if a.published_at != b.published_at {
        return a.published_at > b.published_at;
    }
    match (parse_semver(&a.version_number), parse_semver(&b.version_number)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

fn parse_semver(version: &str) -> Option<semver::Version> {
    semver::Version::parse(version.trim_start_matches('v')).ok()
}

/// Exact title or slug match wins, then a lone hit. Anything else needs a project id.
pub fn pick_search_hit<'a>(query: &str, hits: &'a [ProjectSummary]) -> Result<&'a ProjectSummary, ModError> {
    let exact: Vec<&ProjectSummary> = hits
        .iter()
        .filter(|h| h.title.eq_ignore_ascii_case(query) || h.slug.eq_ignore_ascii_case(query))
        .collect();

    match (exact.as_slice(), hits) {
        ([only], _) => Ok(*only),
        (_, [only]) => Ok(only),
        (_, []) => Err(ModError::ProjectNotFound(query.to_string())),
        _ => Err(ModError::AmbiguousSearch {
            query: query.to_string(),
            candidates: hits
                .iter()
                .map(|h| format!("{} ({})", h.title, h.project_id))
                .collect(),
        }),
    }
}
