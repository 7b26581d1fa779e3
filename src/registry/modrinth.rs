use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

use super::{Loader, ProjectInfo, ProjectSummary, RegistryClient, VersionInfo};
use crate::error::ModError;
use crate::http::{HttpClient, NonRetryableError};

pub const DEFAULT_API_URL: &str = "https://api.modrinth.com/v2";

const SEARCH_LIMIT: usize = 10;

pub struct ModrinthClient {
    http: HttpClient,
    api_url: String,
}

impl ModrinthClient {
    #[tracing::instrument(skip(http, api_url))]
    pub fn new(http: HttpClient, api_url: Option<String>) -> Self {
        let api_url = api_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self { http, api_url }
    }
}

/// Turns a 404 into `ProjectNotFound` so callers see which id was missing.
fn not_found_as(err: anyhow::Error, what: &str) -> anyhow::Error {
    match err.downcast_ref::<NonRetryableError>() {
        Some(NonRetryableError::NotFound(_)) => ModError::ProjectNotFound(what.to_string()).into(),
        _ => err,
    }
}

fn json_list<'a>(items: impl IntoIterator<Item = &'a str>) -> Result<String> {
    serde_json::to_string(&items.into_iter().collect::<Vec<_>>()).context("Failed to encode query list")
}

#[async_trait]
impl RegistryClient for ModrinthClient {
    #[tracing::instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        game_version: &str,
        loaders: &[Loader],
    ) -> Result<Vec<ProjectSummary>> {
        let loader_facet: Vec<String> = loaders
            .iter()
            .map(|l| format!("categories:{}", l.registry_name()))
            .collect();
        let facets = vec![
            loader_facet,
            vec![format!("versions:{}", game_version)],
            vec!["project_type:mod".to_string()],
        ];
        let facets = serde_json::to_string(&facets).context("Failed to encode search facets")?;

        let url = format!("{}/search", self.api_url);
        let response: api::SearchResponse = self
            .http
            .get_json_with_query(
                &url,
                &[
                    ("query", query.to_string()),
                    ("facets", facets),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
            )
            .await
            .with_context(|| format!("Failed to search the registry for '{}'", query))?;

        debug!("search '{}' returned {} hits", query, response.hits.len());
        Ok(response.hits.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get_project(&self, id_or_slug: &str) -> Result<ProjectInfo> {
        let url = format!("{}/project/{}", self.api_url, id_or_slug);
        let project: api::Project = self
            .http
            .get_json(&url)
            .await
            .map_err(|e| not_found_as(e, id_or_slug))?;
        Ok(project.into())
    }

    #[tracing::instrument(skip(self))]
    async fn get_versions(
        &self,
        project_id: &str,
        loaders: &[Loader],
        game_version: &str,
    ) -> Result<Vec<VersionInfo>> {
        let url = format!("{}/project/{}/version", self.api_url, project_id);
        let query = [
            ("loaders", json_list(loaders.iter().map(|l| l.registry_name()))?),
            ("game_versions", json_list([game_version])?),
        ];
        let versions: Vec<api::Version> = self
            .http
            .get_json_with_query(&url, &query)
            .await
            .map_err(|e| not_found_as(e, project_id))?;

        versions
            .into_iter()
            .map(VersionInfo::try_from)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Registry returned an invalid version of {}", project_id))
    }

    #[tracing::instrument(skip(self))]
    async fn get_version(&self, version_id: &str) -> Result<VersionInfo> {
        let url = format!("{}/version/{}", self.api_url, version_id);
        let version: api::Version = self
            .http
            .get_json(&url)
            .await
            .map_err(|e| not_found_as(e, &format!("version {}", version_id)))?;
        VersionInfo::try_from(version)
            .with_context(|| format!("Registry returned an invalid version {}", version_id))
    }
}

/// Wire types for the registry's JSON responses.
mod api {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use crate::error::ModError;
    use crate::registry::{
        Dependency, Loader, ProjectInfo, ProjectSummary, ReleaseChannel, VersionFile, VersionInfo,
    };

    #[derive(Deserialize)]
    pub struct SearchResponse {
        pub hits: Vec<SearchHit>,
    }

    #[derive(Deserialize)]
    pub struct SearchHit {
        pub project_id: String,
        pub slug: String,
        pub title: String,
    }

    impl From<SearchHit> for ProjectSummary {
        fn from(hit: SearchHit) -> Self {
            ProjectSummary {
                project_id: hit.project_id,
                slug: hit.slug,
                title: hit.title,
            }
        }
    }

    #[derive(Deserialize)]
    pub struct Project {
        pub id: String,
        pub slug: String,
        pub title: String,
        #[serde(default)]
        pub categories: Vec<String>,
        #[serde(default)]
        pub additional_categories: Vec<String>,
        #[serde(default)]
        pub loaders: Vec<String>,
        #[serde(default)]
        pub client_side: String,
        #[serde(default)]
        pub server_side: String,
    }

    impl From<Project> for ProjectInfo {
        fn from(p: Project) -> Self {
            let mut categories = p.categories;
            categories.extend(p.additional_categories);
            ProjectInfo {
                id: p.id,
                slug: p.slug,
                title: p.title,
                categories,
                loaders: p.loaders,
                client_side: p.client_side,
                server_side: p.server_side,
            }
        }
    }

    #[derive(Deserialize)]
    pub struct Version {
        pub id: String,
        pub project_id: String,
        #[serde(default)]
        pub name: String,
        pub version_number: String,
        #[serde(default)]
        pub game_versions: Vec<String>,
        #[serde(default)]
        pub loaders: Vec<String>,
        pub version_type: ReleaseChannel,
        pub date_published: DateTime<Utc>,
        #[serde(default)]
        pub dependencies: Vec<VersionDependency>,
        #[serde(default)]
        pub files: Vec<File>,
    }

    #[derive(Deserialize)]
    pub struct VersionDependency {
        pub version_id: Option<String>,
        pub project_id: Option<String>,
        pub file_name: Option<String>,
        pub dependency_type: String,
    }

    #[derive(Deserialize)]
    pub struct File {
        pub url: String,
        pub filename: String,
        #[serde(default)]
        pub primary: bool,
        #[serde(default)]
        pub size: u64,
        #[serde(default)]
        pub hashes: Hashes,
    }

    #[derive(Deserialize, Default)]
    pub struct Hashes {
        pub sha1: Option<String>,
        pub sha512: Option<String>,
    }

    impl TryFrom<Version> for VersionInfo {
        type Error = ModError;

        fn try_from(v: Version) -> Result<Self, Self::Error> {
            let loaders: Vec<Loader> = v
                .loaders
                .iter()
                .filter_map(|l| Loader::from_registry(l))
                .collect();
            if loaders.is_empty() {
                return Err(ModError::UnknownLoader(v.loaders.join(", ")));
            }

            let dependencies = v
                .dependencies
                .into_iter()
                .map(|d| {
                    Ok(Dependency {
                        project_id: d.project_id,
                        version_id: d.version_id,
                        file_name: d.file_name,
                        dependency_type: d.dependency_type.parse()?,
                    })
                })
                .collect::<Result<Vec<_>, ModError>>()?;

            let files = v
                .files
                .into_iter()
                .map(|f| VersionFile {
                    url: f.url,
                    filename: f.filename,
                    primary: f.primary,
                    size: f.size,
                    sha1: f.hashes.sha1,
                    sha512: f.hashes.sha512,
                })
                .collect();

            Ok(VersionInfo {
                version_id: v.id,
                project_id: v.project_id,
                name: v.name,
                version_number: v.version_number,
                game_versions: v.game_versions,
                loaders,
                channel: v.version_type,
                published_at: v.date_published,
                dependencies,
                files,
            })
        }
    }
}
