use anyhow::{Result, anyhow};
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    download::{Downloader, HttpDownloader},
    http::HttpClient,
    registry::{ModrinthClient, RegistryClient},
    runtime::{Runtime, normalize_path},
};

pub const USER_AGENT: &str = concat!("modsmith/", env!("MODSMITH_VERSION"));
pub const TOKEN_VAR: &str = "MODRINTH_TOKEN";
pub const DEFAULT_JOBS: usize = 8;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub pack_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub jobs: usize,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        GlobalOptions {
            pack_dir: None,
            cache_dir: None,
            api_url: None,
            jobs: DEFAULT_JOBS,
        }
    }
}

pub struct Config<R: Runtime, C: RegistryClient, D: Downloader> {
    pub runtime: Arc<R>,
    pub registry: C,
    pub downloader: D,
    pub pack_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub jobs: usize,
}

impl<R: Runtime> Config<R, ModrinthClient, HttpDownloader<R>> {
    pub fn new(runtime: R, options: GlobalOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(token) = runtime.env_var(TOKEN_VAR) {
            let mut auth_value = HeaderValue::from_str(token.trim())?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using {} for authentication: {}", TOKEN_VAR, mask(&token));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        let http_client = HttpClient::new(client);

        let pack_dir = match options.pack_dir {
            Some(dir) => absolutize(&runtime, &dir)?,
            None => runtime.current_dir()?,
        };
        let cache_dir = match options.cache_dir {
            Some(dir) => absolutize(&runtime, &dir)?,
            None => runtime
                .cache_dir()
                .ok_or_else(|| anyhow!("Cannot determine the user cache directory, pass --cache-dir"))?
                .join("modsmith"),
        };
        debug!("Pack directory {:?}, cache directory {:?}", pack_dir, cache_dir);

        let runtime = Arc::new(runtime);
        Ok(Self {
            registry: ModrinthClient::new(http_client.clone(), options.api_url),
            downloader: HttpDownloader::new(Arc::clone(&runtime), http_client),
            runtime,
            pack_dir,
            cache_dir,
            jobs: options.jobs.max(1),
        })
    }
}

pub(crate) fn absolutize<R: Runtime>(runtime: &R, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_path(path))
    } else {
        Ok(normalize_path(&runtime.current_dir()?.join(path)))
    }
}

/// Token with only its ends visible, for logs.
fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use mockito::{Matcher, Server};

    fn runtime_with_token(token: Option<&str>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        let token = token.map(|t| t.to_string());
        runtime
            .expect_env_var()
            .with(eq(TOKEN_VAR))
            .returning(move |_| token.clone().ok_or(std::env::VarError::NotPresent));
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/home/user/packs/sky")));
        runtime
            .expect_cache_dir()
            .returning(|| Some(PathBuf::from("/home/user/.cache")));
        runtime
    }

    async fn verify_authorization_header(token: Option<&str>) {
        let mut server = Server::new_async().await;
        let expected_header = match token {
            Some(t) => Matcher::Exact(t.to_string()),
            None => Matcher::Missing,
        };
        let mock = server
            .mock("GET", "/project/AANobbMI")
            .match_header("Authorization", expected_header)
            .match_header("User-Agent", Matcher::Regex("^modsmith/".to_string()))
            .with_status(200)
            .with_body(r#"{"id":"AANobbMI","slug":"sodium","title":"Sodium","description":"","categories":[],"loaders":["fabric"],"client_side":"required","server_side":"unsupported"}"#)
            .create_async()
            .await;

        let options = GlobalOptions {
            api_url: Some(server.url()),
            ..GlobalOptions::default()
        };
        let config = Config::new(runtime_with_token(token), options).unwrap();
        config.registry.get_project("AANobbMI").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_sent_as_authorization() {
        verify_authorization_header(Some("mrp_abcdefghijklmnop")).await;
    }

    #[tokio::test]
    async fn test_no_authorization_without_token() {
        verify_authorization_header(None).await;
    }

    #[test]
    fn test_directories_default_and_resolve() {
        let config = Config::new(runtime_with_token(None), GlobalOptions::default()).unwrap();
        assert_eq!(config.pack_dir, PathBuf::from("/home/user/packs/sky"));
        assert_eq!(config.cache_dir, PathBuf::from("/home/user/.cache/modsmith"));
        assert_eq!(config.jobs, DEFAULT_JOBS);

        let options = GlobalOptions {
            pack_dir: Some(PathBuf::from("../other")),
            cache_dir: Some(PathBuf::from("/tmp/cache")),
            jobs: 0,
            ..GlobalOptions::default()
        };
        let config = Config::new(runtime_with_token(None), options).unwrap();
        assert_eq!(config.pack_dir, PathBuf::from("/home/user/packs/other"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("short"), "*****");
        assert_eq!(mask("mrp_abcdefghijkl"), "mrp_*********ijkl");
    }
}
