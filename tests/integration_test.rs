use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server, ServerGuard};
use predicates::prelude::*;
use sha2::{Digest, Sha512};
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const JAR: &str = "sodium jar bytes";

const PACK_TOML: &str = r#"name = "Sky"
version = "1.0.0"
game_version = "1.20.1"

[loader]
type = "fabric"
version = "0.15.11"
"#;

struct Fixture {
    server: ServerGuard,
    pack: TempDir,
    cache: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let pack = tempdir().unwrap();
        fs::write(pack.path().join("pack.toml"), PACK_TOML).unwrap();
        fs::create_dir_all(pack.path().join("config")).unwrap();
        fs::write(pack.path().join("config/sodium-options.json"), "{}").unwrap();
        Fixture {
            server: Server::new(),
            pack,
            cache: tempdir().unwrap(),
        }
    }

    fn version_json(&self) -> String {
        let sha512 = hex::encode(Sha512::digest(JAR.as_bytes()));
        format!(
            r#"{{
                "id": "mc1.20.1-0.5.8",
                "project_id": "AANobbMI",
                "name": "Sodium 0.5.8",
                "version_number": "mc1.20.1-0.5.8",
                "game_versions": ["1.20.1"],
                "loaders": ["fabric"],
                "version_type": "release",
                "date_published": "2024-03-01T12:00:00Z",
                "dependencies": [],
                "files": [{{
                    "url": "{}/data/AANobbMI/sodium-fabric-0.5.8.jar",
                    "filename": "sodium-fabric-0.5.8.jar",
                    "primary": true,
                    "size": {},
                    "hashes": {{"sha1": "0123abcd", "sha512": "{}"}}
                }}]
            }}"#,
            self.server.url(),
            JAR.len(),
            sha512
        )
    }

    fn mock_registry(&mut self) {
        let version = self.version_json();
        self.server
            .mock("GET", Matcher::Regex(r"^/project/(sodium|AANobbMI)$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": "AANobbMI", "slug": "sodium", "title": "Sodium",
                    "categories": ["optimization"], "loaders": ["fabric", "quilt"],
                    "client_side": "required", "server_side": "unsupported"}"#,
            )
            .create();
        self.server
            .mock("GET", Matcher::Regex(r"^/project/AANobbMI/version".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{}]", version))
            .create();
        self.server
            .mock("GET", "/version/mc1.20.1-0.5.8")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(version)
            .create();
        self.server
            .mock("GET", "/data/AANobbMI/sodium-fabric-0.5.8.jar")
            .with_status(200)
            .with_body(JAR)
            .create();
    }

    fn modsmith(&self) -> Command {
        let mut cmd = Command::new(cargo::cargo_bin!("modsmith"));
        cmd.env("MODSMITH_PACK_DIR", self.pack.path())
            .env("MODSMITH_CACHE_DIR", self.cache.path())
            .env("MODSMITH_API_URL", self.server.url())
            .env_remove("MODRINTH_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_add_then_list() {
    let mut fx = Fixture::new();
    fx.mock_registry();

    fx.modsmith()
        .args(["add", "-p", "sodium"])
        .assert()
        .success()
        .stdout(predicate::str::contains("resolving project sodium"))
        .stdout(predicate::str::contains("downloaded Sodium"));

    let index = read(&fx.pack.path().join("mods/index.toml"));
    assert!(index.contains(r#"project_id = "AANobbMI""#));
    assert!(index.contains("client_only = true"));
    let cached = fx
        .cache
        .path()
        .join("artifacts/mc1.20.1-0.5.8/sodium-fabric-0.5.8.jar");
    assert_eq!(read(&cached), JAR);

    fx.modsmith()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mods (1):"))
        .stdout(predicate::str::contains("Sodium"))
        .stdout(predicate::str::contains("client only"));

    // A second add changes nothing and hits the cache.
    fx.modsmith()
        .args(["add", "-p", "sodium"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing changed."));
}

#[test]
fn test_pin_unknown_mod_fails() {
    let mut fx = Fixture::new();
    fx.mock_registry();
    fx.modsmith().args(["add", "-p", "sodium"]).assert().success();

    fx.modsmith().args(["pin", "Sodium"]).assert().success();
    assert!(read(&fx.pack.path().join("mods/index.toml")).contains("pinned = true"));

    fx.modsmith()
        .args(["pin", "optifine"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("optifine"));
}

#[test]
fn test_export_ci_directory() {
    let mut fx = Fixture::new();
    fx.mock_registry();
    fx.modsmith().args(["add", "-p", "sodium"]).assert().success();

    let out = fx.pack.path().join("build/sky");
    fx.modsmith()
        .args(["export", "--ci-mode"])
        .arg(&out)
        .assert()
        .success();

    let index = read(&out.join("modrinth.index.json"));
    assert!(index.contains(r#""formatVersion": 1"#));
    assert!(index.contains(r#""fabric-loader": "0.15.11""#));
    assert!(index.contains("mods/sodium-fabric-0.5.8.jar"));
    assert!(out.join("overrides/config/sodium-options.json").is_file());

    // Sodium is client-only, so a server export has no files.
    let server_out = fx.pack.path().join("build/server");
    fx.modsmith()
        .args(["export", "--ci-mode", "--server-only"])
        .arg(&server_out)
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped Sodium"));
    assert!(!read(&server_out.join("modrinth.index.json")).contains("sodium-fabric"));
}

#[cfg(unix)]
#[test]
fn test_deploy_links_into_directory() {
    let mut fx = Fixture::new();
    fx.mock_registry();
    fx.modsmith().args(["add", "-p", "sodium"]).assert().success();

    let game = tempdir().unwrap();
    fs::create_dir_all(game.path().join("mods")).unwrap();
    fs::write(game.path().join("mods/handmade.jar"), "mine").unwrap();

    fx.modsmith()
        .args(["deploy", "-d"])
        .arg(game.path())
        .assert()
        .success();

    let link = game.path().join("mods/sodium-fabric-0.5.8.jar");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(read(&link), JAR);
    assert_eq!(read(&game.path().join("mods/handmade.jar")), "mine");
    assert!(fs::symlink_metadata(game.path().join("config")).unwrap().file_type().is_symlink());
}

#[test]
fn test_missing_pack_toml_fails() {
    let dir = tempdir().unwrap();
    let cache = tempdir().unwrap();
    Command::new(cargo::cargo_bin!("modsmith"))
        .env("MODSMITH_PACK_DIR", dir.path())
        .env("MODSMITH_CACHE_DIR", cache.path())
        .env_remove("MODRINTH_TOKEN")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pack.toml"));
}

#[test]
fn test_no_subcommand_fails() {
    Command::new(cargo::cargo_bin!("modsmith"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
