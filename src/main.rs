use anyhow::Result;
use clap::Parser;
use modsmith::commands::{self, Config, DeployTarget, GlobalOptions, config::DEFAULT_JOBS};
use modsmith::resolve::ModRequest;
use std::path::PathBuf;

/// modsmith - Minecraft modpack manager for Modrinth
///
/// Resolves mods and their dependencies from Modrinth, keeps them in a
/// shared download cache and links them into game directories.
///
/// If the MODRINTH_TOKEN environment variable is set, it is sent as the
/// Authorization header.
///
/// Examples:
///   modsmith add -p sodium -s "iris shaders"
///   modsmith deploy --instance "Sky 1.20"
///   modsmith export --server-only
#[derive(Parser, Debug)]
#[command(author, version = env!("MODSMITH_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pack directory containing pack.toml (defaults to the current directory)
    #[arg(
        long = "pack-dir",
        short = 'C',
        env = "MODSMITH_PACK_DIR",
        value_name = "PATH",
        global = true
    )]
    pack_dir: Option<PathBuf>,

    /// Download cache directory (defaults to the user cache directory)
    #[arg(long = "cache-dir", env = "MODSMITH_CACHE_DIR", value_name = "PATH", global = true)]
    cache_dir: Option<PathBuf>,

    /// Modrinth API URL (defaults to https://api.modrinth.com/v2)
    #[arg(long = "api-url", env = "MODSMITH_API_URL", value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Concurrent downloads and lookups
    #[arg(long, short = 'j', default_value_t = DEFAULT_JOBS, global = true)]
    jobs: usize,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Add mods and their required dependencies
    Add(AddArgs),

    /// Move every unpinned mod to its newest compatible version
    Update,

    /// Keep mods at their current version during updates
    Pin(ModsArgs),

    /// Let pinned mods update again
    Unpin(ModsArgs),

    /// Remove mods and the dependencies nothing else needs
    Remove(ModsArgs),

    /// Download every mod in the index into the cache
    Download,

    /// List the mods in the pack
    List,

    /// Link the pack into a game directory
    Deploy(DeployArgs),

    /// Export the pack as a Modrinth modpack (.mrpack)
    Export(ExportArgs),
}

#[derive(clap::Args, Debug)]
#[command(group(clap::ArgGroup::new("request").required(true).multiple(true)))]
struct AddArgs {
    /// Project id or slug
    #[arg(long, short = 'p', value_name = "PROJECT", group = "request")]
    project: Vec<String>,

    /// Exact version id
    #[arg(long = "version-id", short = 'V', value_name = "VERSION", group = "request")]
    version_id: Vec<String>,

    /// Search query, must match a single project
    #[arg(long, short = 's', value_name = "QUERY", group = "request")]
    search: Vec<String>,
}

impl AddArgs {
    fn requests(self) -> Vec<ModRequest> {
        let mut requests: Vec<ModRequest> = self.project.into_iter().map(ModRequest::Project).collect();
        requests.extend(self.version_id.into_iter().map(ModRequest::Version));
        requests.extend(self.search.into_iter().map(ModRequest::Search));
        requests
    }
}

#[derive(clap::Args, Debug)]
struct ModsArgs {
    /// Project ids or names
    #[arg(value_name = "MOD", required = true)]
    mods: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct DeployArgs {
    /// Game directory to deploy into
    #[arg(long, short = 'd', value_name = "PATH", conflicts_with = "instance")]
    directory: Option<PathBuf>,

    /// Prism Launcher instance to deploy into
    #[arg(long, short = 'i', value_name = "NAME")]
    instance: Option<String>,
}

impl DeployArgs {
    fn target(self) -> DeployTarget {
        match (self.directory, self.instance) {
            (Some(dir), _) => DeployTarget::Directory(dir),
            (None, Some(name)) => DeployTarget::Instance(name),
            (None, None) => DeployTarget::Default,
        }
    }
}

#[derive(clap::Args, Debug)]
struct ExportArgs {
    /// Output path (defaults to <name>-<version>.mrpack in the pack directory)
    #[arg(value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write an unpacked directory instead of a zip
    #[arg(long)]
    ci_mode: bool,

    /// Leave client-only mods out
    #[arg(long)]
    server_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let options = GlobalOptions {
        pack_dir: cli.pack_dir,
        cache_dir: cli.cache_dir,
        api_url: cli.api_url,
        jobs: cli.jobs,
    };
    let config = Config::new(modsmith::runtime::RealRuntime, options)?;

    match cli.command {
        Commands::Add(args) => commands::add(&config, &args.requests()).await?,
        Commands::Update => commands::update(&config).await?,
        Commands::Pin(args) => commands::pin(&config, &args.mods)?,
        Commands::Unpin(args) => commands::unpin(&config, &args.mods)?,
        Commands::Remove(args) => commands::remove(&config, &args.mods)?,
        Commands::Download => commands::download(&config).await?,
        Commands::List => commands::list(&config)?,
        Commands::Deploy(args) => commands::deploy(&config, args.target())?,
        Commands::Export(args) => {
            commands::export(&config, args.output, args.ci_mode, args.server_only).await?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_add_collects_requests_in_order() {
        let cli = Cli::try_parse_from([
            "modsmith", "add", "-s", "iris shaders", "-p", "sodium", "-V", "abc123", "-p", "lithium",
        ])
        .unwrap();
        match cli.command {
            Commands::Add(args) => assert_eq!(
                args.requests(),
                vec![
                    ModRequest::Project("sodium".to_string()),
                    ModRequest::Project("lithium".to_string()),
                    ModRequest::Version("abc123".to_string()),
                    ModRequest::Search("iris shaders".to_string()),
                ]
            ),
            _ => panic!("Expected Add command"),
        }
    }

    #[test]
    fn test_cli_add_requires_a_request() {
        assert!(Cli::try_parse_from(["modsmith", "add"]).is_err());
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from(["modsmith", "list", "--pack-dir", "/packs/sky", "-j", "3"]).unwrap();
        assert_eq!(cli.pack_dir, Some(PathBuf::from("/packs/sky")));
        assert_eq!(cli.jobs, 3);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_cli_deploy_target() {
        let cli = Cli::try_parse_from(["modsmith", "deploy", "-i", "Sky"]).unwrap();
        match cli.command {
            Commands::Deploy(args) => assert_eq!(args.target(), DeployTarget::Instance("Sky".to_string())),
            _ => panic!("Expected Deploy command"),
        }

        assert!(Cli::try_parse_from(["modsmith", "deploy", "-i", "Sky", "-d", "/tmp"]).is_err());

        let cli = Cli::try_parse_from(["modsmith", "deploy"]).unwrap();
        match cli.command {
            Commands::Deploy(args) => assert_eq!(args.target(), DeployTarget::Default),
            _ => panic!("Expected Deploy command"),
        }
    }

    #[test]
    fn test_cli_export_flags() {
        let cli = Cli::try_parse_from(["modsmith", "export", "out.mrpack", "--server-only"]).unwrap();
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.output, Some(PathBuf::from("out.mrpack")));
                assert!(args.server_only);
                assert!(!args.ci_mode);
            }
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_cli_pin_requires_mods() {
        assert!(Cli::try_parse_from(["modsmith", "pin"]).is_err());
    }
}
