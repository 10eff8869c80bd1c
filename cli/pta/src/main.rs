//! pta: fetch, inspect, package, and publish PyTerrier artifacts.

mod commands;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pta_artifact::{Config, Resolver};

#[derive(Parser)]
#[command(name = "pta", version, about = "PyTerrier artifact tool")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize a locator and print its local path
    Fetch {
        /// Local path or URL (https://, file://, hf:org/repo[@rev])
        locator: String,
        /// Expected SHA-256 of the downloaded package
        #[arg(long)]
        sha256: Option<String>,
        /// Download again even if cached
        #[arg(long)]
        refresh: bool,
    },
    /// Print the metadata of an artifact as JSON
    Meta {
        /// Local path or URL
        locator: String,
    },
    /// Build a package from an artifact directory
    Package {
        /// Artifact directory
        dir: PathBuf,
        /// Package file; the extension (.lz4, .gz, .tar) picks the compression (default: ./artifact.tar.lz4)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Split into segments of this size (e.g. 500M, 2G)
        #[arg(long, value_parser = commands::package::parse_size)]
        max_file_size: Option<u64>,
        /// Artifact type, for directories without pt_meta.json
        #[arg(long = "type")]
        artifact_type: Option<String>,
        /// Artifact format, for directories without pt_meta.json
        #[arg(long)]
        format: Option<String>,
        /// Package providing the implementation
        #[arg(long)]
        package_hint: Option<String>,
    },
    /// Package an artifact directory and publish it
    Upload {
        /// Artifact directory
        dir: PathBuf,
        /// Destination (file:// URL or local path)
        destination: String,
        /// Split into segments of this size (e.g. 500M, 2G)
        #[arg(long, value_parser = commands::package::parse_size)]
        max_file_size: Option<u64>,
        /// Title for the README card
        #[arg(long)]
        name: Option<String>,
    },
    /// Inspect or prune the artifact cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached artifacts
    List,
    /// Print where a locator is cached
    Path { locator: String },
    /// Remove the cached copy of a locator
    Remove { locator: String },
    /// Remove every cached artifact
    Clear,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    tracing::debug!(home = %config.home.display(), "pta {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch {
            locator,
            sha256,
            refresh,
        } => commands::fetch::fetch(&resolver(&config)?, &locator, sha256, refresh),

        Commands::Meta { locator } => commands::fetch::meta(&resolver(&config)?, &locator),

        Commands::Package {
            dir,
            output,
            max_file_size,
            artifact_type,
            format,
            package_hint,
        } => commands::package::run(
            &dir,
            output,
            max_file_size,
            commands::package::metadata_override(artifact_type, format, package_hint),
        ),

        Commands::Upload {
            dir,
            destination,
            max_file_size,
            name,
        } => commands::upload::run(&resolver(&config)?, &dir, &destination, max_file_size, name),

        Commands::Cache { action } => {
            let resolver = resolver(&config)?;
            let cache = resolver.cache();
            match action {
                CacheAction::List => commands::cache::list(cache),
                CacheAction::Path { locator } => commands::cache::path(cache, &locator),
                CacheAction::Remove { locator } => commands::cache::remove(cache, &locator),
                CacheAction::Clear => commands::cache::clear(cache),
            }
        }
    }
}

fn resolver(config: &Config) -> anyhow::Result<Resolver> {
    Resolver::from_config(config).context("setting up artifact resolver")
}
