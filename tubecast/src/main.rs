//! tubecast - video channels as podcast feeds
//!
//! Command-line front end for the show engine. Configuration comes from the
//! TOML bootstrap file; the root folder and config file locations can be
//! overridden on the command line or through the environment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tubecast::config::BackendSecrets;
use tubecast::sources::YtDlpSource;
use tubecast::storage::build_backend;
use tubecast::{Engine, EngineConfig, EngineError};
use tubecast_common::config::{
    load_toml_config, resolve_config_path, write_toml_config, LoggingConfig, RootFolderResolver,
    TomlConfig,
};

#[derive(Parser, Debug)]
#[command(name = "tubecast")]
#[command(about = "Publish video channels as podcast feeds")]
#[command(version)]
struct Args {
    /// Root folder for snapshots, feeds and staged media
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new show
    CreateShow {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Local image used as cover art
        #[arg(long)]
        cover: Option<PathBuf>,
    },
    /// Remove a show with all its episodes
    RemoveShow {
        #[arg(long)]
        title: String,
    },
    /// Add one video to a show
    AddVideo {
        #[arg(long)]
        title: String,
        /// Video link or identifier
        #[arg(long)]
        url: String,
        /// Create the show with this description if it does not exist
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove one video from a show
    RemoveVideo {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
    },
    /// Subscribe a show to a channel and fetch its latest videos
    SyncChannel {
        #[arg(long)]
        title: String,
        /// Channel handle (`name` or `@name`)
        #[arg(long)]
        channel: String,
        /// Create the show with this description if it does not exist
        #[arg(long)]
        description: Option<String>,
    },
    /// Fetch new videos for every subscription of every show
    Sync,
    /// List shows
    List,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    init_logging(&toml_config.logging)?;

    if let Command::InitConfig { force } = args.command {
        return init_config(&config_path, force).await;
    }

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), &toml_config).resolve();
    info!(root = %root_folder.display(), config = %config_path.display(), "Starting tubecast");

    let engine = open_engine(root_folder, &toml_config).await?;

    match run(&engine, args.command).await {
        Ok(()) => Ok(()),
        Err(e) => {
            report_failure(&e);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` first, then the configured level; optional log file
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_toml_config(&TomlConfig::default(), path)
        .await
        .with_context(|| format!("Failed to write config {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn open_engine(root_folder: PathBuf, toml_config: &TomlConfig) -> Result<Engine> {
    let engine_config = EngineConfig::from_toml(root_folder, toml_config)
        .context("Invalid configuration")?;

    let secrets = BackendSecrets::resolve(&toml_config.storage);
    let backend = build_backend(toml_config.storage.backend, &secrets)
        .with_context(|| format!("Failed to set up {} storage", toml_config.storage.backend))?;
    let source = Arc::new(YtDlpSource::new().context("Failed to set up video source")?);

    Engine::open(engine_config, source, backend)
        .await
        .context("Failed to open show store")
}

async fn run(engine: &Engine, command: Command) -> Result<(), EngineError> {
    match command {
        Command::CreateShow {
            title,
            description,
            cover,
        } => {
            let show = engine
                .create_show(&title, &description, cover.as_deref())
                .await?;
            println!("Created show '{}'", show.title);
            print_feed_url(&show.feed_url);
        }
        Command::RemoveShow { title } => {
            let report = engine.remove_show(&title).await?;
            println!(
                "Removed show '{}' ({} remote objects deleted)",
                report.title, report.deleted_objects
            );
        }
        Command::AddVideo {
            title,
            url,
            description,
        } => {
            let outcome = engine
                .add_video(&title, &url, description.as_deref())
                .await?;
            for guid in &outcome.evicted {
                println!("Evicted {} to stay within quota", guid);
            }
            println!(
                "Added '{}' ({}) to '{}'",
                outcome.episode.title, outcome.episode.guid, title
            );
            match (&outcome.publish.feed_url, &outcome.publish.remote_error) {
                (Some(url), _) => print_feed_url(url),
                (None, Some(reason)) => println!("Feed not published: {}", reason),
                (None, None) => {}
            }
        }
        Command::RemoveVideo { title, url } => {
            let episode = engine.remove_video(&title, &url).await?;
            println!("Removed '{}' ({}) from '{}'", episode.title, episode.guid, title);
        }
        Command::SyncChannel {
            title,
            channel,
            description,
        } => {
            let report = engine
                .sync_channel(&title, &channel, description.as_deref())
                .await?;
            print_sync_report(&report);
        }
        Command::Sync => {
            let report = engine.sync_all().await?;
            print_sync_report(&report);
        }
        Command::List => {
            let shows = engine.list_shows().await?;
            if shows.is_empty() {
                println!("No shows");
            }
            for show in shows {
                println!(
                    "{} ({} episodes, {} MiB)",
                    show.title,
                    show.episode_count,
                    show.enclosure_bytes / (1024 * 1024)
                );
                if !show.subscribed_channels.is_empty() {
                    println!("  channels: {}", show.subscribed_channels.join(", "));
                }
                if !show.feed_url.is_empty() {
                    println!("  feed: {}", show.feed_url);
                }
            }
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn print_feed_url(url: &str) {
    if url.is_empty() {
        println!("Feed not published yet");
    } else {
        println!("Feed: {}", url);
    }
}

fn print_sync_report(report: &tubecast::services::SyncReport) {
    for item in &report.added {
        println!("Added {} to '{}'", item.guid, item.show);
    }
    for item in &report.evicted {
        println!("Evicted {} from '{}'", item.guid, item.show);
    }
    for item in &report.skipped {
        println!("Skipped {} in '{}': {}", item.guid, item.show, item.reason);
    }
    for (show, reason) in &report.publish_errors {
        println!("Feed of '{}' not published: {}", show, reason);
    }
    println!(
        "{} channel(s) synced, {} added, {} skipped",
        report.channels_synced,
        report.added.len(),
        report.skipped.len()
    );
}

fn report_failure(e: &EngineError) {
    warn!(stage = %e.stage(), error = %e, "Operation failed");
    eprintln!("Error ({} stage): {}", e.stage(), e);
    if e.is_retryable() {
        eprintln!("This may be temporary; retrying later may succeed.");
    } else {
        eprintln!("Retrying will not help without changing the request.");
    }
}
