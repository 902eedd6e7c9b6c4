use std::fs::File;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plexbrowse::catalog::PlexClient;
use plexbrowse::config::{Config, ConfigError, ServerOverrides};
use plexbrowse::doctor;
use plexbrowse::local::LocalStore;
use plexbrowse::navigation::Navigator;
use plexbrowse::picker::FzfPicker;
use plexbrowse::player::CommandPlayer;

#[derive(Parser)]
#[command(name = "plexbrowse", version, about = "Browse, stream and download from a Plex server")]
struct Cli {
    /// Server base URL, e.g. http://plex.local:32400
    #[arg(long, env = "PLEX_URL")]
    server: Option<String>,

    /// Access token
    #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check server, token, tools and storage, then exit
    Doctor,
}

#[tokio::main]
async fn main() {
    // Log to a file so output never lands in the picker
    let log_path = std::env::temp_dir().join("plexbrowse.log");

    if let Ok(file) = File::create(&log_path) {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .with_ansi(false)
            .with_writer(file)
            .init();
    } else {
        // Fallback to stderr if can't create log file
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let overrides = ServerOverrides {
        url: cli.server,
        token: cli.token,
    };

    let config = match Config::resolve(cli.config, overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            if let ConfigError::NotFound(path) = &e {
                eprintln!("\nCreate a config file at: {}", path.display());
                eprintln!("or set PLEX_URL and PLEX_TOKEN.");
                eprintln!("\nExample config.toml:");
                eprintln!(
                    r#"
[server]
url = "http://localhost:32400"
token = "your-plex-token"

[player]
command = "mpv"

[storage]
download_dir = "/home/you/Media"
"#
                );
            }
            std::process::exit(1);
        }
    };

    let results = doctor::run_checks(&config).await;

    if let Some(Command::Doctor) = cli.command {
        doctor::print_results(&results);
        std::process::exit(if doctor::has_errors(&results) { 1 } else { 0 });
    }

    if doctor::has_errors(&results) {
        doctor::print_results(&results);
        std::process::exit(1);
    }

    info!(server = %config.server.url, "starting");

    let store = LocalStore::new(config.storage.download_dir());
    let mut navigator = Navigator::new(
        PlexClient::new(&config.server),
        store,
        FzfPicker::new(&config.picker),
        CommandPlayer::new(&config.player),
        config.storage.cleanup_partial,
    );

    if let Err(e) = navigator.run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
