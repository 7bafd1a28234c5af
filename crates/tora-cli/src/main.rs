use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ArchivePass, SyncPass};

#[derive(Parser)]
#[command(name = "tora")]
#[command(about = "ToR archivist operator CLI", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass and print its summary as a JSON line
    Sync {
        #[arg(value_enum)]
        pass: SyncPass,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true, num_args = 1..)]
        config_paths: Vec<String>,

        /// Sync the debug subreddit instead of the production one
        #[arg(long)]
        debug: bool,
    },

    /// Run one archival pass and print its summary as a JSON line
    Archive {
        #[arg(value_enum)]
        pass: ArchivePass,

        #[arg(long = "config", required = true, num_args = 1..)]
        config_paths: Vec<String>,

        #[arg(long)]
        debug: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env overlays)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate config layers: secrets, unused keys, typed settings
    ConfigCheck {
        #[arg(long = "config", required = true, num_args = 1..)]
        config_paths: Vec<String>,

        /// Fail on unused keys instead of warning
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Sync {
            pass,
            config_paths,
            debug,
        } => commands::sync::run(pass, &config_paths, debug).await,
        Commands::Archive {
            pass,
            config_paths,
            debug,
        } => commands::sync::archive(pass, &config_paths, debug).await,
        Commands::ConfigHash { paths } => commands::config::hash(&paths),
        Commands::ConfigCheck {
            config_paths,
            strict,
        } => commands::config::check(&config_paths, strict),
    }
}

/// Logs go to stderr; stdout carries only command output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
