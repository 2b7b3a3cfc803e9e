use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use perftrack_core::{MigrateSettings, ENV_DATABASE_URL};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "perftrack")]
#[command(about = "Schema migrations for the perftrack backend", long_about = None)]
struct Cli {
    /// Database URL (postgres://, sqlite://path or sqlite::memory:)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Directory to search for migration SQL before the defaults. Repeatable.
    #[arg(long = "migrations-dir", global = true)]
    migrations_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration
    Migrate {
        /// Refuse to run if any catalog entry has no SQL file
        #[arg(long)]
        strict: bool,
    },
    /// Show each catalog entry with its ledger state
    Status,
    /// List the built-in migration catalog
    Catalog,
}

/// Environment settings with command-line overrides applied.
fn resolve_settings(cli: &Cli) -> Result<MigrateSettings> {
    let mut settings = MigrateSettings::from_lookup(|key| match (&cli.database, key) {
        (Some(url), ENV_DATABASE_URL) => Some(url.clone()),
        _ => std::env::var(key).ok(),
    })?;
    if !cli.migrations_dirs.is_empty() {
        let from_env = std::mem::take(&mut settings.migrations_dirs);
        settings.migrations_dirs = cli.migrations_dirs.iter().cloned().chain(from_env).collect();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::info!("no .env file found, using environment"),
        Err(e) => tracing::warn!("failed to load .env file: {}", e),
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Migrate { strict } => {
            let mut settings = resolve_settings(&cli)?;
            settings.fail_on_missing |= *strict;
            commands::migrate::run(&settings).await?;
        },
        Commands::Status => {
            let settings = resolve_settings(&cli)?;
            commands::status::run(&settings).await?;
        },
        Commands::Catalog => commands::catalog::run()?,
    }

    Ok(())
}
