use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use companion_sync::logging::init_tracing;
use companion_sync::{ClearReason, SyncEngine, SyncEngineConfig, TableName};

/// Conference companion cache operator tool
#[derive(Parser, Debug)]
#[command(name = "companion-sync")]
#[command(about = "Sync and inspect the offline conference companion cache")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "COMPANION_SYNC_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the given tables, or every configured table
    Sync {
        tables: Vec<TableName>,
    },
    /// Print the cached envelope of one table
    Show {
        table: TableName,
    },
    /// Show which tables are cached and when they were fetched
    Status,
    /// Remove all cached data and the authentication marker
    Clear,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs)?;

    let config = SyncEngineConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(db_path = %config.storage.db_path, base_url = %config.remote.base_url, "Configuration loaded");

    let engine = SyncEngine::open(config)
        .await
        .context("Failed to open the sync engine")?;

    match cli.command {
        Command::Sync { tables } => {
            let report = engine.sync_now(&tables).await?;
            print_json(&report)?;
            if !report.success {
                bail!("Sync incomplete: {} table(s) failed", report.errors.len());
            }
        }
        Command::Show { table } => match engine.store().read(table).await? {
            Some(envelope) => print_json(&envelope)?,
            None => bail!("No cached data for {}", table),
        },
        Command::Status => {
            print_json(&engine.status().await?)?;
        }
        Command::Clear => {
            let report = engine.clear(ClearReason::Requested).await;
            print_json(&report)?;
            if !report.cleared {
                bail!("Cache clear failed: {}", report.errors.join("; "));
            }
        }
    }

    Ok(())
}
