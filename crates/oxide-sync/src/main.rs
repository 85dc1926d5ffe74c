//! oxide-sync CLI
//!
//! Command-line tool for synchronizing database schemas with a JSON
//! declaration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_sync::config::DEFAULT_DATABASE;
use oxide_sync::prelude::*;

/// Declarative schema synchronization.
#[derive(Parser)]
#[command(name = "oxide-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema declaration (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// URL of the `default` database, overriding the configuration.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL a synchronization would run, by phase.
    Plan,

    /// Print the pending changes of every declared table.
    Diff,

    /// Synchronize the databases with the declaration.
    Sync {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the introspected structure of a table as JSON.
    Inspect {
        /// Table name.
        table: String,

        /// Database to read from.
        #[arg(long, default_value = DEFAULT_DATABASE)]
        connection: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(url) = &cli.database {
        config.set_database(DEFAULT_DATABASE, url.clone());
    }
    if config.databases.is_empty() {
        anyhow::bail!("No database configured; pass --database or a configuration file");
    }

    let manager = DatabaseManager::from_config(&config).await?;

    match cli.command {
        Commands::Inspect { table, connection } => {
            let state = manager.database(&connection)?.introspect(&table).await?;
            if state.is_empty() {
                info!(table = %table, database = %connection, "Table does not exist");
            }
            println!("{}", serde_json::to_string_pretty(&state)?);
        }

        Commands::Diff => {
            let tables = config.declare_tables(&manager).await?;
            let reflector = Reflector::new(manager);
            for table in &tables {
                if table.is_dropped() {
                    if table.exists() {
                        println!("{}.{}: drop table", table.database(), table.name());
                    }
                    continue;
                }
                let diff = reflector.diff(table);
                if !table.exists() && !table.current().columns.is_empty() {
                    println!("{}.{}: create table", table.database(), table.name());
                } else if !diff.is_empty() {
                    println!("{}.{}:", table.database(), table.name());
                    println!("{}", serde_json::to_string_pretty(&diff)?);
                }
            }
        }

        Commands::Plan => {
            let tables = config.declare_tables(&manager).await?;
            let plan = Reflector::new(manager).plan(&tables)?;
            if plan.is_empty() {
                info!("Nothing to synchronize.");
            }
            for group in plan.groups.iter().filter(|g| !g.is_empty()) {
                println!("-- database: {} ({})", group.database, group.dialect);
                for phase in Phase::ALL {
                    let mut statements = group.phase(phase).peekable();
                    if statements.peek().is_none() {
                        continue;
                    }
                    println!("-- phase: {phase}");
                    for statement in statements {
                        println!("{};", statement.sql);
                    }
                }
            }
        }

        Commands::Sync { dry_run } => {
            let mut tables = config.declare_tables(&manager).await?;
            let reflector = Reflector::new(manager).dry_run(dry_run);

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            let report = reflector.synchronize(&mut tables).await?;
            if dry_run {
                for statement in report.groups.iter().flat_map(|g| &g.statements) {
                    println!("{};", statement.sql);
                }
            } else if report.is_empty() {
                info!("Nothing to synchronize.");
            } else {
                info!(
                    statements = report.statement_count(),
                    "Synchronization complete."
                );
            }
        }
    }

    Ok(())
}
