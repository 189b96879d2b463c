//! Switchyard command-line front end
//!
//! Reports routing status, edits flags, migrates spreadsheet tables into the
//! relational database, and writes or restores backups.
//!
//! Usage:
//!   switchyard --config switchyard.toml status
//!   switchyard migrate --dry-run --table policies

use std::collections::BTreeMap;
use std::path::PathBuf;
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use switchyard_cli::{parse_rename, App, Backend, SwitchyardConfig};
use switchyard_migrate::{MigrationReport, RestoreOptions, RestoreReport};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Dual-backend data access: routing, migration and backups")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which backends are available and the current flags
    Status,

    /// Inspect or change routing flags
    Flags {
        #[command(subcommand)]
        action: FlagsAction,
    },

    /// Copy the configured spreadsheet tables into the relational database
    Migrate {
        /// Validate only; write nothing
        #[arg(long)]
        dry_run: bool,

        /// Limit the run to these tables (source or destination name)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Write a snapshot of the given tables
    Backup {
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Write a zip archive instead of plain JSON
        #[arg(long)]
        compress: bool,

        #[arg(long, value_enum, default_value_t = Backend::Spreadsheet)]
        from: Backend,
    },

    /// Load a snapshot back into a backend
    Restore {
        path: PathBuf,

        #[arg(long = "table")]
        tables: Vec<String>,

        /// Count rows without writing
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_enum, default_value_t = Backend::Relational)]
        into: Backend,

        /// Restore a table under another name (FROM=TO)
        #[arg(long, value_parser = parse_rename)]
        rename: Vec<(String, String)>,
    },
}

#[derive(Subcommand, Debug)]
enum FlagsAction {
    /// Print every flag
    List,
    /// Persist one flag
    Set {
        key: String,
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
    /// Re-read the flag file
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = SwitchyardConfig::load_or_default(&args.config)?;
    let app = App::open(config)?;

    match args.command {
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&app.status())?);
        }
        Command::Flags { action } => match action {
            FlagsAction::List => println!("{}", serde_json::to_string_pretty(&app.flags())?),
            FlagsAction::Set { key, value } => {
                app.set_flag(&key, value)?;
                println!("{key} = {value}");
            }
            FlagsAction::Reload => {
                println!("{}", serde_json::to_string_pretty(&app.reload_flags()?)?);
            }
        },
        Command::Migrate { dry_run, tables } => {
            let report = app.migrate(dry_run, &tables).await?;
            print_migration(&report, dry_run);
        }
        Command::Backup {
            tables,
            compress,
            from,
        } => {
            let outcome = app.backup(from, &tables, compress).await?;
            println!("Backup written: {}", outcome.path.display());
            println!(
                "  {} table(s), {} row(s)",
                outcome.metadata.tables.len(),
                outcome.metadata.total_rows
            );
            for table in &outcome.failed_tables {
                println!("  FAILED: {table}");
            }
            for path in &outcome.pruned {
                println!("  pruned {}", path.display());
            }
            if let Some(error) = &outcome.prune_error {
                println!("  pruning failed: {error}");
            }
        }
        Command::Restore {
            path,
            tables,
            dry_run,
            into,
            rename,
        } => {
            let options = RestoreOptions {
                tables,
                dry_run,
                rename: rename.into_iter().collect::<BTreeMap<_, _>>(),
            };
            let report = app.restore(&path, into, &options).await?;
            print_restore(&report);
        }
    }
    Ok(())
}

fn print_migration(report: &MigrationReport, dry_run: bool) {
    println!("\n========================================");
    println!("  Migration {}", if dry_run { "(dry run)" } else { "report" });
    println!("========================================");
    for (table, result) in &report.tables {
        println!(
            "  {table}: {} total, {} ok, {} failed, {} skipped",
            result.total, result.success, result.failed, result.skipped
        );
        for entry in result.error_preview(5) {
            let detail = match (&entry.errors, &entry.error) {
                (Some(errors), _) => errors.join("; "),
                (None, Some(error)) => error.clone(),
                (None, None) => String::new(),
            };
            match entry.row {
                Some(row) => println!("    row {row}: {detail}"),
                None => println!("    {detail}"),
            }
        }
        if result.errors.len() > 5 {
            println!("    ... and {} more", result.errors.len() - 5);
        }
    }
    for table in &report.aborted {
        println!("  ABORTED: {table}");
    }
    println!(
        "  Overall: {} total, {} ok, {} failed, {} skipped",
        report.total(),
        report.success(),
        report.failed(),
        report.skipped()
    );
    println!("========================================\n");
}

fn print_restore(report: &RestoreReport) {
    for (table, outcome) in &report.tables {
        if let Some(reason) = &outcome.skipped {
            println!("  {table}: skipped ({reason})");
        } else if report.dry_run {
            println!("  {table} -> {}: would restore {} row(s)", outcome.destination, outcome.expected);
        } else {
            println!(
                "  {table} -> {}: {}/{} restored, {} failed",
                outcome.destination, outcome.restored, outcome.expected, outcome.failed
            );
        }
    }
}
