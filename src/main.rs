//! GC Balance Checker
//!
//! Command-line front end over a collection of GC readings stored in SQLite.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gc_balance_checker::calculator::{self, NormalizeOutcome};
use gc_balance_checker::export::{self, ExportOptions};
use gc_balance_checker::{
    db, ingest, AppendPolicy, AppendReport, Component, DepthUnit, Field, Row, RowCollection,
    RowId, RowInput, RowRecord, Settings,
};

#[derive(Parser)]
#[command(name = "gc-balance-checker")]
#[command(about = "Consistency checker for gas chromatography well-log readings")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "gc_rows.db", env = "GC_CHECK_DB")]
    database: PathBuf,

    /// TOML settings file
    #[arg(short, long, env = "GC_CHECK_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: SettingsOverrides,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SettingsOverrides {
    /// ppm per gas unit
    #[arg(long)]
    ppm_per_unit: Option<f64>,

    /// Relative tolerance for the balance check (0.01 = 1%)
    #[arg(long)]
    tolerance: Option<f64>,

    /// TotalGas above this raises the alert
    #[arg(long)]
    alert_threshold: Option<f64>,

    /// Decimal places kept when normalizing
    #[arg(long)]
    decimals: Option<u32>,

    /// Depth display unit (m or ft)
    #[arg(long)]
    depth_unit: Option<DepthUnit>,
}

#[derive(Args)]
struct AppendArgs {
    /// Only append rows deeper than the deepest logged depth
    #[arg(long)]
    only_deeper: bool,

    /// Append the deeper rows without asking when some were filtered out
    #[arg(short, long)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import rows from a CSV/TSV/TXT/XLSX/XLS file, or every such file under a directory
    Import {
        path: PathBuf,

        #[command(flatten)]
        append: AppendArgs,
    },

    /// Read pasted rows from stdin (tab, comma or space separated; header optional)
    Paste {
        #[command(flatten)]
        append: AppendArgs,
    },

    /// Add an empty row
    AddRow,

    /// Set one field of a row
    Set {
        id: RowId,
        /// Depth, TotalGas, C1, C2, C3, iC4, nC4, iC5 or nC5
        field: Field,
        /// New value; empty string clears it
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Remove a row
    Remove { id: RowId },

    /// Rescale a row's components to match its TotalGas
    Normalize {
        /// Row to normalize
        #[arg(required_unless_present = "all")]
        id: Option<RowId>,

        /// Normalize every BAD row
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Show all rows
    List {
        /// Print the persisted records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show min/max TotalGas, balance counts and the alert flag
    Summary,

    /// Export results as CSV, or as a workbook when OUTPUT ends in .xlsx
    Export {
        output: PathBuf,

        /// Order rows by depth (workbooks are always ordered)
        #[arg(long)]
        sort_depth: bool,

        /// Append the max gas breakdown after the table (workbooks always have it)
        #[arg(long)]
        max_summary: bool,
    },

    /// Remove all rows
    Clear,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let o = &cli.overrides;
    if let Some(v) = o.ppm_per_unit {
        settings.ppm_per_unit = v;
    }
    if let Some(v) = o.tolerance {
        settings.tolerance_fraction = v;
    }
    if let Some(v) = o.alert_threshold {
        settings.alert_threshold = v;
    }
    if let Some(v) = o.decimals {
        settings.normalize_decimals = v;
    }
    if let Some(v) = o.depth_unit {
        settings.depth_unit = v;
    }
    settings.validate()?;
    Ok(settings)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(&cli)?;
    debug!(?settings, "Settings resolved");

    let mut conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    let mut rows = RowCollection::from_snapshot(settings, db::load_snapshot(&conn)?);

    let changed = match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
            false
        }

        Commands::Import { path, append } => {
            let batch = ingest::read_path(&path)?;
            ingest_batch(&mut rows, batch, &append)?
        }

        Commands::Paste { append } => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            let batch = ingest::parse_text(&text)?;
            ingest_batch(&mut rows, batch, &append)?
        }

        Commands::AddRow => {
            let row = rows.add_empty_row();
            println!("Added empty row {}", row.id);
            true
        }

        Commands::Set { id, field, value } => {
            if !rows.update_field(id, field, &value) {
                bail!("Row {} not found", id);
            }
            if let Some(row) = rows.get(id) {
                print_row(row, rows.settings().depth_unit);
            }
            true
        }

        Commands::Remove { id } => {
            if rows.remove_row(id) {
                println!("Removed row {}", id);
                true
            } else {
                println!("Row {} not found", id);
                false
            }
        }

        Commands::Normalize { id: _, all: true } => {
            let count = rows.normalize_inconsistent();
            println!("Normalized {} rows", count);
            count > 0
        }

        Commands::Normalize { id, all: false } => {
            let Some(id) = id else {
                bail!("Give a row id or --all");
            };
            match rows.normalize_row(id) {
                Some(NormalizeOutcome::Normalized { factor }) => {
                    println!("Row {} normalized (factor {:.6})", id, factor);
                    true
                }
                Some(NormalizeOutcome::Unchanged) => {
                    println!("Row {} unchanged: component sum is zero", id);
                    false
                }
                None => bail!("Row {} not found", id),
            }
        }

        Commands::List { json } => {
            if json {
                let records: Vec<RowRecord> = rows.records();
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_table(&rows);
            }
            false
        }

        Commands::Summary => {
            println!("{}", calculator::summarize_collection(&rows));
            false
        }

        Commands::Export {
            output,
            sort_depth,
            max_summary,
        } => {
            let options = ExportOptions {
                depth_unit: rows.settings().depth_unit,
                sort_by_depth: sort_depth,
                include_max_summary: max_summary,
            };
            let count = export::export_to_file(&output, &rows, &options)?;
            println!("Exported {} rows to {}", count, output.display());
            false
        }

        Commands::Clear => {
            rows.clear();
            println!("All rows removed");
            true
        }
    };

    if changed {
        db::save_snapshot(&mut conn, &rows.snapshot())?;
    }

    Ok(())
}

/// Apply an ingested batch under the chosen append policy.
fn ingest_batch(rows: &mut RowCollection, batch: Vec<RowInput>, append: &AppendArgs) -> Result<bool> {
    if batch.is_empty() {
        println!("No valid data found");
        return Ok(false);
    }

    let policy = if append.only_deeper {
        AppendPolicy::OnlyDeeper { confirmed: append.yes }
    } else {
        AppendPolicy::All
    };

    let report = rows.append_batch(batch, policy)?;
    match report {
        AppendReport::Added { added, total } if added == total => println!("Added {} rows", added),
        AppendReport::Added { added, total } => {
            println!("Added {} of {} rows (skipped {} at logged depths)", added, total, total - added)
        }
        AppendReport::AllStale { total } => {
            println!("All {} rows are at or above the deepest logged depth; nothing added", total)
        }
        AppendReport::AwaitingConfirmation { fresh, total } => println!(
            "Would append {} of {} rows; {} are at already-logged depths. Re-run with --yes to append.",
            fresh,
            total,
            total - fresh
        ),
    }
    Ok(report.changed())
}

fn fmt_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

fn print_row(row: &Row, depth_unit: DepthUnit) {
    let mut line = format!(
        "{:>5} {:>10} {:>9}",
        row.id,
        depth_unit.format_depth(&row.input.depth),
        fmt_cell(row.input.total_gas)
    );
    for c in Component::ALL {
        line.push_str(&format!(" {:>9}", fmt_cell(row.input.component(c))));
    }
    line.push_str(&format!(
        " {:>9.4} {:>8.4}% {:>5}{}",
        row.results.sum_units,
        row.results.percent,
        if row.results.is_consistent { "GOOD" } else { "BAD" },
        if row.normalized { " (normalized)" } else { "" }
    ));
    println!("{}", line);
}

fn print_table(rows: &RowCollection) {
    if rows.is_empty() {
        println!("No rows yet. Run 'import', 'paste' or 'add-row' first.");
        return;
    }

    let depth_unit = rows.settings().depth_unit;
    let mut header = format!(
        "{:>5} {:>10} {:>9}",
        "#",
        format!("Depth ({})", depth_unit.suffix()),
        "Total (u)"
    );
    for c in Component::ALL {
        header.push_str(&format!(" {:>9}", c.as_str()));
    }
    header.push_str(&format!(" {:>9} {:>9} {:>5}", "Sum (u)", "Total %", "Status"));
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));

    for row in rows.rows() {
        print_row(row, depth_unit);
    }

    if rows.over_threshold() {
        println!();
        println!("ALERT: TotalGas > {}", rows.settings().alert_threshold);
    }
}
