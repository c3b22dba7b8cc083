use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use insights::config::Config;
use insights::logging;
use insights::renderer;
use insights::report::MetricsReport;
use insights::report_builder::{generate_report, ReportRequest};
use insights::store::{MetricsDb, RecordSource, Snapshot};
use insights::uptime::HttpUptimeProvider;

// Help text constants
const HELP_MAIN: &str = "\
insights — usage metrics for the building-code assistant dashboard

Commands:
    report    Aggregate users and conversations into a metrics report.
    import    Load a JSON export into the SQLite metrics database.
    render    Render a saved JSON report as Markdown.

Usage:
    insights report --range <day|week|month|year|custom> [--from <date> --to <date>] [--snapshot <path>] [--format json|md] [--output <path>]
    insights import --snapshot <path> [--db <path>]
    insights render --report <path> [--output <path>]

More help:
    insights --help report
    insights --help import
    insights --help env";

const HELP_REPORT: &str = "\
Aggregate users and conversations into a metrics report

Usage:
    insights report --range <range> [--from <YYYY-MM-DD> --to <YYYY-MM-DD>] [options]

Options:
    --range <range>      day, week, month, year or custom. Unknown values fall back to month.
    --from <date>        Custom range start date (inclusive). Required with --range custom.
    --to <date>          Custom range end date (inclusive). Required with --range custom.
    --now <rfc3339>      Reference instant (default: current time).
    --snapshot <path>    Read records from a JSON export instead of the database.
    --db <path>          SQLite database (default: $INSIGHTS_DB or insights.sqlite).
    --format <format>    json (default) or md.
    --output <path>      Write to a file instead of stdout.

Examples:
  insights report --range week
  insights report --range custom --from 2025-01-01 --to 2025-01-31 --format md --output january.md";

const HELP_IMPORT: &str = "\
Load a JSON export into the SQLite metrics database

Usage:
    insights import --snapshot <path> [--db <path>]

The export is an object with `users` and `conversations` arrays. Records are
upserted by id, so re-importing a newer export refreshes the database.";

const HELP_ENV: &str = "\
Environment

    INSIGHTS_DB                    SQLite database path (default: insights.sqlite)
    UPTIMEROBOT_API_KEY            UptimeRobot read-only key. Without it uptime reports 99.9.
    UPTIMEROBOT_ENDPOINT           Override the getMonitors endpoint.
    INSIGHTS_UPTIME_TIMEOUT_SECS   Uptime request timeout in seconds (default: 5)
    INSIGHTS_LOG_DIR               Append logs to <dir>/insights.log instead of stderr.
    RUST_LOG                       Log filter (default: info)";

#[derive(Parser)]
#[command(name = "insights", disable_help_flag = true)]
#[command(about = "Usage metrics for the building-code assistant dashboard", long_about = None)]
struct Cli {
    /// Show help (global or per topic). Example: insights --help report
    #[arg(long, value_name = "TOPIC", num_args = 0..=1, default_missing_value = "")]
    help: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Md,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate users and conversations into a metrics report
    Report {
        /// Range token: day, week, month, year or custom
        #[arg(long, default_value = "month")]
        range: String,
        /// Custom range start (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Custom range end (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Read records from a JSON export
        #[arg(long, conflicts_with = "db")]
        snapshot: Option<PathBuf>,
        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "json")]
        format: Format,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a JSON export into the SQLite metrics database
    Import {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Render a saved JSON report
    Render {
        #[arg(long)]
        report: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(help_topic) = cli.help {
        let topic = help_topic.trim();
        if topic.is_empty() {
            println!("{}", HELP_MAIN);
        } else if topic.eq_ignore_ascii_case("report") {
            println!("{}", HELP_REPORT);
        } else if topic.eq_ignore_ascii_case("import") {
            println!("{}", HELP_IMPORT);
        } else if topic.eq_ignore_ascii_case("env") {
            println!("{}", HELP_ENV);
        } else {
            println!("Unknown help topic: {}", topic);
        }
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("No command specified.");
        eprintln!("Example: insights report --range week");
        return Ok(());
    };

    let config = Config::from_env()?;

    match command {
        Commands::Report {
            range,
            from,
            to,
            now,
            snapshot,
            db,
            format,
            output,
        } => {
            logging::init_logging(config.log_dir.as_deref(), "report")?;
            let request = ReportRequest { range, from, to };
            let now = now.unwrap_or_else(Utc::now);

            let report = tokio::runtime::Runtime::new()
                .context("Failed to create Tokio runtime")?
                .block_on(load_and_report(snapshot, db, &config, &request, now))?;

            let rendered = match format {
                Format::Json => serde_json::to_string_pretty(&report)?,
                Format::Md => renderer::md::render(&report)?,
            };
            write_output(output.as_deref(), &rendered)
        }
        Commands::Import { snapshot, db } => {
            logging::init_logging(config.log_dir.as_deref(), "import")?;
            let path = db.unwrap_or_else(|| config.db_path.clone());
            let source = Snapshot::load_from_file(&snapshot)?;
            let (users, conversations) = MetricsDb::init(&path)?.import_snapshot(&source)?;
            tracing::info!(users, conversations, db = %path.display(), "Import complete");
            eprintln!(
                "Imported {} users and {} conversations into {}",
                users,
                conversations,
                path.display()
            );
            Ok(())
        }
        Commands::Render { report, output } => {
            let report = MetricsReport::load_from_file(&report)?;
            let markdown = renderer::md::render(&report)?;
            write_output(output.as_deref(), &markdown)
        }
    }
}

/// Dispatch to the snapshot or the database, whichever the flags select
async fn load_and_report(
    snapshot: Option<PathBuf>,
    db: Option<PathBuf>,
    config: &Config,
    request: &ReportRequest,
    now: DateTime<Utc>,
) -> Result<MetricsReport> {
    match snapshot {
        Some(path) => {
            let source = Snapshot::load_from_file(&path)?;
            run_report(source, config, request, now).await
        }
        None => {
            let path = db.unwrap_or_else(|| config.db_path.clone());
            run_report(MetricsDb::open(&path)?, config, request, now).await
        }
    }
}

async fn run_report<S: RecordSource + 'static>(
    source: S,
    config: &Config,
    request: &ReportRequest,
    now: DateTime<Utc>,
) -> Result<MetricsReport> {
    let uptime = HttpUptimeProvider::new(
        config.uptime_endpoint.as_str(),
        config.uptime_api_key.clone(),
        config.uptime_timeout,
    )?;

    generate_report(Arc::new(source), &uptime, request, now, config.uptime_timeout)
        .await
        .map_err(|e| {
            tracing::error!(status = e.status_code(), error = %e, "Report generation failed");
            anyhow::Error::from(e)
        })
}

fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
