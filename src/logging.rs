/// Process logging configuration.
///
/// With a log directory, logs are appended to `{log_dir}/insights.log` and each
/// run starts with a separator line. Without one, logs go to stderr.
use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "insights.log";

/// Initializes logging for one CLI run.
///
/// `RUST_LOG` overrides the default `info` level. Calling this twice keeps the
/// first subscriber.
pub fn init_logging(log_dir: Option<&Path>, command: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok();
        return Ok(());
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // Separator goes in before the appender opens the file
    let separator = format!(
        "\n{sep}\n[{ts}] New {command} run\n{sep}\n",
        sep = "=".repeat(80),
        ts = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        command = command
    );
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
        .with_context(|| format!("Failed to open log file in: {}", log_dir.display()))?;
    writeln!(file, "{}", separator).context("Failed to write log separator")?;

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .ok();

    tracing::info!(command, "Logging initialized");

    Ok(())
}
