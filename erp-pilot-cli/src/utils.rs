use anyhow::{Context, Result};
use clap::Parser;
use erp_pilot::DeliveryBatch;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "erp-pilot")]
#[command(about = "Enter delivery batches as ERP purchase receipts by driving the desktop client")]
#[command(author, version, long_about = None)]
pub struct Args {
    /// Engine configuration (YAML); built-in defaults when omitted
    #[arg(short, long, env = "ERP_PILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Delivery batches to enter (JSON or YAML list)
    #[arg(short, long, env = "ERP_PILOT_BATCHES")]
    pub batches: Option<PathBuf>,

    /// Validate the configuration, templates and batches, then exit
    #[arg(long, default_value_t = false)]
    pub check: bool,

    /// Override the template directory from the configuration
    #[arg(long, env = "ERP_PILOT_TEMPLATES")]
    pub templates: Option<PathBuf>,
}

/// Keeps the file writer flushing until dropped
pub type LogGuard = tracing_appender::non_blocking::WorkerGuard;

pub fn init_logging() -> Result<LogGuard> {
    use tracing_appender::rolling;

    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    // Determine log directory - check for override first
    let log_dir = if let Ok(custom_dir) = env::var("ERP_PILOT_LOG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(env::temp_dir)
            .join("erp-pilot")
            .join("logs")
    };
    let dir_error = std::fs::create_dir_all(&log_dir).err();

    let file_appender = rolling::daily(&log_dir, "erp-pilot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env().add_directive(log_level.into())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::from_default_env().add_directive(log_level.into())),
        )
        .try_init()
        .context("failed to install the tracing subscriber")?;

    if let Some(e) = dir_error {
        warn!("Failed to create log directory {}: {}", log_dir.display(), e);
    }

    Ok(guard)
}

/// Read a list of batches from a `.json`, `.yaml` or `.yml` file
pub fn load_batches(path: &Path) -> Result<Vec<DeliveryBatch>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batches from {}", path.display()))?;
    parse_batches(&text, path)
}

fn parse_batches(text: &str, path: &Path) -> Result<Vec<DeliveryBatch>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(text)
            .with_context(|| format!("invalid batch JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(text)
            .with_context(|| format!("invalid batch YAML in {}", path.display()))
    }
}
