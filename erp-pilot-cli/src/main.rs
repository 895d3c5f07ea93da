//! erp-pilot CLI
//!
//! Loads the engine configuration and a list of delivery batches, then enters
//! each batch as a purchase receipt in the ERP client.
//!
//! Usage:
//!   erp-pilot --config pilot.yaml --batches deliveries.json
//!   erp-pilot --config pilot.yaml --check     # validate and exit
//!
//! Exit codes: 0 all batches entered, 1 a batch failed, 2 configuration error.
//! Press Escape (Windows) or Ctrl-C to stop after the current action.

use anyhow::{Context, Result};
use clap::Parser;
use erp_pilot::{AutomationError, CancellationMonitor, DeliveryBatch, EngineConfig, TemplateStore};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod utils;

use crate::utils::{init_logging, load_batches, Args};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = match init_logging() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging disabled: {e:#}");
            None
        }
    };

    let (config, batches) = match load_inputs(&args) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("configuration error: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if args.check {
        info!(
            "configuration ok: templates in {}, {} batch(es), {} record(s)",
            config.template_dir.display(),
            batches.len(),
            batches.iter().map(|b| b.records.len()).sum::<usize>()
        );
        return ExitCode::SUCCESS;
    }

    match run(config, batches).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILURE),
        Err(e) => {
            error!("{e:#}");
            let config_error = e
                .downcast_ref::<AutomationError>()
                .is_some_and(AutomationError::is_config_error);
            ExitCode::from(if config_error { EXIT_CONFIG } else { EXIT_FAILURE })
        }
    }
}

fn load_inputs(args: &Args) -> Result<(EngineConfig, Vec<DeliveryBatch>)> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            info!("no config file given, using built-in defaults");
            EngineConfig::default()
        }
    };
    if let Some(dir) = &args.templates {
        config.template_dir = dir.clone();
    }

    TemplateStore::open(&config.template_dir).context("template check failed")?;

    let batches = match &args.batches {
        Some(path) => load_batches(path)?,
        None if args.check => Vec::new(),
        None => anyhow::bail!("no batches given, pass --batches <file>"),
    };
    Ok((config, batches))
}

async fn run(config: EngineConfig, batches: Vec<DeliveryBatch>) -> Result<bool> {
    let token = CancellationToken::new();
    let monitor = CancellationMonitor::from_token(token.clone());

    #[cfg(target_os = "windows")]
    erp_pilot::spawn_escape_listener(monitor.clone());

    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current action");
            ctrl_c.cancel();
        }
    });

    info!("entering {} batch(es)", batches.len());
    let succeeded = tokio::task::spawn_blocking(move || -> Result<bool, AutomationError> {
        let mut workflow = erp_pilot::receipt_workflow(&config, monitor)?;
        Ok(workflow.process_delivery_orders(&batches))
    })
    .await
    .context("receipt worker stopped unexpectedly")??;

    if token.is_cancelled() {
        warn!("run was cancelled");
    }
    Ok(succeeded)
}
