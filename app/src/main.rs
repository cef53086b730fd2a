// In app/src/main.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::prelude::*;

use api_client::{PriceSource, TwelveDataClient};
use app_config::types::Settings;
use database::Store;
use engine::{Monitor, MonitorConfig, Scheduler};
use notifier::{Notifier, SmtpNotifier};

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "A stock watchlist monitor with displaced moving average alerts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the monitor loop and the HTTP API until terminated.
    Run,

    /// Runs a single monitor cycle over the watchlist, then exits.
    Check,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = app_config::load_settings()?;
    init_tracing(&settings.app.log_level);

    tracing::info!(environment = %settings.app.environment, "starting stock monitor");

    match cli.command {
        Commands::Run => run_app(settings).await?,
        Commands::Check => run_single_check(settings).await?,
    }

    tracing::info!("stock monitor has finished");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let default = log_level.parse().unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("sqlx::query", tracing::Level::WARN) // Disable sqlx query debug logs
            .with_default(default),
    );
    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Builds the engine tuning out of the loaded settings.
fn monitor_config(settings: &Settings) -> MonitorConfig {
    MonitorConfig {
        mail_to: settings.smtp.to.clone(),
        chart_url: settings.smtp.chart_url.clone(),
        symbol_pacing: Duration::from_millis(settings.monitor.symbol_pacing_ms),
        warmup_bars: settings.twelvedata.outputsize,
    }
}

// --- "Run" Subcommand Logic ---

/// The primary logic for the `run` command.
/// Wires the store, market data client, notifier, scheduler and web server
/// together, then runs until a shutdown signal arrives.
async fn run_app(settings: Settings) -> Result<()> {
    // --- 1. Initialization ---
    let store = database::connect(&settings.database).await?;
    tracing::info!("database connection established and migrations are up-to-date");

    let store: Arc<dyn Store> = Arc::new(store);
    let source: Arc<dyn PriceSource> = Arc::new(TwelveDataClient::new(&settings.twelvedata)?);
    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(&settings.smtp)?);

    // --- 2. Component Instantiation ---
    let monitor = Monitor::new(
        Arc::clone(&store),
        source,
        notifier,
        monitor_config(&settings),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (scheduler, handle) = Scheduler::new(
        monitor,
        Duration::from_secs(settings.monitor.poll_interval_secs),
        shutdown_rx,
    );

    let app_state = web_server::AppState {
        store,
        scheduler: handle,
        admin_token: settings.admin.token.clone(),
    };

    // --- 3. Launch Concurrent Tasks ---
    tracing::info!("launching scheduler and web server tasks");
    let mut scheduler_task = tokio::spawn(scheduler.run());
    let server_settings = settings.server.clone();
    let mut server_task =
        tokio::spawn(async move { web_server::run(server_settings, app_state).await });

    // --- 4. Wait for Shutdown ---
    // In a healthy state, neither task completes on its own. If one does,
    // something went badly wrong.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = &mut scheduler_task => {
            tracing::error!(?result, "scheduler task terminated unexpectedly");
            anyhow::bail!("scheduler task terminated unexpectedly");
        }
        result = &mut server_task => {
            tracing::error!(?result, "web server task terminated unexpectedly");
            anyhow::bail!("web server task terminated unexpectedly");
        }
    }

    // --- 5. Graceful Drain ---
    // Let an in-flight cycle finish so its alert state lands in the store,
    // but do not wait forever on a hung provider call.
    shutdown_tx.send(true).ok();
    let grace = Duration::from_secs(settings.monitor.shutdown_grace_secs);
    match tokio::time::timeout(grace, &mut scheduler_task).await {
        Ok(_) => tracing::info!("scheduler drained"),
        Err(_) => {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "scheduler did not drain in time, aborting"
            );
            scheduler_task.abort();
        }
    }
    server_task.abort();

    tracing::info!("shutdown complete");
    Ok(())
}

// --- "Check" Subcommand Logic ---

/// Handles the `check` subcommand: one monitor cycle over the whole
/// watchlist, mail included, then exit. Useful from cron or by hand.
async fn run_single_check(settings: Settings) -> Result<()> {
    let store = database::connect(&settings.database).await?;
    let source: Arc<dyn PriceSource> = Arc::new(TwelveDataClient::new(&settings.twelvedata)?);
    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(&settings.smtp)?);
    let monitor = Monitor::new(
        Arc::new(store),
        source,
        notifier,
        monitor_config(&settings),
    );

    let report = monitor.run_cycle().await?;
    for (symbol, outcome) in &report.outcomes {
        tracing::info!(%symbol, ?outcome, "checked");
    }
    tracing::info!(
        checked = report.checked(),
        triggered = report.triggered(),
        failures = report.failures(),
        "single check finished"
    );
    Ok(())
}
