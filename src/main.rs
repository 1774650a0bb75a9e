use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use steam_price_collector::browser::chromium::ChromiumLauncher;
use steam_price_collector::browser::session::BrowserSession;
use steam_price_collector::clock::{Clock, TokioClock};
use steam_price_collector::config::Config;
use steam_price_collector::data::backend_api::BackendApiClient;
use steam_price_collector::data::market::SteamMarketData;
use steam_price_collector::error::CollectorError;
use steam_price_collector::execution::collector::{Collector, CollectorSettings};
use steam_price_collector::execution::types::ShutdownHandle;
use steam_price_collector::monitoring::logger::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match init_logging(&config.logging) {
        Ok(path) => info!("📝 Logging to {}", path.display()),
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!("🚀 Steam price collector starting...");

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let settings = CollectorSettings::from_config(&config);

    let api = BackendApiClient::new(&config.api, clock.clone()).context("Failed to build API client")?;
    let market = SteamMarketData::connect(clock.clone(), settings.rate_limit_delay)
        .context("Failed to build market data services")?;
    let session = BrowserSession::new(Box::new(ChromiumLauncher), clock.clone());

    let (shutdown, shutdown_rx) = ShutdownHandle::new();
    spawn_signal_listener(shutdown.clone());

    let mut collector = Collector::new(
        settings,
        session,
        Box::new(api),
        Box::new(market),
        clock,
        shutdown_rx,
    );

    let outcome = match collector.initialize().await {
        Ok(()) => collector.start().await,
        Err(CollectorError::ShutdownRequested) => Ok(()),
        Err(e) => Err(e),
    };

    if shutdown.is_triggered() {
        info!("🛑 Stopping on termination signal");
    }
    if let Err(e) = collector.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    outcome.context("Collector aborted")?;
    info!("👋 Shutdown complete");
    Ok(())
}

/// SIGINT/SIGTERM request a graceful shutdown; the collector finishes its cycle.
fn spawn_signal_listener(shutdown: ShutdownHandle) {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!("Received {} - shutting down gracefully...", signal);
        shutdown.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
