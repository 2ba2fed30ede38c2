mod api;
mod config;
mod error;
mod fetcher;
mod identity;
mod notifier;
mod state;
mod types;
mod watcher;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::NasdaqClient;
use crate::notifier::{Notifier, ResendNotifier};
use crate::state::StateStore;
use crate::watcher::{CycleOutcome, Watcher, WatcherSettings};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let notifier = Arc::new(ResendNotifier::new(&cfg)?);

    // --- Test email mode ---
    if cfg.send_test_email {
        info!("Sending test email to {}...", cfg.email_to.join(", "));
        notifier.send_test().await?;
        info!("Test email sent successfully");
        return Ok(());
    }

    let source = Arc::new(NasdaqClient::new(&cfg)?);
    let store = StateStore::new(&cfg.state_file);
    info!(
        state_file = %store.path().display(),
        symbols = %cfg.symbols.join(", "),
        "State file: {}",
        store.path().display(),
    );

    let watcher = Arc::new(Watcher::new(
        WatcherSettings::from_config(&cfg),
        store,
        source,
        notifier,
    ));

    // --- One-shot mode ---
    if cfg.run_once {
        info!("Running single check (RUN_ONCE=true)");
        if let CycleOutcome::Completed(report) = watcher.run_cycle().await? {
            info!(
                new = report.new_filings,
                failed = report.symbols_failed.len(),
                "Single check complete"
            );
        }
        return Ok(());
    }

    // --- HTTP status API ---
    if let Some(port) = cfg.api_port {
        let app = router(ApiState {
            watcher: Arc::clone(&watcher),
        });
        let bind_addr = format!("0.0.0.0:{port}");
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!("HTTP API listening on {bind_addr}");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP API stopped: {e}");
            }
        });
    }

    // --- Timer loop ---
    let loop_watcher = Arc::clone(&watcher);
    let mut loop_task = tokio::spawn(async move { loop_watcher.run().await });

    tokio::select! {
        joined = &mut loop_task => {
            // The loop only ends on its own when persistence broke.
            return joined?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, waiting for the current check to reach a safe point...");
            watcher.shutdown();
        }
    }

    loop_task.await?
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
