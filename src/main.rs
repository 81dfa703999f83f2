use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use feedwatch::{Config, Database, Poller, TelegramNotifier};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedwatch::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        feedwatch::logging::init_console_only(&config.logging.level);
    }

    info!("feedwatch starting");

    let notifier = match TelegramNotifier::new(&config.telegram.bot_token) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            error!(error = %e, "telegram notifier setup failed");
            std::process::exit(1);
        }
    };

    let db = match Database::open(&config.database.path).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(path = %config.database.path, error = %e, "failed to open database");
            std::process::exit(1);
        }
    };

    let poller = match Poller::new(db.clone(), notifier) {
        Ok(poller) => poller.with_timing(
            Duration::from_secs(config.poller.tick_secs),
            Duration::from_millis(config.poller.send_pacing_ms),
        ),
        Err(e) => {
            error!(error = %e, "failed to create poller");
            std::process::exit(1);
        }
    };

    // Ctrl-C requests a graceful stop; the poller finishes the feed it is
    // on and exits between feeds or ticks.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    poller.run(shutdown_rx).await;

    db.close().await;
    info!("feedwatch stopped");
}
