use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use windgraf::Config;
use windgraf::Engine;

/// Serve wind readings scraped from windgraf weather station pages
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "windgraf.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("windgraf starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let engine = Arc::new(Engine::new());
    engine.register_integrations_from_config(&config);

    if config.integrations.windgraf.is_empty() {
        tracing::warn!("No windgraf stations configured");
    }

    // Start the HTTP API if configured
    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = config.api.clone().map(|api| {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = windgraf::api::serve(api.listen, api.port, engine, api_shutdown_rx).await {
                tracing::error!("HTTP API failed: {}", e);
            }
        })
    });

    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        result = engine.run() => {
            if let Err(e) = result {
                tracing::error!("Engine stopped: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    if let Some(task) = api_task {
        let _ = api_shutdown_tx.send(());
        if let Err(e) = task.await {
            tracing::error!("HTTP API task ended abnormally: {}", e);
        }
    }

    tracing::info!("Shutting down integrations...");
    engine.shutdown().await;

    tracing::info!("windgraf shutdown complete");

    Ok(())
}
