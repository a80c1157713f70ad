//! AutoMine daemon - keeps the managed stake on whichever target is open.

use anyhow::{Context, Result};
use automined::config::{Config, CONFIG_PATH};
use automined::{
    ChainClient, EngineListener, FanoutListener, HttpChainClient, JsonFileStore, Scheduler,
    StateStore, StoreListener, SwitchEngine, SystemClock, TracingListener,
};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "automined")]
#[command(about = "AutoMine switching daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Run the startup checks and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from_path(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("[BOOT] AutoMine daemon v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("[BOOT] Config loaded from {}", cli.config.display());

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.store.state_dir));
    info!("[BOOT] State directory {}", config.store.state_dir.display());

    let chain: Arc<dyn ChainClient> = Arc::new(
        HttpChainClient::new(&config.gateway.url, config.execution.read_timeout())
            .context("Failed to create gateway client")?,
    );
    info!("[BOOT] Gateway {}", config.gateway.url);

    let (audit, audit_writer) = StoreListener::spawn(Arc::clone(&store));
    let listener: Arc<dyn EngineListener> = Arc::new(
        FanoutListener::new()
            .with(Arc::new(TracingListener))
            .with(Arc::new(audit)),
    );

    let engine = SwitchEngine::new(&config, chain, store, listener, Arc::new(SystemClock))
        .await
        .context("Invalid configuration")?;
    let engine = Arc::new(engine);

    if let Some(op) = engine.recover().await {
        warn!("[BOOT] Closed out interrupted switch {} to {}", op.id, op.target_id);
    }

    match engine.startup_check().await {
        Ok(current) => info!("[BOOT] Startup checks passed, current target {}", current),
        Err(e) => {
            error!("[FATAL] {}", e);
            std::process::exit(78);
        }
    }

    if cli.check {
        info!("Checks complete, exiting");
        return Ok(());
    }

    let scheduler = Scheduler::from_config(Arc::clone(&engine), &config).await;
    info!(
        "[READY] Monitoring every {}s, rotation every {}h",
        config.schedule.poll_interval_secs, config.schedule.rotation_interval_hours
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("[SHUTDOWN] Signal received, waiting for running cycles");
    scheduler.shutdown().await;

    let summary = engine.daily_summary(Utc::now().date_naive()).await;
    info!("[SHUTDOWN] Today's operations:\n{}", summary.render());
    info!("[SHUTDOWN] {}", engine.status().await.summary_line());

    // Dropping the engine releases the last audit sender
    drop(engine);
    if let Err(e) = audit_writer.await {
        warn!("Audit writer ended abnormally: {}", e);
    }

    info!("[SHUTDOWN] Done");
    Ok(())
}
