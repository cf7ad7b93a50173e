use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use slotbook::clock::Clock;
use slotbook::config::Config;
use slotbook::notify::Notifier;
use slotbook::scheduler;
use slotbook::store::Store;
use slotbook::telegram::{self, TelegramNotifier};
use slotbook::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    slotbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(Store::open(config.wal_path())?);
    let clock = Clock::new(config.tz);
    let loaded = store.len().await;
    info!("slotbook starting");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  time zone: {}", clock.tz());
    info!("  bookings loaded: {loaded}");
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let bot = Bot::from_env();
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
    let shutdown = CancellationToken::new();

    let background = vec![
        tokio::spawn(scheduler::run_reminders(
            store.clone(),
            notifier,
            clock,
            shutdown.clone(),
        )),
        tokio::spawn(scheduler::run_expiry(
            store.clone(),
            clock,
            config.retention_days,
            shutdown.clone(),
        )),
        tokio::spawn(scheduler::run_compactor(
            store.clone(),
            config.compact_threshold,
            shutdown.clone(),
        )),
    ];

    let workflow = Arc::new(Workflow::new(store.clone()));
    // Returns on ctrl-c.
    telegram::run(bot, workflow, clock).await;

    info!("shutdown signal received, stopping background tasks");
    shutdown.cancel();
    for task in background {
        if let Err(e) = task.await {
            tracing::error!("background task panicked: {e}");
        }
    }

    if let Err(e) = store.compact_wal().await {
        tracing::error!("final compaction failed: {e}");
    }
    info!("slotbook stopped");
    Ok(())
}
