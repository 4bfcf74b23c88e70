use std::sync::Arc;

use stockwatch_app::bootstrap::connect_database;
use stockwatch_app::error::AppResult;
use stockwatch_app::scheduler::{
    parse_report_time, parse_timezone, run_daily_report, run_tracker,
};
use stockwatch_core::config::load_config;
use stockwatch_service::cache::{MemoryCache, SnapshotCache};
use stockwatch_service::checker::StockChecker;
use stockwatch_service::delivery::telegram::TelegramChannel;
use stockwatch_service::delivery::{DeliveryChannel, DeliveryQueue};
use stockwatch_service::diff::StockDiffEngine;
use stockwatch_service::dispatch::NotificationDispatcher;
use stockwatch_service::ops_log::OpsLog;
use stockwatch_service::render::Renderer;
use stockwatch_service::report::ActivityReporter;
use stockwatch_service::session::SessionManager;
use stockwatch_service::store::postgres::PgStore;
use stockwatch_service::store::{Store, UserStore};
use stockwatch_service::upstream::client::HttpConnector;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting stockwatch");

    let config = load_config()?;

    tracing::info!(
        tracker = ?config.tracker,
        delivery = ?config.delivery,
        cache = ?config.cache,
        schedule = ?config.schedule,
        "Configuration loaded"
    );

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let timezone = parse_timezone(&config.schedule.timezone)?;
    let report_time = parse_report_time(&config.schedule.report_time)?;

    let pool = connect_database(&config.database).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let cache = SnapshotCache::new(Arc::new(MemoryCache::new()), &config.cache);
    let sessions = Arc::new(SessionManager::new(
        Arc::new(HttpConnector::new(config.upstream.clone())),
        cache.clone(),
        config.upstream.max_session_age_days,
    ));

    let channel: Arc<dyn DeliveryChannel> = Arc::new(TelegramChannel::new(&config.telegram)?);
    let ops = OpsLog::new(Arc::clone(&channel), config.telegram.log_channel_id);
    let (queue, worker) =
        DeliveryQueue::new(&config.delivery, Arc::clone(&channel), Arc::clone(&store))?;
    let worker = tokio::spawn(worker.run());

    let renderer = Arc::new(Renderer::new(
        &config.upstream.base_url,
        config.telegram.bot_username.clone(),
        timezone,
    ));
    let dispatcher = NotificationDispatcher::new(Arc::clone(&store), queue, renderer);
    let checker = StockChecker::new(
        config.tracker.clone(),
        Arc::clone(&store),
        Arc::clone(&sessions),
        StockDiffEngine::new(cache),
        dispatcher,
        ops,
    );
    let reporter = ActivityReporter::new(Arc::clone(&store), channel, timezone);

    if config.tracker.enabled {
        let pincodes = store.pincodes().await?;
        let opened = sessions
            .warm_up(&pincodes, config.tracker.warm_up_pause())
            .await;
        tracing::info!(opened, pincodes = pincodes.len(), "Session warm-up finished");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tracker = tokio::spawn(run_tracker(
        checker,
        config.tracker.interval(),
        shutdown_rx.clone(),
    ));
    let report = tokio::spawn(run_daily_report(
        reporter,
        report_time,
        timezone,
        shutdown_rx,
    ));

    tracing::info!(interval = ?config.tracker.interval(), "Stock tracker running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Schedulers already stopped");
    }

    tracker.await?;
    report.await?;
    // The last queue handle went away with the tracker; drain in-flight sends.
    worker.await?;

    tracing::info!("Stockwatch stopped");
    Ok(())
}
