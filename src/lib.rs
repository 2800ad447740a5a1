//! tipwatch -- early-warning signals of critical slowing down in species
//! detection time series.
//!
//! This crate builds gap-filled daily detection series per species, derives
//! rolling autocorrelation, variance, trend and a composite risk score from
//! them, and raises threshold alerts over webhook and notification channels.

pub mod alerts;
pub mod api;
pub mod config;
pub mod events;
pub mod monitor;
pub mod signals;
pub mod source;
pub mod timeseries;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::alerts::{AlertDispatcher, AlertEvaluator, SubscribeRequest};
use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::events::EventSink;
use crate::source::{DetectionSource, DirectorySource};
use crate::timeseries::TimeSeriesBuilder;

/// Wire the builder, evaluator and dispatcher together for `source`.
///
/// Must be called inside a Tokio runtime; the alert dispatcher is spawned here.
pub async fn build_state(config: &AppConfig, source: Arc<dyn DetectionSource>) -> Result<AppState> {
    config.signals.validate().context("invalid [signals] configuration")?;
    let events = EventSink::default();

    let builder = TimeSeriesBuilder::new(source, config.cache.ttl()).with_events(events.clone());

    let evaluator = AlertEvaluator::new(config.alerts.initial(), config.alerts.webhook_timeout())
        .context("failed to initialize alert evaluator")?
        .with_events(events.clone());

    // Configured targets go through the same validation as runtime subscriptions
    if config.alerts.webhook_target.is_some() || config.alerts.notify_address.is_some() {
        evaluator
            .subscribe(SubscribeRequest {
                webhook_target: config.alerts.webhook_target.clone(),
                notify_address: config.alerts.notify_address.clone(),
                thresholds: None,
            })
            .await
            .context("invalid [alerts] configuration")?;
    }

    let evaluator = Arc::new(evaluator);
    let dispatcher = AlertDispatcher::spawn(
        evaluator.clone(),
        config.alerts.queue_capacity,
        config.alerts.max_in_flight,
    );

    Ok(AppState {
        builder: Arc::new(builder),
        evaluator,
        dispatcher,
        events,
        params: config.signals,
    })
}

/// Start the tipwatch daemon: API server, alert dispatcher, optional monitor.
pub async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!(dirs = ?config.dataset.dirs, ttl_secs = config.cache.ttl_secs, "Initializing detection source");
    let source = Arc::new(DirectorySource::new(config.dataset.dirs.clone()));
    let state = build_state(&config, source).await?;

    if config.monitor.enabled {
        let monitor = monitor::Monitor::new(
            state.builder.clone(),
            state.dispatcher.clone(),
            state.events.clone(),
            state.params,
            config.monitor.clone(),
        );
        tokio::spawn(monitor::run_monitor_loop(monitor));
    }

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(state);

    tracing::info!(%addr, "tipwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
