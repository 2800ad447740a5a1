//! API route definitions.

use super::state::AppState;
use super::ApiError;
use crate::alerts::{AlertContext, Signals, SubscribeRequest};
use crate::events::Event;
use crate::signals::{compute_metrics, MetricParams, MetricSeries};
use crate::timeseries::rank_by_volume;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/species/top", get(top_species))
        .route("/timeseries/rebuild", post(rebuild))
        .route("/alerts/subscribe", post(subscribe))
        .route("/alerts/status", get(alert_status))
        .route("/alerts/evaluate", post(evaluate))
        .route("/alerts/test", post(test_alert))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    species: Option<String>,
    trend_window: Option<usize>,
    metric_window: Option<usize>,
    baseline_n: Option<usize>,
    #[serde(default)]
    refresh: bool,
}

async fn metrics(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<Json<Value>, ApiError> {
    let params = MetricParams {
        trend_window: q.trend_window.unwrap_or(state.params.trend_window),
        metric_window: q.metric_window.unwrap_or(state.params.metric_window),
        baseline_n: q.baseline_n.unwrap_or(state.params.baseline_n),
    };
    params.validate()?;
    let (series, built_at) = state.builder.get_or_build_stamped(q.refresh).await;

    let wanted = q.species.as_deref().unwrap_or("all");
    let mut out: BTreeMap<String, MetricSeries> = BTreeMap::new();
    if wanted.eq_ignore_ascii_case("all") {
        for (species, s) in series.iter() {
            out.insert(species.clone(), compute_metrics(s, &params));
        }
    } else {
        let s = series
            .get(wanted)
            .ok_or_else(|| ApiError::UnknownSpecies(wanted.to_string()))?;
        out.insert(wanted.to_string(), compute_metrics(s, &params));
    }

    for (species, m) in &out {
        if let Some(latest) = m.latest() {
            state.events.publish(Event::MetricsSnapshot {
                species: species.clone(),
                latest,
            });
        }
    }

    Ok(Json(json!({
        "data": out,
        "meta": {
            "total": out.len(),
            "params": params,
            "built_at": built_at,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    #[serde(default = "default_top_n")]
    n: usize,
}

fn default_top_n() -> usize {
    5
}

async fn top_species(State(state): State<AppState>, Query(q): Query<TopQuery>) -> Json<Value> {
    let series = state.builder.get_or_build(false).await;
    let ranked: Vec<Value> = rank_by_volume(&series, q.n)
        .into_iter()
        .map(|(species, total)| json!({ "species": species, "detections": total }))
        .collect();
    Json(json!({ "data": ranked, "meta": { "total": ranked.len() } }))
}

async fn rebuild(State(state): State<AppState>) -> Json<Value> {
    let (series, built_at) = state.builder.get_or_build_stamped(true).await;
    Json(json!({
        "data": {
            "species": series.len(),
            "built_at": built_at,
        }
    }))
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<Value>, ApiError> {
    let config = state.evaluator.subscribe(req).await?;
    Ok(Json(json!({ "data": config, "meta": { "success": true } })))
}

async fn alert_status(State(state): State<AppState>) -> Json<Value> {
    let config = state.evaluator.status().await;
    Json(json!({ "data": config, "meta": { "success": true } }))
}

#[derive(Debug, Deserialize)]
struct EvaluateBody {
    variance: f64,
    #[serde(alias = "autocorr")]
    autocorrelation: f64,
    #[serde(default)]
    context: Option<AlertContext>,
}

async fn evaluate(
    State(state): State<AppState>,
    Json(body): Json<EvaluateBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let signals = Signals {
        variance: body.variance,
        autocorrelation: body.autocorrelation,
    };
    let job = state
        .dispatcher
        .schedule(signals, body.context.unwrap_or_default())?;
    Ok(scheduled(job.id))
}

async fn test_alert(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut context = AlertContext::new();
    context.insert("source".into(), json!("manual_test"));
    let job = state.dispatcher.schedule(
        Signals {
            variance: 0.9,
            autocorrelation: 0.85,
        },
        context,
    )?;
    Ok(scheduled(job.id))
}

fn scheduled(id: uuid::Uuid) -> (StatusCode, Json<Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "data": { "scheduled": true, "id": id },
            "meta": { "success": true }
        })),
    )
}
