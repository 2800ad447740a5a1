//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use self::state::AppState;
use crate::alerts::{AlertError, DispatchError};
use crate::signals::InvalidParams;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown species: {0}")]
    UnknownSpecies(String),

    #[error("invalid metric parameters: {0}")]
    InvalidParams(#[from] InvalidParams),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownSpecies(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ApiError::Alert(AlertError::InvalidConfig(_)) => StatusCode::BAD_REQUEST,
            ApiError::Alert(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Dispatch(DispatchError::QueueFull) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::debug!(%status, error = %self, "Request failed");
        let body = Json(json!({
            "data": null,
            "meta": { "success": false, "error": self.to_string() }
        }));
        (status, body).into_response()
    }
}

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}
