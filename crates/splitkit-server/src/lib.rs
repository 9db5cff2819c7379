//! HTTP server assembly for splitkit.
//!
//! Mounts the JSON API under `/api`, adds a store-backed health check, and
//! wraps everything in tracing, CORS and timeout middleware.

pub mod seed;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Json, Router,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use splitkit_core::store::{SplitStore, Store};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, layered from defaults, `splitkit.toml` and
/// `SPLITKIT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "0.0.0.0".to_string(),
      port:                 4000,
      store_path:           PathBuf::from("splitkit.db"),
      request_timeout_secs: 30,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application [`Router`] for `store`.
pub fn router<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: SplitStore + 'static,
{
  Router::new()
    .route("/health", get(health::<S>))
    .with_state(Arc::clone(&store))
    .nest("/api", splitkit_api::api_router(store))
    .fallback(not_found)
    .layer(TimeoutLayer::with_status_code(
      StatusCode::REQUEST_TIMEOUT,
      Duration::from_secs(config.request_timeout_secs),
    ))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `GET /health`
async fn health<S: Store>(State(store): State<Arc<S>>) -> Response {
  match store.ping().await {
    Ok(()) => Json(json!({ "status": "healthy", "timestamp": Utc::now() })).into_response(),
    Err(e) => {
      tracing::error!(error = %e, "health check failed");
      (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unhealthy", "error": e.to_string() })),
      )
        .into_response()
    }
  }
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
  (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

// ─── Integration tests ────────────────────────────────────────────────────────
