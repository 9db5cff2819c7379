//! Handlers for `/events` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/events` | Synchronous ingestion, 201 with the stored event |
//! | `GET`  | `/events` | Filters `experiment_id`, `visitor_id`, `event_type`; `limit`, `offset` |
//! | `GET`  | `/events/stats` | `?experiment_id=..` |
//! | `GET`  | `/events/conversion` | `?experiment_id=..` |
//! | `POST` | `/events/beacon` | Fire-and-forget ingestion, always 202 |

use axum::{
  Json,
  body::Bytes,
  extract::{
    Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use splitkit_core::{
  event::{self, DEFAULT_PAGE_SIZE, EventFilter, EventPage, NewEvent},
  experiment::Config,
  stats::{self, ConversionRate, ExperimentStats},
  store::EventStore,
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub visitor_id:    String,
  pub event_type:    String,
  pub experiment_id: Option<Uuid>,
  pub variant_id:    Option<Uuid>,
  #[serde(default)]
  pub event_data:    Config,
  pub page_url:      Option<String>,
}

impl From<IngestBody> for NewEvent {
  fn from(body: IngestBody) -> Self {
    Self {
      visitor_id:    body.visitor_id,
      event_type:    body.event_type,
      experiment_id: body.experiment_id,
      variant_id:    body.variant_id,
      event_data:    body.event_data,
      page_url:      body.page_url,
    }
  }
}

/// `POST /events`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EventStore,
{
  let Json(body) = body?;
  let event = event::ingest(state.store.as_ref(), body.into())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(event)))
}

/// `POST /events/beacon`
///
/// Accepts the same body as `POST /events` but never fails the caller:
/// unparseable bodies are logged here, everything else by the tracker.
pub async fn beacon<S>(State(state): State<ApiState<S>>, body: Bytes) -> StatusCode
where
  S: EventStore + 'static,
{
  match serde_json::from_slice::<IngestBody>(&body) {
    Ok(body) => {
      state.tracker.track(body.into());
    }
    Err(e) => tracing::warn!(error = %e, "dropping unparseable beacon"),
  }
  StatusCode::ACCEPTED
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub experiment_id: Option<Uuid>,
  pub visitor_id:    Option<String>,
  pub event_type:    Option<String>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

/// `GET /events`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<EventPage>, ApiError>
where
  S: EventStore,
{
  let Query(params) = params?;
  let filter = EventFilter {
    experiment_id: params.experiment_id,
    visitor_id:    params.visitor_id,
    event_type:    params.event_type,
    limit:         params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    offset:        params.offset.unwrap_or(0),
  };
  let page = event::list(state.store.as_ref(), filter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(page))
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExperimentParams {
  pub experiment_id: Option<Uuid>,
}

impl ExperimentParams {
  fn require(self) -> Result<Uuid, ApiError> {
    self
      .experiment_id
      .ok_or_else(|| ApiError::BadRequest("experiment_id must be a valid UUID".into()))
  }
}

/// `GET /events/stats?experiment_id=..`
pub async fn stats<S>(
  State(state): State<ApiState<S>>,
  params: Result<Query<ExperimentParams>, QueryRejection>,
) -> Result<Json<ExperimentStats>, ApiError>
where
  S: EventStore,
{
  let Query(params) = params?;
  let experiment_id = params.require()?;
  let stats = stats::experiment_stats(state.store.as_ref(), experiment_id, Utc::now())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(stats))
}

/// `GET /events/conversion?experiment_id=..`
pub async fn conversion<S>(
  State(state): State<ApiState<S>>,
  params: Result<Query<ExperimentParams>, QueryRejection>,
) -> Result<Json<Vec<ConversionRate>>, ApiError>
where
  S: EventStore,
{
  let Query(params) = params?;
  let experiment_id = params.require()?;
  let stats = stats::experiment_stats(state.store.as_ref(), experiment_id, Utc::now())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(stats::conversion_rates(&stats.breakdown)))
}
