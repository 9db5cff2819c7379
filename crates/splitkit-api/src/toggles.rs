//! Handlers for `/toggles` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/toggles` | Ordered by key |
//! | `POST` | `/toggles` | Body: `{"key":"..","label":"..","description"?,"enabled"?,"config"?}` |
//! | `GET`  | `/toggles/{key}` | 404 if not found |
//! | `PUT`  | `/toggles/{id}` | Body: `{"enabled"?,"config"?}` |

use axum::{
  Json,
  extract::{
    Path, State,
    rejection::{JsonRejection, PathRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use splitkit_core::{
  experiment::Config,
  store::ToggleStore,
  toggle::{self, FeatureToggle, NewToggle, TogglePatch},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

/// `GET /toggles`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<FeatureToggle>>, ApiError>
where
  S: ToggleStore,
{
  let toggles = state.store.list_toggles().await.map_err(ApiError::from_store)?;
  tracing::debug!(count = toggles.len(), "toggles listed");
  Ok(Json(toggles))
}

/// `GET /toggles/{key}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  key: Result<Path<String>, PathRejection>,
) -> Result<Json<FeatureToggle>, ApiError>
where
  S: ToggleStore,
{
  let Path(key) = key?;
  let Some(toggle) = state
    .store
    .get_toggle(key.clone())
    .await
    .map_err(ApiError::from_store)?
  else {
    tracing::warn!(%key, "toggle not found");
    return Err(ApiError::NotFound(format!("toggle {key:?} not found")));
  };
  Ok(Json(toggle))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub key:         String,
  pub label:       String,
  pub description: Option<String>,
  pub enabled:     Option<bool>,
  pub config:      Option<Config>,
}

/// `POST /toggles`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ToggleStore,
{
  let Json(body) = body?;
  let input = NewToggle {
    key:         body.key,
    label:       body.label,
    description: body.description,
    enabled:     body.enabled.unwrap_or(false),
    config:      body.config.unwrap_or_default(),
  };
  let toggle = toggle::create(state.store.as_ref(), input)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(toggle)))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
  pub enabled: Option<bool>,
  pub config:  Option<Config>,
}

/// `PUT /toggles/{id}`
///
/// Shares its route with the by-key lookup, so the segment is parsed here.
pub async fn update<S>(
  State(state): State<ApiState<S>>,
  id: Result<Path<String>, PathRejection>,
  body: Result<Json<UpdateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ToggleStore,
{
  let Path(raw_id) = id?;
  let id = Uuid::parse_str(&raw_id)
    .map_err(|_| ApiError::BadRequest(format!("invalid toggle id {raw_id:?}")))?;
  let Json(body) = body?;
  let patch = TogglePatch { enabled: body.enabled, config: body.config };
  let toggle = toggle::update(state.store.as_ref(), id, patch)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("toggle {id} not found")))?;
  Ok(Json(toggle))
}
