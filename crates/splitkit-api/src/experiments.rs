//! Handlers for `/experiments` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/experiments` | Newest first, each with its variants |
//! | `POST` | `/experiments` | Body: `{"name":"..","description"?,"is_active"?}` |
//! | `GET`  | `/experiments/assign` | `?visitor_id=..&experiment_name=..` |
//! | `GET`  | `/experiments/{id}` | 404 if not found |
//! | `PUT`  | `/experiments/{id}` | Partial update |
//! | `POST` | `/experiments/{id}/variants` | Body: `{"name":"..","weight"?,"config"?}` |
//! | `PUT`  | `/experiments/{id}/variants/{variant_id}` | Partial update |

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use splitkit_core::{
  assignment::{self, AssignOutcome},
  experiment::{
    Config, DEFAULT_VARIANT_WEIGHT, ExperimentDetail, ExperimentPatch, NewExperiment,
    NewVariant, VariantPatch,
  },
  registry,
  store::{AssignmentStore, ExperimentStore},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Assign ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssignParams {
  #[serde(default)]
  pub visitor_id:      String,
  #[serde(default)]
  pub experiment_name: String,
}

/// The variant fields a rendering collaborator needs.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignedVariant {
  pub id:     Uuid,
  pub name:   String,
  pub config: Config,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignResponse {
  pub experiment_id:   Uuid,
  pub experiment_name: String,
  pub variant_id:      Option<Uuid>,
  pub variant:         Option<AssignedVariant>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message:         Option<String>,
}

impl From<AssignOutcome> for AssignResponse {
  fn from(outcome: AssignOutcome) -> Self {
    match outcome {
      AssignOutcome::Assigned { experiment, variant, .. } => Self {
        experiment_id:   experiment.id,
        experiment_name: experiment.name,
        variant_id:      Some(variant.id),
        variant:         Some(AssignedVariant {
          id:     variant.id,
          name:   variant.name,
          config: variant.config,
        }),
        message:         None,
      },
      AssignOutcome::Inactive { experiment } => Self {
        experiment_id:   experiment.id,
        experiment_name: experiment.name,
        variant_id:      None,
        variant:         None,
        message:         Some("experiment is inactive".into()),
      },
    }
  }
}

/// `GET /experiments/assign?visitor_id=..&experiment_name=..`
pub async fn assign<S>(
  State(state): State<ApiState<S>>,
  params: Result<Query<AssignParams>, QueryRejection>,
) -> Result<Json<AssignResponse>, ApiError>
where
  S: ExperimentStore + AssignmentStore,
{
  let Query(params) = params?;
  let outcome =
    assignment::assign(state.store.as_ref(), &params.experiment_name, &params.visitor_id)
      .await
      .map_err(ApiError::from_store)?;
  Ok(Json(outcome.into()))
}

// ─── List / get ──────────────────────────────────────────────────────────────

/// `GET /experiments`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<ExperimentDetail>>, ApiError>
where
  S: ExperimentStore,
{
  let experiments = registry::list_details(state.store.as_ref())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(experiments))
}

/// `GET /experiments/{id}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ExperimentDetail>, ApiError>
where
  S: ExperimentStore,
{
  let Path(id) = id?;
  let detail = registry::get_detail(state.store.as_ref(), id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("experiment {id} not found")))?;
  Ok(Json(detail))
}

// ─── Create / update ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:        String,
  pub description: Option<String>,
  pub is_active:   Option<bool>,
}

/// `POST /experiments`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore,
{
  let Json(body) = body?;
  let input = NewExperiment {
    name:        body.name,
    description: body.description,
    is_active:   body.is_active.unwrap_or(true),
  };
  let experiment = registry::create_experiment(state.store.as_ref(), input)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(experiment)))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub is_active:   Option<bool>,
}

/// `PUT /experiments/{id}`
pub async fn update<S>(
  State(state): State<ApiState<S>>,
  id: Result<Path<Uuid>, PathRejection>,
  body: Result<Json<UpdateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore,
{
  let Path(id) = id?;
  let Json(body) = body?;
  let patch = ExperimentPatch {
    name:        body.name,
    description: body.description,
    is_active:   body.is_active,
  };
  let experiment = registry::update_experiment(state.store.as_ref(), id, patch)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("experiment {id} not found")))?;
  Ok(Json(experiment))
}

// ─── Variants ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddVariantBody {
  pub name:   String,
  pub weight: Option<f64>,
  pub config: Option<Config>,
}

/// `POST /experiments/{id}/variants`
pub async fn add_variant<S>(
  State(state): State<ApiState<S>>,
  id: Result<Path<Uuid>, PathRejection>,
  body: Result<Json<AddVariantBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore,
{
  let Path(experiment_id) = id?;
  let Json(body) = body?;
  let input = NewVariant {
    name:   body.name,
    weight: body.weight.unwrap_or(DEFAULT_VARIANT_WEIGHT),
    config: body.config.unwrap_or_default(),
  };
  let variant = registry::add_variant(state.store.as_ref(), experiment_id, input)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(variant)))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateVariantBody {
  pub name:   Option<String>,
  pub weight: Option<f64>,
  pub config: Option<Config>,
}

/// `PUT /experiments/{id}/variants/{variant_id}`
pub async fn update_variant<S>(
  State(state): State<ApiState<S>>,
  ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
  body: Result<Json<UpdateVariantBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExperimentStore,
{
  let Path((experiment_id, variant_id)) = ids?;
  let Json(body) = body?;
  let patch = VariantPatch { name: body.name, weight: body.weight, config: body.config };
  let variant =
    registry::update_variant(state.store.as_ref(), experiment_id, variant_id, patch)
      .await
      .map_err(ApiError::from_store)?
      .ok_or_else(|| {
        ApiError::NotFound(format!(
          "variant {variant_id} not found in experiment {experiment_id}"
        ))
      })?;
  Ok(Json(variant))
}
