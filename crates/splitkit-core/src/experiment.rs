//! Experiments and their variants.
//!
//! An experiment is never hard-deleted; it is switched off by clearing
//! `is_active`. Variants are owned by exactly one experiment and carry a
//! relative selection weight plus an opaque config payload handed to the
//! rendering layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::{optional_text, required_text},
};

/// Opaque key-value payload attached to variants, toggles and events.
pub type Config = serde_json::Map<String, serde_json::Value>;

pub const NAME_MAX_LEN: usize = 255;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
/// Weight given to a variant created without an explicit one.
pub const DEFAULT_VARIANT_WEIGHT: f64 = 0.5;

// ─── Experiment ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
  pub id:          Uuid,
  /// Unique across all experiments; the lookup key used by `assign`.
  pub name:        String,
  pub description: Option<String>,
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::ExperimentStore::create_experiment`].
#[derive(Debug, Clone)]
pub struct NewExperiment {
  pub name:        String,
  pub description: Option<String>,
  pub is_active:   bool,
}

impl NewExperiment {
  /// An active experiment with no description.
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), description: None, is_active: true }
  }

  /// Trim and length-check every field.
  pub fn validated(self) -> Result<Self> {
    let name = required_text("name", &self.name, NAME_MAX_LEN)?;
    optional_text("description", self.description.as_deref(), DESCRIPTION_MAX_LEN)?;
    Ok(Self { name, ..self })
  }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ExperimentPatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub is_active:   Option<bool>,
}

impl ExperimentPatch {
  pub fn validated(self) -> Result<Self> {
    let name = self
      .name
      .as_deref()
      .map(|n| required_text("name", n, NAME_MAX_LEN))
      .transpose()?;
    optional_text("description", self.description.as_deref(), DESCRIPTION_MAX_LEN)?;
    Ok(Self { name, ..self })
  }

  pub fn apply(self, current: Experiment, now: DateTime<Utc>) -> Experiment {
    Experiment {
      id:          current.id,
      name:        self.name.unwrap_or(current.name),
      description: self.description.or(current.description),
      is_active:   self.is_active.unwrap_or(current.is_active),
      created_at:  current.created_at,
      updated_at:  now,
    }
  }
}

// ─── Variant ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
  pub id:            Uuid,
  pub experiment_id: Uuid,
  /// Unique within the owning experiment.
  pub name:          String,
  /// Relative weight in `[0, 1]`. Weights are normalised at assignment time
  /// so they need not sum to one.
  pub weight:        f64,
  pub config:        Config,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::ExperimentStore::add_variant`].
#[derive(Debug, Clone)]
pub struct NewVariant {
  pub name:   String,
  pub weight: f64,
  pub config: Config,
}

impl NewVariant {
  pub fn new(name: impl Into<String>, weight: f64) -> Self {
    Self { name: name.into(), weight, config: Config::new() }
  }

  pub fn validated(self) -> Result<Self> {
    let name = required_text("name", &self.name, NAME_MAX_LEN)?;
    check_weight(self.weight)?;
    Ok(Self { name, ..self })
  }
}

/// Partial update of a variant. Identity and ownership are immutable.
#[derive(Debug, Clone, Default)]
pub struct VariantPatch {
  pub name:   Option<String>,
  pub weight: Option<f64>,
  pub config: Option<Config>,
}

impl VariantPatch {
  pub fn validated(self) -> Result<Self> {
    let name = self
      .name
      .as_deref()
      .map(|n| required_text("name", n, NAME_MAX_LEN))
      .transpose()?;
    if let Some(w) = self.weight {
      check_weight(w)?;
    }
    Ok(Self { name, ..self })
  }

  pub fn apply(self, current: Variant) -> Variant {
    Variant {
      id:            current.id,
      experiment_id: current.experiment_id,
      name:          self.name.unwrap_or(current.name),
      weight:        self.weight.unwrap_or(current.weight),
      config:        self.config.unwrap_or(current.config),
      created_at:    current.created_at,
    }
  }
}

fn check_weight(weight: f64) -> Result<()> {
  if weight.is_finite() && (0.0..=1.0).contains(&weight) {
    Ok(())
  } else {
    Err(Error::InvalidInput(format!(
      "weight must be between 0 and 1, got {weight}"
    )))
  }
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// An experiment together with its variants, ordered by variant name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDetail {
  #[serde(flatten)]
  pub experiment: Experiment,
  pub variants:   Vec<Variant>,
}
