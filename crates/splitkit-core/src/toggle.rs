//! Feature toggles: named boolean switches with an optional payload, read by
//! the rendering layer on every page view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::{optional_text, required_text},
  experiment::{Config, DESCRIPTION_MAX_LEN, NAME_MAX_LEN},
  store::ToggleStore,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureToggle {
  pub id:          Uuid,
  /// Lookup identifier used by rendering code; see [`validate_key`].
  pub key:         String,
  pub label:       String,
  pub description: Option<String>,
  pub enabled:     bool,
  pub config:      Config,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::ToggleStore::create_toggle`].
#[derive(Debug, Clone)]
pub struct NewToggle {
  pub key:         String,
  pub label:       String,
  pub description: Option<String>,
  pub enabled:     bool,
  pub config:      Config,
}

impl NewToggle {
  /// A disabled toggle with an empty config.
  pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      key:         key.into(),
      label:       label.into(),
      description: None,
      enabled:     false,
      config:      Config::new(),
    }
  }

  pub fn validated(self) -> Result<Self> {
    let key = required_text("key", &self.key, NAME_MAX_LEN)?;
    validate_key(&key)?;
    let label = required_text("label", &self.label, NAME_MAX_LEN)?;
    optional_text("description", self.description.as_deref(), DESCRIPTION_MAX_LEN)?;
    Ok(Self { key, label, ..self })
  }
}

/// Partial update; only the switch and its payload are mutable.
#[derive(Debug, Clone, Default)]
pub struct TogglePatch {
  pub enabled: Option<bool>,
  pub config:  Option<Config>,
}

impl TogglePatch {
  pub fn apply(self, current: FeatureToggle, now: DateTime<Utc>) -> FeatureToggle {
    FeatureToggle {
      enabled: self.enabled.unwrap_or(current.enabled),
      config: self.config.unwrap_or(current.config),
      updated_at: now,
      ..current
    }
  }
}

/// Keys start with a lowercase letter and continue with lowercase letters,
/// digits, or underscores.
pub fn validate_key(key: &str) -> Result<()> {
  let mut chars = key.chars();
  let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
    && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
  if valid {
    Ok(())
  } else {
    Err(Error::InvalidInput(format!(
      "key {key:?} must start with a letter and contain only lowercase \
       letters, numbers, and underscores"
    )))
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

pub async fn create<S: ToggleStore>(store: &S, input: NewToggle) -> Result<FeatureToggle, S::Error> {
  let toggle = store.create_toggle(input.validated()?).await?;
  tracing::info!(id = %toggle.id, key = %toggle.key, enabled = toggle.enabled, "toggle created");
  Ok(toggle)
}

/// Returns `None` if `id` is unknown.
pub async fn update<S: ToggleStore>(
  store: &S,
  id: Uuid,
  patch: TogglePatch,
) -> Result<Option<FeatureToggle>, S::Error> {
  let updated = store.update_toggle(id, patch).await?;
  match &updated {
    Some(t) => {
      tracing::info!(id = %t.id, key = %t.key, enabled = t.enabled, "toggle updated")
    }
    None => tracing::warn!(%id, "toggle not found for update"),
  }
  Ok(updated)
}
