//! Experiment and variant registry operations.
//!
//! Thin wrappers over [`ExperimentStore`] that validate input before it
//! reaches the store and log every mutation.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
  experiment::{
    Experiment, ExperimentDetail, ExperimentPatch, NewExperiment, NewVariant, Variant,
    VariantPatch,
  },
  store::ExperimentStore,
};

pub async fn create_experiment<S: ExperimentStore>(
  store: &S,
  input: NewExperiment,
) -> Result<Experiment, S::Error> {
  let experiment = store.create_experiment(input.validated()?).await?;
  tracing::info!(id = %experiment.id, name = %experiment.name, "experiment created");
  Ok(experiment)
}

/// Returns `None` if `id` is unknown.
pub async fn update_experiment<S: ExperimentStore>(
  store: &S,
  id: Uuid,
  patch: ExperimentPatch,
) -> Result<Option<Experiment>, S::Error> {
  let updated = store.update_experiment(id, patch.validated()?).await?;
  match &updated {
    Some(e) => tracing::info!(
      id = %e.id,
      name = %e.name,
      is_active = e.is_active,
      "experiment updated"
    ),
    None => tracing::warn!(%id, "experiment not found for update"),
  }
  Ok(updated)
}

pub async fn add_variant<S: ExperimentStore>(
  store: &S,
  experiment_id: Uuid,
  input: NewVariant,
) -> Result<Variant, S::Error> {
  let variant = store.add_variant(experiment_id, input.validated()?).await?;
  tracing::info!(
    %experiment_id,
    variant_id = %variant.id,
    name = %variant.name,
    "variant created"
  );
  Ok(variant)
}

pub async fn update_variant<S: ExperimentStore>(
  store: &S,
  experiment_id: Uuid,
  variant_id: Uuid,
  patch: VariantPatch,
) -> Result<Option<Variant>, S::Error> {
  let updated = store
    .update_variant(experiment_id, variant_id, patch.validated()?)
    .await?;
  if let Some(v) = &updated {
    tracing::info!(%experiment_id, variant_id = %v.id, name = %v.name, "variant updated");
  }
  Ok(updated)
}

/// One experiment with its variants. Returns `None` if `id` is unknown.
pub async fn get_detail<S: ExperimentStore>(
  store: &S,
  id: Uuid,
) -> Result<Option<ExperimentDetail>, S::Error> {
  let Some(experiment) = store.get_experiment(id).await? else {
    return Ok(None);
  };
  let variants = store.list_variants(id).await?;
  Ok(Some(ExperimentDetail { experiment, variants }))
}

/// Every experiment, newest first, each with its variants.
pub async fn list_details<S: ExperimentStore>(
  store: &S,
) -> Result<Vec<ExperimentDetail>, S::Error> {
  let experiments = store.list_experiments().await?;
  let mut by_experiment: HashMap<Uuid, Vec<Variant>> = HashMap::new();
  for v in store.list_all_variants().await? {
    by_experiment.entry(v.experiment_id).or_default().push(v);
  }
  tracing::debug!(count = experiments.len(), "experiments listed");

  Ok(
    experiments
      .into_iter()
      .map(|experiment| {
        let variants = by_experiment.remove(&experiment.id).unwrap_or_default();
        ExperimentDetail { experiment, variants }
      })
      .collect(),
  )
}
