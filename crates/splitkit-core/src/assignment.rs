//! Stable visitor → variant assignment.
//!
//! The first committed assignment for an `(experiment, visitor)` pair is the
//! source of truth forever after. New assignments are written with a single
//! uniqueness-constrained insert; a caller that loses a concurrent race
//! discards its own choice and re-reads the winner once. There is no lock and
//! no retry loop, so the whole operation is idempotent and safe to repeat
//! after a timeout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  bucket,
  error::required_text,
  event::VISITOR_ID_MAX_LEN,
  experiment::{Experiment, NAME_MAX_LEN, Variant},
  store::{AssignmentStore, ExperimentStore},
};

/// One visitor's bucket within one experiment. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub experiment_id: Uuid,
  pub visitor_id:    String,
  pub variant_id:    Uuid,
  pub created_at:    DateTime<Utc>,
}

/// An assignment joined with the variant it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAssignment {
  pub assignment: Assignment,
  pub variant:    Variant,
}

/// Result of [`assign`].
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
  /// The visitor is (now) in `variant`. `fresh` is `true` only for the call
  /// whose insert created the assignment.
  Assigned {
    experiment: Experiment,
    variant:    Variant,
    fresh:      bool,
  },
  /// The experiment is switched off; no assignment was read or written.
  Inactive { experiment: Experiment },
}

impl AssignOutcome {
  pub fn experiment(&self) -> &Experiment {
    match self {
      Self::Assigned { experiment, .. } | Self::Inactive { experiment } => experiment,
    }
  }

  pub fn variant(&self) -> Option<&Variant> {
    match self {
      Self::Assigned { variant, .. } => Some(variant),
      Self::Inactive { .. } => None,
    }
  }
}

/// Get or create the assignment of `visitor_id` in the experiment named
/// `experiment_name`.
///
/// Fails with not-found if the experiment does not exist or has no variants.
/// An inactive experiment is not an error: it yields
/// [`AssignOutcome::Inactive`].
pub async fn assign<S>(
  store: &S,
  experiment_name: &str,
  visitor_id: &str,
) -> Result<AssignOutcome, S::Error>
where
  S: ExperimentStore + AssignmentStore,
{
  let visitor_id = required_text("visitor_id", visitor_id, VISITOR_ID_MAX_LEN)?;
  let experiment_name = required_text("experiment_name", experiment_name, NAME_MAX_LEN)?;

  let Some(experiment) = store
    .find_experiment_by_name(experiment_name.clone())
    .await?
  else {
    tracing::warn!(%experiment_name, %visitor_id, "experiment not found");
    return Err(Error::NotFound(format!("experiment {experiment_name:?} not found")).into());
  };

  if !experiment.is_active {
    tracing::debug!(%experiment_name, %visitor_id, "experiment inactive");
    return Ok(AssignOutcome::Inactive { experiment });
  }

  if let Some(existing) = store
    .find_assignment(experiment.id, visitor_id.clone())
    .await?
  {
    tracing::debug!(
      %experiment_name,
      %visitor_id,
      variant_name = %existing.variant.name,
      "returning existing assignment"
    );
    return Ok(AssignOutcome::Assigned {
      experiment,
      variant: existing.variant,
      fresh: false,
    });
  }

  let variants = store.list_variants(experiment.id).await?;
  if variants.is_empty() {
    tracing::error!(%experiment_name, experiment_id = %experiment.id, "no variants configured");
  }
  let chosen = bucket::choose(&visitor_id, experiment.id, &variants)?.clone();

  let won = store
    .insert_assignment(Assignment {
      experiment_id: experiment.id,
      visitor_id:    visitor_id.clone(),
      variant_id:    chosen.id,
      created_at:    Utc::now(),
    })
    .await?;

  if won {
    tracing::info!(
      %experiment_name,
      %visitor_id,
      variant_name = %chosen.name,
      "new variant assignment"
    );
    return Ok(AssignOutcome::Assigned { experiment, variant: chosen, fresh: true });
  }

  // A concurrent request committed first; its choice stands.
  let winner = store
    .find_assignment(experiment.id, visitor_id.clone())
    .await?
    .ok_or_else(|| {
      Error::NotFound(format!(
        "assignment for visitor {visitor_id:?} in {experiment_name:?} vanished after a conflicting insert"
      ))
    })?;
  tracing::debug!(
    %experiment_name,
    %visitor_id,
    variant_name = %winner.variant.name,
    "lost assignment race, using committed variant"
  );
  Ok(AssignOutcome::Assigned { experiment, variant: winner.variant, fresh: false })
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{
    experiment::{ExperimentPatch, NewExperiment, NewVariant},
    fake::FakeStore,
  };

  async fn seeded(name: &str, variants: &[(&str, f64)]) -> (FakeStore, Experiment) {
    let store = FakeStore::default();
    let exp = store.create_experiment(NewExperiment::new(name)).await.unwrap();
    for (v, w) in variants {
      store.add_variant(exp.id, NewVariant::new(*v, *w)).await.unwrap();
    }
    (store, exp)
  }

  #[tokio::test]
  async fn first_call_creates_then_reuses() {
    let (store, _) = seeded("homepage_hero", &[("control", 0.5), ("variant_b", 0.5)]).await;

    let first = assign(&store, "homepage_hero", "visitor-1").await.unwrap();
    let AssignOutcome::Assigned { variant, fresh, .. } = &first else {
      panic!("expected assignment, got {first:?}");
    };
    assert!(fresh);

    let second = assign(&store, "homepage_hero", "visitor-1").await.unwrap();
    assert_eq!(second.variant().map(|v| v.id), Some(variant.id));
    assert!(matches!(second, AssignOutcome::Assigned { fresh: false, .. }));
    assert_eq!(store.assignment_count(), 1);
  }

  #[tokio::test]
  async fn existing_assignment_survives_weight_changes() {
    let (store, exp) = seeded("hero", &[("control", 0.5), ("variant_b", 0.5)]).await;
    let before = assign(&store, "hero", "sticky").await.unwrap();
    let before_id = before.variant().unwrap().id;

    // Push all traffic to whichever variant the visitor is not in.
    for v in store.list_variants(exp.id).await.unwrap() {
      let weight = if v.id == before_id { 0.0 } else { 1.0 };
      store
        .update_variant(exp.id, v.id, crate::experiment::VariantPatch {
          weight: Some(weight),
          ..Default::default()
        })
        .await
        .unwrap();
    }

    let after = assign(&store, "hero", "sticky").await.unwrap();
    assert_eq!(after.variant().unwrap().id, before_id);
  }

  #[tokio::test]
  async fn unknown_experiment_is_not_found() {
    let store = FakeStore::default();
    let err = assign(&store, "missing", "visitor").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
  }

  #[tokio::test]
  async fn blank_visitor_is_invalid() {
    let (store, _) = seeded("hero", &[("control", 1.0)]).await;
    let err = assign(&store, "hero", "  ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[tokio::test]
  async fn experiment_without_variants_is_not_found() {
    let (store, _) = seeded("empty", &[]).await;
    let err = assign(&store, "empty", "visitor").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(store.assignment_count(), 0);
  }

  #[tokio::test]
  async fn inactive_experiment_assigns_nothing() {
    let (store, exp) = seeded("hero", &[("control", 1.0)]).await;
    store
      .update_experiment(exp.id, ExperimentPatch { is_active: Some(false), ..Default::default() })
      .await
      .unwrap();

    let outcome = assign(&store, "hero", "visitor").await.unwrap();
    assert!(matches!(outcome, AssignOutcome::Inactive { .. }));
    assert!(outcome.variant().is_none());
    assert_eq!(store.assignment_count(), 0);

    store
      .update_experiment(exp.id, ExperimentPatch { is_active: Some(true), ..Default::default() })
      .await
      .unwrap();
    let outcome = assign(&store, "hero", "visitor").await.unwrap();
    assert_eq!(outcome.variant().unwrap().name, "control");
    assert_eq!(store.assignment_count(), 1);
  }

  #[tokio::test]
  async fn losing_a_race_returns_the_committed_variant() {
    let (store, exp) = seeded("hero", &[("control", 0.5), ("variant_b", 0.5)]).await;
    let variants = store.list_variants(exp.id).await.unwrap();
    let computed = bucket::choose("racer", exp.id, &variants).unwrap().id;
    let other = variants.iter().find(|v| v.id != computed).unwrap().clone();

    // Another request commits `other` between our lookup and our insert.
    store.commit_before_next_insert(other.id);

    let outcome = assign(&store, "hero", "racer").await.unwrap();
    assert_eq!(outcome.variant().unwrap().id, other.id);
    assert!(matches!(outcome, AssignOutcome::Assigned { fresh: false, .. }));
    assert_eq!(store.assignment_count(), 1);
  }

  #[tokio::test]
  async fn concurrent_first_requests_converge() {
    let (store, _) = seeded("hero", &[("a", 0.2), ("b", 0.3), ("c", 0.5)]).await;
    let store = Arc::new(store);

    let handles: Vec<_> = (0..16)
      .map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
          match assign(store.as_ref(), "hero", "same-visitor").await.unwrap() {
            AssignOutcome::Assigned { variant, fresh, .. } => (variant.id, fresh),
            AssignOutcome::Inactive { .. } => panic!("experiment is active"),
          }
        })
      })
      .collect();

    let mut ids = Vec::new();
    let mut fresh = 0;
    for h in handles {
      let (id, was_fresh) = h.await.unwrap();
      ids.push(id);
      fresh += usize::from(was_fresh);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(fresh, 1);
    assert_eq!(store.assignment_count(), 1);
  }
}
