//! Storage traits.
//!
//! The traits are implemented by storage backends (e.g.
//! `splitkit-store-sqlite`). Higher layers depend on this abstraction, and
//! receive a store handle explicitly rather than reaching for a global one.
//!
//! Every coordination invariant (experiment name, variant name within an
//! experiment, toggle key, one assignment per experiment and visitor) is the
//! backend's job to enforce atomically; callers never check-then-insert.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  assignment::{Assignment, ResolvedAssignment},
  error::ClassifyError,
  event::{Event, EventFilter, EventPage, NewEvent},
  experiment::{
    Experiment, ExperimentPatch, NewExperiment, NewVariant, Variant, VariantPatch,
  },
  stats::ExperimentStats,
  toggle::{FeatureToggle, NewToggle, TogglePatch},
};

// ─── Base ────────────────────────────────────────────────────────────────────

/// Shared error type and liveness check for every store trait.
///
/// All methods return `Send` futures so the traits can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait Store: Send + Sync {
  type Error: std::error::Error
    + ClassifyError
    + From<crate::Error>
    + Send
    + Sync
    + 'static;

  /// Round-trip to the backend; used by health checks.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Registry ────────────────────────────────────────────────────────────────

pub trait ExperimentStore: Store {
  /// Persist a new experiment. Fails with a conflict if the name is taken.
  fn create_experiment(
    &self,
    input: NewExperiment,
  ) -> impl Future<Output = Result<Experiment, Self::Error>> + Send + '_;

  fn get_experiment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Experiment>, Self::Error>> + Send + '_;

  fn find_experiment_by_name(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Option<Experiment>, Self::Error>> + Send + '_;

  /// All experiments, newest first.
  fn list_experiments(
    &self,
  ) -> impl Future<Output = Result<Vec<Experiment>, Self::Error>> + Send + '_;

  /// Merge `patch` into the stored row. Returns `None` if `id` is unknown.
  fn update_experiment(
    &self,
    id: Uuid,
    patch: ExperimentPatch,
  ) -> impl Future<Output = Result<Option<Experiment>, Self::Error>> + Send + '_;

  /// Attach a new variant. Fails with not-found if the experiment does not
  /// exist and with a conflict if the name is taken within it.
  fn add_variant(
    &self,
    experiment_id: Uuid,
    input: NewVariant,
  ) -> impl Future<Output = Result<Variant, Self::Error>> + Send + '_;

  /// Merge `patch` into a variant of `experiment_id`. Returns `None` if no
  /// such variant belongs to that experiment.
  fn update_variant(
    &self,
    experiment_id: Uuid,
    variant_id: Uuid,
    patch: VariantPatch,
  ) -> impl Future<Output = Result<Option<Variant>, Self::Error>> + Send + '_;

  /// Variants of one experiment, ordered by name.
  fn list_variants(
    &self,
    experiment_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Variant>, Self::Error>> + Send + '_;

  /// Every variant of every experiment, ordered by experiment then name.
  fn list_all_variants(
    &self,
  ) -> impl Future<Output = Result<Vec<Variant>, Self::Error>> + Send + '_;
}

// ─── Assignments ─────────────────────────────────────────────────────────────

pub trait AssignmentStore: Store {
  /// The committed assignment for this pair, joined with its variant.
  fn find_assignment(
    &self,
    experiment_id: Uuid,
    visitor_id: String,
  ) -> impl Future<Output = Result<Option<ResolvedAssignment>, Self::Error>> + Send + '_;

  /// Insert `assignment` unless one already exists for its
  /// `(experiment_id, visitor_id)`. This must be a single atomic
  /// uniqueness-constrained write. Returns `true` if this call wrote the row.
  fn insert_assignment(
    &self,
    assignment: Assignment,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Events ──────────────────────────────────────────────────────────────────

pub trait EventStore: Store {
  /// Append an event. The `created_at` timestamp is set by the store.
  fn record_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  /// A page of events matching `filter`, newest first.
  fn list_events(
    &self,
    filter: EventFilter,
  ) -> impl Future<Output = Result<EventPage, Self::Error>> + Send + '_;

  /// Aggregate events of `experiment_id`. Only events recorded after
  /// `window_start` contribute to the timeline.
  fn experiment_stats(
    &self,
    experiment_id: Uuid,
    window_start: DateTime<Utc>,
  ) -> impl Future<Output = Result<ExperimentStats, Self::Error>> + Send + '_;
}

// ─── Toggles ─────────────────────────────────────────────────────────────────

pub trait ToggleStore: Store {
  /// All toggles, ordered by key.
  fn list_toggles(
    &self,
  ) -> impl Future<Output = Result<Vec<FeatureToggle>, Self::Error>> + Send + '_;

  fn get_toggle(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<FeatureToggle>, Self::Error>> + Send + '_;

  /// Fails with a conflict if the key is taken.
  fn create_toggle(
    &self,
    input: NewToggle,
  ) -> impl Future<Output = Result<FeatureToggle, Self::Error>> + Send + '_;

  /// Returns `None` if `id` is unknown.
  fn update_toggle(
    &self,
    id: Uuid,
    patch: TogglePatch,
  ) -> impl Future<Output = Result<Option<FeatureToggle>, Self::Error>> + Send + '_;
}

// ─── Combined ────────────────────────────────────────────────────────────────

/// A backend implementing every store trait.
pub trait SplitStore: ExperimentStore + AssignmentStore + EventStore + ToggleStore {}

impl<T> SplitStore for T where
  T: ExperimentStore + AssignmentStore + EventStore + ToggleStore
{
}
