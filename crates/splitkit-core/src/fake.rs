//! In-memory store used by this crate's unit tests.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::Mutex,
};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  assignment::{Assignment, ResolvedAssignment},
  event::{Event, EventFilter, EventPage, NewEvent, Pagination},
  experiment::{
    Experiment, ExperimentPatch, NewExperiment, NewVariant, Variant, VariantPatch,
  },
  stats::{BreakdownRow, ExperimentStats, TimelineRow, TotalsRow},
  store::{AssignmentStore, EventStore, ExperimentStore, Store, ToggleStore},
  toggle::{FeatureToggle, NewToggle, TogglePatch},
};

#[derive(Default)]
struct State {
  experiments: Vec<Experiment>,
  variants:    Vec<Variant>,
  assignments: HashMap<(Uuid, String), Assignment>,
  events:      Vec<Event>,
  toggles:     Vec<FeatureToggle>,
  /// Variant a simulated concurrent request commits just before our insert.
  race:        Option<Uuid>,
  fail_events: bool,
}

#[derive(Default)]
pub struct FakeStore {
  state: Mutex<State>,
}

impl FakeStore {
  pub fn assignment_count(&self) -> usize {
    self.state.lock().unwrap().assignments.len()
  }

  pub fn event_count(&self) -> usize {
    self.state.lock().unwrap().events.len()
  }

  pub fn commit_before_next_insert(&self, variant_id: Uuid) {
    self.state.lock().unwrap().race = Some(variant_id);
  }

  pub fn fail_events(&self) {
    self.state.lock().unwrap().fail_events = true;
  }
}

impl Store for FakeStore {
  type Error = Error;

  async fn ping(&self) -> Result<()> { Ok(()) }
}

impl ExperimentStore for FakeStore {
  async fn create_experiment(&self, input: NewExperiment) -> Result<Experiment> {
    let mut s = self.state.lock().unwrap();
    if s.experiments.iter().any(|e| e.name == input.name) {
      return Err(Error::Conflict(format!("experiment {:?} exists", input.name)));
    }
    let now = Utc::now();
    let exp = Experiment {
      id:          Uuid::new_v4(),
      name:        input.name,
      description: input.description,
      is_active:   input.is_active,
      created_at:  now,
      updated_at:  now,
    };
    s.experiments.push(exp.clone());
    Ok(exp)
  }

  async fn get_experiment(&self, id: Uuid) -> Result<Option<Experiment>> {
    let s = self.state.lock().unwrap();
    Ok(s.experiments.iter().find(|e| e.id == id).cloned())
  }

  async fn find_experiment_by_name(&self, name: String) -> Result<Option<Experiment>> {
    let s = self.state.lock().unwrap();
    Ok(s.experiments.iter().find(|e| e.name == name).cloned())
  }

  async fn list_experiments(&self) -> Result<Vec<Experiment>> {
    let s = self.state.lock().unwrap();
    Ok(s.experiments.iter().rev().cloned().collect())
  }

  async fn update_experiment(
    &self,
    id: Uuid,
    patch: ExperimentPatch,
  ) -> Result<Option<Experiment>> {
    let mut s = self.state.lock().unwrap();
    let Some(pos) = s.experiments.iter().position(|e| e.id == id) else {
      return Ok(None);
    };
    let merged = patch.apply(s.experiments[pos].clone(), Utc::now());
    if s.experiments.iter().any(|e| e.id != id && e.name == merged.name) {
      return Err(Error::Conflict(format!("experiment {:?} exists", merged.name)));
    }
    s.experiments[pos] = merged.clone();
    Ok(Some(merged))
  }

  async fn add_variant(&self, experiment_id: Uuid, input: NewVariant) -> Result<Variant> {
    let mut s = self.state.lock().unwrap();
    if !s.experiments.iter().any(|e| e.id == experiment_id) {
      return Err(Error::NotFound(format!("experiment {experiment_id}")));
    }
    if s
      .variants
      .iter()
      .any(|v| v.experiment_id == experiment_id && v.name == input.name)
    {
      return Err(Error::Conflict(format!("variant {:?} exists", input.name)));
    }
    let variant = Variant {
      id: Uuid::new_v4(),
      experiment_id,
      name: input.name,
      weight: input.weight,
      config: input.config,
      created_at: Utc::now(),
    };
    s.variants.push(variant.clone());
    Ok(variant)
  }

  async fn update_variant(
    &self,
    experiment_id: Uuid,
    variant_id: Uuid,
    patch: VariantPatch,
  ) -> Result<Option<Variant>> {
    let mut s = self.state.lock().unwrap();
    let Some(pos) = s
      .variants
      .iter()
      .position(|v| v.id == variant_id && v.experiment_id == experiment_id)
    else {
      return Ok(None);
    };
    let merged = patch.apply(s.variants[pos].clone());
    s.variants[pos] = merged.clone();
    Ok(Some(merged))
  }

  async fn list_variants(&self, experiment_id: Uuid) -> Result<Vec<Variant>> {
    let s = self.state.lock().unwrap();
    let mut out: Vec<Variant> = s
      .variants
      .iter()
      .filter(|v| v.experiment_id == experiment_id)
      .cloned()
      .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
  }

  async fn list_all_variants(&self) -> Result<Vec<Variant>> {
    let s = self.state.lock().unwrap();
    let mut out = s.variants.clone();
    out.sort_by(|a, b| (a.experiment_id, &a.name).cmp(&(b.experiment_id, &b.name)));
    Ok(out)
  }
}

impl AssignmentStore for FakeStore {
  async fn find_assignment(
    &self,
    experiment_id: Uuid,
    visitor_id: String,
  ) -> Result<Option<ResolvedAssignment>> {
    // Let other tasks run between the read and the insert.
    tokio::task::yield_now().await;
    let s = self.state.lock().unwrap();
    let Some(assignment) = s.assignments.get(&(experiment_id, visitor_id)).cloned() else {
      return Ok(None);
    };
    let variant = s
      .variants
      .iter()
      .find(|v| v.id == assignment.variant_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("variant {}", assignment.variant_id)))?;
    Ok(Some(ResolvedAssignment { assignment, variant }))
  }

  async fn insert_assignment(&self, assignment: Assignment) -> Result<bool> {
    let mut s = self.state.lock().unwrap();
    let key = (assignment.experiment_id, assignment.visitor_id.clone());
    if let Some(variant_id) = s.race.take() {
      s.assignments.insert(key.clone(), Assignment { variant_id, ..assignment.clone() });
    }
    if s.assignments.contains_key(&key) {
      return Ok(false);
    }
    s.assignments.insert(key, assignment);
    Ok(true)
  }
}

impl EventStore for FakeStore {
  async fn record_event(&self, input: NewEvent) -> Result<Event> {
    let mut s = self.state.lock().unwrap();
    if s.fail_events {
      return Err(Error::NotFound("event table is gone".into()));
    }
    let event = Event {
      id:            Uuid::new_v4(),
      visitor_id:    input.visitor_id,
      experiment_id: input.experiment_id,
      variant_id:    input.variant_id,
      event_type:    input.event_type,
      event_data:    input.event_data,
      page_url:      input.page_url,
      created_at:    Utc::now(),
    };
    s.events.push(event.clone());
    Ok(event)
  }

  async fn list_events(&self, filter: EventFilter) -> Result<EventPage> {
    let s = self.state.lock().unwrap();
    let matching: Vec<&Event> = s
      .events
      .iter()
      .rev()
      .filter(|e| filter.experiment_id.is_none_or(|id| e.experiment_id == Some(id)))
      .filter(|e| filter.visitor_id.as_ref().is_none_or(|v| &e.visitor_id == v))
      .filter(|e| filter.event_type.as_ref().is_none_or(|t| &e.event_type == t))
      .collect();
    let total = matching.len() as u64;
    let events: Vec<Event> = matching
      .into_iter()
      .skip(filter.offset)
      .take(filter.limit)
      .cloned()
      .collect();
    let pagination = Pagination::new(filter.limit, filter.offset, events.len(), total);
    Ok(EventPage { events, pagination })
  }

  async fn experiment_stats(
    &self,
    experiment_id: Uuid,
    window_start: DateTime<Utc>,
  ) -> Result<ExperimentStats> {
    let s = self.state.lock().unwrap();
    let mut breakdown: BTreeMap<(String, Uuid, String), (u64, HashSet<String>)> =
      BTreeMap::new();
    let mut totals: BTreeMap<(String, Uuid), (u64, HashSet<String>)> = BTreeMap::new();
    let mut timeline: BTreeMap<(DateTime<Utc>, String, Uuid), u64> = BTreeMap::new();

    for e in s.events.iter().filter(|e| e.experiment_id == Some(experiment_id)) {
      let Some(v) = s.variants.iter().find(|v| Some(v.id) == e.variant_id) else {
        continue;
      };
      let b = breakdown
        .entry((v.name.clone(), v.id, e.event_type.clone()))
        .or_default();
      b.0 += 1;
      b.1.insert(e.visitor_id.clone());
      let t = totals.entry((v.name.clone(), v.id)).or_default();
      t.0 += 1;
      t.1.insert(e.visitor_id.clone());
      if e.created_at > window_start {
        let hour = e.created_at.duration_trunc(TimeDelta::hours(1)).unwrap();
        *timeline.entry((hour, v.name.clone(), v.id)).or_default() += 1;
      }
    }

    Ok(ExperimentStats {
      breakdown: breakdown
        .into_iter()
        .map(|((variant_name, variant_id, event_type), (count, visitors))| BreakdownRow {
          variant_id,
          variant_name,
          event_type,
          event_count: count,
          unique_visitors: visitors.len() as u64,
        })
        .collect(),
      totals:    totals
        .into_iter()
        .map(|((variant_name, variant_id), (count, visitors))| TotalsRow {
          variant_id,
          variant_name,
          total_events: count,
          total_visitors: visitors.len() as u64,
        })
        .collect(),
      timeline:  timeline
        .into_iter()
        .map(|((hour, variant_name, variant_id), event_count)| TimelineRow {
          variant_id,
          variant_name,
          hour,
          event_count,
        })
        .collect(),
    })
  }
}

impl ToggleStore for FakeStore {
  async fn list_toggles(&self) -> Result<Vec<FeatureToggle>> {
    let s = self.state.lock().unwrap();
    let mut out = s.toggles.clone();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(out)
  }

  async fn get_toggle(&self, key: String) -> Result<Option<FeatureToggle>> {
    let s = self.state.lock().unwrap();
    Ok(s.toggles.iter().find(|t| t.key == key).cloned())
  }

  async fn create_toggle(&self, input: NewToggle) -> Result<FeatureToggle> {
    let mut s = self.state.lock().unwrap();
    if s.toggles.iter().any(|t| t.key == input.key) {
      return Err(Error::Conflict(format!("toggle {:?} exists", input.key)));
    }
    let now = Utc::now();
    let toggle = FeatureToggle {
      id:          Uuid::new_v4(),
      key:         input.key,
      label:       input.label,
      description: input.description,
      enabled:     input.enabled,
      config:      input.config,
      created_at:  now,
      updated_at:  now,
    };
    s.toggles.push(toggle.clone());
    Ok(toggle)
  }

  async fn update_toggle(&self, id: Uuid, patch: TogglePatch) -> Result<Option<FeatureToggle>> {
    let mut s = self.state.lock().unwrap();
    let Some(pos) = s.toggles.iter().position(|t| t.id == id) else {
      return Ok(None);
    };
    let merged = patch.apply(s.toggles[pos].clone(), Utc::now());
    s.toggles[pos] = merged.clone();
    Ok(Some(merged))
  }
}
