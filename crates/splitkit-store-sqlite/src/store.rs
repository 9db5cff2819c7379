//! [`SqliteStore`]: the SQLite implementation of the splitkit store traits.

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use splitkit_core::{
  Error as CoreError,
  assignment::{Assignment, ResolvedAssignment},
  event::{Event, EventFilter, EventPage, NewEvent, Pagination},
  experiment::{
    Experiment, ExperimentPatch, NewExperiment, NewVariant, Variant, VariantPatch,
  },
  stats::ExperimentStats,
  store::{AssignmentStore, EventStore, ExperimentStore, Store, ToggleStore},
  toggle::{FeatureToggle, NewToggle, TogglePatch},
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, EXPERIMENT_COLUMNS, RawAssignment, RawBreakdown, RawEvent,
    RawExperiment, RawTimeline, RawToggle, RawTotals, RawVariant, TOGGLE_COLUMNS,
    VARIANT_COLUMNS, encode_config, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Constraint violations ───────────────────────────────────────────────────

enum Violation {
  Unique,
  ForeignKey,
}

fn violation(err: &tokio_rusqlite::Error) -> Option<Violation> {
  let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, _)) = err
  else {
    return None;
  };
  match failure.extended_code {
    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(Violation::Unique),
    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Violation::ForeignKey),
    _ => None,
  }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A splitkit store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All writes go
/// through one connection thread, and every uniqueness rule is a table
/// constraint, so concurrent callers never need a check-then-insert.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::info!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Close the underlying connection. Clones of this store fail with an
  /// unavailable error afterwards.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    tracing::info!("closed sqlite store");
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("schema initialised");
    Ok(())
  }
}

// ─── Store impl ──────────────────────────────────────────────────────────────

impl Store for SqliteStore {
  type Error = Error;

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ExperimentStore impl ────────────────────────────────────────────────────

impl ExperimentStore for SqliteStore {
  async fn create_experiment(&self, input: NewExperiment) -> Result<Experiment> {
    let now = now();
    let experiment = Experiment {
      id:          Uuid::new_v4(),
      name:        input.name,
      description: input.description,
      is_active:   input.is_active,
      created_at:  now,
      updated_at:  now,
    };

    let id_str = encode_uuid(experiment.id);
    let name = experiment.name.clone();
    let description = experiment.description.clone();
    let is_active = experiment.is_active;
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO experiments (
             experiment_id, name, description, is_active, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, name, description, is_active, at_str],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::Unique) => CoreError::Conflict(format!(
          "an experiment named {:?} already exists",
          experiment.name
        ))
        .into(),
        _ => Error::from(e),
      })?;

    Ok(experiment)
  }

  async fn get_experiment(&self, id: Uuid) -> Result<Option<Experiment>> {
    let id_str = encode_uuid(id);
    let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE experiment_id = ?1");

    let raw: Option<RawExperiment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawExperiment::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawExperiment::into_experiment).transpose()
  }

  async fn find_experiment_by_name(&self, name: String) -> Result<Option<Experiment>> {
    let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE name = ?1");

    let raw: Option<RawExperiment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![name], RawExperiment::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawExperiment::into_experiment).transpose()
  }

  async fn list_experiments(&self) -> Result<Vec<Experiment>> {
    let sql = format!(
      "SELECT {EXPERIMENT_COLUMNS} FROM experiments ORDER BY created_at DESC, rowid DESC"
    );

    let raws: Vec<RawExperiment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawExperiment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawExperiment::into_experiment).collect()
  }

  async fn update_experiment(
    &self,
    id: Uuid,
    patch: ExperimentPatch,
  ) -> Result<Option<Experiment>> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(now());
    let new_name = patch.name.clone();
    let sql = format!(
      "UPDATE experiments SET
         name        = COALESCE(?2, name),
         description = COALESCE(?3, description),
         is_active   = COALESCE(?4, is_active),
         updated_at  = ?5
       WHERE experiment_id = ?1
       RETURNING {EXPERIMENT_COLUMNS}"
    );

    let raw: Option<RawExperiment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![
                id_str,
                patch.name,
                patch.description,
                patch.is_active,
                at_str
              ],
              RawExperiment::from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::Unique) => CoreError::Conflict(format!(
          "an experiment named {:?} already exists",
          new_name.unwrap_or_default()
        ))
        .into(),
        _ => Error::from(e),
      })?;

    raw.map(RawExperiment::into_experiment).transpose()
  }

  async fn add_variant(&self, experiment_id: Uuid, input: NewVariant) -> Result<Variant> {
    let variant = Variant {
      id: Uuid::new_v4(),
      experiment_id,
      name: input.name,
      weight: input.weight,
      config: input.config,
      created_at: now(),
    };

    let id_str = encode_uuid(variant.id);
    let exp_str = encode_uuid(experiment_id);
    let name = variant.name.clone();
    let weight = variant.weight;
    let config_str = encode_config(&variant.config)?;
    let at_str = encode_dt(variant.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO variants (
             variant_id, experiment_id, name, weight, config, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, exp_str, name, weight, config_str, at_str],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::Unique) => CoreError::Conflict(format!(
          "variant {:?} already exists in this experiment",
          variant.name
        ))
        .into(),
        Some(Violation::ForeignKey) => {
          CoreError::NotFound(format!("experiment {experiment_id} not found")).into()
        }
        None => Error::from(e),
      })?;

    Ok(variant)
  }

  async fn update_variant(
    &self,
    experiment_id: Uuid,
    variant_id: Uuid,
    patch: VariantPatch,
  ) -> Result<Option<Variant>> {
    let id_str = encode_uuid(variant_id);
    let exp_str = encode_uuid(experiment_id);
    let config_str = patch.config.as_ref().map(encode_config).transpose()?;
    let new_name = patch.name.clone();
    let sql = format!(
      "UPDATE variants SET
         name   = COALESCE(?3, name),
         weight = COALESCE(?4, weight),
         config = COALESCE(?5, config)
       WHERE variant_id = ?1 AND experiment_id = ?2
       RETURNING {VARIANT_COLUMNS}"
    );

    let raw: Option<RawVariant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![id_str, exp_str, patch.name, patch.weight, config_str],
              RawVariant::from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::Unique) => CoreError::Conflict(format!(
          "variant {:?} already exists in this experiment",
          new_name.unwrap_or_default()
        ))
        .into(),
        _ => Error::from(e),
      })?;

    raw.map(RawVariant::into_variant).transpose()
  }

  async fn list_variants(&self, experiment_id: Uuid) -> Result<Vec<Variant>> {
    let exp_str = encode_uuid(experiment_id);
    let sql = format!(
      "SELECT {VARIANT_COLUMNS} FROM variants
       WHERE experiment_id = ?1
       ORDER BY name, variant_id"
    );

    let raws: Vec<RawVariant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![exp_str], RawVariant::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVariant::into_variant).collect()
  }

  async fn list_all_variants(&self) -> Result<Vec<Variant>> {
    let sql =
      format!("SELECT {VARIANT_COLUMNS} FROM variants ORDER BY experiment_id, name");

    let raws: Vec<RawVariant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawVariant::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVariant::into_variant).collect()
  }
}

// ─── AssignmentStore impl ────────────────────────────────────────────────────

impl AssignmentStore for SqliteStore {
  async fn find_assignment(
    &self,
    experiment_id: Uuid,
    visitor_id: String,
  ) -> Result<Option<ResolvedAssignment>> {
    let exp_str = encode_uuid(experiment_id);

    let raw: Option<RawAssignment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT a.experiment_id, a.visitor_id, a.variant_id, a.created_at,
                      v.variant_id, v.experiment_id, v.name, v.weight, v.config,
                      v.created_at
               FROM assignments a
               JOIN variants v ON v.variant_id = a.variant_id
               WHERE a.experiment_id = ?1 AND a.visitor_id = ?2",
              rusqlite::params![exp_str, visitor_id],
              RawAssignment::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAssignment::into_resolved).transpose()
  }

  async fn insert_assignment(&self, assignment: Assignment) -> Result<bool> {
    let exp_str = encode_uuid(assignment.experiment_id);
    let variant_str = encode_uuid(assignment.variant_id);
    let at_str = encode_dt(assignment.created_at);
    let visitor_id = assignment.visitor_id;

    let inserted = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "INSERT INTO assignments (experiment_id, visitor_id, variant_id, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (experiment_id, visitor_id) DO NOTHING",
          rusqlite::params![exp_str, visitor_id, variant_str, at_str],
        )?;
        Ok(changed == 1)
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::ForeignKey) => CoreError::NotFound(format!(
          "variant {} of experiment {} not found",
          assignment.variant_id, assignment.experiment_id
        ))
        .into(),
        _ => Error::from(e),
      })?;

    Ok(inserted)
  }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

/// Shared `WHERE` clause for [`EventStore::list_events`]; unset filters are
/// bound as NULL and match everything.
const EVENT_FILTER: &str = "(?1 IS NULL OR experiment_id = ?1)
   AND (?2 IS NULL OR visitor_id = ?2)
   AND (?3 IS NULL OR event_type = ?3)";

impl EventStore for SqliteStore {
  async fn record_event(&self, input: NewEvent) -> Result<Event> {
    let event = Event {
      id:            Uuid::new_v4(),
      visitor_id:    input.visitor_id,
      experiment_id: input.experiment_id,
      variant_id:    input.variant_id,
      event_type:    input.event_type,
      event_data:    input.event_data,
      page_url:      input.page_url,
      created_at:    now(),
    };

    let id_str = encode_uuid(event.id);
    let visitor_id = event.visitor_id.clone();
    let exp_str = event.experiment_id.map(encode_uuid);
    let variant_str = event.variant_id.map(encode_uuid);
    let event_type = event.event_type.clone();
    let data_str = encode_config(&event.event_data)?;
    let page_url = event.page_url.clone();
    let at_str = encode_dt(event.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (
             event_id, visitor_id, experiment_id, variant_id,
             event_type, event_data, page_url, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            visitor_id,
            exp_str,
            variant_str,
            event_type,
            data_str,
            page_url,
            at_str
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::ForeignKey) => CoreError::InvalidInput(
          "event references an unknown experiment or variant".into(),
        )
        .into(),
        _ => Error::from(e),
      })?;

    Ok(event)
  }

  async fn list_events(&self, filter: EventFilter) -> Result<EventPage> {
    let exp_str = filter.experiment_id.map(encode_uuid);
    let visitor_id = filter.visitor_id.clone();
    let event_type = filter.event_type.clone();
    let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
    let page_sql = format!(
      "SELECT {EVENT_COLUMNS} FROM events
       WHERE {EVENT_FILTER}
       ORDER BY created_at DESC, rowid DESC
       LIMIT ?4 OFFSET ?5"
    );
    let count_sql = format!("SELECT COUNT(*) FROM events WHERE {EVENT_FILTER}");

    let (raws, total): (Vec<RawEvent>, i64) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![exp_str, visitor_id, event_type, limit, offset],
            RawEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let total: i64 = conn.query_row(
          &count_sql,
          rusqlite::params![exp_str, visitor_id, event_type],
          |r| r.get(0),
        )?;
        Ok((rows, total))
      })
      .await?;

    let events = raws
      .into_iter()
      .map(RawEvent::into_event)
      .collect::<Result<Vec<_>>>()?;
    let total = u64::try_from(total).unwrap_or_default();
    let pagination = Pagination::new(filter.limit, filter.offset, events.len(), total);
    Ok(EventPage { events, pagination })
  }

  async fn experiment_stats(
    &self,
    experiment_id: Uuid,
    window_start: DateTime<Utc>,
  ) -> Result<ExperimentStats> {
    let exp_str = encode_uuid(experiment_id);
    let since_str = encode_dt(window_start);

    let (breakdown, totals, timeline) = self
      .conn
      .call(move |conn| {
        let breakdown = conn
          .prepare(
            "SELECT v.variant_id, v.name, e.event_type,
                    COUNT(*), COUNT(DISTINCT e.visitor_id)
             FROM events e
             JOIN variants v ON v.variant_id = e.variant_id
             WHERE e.experiment_id = ?1
             GROUP BY v.variant_id, v.name, e.event_type
             ORDER BY v.name, v.variant_id, e.event_type",
          )?
          .query_map(rusqlite::params![exp_str], |row| {
            Ok(RawBreakdown {
              variant_id:      row.get(0)?,
              variant_name:    row.get(1)?,
              event_type:      row.get(2)?,
              event_count:     row.get(3)?,
              unique_visitors: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let totals = conn
          .prepare(
            "SELECT v.variant_id, v.name, COUNT(*), COUNT(DISTINCT e.visitor_id)
             FROM events e
             JOIN variants v ON v.variant_id = e.variant_id
             WHERE e.experiment_id = ?1
             GROUP BY v.variant_id, v.name
             ORDER BY v.name, v.variant_id",
          )?
          .query_map(rusqlite::params![exp_str], |row| {
            Ok(RawTotals {
              variant_id:     row.get(0)?,
              variant_name:   row.get(1)?,
              total_events:   row.get(2)?,
              total_visitors: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let timeline = conn
          .prepare(
            "SELECT v.variant_id, v.name,
                    strftime('%Y-%m-%dT%H:00:00Z', e.created_at) AS hour,
                    COUNT(*)
             FROM events e
             JOIN variants v ON v.variant_id = e.variant_id
             WHERE e.experiment_id = ?1 AND e.created_at > ?2
             GROUP BY hour, v.variant_id, v.name
             ORDER BY hour, v.name, v.variant_id",
          )?
          .query_map(rusqlite::params![exp_str, since_str], |row| {
            Ok(RawTimeline {
              variant_id:   row.get(0)?,
              variant_name: row.get(1)?,
              hour:         row.get(2)?,
              event_count:  row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((breakdown, totals, timeline))
      })
      .await?;

    Ok(ExperimentStats {
      breakdown: breakdown
        .into_iter()
        .map(RawBreakdown::into_row)
        .collect::<Result<_>>()?,
      totals:    totals.into_iter().map(RawTotals::into_row).collect::<Result<_>>()?,
      timeline:  timeline
        .into_iter()
        .map(RawTimeline::into_row)
        .collect::<Result<_>>()?,
    })
  }
}

// ─── ToggleStore impl ────────────────────────────────────────────────────────

impl ToggleStore for SqliteStore {
  async fn list_toggles(&self) -> Result<Vec<FeatureToggle>> {
    let sql = format!("SELECT {TOGGLE_COLUMNS} FROM feature_toggles ORDER BY key");

    let raws: Vec<RawToggle> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawToggle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawToggle::into_toggle).collect()
  }

  async fn get_toggle(&self, key: String) -> Result<Option<FeatureToggle>> {
    let sql = format!("SELECT {TOGGLE_COLUMNS} FROM feature_toggles WHERE key = ?1");

    let raw: Option<RawToggle> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![key], RawToggle::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawToggle::into_toggle).transpose()
  }

  async fn create_toggle(&self, input: NewToggle) -> Result<FeatureToggle> {
    let now = now();
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

    let id_str = encode_uuid(toggle.id);
    let key = toggle.key.clone();
    let label = toggle.label.clone();
    let description = toggle.description.clone();
    let enabled = toggle.enabled;
    let config_str = encode_config(&toggle.config)?;
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO feature_toggles (
             toggle_id, key, label, description, enabled, config,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![id_str, key, label, description, enabled, config_str, at_str],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| match violation(&e) {
        Some(Violation::Unique) => CoreError::Conflict(format!(
          "a toggle with key {:?} already exists",
          toggle.key
        ))
        .into(),
        _ => Error::from(e),
      })?;

    Ok(toggle)
  }

  async fn update_toggle(
    &self,
    id: Uuid,
    patch: TogglePatch,
  ) -> Result<Option<FeatureToggle>> {
    let id_str = encode_uuid(id);
    let config_str = patch.config.as_ref().map(encode_config).transpose()?;
    let at_str = encode_dt(now());
    let sql = format!(
      "UPDATE feature_toggles SET
         enabled    = COALESCE(?2, enabled),
         config     = COALESCE(?3, config),
         updated_at = ?4
       WHERE toggle_id = ?1
       RETURNING {TOGGLE_COLUMNS}"
    );

    let raw: Option<RawToggle> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![id_str, patch.enabled, config_str, at_str],
              RawToggle::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawToggle::into_toggle).transpose()
  }
}
