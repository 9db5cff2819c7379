//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that lexical order is time order. Config payloads
//! are compact JSON objects. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use splitkit_core::{
  assignment::{Assignment, ResolvedAssignment},
  event::Event,
  experiment::{Config, Experiment, Variant},
  stats::{BreakdownRow, TimelineRow, TotalsRow},
  toggle::FeatureToggle,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_config(config: &Config) -> Result<String> {
  Ok(serde_json::to_string(config)?)
}

pub fn decode_config(s: &str) -> Result<Config> { Ok(serde_json::from_str(s)?) }

fn count(n: i64) -> u64 { u64::try_from(n).unwrap_or_default() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawExperiment::from_row`].
pub const EXPERIMENT_COLUMNS: &str =
  "experiment_id, name, description, is_active, created_at, updated_at";

pub struct RawExperiment {
  pub experiment_id: String,
  pub name:          String,
  pub description:   Option<String>,
  pub is_active:     bool,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawExperiment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      experiment_id: row.get(0)?,
      name:          row.get(1)?,
      description:   row.get(2)?,
      is_active:     row.get(3)?,
      created_at:    row.get(4)?,
      updated_at:    row.get(5)?,
    })
  }

  pub fn into_experiment(self) -> Result<Experiment> {
    Ok(Experiment {
      id:          decode_uuid(&self.experiment_id)?,
      name:        self.name,
      description: self.description,
      is_active:   self.is_active,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawVariant::from_row`].
pub const VARIANT_COLUMNS: &str =
  "variant_id, experiment_id, name, weight, config, created_at";

pub struct RawVariant {
  pub variant_id:    String,
  pub experiment_id: String,
  pub name:          String,
  pub weight:        f64,
  pub config:        String,
  pub created_at:    String,
}

impl RawVariant {
  /// Read the six variant columns starting at `offset`.
  pub fn from_row_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      variant_id:    row.get(offset)?,
      experiment_id: row.get(offset + 1)?,
      name:          row.get(offset + 2)?,
      weight:        row.get(offset + 3)?,
      config:        row.get(offset + 4)?,
      created_at:    row.get(offset + 5)?,
    })
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Self::from_row_at(row, 0)
  }

  pub fn into_variant(self) -> Result<Variant> {
    Ok(Variant {
      id:            decode_uuid(&self.variant_id)?,
      experiment_id: decode_uuid(&self.experiment_id)?,
      name:          self.name,
      weight:        self.weight,
      config:        decode_config(&self.config)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// An `assignments` row joined with its variant (`a.*` then `v.*`).
pub struct RawAssignment {
  pub experiment_id: String,
  pub visitor_id:    String,
  pub variant_id:    String,
  pub created_at:    String,
  pub variant:       RawVariant,
}

impl RawAssignment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      experiment_id: row.get(0)?,
      visitor_id:    row.get(1)?,
      variant_id:    row.get(2)?,
      created_at:    row.get(3)?,
      variant:       RawVariant::from_row_at(row, 4)?,
    })
  }

  pub fn into_resolved(self) -> Result<ResolvedAssignment> {
    Ok(ResolvedAssignment {
      assignment: Assignment {
        experiment_id: decode_uuid(&self.experiment_id)?,
        visitor_id:    self.visitor_id,
        variant_id:    decode_uuid(&self.variant_id)?,
        created_at:    decode_dt(&self.created_at)?,
      },
      variant:    self.variant.into_variant()?,
    })
  }
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "event_id, visitor_id, experiment_id, variant_id, \
                                 event_type, event_data, page_url, created_at";

pub struct RawEvent {
  pub event_id:      String,
  pub visitor_id:    String,
  pub experiment_id: Option<String>,
  pub variant_id:    Option<String>,
  pub event_type:    String,
  pub event_data:    String,
  pub page_url:      Option<String>,
  pub created_at:    String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:      row.get(0)?,
      visitor_id:    row.get(1)?,
      experiment_id: row.get(2)?,
      variant_id:    row.get(3)?,
      event_type:    row.get(4)?,
      event_data:    row.get(5)?,
      page_url:      row.get(6)?,
      created_at:    row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      id:            decode_uuid(&self.event_id)?,
      visitor_id:    self.visitor_id,
      experiment_id: decode_opt_uuid(self.experiment_id)?,
      variant_id:    decode_opt_uuid(self.variant_id)?,
      event_type:    self.event_type,
      event_data:    decode_config(&self.event_data)?,
      page_url:      self.page_url,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawToggle::from_row`].
pub const TOGGLE_COLUMNS: &str =
  "toggle_id, key, label, description, enabled, config, created_at, updated_at";

pub struct RawToggle {
  pub toggle_id:   String,
  pub key:         String,
  pub label:       String,
  pub description: Option<String>,
  pub enabled:     bool,
  pub config:      String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawToggle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      toggle_id:   row.get(0)?,
      key:         row.get(1)?,
      label:       row.get(2)?,
      description: row.get(3)?,
      enabled:     row.get(4)?,
      config:      row.get(5)?,
      created_at:  row.get(6)?,
      updated_at:  row.get(7)?,
    })
  }

  pub fn into_toggle(self) -> Result<FeatureToggle> {
    Ok(FeatureToggle {
      id:          decode_uuid(&self.toggle_id)?,
      key:         self.key,
      label:       self.label,
      description: self.description,
      enabled:     self.enabled,
      config:      decode_config(&self.config)?,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

pub struct RawBreakdown {
  pub variant_id:      String,
  pub variant_name:    String,
  pub event_type:      String,
  pub event_count:     i64,
  pub unique_visitors: i64,
}

impl RawBreakdown {
  pub fn into_row(self) -> Result<BreakdownRow> {
    Ok(BreakdownRow {
      variant_id:      decode_uuid(&self.variant_id)?,
      variant_name:    self.variant_name,
      event_type:      self.event_type,
      event_count:     count(self.event_count),
      unique_visitors: count(self.unique_visitors),
    })
  }
}

pub struct RawTotals {
  pub variant_id:     String,
  pub variant_name:   String,
  pub total_events:   i64,
  pub total_visitors: i64,
}

impl RawTotals {
  pub fn into_row(self) -> Result<TotalsRow> {
    Ok(TotalsRow {
      variant_id:     decode_uuid(&self.variant_id)?,
      variant_name:   self.variant_name,
      total_events:   count(self.total_events),
      total_visitors: count(self.total_visitors),
    })
  }
}

pub struct RawTimeline {
  pub variant_id:   String,
  pub variant_name: String,
  pub hour:         String,
  pub event_count:  i64,
}

impl RawTimeline {
  pub fn into_row(self) -> Result<TimelineRow> {
    Ok(TimelineRow {
      variant_id:   decode_uuid(&self.variant_id)?,
      variant_name: self.variant_name,
      hour:         decode_dt(&self.hour)?,
      event_count:  count(self.event_count),
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1500);
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea, "2024-01-01T09:00:00.000000Z");
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn hour_bucket_strings_decode() {
    let hour = decode_dt("2024-03-05T17:00:00Z").unwrap();
    assert_eq!(hour, Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap());
  }

  #[test]
  fn config_roundtrips_nested_values() {
    let raw = r#"{"cta_text":"Try Now","layout":{"columns":2,"dark":true}}"#;
    let config = decode_config(raw).unwrap();
    assert_eq!(config["cta_text"], "Try Now");
    assert_eq!(decode_config(&encode_config(&config).unwrap()).unwrap(), config);
  }

  #[test]
  fn non_object_config_is_rejected() {
    assert!(decode_config("[1,2,3]").is_err());
  }
}
