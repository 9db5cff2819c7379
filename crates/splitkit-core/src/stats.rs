//! Read-side aggregation of the event log into per-variant statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::EventStore;

/// Trailing window, in hours, covered by [`ExperimentStats::timeline`].
pub const TIMELINE_WINDOW_HOURS: i64 = 24;

pub const PAGE_VIEW: &str = "page_view";
pub const CTA_CLICK: &str = "cta_click";

/// Counts for one `(variant, event_type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownRow {
  pub variant_id:      Uuid,
  pub variant_name:    String,
  pub event_type:      String,
  pub event_count:     u64,
  pub unique_visitors: u64,
}

/// Counts for one variant across all event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsRow {
  pub variant_id:     Uuid,
  pub variant_name:   String,
  pub total_events:   u64,
  pub total_visitors: u64,
}

/// Events for one variant within one clock hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineRow {
  pub variant_id:   Uuid,
  pub variant_name: String,
  /// Start of the hour, UTC.
  pub hour:         DateTime<Utc>,
  pub event_count:  u64,
}

/// Breakdown and totals are ordered by variant name (then event type);
/// the timeline by hour, then variant name. An experiment with no events
/// yields three empty collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentStats {
  pub breakdown: Vec<BreakdownRow>,
  pub totals:    Vec<TotalsRow>,
  pub timeline:  Vec<TimelineRow>,
}

/// Compute stats for `experiment_id` with the timeline ending at `now`.
pub async fn experiment_stats<S: EventStore>(
  store: &S,
  experiment_id: Uuid,
  now: DateTime<Utc>,
) -> Result<ExperimentStats, S::Error> {
  let stats = store
    .experiment_stats(experiment_id, now - TimeDelta::hours(TIMELINE_WINDOW_HOURS))
    .await?;
  tracing::debug!(
    %experiment_id,
    breakdown_count = stats.breakdown.len(),
    totals_count = stats.totals.len(),
    "stats retrieved"
  );
  Ok(stats)
}

// ─── Conversion ──────────────────────────────────────────────────────────────

/// Share of page-viewing visitors who clicked the call to action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRate {
  pub variant_id:         Uuid,
  pub variant_name:       String,
  pub page_view_visitors: u64,
  pub cta_click_visitors: u64,
  /// `None` when no visitor viewed the page under this variant.
  pub rate:               Option<f64>,
}

/// Derive per-variant conversion from a stats breakdown, ordered by variant
/// name.
pub fn conversion_rates(breakdown: &[BreakdownRow]) -> Vec<ConversionRate> {
  let mut by_variant: BTreeMap<(&str, Uuid), (u64, u64)> = BTreeMap::new();
  for row in breakdown {
    let entry = by_variant
      .entry((row.variant_name.as_str(), row.variant_id))
      .or_default();
    match row.event_type.as_str() {
      PAGE_VIEW => entry.0 += row.unique_visitors,
      CTA_CLICK => entry.1 += row.unique_visitors,
      _ => {}
    }
  }

  by_variant
    .into_iter()
    .map(|((name, id), (views, clicks))| ConversionRate {
      variant_id:         id,
      variant_name:       name.to_owned(),
      page_view_visitors: views,
      cta_click_visitors: clicks,
      rate:               (views > 0).then(|| clicks as f64 / views as f64),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(variant: &str, id: Uuid, event_type: &str, visitors: u64) -> BreakdownRow {
    BreakdownRow {
      variant_id:      id,
      variant_name:    variant.into(),
      event_type:      event_type.into(),
      event_count:     visitors * 2,
      unique_visitors: visitors,
    }
  }

  #[test]
  fn conversion_divides_clicks_by_views() {
    let control = Uuid::new_v4();
    let rates = conversion_rates(&[
      row("control", control, PAGE_VIEW, 40),
      row("control", control, CTA_CLICK, 10),
      row("control", control, "scroll_depth", 30),
    ]);
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].page_view_visitors, 40);
    assert_eq!(rates[0].cta_click_visitors, 10);
    assert_eq!(rates[0].rate, Some(0.25));
  }

  #[test]
  fn zero_views_yields_no_rate() {
    let b = Uuid::new_v4();
    let rates = conversion_rates(&[row("variant_b", b, CTA_CLICK, 3)]);
    assert_eq!(rates[0].rate, None);
  }

  #[test]
  fn variants_are_ordered_by_name() {
    let rates = conversion_rates(&[
      row("variant_b", Uuid::new_v4(), PAGE_VIEW, 1),
      row("control", Uuid::new_v4(), PAGE_VIEW, 1),
    ]);
    let names: Vec<_> = rates.iter().map(|r| r.variant_name.as_str()).collect();
    assert_eq!(names, ["control", "variant_b"]);
  }

  #[test]
  fn empty_breakdown_is_empty() {
    assert!(conversion_rates(&[]).is_empty());
  }
}
