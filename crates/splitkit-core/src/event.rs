//! Behavioural events: append-only records of what a visitor did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::{optional_text, required_text},
  experiment::Config,
  store::EventStore,
};

pub const VISITOR_ID_MAX_LEN: usize = 255;
pub const EVENT_TYPE_MAX_LEN: usize = 100;
pub const PAGE_URL_MAX_LEN: usize = 2048;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub id:            Uuid,
  pub visitor_id:    String,
  /// Untargeted events (e.g. a plain page view) carry no linkage.
  pub experiment_id: Option<Uuid>,
  pub variant_id:    Option<Uuid>,
  pub event_type:    String,
  pub event_data:    Config,
  pub page_url:      Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`EventStore::record_event`]. `created_at` is set by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub visitor_id:    String,
  pub event_type:    String,
  pub experiment_id: Option<Uuid>,
  pub variant_id:    Option<Uuid>,
  pub event_data:    Config,
  pub page_url:      Option<String>,
}

impl NewEvent {
  /// An event with only the two required fields set.
  pub fn new(visitor_id: impl Into<String>, event_type: impl Into<String>) -> Self {
    Self {
      visitor_id:    visitor_id.into(),
      event_type:    event_type.into(),
      experiment_id: None,
      variant_id:    None,
      event_data:    Config::new(),
      page_url:      None,
    }
  }

  pub fn validated(self) -> Result<Self> {
    let visitor_id = required_text("visitor_id", &self.visitor_id, VISITOR_ID_MAX_LEN)?;
    let event_type = required_text("event_type", &self.event_type, EVENT_TYPE_MAX_LEN)?;
    validate_event_type(&event_type)?;
    optional_text("page_url", self.page_url.as_deref(), PAGE_URL_MAX_LEN)?;
    Ok(Self { visitor_id, event_type, ..self })
  }
}

/// Event types are lowercase ASCII letters and underscores only.
pub fn validate_event_type(event_type: &str) -> Result<()> {
  if !event_type.is_empty()
    && event_type.chars().all(|c| c.is_ascii_lowercase() || c == '_')
  {
    Ok(())
  } else {
    Err(Error::InvalidInput(format!(
      "event_type {event_type:?} must contain only lowercase letters and underscores"
    )))
  }
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Filters and paging for [`EventStore::list_events`].
#[derive(Debug, Clone)]
pub struct EventFilter {
  pub experiment_id: Option<Uuid>,
  pub visitor_id:    Option<String>,
  pub event_type:    Option<String>,
  pub limit:         usize,
  pub offset:        usize,
}

impl Default for EventFilter {
  fn default() -> Self {
    Self {
      experiment_id: None,
      visitor_id:    None,
      event_type:    None,
      limit:         DEFAULT_PAGE_SIZE,
      offset:        0,
    }
  }
}

impl EventFilter {
  pub fn validated(self) -> Result<Self> {
    if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
      return Err(Error::InvalidInput(format!(
        "limit must be between 1 and {MAX_PAGE_SIZE}"
      )));
    }
    optional_text("visitor_id", self.visitor_id.as_deref(), VISITOR_ID_MAX_LEN)?;
    if let Some(t) = &self.event_type {
      validate_event_type(t)?;
    }
    Ok(self)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub limit:    usize,
  pub offset:   usize,
  /// Number of events matching the filter, ignoring paging.
  pub total:    u64,
  pub has_more: bool,
}

impl Pagination {
  pub fn new(limit: usize, offset: usize, returned: usize, total: u64) -> Self {
    Self { limit, offset, total, has_more: ((offset + returned) as u64) < total }
  }
}

/// One page of events, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPage {
  pub events:     Vec<Event>,
  pub pagination: Pagination,
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Validate and durably append an event.
pub async fn ingest<S: EventStore>(store: &S, input: NewEvent) -> Result<Event, S::Error> {
  let input = input.validated()?;
  let event = store.record_event(input).await?;
  tracing::debug!(
    visitor_id = %event.visitor_id,
    event_type = %event.event_type,
    experiment_id = ?event.experiment_id,
    variant_id = ?event.variant_id,
    "event tracked"
  );
  Ok(event)
}

pub async fn list<S: EventStore>(store: &S, filter: EventFilter) -> Result<EventPage, S::Error> {
  let filter = filter.validated()?;
  let page = store.list_events(filter).await?;
  tracing::debug!(
    count = page.events.len(),
    total = page.pagination.total,
    "events listed"
  );
  Ok(page)
}
