//! Fire-and-forget event tracking.
//!
//! Losing a behavioural event must never degrade the visitor-facing request
//! that produced it, so [`Tracker::track`] returns immediately and any failure
//! is logged rather than surfaced.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
  event::{self, NewEvent},
  store::EventStore,
};

pub struct Tracker<S> {
  store: Arc<S>,
}

impl<S> Clone for Tracker<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S> Tracker<S>
where
  S: EventStore + 'static,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Queue `input` for ingestion on the runtime. The returned handle only
  /// exists so callers (and tests) can wait for the attempt; it never yields
  /// an error.
  pub fn track(&self, input: NewEvent) -> JoinHandle<()> {
    let store = Arc::clone(&self.store);
    tokio::spawn(async move {
      let visitor_id = input.visitor_id.clone();
      let event_type = input.event_type.clone();
      if let Err(e) = event::ingest(store.as_ref(), input).await {
        tracing::warn!(%visitor_id, %event_type, error = %e, "dropping tracked event");
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fake::FakeStore;

  #[tokio::test]
  async fn tracked_event_is_stored() {
    let store = Arc::new(FakeStore::default());
    let tracker = Tracker::new(Arc::clone(&store));
    tracker.track(NewEvent::new("visitor", "page_view")).await.unwrap();
    assert_eq!(store.event_count(), 1);
  }

  #[tokio::test]
  async fn invalid_event_is_absorbed() {
    let store = Arc::new(FakeStore::default());
    let tracker = Tracker::new(Arc::clone(&store));
    tracker.track(NewEvent::new("visitor", "Page View 2")).await.unwrap();
    assert_eq!(store.event_count(), 0);
  }

  #[tokio::test]
  async fn store_failure_is_absorbed() {
    let store = Arc::new(FakeStore::default());
    store.fail_events();
    let tracker = Tracker::new(Arc::clone(&store));
    tracker.track(NewEvent::new("visitor", "cta_click")).await.unwrap();
    assert_eq!(store.event_count(), 0);
  }
}
