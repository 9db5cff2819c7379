//! JSON REST API for splitkit.
//!
//! Exposes an axum [`Router`] backed by any [`splitkit_core::store::SplitStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", splitkit_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod events;
pub mod experiments;
pub mod toggles;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use splitkit_core::{store::SplitStore, track::Tracker};

pub use error::ApiError;

/// Shared state threaded through all API handlers.
pub struct ApiState<S> {
  pub store:   Arc<S>,
  pub tracker: Tracker<S>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), tracker: self.tracker.clone() }
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: SplitStore + 'static,
{
  let state = ApiState { tracker: Tracker::new(Arc::clone(&store)), store };

  Router::new()
    // Experiments
    .route(
      "/experiments",
      get(experiments::list::<S>).post(experiments::create::<S>),
    )
    .route("/experiments/assign", get(experiments::assign::<S>))
    .route(
      "/experiments/{id}",
      get(experiments::get_one::<S>).put(experiments::update::<S>),
    )
    .route("/experiments/{id}/variants", post(experiments::add_variant::<S>))
    .route(
      "/experiments/{id}/variants/{variant_id}",
      put(experiments::update_variant::<S>),
    )
    // Events
    .route("/events", get(events::list::<S>).post(events::create::<S>))
    .route("/events/stats", get(events::stats::<S>))
    .route("/events/conversion", get(events::conversion::<S>))
    .route("/events/beacon", post(events::beacon::<S>))
    // Toggles
    .route("/toggles", get(toggles::list::<S>).post(toggles::create::<S>))
    .route("/toggles/{key}", get(toggles::get_one::<S>).put(toggles::update::<S>))
    .with_state(state)
}
