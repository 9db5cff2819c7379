//! Core types, algorithms and trait definitions for the splitkit experiment
//! service.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! bucketing algorithm, the assignment protocol and all input validation live
//! here; storage backends implement the traits in [`store`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod assignment;
pub mod bucket;
pub mod error;
pub mod event;
pub mod experiment;
pub mod registry;
pub mod stats;
pub mod store;
pub mod toggle;
pub mod track;

#[cfg(test)]
mod fake;

pub use error::{ClassifyError, Error, ErrorKind, Result};
