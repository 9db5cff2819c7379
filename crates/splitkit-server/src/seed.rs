//! Demo data for a fresh store: the landing-page hero experiment and the
//! toggles the page reads.
//!
//! Seeding is idempotent. Rows that already exist are left untouched.

use serde_json::{Value, json};
use splitkit_core::{
  ClassifyError, ErrorKind,
  experiment::{Config, NewExperiment, NewVariant},
  registry,
  store::SplitStore,
  toggle::{self, NewToggle},
};

pub const DEMO_EXPERIMENT: &str = "homepage_hero";

/// Insert the demo experiment, its variants and the demo toggles.
pub async fn seed_demo<S: SplitStore>(store: &S) -> Result<(), S::Error> {
  let created = skip_existing(
    registry::create_experiment(store, NewExperiment {
      description: Some("Hero headline and call-to-action copy".into()),
      ..NewExperiment::new(DEMO_EXPERIMENT)
    })
    .await,
  )?;
  let experiment = match created {
    Some(e) => e,
    None => match store.find_experiment_by_name(DEMO_EXPERIMENT.into()).await? {
      Some(e) => e,
      // Renamed between the conflict and the lookup; nothing to attach to.
      None => return Ok(()),
    },
  };

  let variants = [
    ("control", json!({
      "hero_title": "Grow Your Audience",
      "hero_subtitle": "The all-in-one platform to reach, engage, and convert your visitors into loyal customers.",
      "cta_text": "Get Started",
      "layout": "default",
    })),
    ("variant_b", json!({
      "hero_title": "Turn Visitors Into Customers",
      "hero_subtitle": "Launch experiments in minutes and let the data pick the winner.",
      "cta_text": "Start Free Trial",
      "layout": "centered",
    })),
  ];
  for (name, config) in variants {
    skip_existing(
      registry::add_variant(store, experiment.id, NewVariant {
        config: object(config),
        ..NewVariant::new(name, 0.5)
      })
      .await,
    )?;
  }

  let toggles = [
    ("show_banner", "Promo banner", false, json!({
      "banner_text": "Limited offer: 20% off annual plans",
      "banner_color": "indigo",
    })),
    ("show_testimonials", "Testimonials section", true, json!({})),
    ("cta_text_override", "CTA text override", false, json!({ "text": "Try It Free" })),
  ];
  for (key, label, enabled, config) in toggles {
    skip_existing(
      toggle::create(store, NewToggle {
        enabled,
        config: object(config),
        ..NewToggle::new(key, label)
      })
      .await,
    )?;
  }

  tracing::info!(experiment = DEMO_EXPERIMENT, "demo data seeded");
  Ok(())
}

/// Treat a conflict as "already seeded".
fn skip_existing<T, E: ClassifyError>(result: Result<T, E>) -> Result<Option<T>, E> {
  match result {
    Ok(v) => Ok(Some(v)),
    Err(e) if e.kind() == ErrorKind::Conflict => Ok(None),
    Err(e) => Err(e),
  }
}

fn object(value: Value) -> Config {
  match value {
    Value::Object(map) => map,
    _ => Config::new(),
  }
}

#[cfg(test)]
mod tests {
  use splitkit_core::{
    assignment,
    store::{ExperimentStore, ToggleStore},
  };
  use splitkit_store_sqlite::SqliteStore;

  use super::*;

  #[tokio::test]
  async fn seeding_twice_is_harmless() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    seed_demo(&store).await.unwrap();
    seed_demo(&store).await.unwrap();

    let experiments = store.list_experiments().await.unwrap();
    assert_eq!(experiments.len(), 1);
    let variants = store.list_variants(experiments[0].id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(store.list_toggles().await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn seeded_experiment_assigns() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    seed_demo(&store).await.unwrap();
    let outcome = assignment::assign(&store, DEMO_EXPERIMENT, "visitor-1").await.unwrap();
    let variant = outcome.variant().unwrap();
    assert!(variant.config.contains_key("hero_title"));
  }
}
