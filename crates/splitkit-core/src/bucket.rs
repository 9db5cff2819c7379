//! Deterministic bucketing of visitors into weighted variants.
//!
//! The bucket for a visitor is a pure function of `(visitor_id,
//! experiment_id, variants)`: no randomness, no clock. Including the
//! experiment id in the hashed key decorrelates a visitor's buckets across
//! experiments.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result, experiment::Variant};

/// Map `visitor_id:experiment_id` onto `[0, 1]` using the leading 32 bits of
/// its SHA-256 digest.
pub fn hash_unit(visitor_id: &str, experiment_id: Uuid) -> f64 {
  let digest = Sha256::new()
    .chain_update(visitor_id.as_bytes())
    .chain_update(b":")
    .chain_update(experiment_id.hyphenated().to_string().as_bytes())
    .finalize();
  let lead = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
  f64::from(lead) / f64::from(u32::MAX)
}

/// Pick the variant for `visitor_id` in `experiment_id`.
///
/// Variants are walked in name order so the caller's ordering never matters.
/// Weights are normalised by their sum; the first variant whose cumulative
/// share exceeds the visitor's hash wins. If rounding leaves the walk short of
/// the hash the last variant is chosen, so every visitor lands somewhere.
pub fn choose<'a>(
  visitor_id: &str,
  experiment_id: Uuid,
  variants: &'a [Variant],
) -> Result<&'a Variant> {
  let mut ordered: Vec<&Variant> = variants.iter().collect();
  ordered.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

  let Some(last) = ordered.last().copied() else {
    return Err(Error::NotFound(format!(
      "no variants configured for experiment {experiment_id}"
    )));
  };

  let total: f64 = ordered.iter().map(|v| v.weight).sum();
  if !(total.is_finite() && total > 0.0) {
    return Err(Error::Misconfigured(format!(
      "variant weights for experiment {experiment_id} sum to {total}"
    )));
  }

  let point = hash_unit(visitor_id, experiment_id);
  let mut cumulative = 0.0;
  for variant in &ordered {
    cumulative += variant.weight / total;
    if point < cumulative {
      return Ok(variant);
    }
  }

  Ok(last)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::experiment::Config;

  fn variant(name: &str, weight: f64) -> Variant {
    Variant {
      id: Uuid::new_v4(),
      experiment_id: Uuid::nil(),
      name: name.into(),
      weight,
      config: Config::new(),
      created_at: Utc::now(),
    }
  }

  fn share_of(name: &str, variants: &[Variant], trials: usize) -> f64 {
    let exp = Uuid::new_v4();
    let hits = (0..trials)
      .filter(|i| {
        choose(&format!("visitor-{i}"), exp, variants).unwrap().name == name
      })
      .count();
    hits as f64 / trials as f64
  }

  #[test]
  fn same_inputs_give_same_variant() {
    let variants = vec![variant("control", 0.5), variant("variant_b", 0.5)];
    let exp = Uuid::new_v4();
    for i in 0..50 {
      let visitor = format!("visitor-{i}");
      let first = choose(&visitor, exp, &variants).unwrap().id;
      let second = choose(&visitor, exp, &variants).unwrap().id;
      assert_eq!(first, second);
    }
  }

  #[test]
  fn input_order_does_not_matter() {
    let variants = vec![
      variant("a", 0.2),
      variant("b", 0.3),
      variant("c", 0.5),
    ];
    let mut reversed = variants.clone();
    reversed.reverse();
    let exp = Uuid::new_v4();
    for i in 0..200 {
      let visitor = format!("v{i}");
      assert_eq!(
        choose(&visitor, exp, &variants).unwrap().id,
        choose(&visitor, exp, &reversed).unwrap().id,
      );
    }
  }

  #[test]
  fn single_variant_always_wins() {
    let only = vec![variant("only_one", 1.0)];
    for i in 0..100 {
      let v = choose(&format!("anyone-{i}"), Uuid::new_v4(), &only).unwrap();
      assert_eq!(v.name, "only_one");
    }
  }

  #[test]
  fn ninety_ten_split_converges() {
    let variants = vec![variant("heavy", 0.9), variant("light", 0.1)];
    let share = share_of("heavy", &variants, 1000);
    assert!((0.80..=0.98).contains(&share), "heavy share {share}");
  }

  #[test]
  fn unnormalised_weights_are_normalised() {
    // 3 : 7 is a 70% share for the second variant.
    let variants = vec![variant("small", 0.3), variant("large", 0.7)];
    let scaled = vec![variant("small", 0.03), variant("large", 0.07)];
    let share = share_of("large", &variants, 2000);
    let scaled_share = share_of("large", &scaled, 2000);
    assert!((0.62..=0.78).contains(&share), "large share {share}");
    assert!((0.62..=0.78).contains(&scaled_share), "scaled share {scaled_share}");
  }

  #[test]
  fn three_equal_variants_all_receive_traffic() {
    let variants = vec![variant("a", 0.3333), variant("b", 0.3333), variant("c", 0.3334)];
    for name in ["a", "b", "c"] {
      let share = share_of(name, &variants, 3000);
      assert!((0.25..=0.42).contains(&share), "{name} share {share}");
    }
  }

  #[test]
  fn experiments_decorrelate_a_visitor() {
    let variants = vec![variant("control", 0.5), variant("variant_b", 0.5)];
    let seen: std::collections::HashSet<Uuid> = (0..50)
      .map(|_| choose("same-visitor", Uuid::new_v4(), &variants).unwrap().id)
      .collect();
    assert_eq!(seen.len(), 2);
  }

  #[test]
  fn zero_weights_are_a_configuration_error() {
    let variants = vec![variant("a", 0.0), variant("b", 0.0)];
    let err = choose("visitor", Uuid::new_v4(), &variants).unwrap_err();
    assert!(matches!(err, Error::Misconfigured(_)));
  }

  #[test]
  fn zero_weight_variant_is_never_chosen() {
    let variants = vec![variant("a", 0.0), variant("b", 1.0)];
    assert_eq!(share_of("a", &variants, 500), 0.0);
  }

  #[test]
  fn no_variants_is_not_found() {
    let err = choose("visitor", Uuid::new_v4(), &[]).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
  }

  #[test]
  fn hash_unit_stays_in_range() {
    let exp = Uuid::new_v4();
    for i in 0..1000 {
      let h = hash_unit(&format!("v{i}"), exp);
      assert!((0.0..=1.0).contains(&h));
    }
  }
}
