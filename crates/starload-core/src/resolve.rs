//! Surrogate-key resolution — "latest version wins".
//!
//! Current = the row with the maximum surrogate key among all rows sharing
//! a business key, which the reconciler's monotonic allocation makes
//! equivalent to most-recently-inserted. Lookup failure is always
//! explicit: either an error or the configured placeholder key, never a
//! silent null.

use std::collections::HashMap;

use crate::{
  Error, Result,
  config::{DimensionConfig, UnknownMemberPolicy},
  dimension::{Dimension, SurrogateKey},
};

// ─── KeyResolver ─────────────────────────────────────────────────────────────

struct Entry<'a> {
  dimension: &'a Dimension,
  policy:    UnknownMemberPolicy,
}

/// Resolves business keys against a set of reconciled dimensions.
///
/// Built after every relevant dimension has been reconciled — the barrier
/// between the reconcile phase and the fact-load phase.
#[derive(Default)]
pub struct KeyResolver<'a> {
  entries: HashMap<String, Entry<'a>>,
}

impl<'a> KeyResolver<'a> {
  pub fn new() -> Self { Self::default() }

  pub fn add(&mut self, config: &DimensionConfig, dimension: &'a Dimension) {
    self.entries.insert(config.name.clone(), Entry {
      dimension,
      policy: config.unknown_member_policy,
    });
  }

  /// The surrogate key of the current version of `business_key` in
  /// `dimension`.
  ///
  /// An unknown dimension name is a configuration-level error and always
  /// fatal. An unknown member follows the dimension's policy: `fail`
  /// returns [`Error::UnresolvedReference`]; `placeholder` returns the
  /// reserved key.
  pub fn resolve(
    &self,
    dimension: &str,
    business_key: &str,
  ) -> Result<SurrogateKey> {
    let entry = self
      .entries
      .get(dimension)
      .ok_or_else(|| Error::UnknownDimension(dimension.to_owned()))?;

    if let Some(row) = entry.dimension.current(business_key) {
      return Ok(row.surrogate_key);
    }

    match entry.policy {
      UnknownMemberPolicy::Placeholder { key } => Ok(key),
      UnknownMemberPolicy::Fail => Err(Error::UnresolvedReference {
        dimension:    dimension.to_owned(),
        business_key: business_key.to_owned(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dimension::KeyAllocator, reconcile::Reconciler, record::StagedRecord,
    value::Value,
  };

  fn rec(pairs: &[(&str, &str)]) -> StagedRecord {
    StagedRecord::new(
      pairs
        .iter()
        .map(|(name, raw)| ((*name).to_owned(), Value::coerce(raw)))
        .collect(),
    )
  }

  #[test]
  fn resolve_round_trips_a_fresh_insert() {
    let config = DimensionConfig::new("product", "id");
    let mut r =
      Reconciler::new(config.clone(), KeyAllocator::starting_at(1)).unwrap();
    let (dim, _) = r
      .reconcile(
        &Dimension::new("product"),
        vec![rec(&[("id", "A"), ("name", "Widget")])],
      )
      .unwrap();

    let expected = dim.current("A").unwrap().surrogate_key;
    let mut resolver = KeyResolver::new();
    resolver.add(&config, &dim);
    assert_eq!(resolver.resolve("product", "A").unwrap(), expected);
  }

  #[test]
  fn resolve_returns_latest_version() {
    let config = DimensionConfig::new("product", "id")
      .with_type2_fields(&["addr"]);
    let mut r =
      Reconciler::new(config.clone(), KeyAllocator::starting_at(1)).unwrap();
    let (dim, _) = r
      .reconcile(
        &Dimension::new("product"),
        vec![
          rec(&[("id", "A"), ("addr", "1 Main St")]),
          rec(&[("id", "A"), ("addr", "2 Oak St")]),
        ],
      )
      .unwrap();

    let mut resolver = KeyResolver::new();
    resolver.add(&config, &dim);
    assert_eq!(resolver.resolve("product", "A").unwrap(), 2);
  }

  #[test]
  fn unknown_member_follows_policy() {
    let failing = DimensionConfig::new("product", "id");
    let placeholding = DimensionConfig::new("customer", "id")
      .with_unknown_member_policy(UnknownMemberPolicy::Placeholder {
        key: -1,
      });
    let product = Dimension::new("product");
    let customer = Dimension::new("customer");

    let mut resolver = KeyResolver::new();
    resolver.add(&failing, &product);
    resolver.add(&placeholding, &customer);

    assert!(matches!(
      resolver.resolve("product", "Z"),
      Err(Error::UnresolvedReference { .. })
    ));
    assert_eq!(resolver.resolve("customer", "Z").unwrap(), -1);
  }

  #[test]
  fn unknown_dimension_is_fatal() {
    let resolver = KeyResolver::new();
    assert!(matches!(
      resolver.resolve("nope", "A"),
      Err(Error::UnknownDimension(_))
    ));
  }
}
