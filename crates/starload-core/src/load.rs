//! Fact loading — key substitution into append-only fact rows.
//!
//! The terminal write of a run. Every business-key reference is replaced
//! with a resolved surrogate key; measures pass through unchanged. Fact
//! rows are immutable once loaded — there is no update or delete path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  Error, Result,
  config::FactConfig,
  dimension::SurrogateKey,
  record::FactRecord,
  report::{LoadReport, RowIssueKind, RowIssues},
  resolve::KeyResolver,
  value::Value,
};

// ─── FactRow ─────────────────────────────────────────────────────────────────

/// A fully resolved fact row, ready for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
  /// fk field → resolved surrogate key.
  pub keys:     BTreeMap<String, SurrogateKey>,
  pub measures: BTreeMap<String, Value>,
}

// ─── FactLoader ──────────────────────────────────────────────────────────────

/// Resolves a batch of fact records against reconciled dimensions.
pub struct FactLoader<'a> {
  config:   &'a FactConfig,
  resolver: &'a KeyResolver<'a>,
}

impl<'a> FactLoader<'a> {
  pub fn new(
    config: &'a FactConfig,
    resolver: &'a KeyResolver<'a>,
  ) -> Result<Self> {
    config.validate()?;
    Ok(Self { config, resolver })
  }

  /// Resolve and key-substitute a batch.
  ///
  /// Row-level failures (missing fields, non-numeric measures, unresolved
  /// references under the `fail` policy) reject that row only and are
  /// aggregated into the report. A reference to a dimension the resolver
  /// does not know at all is a configuration error and fatal.
  pub fn load(
    &self,
    records: Vec<FactRecord>,
  ) -> Result<(Vec<FactRow>, LoadReport)> {
    let mut rows = Vec::with_capacity(records.len());
    let mut rejected = RowIssues::default();

    'records: for (row_idx, record) in records.into_iter().enumerate() {
      let mut keys = BTreeMap::new();
      for reference in &self.config.dimension_references {
        let business_key = match record
          .get(&reference.fk_field)
          .and_then(Value::as_key_text)
        {
          Some(key) => key,
          None => {
            rejected.record(
              row_idx,
              RowIssueKind::MalformedRecord,
              format!("missing business key in field '{}'", reference.fk_field),
            );
            continue 'records;
          }
        };

        match self.resolver.resolve(&reference.dimension, &business_key) {
          Ok(surrogate_key) => {
            keys.insert(reference.fk_field.clone(), surrogate_key);
          }
          Err(Error::UnresolvedReference { dimension, business_key }) => {
            debug!(row = row_idx, %dimension, %business_key, "rejecting fact row");
            rejected.record(
              row_idx,
              RowIssueKind::UnresolvedReference,
              format!("no '{dimension}' member with key {business_key:?}"),
            );
            continue 'records;
          }
          Err(fatal) => return Err(fatal),
        }
      }

      let mut measures = BTreeMap::new();
      for field in &self.config.measure_fields {
        match record.get(field) {
          Some(value) if value.is_numeric() => {
            measures.insert(field.clone(), value.clone());
          }
          Some(value) => {
            rejected.record(
              row_idx,
              RowIssueKind::MalformedRecord,
              format!("measure '{field}' is {}, not numeric", value.type_name()),
            );
            continue 'records;
          }
          None => {
            rejected.record(
              row_idx,
              RowIssueKind::MalformedRecord,
              format!("missing measure field '{field}'"),
            );
            continue 'records;
          }
        }
      }

      rows.push(FactRow { keys, measures });
    }

    let report = LoadReport {
      fact:     self.config.name.clone(),
      loaded:   rows.len() as u64,
      rejected,
    };
    info!(
      fact = %report.fact,
      loaded = report.loaded,
      rejected = report.rejected.total,
      "fact batch resolved"
    );
    Ok((rows, report))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::{DimensionConfig, UnknownMemberPolicy},
    dimension::{Dimension, KeyAllocator},
    reconcile::Reconciler,
    record::StagedRecord,
  };

  fn rec(pairs: &[(&str, &str)]) -> BTreeMap<String, Value> {
    pairs
      .iter()
      .map(|(name, raw)| ((*name).to_owned(), Value::coerce(raw)))
      .collect()
  }

  fn product_dimension(config: &DimensionConfig) -> Dimension {
    let mut r =
      Reconciler::new(config.clone(), KeyAllocator::starting_at(1)).unwrap();
    let (dim, _) = r
      .reconcile(
        &Dimension::new("product"),
        vec![
          StagedRecord::new(rec(&[("id", "A"), ("name", "Widget")])),
          StagedRecord::new(rec(&[("id", "B"), ("name", "Sprocket")])),
        ],
      )
      .unwrap();
    dim
  }

  fn sales_config() -> FactConfig {
    FactConfig::new("sales")
      .with_reference("product", "product_id")
      .with_measures(&["qty", "amount"])
  }

  #[test]
  fn keys_are_substituted_and_measures_preserved() {
    let dim_config = DimensionConfig::new("product", "id");
    let dim = product_dimension(&dim_config);
    let mut resolver = KeyResolver::new();
    resolver.add(&dim_config, &dim);

    let config = sales_config();
    let loader = FactLoader::new(&config, &resolver).unwrap();
    let (rows, report) = loader
      .load(vec![FactRecord::new(rec(&[
        ("product_id", "B"),
        ("qty", "3"),
        ("amount", "19.5"),
      ]))])
      .unwrap();

    assert_eq!(report.loaded, 1);
    assert_eq!(rows[0].keys["product_id"], 2);
    assert_eq!(rows[0].measures["qty"], Value::Integer(3));
    assert_eq!(rows[0].measures["amount"], Value::Float(19.5));
  }

  #[test]
  fn unresolved_reference_rejects_only_that_row() {
    let dim_config = DimensionConfig::new("product", "id");
    let dim = product_dimension(&dim_config);
    let mut resolver = KeyResolver::new();
    resolver.add(&dim_config, &dim);

    let config = sales_config();
    let loader = FactLoader::new(&config, &resolver).unwrap();
    let (rows, report) = loader
      .load(vec![
        FactRecord::new(rec(&[("product_id", "Z"), ("qty", "1"), ("amount", "1")])),
        FactRecord::new(rec(&[("product_id", "A"), ("qty", "2"), ("amount", "4")])),
      ])
      .unwrap();

    assert_eq!(report.loaded, 1);
    assert_eq!(report.rejected.total, 1);
    assert_eq!(
      report.rejected.samples[0].kind,
      RowIssueKind::UnresolvedReference
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].keys["product_id"], 1);
  }

  #[test]
  fn placeholder_policy_loads_with_reserved_key() {
    let dim_config = DimensionConfig::new("product", "id")
      .with_unknown_member_policy(UnknownMemberPolicy::Placeholder {
        key: -1,
      });
    let dim = product_dimension(&dim_config);
    let mut resolver = KeyResolver::new();
    resolver.add(&dim_config, &dim);

    let config = sales_config();
    let loader = FactLoader::new(&config, &resolver).unwrap();
    let (rows, report) = loader
      .load(vec![FactRecord::new(rec(&[
        ("product_id", "Z"),
        ("qty", "1"),
        ("amount", "2.5"),
      ]))])
      .unwrap();

    assert_eq!(report.loaded, 1);
    assert!(report.rejected.is_empty());
    assert_eq!(rows[0].keys["product_id"], -1);
  }

  #[test]
  fn bad_measures_reject_the_row() {
    let dim_config = DimensionConfig::new("product", "id");
    let dim = product_dimension(&dim_config);
    let mut resolver = KeyResolver::new();
    resolver.add(&dim_config, &dim);

    let config = sales_config();
    let loader = FactLoader::new(&config, &resolver).unwrap();
    let (rows, report) = loader
      .load(vec![
        // Non-numeric measure.
        FactRecord::new(rec(&[("product_id", "A"), ("qty", "lots"), ("amount", "1")])),
        // Missing measure.
        FactRecord::new(rec(&[("product_id", "A"), ("qty", "1")])),
      ])
      .unwrap();

    assert!(rows.is_empty());
    assert_eq!(report.rejected.total, 2);
    assert!(
      report
        .rejected
        .samples
        .iter()
        .all(|s| s.kind == RowIssueKind::MalformedRecord)
    );
  }

  #[test]
  fn unknown_dimension_reference_is_fatal() {
    let resolver = KeyResolver::new();
    let config = FactConfig::new("sales").with_reference("nope", "x");
    let loader = FactLoader::new(&config, &resolver).unwrap();

    let result =
      loader.load(vec![FactRecord::new(rec(&[("x", "A")]))]);
    assert!(matches!(result, Err(Error::UnknownDimension(_))));
  }
}
