//! Record envelopes — the thin inputs to reconciliation and fact loading.
//!
//! A record holds only a column → value map. All meaning (which column is
//! the business key, which are measures) lives in the per-dimension and
//! per-fact configuration, not in the record itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

// ─── StagedRecord ────────────────────────────────────────────────────────────

/// A raw source row bound for a dimension. Produced by ingestion, consumed
/// and discarded by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
  pub fields: BTreeMap<String, Value>,
}

impl StagedRecord {
  pub fn new(fields: BTreeMap<String, Value>) -> Self { Self { fields } }

  pub fn get(&self, field: &str) -> Option<&Value> { self.fields.get(field) }

  /// Canonical business-key text for this record, or `None` if the field
  /// is absent, null, or blank.
  pub fn business_key(&self, field: &str) -> Option<String> {
    self.fields.get(field).and_then(Value::as_key_text)
  }

  /// The record's fields minus the business-key column — the attribute set
  /// that ends up on a dimension row.
  pub fn attributes_without(&self, key_field: &str) -> BTreeMap<String, Value> {
    self
      .fields
      .iter()
      .filter(|(name, _)| name.as_str() != key_field)
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect()
  }
}

// ─── FactRecord ──────────────────────────────────────────────────────────────

/// A raw source row bound for a fact table: dimension business keys plus
/// numeric measures, still unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
  pub fields: BTreeMap<String, Value>,
}

impl FactRecord {
  pub fn new(fields: BTreeMap<String, Value>) -> Self { Self { fields } }

  pub fn get(&self, field: &str) -> Option<&Value> { self.fields.get(field) }
}

impl From<StagedRecord> for FactRecord {
  /// Ingestion produces [`StagedRecord`]s regardless of destination; fact
  /// feeds re-wrap them without copying.
  fn from(staged: StagedRecord) -> Self { Self { fields: staged.fields } }
}
