//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Attribute and measure maps are stored as compact JSON objects with
//! serde-tagged values; surrogate-key maps as JSON objects of integers;
//! timestamps as RFC 3339 strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use starload_core::{
  dimension::{DimensionRow, SurrogateKey},
  load::FactRow,
  value::Value,
};

use crate::Result;

// ─── Maps ────────────────────────────────────────────────────────────────────

pub fn encode_values(map: &BTreeMap<String, Value>) -> Result<String> {
  Ok(serde_json::to_string(map)?)
}

pub fn decode_values(s: &str) -> Result<BTreeMap<String, Value>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_keys(map: &BTreeMap<String, SurrogateKey>) -> Result<String> {
  Ok(serde_json::to_string(map)?)
}

pub fn decode_keys(s: &str) -> Result<BTreeMap<String, SurrogateKey>> {
  Ok(serde_json::from_str(s)?)
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Raw row structs ─────────────────────────────────────────────────────────

/// A `dimension_rows` row as it comes out of SQLite, before decoding.
pub struct RawDimensionRow {
  pub surrogate_key: i64,
  pub business_key:  String,
  pub attributes:    String,
}

impl RawDimensionRow {
  pub fn into_row(self) -> Result<DimensionRow> {
    Ok(DimensionRow {
      surrogate_key: self.surrogate_key,
      business_key:  self.business_key,
      attributes:    decode_values(&self.attributes)?,
    })
  }
}

/// A `fact_rows` row as it comes out of SQLite, before decoding.
pub struct RawFactRow {
  pub keys:     String,
  pub measures: String,
}

impl RawFactRow {
  pub fn into_row(self) -> Result<FactRow> {
    Ok(FactRow {
      keys:     decode_keys(&self.keys)?,
      measures: decode_values(&self.measures)?,
    })
  }
}
