//! TOML pipeline description for the `starload` binary.
//!
//! A pipeline file names the SQLite store and a list of dimension and fact
//! feeds, each embedding its core configuration plus a CSV source path and
//! an optional declared column schema. Columns left undeclared are
//! accepted with no type constraint.

use std::path::PathBuf;

use serde::Deserialize;
use starload_core::{
  config::{DimensionConfig, FactConfig},
  ingest::{BatchSchema, FieldDef, FieldType},
};

// ─── Column declarations ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSettings {
  pub name:     String,
  #[serde(rename = "type", default = "default_column_type")]
  pub ty:       FieldType,
  #[serde(default)]
  pub required: bool,
}

fn default_column_type() -> FieldType { FieldType::Any }

/// Build the ingestion schema for a feed from its declared columns and the
/// CSV header. Declared columns must exist in the header; header columns
/// without a declaration are unconstrained.
pub fn declared_schema(
  columns: &[ColumnSettings],
  header: &[String],
) -> anyhow::Result<BatchSchema> {
  for column in columns {
    if !header.iter().any(|h| h == &column.name) {
      anyhow::bail!(
        "declared column '{}' is not in the feed header",
        column.name
      );
    }
  }
  let fields = header
    .iter()
    .map(|name| match columns.iter().find(|c| &c.name == name) {
      Some(column) => {
        let field = FieldDef::new(name, column.ty);
        if column.required { field.required() } else { field }
      }
      None => FieldDef::new(name, FieldType::Any),
    })
    .collect();
  Ok(BatchSchema::new(fields)?)
}

// ─── Feeds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DimensionFeedSettings {
  #[serde(flatten)]
  pub config:  DimensionConfig,
  /// CSV file supplying this dimension's staged records.
  pub source:  PathBuf,
  #[serde(default)]
  pub columns: Vec<ColumnSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactFeedSettings {
  #[serde(flatten)]
  pub config:  FactConfig,
  /// CSV file supplying this fact table's unresolved records.
  pub source:  PathBuf,
  #[serde(default)]
  pub columns: Vec<ColumnSettings>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
  /// Path of the SQLite store file (created if absent).
  pub store_path: PathBuf,
  #[serde(default)]
  pub dimension:  Vec<DimensionFeedSettings>,
  #[serde(default)]
  pub fact:       Vec<FactFeedSettings>,
}
