//! Staging ingestion — pull raw batches from a source, validate row shape,
//! produce staged records.
//!
//! Ingestion is the only I/O-bound stage and the only place where storage
//! failures are retried. Each pull is timeout-bounded; on timeout or
//! exhausted retries the partially ingested batch is discarded entirely —
//! ingestion is all-or-nothing per batch. Validation is row-level and
//! never aborts the batch: rejected rows are counted and sampled.

use std::{future::Future, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::{
  Error, Result,
  record::StagedRecord,
  report::{IngestReport, RowIssueKind},
  value::Value,
};

// ─── Declared schema ─────────────────────────────────────────────────────────

/// Declared type of a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
  Text,
  Integer,
  Float,
  Bool,
  /// No type constraint. Used for feeds that declare column names only.
  Any,
}

impl FieldType {
  /// Null always passes the type check; required-ness is checked
  /// separately. An integer is accepted where a float is declared.
  pub fn accepts(self, value: &Value) -> bool {
    match (self, value) {
      (_, Value::Null) | (Self::Any, _) => true,
      (Self::Text, Value::Text(_)) => true,
      (Self::Integer, Value::Integer(_)) => true,
      (Self::Float, Value::Float(_) | Value::Integer(_)) => true,
      (Self::Bool, Value::Bool(_)) => true,
      _ => false,
    }
  }
}

/// One declared source column.
#[derive(Debug, Clone)]
pub struct FieldDef {
  pub name:     String,
  pub ty:       FieldType,
  pub required: bool,
}

impl FieldDef {
  pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
    Self { name: name.into(), ty, required: false }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }
}

/// The declared shape of a source feed: ordered columns with types.
#[derive(Debug, Clone)]
pub struct BatchSchema {
  fields: Vec<FieldDef>,
}

impl BatchSchema {
  pub fn new(fields: Vec<FieldDef>) -> Result<Self> {
    if fields.is_empty() {
      return Err(Error::MalformedRecord {
        reason: "feed schema declares no columns".into(),
      });
    }
    for (i, field) in fields.iter().enumerate() {
      if fields[..i].iter().any(|f| f.name == field.name) {
        return Err(Error::MalformedRecord {
          reason: format!("feed schema repeats column '{}'", field.name),
        });
      }
    }
    Ok(Self { fields })
  }

  pub fn fields(&self) -> &[FieldDef] { &self.fields }

  /// Check arity, types, and required columns; on success bind the row's
  /// cells to their column names.
  pub fn validate_row(
    &self,
    row: &[Value],
  ) -> std::result::Result<StagedRecord, String> {
    if row.len() != self.fields.len() {
      return Err(format!(
        "expected {} columns, got {}",
        self.fields.len(),
        row.len()
      ));
    }
    for (field, value) in self.fields.iter().zip(row) {
      if field.required && value.is_null() {
        return Err(format!("required column '{}' is null", field.name));
      }
      if !field.ty.accepts(value) {
        return Err(format!(
          "column '{}' expects {:?}, got {}",
          field.name,
          field.ty,
          value.type_name()
        ));
      }
    }
    Ok(StagedRecord::new(
      self
        .fields
        .iter()
        .map(|f| f.name.clone())
        .zip(row.iter().cloned())
        .collect(),
    ))
  }
}

// ─── RowSource ───────────────────────────────────────────────────────────────

/// One raw source row, positionally matching the declared schema.
pub type RawRow = Vec<Value>;

/// A pull-based, lazy supplier of raw row batches — flat files, object
/// storage listings, whatever the collaborator wraps. The core never
/// pushes; it pulls until `Ok(None)`.
pub trait RowSource: Send {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Pull the next batch of raw rows. `Ok(None)` means exhausted.
  fn next_batch(
    &mut self,
  ) -> impl Future<Output = std::result::Result<Option<Vec<RawRow>>, Self::Error>>
  + Send
  + '_;
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

/// Retry and timeout bounds for source pulls.
#[derive(Debug, Clone)]
pub struct IngestOptions {
  /// Upper bound on a single `next_batch` call.
  pub pull_timeout:    Duration,
  /// How many times a failed pull is retried before the batch is abandoned.
  pub retry_limit:     u32,
  /// First retry delay; doubles per attempt.
  pub initial_backoff: Duration,
}

impl Default for IngestOptions {
  fn default() -> Self {
    Self {
      pull_timeout:    Duration::from_secs(30),
      retry_limit:     3,
      initial_backoff: Duration::from_millis(100),
    }
  }
}

/// Reads an external feed into staged records.
pub struct Ingestor {
  schema:  BatchSchema,
  options: IngestOptions,
}

impl Ingestor {
  pub fn new(schema: BatchSchema) -> Self {
    Self { schema, options: IngestOptions::default() }
  }

  pub fn with_options(schema: BatchSchema, options: IngestOptions) -> Self {
    Self { schema, options }
  }

  pub fn schema(&self) -> &BatchSchema { &self.schema }

  /// Drain `source` into staged records.
  ///
  /// Returning `Err` drops everything ingested so far — a batch is either
  /// ingested whole or not at all. `Ok` carries the staged records plus
  /// the acceptance/rejection report.
  pub async fn ingest<S: RowSource>(
    &self,
    source: &mut S,
  ) -> Result<(Vec<StagedRecord>, IngestReport)> {
    let mut staged = Vec::new();
    let mut report = IngestReport::default();
    let mut row_idx = 0usize;

    while let Some(rows) = self.pull(source).await? {
      for row in rows {
        match self.schema.validate_row(&row) {
          Ok(record) => {
            staged.push(record);
            report.accepted += 1;
          }
          Err(detail) => {
            warn!(row = row_idx, %detail, "rejecting source row");
            report
              .rejected
              .record(row_idx, RowIssueKind::MalformedRecord, detail);
          }
        }
        row_idx += 1;
      }
    }

    Ok((staged, report))
  }

  /// One timeout-bounded pull with bounded exponential-backoff retries.
  async fn pull<S: RowSource>(
    &self,
    source: &mut S,
  ) -> Result<Option<Vec<RawRow>>> {
    let mut backoff = self.options.initial_backoff;
    let mut attempts = 0u32;
    loop {
      match timeout(self.options.pull_timeout, source.next_batch()).await {
        Err(_) => {
          return Err(Error::IngestAborted {
            reason: format!(
              "source pull exceeded {:?}",
              self.options.pull_timeout
            ),
          });
        }
        Ok(Ok(batch)) => return Ok(batch),
        Ok(Err(e)) => {
          attempts += 1;
          if attempts > self.options.retry_limit {
            return Err(Error::StorageUnavailable { reason: e.to_string() });
          }
          warn!(attempt = attempts, error = %e, "source pull failed, backing off");
          sleep(backoff).await;
          backoff *= 2;
        }
      }
    }
  }
}
