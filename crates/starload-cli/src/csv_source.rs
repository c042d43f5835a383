//! CSV-backed [`RowSource`] for file feeds.

use std::path::Path;

use anyhow::Context as _;
use starload_core::{
  ingest::{RawRow, RowSource},
  value::Value,
};

/// A row source over one CSV file with a header row.
///
/// The file is read up front; batches are then served without further
/// I/O, so this source never fails mid-ingestion. Cells are coerced to
/// the most specific scalar they parse as — shape enforcement is the
/// ingestor's job, against the declared schema.
pub struct CsvFileSource {
  header:     Vec<String>,
  rows:       Vec<RawRow>,
  cursor:     usize,
  batch_size: usize,
}

impl CsvFileSource {
  pub const DEFAULT_BATCH_SIZE: usize = 1024;

  pub fn open(path: &Path) -> anyhow::Result<Self> {
    // `flexible` lets short/long rows through so the ingestor can reject
    // them row-level instead of the whole file failing to parse.
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .flexible(true)
      .from_path(path)
      .with_context(|| format!("failed to open CSV feed {path:?}"))?;

    let header = reader
      .headers()
      .with_context(|| format!("CSV feed {path:?} has no header row"))?
      .iter()
      .map(str::to_owned)
      .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
      let record = record
        .with_context(|| format!("failed to read CSV row in {path:?}"))?;
      rows.push(record.iter().map(Value::coerce).collect());
    }

    Ok(Self {
      header,
      rows,
      cursor: 0,
      batch_size: Self::DEFAULT_BATCH_SIZE,
    })
  }

  pub fn header(&self) -> &[String] { &self.header }
}

impl RowSource for CsvFileSource {
  type Error = std::convert::Infallible;

  async fn next_batch(
    &mut self,
  ) -> Result<Option<Vec<RawRow>>, std::convert::Infallible> {
    if self.cursor >= self.rows.len() {
      return Ok(None);
    }
    let end = (self.cursor + self.batch_size).min(self.rows.len());
    let batch = self.rows[self.cursor..end].to_vec();
    self.cursor = end;
    Ok(Some(batch))
  }
}
