//! Per-batch reports — counts plus bounded samples of row-level problems.
//!
//! Row-level failures never abort a batch; they are counted and sampled
//! here so a run can report "loaded 9 950, rejected 50" with enough detail
//! to debug the first few rejects.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ─── Row issues ──────────────────────────────────────────────────────────────

/// Why a single row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
  /// Missing or invalid required field (business key, measure, arity).
  MalformedRecord,
  /// Fact referenced a business key absent from its dimension under the
  /// `fail` policy.
  UnresolvedReference,
}

/// One rejected row, identified by its zero-based position in the batch.
#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
  pub row:    usize,
  pub kind:   RowIssueKind,
  pub detail: String,
}

/// A bounded collection of row issues: full count, first few samples.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowIssues {
  pub total:   u64,
  pub samples: Vec<RowIssue>,
}

impl RowIssues {
  /// How many samples are retained per batch; the count is always exact.
  pub const MAX_SAMPLES: usize = 16;

  pub fn record(&mut self, row: usize, kind: RowIssueKind, detail: String) {
    self.total += 1;
    if self.samples.len() < Self::MAX_SAMPLES {
      self.samples.push(RowIssue { row, kind, detail });
    }
  }

  pub fn is_empty(&self) -> bool { self.total == 0 }
}

// ─── Stage reports ───────────────────────────────────────────────────────────

/// Outcome of ingesting one source feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
  pub accepted: u64,
  pub rejected: RowIssues,
}

/// Outcome of reconciling one dimension with one staged batch.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
  pub dimension:         String,
  /// Staged records with a previously unseen business key.
  pub inserted_new:      u64,
  /// New Type 2 versions appended for existing members.
  pub inserted_versions: u64,
  /// Type 1 overwrites applied to current rows.
  pub updated_in_place:  u64,
  pub unchanged:         u64,
  pub malformed:         RowIssues,
}

impl ChangeReport {
  /// Whether the batch left the dimension exactly as it found it.
  pub fn is_noop(&self) -> bool {
    self.inserted_new == 0
      && self.inserted_versions == 0
      && self.updated_in_place == 0
  }
}

/// Outcome of loading one fact batch.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
  pub fact:     String,
  pub loaded:   u64,
  pub rejected: RowIssues,
}

// ─── Run report ──────────────────────────────────────────────────────────────

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub dimensions:  Vec<ChangeReport>,
  pub facts:       Vec<LoadReport>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn samples_are_bounded_but_count_is_exact() {
    let mut issues = RowIssues::default();
    for row in 0..100 {
      issues.record(row, RowIssueKind::MalformedRecord, "missing key".into());
    }
    assert_eq!(issues.total, 100);
    assert_eq!(issues.samples.len(), RowIssues::MAX_SAMPLES);
    assert_eq!(issues.samples[0].row, 0);
  }
}
