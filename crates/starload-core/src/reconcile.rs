//! Dimension reconciliation — the Type 1 / Type 2 delta engine.
//!
//! The reconciler never mutates the dimension it is given. It builds a
//! replacement `Dimension` value (double-buffering) which the caller swaps
//! in as a single atomic transition; readers either see the old state or
//! the new one, never an intermediate.
//!
//! Staged records are processed sequentially, so a batch containing two
//! records for the same business key applies the second against the state
//! produced by the first.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::{
  Result,
  config::DimensionConfig,
  dimension::{Dimension, DimensionRow, KeyAllocator, SurrogateKey},
  record::StagedRecord,
  report::{ChangeReport, RowIssueKind, RowIssues},
  value::Value,
};

// ─── Classification ──────────────────────────────────────────────────────────

/// How one staged record relates to the current dimension state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// Business key not present in the dimension.
  New,
  /// Only overwrite-in-place fields differ from the current version.
  Type1Changed,
  /// At least one version-preserving field differs; a new row is due.
  Type2Changed,
  Unchanged,
  /// Missing or blank business key; the record is rejected.
  Malformed,
}

// ─── ReconciliationPlan ──────────────────────────────────────────────────────

/// Transient output of classification: three disjoint sets of staged
/// records plus the rows that needed nothing. Consumed once (by
/// [`ReconciliationPlan::into_report`] or by a dry-run display), then
/// discarded.
#[derive(Debug, Default)]
pub struct ReconciliationPlan {
  pub dimension:          String,
  pub to_insert_new:      Vec<StagedRecord>,
  pub to_insert_version:  Vec<StagedRecord>,
  pub to_update_in_place: Vec<StagedRecord>,
  pub unchanged:          u64,
  pub malformed:          RowIssues,
}

impl ReconciliationPlan {
  fn new(dimension: &str) -> Self {
    Self { dimension: dimension.to_owned(), ..Self::default() }
  }

  pub fn into_report(self) -> ChangeReport {
    ChangeReport {
      dimension:         self.dimension,
      inserted_new:      self.to_insert_new.len() as u64,
      inserted_versions: self.to_insert_version.len() as u64,
      updated_in_place:  self.to_update_in_place.len() as u64,
      unchanged:         self.unchanged,
      malformed:         self.malformed,
    }
  }
}

// ─── Delta ───────────────────────────────────────────────────────────────────

/// The field-by-field difference between one staged record and the current
/// version of its member.
enum Delta {
  Malformed { detail: String },
  New { business_key: String, attributes: BTreeMap<String, Value> },
  Changed {
    business_key: String,
    current_key:  SurrogateKey,
    type1:        BTreeMap<String, Value>,
    type2:        BTreeMap<String, Value>,
  },
  Unchanged,
}

fn diff(
  config: &DimensionConfig,
  dimension: &Dimension,
  record: &StagedRecord,
) -> Delta {
  let Some(business_key) = record.business_key(&config.business_key_field)
  else {
    return Delta::Malformed {
      detail: format!(
        "missing business key field '{}'",
        config.business_key_field
      ),
    };
  };

  let attributes = record.attributes_without(&config.business_key_field);

  let Some(current) = dimension.current(&business_key) else {
    return Delta::New { business_key, attributes };
  };

  // A field absent from the staged record is carried forward, never
  // treated as a change.
  let mut type1 = BTreeMap::new();
  let mut type2 = BTreeMap::new();
  for (field, value) in attributes {
    if current.attributes.get(&field) == Some(&value) {
      continue;
    }
    if config.is_type2_field(&field) {
      type2.insert(field, value);
    } else {
      type1.insert(field, value);
    }
  }

  if type1.is_empty() && type2.is_empty() {
    Delta::Unchanged
  } else {
    Delta::Changed {
      business_key,
      current_key: current.surrogate_key,
      type1,
      type2,
    }
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Folds staged batches into a dimension.
///
/// Owns the dimension's [`KeyAllocator`]; key assignment is serialized by
/// that ownership, which is what upholds the "higher key = later version"
/// invariant when multiple dimensions reconcile in parallel.
pub struct Reconciler {
  config: DimensionConfig,
  keys:   KeyAllocator,
}

impl Reconciler {
  pub fn new(config: DimensionConfig, keys: KeyAllocator) -> Result<Self> {
    config.validate()?;
    Ok(Self { config, keys })
  }

  /// A reconciler whose allocator resumes above the tail of an existing
  /// dimension — the usual way to construct one.
  pub fn resuming(
    config: DimensionConfig,
    dimension: &Dimension,
  ) -> Result<Self> {
    let keys = KeyAllocator::resuming(dimension);
    Self::new(config, keys)
  }

  pub fn config(&self) -> &DimensionConfig { &self.config }

  /// Classify a single staged record against `dimension` without touching
  /// anything.
  pub fn classify(
    &self,
    dimension: &Dimension,
    record: &StagedRecord,
  ) -> Classification {
    match diff(&self.config, dimension, record) {
      Delta::Malformed { .. } => Classification::Malformed,
      Delta::New { .. } => Classification::New,
      Delta::Changed { type2, .. } if !type2.is_empty() => {
        Classification::Type2Changed
      }
      Delta::Changed { .. } => Classification::Type1Changed,
      Delta::Unchanged => Classification::Unchanged,
    }
  }

  /// Dry run: classify the whole batch sequentially and return the plan,
  /// leaving the dimension and the allocator untouched.
  pub fn plan(
    &self,
    current: &Dimension,
    staged: &[StagedRecord],
  ) -> Result<ReconciliationPlan> {
    let mut buffer = current.clone();
    let mut keys = self.keys.clone();
    let mut plan = ReconciliationPlan::new(&self.config.name);
    for (row, record) in staged.iter().enumerate() {
      step(&self.config, &mut buffer, &mut keys, record.clone(), row, &mut plan)?;
    }
    Ok(plan)
  }

  /// Reconcile the dimension with a staged batch.
  ///
  /// Returns the replacement dimension (the caller swaps it in atomically)
  /// and the change report. Fails only on batch-fatal conditions
  /// ([`crate::Error::KeyCollision`]); malformed records are rejected
  /// row-level and the remainder still processes.
  pub fn reconcile(
    &mut self,
    current: &Dimension,
    staged: Vec<StagedRecord>,
  ) -> Result<(Dimension, ChangeReport)> {
    let mut buffer = current.clone();
    let mut plan = ReconciliationPlan::new(&self.config.name);
    for (row, record) in staged.into_iter().enumerate() {
      step(&self.config, &mut buffer, &mut self.keys, record, row, &mut plan)?;
    }

    let report = plan.into_report();
    info!(
      dimension = %report.dimension,
      inserted_new = report.inserted_new,
      inserted_versions = report.inserted_versions,
      updated_in_place = report.updated_in_place,
      unchanged = report.unchanged,
      malformed = report.malformed.total,
      "dimension reconciled"
    );
    Ok((buffer, report))
  }
}

/// Apply one staged record to the working buffer and file it in the plan.
fn step(
  config: &DimensionConfig,
  buffer: &mut Dimension,
  keys: &mut KeyAllocator,
  record: StagedRecord,
  row: usize,
  plan: &mut ReconciliationPlan,
) -> Result<()> {
  match diff(config, buffer, &record) {
    Delta::Malformed { detail } => {
      debug!(row, %detail, "rejecting staged record");
      plan.malformed.record(row, RowIssueKind::MalformedRecord, detail);
    }
    Delta::New { business_key, attributes } => {
      let surrogate_key = keys.allocate();
      debug!(%business_key, surrogate_key, "new member");
      buffer.push(DimensionRow { surrogate_key, business_key, attributes })?;
      plan.to_insert_new.push(record);
    }
    Delta::Changed { business_key, current_key, type1, type2 } => {
      if !type2.is_empty() {
        // The new version carries forward unchanged fields and takes both
        // the Type 2 changes and any simultaneous Type 1 changes. The old
        // row is retained as history, untouched.
        let mut attributes = buffer
          .current(&business_key)
          .map(|r| r.attributes.clone())
          .unwrap_or_default();
        attributes.extend(type2);
        attributes.extend(type1);
        let surrogate_key = keys.allocate();
        debug!(%business_key, surrogate_key, "new type 2 version");
        buffer.push(DimensionRow { surrogate_key, business_key, attributes })?;
        plan.to_insert_version.push(record);
      } else {
        debug!(
          %business_key,
          surrogate_key = current_key,
          fields = type1.len(),
          "type 1 overwrite"
        );
        buffer.overwrite(current_key, &type1)?;
        plan.to_update_in_place.push(record);
      }
    }
    Delta::Unchanged => plan.unchanged += 1,
  }
  Ok(())
}
