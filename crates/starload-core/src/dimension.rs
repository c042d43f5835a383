//! Dimension state — versioned member rows and surrogate-key allocation.
//!
//! Rows are immutable once written, with one sanctioned exception: a
//! Type 1 overwrite replaces attribute values on the current version of a
//! member in place. History is otherwise strictly append-only; for any
//! business key the row with the highest surrogate key is the current
//! version. There is no separate validity flag.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, value::Value};

/// System-assigned dimension row identifier. Strictly increasing per
/// dimension; gaps are allowed. Keys below 1 are reserved for placeholder
/// members (e.g. the "unknown member" row at -1).
pub type SurrogateKey = i64;

// ─── DimensionRow ────────────────────────────────────────────────────────────

/// One version of one dimension member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRow {
  pub surrogate_key: SurrogateKey,
  /// Natural identifier from the source system. Repeats across historical
  /// versions of the same member.
  pub business_key:  String,
  pub attributes:    BTreeMap<String, Value>,
}

// ─── Dimension ───────────────────────────────────────────────────────────────

/// A dimension: rows in ascending surrogate-key order plus a business-key
/// index for version lookup.
#[derive(Debug, Clone, Default)]
pub struct Dimension {
  name:  String,
  rows:  Vec<DimensionRow>,
  /// business key → row indices, ascending (so `.last()` is current).
  index: HashMap<String, Vec<usize>>,
}

impl Dimension {
  /// An empty dimension.
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), rows: Vec::new(), index: HashMap::new() }
  }

  /// Rebuild a dimension from stored rows (must already be in ascending
  /// surrogate-key order, as [`crate::store::WarehouseStore`] guarantees).
  ///
  /// Returns [`Error::KeyCollision`] if the ordering invariant does not
  /// hold — a stored dimension that violates it is unusable.
  pub fn from_rows(
    name: impl Into<String>,
    rows: Vec<DimensionRow>,
  ) -> Result<Self> {
    let mut dimension = Self::new(name);
    for row in rows {
      dimension.push(row)?;
    }
    Ok(dimension)
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  /// All rows, ascending by surrogate key.
  pub fn rows(&self) -> &[DimensionRow] { &self.rows }

  pub fn into_rows(self) -> Vec<DimensionRow> { self.rows }

  /// The highest surrogate key in the dimension, if any.
  pub fn max_key(&self) -> Option<SurrogateKey> {
    self.rows.last().map(|row| row.surrogate_key)
  }

  /// Append a row at the tail.
  ///
  /// The new key must be strictly above the current tail key; anything
  /// else is a [`Error::KeyCollision`] and aborts the batch.
  pub fn push(&mut self, row: DimensionRow) -> Result<()> {
    if let Some(tail) = self.max_key()
      && row.surrogate_key <= tail
    {
      return Err(Error::KeyCollision {
        dimension: self.name.clone(),
        key:       row.surrogate_key,
      });
    }
    self
      .index
      .entry(row.business_key.clone())
      .or_default()
      .push(self.rows.len());
    self.rows.push(row);
    Ok(())
  }

  /// The current version for a business key — the row with the maximum
  /// surrogate key among its versions.
  pub fn current(&self, business_key: &str) -> Option<&DimensionRow> {
    let indices = self.index.get(business_key)?;
    indices.last().map(|&i| &self.rows[i])
  }

  /// All historical versions for a business key, oldest first.
  pub fn versions<'a>(
    &'a self,
    business_key: &str,
  ) -> impl Iterator<Item = &'a DimensionRow> {
    self
      .index
      .get(business_key)
      .map(Vec::as_slice)
      .unwrap_or_default()
      .iter()
      .map(|&i| &self.rows[i])
  }

  /// Apply a Type 1 overwrite to the row holding `surrogate_key`.
  ///
  /// Only the reconciler calls this, and only against the current version
  /// of a member; the surrogate key never changes.
  pub(crate) fn overwrite(
    &mut self,
    surrogate_key: SurrogateKey,
    changes: &BTreeMap<String, Value>,
  ) -> Result<()> {
    let row = self
      .rows
      .binary_search_by_key(&surrogate_key, |row| row.surrogate_key)
      .ok()
      .map(|i| &mut self.rows[i])
      .ok_or_else(|| Error::KeyCollision {
        dimension: self.name.clone(),
        key:       surrogate_key,
      })?;
    for (field, value) in changes {
      row.attributes.insert(field.clone(), value.clone());
    }
    Ok(())
  }
}

// ─── KeyAllocator ────────────────────────────────────────────────────────────

/// The monotonic surrogate-key counter for one dimension.
///
/// An explicit owned resource rather than ambient shared state: each
/// [`crate::reconcile::Reconciler`] holds its own allocator, which keeps
/// reconciliation testable and lets independent dimensions run in
/// parallel. Assignment within a dimension is serialized by ownership.
#[derive(Debug, Clone)]
pub struct KeyAllocator {
  next: SurrogateKey,
}

impl KeyAllocator {
  /// Floor for assigned keys; everything below is reserved for
  /// placeholder members.
  pub const FLOOR: SurrogateKey = 1;

  pub fn starting_at(next: SurrogateKey) -> Self {
    Self { next: next.max(Self::FLOOR) }
  }

  /// Resume allocation above the tail of an existing dimension.
  pub fn resuming(dimension: &Dimension) -> Self {
    Self::starting_at(dimension.max_key().map_or(Self::FLOOR, |k| k + 1))
  }

  /// The key the next call to [`Self::allocate`] will hand out.
  pub fn peek(&self) -> SurrogateKey { self.next }

  pub fn allocate(&mut self) -> SurrogateKey {
    let key = self.next;
    self.next += 1;
    key
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(key: SurrogateKey, bizkey: &str) -> DimensionRow {
    DimensionRow {
      surrogate_key: key,
      business_key:  bizkey.into(),
      attributes:    BTreeMap::new(),
    }
  }

  #[test]
  fn push_enforces_ascending_keys() {
    let mut dim = Dimension::new("product");
    dim.push(row(1, "A")).unwrap();
    dim.push(row(2, "B")).unwrap();

    let err = dim.push(row(2, "C")).unwrap_err();
    assert!(matches!(err, Error::KeyCollision { key: 2, .. }));
    assert_eq!(dim.len(), 2);
  }

  #[test]
  fn current_is_highest_key_per_business_key() {
    let dim = Dimension::from_rows(
      "product",
      vec![row(1, "A"), row(2, "B"), row(5, "A")],
    )
    .unwrap();

    assert_eq!(dim.current("A").unwrap().surrogate_key, 5);
    assert_eq!(dim.current("B").unwrap().surrogate_key, 2);
    assert!(dim.current("C").is_none());
    assert_eq!(dim.versions("A").count(), 2);
  }

  #[test]
  fn allocator_resumes_above_tail() {
    let dim =
      Dimension::from_rows("product", vec![row(1, "A"), row(7, "B")]).unwrap();
    let mut keys = KeyAllocator::resuming(&dim);
    assert_eq!(keys.allocate(), 8);
    assert_eq!(keys.allocate(), 9);

    let mut fresh = KeyAllocator::resuming(&Dimension::new("empty"));
    assert_eq!(fresh.allocate(), KeyAllocator::FLOOR);
  }
}
