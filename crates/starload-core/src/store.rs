//! The `WarehouseStore` trait and the in-memory reference backend.
//!
//! The trait is implemented by storage backends (e.g.
//! `starload-store-sqlite`). The pipeline depends on this abstraction, not
//! on any concrete backend; persistence format is entirely the backend's
//! business.

use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::sync::Mutex;

use crate::{
  Result,
  dimension::{Dimension, DimensionRow},
  load::FactRow,
};

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over dimension and fact storage.
///
/// Dimension state changes only through [`WarehouseStore::swap_dimension`],
/// which must be a single atomic transition: readers see the old version
/// or the new one, never a partially applied batch. Fact writes are
/// append-only and transactional per batch.
///
/// All methods return `Send` futures so backends can be driven from
/// multi-threaded runtimes.
pub trait WarehouseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Full scan of a dimension's rows, ascending by surrogate key. A name
  /// never stored yields an empty dimension.
  fn load_dimension<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Dimension, Self::Error>> + Send + 'a;

  /// Atomically replace the stored state of `dimension` with the given
  /// (already reconciled) version.
  fn swap_dimension<'a>(
    &'a self,
    dimension: &'a Dimension,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Append resolved fact rows in one transaction; no partial append may
  /// become visible. Returns the number of rows written.
  fn append_facts<'a>(
    &'a self,
    fact: &'a str,
    rows: Vec<FactRow>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// All rows loaded for a fact table so far, in load order.
  fn scan_facts<'a>(
    &'a self,
    fact: &'a str,
  ) -> impl Future<Output = Result<Vec<FactRow>, Self::Error>> + Send + 'a;
}

// ─── MemoryStore ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
  dimensions: HashMap<String, Vec<DimensionRow>>,
  facts:      HashMap<String, Vec<FactRow>>,
}

/// In-memory [`WarehouseStore`] — the reference backend, used by pipeline
/// tests and embeddings that need no persistence.
///
/// Cloning is cheap — clones share the same state. Every operation takes
/// the single state lock, which is what makes the dimension swap atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }
}

impl WarehouseStore for MemoryStore {
  type Error = crate::Error;

  async fn load_dimension(&self, name: &str) -> Result<Dimension> {
    let state = self.inner.lock().await;
    match state.dimensions.get(name) {
      Some(rows) => Dimension::from_rows(name, rows.clone()),
      None => Ok(Dimension::new(name)),
    }
  }

  async fn swap_dimension(&self, dimension: &Dimension) -> Result<()> {
    let mut state = self.inner.lock().await;
    state
      .dimensions
      .insert(dimension.name().to_owned(), dimension.rows().to_vec());
    Ok(())
  }

  async fn append_facts(&self, fact: &str, rows: Vec<FactRow>) -> Result<u64> {
    let appended = rows.len() as u64;
    let mut state = self.inner.lock().await;
    state.facts.entry(fact.to_owned()).or_default().extend(rows);
    Ok(appended)
  }

  async fn scan_facts(&self, fact: &str) -> Result<Vec<FactRow>> {
    let state = self.inner.lock().await;
    Ok(state.facts.get(fact).cloned().unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::value::Value;

  fn dim_with_row() -> Dimension {
    let mut dim = Dimension::new("product");
    dim
      .push(DimensionRow {
        surrogate_key: 1,
        business_key:  "A".into(),
        attributes:    BTreeMap::from([(
          "name".to_owned(),
          Value::Text("Widget".into()),
        )]),
      })
      .unwrap();
    dim
  }

  #[tokio::test]
  async fn unknown_dimension_loads_empty() {
    let store = MemoryStore::new();
    let dim = store.load_dimension("product").await.unwrap();
    assert!(dim.is_empty());
    assert_eq!(dim.name(), "product");
  }

  #[tokio::test]
  async fn swap_replaces_wholesale() {
    let store = MemoryStore::new();
    store.swap_dimension(&dim_with_row()).await.unwrap();
    assert_eq!(store.load_dimension("product").await.unwrap().len(), 1);

    // Swapping an empty version removes the old rows entirely.
    store.swap_dimension(&Dimension::new("product")).await.unwrap();
    assert!(store.load_dimension("product").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn facts_append_in_order() {
    let store = MemoryStore::new();
    let row = |qty: i64| FactRow {
      keys:     BTreeMap::from([("product_key".to_owned(), 1)]),
      measures: BTreeMap::from([("qty".to_owned(), Value::Integer(qty))]),
    };

    assert_eq!(store.append_facts("sales", vec![row(1), row(2)]).await.unwrap(), 2);
    assert_eq!(store.append_facts("sales", vec![row(3)]).await.unwrap(), 1);

    let rows = store.scan_facts("sales").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].measures["qty"], Value::Integer(3));
  }
}
