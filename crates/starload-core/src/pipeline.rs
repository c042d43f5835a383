//! Pipeline orchestration — reconcile every dimension, then load facts.
//!
//! Independent dimensions reconcile in parallel; nothing is shared between
//! those tasks (each owns its reconciler and key allocator). Fact loading
//! waits for **all** dimension tasks to join — the barrier that guarantees
//! key resolution only ever sees fully reconciled state. Within one
//! dimension, reconciliation is single-threaded, which is the lost-update
//! guard for Type 1 overwrites.

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::info;

use crate::{
  Error, Result,
  config::{DimensionConfig, FactConfig},
  load::FactLoader,
  reconcile::Reconciler,
  record::{FactRecord, StagedRecord},
  report::{ChangeReport, RunReport},
  resolve::KeyResolver,
  store::WarehouseStore,
};

// ─── Feeds ───────────────────────────────────────────────────────────────────

/// One dimension's staged batch for a run.
#[derive(Debug, Clone)]
pub struct DimensionFeed {
  pub config:  DimensionConfig,
  pub records: Vec<StagedRecord>,
}

/// One fact table's unresolved batch for a run.
#[derive(Debug, Clone)]
pub struct FactFeed {
  pub config:  FactConfig,
  pub records: Vec<FactRecord>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Drives a full load run against a [`WarehouseStore`].
pub struct Pipeline<S> {
  store: S,
}

impl<S> Pipeline<S>
where
  S: WarehouseStore + Clone + 'static,
{
  pub fn new(store: S) -> Self { Self { store } }

  pub fn store(&self) -> &S { &self.store }

  /// Execute one run: reconcile all dimension feeds (in parallel), then
  /// resolve and append all fact feeds. Each dimension may appear in at
  /// most one feed per run; duplicates are rejected up front as an
  /// [`Error::Configuration`].
  ///
  /// Batch-fatal conditions ([`Error::KeyCollision`],
  /// [`Error::StorageUnavailable`]) abort the run; the store's transaction
  /// boundary guarantees no partial mutation from the failed batch is
  /// visible. Row-level problems only show up in the returned report.
  pub async fn run(
    &self,
    dimensions: Vec<DimensionFeed>,
    facts: Vec<FactFeed>,
  ) -> Result<RunReport> {
    let started_at = Utc::now();
    for (i, feed) in dimensions.iter().enumerate() {
      feed.config.validate()?;
      // One feed per dimension per run: two tasks reconciling the same
      // stored state in parallel would each swap in their own version and
      // the last swap would discard the other's work.
      if dimensions[..i].iter().any(|f| f.config.name == feed.config.name) {
        return Err(Error::Configuration(format!(
          "dimension '{}' appears in more than one feed",
          feed.config.name
        )));
      }
    }
    for feed in &facts {
      feed.config.validate()?;
    }

    let configs: Vec<DimensionConfig> =
      dimensions.iter().map(|feed| feed.config.clone()).collect();

    // Stage 2: reconcile independent dimensions in parallel.
    let mut tasks = JoinSet::new();
    for (idx, feed) in dimensions.into_iter().enumerate() {
      let store = self.store.clone();
      tasks.spawn(async move {
        let report = reconcile_one(&store, feed).await?;
        Ok::<_, Error>((idx, report))
      });
    }

    let mut slots: Vec<Option<ChangeReport>> =
      configs.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
      let (idx, report) =
        joined.map_err(|e| Error::TaskJoin(e.to_string()))??;
      slots[idx] = Some(report);
    }
    // Every dimension task has joined — the barrier before resolution.
    let dimension_reports: Vec<ChangeReport> =
      slots.into_iter().flatten().collect();

    // Stages 3–4: re-read reconciled state, resolve, append.
    let mut reconciled = Vec::with_capacity(configs.len());
    for config in &configs {
      let dimension = self
        .store
        .load_dimension(&config.name)
        .await
        .map_err(store_err)?;
      reconciled.push(dimension);
    }
    let mut resolver = KeyResolver::new();
    for (config, dimension) in configs.iter().zip(&reconciled) {
      resolver.add(config, dimension);
    }

    let mut fact_reports = Vec::with_capacity(facts.len());
    for feed in facts {
      let FactFeed { config, records } = feed;
      let loader = FactLoader::new(&config, &resolver)?;
      let (rows, mut report) = loader.load(records)?;
      let appended = self
        .store
        .append_facts(&config.name, rows)
        .await
        .map_err(store_err)?;
      report.loaded = appended;
      fact_reports.push(report);
    }

    let report = RunReport {
      started_at,
      finished_at: Utc::now(),
      dimensions: dimension_reports,
      facts: fact_reports,
    };
    info!(
      dimensions = report.dimensions.len(),
      facts = report.facts.len(),
      "pipeline run complete"
    );
    Ok(report)
  }
}

/// Load → reconcile → swap for a single dimension feed.
async fn reconcile_one<S: WarehouseStore>(
  store: &S,
  feed: DimensionFeed,
) -> Result<ChangeReport> {
  let current = store
    .load_dimension(&feed.config.name)
    .await
    .map_err(store_err)?;
  let mut reconciler = Reconciler::resuming(feed.config, &current)?;
  let (next, report) = reconciler.reconcile(&current, feed.records)?;
  store.swap_dimension(&next).await.map_err(store_err)?;
  Ok(report)
}

fn store_err<E: std::error::Error>(e: E) -> Error {
  Error::StorageUnavailable { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::UnknownMemberPolicy,
    store::{MemoryStore, WarehouseStore as _},
    value::Value,
  };

  fn staged(pairs: &[(&str, &str)]) -> StagedRecord {
    StagedRecord::new(
      pairs
        .iter()
        .map(|(name, raw)| ((*name).to_owned(), Value::coerce(raw)))
        .collect(),
    )
  }

  fn fact(pairs: &[(&str, &str)]) -> FactRecord {
    FactRecord::from(staged(pairs))
  }

  fn product_config() -> DimensionConfig {
    DimensionConfig::new("product", "id")
      .with_type1_fields(&["name"])
      .with_type2_fields(&["addr"])
  }

  fn sales_config() -> FactConfig {
    FactConfig::new("sales")
      .with_reference("product", "product_id")
      .with_measures(&["qty"])
  }

  #[tokio::test]
  async fn full_run_reconciles_then_loads() {
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(store.clone());

    let report = pipeline
      .run(
        vec![DimensionFeed {
          config:  product_config(),
          records: vec![
            staged(&[("id", "A"), ("name", "Widget"), ("addr", "1 Main St")]),
            staged(&[("id", "B"), ("name", "Sprocket"), ("addr", "9 Elm St")]),
          ],
        }],
        vec![FactFeed {
          config:  sales_config(),
          records: vec![
            fact(&[("product_id", "A"), ("qty", "3")]),
            fact(&[("product_id", "B"), ("qty", "5")]),
          ],
        }],
      )
      .await
      .unwrap();

    assert_eq!(report.dimensions[0].inserted_new, 2);
    assert_eq!(report.facts[0].loaded, 2);

    let dim = store.load_dimension("product").await.unwrap();
    assert_eq!(dim.len(), 2);
    let rows = store.scan_facts("sales").await.unwrap();
    assert_eq!(rows[0].keys["product_id"], 1);
    assert_eq!(rows[1].keys["product_id"], 2);
  }

  #[tokio::test]
  async fn second_run_versions_and_resolves_to_latest() {
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(store.clone());

    pipeline
      .run(
        vec![DimensionFeed {
          config:  product_config(),
          records: vec![staged(&[
            ("id", "A"),
            ("name", "Widget"),
            ("addr", "1 Main St"),
          ])],
        }],
        vec![],
      )
      .await
      .unwrap();

    // Type 2 change on the second run; facts in the same run must resolve
    // to the new version.
    let report = pipeline
      .run(
        vec![DimensionFeed {
          config:  product_config(),
          records: vec![staged(&[
            ("id", "A"),
            ("name", "Widget"),
            ("addr", "2 Oak St"),
          ])],
        }],
        vec![FactFeed {
          config:  sales_config(),
          records: vec![fact(&[("product_id", "A"), ("qty", "1")])],
        }],
      )
      .await
      .unwrap();

    assert_eq!(report.dimensions[0].inserted_versions, 1);
    let dim = store.load_dimension("product").await.unwrap();
    assert_eq!(dim.versions("A").count(), 2);

    let rows = store.scan_facts("sales").await.unwrap();
    assert_eq!(rows[0].keys["product_id"], 2);
  }

  #[tokio::test]
  async fn facts_join_across_parallel_dimensions() {
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(store.clone());

    let customer_config = DimensionConfig::new("customer", "cust_id")
      .with_unknown_member_policy(UnknownMemberPolicy::Placeholder {
        key: -1,
      });
    let sales = FactConfig::new("sales")
      .with_reference("product", "product_id")
      .with_reference("customer", "customer_id")
      .with_measures(&["qty"]);

    let report = pipeline
      .run(
        vec![
          DimensionFeed {
            config:  product_config(),
            records: vec![staged(&[("id", "A"), ("name", "Widget")])],
          },
          DimensionFeed {
            config:  customer_config,
            records: vec![staged(&[("cust_id", "C9"), ("name", "Acme")])],
          },
        ],
        vec![FactFeed {
          config:  sales,
          records: vec![
            fact(&[("product_id", "A"), ("customer_id", "C9"), ("qty", "2")]),
            // Late-arriving customer resolves to the placeholder.
            fact(&[("product_id", "A"), ("customer_id", "C0"), ("qty", "7")]),
          ],
        }],
      )
      .await
      .unwrap();

    assert_eq!(report.dimensions.len(), 2);
    assert_eq!(report.facts[0].loaded, 2);

    let rows = store.scan_facts("sales").await.unwrap();
    assert_eq!(rows[0].keys["customer_id"], 1);
    assert_eq!(rows[1].keys["customer_id"], -1);
  }

  #[tokio::test]
  async fn duplicate_dimension_feeds_are_rejected() {
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(store.clone());

    // Two feeds for the same dimension would reconcile the same stored
    // state in parallel; whichever swap lands last would silently drop
    // the other's rows.
    let err = pipeline
      .run(
        vec![
          DimensionFeed {
            config:  product_config(),
            records: vec![staged(&[("id", "A"), ("name", "Widget")])],
          },
          DimensionFeed {
            config:  product_config(),
            records: vec![staged(&[("id", "B"), ("name", "Sprocket")])],
          },
        ],
        vec![],
      )
      .await
      .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert!(store.load_dimension("product").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn invalid_config_aborts_before_any_write() {
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(store.clone());

    let bad = DimensionConfig::new("product", "id")
      .with_type1_fields(&["addr"])
      .with_type2_fields(&["addr"]);
    let err = pipeline
      .run(
        vec![DimensionFeed {
          config:  bad,
          records: vec![staged(&[("id", "A"), ("addr", "x")])],
        }],
        vec![],
      )
      .await
      .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert!(store.load_dimension("product").await.unwrap().is_empty());
  }
}
