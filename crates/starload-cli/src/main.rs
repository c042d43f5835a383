//! `starload` batch loader binary.
//!
//! Reads a TOML pipeline description (`starload.toml` or the path given
//! with `--config`), ingests the CSV feeds it names, and runs the
//! dimensional load against an in-process SQLite store.
//!
//! Example pipeline file:
//!
//! ```toml
//! store_path = "warehouse.db"
//!
//! [[dimension]]
//! name               = "product"
//! business_key_field = "id"
//! type1_fields       = ["name"]
//! type2_fields       = ["addr"]
//! source             = "product.csv"
//!
//! [[fact]]
//! name           = "sales"
//! measure_fields = ["qty", "amount"]
//! source         = "sales.csv"
//! dimension_references = [{ dimension = "product", fk_field = "product_id" }]
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use starload_core::{
  ingest::Ingestor,
  pipeline::{DimensionFeed, FactFeed, Pipeline},
  reconcile::Reconciler,
  record::{FactRecord, StagedRecord},
  report::{ChangeReport, IngestReport, LoadReport},
  store::WarehouseStore as _,
};
use starload_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod csv_source;
mod settings;

use csv_source::CsvFileSource;
use settings::{ColumnSettings, PipelineSettings, declared_schema};

#[derive(Parser)]
#[command(author, version, about = "Dimensional ETL batch loader")]
struct Cli {
  /// Path to the TOML pipeline description.
  #[arg(short, long, default_value = "starload.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest all feeds and run the full pipeline.
  Run,
  /// Dry run: classify the dimension feeds without writing anything.
  Plan,
  /// Print the rows of one dimension; `*` marks current versions.
  Show { dimension: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load the pipeline description.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()))
    .add_source(config::Environment::with_prefix("STARLOAD"))
    .build()
    .with_context(|| format!("failed to read pipeline file {:?}", cli.config))?;
  let settings: PipelineSettings = settings
    .try_deserialize()
    .context("failed to deserialise pipeline description")?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", settings.store_path)
    })?;

  match cli.command {
    Command::Run => run(&settings, store).await,
    Command::Plan => plan(&settings, store).await,
    Command::Show { dimension } => show(store, &dimension).await,
  }
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn run(
  settings: &PipelineSettings,
  store: SqliteStore,
) -> anyhow::Result<()> {
  let mut dimension_feeds = Vec::new();
  for feed in &settings.dimension {
    let (records, report) = ingest_feed(&feed.source, &feed.columns).await?;
    print_ingest(&feed.config.name, &report);
    dimension_feeds
      .push(DimensionFeed { config: feed.config.clone(), records });
  }

  let mut fact_feeds = Vec::new();
  for feed in &settings.fact {
    let (records, report) = ingest_feed(&feed.source, &feed.columns).await?;
    print_ingest(&feed.config.name, &report);
    fact_feeds.push(FactFeed {
      config:  feed.config.clone(),
      records: records.into_iter().map(FactRecord::from).collect(),
    });
  }

  let pipeline = Pipeline::new(store);
  let report = pipeline
    .run(dimension_feeds, fact_feeds)
    .await
    .context("pipeline run failed")?;

  for change in &report.dimensions {
    print_change(change);
  }
  for load in &report.facts {
    print_load(load);
  }
  Ok(())
}

async fn plan(
  settings: &PipelineSettings,
  store: SqliteStore,
) -> anyhow::Result<()> {
  for feed in &settings.dimension {
    let (records, _) = ingest_feed(&feed.source, &feed.columns).await?;
    let current = store
      .load_dimension(&feed.config.name)
      .await
      .context("failed to read current dimension state")?;
    let reconciler = Reconciler::resuming(feed.config.clone(), &current)?;
    let plan = reconciler.plan(&current, &records)?;
    println!(
      "{}: {} new, {} new versions, {} in-place updates, {} unchanged, {} malformed",
      plan.dimension,
      plan.to_insert_new.len(),
      plan.to_insert_version.len(),
      plan.to_update_in_place.len(),
      plan.unchanged,
      plan.malformed.total,
    );
  }
  Ok(())
}

async fn show(store: SqliteStore, dimension: &str) -> anyhow::Result<()> {
  let dim = store
    .load_dimension(dimension)
    .await
    .context("failed to read dimension")?;
  if dim.is_empty() {
    println!("dimension '{dimension}' is empty");
    return Ok(());
  }
  for row in dim.rows() {
    let is_current = dim
      .current(&row.business_key)
      .is_some_and(|current| current.surrogate_key == row.surrogate_key);
    let marker = if is_current { "*" } else { " " };
    let attributes = row
      .attributes
      .iter()
      .map(|(field, value)| format!("{field}={value}"))
      .collect::<Vec<_>>()
      .join(", ");
    println!(
      "{marker} {:>6}  {:<16} {attributes}",
      row.surrogate_key, row.business_key
    );
  }
  Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Open one CSV feed and drain it through the staging ingestor.
async fn ingest_feed(
  source: &Path,
  columns: &[ColumnSettings],
) -> anyhow::Result<(Vec<StagedRecord>, IngestReport)> {
  let mut csv = CsvFileSource::open(source)?;
  let schema = declared_schema(columns, csv.header())?;
  let ingestor = Ingestor::new(schema);
  ingestor
    .ingest(&mut csv)
    .await
    .with_context(|| format!("ingestion failed for {source:?}"))
}

fn print_ingest(name: &str, report: &IngestReport) {
  println!(
    "ingested '{name}': {} accepted, {} rejected",
    report.accepted, report.rejected.total
  );
  for issue in &report.rejected.samples {
    println!("    row {}: {}", issue.row, issue.detail);
  }
}

fn print_change(report: &ChangeReport) {
  println!(
    "reconciled '{}': {} new, {} new versions, {} in-place updates, {} unchanged, {} malformed",
    report.dimension,
    report.inserted_new,
    report.inserted_versions,
    report.updated_in_place,
    report.unchanged,
    report.malformed.total,
  );
  for issue in &report.malformed.samples {
    println!("    row {}: {}", issue.row, issue.detail);
  }
}

fn print_load(report: &LoadReport) {
  println!(
    "loaded '{}': {} rows, {} rejected",
    report.fact, report.loaded, report.rejected.total
  );
  for issue in &report.rejected.samples {
    println!("    row {}: {}", issue.row, issue.detail);
  }
}
