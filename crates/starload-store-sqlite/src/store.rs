//! [`SqliteStore`] — the SQLite implementation of
//! [`starload_core::store::WarehouseStore`].

use std::path::Path;

use chrono::Utc;
use starload_core::{dimension::Dimension, load::FactRow, store::WarehouseStore};

use crate::{
  Error, Result,
  encode::{RawDimensionRow, RawFactRow, encode_dt, encode_keys, encode_values},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A warehouse store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── WarehouseStore impl ─────────────────────────────────────────────────────

impl WarehouseStore for SqliteStore {
  type Error = Error;

  async fn load_dimension(&self, name: &str) -> Result<Dimension> {
    let name_param = name.to_owned();

    let raws: Vec<RawDimensionRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT surrogate_key, business_key, attributes
           FROM dimension_rows
           WHERE dimension = ?1
           ORDER BY surrogate_key ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![name_param], |row| {
            Ok(RawDimensionRow {
              surrogate_key: row.get(0)?,
              business_key:  row.get(1)?,
              attributes:    row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let rows = raws
      .into_iter()
      .map(RawDimensionRow::into_row)
      .collect::<Result<Vec<_>>>()?;

    Ok(Dimension::from_rows(name, rows)?)
  }

  async fn swap_dimension(&self, dimension: &Dimension) -> Result<()> {
    let name = dimension.name().to_owned();
    let encoded: Vec<(i64, String, String)> = dimension
      .rows()
      .iter()
      .map(|row| {
        Ok((
          row.surrogate_key,
          row.business_key.clone(),
          encode_values(&row.attributes)?,
        ))
      })
      .collect::<Result<_>>()?;

    self
      .conn
      .call(move |conn| {
        // Delete + re-insert inside one transaction: readers see the old
        // dimension state or the new one, never the gap in between.
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM dimension_rows WHERE dimension = ?1",
          rusqlite::params![name],
        )?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO dimension_rows
               (dimension, surrogate_key, business_key, attributes)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (surrogate_key, business_key, attributes) in &encoded {
            stmt.execute(rusqlite::params![
              name,
              surrogate_key,
              business_key,
              attributes,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn append_facts(&self, fact: &str, rows: Vec<FactRow>) -> Result<u64> {
    let fact_param = fact.to_owned();
    let loaded_at = encode_dt(Utc::now());
    let encoded: Vec<(String, String)> = rows
      .iter()
      .map(|row| Ok((encode_keys(&row.keys)?, encode_values(&row.measures)?)))
      .collect::<Result<_>>()?;
    let appended = encoded.len() as u64;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO fact_rows (fact, loaded_at, keys, measures)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (keys, measures) in &encoded {
            stmt.execute(rusqlite::params![
              fact_param, loaded_at, keys, measures,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(appended)
  }

  async fn scan_facts(&self, fact: &str) -> Result<Vec<FactRow>> {
    let fact_param = fact.to_owned();

    let raws: Vec<RawFactRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT keys, measures FROM fact_rows
           WHERE fact = ?1
           ORDER BY rowid ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![fact_param], |row| {
            Ok(RawFactRow { keys: row.get(0)?, measures: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFactRow::into_row).collect()
  }
}
