//! Core types and engine for the starload dimensional ETL loader.
//!
//! This crate is deliberately free of database and terminal dependencies.
//! Storage backends (e.g. `starload-store-sqlite`) and binaries depend on
//! it; it depends on nothing heavier than tokio and serde.
//!
//! A load run composes four stages: the [`ingest::Ingestor`] turns raw
//! source rows into staged records, one [`reconcile::Reconciler`] per
//! dimension folds staged records into a new dimension version, the
//! [`resolve::KeyResolver`] maps business keys to current surrogate keys,
//! and the [`load::FactLoader`] substitutes keys into fact rows. The
//! [`pipeline::Pipeline`] wires the stages together over a
//! [`store::WarehouseStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod dimension;
pub mod error;
pub mod ingest;
pub mod load;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod resolve;
pub mod store;
pub mod value;

pub use error::{Error, Result};
