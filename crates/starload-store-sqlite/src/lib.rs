//! SQLite backend for the starload warehouse store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The dimension swap and the
//! fact append each run inside a single SQLite transaction, which is what
//! gives the pipeline its all-or-nothing batch boundary.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
