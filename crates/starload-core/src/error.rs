//! Error types for `starload-core`.
//!
//! Only batch-fatal conditions are `Error`s. Row-level problems (a staged
//! record missing its business key, an unresolvable fact reference under
//! the `fail` policy) are aggregated into per-batch reports instead — see
//! [`crate::report`].

use thiserror::Error;

use crate::dimension::SurrogateKey;

#[derive(Debug, Error)]
pub enum Error {
  /// A whole feed (not a single row) is unusable, e.g. an empty schema.
  #[error("malformed input: {reason}")]
  MalformedRecord { reason: String },

  #[error("no member with business key {business_key:?} in dimension '{dimension}'")]
  UnresolvedReference {
    dimension:    String,
    business_key: String,
  },

  /// The monotonic surrogate-key invariant was broken. Always fatal for
  /// the reconciliation batch.
  #[error("surrogate key collision in dimension '{dimension}': key {key} is not above the current tail")]
  KeyCollision {
    dimension: String,
    key:       SurrogateKey,
  },

  #[error("storage unavailable: {reason}")]
  StorageUnavailable { reason: String },

  /// An in-flight ingestion was cancelled or timed out; the partial batch
  /// has been discarded.
  #[error("ingestion aborted: {reason}")]
  IngestAborted { reason: String },

  #[error("unknown dimension: {0}")]
  UnknownDimension(String),

  #[error("configuration error: {0}")]
  Configuration(String),

  /// A background reconciliation task panicked or was cancelled.
  #[error("background task failed: {0}")]
  TaskJoin(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
