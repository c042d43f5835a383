//! SQL schema for the starload SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `PRAGMA user_version` number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per dimension member version, ordered by surrogate key.
-- Replaced wholesale inside a transaction when a reconciled dimension is
-- swapped in; readers never observe a half-applied batch.
CREATE TABLE IF NOT EXISTS dimension_rows (
    dimension     TEXT    NOT NULL,
    surrogate_key INTEGER NOT NULL,
    business_key  TEXT    NOT NULL,
    attributes    TEXT    NOT NULL,   -- JSON object: field -> tagged value
    PRIMARY KEY (dimension, surrogate_key)
);

CREATE INDEX IF NOT EXISTS dimension_rows_bizkey_idx
    ON dimension_rows(dimension, business_key);

-- Fact rows are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS fact_rows (
    fact      TEXT NOT NULL,
    loaded_at TEXT NOT NULL,          -- ISO 8601 UTC; store-assigned
    keys      TEXT NOT NULL,          -- JSON object: fk field -> surrogate key
    measures  TEXT NOT NULL           -- JSON object: field -> tagged value
);

CREATE INDEX IF NOT EXISTS fact_rows_fact_idx ON fact_rows(fact);

PRAGMA user_version = 1;
";
