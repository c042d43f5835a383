//! Raw scalar values carried by staged and fact records.
//!
//! Source feeds are untyped at compile time; `Value` is the tagged runtime
//! representation of a single cell. Shape validation happens once, at
//! ingestion — downstream stages trust the records they are handed.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single raw cell from a source feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
  Text(String),
  Integer(i64),
  Float(f64),
  Bool(bool),
  Null,
}

impl Value {
  /// The discriminant string used in reports and error messages.
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Text(_) => "text",
      Self::Integer(_) => "integer",
      Self::Float(_) => "float",
      Self::Bool(_) => "bool",
      Self::Null => "null",
    }
  }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  /// Whether this value can serve as a fact measure.
  pub fn is_numeric(&self) -> bool {
    matches!(self, Self::Integer(_) | Self::Float(_))
  }

  /// Canonical business-key text for a scalar.
  ///
  /// Returns `None` for null and for empty or whitespace-only text —
  /// neither can identify a dimension member.
  pub fn as_key_text(&self) -> Option<String> {
    match self {
      Self::Text(s) => {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
      }
      Self::Integer(i) => Some(i.to_string()),
      Self::Float(f) => Some(f.to_string()),
      Self::Bool(b) => Some(b.to_string()),
      Self::Null => None,
    }
  }

  /// Parse a raw text cell into the most specific scalar it represents.
  /// Empty cells become [`Value::Null`].
  pub fn coerce(raw: &str) -> Self {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Self::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
      return Self::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
      return Self::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
      return Self::Integer(i);
    }
    // Non-finite floats stay text: NaN is never equal to itself, so a
    // NaN attribute would classify as changed on every reconciliation.
    if let Ok(f) = trimmed.parse::<f64>()
      && f.is_finite()
    {
      return Self::Float(f);
    }
    Self::Text(trimmed.to_owned())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(s) => write!(f, "{s}"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Float(x) => write!(f, "{x}"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Null => write!(f, "∅"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coerce_picks_most_specific_scalar() {
    assert_eq!(Value::coerce("42"), Value::Integer(42));
    assert_eq!(Value::coerce("4.5"), Value::Float(4.5));
    assert_eq!(Value::coerce("TRUE"), Value::Bool(true));
    assert_eq!(Value::coerce("  widget "), Value::Text("widget".into()));
    assert_eq!(Value::coerce(""), Value::Null);
    assert_eq!(Value::coerce("   "), Value::Null);
  }

  #[test]
  fn non_finite_floats_stay_text() {
    assert_eq!(Value::coerce("nan"), Value::Text("nan".into()));
    assert_eq!(Value::coerce("inf"), Value::Text("inf".into()));
    assert_eq!(Value::coerce("-infinity"), Value::Text("-infinity".into()));
    // Reconciliation relies on attribute equality being reflexive.
    assert_eq!(Value::coerce("nan"), Value::coerce("nan"));
  }

  #[test]
  fn key_text_rejects_null_and_blank() {
    assert_eq!(Value::Null.as_key_text(), None);
    assert_eq!(Value::Text("  ".into()).as_key_text(), None);
    assert_eq!(Value::Text(" A1 ".into()).as_key_text(), Some("A1".into()));
    assert_eq!(Value::Integer(7).as_key_text(), Some("7".into()));
  }

  #[test]
  fn numeric_check_covers_both_numeric_kinds() {
    assert!(Value::Integer(1).is_numeric());
    assert!(Value::Float(1.0).is_numeric());
    assert!(!Value::Text("1".into()).is_numeric());
    assert!(!Value::Null.is_numeric());
  }
}
