//! Declarative per-dimension and per-fact configuration.
//!
//! The Type 1 / Type 2 split is configuration, not code: each dimension
//! names which attribute fields are overwrite-in-place and which are
//! version-preserving. Everything is serde-deserializable so binaries can
//! read it straight from a TOML file.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  dimension::{KeyAllocator, SurrogateKey},
};

// ─── UnknownMemberPolicy ─────────────────────────────────────────────────────

/// What the key resolver does when a fact references a business key absent
/// from the dimension (a late-arriving fact). There is no silent-null
/// option by design.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum UnknownMemberPolicy {
  /// Reject the fact row.
  #[default]
  Fail,
  /// Resolve to a reserved placeholder key (e.g. `-1`).
  Placeholder { key: SurrogateKey },
}

// ─── DimensionConfig ─────────────────────────────────────────────────────────

/// Configuration for one dimension feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
  pub name: String,
  /// The column holding the natural identifier from the source system.
  pub business_key_field: String,
  /// Attributes overwritten in place on change (history lost).
  #[serde(default)]
  pub type1_fields: Vec<String>,
  /// Attributes whose change produces a new versioned row.
  #[serde(default)]
  pub type2_fields: Vec<String>,
  #[serde(default)]
  pub unknown_member_policy: UnknownMemberPolicy,
}

impl DimensionConfig {
  /// Minimal config: everything defaults to Type 1, unknown members fail.
  pub fn new(
    name: impl Into<String>,
    business_key_field: impl Into<String>,
  ) -> Self {
    Self {
      name: name.into(),
      business_key_field: business_key_field.into(),
      type1_fields: Vec::new(),
      type2_fields: Vec::new(),
      unknown_member_policy: UnknownMemberPolicy::default(),
    }
  }

  pub fn with_type1_fields(mut self, fields: &[&str]) -> Self {
    self.type1_fields = fields.iter().map(|f| (*f).to_owned()).collect();
    self
  }

  pub fn with_type2_fields(mut self, fields: &[&str]) -> Self {
    self.type2_fields = fields.iter().map(|f| (*f).to_owned()).collect();
    self
  }

  pub fn with_unknown_member_policy(
    mut self,
    policy: UnknownMemberPolicy,
  ) -> Self {
    self.unknown_member_policy = policy;
    self
  }

  /// Whether a change to `field` produces a new versioned row. Fields in
  /// neither list default to Type 1 — versioning is opt-in per field.
  pub fn is_type2_field(&self, field: &str) -> bool {
    self.type2_fields.iter().any(|f| f == field)
  }

  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Configuration("dimension name is empty".into()));
    }
    if self.business_key_field.trim().is_empty() {
      return Err(Error::Configuration(format!(
        "dimension '{}' has an empty business_key_field",
        self.name
      )));
    }
    if let Some(field) = self
      .type1_fields
      .iter()
      .find(|f| self.type2_fields.contains(*f))
    {
      return Err(Error::Configuration(format!(
        "dimension '{}': field '{field}' is listed as both type 1 and type 2",
        self.name
      )));
    }
    for field in self.type1_fields.iter().chain(&self.type2_fields) {
      if field == &self.business_key_field {
        return Err(Error::Configuration(format!(
          "dimension '{}': business key field '{field}' cannot also be a \
           type 1 or type 2 attribute",
          self.name
        )));
      }
    }
    if let UnknownMemberPolicy::Placeholder { key } =
      self.unknown_member_policy
      && key >= KeyAllocator::FLOOR
    {
      return Err(Error::Configuration(format!(
        "dimension '{}': placeholder key {key} must be below {} so it can \
         never collide with an assigned surrogate key",
        self.name,
        KeyAllocator::FLOOR
      )));
    }
    Ok(())
  }
}

// ─── FactConfig ──────────────────────────────────────────────────────────────

/// One foreign-key reference from a fact to a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRef {
  /// The dimension this reference resolves against.
  pub dimension: String,
  /// The fact column holding the dimension's business key.
  pub fk_field:  String,
}

/// Configuration for one fact feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactConfig {
  pub name: String,
  #[serde(default)]
  pub dimension_references: Vec<DimensionRef>,
  #[serde(default)]
  pub measure_fields: Vec<String>,
}

impl FactConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      dimension_references: Vec::new(),
      measure_fields: Vec::new(),
    }
  }

  pub fn with_reference(
    mut self,
    dimension: impl Into<String>,
    fk_field: impl Into<String>,
  ) -> Self {
    self.dimension_references.push(DimensionRef {
      dimension: dimension.into(),
      fk_field:  fk_field.into(),
    });
    self
  }

  pub fn with_measures(mut self, fields: &[&str]) -> Self {
    self.measure_fields = fields.iter().map(|f| (*f).to_owned()).collect();
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Configuration("fact name is empty".into()));
    }
    for reference in &self.dimension_references {
      if reference.dimension.trim().is_empty()
        || reference.fk_field.trim().is_empty()
      {
        return Err(Error::Configuration(format!(
          "fact '{}' has a dimension reference with an empty field",
          self.name
        )));
      }
    }
    Ok(())
  }
}
