//! `Column` and `ColumnFeatures` — the per-column facts the rest of the
//! discovery pipeline reasons over (§3).

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::ids::{ColumnId, ProjectId, TableId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub project_id: ProjectId,
    pub table_id: TableId,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_pos: i32,
    pub distinct_count: Option<i64>,
    pub non_null_count: Option<i64>,
    pub row_count: Option<i64>,
    /// Whether a prior pass (or the probe's own catalog introspection)
    /// already established this column participates in a join.
    pub is_joinable: Option<bool>,
    pub joinability_reason: Option<String>,
    pub features: Option<ColumnFeatures>,
}

impl Column {
    /// A column is unique (and thus eligible as an FK target alongside
    /// primary keys) when every non-null value is distinct.
    pub fn is_unique(&self) -> bool {
        match (self.distinct_count, self.non_null_count) {
            (Some(distinct), Some(non_null)) => distinct == non_null,
            _ => false,
        }
    }
}

/// The classification signals attached to a column by feature extraction.
/// Consumed by the candidate collector (role/purpose/classification_path)
/// and by the convention finalizer (the `timestamp`/`monetary`/`identifier`
/// sub-structs).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnFeatures {
    pub role: ColumnRole,
    pub purpose: ColumnPurpose,
    pub classification_path: ClassificationPath,
    pub timestamp: TimestampFeatures,
    pub monetary: MonetaryFeatures,
    pub identifier: IdentifierFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnRole {
    PrimaryKey,
    ForeignKey,
    Attribute,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPurpose {
    Identifier,
    Timestamp,
    Measure,
    Text,
    Categorical,
    /// Escape hatch for purposes beyond the spec's named set.
    Other(String),
}

impl ColumnPurpose {
    pub fn other(label: impl Into<String>) -> Self {
        Self::Other(label.into())
    }
}

impl Default for ColumnPurpose {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

/// Open-ended classification tag, mirroring the spec's non-exhaustive list
/// (`uuid, external_id, timestamp, boolean, json, numeric, text, …`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Uuid,
    ExternalId,
    Timestamp,
    Boolean,
    Json,
    Numeric,
    Text,
    Other(String),
}

impl Default for ClassificationPath {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimestampPurpose {
    AuditCreated,
    AuditUpdated,
    SoftDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimestampFeatures {
    pub is_soft_delete: bool,
    pub is_audit_field: bool,
    pub timestamp_purpose: Option<TimestampPurpose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CurrencyUnit {
    Cents,
    Dollars,
    BasisPoints,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonetaryFeatures {
    pub is_monetary: bool,
    pub currency_unit: Option<CurrencyUnit>,
    pub paired_currency_column: Option<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentifierFeatures {
    /// Name of the external system this column's value identifies a row in
    /// (e.g. `"stripe"`), when `classification_path = ExternalId`.
    pub external_service: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(distinct: Option<i64>, non_null: Option<i64>) -> Column {
        Column {
            id: ColumnId::new(),
            project_id: ProjectId::new(),
            table_id: TableId::new(),
            name: "id".to_string(),
            data_type: "uuid".to_string(),
            nullable: false,
            is_primary_key: false,
            ordinal_pos: 1,
            distinct_count: distinct,
            non_null_count: non_null,
            row_count: non_null,
            is_joinable: None,
            joinability_reason: None,
            features: None,
        }
    }

    #[test]
    fn unique_when_distinct_equals_non_null() {
        assert!(column(Some(100), Some(100)).is_unique());
    }

    #[test]
    fn not_unique_when_distinct_less_than_non_null() {
        assert!(!column(Some(90), Some(100)).is_unique());
    }

    #[test]
    fn not_unique_when_counts_missing() {
        assert!(!column(None, None).is_unique());
    }
}
