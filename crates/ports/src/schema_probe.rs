//! `SchemaProbe` — the database-specific driver capability consumed by the
//! candidate collector and join verifier (§6). No concrete implementation
//! ships here: this crate defines only the trait and its DTOs, exactly as
//! the source database's SQL dialect and connection details are out of
//! scope for the core.

use async_trait::async_trait;

use crate::error::PortError;

/// Fully-qualified reference to a single column, used for both endpoints of
/// a candidate pair in overlap/join calls (the spec's `src…`/`tgt…` param
/// groups).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }
}

/// A foreign key declared in the source database's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDecl {
    pub source_schema: String,
    pub source_table: String,
    pub source_column: String,
    pub target_schema: String,
    pub target_table: String,
    pub target_column: String,
}

/// Per-column statistics from `analyze_column_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStat {
    pub column: String,
    pub row_count: i64,
    pub non_null_count: i64,
    pub distinct_count: i64,
}

/// Result of `check_value_overlap`: a cheap sampled estimate used as the
/// first gate in join verification (§4.8 step 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueOverlap {
    /// Fraction of sampled source distinct values present in the target, in
    /// `[0.0, 1.0]`.
    pub match_rate: f64,
    pub source_distinct: i64,
    pub target_distinct: i64,
    pub matched_count: i64,
}

/// Result of `analyze_join`: the full join performed by the probe, used for
/// direction, orphan, and cardinality inference (§4.8 steps 3-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAnalysis {
    pub join_count: i64,
    pub source_matched: i64,
    pub target_matched: i64,
    pub orphan_count: i64,
    pub reverse_orphan_count: i64,
}

/// Maximum columns `analyze_column_stats` guarantees support for in a
/// single call; callers chunk larger column sets themselves (§6).
pub const MAX_COLUMN_STATS_BATCH: usize = 25;

/// Default number of sample values `check_value_overlap` draws per side
/// when a caller does not override it (§4.7 step 4: "up to 10 sample
/// values from each side").
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

#[async_trait]
pub trait SchemaProbe: Send + Sync {
    /// Whether the underlying database dialect exposes a foreign-key
    /// catalog at all (some engines/views do not).
    async fn supports_foreign_keys(&self) -> Result<bool, PortError>;

    /// All foreign keys declared in the source database's catalog for the
    /// datasource this probe is bound to.
    async fn discover_foreign_keys(&self) -> Result<Vec<ForeignKeyDecl>, PortError>;

    /// Row/non-null/distinct counts for up to [`MAX_COLUMN_STATS_BATCH`]
    /// columns of one table in a single round trip.
    async fn analyze_column_stats(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<ColumnStat>, PortError>;

    /// Sampled value-overlap between a candidate source and target column.
    async fn check_value_overlap(
        &self,
        source: &ColumnRef,
        target: &ColumnRef,
        sample_limit: usize,
    ) -> Result<ValueOverlap, PortError>;

    /// Full join analysis between a candidate source and target column.
    async fn analyze_join(&self, source: &ColumnRef, target: &ColumnRef) -> Result<JoinAnalysis, PortError>;

    /// Up to `limit` distinct non-null sample values from `column`, used by
    /// the candidate collector (§4.7 step 4) to give the LLM validator
    /// prompt concrete examples without a second round trip per candidate.
    async fn sample_values(&self, column: &ColumnRef, limit: usize) -> Result<Vec<String>, PortError>;
}
