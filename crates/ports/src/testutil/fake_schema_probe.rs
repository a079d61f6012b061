//! An in-memory, fully scriptable `SchemaProbe` fake for engine tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    error::PortError,
    schema_probe::{ColumnRef, ColumnStat, ForeignKeyDecl, JoinAnalysis, SchemaProbe, ValueOverlap},
};

fn pair_key(source: &ColumnRef, target: &ColumnRef) -> (String, String) {
    (
        format!("{}.{}.{}", source.schema, source.table, source.column),
        format!("{}.{}.{}", target.schema, target.table, target.column),
    )
}

/// Every response is pre-programmed by the test; anything not configured
/// returns an empty/zeroed result rather than an error, since most tests
/// only care about a handful of column pairs.
#[derive(Clone, Default)]
pub struct FakeSchemaProbe {
    supports_fk: Arc<Mutex<bool>>,
    foreign_keys: Arc<Mutex<Vec<ForeignKeyDecl>>>,
    column_stats: Arc<Mutex<HashMap<(String, String), Vec<ColumnStat>>>>,
    value_overlaps: Arc<Mutex<HashMap<(String, String), ValueOverlap>>>,
    join_analyses: Arc<Mutex<HashMap<(String, String), JoinAnalysis>>>,
    join_failures: Arc<Mutex<Vec<(String, String)>>>,
    sample_values: Arc<Mutex<HashMap<String, Vec<String>>>>,
    /// Remaining injected failures per column, decremented on each
    /// `sample_values` call so a test can script "fails N times, then
    /// succeeds" for exercising retry/resume paths.
    sample_value_failures: Arc<Mutex<HashMap<String, usize>>>,
}

fn column_key(column: &ColumnRef) -> String {
    format!("{}.{}.{}", column.schema, column.table, column.column)
}

impl FakeSchemaProbe {
    pub fn new() -> Self {
        Self {
            supports_fk: Arc::new(Mutex::new(true)),
            ..Default::default()
        }
    }

    pub fn set_supports_foreign_keys(&self, value: bool) {
        *self.supports_fk.lock().unwrap() = value;
    }

    pub fn with_foreign_keys(self, fks: Vec<ForeignKeyDecl>) -> Self {
        *self.foreign_keys.lock().unwrap() = fks;
        self
    }

    pub fn with_column_stats(self, schema: &str, table: &str, stats: Vec<ColumnStat>) -> Self {
        self.column_stats
            .lock()
            .unwrap()
            .insert((schema.to_string(), table.to_string()), stats);
        self
    }

    pub fn with_value_overlap(self, source: &ColumnRef, target: &ColumnRef, overlap: ValueOverlap) -> Self {
        self.value_overlaps.lock().unwrap().insert(pair_key(source, target), overlap);
        self
    }

    pub fn with_join_analysis(self, source: &ColumnRef, target: &ColumnRef, analysis: JoinAnalysis) -> Self {
        self.join_analyses.lock().unwrap().insert(pair_key(source, target), analysis);
        self
    }

    /// Force `analyze_join` to return an error for this pair, for testing
    /// the `JoinFailed` path.
    pub fn with_join_failure(self, source: &ColumnRef, target: &ColumnRef) -> Self {
        self.join_failures.lock().unwrap().push(pair_key(source, target));
        self
    }

    pub fn with_sample_values(self, column: &ColumnRef, values: Vec<String>) -> Self {
        self.sample_values.lock().unwrap().insert(column_key(column), values);
        self
    }

    /// Makes `sample_values` fail the next `count` calls for `column`
    /// before returning its configured (or empty) values.
    pub fn with_sample_values_failures(self, column: &ColumnRef, count: usize) -> Self {
        self.sample_value_failures.lock().unwrap().insert(column_key(column), count);
        self
    }
}

#[async_trait]
impl SchemaProbe for FakeSchemaProbe {
    async fn supports_foreign_keys(&self) -> Result<bool, PortError> {
        Ok(*self.supports_fk.lock().unwrap())
    }

    async fn discover_foreign_keys(&self) -> Result<Vec<ForeignKeyDecl>, PortError> {
        Ok(self.foreign_keys.lock().unwrap().clone())
    }

    async fn analyze_column_stats(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<ColumnStat>, PortError> {
        let all = self
            .column_stats
            .lock()
            .unwrap()
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(all.into_iter().filter(|s| columns.contains(&s.column)).collect())
    }

    async fn check_value_overlap(
        &self,
        source: &ColumnRef,
        target: &ColumnRef,
        _sample_limit: usize,
    ) -> Result<ValueOverlap, PortError> {
        Ok(self
            .value_overlaps
            .lock()
            .unwrap()
            .get(&pair_key(source, target))
            .copied()
            .unwrap_or(ValueOverlap {
                match_rate: 0.0,
                source_distinct: 0,
                target_distinct: 0,
                matched_count: 0,
            }))
    }

    async fn analyze_join(&self, source: &ColumnRef, target: &ColumnRef) -> Result<JoinAnalysis, PortError> {
        let key = pair_key(source, target);
        if self.join_failures.lock().unwrap().contains(&key) {
            return Err(PortError::Database("simulated join failure".to_string()));
        }
        Ok(self.join_analyses.lock().unwrap().get(&key).copied().unwrap_or(JoinAnalysis {
            join_count: 0,
            source_matched: 0,
            target_matched: 0,
            orphan_count: 0,
            reverse_orphan_count: 0,
        }))
    }

    async fn sample_values(&self, column: &ColumnRef, limit: usize) -> Result<Vec<String>, PortError> {
        let key = column_key(column);
        let mut failures = self.sample_value_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PortError::Network("injected sample_values failure".to_string()));
            }
        }
        drop(failures);

        let mut values = self.sample_values.lock().unwrap().get(&key).cloned().unwrap_or_default();
        values.truncate(limit);
        Ok(values)
    }
}
