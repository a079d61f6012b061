//! `SchemaRepository` — persisted schema catalog (tables, columns, and
//! their feature annotations) for a project's datasources.

use async_trait::async_trait;
use ontology_domain::{
    column::{Column, ColumnFeatures},
    ids::{ColumnId, DatasourceId, ProjectId, TableId},
    table::Table,
};

use crate::error::PortError;

#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Tables in scope for discovery (`selected = true`).
    async fn list_selected_tables(
        &self,
        project_id: &ProjectId,
        datasource_id: &DatasourceId,
    ) -> Result<Vec<Table>, PortError>;

    async fn list_columns(&self, project_id: &ProjectId, table_id: &TableId) -> Result<Vec<Column>, PortError>;

    async fn get_column(&self, project_id: &ProjectId, column_id: &ColumnId) -> Result<Option<Column>, PortError>;

    async fn get_table(&self, project_id: &ProjectId, table_id: &TableId) -> Result<Option<Table>, PortError>;

    /// Persist statistics gathered by the candidate collector
    /// (`distinct_count`, `non_null_count`, `row_count`) so later phases
    /// and a later restart do not re-query the probe for the same column.
    async fn update_column_stats(
        &self,
        project_id: &ProjectId,
        column_id: &ColumnId,
        distinct_count: Option<i64>,
        non_null_count: Option<i64>,
        row_count: Option<i64>,
    ) -> Result<(), PortError>;

    async fn update_column_features(
        &self,
        project_id: &ProjectId,
        column_id: &ColumnId,
        features: ColumnFeatures,
    ) -> Result<(), PortError>;
}
