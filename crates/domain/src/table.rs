//! `Table` — a discovered table in a tenant's datasource (§3).

use serde::{Deserialize, Serialize};

use crate::ids::{DatasourceId, ProjectId, TableId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub project_id: ProjectId,
    pub datasource_id: DatasourceId,
    pub schema: String,
    pub name: String,
    pub row_count: Option<i64>,
    /// Whether this table is in scope for discovery. Deselected tables are
    /// skipped by the candidate collector.
    pub selected: bool,
}

impl Table {
    /// The `schema.name` qualified identifier used by `TableGraph` nodes and
    /// by the semantic filter's entity-stem comparisons.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(schema: &str, name: &str) -> Table {
        Table {
            id: TableId::new(),
            project_id: ProjectId::new(),
            datasource_id: DatasourceId::new(),
            schema: schema.to_string(),
            name: name.to_string(),
            row_count: None,
            selected: true,
        }
    }

    #[test]
    fn qualified_name_joins_schema_and_name() {
        assert_eq!(table("public", "orders").qualified_name(), "public.orders");
    }
}
