//! Schema Relationship Analyzer
//!
//! Builds a column catalog from dataset metadata and infers candidate joins.
//! Two tables are considered joinable on every column name they share; no type
//! or cardinality check is made, so the result is a hint, not a foreign key.

use crate::metadata::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Candidate join between two tables on a shared column name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinEdge {
    pub left_table: String,
    pub right_table: String,
    pub column: String,
}

impl JoinEdge {
    /// Order-independent identity: (lower table, higher table, column)
    pub fn key(&self) -> (String, String, String) {
        let (a, b) = if self.left_table <= self.right_table {
            (&self.left_table, &self.right_table)
        } else {
            (&self.right_table, &self.left_table)
        };
        (a.clone(), b.clone(), self.column.clone())
    }
}

/// Columns of one table, in first-seen order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub name: String,
    pub columns: Vec<(String, String)>,
}

impl CatalogTable {
    pub fn column_type(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| ty.as_str())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_type(column).is_some()
    }
}

/// table name -> column name -> declared type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnCatalog {
    tables: Vec<CatalogTable>,
}

impl ColumnCatalog {
    pub fn tables(&self) -> &[CatalogTable] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&CatalogTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn column_type(&self, table: &str, column: &str) -> Option<&str> {
        self.table(table)?.column_type(column)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Insert or replace a table; a replaced table keeps its position
    fn upsert(&mut self, table: CatalogTable) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaAnalysis {
    pub catalog: ColumnCatalog,
    pub joins: Vec<JoinEdge>,
}

/// Build the column catalog and infer candidate joins
pub fn analyze(datasets: &[Dataset]) -> SchemaAnalysis {
    let catalog = build_catalog(datasets);
    let joins = infer_joins(&catalog);
    SchemaAnalysis { catalog, joins }
}

pub fn build_catalog(datasets: &[Dataset]) -> ColumnCatalog {
    let mut catalog = ColumnCatalog::default();

    for dataset in datasets {
        let Some(table_name) = dataset.effective_table_name() else {
            continue;
        };

        let mut columns: Vec<(String, String)> = Vec::with_capacity(dataset.columns.len());
        for column in &dataset.columns {
            if column.name.is_empty() {
                continue;
            }
            let ty = column.type_name().to_string();
            match columns.iter_mut().find(|(name, _)| *name == column.name) {
                Some(existing) => existing.1 = ty,
                None => columns.push((column.name.clone(), ty)),
            }
        }

        catalog.upsert(CatalogTable {
            name: table_name,
            columns,
        });
    }

    catalog
}

/// Pairwise intersection of column names, O(T² · C)
pub fn infer_joins(catalog: &ColumnCatalog) -> Vec<JoinEdge> {
    let tables = catalog.tables();
    let mut joins = Vec::new();

    for (i, left) in tables.iter().enumerate() {
        for right in &tables[i + 1..] {
            let right_columns: HashSet<&str> =
                right.columns.iter().map(|(name, _)| name.as_str()).collect();

            for (column, _) in &left.columns {
                if right_columns.contains(column.as_str()) {
                    joins.push(JoinEdge {
                        left_table: left.name.clone(),
                        right_table: right.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
    }

    joins
}
