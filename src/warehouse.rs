pub mod sql;
pub mod sqlite;

use crate::error::Result;
use crate::types::RowSet;
use async_trait::async_trait;

pub use sqlite::SqliteWarehouse;

/// `schema.table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self { schema: schema.into(), table: table.into() }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Relational sink: a transient staging table per output and a keyed production table.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Replace the contents of `staging` with `rows`. Returns the number of rows loaded.
    async fn load_staging(&self, staging: &TableRef, rows: RowSet) -> Result<usize>;

    /// Merge all rows of `staging` into `production`, matching on `key`.
    /// Returns the number of rows inserted or updated.
    async fn upsert(&self, staging: &TableRef, production: &TableRef, key: &[String]) -> Result<usize>;

    /// Full contents of a table, in insertion order.
    async fn read_table(&self, table: &TableRef) -> Result<RowSet>;
}
