use crate::error::{EtlError, Result};
use crate::types::{Cell, RowSet};
use crate::warehouse::sql::{self, quote_ident};
use crate::warehouse::{TableRef, Warehouse};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Warehouse on SQLite. Each schema is a database attached under its own name:
/// a sibling file `<stem>_<schema>.db` next to the main file, or a private
/// in-memory database when the path is `:memory:`.
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWarehouse {
    pub fn open(path: &str, schemas: &[&str]) -> Result<Self> {
        let in_memory = path == ":memory:";
        let conn = if in_memory {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        };

        for schema in schemas {
            if *schema == "main" {
                continue;
            }
            let file = if in_memory { ":memory:".to_string() } else { schema_file(path, schema) };
            conn.execute(&format!("ATTACH DATABASE ?1 AS {}", quote_ident(schema)), [file.as_str()])?;
            debug!("Attached schema {} ({})", schema, file);
        }
        info!("Opened warehouse at {} with schemas {:?}", path, schemas);

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory(schemas: &[&str]) -> Result<Self> {
        Self::open(":memory:", schemas)
    }

    /// Run `f` on the connection from the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await?
    }
}

fn schema_file(path: &str, schema: &str) -> String {
    let p = Path::new(path);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("warehouse");
    p.with_file_name(format!("{stem}_{schema}.db")).to_string_lossy().to_string()
}

fn table_columns(conn: &Connection, table: &TableRef) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA {}.table_info({})",
        quote_ident(&table.schema),
        quote_ident(&table.table)
    ))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn load_staging(&self, staging: &TableRef, rows: RowSet) -> Result<usize> {
        let staging = staging.clone();
        self.with_conn(move |conn| {
            let columns = rows.columns().to_vec();
            if columns.is_empty() {
                return Err(EtlError::Config(format!("no columns to load into {staging}")));
            }
            let tx = conn.transaction()?;
            tx.execute(&sql::drop_table(&staging), [])?;
            tx.execute(&sql::create_table(&staging, &columns), [])?;
            {
                let mut stmt = tx.prepare(&sql::insert_row(&staging, &columns))?;
                for row in rows.rows() {
                    stmt.execute(params_from_iter(row.iter()))?;
                }
            }
            tx.commit()?;
            debug!("Loaded {} rows into {}", rows.len(), staging);
            Ok(rows.len())
        })
        .await
    }

    async fn upsert(&self, staging: &TableRef, production: &TableRef, key: &[String]) -> Result<usize> {
        let staging = staging.clone();
        let production = production.clone();
        let key = key.to_vec();
        self.with_conn(move |conn| {
            let columns = table_columns(conn, &staging)?;
            if columns.is_empty() {
                return Err(EtlError::Config(format!("staging table {staging} does not exist")));
            }
            if let Some(missing) = key.iter().find(|k| !columns.contains(k)) {
                return Err(EtlError::Config(format!(
                    "business key column '{missing}' is not loaded in {staging}"
                )));
            }

            let tx = conn.transaction()?;
            tx.execute(&sql::create_table(&production, &columns), [])?;
            let existing = table_columns(&tx, &production)?;
            for column in columns.iter().filter(|c| !existing.contains(c)) {
                tx.execute(&sql::add_column(&production, column), [])?;
                info!("Added column {} to {}", column, production);
            }
            tx.execute(&sql::create_key_index(&production, &key), [])?;
            let updated = match sql::update_matched(&staging, &production, &key, &columns) {
                Some(update) => tx.execute(&update, [])?,
                None => 0,
            };
            let inserted = tx.execute(&sql::insert_unmatched(&staging, &production, &key, &columns), [])?;
            tx.commit()?;
            debug!("Merged {} into {}: {} updated, {} inserted", staging, production, updated, inserted);
            Ok(updated + inserted)
        })
        .await
    }

    async fn read_table(&self, table: &TableRef) -> Result<RowSet> {
        let table = table.clone();
        self.with_conn(move |conn| {
            let columns = table_columns(conn, &table)?;
            let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", sql::qualified(&table)))?;
            let width = columns.len();
            let rows = stmt
                .query_map([], |row| {
                    (0..width).map(|i| row.get::<_, Cell>(i)).collect::<rusqlite::Result<Vec<Cell>>>()
                })?
                .collect::<std::result::Result<Vec<Vec<Cell>>, _>>()?;
            RowSet::from_rows(columns, rows)
        })
        .await
    }
}
