//! SQL statements for the staging load and the keyed upsert, rendered from
//! schema, table, business key and field list.

use crate::warehouse::TableRef;

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

pub fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.table))
}

pub fn drop_table(table: &TableRef) -> String {
    format!("DROP TABLE IF EXISTS {}", qualified(table))
}

/// Every column is stored as text, matching the tabular blobs.
pub fn create_table(table: &TableRef, columns: &[String]) -> String {
    let defs: Vec<String> = columns.iter().map(|c| format!("{} TEXT", quote_ident(c))).collect();
    format!("CREATE TABLE IF NOT EXISTS {} ({})", qualified(table), defs.join(", "))
}

/// Unique index on the business key. NULLs never collide in it, so the merge
/// itself matches keys with `IS`.
pub fn create_key_index(table: &TableRef, key: &[String]) -> String {
    let index = format!("ux_{}_{}", table.table, key.join("_"));
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {}.{} ON {} ({})",
        quote_ident(&table.schema),
        quote_ident(&index),
        quote_ident(&table.table),
        column_list(key)
    )
}

pub fn add_column(table: &TableRef, column: &str) -> String {
    format!("ALTER TABLE {} ADD COLUMN {} TEXT", qualified(table), quote_ident(column))
}

pub fn insert_row(table: &TableRef, columns: &[String]) -> String {
    let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", qualified(table), column_list(columns), placeholders)
}

/// `a.k1 IS b.k1 AND a.k2 IS b.k2 ...`: key equality where NULL matches NULL.
fn key_match(left: &str, right: &str, key: &[String]) -> String {
    key.iter()
        .map(|k| format!("{left}.{col} IS {right}.{col}", col = quote_ident(k)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Overwrite the non-key columns of every production row whose key is staged,
/// taking the values of the last staged row with that key. `None` when there
/// are no non-key columns to write.
pub fn update_matched(staging: &TableRef, production: &TableRef, key: &[String], columns: &[String]) -> Option<String> {
    let stg = qualified(staging);
    let matched = key_match("s", "p", key);
    let sets: Vec<String> = columns
        .iter()
        .filter(|c| !key.contains(c))
        .map(|c| {
            format!(
                "{col} = (SELECT s.{col} FROM {stg} AS s WHERE {matched} ORDER BY s.rowid DESC LIMIT 1)",
                col = quote_ident(c)
            )
        })
        .collect();
    if sets.is_empty() {
        return None;
    }
    Some(format!(
        "UPDATE {prod} AS p SET {sets} WHERE EXISTS (SELECT 1 FROM {stg} AS s WHERE {matched})",
        prod = qualified(production),
        sets = sets.join(", "),
    ))
}

/// Insert the last staged row of every key that production does not hold yet,
/// in load order.
pub fn insert_unmatched(staging: &TableRef, production: &TableRef, key: &[String], columns: &[String]) -> String {
    let stg = qualified(staging);
    let prod = qualified(production);
    let select = columns.iter().map(|c| format!("s.{}", quote_ident(c))).collect::<Vec<_>>().join(", ");
    format!(
        "INSERT INTO {prod} ({cols}) SELECT {select} FROM {stg} AS s \
         WHERE s.rowid = (SELECT MAX(l.rowid) FROM {stg} AS l WHERE {latest}) \
         AND NOT EXISTS (SELECT 1 FROM {prod} AS p WHERE {present}) ORDER BY s.rowid",
        cols = column_list(columns),
        latest = key_match("l", "s", key),
        present = key_match("p", "s", key),
    )
}
