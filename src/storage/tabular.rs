//! Delimiter-separated text encoding of row-sets: `;` separator, header row,
//! empty field for null.

use crate::error::Result;
use crate::types::{Cell, RowSet};
use csv::{ReaderBuilder, WriterBuilder};

pub const FIELD_SEPARATOR: u8 = b';';

pub fn encode(rows: &RowSet) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(FIELD_SEPARATOR)
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(rows.columns())?;
    for row in rows.rows() {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

pub fn decode(data: &[u8]) -> Result<RowSet> {
    let mut reader = ReaderBuilder::new()
        .delimiter(FIELD_SEPARATOR)
        .has_headers(true)
        .from_reader(data);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<Cell> = record
            .iter()
            .map(|field| if field.is_empty() { None } else { Some(field.to_string()) })
            .collect();
        rows.push(row);
    }

    RowSet::from_rows(columns, rows)
}
