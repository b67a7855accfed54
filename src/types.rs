use crate::error::{EtlError, Result};
use std::collections::HashSet;

/// A single cell. `None` is a null and is written as an empty field.
pub type Cell = Option<String>;

/// Homogeneous flat records sharing one header.
///
/// Column order only matters for encoding; lookups always go by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RowSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut set = Self { columns, rows: Vec::with_capacity(rows.len()) };
        for row in rows {
            set.push(row)?;
        }
        Ok(set)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a row; its width must match the header.
    pub fn push(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::Config(format!(
                "row has {} cells but the row-set has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Concatenate another row-set with the same header onto this one.
    pub fn extend(&mut self, other: RowSet) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.columns != self.columns {
            return Err(EtlError::Config(format!(
                "cannot concatenate row-sets with headers {:?} and {:?}",
                self.columns, other.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Drop rows that are equal to an earlier row, keeping first occurrences in order.
    pub fn dedup(&mut self) {
        let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(self.rows.len());
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Replace every value of `name` with `f(values)`. Returns false if the column is absent.
    pub fn map_column<F>(&mut self, name: &str, f: F) -> bool
    where
        F: FnOnce(Vec<Cell>) -> Vec<Cell>,
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        let values: Vec<Cell> = self.rows.iter_mut().map(|r| r[idx].take()).collect();
        for (row, value) in self.rows.iter_mut().zip(f(values)) {
            row[idx] = value;
        }
        true
    }

    /// Set `name` to `value` on every row, adding the column if needed.
    pub fn set_constant_column(&mut self, name: &str, value: &str) {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = Some(value.to_string());
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Some(value.to_string()));
                }
            }
        }
    }

    /// Project onto `columns`, in that order. Missing columns come back as nulls.
    pub fn select(&self, columns: &[String]) -> RowSet {
        let indexes: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indexes.iter().map(|i| i.and_then(|i| row[i].clone())).collect())
            .collect();
        RowSet { columns: columns.to_vec(), rows }
    }
}

/// What one extraction produced, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// Endpoints with a single output (contacts, users).
    OneDataset(RowSet),
    /// Endpoints that fan out into several named outputs (call logs).
    ManyDatasets(Vec<(String, RowSet)>),
}

impl ExtractionResult {
    /// True when nothing at all was extracted, so downstream stages can be skipped.
    pub fn is_empty(&self) -> bool {
        match self {
            ExtractionResult::OneDataset(rows) => rows.is_empty(),
            ExtractionResult::ManyDatasets(sets) => sets.iter().all(|(_, rows)| rows.is_empty()),
        }
    }

    pub fn total_rows(&self) -> usize {
        match self {
            ExtractionResult::OneDataset(rows) => rows.len(),
            ExtractionResult::ManyDatasets(sets) => sets.iter().map(|(_, rows)| rows.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut set = RowSet::new(["id", "direction"]);
        set.push(vec![cell("a"), cell("inbound")]).unwrap();
        set.push(vec![cell("b"), None]).unwrap();
        set.push(vec![cell("a"), cell("inbound")]).unwrap();
        set.push(vec![cell("a"), cell("outbound")]).unwrap();
        set.dedup();

        assert_eq!(set.len(), 3);
        assert_eq!(set.value(2, "direction"), Some(&cell("outbound")));
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut set = RowSet::new(["id"]);
        assert!(set.push(vec![cell("a"), cell("b")]).is_err());
    }

    #[test]
    fn test_extend_into_default_takes_header() {
        let mut acc = RowSet::default();
        let mut page = RowSet::new(["id"]);
        page.push(vec![cell("1")]).unwrap();
        acc.extend(page.clone()).unwrap();
        acc.extend(page).unwrap();
        assert_eq!(acc.columns(), &["id".to_string()]);
        assert_eq!(acc.len(), 2);

        assert!(acc.extend(RowSet::new(["other"])).is_err());
    }

    #[test]
    fn test_set_constant_column_overwrites_existing() {
        let mut set = RowSet::new(["id"]);
        set.push(vec![cell("1")]).unwrap();
        set.set_constant_column("stamp", "t1");
        set.set_constant_column("stamp", "t2");
        assert_eq!(set.columns().len(), 2);
        assert_eq!(set.value(0, "stamp"), Some(&cell("t2")));
    }

    #[test]
    fn test_select_fills_missing_with_null() {
        let mut set = RowSet::new(["id", "name"]);
        set.push(vec![cell("1"), cell("x")]).unwrap();
        let projected = set.select(&["name".to_string(), "missing".to_string()]);
        assert_eq!(projected.rows()[0], vec![cell("x"), None]);
    }

    #[test]
    fn test_many_datasets_empty_only_when_all_empty() {
        let mut filled = RowSet::new(["id"]);
        filled.push(vec![cell("1")]).unwrap();
        let result = ExtractionResult::ManyDatasets(vec![
            ("a".to_string(), RowSet::new(["id"])),
            ("b".to_string(), filled),
        ]);
        assert!(!result.is_empty());
        assert_eq!(result.total_rows(), 1);
        assert!(ExtractionResult::ManyDatasets(vec![]).is_empty());
        assert!(ExtractionResult::OneDataset(RowSet::new(["id"])).is_empty());
    }
}
