use feedback_lens_common::{FeedbackLensError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single decoded spreadsheet value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Cell::Empty => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Empty => Ok(()),
            // integral values print without a fractional part
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_owned())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Number(n as f64)
    }
}

/// Rectangular view of a worksheet: header row plus data rows, every row header-wide.
#[derive(Debug, Clone)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
    index: HashMap<String, usize>,
}

impl Table {
    /// First row becomes the header; remaining rows are padded (or cut) to header width.
    pub fn from_rows(mut raw: Vec<Vec<Cell>>) -> Self {
        if raw.is_empty() {
            return Self::new(Vec::new(), Vec::new());
        }
        let header = raw.remove(0).iter().map(|c| c.to_string()).collect();
        Self::new(header, raw)
    }

    pub fn new(header: Vec<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = header.len();
        for row in &mut rows {
            row.resize(width, Cell::Empty);
        }
        let mut index = HashMap::with_capacity(width);
        for (i, name) in header.iter().enumerate() {
            // duplicate names resolve to the first column
            index.entry(name.clone()).or_insert(i);
        }
        Self { header, rows, index }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn data_rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Data row count (header excluded).
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| FeedbackLensError::FieldNotFound(name.to_owned()))
    }

    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    /// First header whose name contains `needle`, case-insensitive.
    pub fn find_field_containing(&self, needle: &str) -> Option<&str> {
        let needle = needle.to_lowercase();
        self.header
            .iter()
            .find(|h| h.to_lowercase().contains(&needle))
            .map(String::as_str)
    }

    /// Sub-table with the same header and only rows matching `keep`.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Cell]) -> bool,
    {
        let rows = self.rows.iter().filter(|r| keep(r)).cloned().collect();
        Self {
            header: self.header.clone(),
            rows,
            index: self.index.clone(),
        }
    }
}
