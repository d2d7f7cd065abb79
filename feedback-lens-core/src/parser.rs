use crate::table::{Cell, Table};
use calamine::{Data, Reader, Xlsx};
use feedback_lens_common::{FeedbackLensError, Result, UploadConfig};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    Csv,
    Xlsx,
}

impl TabularFormat {
    /// Accepts an extension (`.csv`, `xlsx`), a file name (`data.csv`) or a MIME type.
    pub fn from_hint(hint: &str) -> Result<Self> {
        let lower = hint.trim().to_lowercase();
        match lower.as_str() {
            "text/csv" => return Ok(Self::Csv),
            XLSX_MIME => return Ok(Self::Xlsx),
            _ => {}
        }
        let ext = lower.rsplit('.').next().unwrap_or("");
        match ext {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            _ => Err(FeedbackLensError::UnsupportedFormat(hint.to_owned())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

/// Extension allow-list and size limit applied before any decoding.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed: Vec<TabularFormat>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl UploadPolicy {
    pub fn from_config(cfg: &UploadConfig) -> Self {
        let allowed = cfg
            .allowed_extensions
            .iter()
            .filter_map(|e| TabularFormat::from_hint(e).ok())
            .collect();
        Self {
            max_bytes: cfg.max_bytes,
            allowed,
        }
    }

    pub fn check(&self, bytes: &[u8], hint: &str) -> Result<TabularFormat> {
        let format = TabularFormat::from_hint(hint)?;
        if !self.allowed.contains(&format) {
            return Err(FeedbackLensError::UnsupportedFormat(hint.to_owned()));
        }
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(FeedbackLensError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(format)
    }
}

/// Decode raw upload bytes into a [`Table`]; only the first worksheet is read.
pub fn parse(bytes: &[u8], format_hint: &str) -> Result<Table> {
    let format = TabularFormat::from_hint(format_hint)?;
    parse_as(bytes, format)
}

pub fn parse_as(bytes: &[u8], format: TabularFormat) -> Result<Table> {
    let rows = match format {
        TabularFormat::Csv => read_csv_rows(bytes)?,
        TabularFormat::Xlsx => read_xlsx_rows(bytes)?,
    };
    let table = Table::from_rows(rows);
    tracing::debug!(
        format = format.extension(),
        columns = table.width(),
        records = table.record_count(),
        "parsed table"
    );
    Ok(table)
}

/// Header names only.
pub fn headers(bytes: &[u8], format_hint: &str) -> Result<Vec<String>> {
    Ok(parse(bytes, format_hint)?.header().to_vec())
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut out = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| FeedbackLensError::CorruptFile(format!("CSV row {}: {e}", i + 1)))?;
        let row = if i == 0 {
            record.iter().map(|s| Cell::Text(s.to_owned())).collect()
        } else {
            record.iter().map(csv_cell).collect()
        };
        out.push(row);
    }
    Ok(out)
}

fn csv_cell(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Empty;
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Cell::Number(n),
        _ => Cell::Text(raw.to_owned()),
    }
}

fn read_xlsx_rows(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| FeedbackLensError::CorruptFile(format!("failed to open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| FeedbackLensError::CorruptFile("no worksheet found".into()))?
        .map_err(|e| FeedbackLensError::CorruptFile(format!("failed to read worksheet: {e}")))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(xlsx_cell).collect())
        .collect())
}

fn xlsx_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()), // serial date, as spreadsheets store it
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}
