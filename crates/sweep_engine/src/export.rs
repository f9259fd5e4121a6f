use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value};
use sweep_core::Record;

use crate::persist::{AtomicFileWriter, PersistError};
use crate::threads::{ThreadRow, THREAD_HEADERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub row_count: usize,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported export format `{0}` (expected csv or json)")]
    UnsupportedFormat(String),
}

/// Rectangular export data: a header row and rows of the same width.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// One row per record. Columns are the union of field names in first-seen order.
    pub fn from_records(records: &[Record]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for record in records {
            for (name, _) in record.fields() {
                if !headers.iter().any(|h| h == name) {
                    headers.push(name.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|h| record.get(h).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn from_thread_rows(rows: &[ThreadRow]) -> Self {
        Self {
            headers: THREAD_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: rows.iter().map(|row| row.cells().to_vec()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// RFC 4180 with CRLF line endings and a UTF-8 BOM so spreadsheet apps pick the encoding.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("\u{feff}");
        push_csv_line(&mut out, &self.headers);
        for row in &self.rows {
            push_csv_line(&mut out, row);
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let objects: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(h, v)| (h.clone(), Value::String(v.clone())))
                    .collect();
                Value::Object(object)
            })
            .collect();
        serde_json::to_string_pretty(&objects)
    }
}

fn push_csv_line(out: &mut String, cells: &[String]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push_str("\r\n");
}

pub fn write_export(
    output_dir: &Path,
    filename: &str,
    table: &Table,
    format: ExportFormat,
) -> Result<ExportSummary, ExportError> {
    let content = match format {
        ExportFormat::Csv => table.to_csv(),
        ExportFormat::Json => table.to_json()?,
    };
    let path = AtomicFileWriter::new(output_dir.to_path_buf()).write(filename, &content)?;
    Ok(ExportSummary {
        row_count: table.len(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quotes_only_when_needed() {
        let table = Table {
            headers: vec!["name".into(), "note".into()],
            rows: vec![vec!["Ann".into(), "said \"hi\", left".into()]],
        };
        assert_eq!(
            table.to_csv(),
            "\u{feff}name,note\r\nAnn,\"said \"\"hi\"\", left\"\r\n"
        );
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }
}
