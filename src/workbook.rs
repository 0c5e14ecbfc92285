//! Loading an exported workbook into plain [`SheetData`] tables.
//!
//! Row 1 of every sheet is the header row and data starts at row 2. Sheets
//! that cannot be read or have no header row are recorded as skipped rather
//! than failing the whole load.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use log::{debug, warn};
use serde::Serialize;

use crate::{
    data::{NULL_VALUE, Value},
    error::ReconError,
    io_utils,
};

#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SheetData {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// The sheet name as used in flat keys.
    pub fn label(&self) -> &str {
        self.name.trim()
    }

    pub fn cell<'a>(row: &'a [Value], index: usize) -> &'a Value {
        row.get(index).unwrap_or(&NULL_VALUE)
    }

    pub fn is_blank_row(row: &[Value]) -> bool {
        row.iter().all(Value::is_blank)
    }

    pub fn data_rows(&self) -> impl Iterator<Item = &Vec<Value>> {
        self.rows.iter().filter(|row| !Self::is_blank_row(row))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSheet {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExportWorkbook {
    pub path: PathBuf,
    pub sheets: Vec<SheetData>,
    pub skipped: Vec<SkippedSheet>,
}

/// Reads an export. Workbook formats (xlsx, xlsm, xls, ods) go through
/// calamine; `.csv`/`.tsv` files load as a single sheet named after the file
/// stem.
pub fn load_export(path: &Path, input_encoding: Option<&str>) -> Result<ExportWorkbook> {
    if io_utils::is_delimited_text(path) {
        return load_delimited(path, input_encoding);
    }

    let mut workbook = open_workbook_auto(path).map_err(|err| ReconError::UnreadableExport {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(ReconError::EmptyExport(path.to_path_buf()).into());
    }

    let mut sheets = Vec::new();
    let mut skipped = Vec::new();
    for sheet_name in &sheet_names {
        let range = match workbook.worksheet_range(sheet_name) {
            Ok(range) => range,
            Err(err) => {
                warn!("Skipping sheet '{sheet_name}': unreadable ({err})");
                skipped.push(SkippedSheet {
                    name: sheet_name.clone(),
                    reason: format!("unreadable: {err}"),
                });
                continue;
            }
        };

        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        if range.is_empty() || start_row > 0 {
            warn!("Skipping sheet '{sheet_name}': no header row");
            skipped.push(SkippedSheet {
                name: sheet_name.clone(),
                reason: "no header row".to_string(),
            });
            continue;
        }

        let mut grid = range.rows().map(|row| {
            let mut values = vec![Value::Null; start_col as usize];
            values.extend(row.iter().map(cell_to_value));
            values
        });
        let headers = grid
            .next()
            .map(|row| row.iter().map(header_from_value).collect::<Vec<_>>())
            .unwrap_or_default();
        if headers.iter().all(|h| h.is_empty()) {
            warn!("Skipping sheet '{sheet_name}': header row is blank");
            skipped.push(SkippedSheet {
                name: sheet_name.clone(),
                reason: "no header row".to_string(),
            });
            continue;
        }
        let rows = grid.collect::<Vec<_>>();
        debug!(
            "Loaded sheet '{}' with {} header(s) and {} row(s)",
            sheet_name,
            headers.len(),
            rows.len()
        );
        sheets.push(SheetData::new(sheet_name.clone(), headers, rows));
    }

    Ok(ExportWorkbook {
        path: path.to_path_buf(),
        sheets,
        skipped,
    })
}

fn load_delimited(path: &Path, input_encoding: Option<&str>) -> Result<ExportWorkbook> {
    let encoding = io_utils::resolve_encoding(input_encoding)?;
    let delimiter = io_utils::resolve_input_delimiter(path);
    let mut reader = io_utils::open_csv_reader(path, delimiter).map_err(|err| {
        ReconError::UnreadableExport {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    })?;

    let mut records = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", idx + 1))?;
        records.push(io_utils::decode_record(&record, encoding)?);
    }

    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    let mut records = records.into_iter();
    let Some(header_record) = records.next() else {
        return Err(ReconError::EmptyExport(path.to_path_buf()).into());
    };
    let headers = header_record
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    let rows = records
        .map(|record| {
            record
                .into_iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Value::Null
                    } else {
                        Value::String(field)
                    }
                })
                .collect()
        })
        .collect();

    Ok(ExportWorkbook {
        path: path.to_path_buf(),
        sheets: vec![SheetData::new(name, headers, rows)],
        skipped: Vec::new(),
    })
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => {
            if s.is_empty() {
                Value::Null
            } else {
                Value::String(s.clone())
            }
        }
        Data::Float(f) => Value::Float(*f),
        Data::Int(i) => Value::Integer(*i),
        Data::Bool(b) => Value::Boolean(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.time() == chrono::NaiveTime::MIN => Value::Date(value.date()),
            Some(value) => Value::DateTime(value),
            None => Value::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#{e:?}")),
    }
}

fn header_from_value(value: &Value) -> String {
    value.as_display().trim().to_string()
}
