//! The data-source capability consumed by the prober.
//!
//! Sources are named, parameterized queries. The engine never holds a
//! connection of its own; everything goes through a [`SourceExecutor`]
//! passed in by the caller.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{
    Connection, OpenFlags,
    types::{Value as SqlValue, ValueRef},
};
use serde::{Deserialize, Serialize};

use crate::{
    data::{NULL_VALUE, Value, compact_name},
    error::SourceError,
    params::{PARAMETER_NAMES, Parameters},
    workbook::SheetData,
};

/// Columns and rows returned by one source execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Case- and separator-insensitive exact column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = compact_name(name);
        self.columns.iter().position(|c| compact_name(c) == wanted)
    }

    pub fn first_row(&self) -> Option<&[Value]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, column: usize) -> &Value {
        self.rows
            .get(row)
            .map(|r| SheetData::cell(r, column))
            .unwrap_or(&NULL_VALUE)
    }
}

pub trait SourceExecutor: Send + Sync {
    /// Runs `name` with the 7-field parameter tuple.
    fn execute(&self, name: &str, params: &Parameters) -> Result<QueryResult, SourceError>;
}

/// Source name to SQL text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCatalog {
    pub sources: BTreeMap<String, String>,
}

impl SourceCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening source catalog {path:?}"))?;
        let reader = BufReader::new(file);
        let catalog: SourceCatalog =
            serde_yaml::from_reader(reader).context("Parsing source catalog YAML")?;
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating source catalog {path:?}"))?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self).context("Writing source catalog YAML")
    }

    pub fn insert(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        self.sources.insert(name.into(), sql.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }
}

/// Runs catalog queries against a SQLite database file. Each execution opens
/// its own read-only connection so probes can run on separate threads.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    db_path: PathBuf,
    catalog: SourceCatalog,
}

impl SqliteExecutor {
    pub fn new(db_path: impl Into<PathBuf>, catalog: SourceCatalog) -> Self {
        Self {
            db_path: db_path.into(),
            catalog,
        }
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    fn open(&self, name: &str) -> Result<Connection, SourceError> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| SourceError::execution(name, err))
    }
}

impl SourceExecutor for SqliteExecutor {
    fn execute(&self, name: &str, params: &Parameters) -> Result<QueryResult, SourceError> {
        let sql = self
            .catalog
            .get(name)
            .ok_or_else(|| SourceError::Unknown(name.to_string()))?;
        let conn = self.open(name)?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|err| SourceError::execution(name, err))?;

        let values = params.to_values();
        let named = PARAMETER_NAMES
            .iter()
            .enumerate()
            .filter_map(|(pos, bind_name)| match stmt.parameter_index(bind_name) {
                Ok(Some(index)) => Some((index, pos)),
                _ => None,
            })
            .collect::<Vec<_>>();

        if named.is_empty() {
            let count = stmt.parameter_count();
            if count > values.len() {
                return Err(SourceError::InvalidParameter {
                    name: name.to_string(),
                    parameter: format!("?{count}"),
                });
            }
            debug!("Binding {count} positional parameter(s) for '{name}'");
            for (index, value) in values.iter().enumerate().take(count) {
                stmt.raw_bind_parameter(index + 1, to_sql_value(value))
                    .map_err(|err| SourceError::execution(name, err))?;
            }
        } else {
            debug!("Binding {} named parameter(s) for '{name}'", named.len());
            for (index, pos) in named {
                stmt.raw_bind_parameter(index, to_sql_value(&values[pos]))
                    .map_err(|err| SourceError::execution(name, err))?;
            }
        }

        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor
            .next()
            .map_err(|err| SourceError::execution(name, err))?
        {
            let mut cells = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let cell = row
                    .get_ref(idx)
                    .map_err(|err| SourceError::execution(name, err))?;
                cells.push(from_sql_value(cell));
            }
            rows.push(cells);
        }
        Ok(QueryResult { columns, rows })
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Date(_) | Value::DateTime(_) => SqlValue::Text(value.as_display()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} byte blob>", bytes.len())),
    }
}

/// Fixed results keyed by source name. Useful for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    results: BTreeMap<String, std::result::Result<QueryResult, String>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, name: impl Into<String>, result: QueryResult) -> Self {
        self.results.insert(name.into(), Ok(result));
        self
    }

    pub fn with_failure(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.results.insert(name.into(), Err(message.into()));
        self
    }
}

impl SourceExecutor for MemoryExecutor {
    fn execute(&self, name: &str, _params: &Parameters) -> Result<QueryResult, SourceError> {
        match self.results.get(name) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(SourceError::execution(name, message)),
            None => Err(SourceError::Unknown(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sales.db");
        let conn = Connection::open(&path).expect("open db");
        conn.execute_batch(
            "CREATE TABLE store_sales (year INTEGER, store TEXT, name TEXT, sales REAL);
             INSERT INTO store_sales VALUES (2024, '717', 'Love Library', 1200.5);
             INSERT INTO store_sales VALUES (2024, '512', 'Book Nook', 800);
             INSERT INTO store_sales VALUES (2023, '717', 'Love Library', 999);",
        )
        .expect("seed db");
        (dir, path)
    }

    #[test]
    fn named_parameters_bind_by_name() {
        let (_dir, path) = sample_db();
        let mut catalog = SourceCatalog::default();
        catalog.insert(
            "TopStoresbySales",
            "SELECT name AS StoreName, sales AS Sales FROM store_sales \
             WHERE year = :year AND (:store IS NULL OR store = :store) ORDER BY sales DESC",
        );
        let executor = SqliteExecutor::new(&path, catalog);
        let result = executor
            .execute("TopStoresbySales", &Parameters::for_year(2024).with_store("717"))
            .expect("query runs");
        assert_eq!(result.columns, vec!["StoreName", "Sales"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][1], Value::Float(1200.5));
    }

    #[test]
    fn positional_parameters_are_truncated_to_statement() {
        let (_dir, path) = sample_db();
        let mut catalog = SourceCatalog::default();
        catalog.insert(
            "SalesByYear",
            "SELECT name, sales FROM store_sales WHERE year = ?1 ORDER BY name",
        );
        let executor = SqliteExecutor::new(&path, catalog);
        let result = executor
            .execute("SalesByYear", &Parameters::for_year(2024))
            .expect("query runs");
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][0], Value::from("Book Nook"));
    }

    #[test]
    fn unknown_and_broken_sources_are_typed_errors() {
        let (_dir, path) = sample_db();
        let mut catalog = SourceCatalog::default();
        catalog.insert("Broken", "SELECT * FROM missing_table");
        let executor = SqliteExecutor::new(&path, catalog);
        let params = Parameters::for_year(2024);
        assert!(executor.execute("Nope", &params).unwrap_err().is_missing());
        let err = executor.execute("Broken", &params).unwrap_err();
        assert!(!err.is_missing());
        assert!(err.to_string().contains("missing_table"));
    }

    #[test]
    fn memory_executor_returns_configured_outcomes() {
        let executor = MemoryExecutor::new()
            .with_result("A", QueryResult::new(vec!["x".into()], vec![]))
            .with_failure("B", "timeout");
        let params = Parameters::default();
        assert!(executor.execute("A", &params).is_ok());
        assert!(executor.execute("B", &params).is_err());
        assert!(executor.execute("C", &params).unwrap_err().is_missing());
    }
}
