#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use rusqlite::Connection;
use rust_xlsxwriter::Workbook;
use sheet_recon::data::Value;
use sheet_recon::source::{MemoryExecutor, QueryResult, SourceCatalog};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes an xlsx export with one worksheet per fixture sheet.
    pub fn write_workbook(&self, name: &str, sheets: &[FixtureSheet]) -> PathBuf {
        let path = self.join(name);
        let mut workbook = Workbook::new();
        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet.name).expect("sheet name");
            for (col, header) in sheet.headers.iter().enumerate() {
                worksheet
                    .write_string(0, col as u16, *header)
                    .expect("write header");
            }
            for (row_idx, row) in sheet.rows.iter().enumerate() {
                let row_num = (row_idx + 1) as u32;
                for (col, value) in row.iter().enumerate() {
                    let col = col as u16;
                    match value {
                        Value::Null => {}
                        Value::Integer(i) => {
                            worksheet.write_number(row_num, col, *i as f64).expect("write number");
                        }
                        Value::Float(f) => {
                            worksheet.write_number(row_num, col, *f).expect("write number");
                        }
                        other => {
                            worksheet
                                .write_string(row_num, col, other.as_display())
                                .expect("write string");
                        }
                    }
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }
}

pub struct FixtureSheet {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
}

impl FixtureSheet {
    pub fn new(name: &'static str, headers: &[&'static str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            name,
            headers: headers.to_vec(),
            rows,
        }
    }
}

pub fn text(value: &str) -> Value {
    Value::from(value)
}

pub fn num(value: i64) -> Value {
    Value::Integer(value)
}

pub fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Four sheets: a monthly trend, a store/target sheet, a weekday/weekend
/// trend and one sheet no source can back.
pub fn dashboard_sheets() -> Vec<FixtureSheet> {
    vec![
        FixtureSheet::new(
            "Sales Trends",
            &["Identifier", "Actual Sales"],
            vec![vec![text("Jan"), num(1000)], vec![text("Feb"), num(1200)]],
        ),
        FixtureSheet::new(
            "Store Sales",
            &["Identifier", "Actual Sales", "Target"],
            vec![vec![text("Love Library"), text("1,500"), num(2000)]],
        ),
        FixtureSheet::new(
            "Weekly Trends",
            &["Identifier", "Previous Year", "Current Year"],
            vec![
                vec![text("WEEKDAY"), num(700), num(800)],
                vec![text("WEEKEND"), num(300), num(350)],
            ],
        ),
        FixtureSheet::new("Odd", &["foo", "bar"], vec![vec![text("x"), num(1)]]),
    ]
}

/// Sources backing [`dashboard_sheets`]. February and the store target
/// disagree with the export on purpose.
pub fn dashboard_executor() -> MemoryExecutor {
    MemoryExecutor::new()
        .with_result(
            "SalesTrend",
            QueryResult::new(
                columns(&["Month", "CurrentYearSales", "PreviousYearSales"]),
                vec![
                    vec![text("January"), num(1000), num(900)],
                    vec![text("February"), num(1250), num(1100)],
                ],
            ),
        )
        .with_result(
            "StorewiseActualVsTarget_Vertical_SortedByActual",
            QueryResult::new(
                columns(&["StoreName", "ActualSales", "Target"]),
                vec![vec![text("Love Library"), Value::Float(1500.0), num(1800)]],
            ),
        )
        .with_result(
            "TopStoresbySales",
            QueryResult::new(
                columns(&["StoreName", "Sales"]),
                vec![vec![text("Love Library"), num(1500)]],
            ),
        )
        .with_result(
            "WeeklyTrendswidget",
            QueryResult::new(
                columns(&["Week", "CurrentYearSales", "PreviousYearSales"]),
                vec![
                    vec![text("WEEKDAY"), num(800), num(700)],
                    vec![text("WEEKEND"), num(350), num(300)],
                ],
            ),
        )
        .with_failure("TopBrandsBySales", "connection reset")
}

/// SQLite database and source catalog equivalent to [`dashboard_executor`]
/// for the sources the CLI tests need.
pub fn write_dashboard_db(workspace: &TestWorkspace) -> (PathBuf, PathBuf) {
    let db = workspace.join("dashboard.db");
    let conn = Connection::open(&db).expect("open db");
    conn.execute_batch(
        "CREATE TABLE monthly (year INTEGER, month TEXT, current REAL, previous REAL, seq INTEGER);
         INSERT INTO monthly VALUES (2024, 'January', 1000, 900, 1);
         INSERT INTO monthly VALUES (2024, 'February', 1250, 1100, 2);
         CREATE TABLE stores (year INTEGER, store_id TEXT, name TEXT, actual REAL, target REAL);
         INSERT INTO stores VALUES (2024, '717', 'Love Library', 1500, 1800);",
    )
    .expect("seed db");

    let mut catalog = SourceCatalog::default();
    catalog.insert(
        "SalesTrend",
        "SELECT month AS Month, current AS CurrentYearSales, previous AS PreviousYearSales \
         FROM monthly WHERE year = :year ORDER BY seq",
    );
    catalog.insert(
        "StorewiseActualVsTarget_Vertical_SortedByActual",
        "SELECT name AS StoreName, actual AS ActualSales, target AS Target FROM stores \
         WHERE year = ?1 AND (?3 IS NULL OR store_id = ?3) ORDER BY actual DESC",
    );
    let queries = workspace.join("queries.yml");
    catalog.save(&queries).expect("save catalog");
    (db, queries)
}

/// Cell texts of one worksheet in a written report.
pub fn read_sheet(path: &Path, name: &str) -> Vec<Vec<String>> {
    let mut workbook = open_workbook_auto(path).expect("open report");
    let range = workbook.worksheet_range(name).expect("report sheet");
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

pub fn sheet_names(path: &Path) -> Vec<String> {
    open_workbook_auto(path)
        .expect("open report")
        .sheet_names()
        .to_vec()
}
