//! Report output: one worksheet per input sheet in input order, then a
//! `Summary` sheet, plus an optional JSON run summary.
//!
//! The workbook carries a fixed creation date so two runs over the same
//! inputs produce byte-identical files.

use std::{
    collections::BTreeSet,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use rust_xlsxwriter::{Color, DocProperties, ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;

use crate::{
    compare::{ComparisonRow, SheetLayout, SheetReport, Status, StatusCounts},
    config::ReportLayout,
    data::Value,
    error::ReconError,
    normalize::normalize_text,
    params::Parameters,
    workbook::SkippedSheet,
};

const MAX_SHEET_NAME: usize = 31;
const SUMMARY_SHEET: &str = "Summary";
const ROW_HEADERS: [&str; 5] = ["Identifier", "Metric", "Excel Value", "DB Value", "Status"];
const SUMMARY_HEADERS: [&str; 8] = [
    "Sheet",
    "Source",
    "Confidence",
    "Match",
    "Mismatch",
    "Not Found",
    "Other",
    "Status",
];

/// Everything one reconciliation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub export_path: PathBuf,
    pub strategy: String,
    pub parameters: Parameters,
    pub sheets: Vec<SheetReport>,
    pub skipped: Vec<SkippedSheet>,
}

impl ReconcileOutcome {
    pub fn totals(&self) -> StatusCounts {
        let mut totals = StatusCounts::default();
        for sheet in &self.sheets {
            totals.add(&sheet.counts());
        }
        totals
    }

    pub fn mapped_sheets(&self) -> usize {
        self.sheets.iter().filter(|s| s.is_mapped()).count()
    }
}

/// Allocates worksheet names: invalid characters replaced, leading and
/// trailing apostrophes dropped, truncated to 31 characters, case-insensitive
/// duplicates suffixed with ` (n)`.
#[derive(Debug, Default)]
struct SheetNames {
    used: BTreeSet<String>,
}

impl SheetNames {
    fn allocate(&mut self, name: &str) -> String {
        let cleaned: String = name
            .chars()
            .map(|c| match c {
                '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
                other => other,
            })
            .collect::<String>()
            .trim_matches(|c: char| c == '\'' || c.is_whitespace())
            .to_string();
        let base = if cleaned.is_empty() {
            "Sheet".to_string()
        } else {
            cleaned
        };
        let mut candidate = truncated(&base, MAX_SHEET_NAME);
        let mut n = 2;
        while self.used.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            candidate = format!("{}{suffix}", truncated(&base, keep));
            n += 1;
        }
        self.used.insert(candidate.to_lowercase());
        candidate
    }
}

fn truncated(name: &str, max: usize) -> String {
    let kept: String = name.chars().take(max).collect();
    kept.trim_end_matches('\'').to_string()
}

struct Formats {
    header: Format,
    mismatch: Format,
    confidence: Format,
}

impl Formats {
    fn new() -> Self {
        Formats {
            header: Format::new().set_bold(),
            mismatch: Format::new().set_font_color(Color::Red),
            confidence: Format::new().set_num_format("0.00"),
        }
    }
}

pub fn write_report(outcome: &ReconcileOutcome, layout: ReportLayout, path: &Path) -> Result<()> {
    let mut workbook = build_workbook(outcome, layout).map_err(|err| ReconError::ReportWrite {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    workbook
        .save(path)
        .map_err(|err| ReconError::ReportWrite {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
        .with_context(|| format!("Saving reconciliation report to {path:?}"))?;
    info!(
        "Report written to {path:?}: {} sheet(s), {} mapped",
        outcome.sheets.len(),
        outcome.mapped_sheets()
    );
    Ok(())
}

pub fn write_summary_json(outcome: &ReconcileOutcome, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating summary file {path:?}"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), outcome)
        .with_context(|| format!("Writing summary JSON to {path:?}"))
}

fn build_workbook(outcome: &ReconcileOutcome, layout: ReportLayout) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let formats = Formats::new();
    let mut names = SheetNames::default();
    for report in &outcome.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(names.allocate(&report.sheet_name))?;
        let rows_layout =
            layout == ReportLayout::Rows || report.layout == SheetLayout::MetricRows;
        let next_row = if rows_layout {
            write_row_layout(worksheet, report, &formats)?
        } else {
            write_structure_layout(worksheet, report, &formats)?
        };
        if report.rows.is_empty()
            && let Some(note) = &report.note
        {
            worksheet.write_string(next_row, 0, note)?;
        }
        worksheet.set_freeze_panes(1, 0)?;
    }

    let summary = workbook.add_worksheet();
    summary.set_name(names.allocate(SUMMARY_SHEET))?;
    write_summary(summary, outcome, &formats)?;
    Ok(workbook)
}

fn write_headers(worksheet: &mut Worksheet, headers: &[String], formats: &Formats) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &formats.header)?;
        worksheet.set_column_width(col as u16, (header.len() + 4).max(14) as f64)?;
    }
    Ok(())
}

fn write_excel_value(worksheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Integer(i) => {
            worksheet.write_number(row, col, *i as f64)?;
        }
        Value::Float(f) => {
            worksheet.write_number(row, col, *f)?;
        }
        other => {
            worksheet.write_string(row, col, other.as_display())?;
        }
    }
    Ok(())
}

fn write_source_value(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<&str>,
) -> Result<(), XlsxError> {
    let Some(text) = value else {
        return Ok(());
    };
    match normalize_text(text).as_f64() {
        Some(number) => worksheet.write_number(row, col, number)?,
        None => worksheet.write_string(row, col, text)?,
    };
    Ok(())
}

fn write_status(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    status: Status,
    formats: &Formats,
) -> Result<(), XlsxError> {
    if status == Status::Match {
        worksheet.write_string(row, col, status.as_str())?;
    } else {
        worksheet.write_string_with_format(row, col, status.as_str(), &formats.mismatch)?;
    }
    Ok(())
}

/// `[Identifier, Metric, Excel Value, DB Value, Status]`, one line per fact.
/// Returns the next free row.
fn write_row_layout(worksheet: &mut Worksheet, report: &SheetReport, formats: &Formats) -> Result<u32, XlsxError> {
    let headers = ROW_HEADERS.map(str::to_string);
    write_headers(worksheet, &headers, formats)?;
    let mut line = 1u32;
    for row in &report.rows {
        worksheet.write_string(line, 0, &row.identifier)?;
        worksheet.write_string(line, 1, row.metric_label())?;
        write_excel_value(worksheet, line, 2, &row.excel_value)?;
        write_source_value(worksheet, line, 3, row.source_value.as_deref())?;
        write_status(worksheet, line, 4, row.status, formats)?;
        line += 1;
    }
    Ok(line)
}

fn structure_headers(layout: SheetLayout) -> Vec<String> {
    let mut headers = vec!["Identifier".to_string()];
    match layout {
        SheetLayout::Standard | SheetLayout::MetricRows => {
            headers.extend(["Excel Value", "DB Value", "Status"].map(str::to_string));
        }
        SheetLayout::Targets | SheetLayout::YearComparison => {
            for metric in layout.metrics() {
                let label = metric.label();
                headers.push(format!("Excel {label}"));
                headers.push(format!("DB {label}"));
                headers.push(format!("{label} Status"));
            }
        }
    }
    headers
}

/// One line per sheet row, with the compared metrics side by side.
fn write_structure_layout(
    worksheet: &mut Worksheet,
    report: &SheetReport,
    formats: &Formats,
) -> Result<u32, XlsxError> {
    write_headers(worksheet, &structure_headers(report.layout), formats)?;
    let metrics = report.layout.metrics();
    let mut line = 1u32;
    for (_, group) in &report.rows.iter().chunk_by(|r| r.row) {
        let group = group.collect::<Vec<_>>();
        let Some(first) = group.first() else {
            continue;
        };
        worksheet.write_string(line, 0, &first.identifier)?;
        let slots: Vec<Option<&ComparisonRow>> = if report.layout == SheetLayout::Standard {
            vec![Some(*first)]
        } else {
            metrics
                .iter()
                .map(|m| group.iter().find(|r| &r.metric == m).copied())
                .collect()
        };
        for (slot, fact) in slots.into_iter().enumerate() {
            let Some(fact) = fact else {
                continue;
            };
            let col = (1 + slot * 3) as u16;
            write_excel_value(worksheet, line, col, &fact.excel_value)?;
            write_source_value(worksheet, line, col + 1, fact.source_value.as_deref())?;
            write_status(worksheet, line, col + 2, fact.status, formats)?;
        }
        line += 1;
    }
    Ok(line)
}

fn write_summary(worksheet: &mut Worksheet, outcome: &ReconcileOutcome, formats: &Formats) -> Result<(), XlsxError> {
    let headers = SUMMARY_HEADERS.map(str::to_string);
    write_headers(worksheet, &headers, formats)?;
    let mut line = 1u32;
    for report in &outcome.sheets {
        let counts = report.counts();
        worksheet.write_string(line, 0, &report.sheet_name)?;
        if let Some(source) = &report.source_name {
            worksheet.write_string(line, 1, source)?;
        }
        if let Some(confidence) = report.confidence {
            worksheet.write_number_with_format(line, 2, confidence, &formats.confidence)?;
        }
        worksheet.write_number(line, 3, counts.matches as f64)?;
        worksheet.write_number(line, 4, counts.mismatches as f64)?;
        worksheet.write_number(line, 5, counts.not_found as f64)?;
        worksheet.write_number(
            line,
            6,
            (counts.no_mapping + counts.source_missing + counts.source_error) as f64,
        )?;
        let status = if report.is_mapped() {
            "Compared".to_string()
        } else {
            report
                .note
                .clone()
                .unwrap_or_else(|| Status::NoMapping.as_str().to_string())
        };
        worksheet.write_string(line, 7, status)?;
        line += 1;
    }
    for skipped in &outcome.skipped {
        worksheet.write_string(line, 0, &skipped.name)?;
        worksheet.write_string(line, 7, format!("Skipped: {}", skipped.reason))?;
        line += 1;
    }

    let totals = outcome.totals();
    line += 1;
    worksheet.write_string_with_format(line, 0, "Strategy", &formats.header)?;
    worksheet.write_string(line, 1, &outcome.strategy)?;
    line += 1;
    worksheet.write_string_with_format(line, 0, "Parameters", &formats.header)?;
    worksheet.write_string(line, 1, outcome.parameters.to_string())?;
    line += 1;
    worksheet.write_string_with_format(line, 0, "Total", &formats.header)?;
    worksheet.write_number(line, 3, totals.matches as f64)?;
    worksheet.write_number(line, 4, totals.mismatches as f64)?;
    worksheet.write_number(line, 5, totals.not_found as f64)?;
    line += 1;
    worksheet.write_string_with_format(line, 0, "Success Rate", &formats.header)?;
    worksheet.write_string(line, 1, format!("{:.2}%", totals.success_rate()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_truncated_and_deduplicated() {
        let mut names = SheetNames::default();
        let long = "Storewise Actual Vs Target Sorted By Actual";
        let first = names.allocate(long);
        assert_eq!(first.chars().count(), 31);
        let second = names.allocate(long);
        assert!(second.ends_with(" (2)"));
        assert_eq!(second.chars().count(), 31);
        assert_eq!(names.allocate("a/b"), "a_b");
        assert_eq!(names.allocate("SUMMARY"), "SUMMARY");
        assert_eq!(names.allocate(SUMMARY_SHEET), "Summary (2)");
    }

    #[test]
    fn sheet_names_never_start_or_end_with_apostrophe() {
        let mut names = SheetNames::default();
        assert_eq!(names.allocate("'Quoted'"), "Quoted");
        assert_eq!(names.allocate("''"), "Sheet");
        let long = format!("{}'tail", "x".repeat(30));
        assert_eq!(names.allocate(&long), "x".repeat(30));
        let mut workbook = Workbook::new();
        for name in ["'Leading", "Trailing'"] {
            let allocated = names.allocate(name);
            workbook
                .add_worksheet()
                .set_name(&allocated)
                .expect("valid worksheet name");
        }
    }

    #[test]
    fn structure_headers_follow_layout() {
        assert_eq!(
            structure_headers(SheetLayout::Targets),
            vec![
                "Identifier",
                "Excel Actual Sales",
                "DB Actual Sales",
                "Actual Sales Status",
                "Excel Target",
                "DB Target",
                "Target Status",
            ]
        );
        assert_eq!(structure_headers(SheetLayout::Standard).len(), 4);
    }
}
