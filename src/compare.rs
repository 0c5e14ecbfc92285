//! Comparison engine: walks the rows of one sheet, looks every populated
//! metric up in the flat source data and records a verdict per fact.
//!
//! Row order is the sheet's own order. Nothing is re-sorted so a reviewer can
//! trace a verdict back to the export visually.

use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::{
    analyzer::{Role, SheetAnalysis},
    data::Value,
    formatter::FlatData,
    keys::{Metric, lookup_candidates},
    normalize::{normalize_text, normalize_value, values_match},
    workbook::SheetData,
};

const CLOSEST_KEYS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Match,
    Mismatch,
    #[serde(rename = "Not Found")]
    NotFound,
    #[serde(rename = "No Mapping")]
    NoMapping,
    #[serde(rename = "Source Missing")]
    SourceMissing,
    #[serde(rename = "Source Error")]
    SourceError,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Match => "Match",
            Status::Mismatch => "Mismatch",
            Status::NotFound => "Not Found",
            Status::NoMapping => "No Mapping",
            Status::SourceMissing => "Source Missing",
            Status::SourceError => "Source Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compared fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    /// 1-based worksheet row; the header is row 1.
    pub row: usize,
    pub identifier: String,
    pub metric: Metric,
    pub excel_value: Value,
    pub source_value: Option<String>,
    /// The flat key that resolved the lookup, when one did.
    pub matched_key: Option<String>,
    pub status: Status,
}

impl ComparisonRow {
    pub fn metric_label(&self) -> &str {
        self.metric.label()
    }
}

/// Which wide header the structure-preserving report uses for a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetLayout {
    /// Actual sales next to targets.
    Targets,
    /// Previous year next to current year.
    YearComparison,
    /// A single value column.
    Standard,
    /// Metric/value pairs; always reported one fact per row.
    MetricRows,
}

impl SheetLayout {
    pub fn for_analysis(analysis: &SheetAnalysis) -> SheetLayout {
        let has = |role| analysis.column(role).is_some();
        if has(Role::Metric) && has(Role::ExcelValue) {
            SheetLayout::MetricRows
        } else if has(Role::Target) {
            SheetLayout::Targets
        } else if has(Role::PreviousYear) && has(Role::CurrentYear) {
            SheetLayout::YearComparison
        } else {
            SheetLayout::Standard
        }
    }

    /// Metrics shown side by side in the wide layout, in column order.
    pub fn metrics(&self) -> Vec<Metric> {
        match self {
            SheetLayout::Targets => vec![Metric::ActualSales, Metric::Target],
            SheetLayout::YearComparison => vec![Metric::PreviousYear, Metric::CurrentYear],
            SheetLayout::Standard | SheetLayout::MetricRows => vec![Metric::ActualSales],
        }
    }
}

/// Per-status totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub matches: usize,
    pub mismatches: usize,
    pub not_found: usize,
    pub no_mapping: usize,
    pub source_missing: usize,
    pub source_error: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Match => self.matches += 1,
            Status::Mismatch => self.mismatches += 1,
            Status::NotFound => self.not_found += 1,
            Status::NoMapping => self.no_mapping += 1,
            Status::SourceMissing => self.source_missing += 1,
            Status::SourceError => self.source_error += 1,
        }
    }

    pub fn add(&mut self, other: &StatusCounts) {
        self.matches += other.matches;
        self.mismatches += other.mismatches;
        self.not_found += other.not_found;
        self.no_mapping += other.no_mapping;
        self.source_missing += other.source_missing;
        self.source_error += other.source_error;
    }

    /// Facts that were actually compared against a value.
    pub fn compared(&self) -> usize {
        self.matches + self.mismatches + self.not_found
    }

    pub fn total(&self) -> usize {
        self.compared() + self.no_mapping + self.source_missing + self.source_error
    }

    /// Matches over compared facts, as a percentage.
    pub fn success_rate(&self) -> f64 {
        match self.compared() {
            0 => 0.0,
            n => self.matches as f64 * 100.0 / n as f64,
        }
    }
}

/// The comparison outcome of one sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub sheet_name: String,
    pub source_name: Option<String>,
    pub confidence: Option<f64>,
    pub layout: SheetLayout,
    pub rows: Vec<ComparisonRow>,
    /// Why a sheet has no source-backed rows.
    pub note: Option<String>,
}

impl SheetReport {
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for row in &self.rows {
            counts.record(row.status);
        }
        counts
    }

    pub fn is_mapped(&self) -> bool {
        self.source_name.is_some()
    }
}

/// The sheet columns that carry a comparable metric, for the non-pair
/// layouts.
///
/// A sheet without any recognized value column compares its first
/// non-identifier column as actual sales.
fn metric_columns(analysis: &SheetAnalysis) -> Vec<(Metric, usize)> {
    let mut columns = Vec::new();
    let value = analysis
        .column(Role::ActualSales)
        .or_else(|| analysis.column(Role::Sales));
    if let Some(idx) = value {
        columns.push((Metric::ActualSales, idx));
    }
    for (role, metric) in [
        (Role::Target, Metric::Target),
        (Role::PreviousYear, Metric::PreviousYear),
        (Role::CurrentYear, Metric::CurrentYear),
    ] {
        if let Some(idx) = analysis.column(role) {
            // A column compares under one metric only.
            columns.retain(|(_, claimed)| *claimed != idx);
            columns.push((metric, idx));
        }
    }
    if columns.is_empty() {
        let identifier = analysis.identifier_column();
        if let Some(idx) = (0..analysis.headers.len()).find(|idx| *idx != identifier) {
            columns.push((Metric::ActualSales, idx));
        }
    }
    columns
}

struct Fact<'a> {
    row: usize,
    identifier: String,
    metric: Metric,
    excel_value: &'a Value,
}

/// Every comparable fact of a sheet, in row order. Blank rows and rows
/// without an identifier are skipped and logged.
fn facts<'a>(sheet: &'a SheetData, analysis: &SheetAnalysis) -> Vec<Fact<'a>> {
    let identifier_col = analysis.identifier_column();
    let layout = SheetLayout::for_analysis(analysis);
    let columns = metric_columns(analysis);
    let mut facts = Vec::new();

    for (idx, row) in sheet.rows.iter().enumerate() {
        let row_number = idx + 2;
        if SheetData::is_blank_row(row) {
            debug!("Sheet '{}' row {row_number} is empty", sheet.name);
            continue;
        }
        let Some(identifier) = SheetData::cell(row, identifier_col).as_label() else {
            warn!(
                "Skipping sheet '{}' row {row_number}: no identifier in column {}",
                sheet.name,
                identifier_col + 1
            );
            continue;
        };

        if layout == SheetLayout::MetricRows {
            let (Some(metric_col), Some(value_col)) = (
                analysis.column(Role::Metric),
                analysis.column(Role::ExcelValue),
            ) else {
                continue;
            };
            facts.push(Fact {
                row: row_number,
                metric: Metric::from_label(&SheetData::cell(row, metric_col).as_display()),
                identifier,
                excel_value: SheetData::cell(row, value_col),
            });
            continue;
        }

        for (metric, col) in &columns {
            facts.push(Fact {
                row: row_number,
                identifier: identifier.clone(),
                metric: metric.clone(),
                excel_value: SheetData::cell(row, *col),
            });
        }
    }
    facts
}

/// Compares every fact of `sheet` against `flat`, building lookup keys under
/// `label` and then each of `alternate_labels`.
pub fn compare_sheet(
    sheet: &SheetData,
    analysis: &SheetAnalysis,
    label: &str,
    flat: &FlatData,
    alternate_labels: &[String],
) -> Vec<ComparisonRow> {
    facts(sheet, analysis)
        .into_iter()
        .map(|fact| compare_fact(fact, label, flat, alternate_labels))
        .collect()
}

fn compare_fact(
    fact: Fact<'_>,
    label: &str,
    flat: &FlatData,
    alternate_labels: &[String],
) -> ComparisonRow {
    let candidates = lookup_candidates(label, &fact.identifier, &fact.metric, alternate_labels);
    let resolved = candidates
        .iter()
        .find_map(|key| flat.get(key).map(|value| (key.clone(), value.to_string())));

    let (status, matched_key, source_value) = match resolved {
        Some((key, value)) => {
            let matched = values_match(&normalize_value(fact.excel_value), &normalize_text(&value));
            let status = if matched {
                Status::Match
            } else {
                Status::Mismatch
            };
            debug!(
                "{key}: export {} vs source {value} -> {status}",
                fact.excel_value
            );
            (status, Some(key), Some(value))
        }
        None => {
            let expected = candidates.first().map(String::as_str).unwrap_or_default();
            debug!(
                "Not found: '{expected}'; closest available {:?}",
                flat.closest_keys(expected, CLOSEST_KEYS)
            );
            (Status::NotFound, None, None)
        }
    };

    ComparisonRow {
        row: fact.row,
        identifier: fact.identifier,
        metric: fact.metric,
        excel_value: fact.excel_value.clone(),
        source_value,
        matched_key,
        status,
    }
}

/// Rows for a sheet that could not be compared, one per fact, all carrying
/// `status`.
pub fn uncompared_rows(sheet: &SheetData, analysis: &SheetAnalysis, status: Status) -> Vec<ComparisonRow> {
    facts(sheet, analysis)
        .into_iter()
        .map(|fact| ComparisonRow {
            row: fact.row,
            identifier: fact.identifier,
            metric: fact.metric,
            excel_value: fact.excel_value.clone(),
            source_value: None,
            matched_key: None,
            status,
        })
        .collect()
}
