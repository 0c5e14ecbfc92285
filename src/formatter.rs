//! Shape-aware extraction of source rows into the flat key space.
//!
//! One routine per [`ShapeTag`], looked up through a dispatch table. The
//! formatter only builds keys and lightly cleans values; final typing happens
//! when the comparison engine normalizes on read.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Serialize;

use crate::{
    data::{Value, compact_name},
    keys::{Metric, flat_key, metric_key},
    normalize::clean_source_text,
    shape::ShapeTag,
    source::QueryResult,
    workbook::SheetData,
};

const UNKNOWN_IDENTIFIER: &str = "Unknown";

const MONTHS: [(&str, &str); 12] = [
    ("january", "Jan"),
    ("february", "Feb"),
    ("march", "Mar"),
    ("april", "Apr"),
    ("may", "May"),
    ("june", "Jun"),
    ("july", "Jul"),
    ("august", "Aug"),
    ("september", "Sep"),
    ("october", "Oct"),
    ("november", "Nov"),
    ("december", "Dec"),
];

/// Flat key to cleaned source text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatData {
    entries: BTreeMap<String, String>,
}

impl FlatData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: &Value) {
        self.entries
            .insert(key, clean_source_text(&value.as_display()));
    }

    pub fn insert_text(&mut self, key: String, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn extend(&mut self, other: FlatData) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `n` stored keys closest to `key`.
    pub fn closest_keys(&self, key: &str, n: usize) -> Vec<String> {
        let keys = self.entries.keys().map(String::as_str).collect::<Vec<_>>();
        similar::get_close_matches(key, &keys, n, 0.6)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

type ShapeFormatter = fn(&QueryResult, &str) -> FlatData;

const FORMATTERS: &[(ShapeTag, ShapeFormatter)] = &[
    (ShapeTag::MonthlyTrends, format_monthly_trends),
    (ShapeTag::WeeklyTrends, format_weekly_trends),
    (ShapeTag::WeekdayWeekend, format_weekday_weekend),
    (ShapeTag::ProductSales, format_product_sales),
    (ShapeTag::BrandSales, format_brand_sales),
    (ShapeTag::StoreSales, format_store_sales),
    (ShapeTag::EmployeePerformance, format_employee_performance),
    (ShapeTag::CategorySales, format_category_sales),
    (ShapeTag::MetricValuePairs, format_metric_value_pairs),
    (ShapeTag::GenericSales, format_generic_sales),
    (ShapeTag::Generic, format_generic),
];

/// Formats `result` under `label` using the routine for `shape`.
pub fn format(result: &QueryResult, label: &str, shape: ShapeTag) -> FlatData {
    let formatter = FORMATTERS
        .iter()
        .find(|(tag, _)| *tag == shape)
        .map(|(_, f)| *f)
        .unwrap_or(format_generic);
    let data = formatter(result, label);
    debug!(
        "Formatted {} key(s) for '{label}' from {} row(s) as {shape}",
        data.len(),
        result.rows.len()
    );
    data
}

fn identifier_text(value: &Value) -> String {
    value
        .as_label()
        .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string())
}

/// First column whose compacted name equals one of `names`, tried in order.
fn column_named(result: &QueryResult, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| result.column_index(name))
}

/// First column whose lower-cased name contains one of `needles`, tried in
/// order, skipping `exclude`.
fn column_containing(result: &QueryResult, needles: &[&str], exclude: &[usize]) -> Option<usize> {
    needles.iter().find_map(|needle| {
        result.columns.iter().enumerate().position(|(idx, col)| {
            !exclude.contains(&idx) && col.to_lowercase().contains(needle)
        })
    })
}

fn abbreviate_month(period: &str) -> String {
    let lower = period.to_lowercase();
    MONTHS
        .iter()
        .find(|(full, _)| *full == lower)
        .map(|(_, short)| short.to_string())
        .unwrap_or_else(|| period.to_string())
}

fn year_pair(
    result: &QueryResult,
    label: &str,
    period_column: Option<usize>,
    period_text: impl Fn(&Value) -> String,
) -> FlatData {
    let mut data = FlatData::new();
    let current = result.column_index("CurrentYearSales");
    let previous = result.column_index("PreviousYearSales");
    for row in &result.rows {
        let period = period_column
            .and_then(|idx| row.get(idx))
            .map(&period_text)
            .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string());
        for (column, metric) in [(current, Metric::CurrentYear), (previous, Metric::PreviousYear)] {
            if let Some(value) = column.and_then(|idx| row.get(idx))
                && !value.is_null()
            {
                data.insert(metric_key(label, &period, &metric), value);
            }
        }
    }
    data
}

fn format_monthly_trends(result: &QueryResult, label: &str) -> FlatData {
    let month = column_named(result, &["Month"]);
    year_pair(result, label, month, |v| abbreviate_month(&identifier_text(v)))
}

fn format_weekly_trends(result: &QueryResult, label: &str) -> FlatData {
    let week = column_named(result, &["Week", "WeekCategory"]);
    year_pair(result, label, week, identifier_text)
}

fn format_weekday_weekend(result: &QueryResult, label: &str) -> FlatData {
    let day_type = column_named(result, &["DayType", "WeekCategory", "Week"]);
    year_pair(result, label, day_type, |v| {
        format!("{} SALES", identifier_text(v).to_uppercase())
    })
}

fn entity_sales(result: &QueryResult, label: &str, name_column: Option<usize>) -> FlatData {
    let sales = column_named(result, &["Sales"]);
    let (Some(name_idx), Some(sales_idx)) = (name_column, sales) else {
        debug!("Entity columns missing for '{label}', using generic sales layout");
        return format_generic_sales(result, label);
    };
    let mut data = FlatData::new();
    for row in &result.rows {
        let value = SheetData::cell(row, sales_idx);
        if value.is_null() {
            continue;
        }
        let name = identifier_text(SheetData::cell(row, name_idx));
        data.insert(metric_key(label, &name, &Metric::ActualSales), value);
    }
    data
}

fn format_product_sales(result: &QueryResult, label: &str) -> FlatData {
    entity_sales(result, label, column_named(result, &["ProductName"]))
}

fn format_brand_sales(result: &QueryResult, label: &str) -> FlatData {
    entity_sales(result, label, column_named(result, &["BrandName"]))
}

fn format_employee_performance(result: &QueryResult, label: &str) -> FlatData {
    entity_sales(result, label, column_named(result, &["EmployeeName"]))
}

fn format_category_sales(result: &QueryResult, label: &str) -> FlatData {
    let category = column_named(result, &["CategoryName"]).or_else(|| {
        result
            .columns
            .iter()
            .position(|c| compact_name(c).contains("categoryname"))
    });
    entity_sales(result, label, category)
}

/// Identifier/value/target rows. Emits `<id>` and, when present, `<id> Target`.
fn identifier_value_target(
    result: &QueryResult,
    label: &str,
    identifier: usize,
    value: usize,
    target: Option<usize>,
) -> FlatData {
    let mut data = FlatData::new();
    for row in &result.rows {
        let id = identifier_text(SheetData::cell(row, identifier));
        let actual = SheetData::cell(row, value);
        if !actual.is_null() {
            data.insert(metric_key(label, &id, &Metric::ActualSales), actual);
        }
        if let Some(target_idx) = target {
            let target_value = SheetData::cell(row, target_idx);
            if !target_value.is_null() {
                data.insert(metric_key(label, &id, &Metric::Target), target_value);
            }
        }
    }
    data
}

fn format_store_sales(result: &QueryResult, label: &str) -> FlatData {
    let identifier = column_containing(result, &["storename", "store", "identifier"], &[]);
    let Some(identifier) = identifier else {
        return format_generic_sales(result, label);
    };
    let value = column_containing(result, &["actual sales", "sales", "actual"], &[identifier]);
    let Some(value) = value else {
        return format_generic_sales(result, label);
    };
    let target = column_containing(result, &["target"], &[identifier, value]);
    identifier_value_target(result, label, identifier, value, target)
}

fn format_generic_sales(result: &QueryResult, label: &str) -> FlatData {
    let identifier = column_containing(result, &["identifier"], &[]).or_else(|| {
        column_containing(result, &["name", "store", "product", "brand"], &[])
    });
    let value = identifier.and_then(|id| {
        column_containing(result, &["actual sales", "sales", "actual", "value"], &[id])
    });
    match (identifier, value) {
        (Some(identifier), Some(value)) => {
            let target = column_containing(result, &["target"], &[identifier, value]);
            identifier_value_target(result, label, identifier, value, target)
        }
        _ => {
            warn!(
                "Could not find identifier and value columns for '{label}' in [{}]",
                result.columns.join(", ")
            );
            format_generic(result, label)
        }
    }
}

fn format_metric_value_pairs(result: &QueryResult, label: &str) -> FlatData {
    let identifier = column_named(result, &["Identifier"]).unwrap_or(0);
    let metric = column_named(result, &["Metric"]);
    let value = column_named(result, &["Excel Value", "Value"]);
    let (Some(metric), Some(value)) = (metric, value) else {
        return format_generic(result, label);
    };
    let mut data = FlatData::new();
    for row in &result.rows {
        let cell = SheetData::cell(row, value);
        if cell.is_null() {
            continue;
        }
        let id = identifier_text(SheetData::cell(row, identifier));
        let metric = Metric::from_label(&SheetData::cell(row, metric).as_display());
        data.insert(metric_key(label, &id, &metric), cell);
    }
    data
}

/// First column is the identifier, second the value.
fn format_generic(result: &QueryResult, label: &str) -> FlatData {
    let mut data = FlatData::new();
    if result.columns.len() < 2 {
        return data;
    }
    for row in &result.rows {
        let id = identifier_text(SheetData::cell(row, 0));
        let value = SheetData::cell(row, 1);
        if value.is_null() {
            data.insert_text(flat_key(label, &id, None), "0");
        } else {
            data.insert(flat_key(label, &id, None), value);
        }
    }
    data
}
