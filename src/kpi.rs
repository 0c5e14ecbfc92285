//! KPI sheets: one named single-value fact per row, each backed by its own
//! source.

use log::{debug, info};

use crate::{
    analyzer::header_key,
    compare::{ComparisonRow, SheetLayout, SheetReport, Status},
    config::EngineConfig,
    data::compact_name,
    keys::Metric,
    normalize::{normalize_value, values_match},
    params::Parameters,
    probe::ProbeCache,
    source::SourceExecutor,
    workbook::SheetData,
};

pub const KPI_SOURCE_LABEL: &str = "KPI sources";
const KPI_HEADERS: [&str; 2] = ["kpi name", "value"];

/// Lower-cased, trimmed KPI label with dots removed and whitespace runs
/// collapsed, so `"Avg. Basket  Size"` and `"avg basket size"` agree.
pub fn kpi_key(label: &str) -> String {
    label
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn is_kpi_sheet(sheet: &SheetData, config: &EngineConfig) -> bool {
    let headers_match = sheet.headers.len() >= 2
        && sheet
            .headers
            .iter()
            .take(2)
            .zip(KPI_HEADERS)
            .all(|(header, expected)| header_key(header) == expected);
    let sheet_name = compact_name(&sheet.name);
    headers_match || config.kpi_sheets.iter().any(|s| compact_name(s) == sheet_name)
}

fn source_for<'a>(config: &'a EngineConfig, label: &str) -> Option<&'a str> {
    let key = kpi_key(label);
    config
        .kpi_sources
        .iter()
        .find(|(name, _)| kpi_key(name) == key)
        .map(|(_, source)| source.as_str())
}

/// Compares every KPI row against the first cell of its configured source.
pub fn compare_kpis(
    sheet: &SheetData,
    executor: &dyn SourceExecutor,
    cache: &ProbeCache,
    params: &Parameters,
    config: &EngineConfig,
) -> SheetReport {
    let mut rows = Vec::new();
    for (idx, row) in sheet.rows.iter().enumerate() {
        let Some(label) = SheetData::cell(row, 0).as_label() else {
            continue;
        };
        let excel_value = SheetData::cell(row, 1).clone();
        let mut compared = ComparisonRow {
            row: idx + 2,
            identifier: label.clone(),
            metric: Metric::Custom("KPI".to_string()),
            excel_value,
            source_value: None,
            matched_key: None,
            status: Status::NoMapping,
        };

        let Some(source) = source_for(config, &label) else {
            debug!("No source configured for KPI '{label}'");
            rows.push(compared);
            continue;
        };
        let probe = cache.get_or_probe(executor, source, params);
        compared.matched_key = Some(source.to_string());
        compared.status = match probe.result() {
            None if probe.missing => Status::SourceMissing,
            None => Status::SourceError,
            Some(result) => match result.first_row().and_then(|r| r.first()) {
                None => Status::NotFound,
                Some(value) => {
                    compared.source_value = Some(value.as_display());
                    if values_match(&normalize_value(&compared.excel_value), &normalize_value(value)) {
                        Status::Match
                    } else {
                        Status::Mismatch
                    }
                }
            },
        };
        rows.push(compared);
    }

    let report = SheetReport {
        sheet_name: sheet.name.clone(),
        source_name: Some(KPI_SOURCE_LABEL.to_string()),
        confidence: None,
        layout: SheetLayout::Standard,
        rows,
        note: None,
    };
    let counts = report.counts();
    info!(
        "KPI sheet '{}': {} match(es), {} mismatch(es), {} unmapped",
        sheet.name, counts.matches, counts.mismatches, counts.no_mapping
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, source::{MemoryExecutor, QueryResult}};

    fn kpi_sheet() -> SheetData {
        SheetData::new(
            "Dashboard KPIs",
            vec!["KPI Name".to_string(), "Value".to_string()],
            vec![
                vec![Value::from("Total Sales"), Value::from("$1.5K")],
                vec![Value::from("Avg. Basket Size"), Value::Float(12.5)],
                vec![Value::from("Footfall"), Value::Integer(40)],
                vec![Value::from("Returns"), Value::Integer(3)],
                vec![Value::from("Refunds"), Value::Integer(1)],
            ],
        )
    }

    #[test]
    fn kpi_keys_ignore_dots_case_and_spacing() {
        assert_eq!(kpi_key("  Avg.  Basket Size "), "avg basket size");
    }

    #[test]
    fn kpi_statuses_distinguish_failures() {
        let mut config = EngineConfig::default();
        config.kpi_sources.insert("total sales".to_string(), "TotalSales".to_string());
        config.kpi_sources.insert("Avg Basket Size".to_string(), "BasketSize".to_string());
        config.kpi_sources.insert("Returns".to_string(), "ReturnsKpi".to_string());
        config.kpi_sources.insert("Refunds".to_string(), "Unknown".to_string());
        let executor = MemoryExecutor::new()
            .with_result(
                "TotalSales",
                QueryResult::new(vec!["Total".to_string()], vec![vec![Value::Integer(1500)]]),
            )
            .with_result(
                "BasketSize",
                QueryResult::new(vec!["Avg".to_string()], vec![vec![Value::Float(12.0)]]),
            )
            .with_failure("ReturnsKpi", "timeout");

        let sheet = kpi_sheet();
        assert!(is_kpi_sheet(&sheet, &config));
        let report = compare_kpis(
            &sheet,
            &executor,
            &ProbeCache::new(),
            &Parameters::default(),
            &config,
        );
        let statuses = report.rows.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                Status::Match,
                Status::Mismatch,
                Status::NoMapping,
                Status::SourceError,
                Status::SourceMissing,
            ]
        );
    }
}
