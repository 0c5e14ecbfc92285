//! Sheet structure analysis: semantic tags, column roles and sample rows.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::OnceLock,
};

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, compact_name, header_text},
    shape::{Tag, detect_tags},
    workbook::{ExportWorkbook, SheetData},
};

const SAMPLE_ROWS: usize = 3;
const IDENTIFIER_HINTS: &[&str] = &["name", "product", "brand", "store", "employee"];

/// What a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Identifier,
    Sales,
    ActualSales,
    Target,
    CurrentYear,
    PreviousYear,
    Metric,
    ExcelValue,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Identifier => "identifier",
            Role::Sales => "sales",
            Role::ActualSales => "actual_sales",
            Role::Target => "target",
            Role::CurrentYear => "current_year",
            Role::PreviousYear => "previous_year",
            Role::Metric => "metric",
            Role::ExcelValue => "excel_value",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSuggestion {
    pub source: String,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetAnalysis {
    pub name: String,
    pub normalized_name: String,
    pub headers: Vec<String>,
    pub tags: BTreeSet<Tag>,
    pub key_columns: BTreeMap<Role, usize>,
    /// First few non-empty rows. Diagnostics only.
    pub sample_rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub suggested_sources: Vec<SourceSuggestion>,
}

impl SheetAnalysis {
    pub fn column(&self, role: Role) -> Option<usize> {
        self.key_columns.get(&role).copied()
    }

    pub fn identifier_column(&self) -> usize {
        self.column(Role::Identifier).unwrap_or(0)
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Lower-cased sheet name used by the name-pattern rules.
    pub fn lower_name(&self) -> String {
        self.name.trim().to_lowercase()
    }

    /// Header texts of every role-bearing column, compacted.
    pub fn key_column_names(&self) -> BTreeSet<String> {
        self.key_columns
            .values()
            .filter_map(|idx| self.headers.get(*idx))
            .map(|h| compact_name(h))
            .filter(|h| !h.is_empty())
            .collect()
    }
}

pub fn analyze_workbook(workbook: &ExportWorkbook) -> Vec<SheetAnalysis> {
    workbook.sheets.iter().map(analyze).collect()
}

pub fn analyze(sheet: &SheetData) -> SheetAnalysis {
    let keys = sheet.headers.iter().map(|h| header_key(h)).collect::<Vec<_>>();
    let joined = keys.join(" ");
    let tags = detect_tags(&joined);
    let key_columns = assign_roles(&keys);
    let sample_rows = sheet
        .data_rows()
        .take(SAMPLE_ROWS)
        .cloned()
        .collect::<Vec<_>>();
    let row_count = sheet.data_rows().count();
    let suggested_sources = suggest_sources(sheet.label(), &joined);

    debug!(
        "Analyzed sheet '{}': tags [{}], {} row(s), roles {:?}",
        sheet.name,
        tags.iter().map(Tag::as_str).collect::<Vec<_>>().join(", "),
        row_count,
        key_columns
    );

    SheetAnalysis {
        name: sheet.name.clone(),
        normalized_name: compact_name(&sheet.name),
        headers: sheet.headers.clone(),
        tags,
        key_columns,
        sample_rows,
        row_count,
        suggested_sources,
    }
}

/// Lower-cased header with underscores treated as spaces and whitespace
/// collapsed.
pub fn header_key(header: &str) -> String {
    header_text(&header.replace('_', " "))
}

/// First matching header wins for every role. The identifier prefers an
/// explicit `identifier` header anywhere over a name-like header, and falls
/// back to the first column.
fn assign_roles(keys: &[String]) -> BTreeMap<Role, usize> {
    let first = |pred: &dyn Fn(&str) -> bool| keys.iter().position(|k| pred(k.as_str()));
    let mut roles = BTreeMap::new();

    let identifier = first(&|k: &str| k.contains("identifier"))
        .or_else(|| first(&|k: &str| IDENTIFIER_HINTS.iter().any(|hint| k.contains(hint))))
        .unwrap_or(0);
    roles.insert(Role::Identifier, identifier);

    let matchers: [(Role, &dyn Fn(&str) -> bool); 7] = [
        (Role::ActualSales, &|k: &str| k.contains("actual sales")),
        (Role::Sales, &|k: &str| {
            k.contains("sales")
                && !k.contains("actual sales")
                && !k.contains("current year")
                && !k.contains("previous year")
        }),
        (Role::Target, &|k: &str| k.contains("target")),
        (Role::CurrentYear, &|k: &str| k.contains("current year")),
        (Role::PreviousYear, &|k: &str| k.contains("previous year")),
        (Role::Metric, &|k: &str| k.contains("metric")),
        (Role::ExcelValue, &|k: &str| k.contains("excel value")),
    ];
    for (role, pred) in matchers {
        if let Some(idx) = first(pred) {
            roles.insert(role, idx);
        }
    }
    roles
}

fn suggestion_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"sales.*trend|trend.*sales|month.*sales", "SalesTrend"),
            (r"week.*sales|weekly.*sales|weekwise", "WeekwiseSalesComparison"),
            (r"weekday|weekend|day.*type", "WeekdayWeekendSales"),
            (r"product.*sales|sales.*product", "TopProductsBySales"),
            (r"brand.*sales|sales.*brand", "TopBrandsBySales"),
            (r"store.*sales|sales.*store", "TopStoresbySales"),
            (r"employee|performing", "TopPerformingEmployee"),
            (r"categor.*sales|sales.*categor", "TopCategoriesBySaleswidget"),
            (
                r"target.*actual|actual.*target",
                "StorewiseActualVsTarget_Vertical_SortedByActual",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, source)| Regex::new(pattern).ok().map(|re| (re, source)))
        .collect()
    })
}

/// Regex-based hints over the sheet name and header text. Never used for
/// selection.
pub fn suggest_sources(sheet_name: &str, joined_headers: &str) -> Vec<SourceSuggestion> {
    let combined = format!("{} {}", sheet_name.to_lowercase(), joined_headers);
    let mut suggestions = suggestion_patterns()
        .iter()
        .filter(|(re, _)| re.is_match(&combined))
        .map(|(re, source)| SourceSuggestion {
            source: source.to_string(),
            confidence: 0.8,
            reason: format!("pattern match: {}", re.as_str()),
        })
        .collect::<Vec<_>>();
    if suggestions.is_empty() && combined.contains("sales") {
        suggestions.push(SourceSuggestion {
            source: "TopProductsBySales".to_string(),
            confidence: 0.5,
            reason: "generic sales data".to_string(),
        });
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, headers: &[&str], rows: Vec<Vec<Value>>) -> SheetData {
        SheetData::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows,
        )
    }

    #[test]
    fn explicit_identifier_beats_earlier_name_column() {
        let analysis = analyze(&sheet(
            "Top Brands",
            &["Brand Name", "Identifier", "Actual Sales"],
            vec![],
        ));
        assert_eq!(analysis.column(Role::Identifier), Some(1));
        assert_eq!(analysis.column(Role::ActualSales), Some(2));
        assert_eq!(analysis.column(Role::Sales), None);
    }

    #[test]
    fn year_sales_headers_do_not_fill_the_value_role() {
        let analysis = analyze(&sheet(
            "Weekly",
            &["Week", "Previous Year Sales", "Current Year Sales"],
            vec![],
        ));
        assert_eq!(analysis.column(Role::Sales), None);
        assert_eq!(analysis.column(Role::PreviousYear), Some(1));
        assert_eq!(analysis.column(Role::CurrentYear), Some(2));
    }

    #[test]
    fn identifier_falls_back_to_first_column() {
        let analysis = analyze(&sheet("Odd", &["foo", "bar"], vec![]));
        assert_eq!(analysis.identifier_column(), 0);
        assert_eq!(
            analysis.tags.iter().copied().collect::<Vec<_>>(),
            vec![Tag::GenericData]
        );
    }

    #[test]
    fn first_matching_header_keeps_role() {
        let analysis = analyze(&sheet(
            "Weekly Trends",
            &["Week", "Previous Year", "Current Year", "Current Year Alt"],
            vec![],
        ));
        assert_eq!(analysis.column(Role::CurrentYear), Some(2));
        assert_eq!(analysis.column(Role::PreviousYear), Some(1));
        assert!(analysis.has_tag(Tag::WeeklyData));
        assert!(analysis.has_tag(Tag::YearComparison));
    }

    #[test]
    fn samples_skip_blank_rows_and_stop_at_three() {
        let rows = vec![
            vec![Value::Null, Value::Null],
            vec![Value::from("a"), Value::Integer(1)],
            vec![Value::from("b"), Value::Integer(2)],
            vec![Value::from("c"), Value::Integer(3)],
            vec![Value::from("d"), Value::Integer(4)],
        ];
        let analysis = analyze(&sheet("S", &["Identifier", "Actual Sales"], rows));
        assert_eq!(analysis.sample_rows.len(), 3);
        assert_eq!(analysis.sample_rows[0][0], Value::from("a"));
        assert_eq!(analysis.row_count, 4);
    }

    #[test]
    fn underscores_in_headers_are_whitespace() {
        let analysis = analyze(&sheet("S", &["identifier", "ACTUAL_SALES"], vec![]));
        assert_eq!(analysis.column(Role::ActualSales), Some(1));
    }

    #[test]
    fn suggestions_use_patterns_then_generic_sales() {
        let hits = suggest_sources("Sales Trends", "identifier actual sales");
        assert!(hits.iter().any(|s| s.source == "SalesTrend" && s.confidence == 0.8));
        let generic = suggest_sources("Summary", "identifier sales");
        assert_eq!(generic.len(), 1);
        assert_eq!(generic[0].confidence, 0.5);
        assert!(suggest_sources("Odd", "foo bar").is_empty());
    }
}
