mod common;

use common::{columns, num, text};
use proptest::prelude::*;
use sheet_recon::{
    analyzer::analyze,
    compare::{Status, compare_sheet},
    data::Value,
    formatter::{FlatData, format},
    keys::{Metric, lookup_candidates, metric_key},
    shape::{ShapeTag, classify_columns},
    source::QueryResult,
    workbook::SheetData,
};

#[test]
fn monthly_trend_scenario_matches() {
    let result = QueryResult::new(
        columns(&["Month", "CurrentYearSales", "PreviousYearSales"]),
        vec![vec![text("January"), num(1000), num(900)]],
    );
    let shape = classify_columns(&result.columns, result.first_row());
    assert_eq!(shape, ShapeTag::MonthlyTrends);
    let flat = format(&result, "Sales Trends", shape);
    assert_eq!(flat.get("Sales Trends - Jan Current Year"), Some("1000"));
    assert_eq!(flat.get("Sales Trends - Jan Previous Year"), Some("900"));

    let sheet = SheetData::new(
        "Sales Trends",
        columns(&["Identifier", "Actual Sales"]),
        vec![vec![text("Jan"), num(1000)]],
    );
    let rows = compare_sheet(&sheet, &analyze(&sheet), sheet.label(), &flat, &[]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, Status::Match);
    assert_eq!(
        rows[0].matched_key.as_deref(),
        Some("Sales Trends - Jan Current Year")
    );
}

#[test]
fn alternate_key_drops_sales_qualifier() {
    let mut flat = FlatData::new();
    flat.insert_text("Weekly Trends - WEEKDAY Previous Year".to_string(), "700");
    let sheet = SheetData::new(
        "Weekly Trends",
        columns(&["Identifier", "Previous Year"]),
        vec![vec![text("WEEKDAY SALES"), num(700)]],
    );
    let rows = compare_sheet(&sheet, &analyze(&sheet), sheet.label(), &flat, &[]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, Status::Match);
    assert_eq!(
        rows[0].matched_key.as_deref(),
        Some("Weekly Trends - WEEKDAY Previous Year")
    );
}

#[test]
fn alternate_labels_reach_shared_source_keys() {
    let mut flat = FlatData::new();
    flat.insert_text(
        "Sales Summary_Weekday Weekend - WEEKEND SALES Current Year".to_string(),
        "350",
    );
    let sheet = SheetData::new(
        "Weekday Weekend",
        columns(&["Identifier", "Current Year"]),
        vec![vec![text("WEEKEND SALES"), num(351)]],
    );
    let alternates = vec!["Sales Summary_Weekday Weekend".to_string()];
    let rows = compare_sheet(&sheet, &analyze(&sheet), sheet.label(), &flat, &alternates);
    assert_eq!(rows[0].status, Status::Mismatch);
    assert_eq!(rows[0].source_value.as_deref(), Some("350"));
}

#[test]
fn exact_key_is_always_tried_first() {
    let candidates = lookup_candidates(
        "Top Brands",
        "Penguin",
        &Metric::ActualSales,
        &["Weekly Trends".to_string()],
    );
    assert_eq!(candidates[0], "Top Brands - Penguin");
    assert_eq!(candidates[1], "Top Brands - Penguin SALES");
    assert_eq!(candidates[2], "Top Brands - Penguin Current Year");
    assert_eq!(candidates[3], "Weekly Trends - Penguin");
}

fn label_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z]{0,8}( [A-Z][A-Za-z]{0,8}){0,2}"
}

fn identifier_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ]{0,12}[A-Za-z0-9]"
}

proptest! {
    #[test]
    fn generic_keys_are_found_by_exact_lookup(
        label in label_strategy(),
        identifier in identifier_strategy(),
        value in 0i64..1_000_000,
    ) {
        let result = QueryResult::new(
            columns(&["Identifier", "Value"]),
            vec![vec![Value::from(identifier.clone()), Value::Integer(value)]],
        );
        let flat = format(&result, &label, ShapeTag::Generic);
        let expected = value.to_string();
        let lookup = lookup_candidates(&label, &identifier, &Metric::ActualSales, &[]);
        prop_assert_eq!(flat.get(&lookup[0]), Some(expected.as_str()));
    }

    #[test]
    fn store_target_keys_match_lookup(
        label in label_strategy(),
        identifier in identifier_strategy(),
        actual in 0i64..100_000,
        target in 0i64..100_000,
    ) {
        let result = QueryResult::new(
            columns(&["StoreName", "ActualSales", "Target"]),
            vec![vec![Value::from(identifier.clone()), Value::Integer(actual), Value::Integer(target)]],
        );
        let flat = format(&result, &label, ShapeTag::StoreSales);
        for (metric, value) in [(Metric::ActualSales, actual), (Metric::Target, target)] {
            let lookup = lookup_candidates(&label, &identifier, &metric, &[]);
            prop_assert_eq!(&lookup[0], &metric_key(&label, &identifier, &metric));
            let expected = value.to_string();
            prop_assert_eq!(flat.get(&lookup[0]), Some(expected.as_str()));
        }
    }

    #[test]
    fn year_pair_keys_match_lookup(
        label in label_strategy(),
        week in 1u32..53,
        current in 0i64..100_000,
        previous in 0i64..100_000,
    ) {
        let period = format!("Week {week}");
        let result = QueryResult::new(
            columns(&["Week", "CurrentYearSales", "PreviousYearSales"]),
            vec![vec![Value::from(period.clone()), Value::Integer(current), Value::Integer(previous)]],
        );
        let flat = format(&result, &label, ShapeTag::WeeklyTrends);
        for (metric, value) in [(Metric::CurrentYear, current), (Metric::PreviousYear, previous)] {
            let lookup = lookup_candidates(&label, &period, &metric, &[]);
            let expected = value.to_string();
            prop_assert_eq!(flat.get(&lookup[0]), Some(expected.as_str()));
        }
    }
}
