//! Tag vocabulary shared by sheet analysis and source probing, plus the
//! output-shape classification of a source's result columns.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::data::{Value, compact_name};

/// Semantic tag inferred from a sheet's header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    MonthlyData,
    WeeklyData,
    WeekdayWeekendData,
    ProductData,
    BrandData,
    StoreData,
    EmployeeData,
    CategoryData,
    SalesData,
    TargetData,
    YearComparison,
    GenericData,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::MonthlyData => "monthly_data",
            Tag::WeeklyData => "weekly_data",
            Tag::WeekdayWeekendData => "weekday_weekend_data",
            Tag::ProductData => "product_data",
            Tag::BrandData => "brand_data",
            Tag::StoreData => "store_data",
            Tag::EmployeeData => "employee_data",
            Tag::CategoryData => "category_data",
            Tag::SalesData => "sales_data",
            Tag::TargetData => "target_data",
            Tag::YearComparison => "year_comparison",
            Tag::GenericData => "generic_data",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword vocabulary, checked in declaration order against the lower-cased
/// header text.
const TAG_KEYWORDS: &[(Tag, &[&str])] = &[
    (Tag::MonthlyData, &["month", "monthly"]),
    (Tag::WeeklyData, &["week", "weekly"]),
    (Tag::WeekdayWeekendData, &["weekday", "weekend"]),
    (Tag::ProductData, &["product"]),
    (Tag::BrandData, &["brand"]),
    (Tag::StoreData, &["store"]),
    (Tag::EmployeeData, &["employee"]),
    (Tag::CategoryData, &["category"]),
    (Tag::SalesData, &["sales", "revenue"]),
    (Tag::TargetData, &["target"]),
    (Tag::YearComparison, &["current year", "previous year"]),
];

/// Tags the given header text carries; `{generic_data}` when none match.
pub fn detect_tags(header_text: &str) -> BTreeSet<Tag> {
    let text = header_text.to_lowercase();
    let mut tags = TAG_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(tag, _)| *tag)
        .collect::<BTreeSet<_>>();
    if tags.is_empty() {
        tags.insert(Tag::GenericData);
    }
    tags
}

/// Structural class of a source's result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeTag {
    MetricValuePairs,
    MonthlyTrends,
    WeeklyTrends,
    WeekdayWeekend,
    ProductSales,
    BrandSales,
    StoreSales,
    EmployeePerformance,
    CategorySales,
    GenericSales,
    Generic,
}

impl ShapeTag {
    pub const ALL: [ShapeTag; 11] = [
        ShapeTag::MetricValuePairs,
        ShapeTag::MonthlyTrends,
        ShapeTag::WeeklyTrends,
        ShapeTag::WeekdayWeekend,
        ShapeTag::ProductSales,
        ShapeTag::BrandSales,
        ShapeTag::StoreSales,
        ShapeTag::EmployeePerformance,
        ShapeTag::CategorySales,
        ShapeTag::GenericSales,
        ShapeTag::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeTag::MetricValuePairs => "metric_value_pairs",
            ShapeTag::MonthlyTrends => "monthly_trends",
            ShapeTag::WeeklyTrends => "weekly_trends",
            ShapeTag::WeekdayWeekend => "weekday_weekend",
            ShapeTag::ProductSales => "product_sales",
            ShapeTag::BrandSales => "brand_sales",
            ShapeTag::StoreSales => "store_sales",
            ShapeTag::EmployeePerformance => "employee_performance",
            ShapeTag::CategorySales => "category_sales",
            ShapeTag::GenericSales => "generic_sales",
            ShapeTag::Generic => "generic",
        }
    }

    /// Sheet tags a source of this shape is expected to back.
    pub fn expected_tags(&self) -> &'static [Tag] {
        match self {
            ShapeTag::MonthlyTrends => &[Tag::MonthlyData, Tag::SalesData, Tag::YearComparison],
            ShapeTag::WeeklyTrends => &[Tag::WeeklyData, Tag::SalesData, Tag::YearComparison],
            ShapeTag::WeekdayWeekend => &[Tag::WeekdayWeekendData, Tag::SalesData],
            ShapeTag::ProductSales => &[Tag::ProductData, Tag::SalesData],
            ShapeTag::BrandSales => &[Tag::BrandData, Tag::SalesData],
            ShapeTag::StoreSales => &[Tag::StoreData, Tag::SalesData],
            ShapeTag::EmployeePerformance => &[Tag::EmployeeData, Tag::SalesData],
            ShapeTag::CategorySales => &[Tag::CategoryData],
            ShapeTag::MetricValuePairs => &[Tag::TargetData, Tag::SalesData],
            ShapeTag::GenericSales | ShapeTag::Generic => &[],
        }
    }

    pub fn overlaps(&self, tags: &BTreeSet<Tag>) -> bool {
        self.expected_tags().iter().any(|tag| tags.contains(tag))
    }
}

impl fmt::Display for ShapeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies result columns into a [`ShapeTag`]. Rules are checked in
/// priority order and the first match wins. `first_row` refines a weekly
/// result whose period column actually holds weekday/weekend buckets.
pub fn classify_columns(columns: &[String], first_row: Option<&[Value]>) -> ShapeTag {
    let compact = columns.iter().map(|c| compact_name(c)).collect::<Vec<_>>();
    let lower = columns.iter().map(|c| c.to_lowercase()).collect::<Vec<_>>();
    let has = |needle: &str| compact.iter().any(|c| c.contains(needle));
    let raw_has = |needle: &str| lower.iter().any(|c| c.contains(needle));
    let sales = has("sales");

    if has("metric") && (raw_has("excel value") || has("value")) {
        return ShapeTag::MetricValuePairs;
    }
    if has("month") && has("currentyearsales") {
        return ShapeTag::MonthlyTrends;
    }
    if has("week") && has("currentyearsales") {
        if period_is_day_type(&compact, first_row) {
            return ShapeTag::WeekdayWeekend;
        }
        return ShapeTag::WeeklyTrends;
    }
    if (has("daytype") || has("weekcategory")) && sales {
        return ShapeTag::WeekdayWeekend;
    }
    if has("productname") && sales {
        return ShapeTag::ProductSales;
    }
    if has("brandname") && sales {
        return ShapeTag::BrandSales;
    }
    if has("store") && sales {
        return ShapeTag::StoreSales;
    }
    if has("identifier") && (has("actual") || has("target")) {
        return ShapeTag::StoreSales;
    }
    if has("employeename") && sales {
        return ShapeTag::EmployeePerformance;
    }
    if has("category") && sales {
        return ShapeTag::CategorySales;
    }
    if columns.len() >= 2 && (sales || has("actual") || has("value")) {
        return ShapeTag::GenericSales;
    }
    ShapeTag::Generic
}

fn period_is_day_type(compact: &[String], first_row: Option<&[Value]>) -> bool {
    let Some(row) = first_row else {
        return false;
    };
    compact
        .iter()
        .position(|c| c == "week" || c == "weekcategory")
        .and_then(|idx| row.get(idx))
        .map(|value| {
            let text = value.as_display().to_uppercase();
            text.contains("WEEKDAY") || text.contains("WEEKEND")
        })
        .unwrap_or(false)
}
