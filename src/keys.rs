//! Flat-key construction.
//!
//! The formatter and the comparison engine both build keys through this
//! module and nothing else, so a key emitted for `(label, identifier, metric)`
//! is always the key looked up for the same triple.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub const TARGET: &str = "Target";
pub const CURRENT_YEAR: &str = "Current Year";
pub const PREVIOUS_YEAR: &str = "Previous Year";
pub const SALES_QUALIFIER: &str = "SALES";

/// The value a flat key refers to within one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    ActualSales,
    Target,
    PreviousYear,
    CurrentYear,
    Custom(String),
}

impl Metric {
    /// Interprets free metric text from a metric/value pair.
    ///
    /// Only `actual sales` and `target` have dedicated spellings; any other
    /// metric text becomes the qualifier verbatim.
    pub fn from_label(text: &str) -> Metric {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("actual sales") {
            Metric::ActualSales
        } else if trimmed.eq_ignore_ascii_case("target") {
            Metric::Target
        } else {
            Metric::Custom(trimmed.to_string())
        }
    }

    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Metric::ActualSales => None,
            Metric::Target => Some(TARGET),
            Metric::PreviousYear => Some(PREVIOUS_YEAR),
            Metric::CurrentYear => Some(CURRENT_YEAR),
            Metric::Custom(text) if text.is_empty() => None,
            Metric::Custom(text) => Some(text.as_str()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Metric::ActualSales => "Actual Sales",
            Metric::Target => TARGET,
            Metric::PreviousYear => PREVIOUS_YEAR,
            Metric::CurrentYear => CURRENT_YEAR,
            Metric::Custom(text) => text.as_str(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `"<label> - <identifier>[ <qualifier>]"`.
pub fn flat_key(label: &str, identifier: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) if !q.is_empty() => format!("{label} - {identifier} {q}"),
        _ => format!("{label} - {identifier}"),
    }
}

pub fn metric_key(label: &str, identifier: &str, metric: &Metric) -> String {
    flat_key(label, identifier, metric.qualifier())
}

/// Ordered lookup candidates for one fact. The exact key comes first; the
/// remaining variants cover the naming conventions of shared multi-sheet
/// sources:
///
/// 1. the identifier with a trailing ` SALES` removed,
/// 2. the identifier with ` SALES` appended,
/// 3. for unqualified lookups, the `Current Year` qualified key,
///
/// then the same set under each alternate label.
pub fn lookup_candidates(
    label: &str,
    identifier: &str,
    metric: &Metric,
    alternate_labels: &[String],
) -> Vec<String> {
    let qualifier = metric.qualifier();
    std::iter::once(label)
        .chain(alternate_labels.iter().map(String::as_str))
        .flat_map(|l| label_variants(l, identifier, qualifier))
        .unique()
        .collect()
}

fn label_variants(label: &str, identifier: &str, qualifier: Option<&str>) -> Vec<String> {
    let mut variants = vec![flat_key(label, identifier, qualifier)];
    let suffix = format!(" {SALES_QUALIFIER}");
    match strip_suffix_ignore_case(identifier, &suffix) {
        Some(bare) => variants.push(flat_key(label, bare, qualifier)),
        None => variants.push(flat_key(label, &format!("{identifier}{suffix}"), qualifier)),
    }
    if qualifier.is_none() {
        variants.push(flat_key(label, identifier, Some(CURRENT_YEAR)));
    }
    variants
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let (head, tail) = (text.get(..split)?, text.get(split..)?);
    (tail.eq_ignore_ascii_case(suffix) && !head.trim().is_empty()).then_some(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unqualified_metric_has_no_suffix() {
        assert_eq!(
            metric_key("Top Brands", "Routledge", &Metric::ActualSales),
            "Top Brands - Routledge"
        );
        assert_eq!(
            metric_key("Store Sales", "Love Library", &Metric::Target),
            "Store Sales - Love Library Target"
        );
    }

    #[test]
    fn metric_text_maps_to_dedicated_qualifiers() {
        assert_eq!(Metric::from_label(" Actual Sales "), Metric::ActualSales);
        assert_eq!(Metric::from_label("TARGET"), Metric::Target);
        assert_eq!(
            Metric::from_label("Achievement %"),
            Metric::Custom("Achievement %".to_string())
        );
    }

    #[test]
    fn sales_suffix_variants_are_tried_after_exact_key() {
        let candidates = lookup_candidates(
            "Weekly Trends",
            "WEEKDAY SALES",
            &Metric::PreviousYear,
            &[],
        );
        assert_eq!(
            candidates,
            vec![
                "Weekly Trends - WEEKDAY SALES Previous Year".to_string(),
                "Weekly Trends - WEEKDAY Previous Year".to_string(),
            ]
        );
    }

    #[test]
    fn unqualified_lookup_falls_back_to_current_year() {
        let candidates = lookup_candidates("Sales Trends", "Jan", &Metric::ActualSales, &[]);
        assert_eq!(candidates[0], "Sales Trends - Jan");
        assert!(candidates.contains(&"Sales Trends - Jan Current Year".to_string()));
    }

    #[test]
    fn alternate_labels_follow_primary_label_without_duplicates() {
        let alternates = vec!["Weekly Trends".to_string(), "Weekly Trends".to_string()];
        let candidates = lookup_candidates("Weekly Trends", "WEEKEND", &Metric::CurrentYear, &alternates);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1], "Weekly Trends - WEEKEND SALES Current Year");
    }
}
