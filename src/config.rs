//! Engine configuration.
//!
//! [`EngineConfig::default`] carries the built-in sales-dashboard rule set.
//! A YAML file can override any part of it; missing keys fall back to the
//! defaults.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    params::Parameters,
    selector::{NamePattern, RefinementRule},
    shape::Tag,
};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_PROBE_WORKERS: usize = 3;

const DEFAULT_SOURCES: &[&str] = &[
    "SalesTrend",
    "TopPerformingEmployee",
    "TopProductsBySales",
    "WeekdayWeekendSales",
    "WeekwiseSalesComparison",
    "TopStoresbySales",
    "TopBrandsBySales",
    "TopCategoriesBySaleswidget",
    "TopSubCategoriesBySales",
    "WeeklyTrendswidget",
    "StorewiseActualVsTarget_Vertical_SortedByActual",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLayout {
    /// One wide row per sheet row, mirroring the export's own columns.
    #[default]
    Structure,
    /// `[Identifier, Metric, Excel Value, DB Value, Status]` per compared fact.
    Rows,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillthroughConfig {
    /// Full parameter tuples for specific selections.
    pub overrides: BTreeMap<String, Parameters>,
    /// Store display name to store id.
    pub store_ids: BTreeMap<String, String>,
}

/// Direct sheet-name phrases. The target-aware table replaces the standard
/// one when the sheet carries `target_data` and one of its phrases matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameRules {
    pub weight: f64,
    pub target_aware: Vec<NamePattern>,
    pub standard: Vec<NamePattern>,
}

impl Default for NameRules {
    fn default() -> Self {
        NameRules {
            weight: 0.8,
            target_aware: vec![NamePattern::new(
                "store sales",
                "StorewiseActualVsTarget",
            )],
            standard: vec![
                NamePattern::new("store sales", "TopStoresbySales"),
                NamePattern::new("top stores", "TopStoresbySales"),
                NamePattern::new("brands", "TopBrandsBySales"),
                NamePattern::new("top brands", "TopBrandsBySales"),
                NamePattern::new("categories", "TopCategoriesBySaleswidget"),
                NamePattern::new("top categories", "TopCategoriesBySaleswidget"),
                NamePattern::new("sub categories", "TopSubCategoriesBySales"),
                NamePattern::new("products", "TopProductsBySales"),
                NamePattern::new("top products", "TopProductsBySales"),
                NamePattern::new("weekly trends", "WeeklyTrendswidget"),
                NamePattern::new("weekly", "WeeklyTrendswidget"),
                NamePattern::new("sales trends", "SalesTrend"),
                NamePattern::new("month", "SalesTrend"),
            ],
        }
    }
}

/// Fixed sheet label to source entry used by the legacy strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEntry {
    pub label: String,
    pub source: String,
}

impl LegacyEntry {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidate sources, probed and reported in this order.
    pub sources: Vec<String>,
    /// Selection threshold; a candidate must score strictly above it.
    pub min_confidence: f64,
    pub probe_workers: usize,
    pub report_layout: ReportLayout,
    pub default_parameters: Parameters,
    pub name_rules: NameRules,
    pub shape_overlap_weight: f64,
    pub refinements: Vec<RefinementRule>,
    pub row_volume_weight: f64,
    pub column_overlap_weight: f64,
    /// Labels of shared multi-sheet sources tried during alternate-key lookup.
    pub alternate_labels: Vec<String>,
    pub legacy_mapping: Vec<LegacyEntry>,
    /// Sheets compared as KPI lists regardless of their headers.
    pub kpi_sheets: Vec<String>,
    /// KPI label to single-value source.
    pub kpi_sources: BTreeMap<String, String>,
    pub drillthrough: DrillthroughConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            probe_workers: DEFAULT_PROBE_WORKERS,
            report_layout: ReportLayout::default(),
            default_parameters: Parameters::default(),
            name_rules: NameRules::default(),
            shape_overlap_weight: 0.4,
            refinements: default_refinements(),
            row_volume_weight: 0.1,
            column_overlap_weight: 0.1,
            alternate_labels: vec![
                "Weekly Trends".to_string(),
                "Sales Summary_Weekday Weekend".to_string(),
            ],
            legacy_mapping: default_legacy_mapping(),
            kpi_sheets: Vec::new(),
            kpi_sources: BTreeMap::new(),
            drillthrough: DrillthroughConfig {
                overrides: BTreeMap::new(),
                store_ids: BTreeMap::from([("Love Library".to_string(), "717".to_string())]),
            },
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: EngineConfig =
            serde_yaml::from_reader(reader).context("Parsing engine config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(BufWriter::new(file), self).context("Writing engine config YAML")
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.min_confidence) {
            return Err(anyhow!(
                "min_confidence must be in [0, 1), got {}",
                self.min_confidence
            ));
        }
        if self.probe_workers == 0 {
            return Err(anyhow!("probe_workers must be at least 1"));
        }
        if let Some(rule) = self.refinements.iter().find(|r| r.weight < 0.0) {
            return Err(anyhow!(
                "Refinement for '{}' has a negative weight",
                rule.source
            ));
        }
        self.default_parameters
            .validate()
            .context("Validating default parameters")
    }
}

fn default_refinements() -> Vec<RefinementRule> {
    vec![
        RefinementRule::new("StorewiseActualVsTarget", 0.9)
            .name_contains(&["store"])
            .requires_tag(Tag::TargetData),
        RefinementRule::new("TopStoresbySales", 0.5)
            .name_contains(&["store"])
            .excludes_tag(Tag::TargetData),
        RefinementRule::new("TopBrandsBySales", 0.5).name_contains(&["brand"]),
        RefinementRule::new("TopCategoriesBySaleswidget", 0.5)
            .name_contains(&["categor"])
            .name_excludes(&["sub"]),
        RefinementRule::new("TopSubCategoriesBySales", 0.7).name_contains(&["sub categor"]),
        RefinementRule::new("TopProductsBySales", 0.5).name_contains(&["product"]),
        RefinementRule::new("WeeklyTrendswidget", 0.9).name_contains(&["weekly trends"]),
        RefinementRule::new("WeeklyTrendswidget", 0.7).name_contains(&["weekly"]),
        RefinementRule::new("WeekwiseSalesComparison", 0.6)
            .name_contains(&["weekly"])
            .name_excludes(&["trends"]),
        RefinementRule::new("SalesTrend", 0.5).name_contains(&["sales trend"]),
        RefinementRule::new("SalesTrend", 0.5)
            .name_contains(&["trend"])
            .name_excludes(&["weekly"]),
    ]
}

fn default_legacy_mapping() -> Vec<LegacyEntry> {
    vec![
        LegacyEntry::new("Sales Trends", "SalesTrend"),
        LegacyEntry::new("Top Performing Employee", "TopPerformingEmployee"),
        LegacyEntry::new("Top Products", "TopProductsBySales"),
        LegacyEntry::new("Weekday Weekend", "WeekdayWeekendSales"),
        LegacyEntry::new("Weekly Trends", "WeeklyTrendswidget"),
        LegacyEntry::new("Top Stores", "TopStoresbySales"),
        LegacyEntry::new("Top Brands", "TopBrandsBySales"),
        LegacyEntry::new("Top Categories", "TopCategoriesBySaleswidget"),
        LegacyEntry::new("Top Sub Categories", "TopSubCategoriesBySales"),
        LegacyEntry::new("Store Sales", "StorewiseActualVsTarget_Vertical_SortedByActual"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.yml");
        let config = EngineConfig::default();
        config.save(&path).expect("save config");
        let loaded = EngineConfig::load(&path).expect("load config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.yml");
        std::fs::write(&path, "probe_workers: 4\nreport_layout: rows\n").expect("write yaml");
        let loaded = EngineConfig::load(&path).expect("load config");
        assert_eq!(loaded.probe_workers, 4);
        assert_eq!(loaded.report_layout, ReportLayout::Rows);
        assert_eq!(loaded.min_confidence, DEFAULT_MIN_CONFIDENCE);
        assert_eq!(loaded.sources.len(), DEFAULT_SOURCES.len());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let config = EngineConfig {
            min_confidence: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
