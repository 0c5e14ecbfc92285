//! Confidence-scored sheet to source selection.
//!
//! Scoring is an ordered list of rules. Each rule inspects a sheet analysis
//! and a working probe and may contribute one named [`ScoreComponent`]; the
//! sum is clamped to 1.0. The weights and name tables live in
//! [`EngineConfig`] so new sources only need configuration.

use std::{collections::BTreeSet, sync::Arc};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    analyzer::SheetAnalysis,
    config::EngineConfig,
    data::compact_name,
    probe::SourceProbe,
    shape::{ShapeTag, Tag},
};

/// A sheet-name phrase associated with a source-name fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePattern {
    pub phrase: String,
    pub source: String,
}

impl NamePattern {
    pub fn new(phrase: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            source: source.into(),
        }
    }

    fn phrase_in(&self, lower_name: &str) -> bool {
        lower_name.contains(&self.phrase.to_lowercase())
    }
}

/// Source-specific bonus. Only the first applicable refinement counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementRule {
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_tag: Option<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excludes_tag: Option<Tag>,
    pub weight: f64,
}

impl RefinementRule {
    pub fn new(source: impl Into<String>, weight: f64) -> Self {
        Self {
            source: source.into(),
            name_contains: Vec::new(),
            name_excludes: Vec::new(),
            requires_tag: None,
            excludes_tag: None,
            weight,
        }
    }

    pub fn name_contains(mut self, phrases: &[&str]) -> Self {
        self.name_contains = phrases.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn name_excludes(mut self, phrases: &[&str]) -> Self {
        self.name_excludes = phrases.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn requires_tag(mut self, tag: Tag) -> Self {
        self.requires_tag = Some(tag);
        self
    }

    pub fn excludes_tag(mut self, tag: Tag) -> Self {
        self.excludes_tag = Some(tag);
        self
    }

    fn applies(&self, sheet: &SheetAnalysis, lower_name: &str, source_name: &str) -> bool {
        source_matches(source_name, &self.source)
            && self
                .name_contains
                .iter()
                .all(|p| lower_name.contains(&p.to_lowercase()))
            && !self
                .name_excludes
                .iter()
                .any(|p| lower_name.contains(&p.to_lowercase()))
            && self.requires_tag.is_none_or(|tag| sheet.has_tag(tag))
            && !self.excludes_tag.is_some_and(|tag| sheet.has_tag(tag))
    }
}

fn source_matches(source_name: &str, fragment: &str) -> bool {
    source_name
        .to_lowercase()
        .contains(&fragment.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub name: &'static str,
    pub value: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub source_name: String,
    pub output_shape: ShapeTag,
    pub score: f64,
    pub components: Vec<ScoreComponent>,
}

impl CandidateScore {
    pub fn explain(&self) -> String {
        if self.components.is_empty() {
            return "no evidence".to_string();
        }
        self.components
            .iter()
            .map(|c| format!("{} +{:.2} ({})", c.name, c.value, c.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A sheet resolved to a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mapping {
    pub sheet_name: String,
    pub source_name: String,
    pub confidence: f64,
    pub output_shape: ShapeTag,
    pub tags: BTreeSet<Tag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetPlan {
    pub sheet_name: String,
    pub mapping: Option<Mapping>,
    pub candidates: Vec<CandidateScore>,
}

struct ScoringContext<'a> {
    sheet: &'a SheetAnalysis,
    lower_name: String,
    probe: &'a SourceProbe,
    config: &'a EngineConfig,
}

type Rule = fn(&ScoringContext<'_>) -> Option<ScoreComponent>;

const RULES: &[Rule] = &[
    direct_name,
    shape_overlap,
    refinement,
    row_volume,
    column_overlap,
];

fn direct_name(ctx: &ScoringContext<'_>) -> Option<ScoreComponent> {
    let rules = &ctx.config.name_rules;
    let target_aware = ctx.sheet.has_tag(Tag::TargetData)
        && rules
            .target_aware
            .iter()
            .any(|p| p.phrase_in(&ctx.lower_name));
    let table = if target_aware {
        &rules.target_aware
    } else {
        &rules.standard
    };
    table
        .iter()
        .find(|p| p.phrase_in(&ctx.lower_name) && source_matches(&ctx.probe.source_name, &p.source))
        .map(|p| ScoreComponent {
            name: "direct_name",
            value: rules.weight,
            description: format!("'{}' -> {}", p.phrase, p.source),
        })
}

fn shape_overlap(ctx: &ScoringContext<'_>) -> Option<ScoreComponent> {
    let shape = ctx.probe.output_shape;
    shape.overlaps(&ctx.sheet.tags).then(|| ScoreComponent {
        name: "shape_overlap",
        value: ctx.config.shape_overlap_weight,
        description: format!("{shape} matches sheet tags"),
    })
}

fn refinement(ctx: &ScoringContext<'_>) -> Option<ScoreComponent> {
    ctx.config
        .refinements
        .iter()
        .find(|r| r.applies(ctx.sheet, &ctx.lower_name, &ctx.probe.source_name))
        .map(|r| ScoreComponent {
            name: "refinement",
            value: r.weight,
            description: format!("{} preferred for this sheet name", r.source),
        })
}

fn row_volume(ctx: &ScoringContext<'_>) -> Option<ScoreComponent> {
    (ctx.probe.row_count > 0).then(|| ScoreComponent {
        name: "row_volume",
        value: ctx.config.row_volume_weight,
        description: format!("{} row(s)", ctx.probe.row_count),
    })
}

fn column_overlap(ctx: &ScoringContext<'_>) -> Option<ScoreComponent> {
    let sheet_columns = ctx.sheet.key_column_names();
    let shared = ctx
        .probe
        .columns
        .iter()
        .map(|c| compact_name(c))
        .filter(|c| sheet_columns.contains(c))
        .collect::<Vec<_>>();
    (!shared.is_empty()).then(|| ScoreComponent {
        name: "column_overlap",
        value: ctx.config.column_overlap_weight,
        description: format!("shared column(s) {}", shared.join(", ")),
    })
}

pub fn score_candidate(
    sheet: &SheetAnalysis,
    probe: &SourceProbe,
    config: &EngineConfig,
) -> CandidateScore {
    let ctx = ScoringContext {
        sheet,
        lower_name: sheet.lower_name(),
        probe,
        config,
    };
    let components = RULES.iter().filter_map(|rule| rule(&ctx)).collect::<Vec<_>>();
    let total: f64 = components.iter().map(|c| c.value).sum();
    CandidateScore {
        source_name: probe.source_name.clone(),
        output_shape: probe.output_shape,
        score: total.min(1.0),
        components,
    }
}

/// Highest score strictly above `min_confidence`; the first candidate wins a
/// tie.
pub fn pick_best(candidates: &[CandidateScore], min_confidence: f64) -> Option<&CandidateScore> {
    let mut best: Option<&CandidateScore> = None;
    for candidate in candidates {
        if best.is_none_or(|b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    best.filter(|b| b.score > min_confidence)
}

pub fn plan_sheet(
    sheet: &SheetAnalysis,
    probes: &[Arc<SourceProbe>],
    config: &EngineConfig,
) -> SheetPlan {
    let candidates = probes
        .iter()
        .filter(|p| p.works)
        .map(|p| score_candidate(sheet, p, config))
        .collect::<Vec<_>>();
    for candidate in &candidates {
        debug!(
            "  {} <- {}: {:.2} [{}]",
            sheet.name,
            candidate.source_name,
            candidate.score,
            candidate.explain()
        );
    }
    let mapping = pick_best(&candidates, config.min_confidence).map(|best| Mapping {
        sheet_name: sheet.name.clone(),
        source_name: best.source_name.clone(),
        confidence: best.score,
        output_shape: best.output_shape,
        tags: sheet.tags.clone(),
    });
    match &mapping {
        Some(m) => info!(
            "Sheet '{}' -> {} (confidence {:.2})",
            m.sheet_name, m.source_name, m.confidence
        ),
        None => warn!("No source cleared the threshold for sheet '{}'", sheet.name),
    }
    SheetPlan {
        sheet_name: sheet.name.clone(),
        mapping,
        candidates,
    }
}

/// The reconciliation plan for every analyzed sheet.
pub fn plan(
    sheets: &[SheetAnalysis],
    probes: &[Arc<SourceProbe>],
    config: &EngineConfig,
) -> Vec<SheetPlan> {
    sheets
        .iter()
        .map(|sheet| plan_sheet(sheet, probes, config))
        .collect()
}

pub fn select(
    sheets: &[SheetAnalysis],
    probes: &[Arc<SourceProbe>],
    config: &EngineConfig,
) -> Vec<Mapping> {
    plan(sheets, probes, config)
        .into_iter()
        .filter_map(|p| p.mapping)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, score: f64) -> CandidateScore {
        CandidateScore {
            source_name: name.to_string(),
            output_shape: ShapeTag::Generic,
            score,
            components: Vec::new(),
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(pick_best(&[candidate("a", 0.3)], 0.3).is_none());
        assert_eq!(
            pick_best(&[candidate("a", 0.31)], 0.3).map(|c| c.source_name.as_str()),
            Some("a")
        );
    }

    #[test]
    fn ties_keep_first_candidate() {
        let candidates = [candidate("first", 0.6), candidate("second", 0.6)];
        assert_eq!(
            pick_best(&candidates, 0.3).map(|c| c.source_name.as_str()),
            Some("first")
        );
    }

    #[test]
    fn refinement_predicates_are_all_required() {
        let rule = RefinementRule::new("WeekwiseSalesComparison", 0.6)
            .name_contains(&["weekly"])
            .name_excludes(&["trends"]);
        let sheet = SheetAnalysis {
            name: "Weekly".to_string(),
            normalized_name: "weekly".to_string(),
            headers: Vec::new(),
            tags: BTreeSet::new(),
            key_columns: Default::default(),
            sample_rows: Vec::new(),
            row_count: 0,
            suggested_sources: Vec::new(),
        };
        assert!(rule.applies(&sheet, "weekly sales", "WeekwiseSalesComparison"));
        assert!(!rule.applies(&sheet, "weekly trends", "WeekwiseSalesComparison"));
        assert!(!rule.applies(&sheet, "weekly sales", "WeeklyTrendswidget"));
    }
}
