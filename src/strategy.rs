//! Comparison strategies.
//!
//! [`DynamicStrategy`] infers every sheet's source; [`LegacyFixedMappingStrategy`]
//! reads it from a predeclared sheet-name table. Both share the formatter and
//! the comparison engine and differ only in how a sheet finds its source.

use std::sync::Arc;

use log::{info, warn};

use crate::{
    analyzer::SheetAnalysis,
    compare::{SheetLayout, SheetReport, Status, compare_sheet, uncompared_rows},
    config::{EngineConfig, LegacyEntry},
    data::compact_name,
    error::StrategyError,
    formatter::{self, FlatData},
    kpi,
    params::Parameters,
    probe::{ProbeCache, SourceProbe, probe_all},
    selector,
    source::SourceExecutor,
    workbook::{ExportWorkbook, SheetData},
};

/// Inputs shared by every strategy for one run.
pub struct RunContext<'a> {
    pub workbook: &'a ExportWorkbook,
    /// One analysis per sheet, in workbook order.
    pub analyses: &'a [SheetAnalysis],
    pub executor: &'a dyn SourceExecutor,
    pub cache: &'a ProbeCache,
    pub params: &'a Parameters,
    pub config: &'a EngineConfig,
}

impl RunContext<'_> {
    fn sheets(&self) -> impl Iterator<Item = (&SheetData, &SheetAnalysis)> {
        self.workbook.sheets.iter().zip(self.analyses)
    }
}

pub trait ComparisonStrategy {
    fn name(&self) -> &'static str;

    /// One report per sheet in workbook order, or a total failure.
    fn compare(&self, ctx: &RunContext<'_>) -> Result<Vec<SheetReport>, StrategyError>;
}

/// How a sheet resolved before comparison.
enum Resolution {
    Kpi,
    Source {
        probe: Arc<SourceProbe>,
        confidence: Option<f64>,
    },
    Unresolved {
        status: Status,
        note: String,
    },
}

/// Formats every resolved sheet into one flat key space, then compares each
/// sheet against it. Sharing one space lets alternate-label lookups reach
/// keys produced for a sibling sheet.
fn compare_resolved(ctx: &RunContext<'_>, resolutions: Vec<Resolution>) -> Vec<SheetReport> {
    let mut flat = FlatData::new();
    for ((sheet, _), resolution) in ctx.sheets().zip(&resolutions) {
        if let Resolution::Source { probe, .. } = resolution
            && let Some(result) = probe.result()
        {
            flat.extend(formatter::format(result, sheet.label(), probe.output_shape));
        }
    }

    ctx.sheets()
        .zip(resolutions)
        .map(|((sheet, analysis), resolution)| match resolution {
            Resolution::Kpi => {
                kpi::compare_kpis(sheet, ctx.executor, ctx.cache, ctx.params, ctx.config)
            }
            Resolution::Source { probe, confidence } => {
                let rows = compare_sheet(
                    sheet,
                    analysis,
                    sheet.label(),
                    &flat,
                    &ctx.config.alternate_labels,
                );
                let report = SheetReport {
                    sheet_name: sheet.name.clone(),
                    source_name: Some(probe.source_name.clone()),
                    confidence,
                    layout: SheetLayout::for_analysis(analysis),
                    rows,
                    note: None,
                };
                let counts = report.counts();
                info!(
                    "Sheet '{}' vs {}: {} match(es), {} mismatch(es), {} not found",
                    sheet.name,
                    probe.source_name,
                    counts.matches,
                    counts.mismatches,
                    counts.not_found
                );
                report
            }
            Resolution::Unresolved { status, note } => SheetReport {
                sheet_name: sheet.name.clone(),
                source_name: None,
                confidence: None,
                layout: SheetLayout::for_analysis(analysis),
                rows: uncompared_rows(sheet, analysis, status),
                note: Some(note),
            },
        })
        .collect()
}

/// Selects a source per sheet by confidence score.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicStrategy;

impl ComparisonStrategy for DynamicStrategy {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn compare(&self, ctx: &RunContext<'_>) -> Result<Vec<SheetReport>, StrategyError> {
        let config = ctx.config;
        let probes = probe_all(
            ctx.executor,
            &config.sources,
            ctx.params,
            ctx.cache,
            config.probe_workers,
        );
        if !probes.iter().any(|p| p.works) {
            return Err(StrategyError::NoWorkingSources);
        }

        let mut mapped = 0usize;
        let mut resolutions = Vec::with_capacity(ctx.analyses.len());
        for (sheet, analysis) in ctx.sheets() {
            if kpi::is_kpi_sheet(sheet, config) {
                mapped += 1;
                resolutions.push(Resolution::Kpi);
                continue;
            }
            let plan = selector::plan_sheet(analysis, &probes, config);
            let resolution = plan
                .mapping
                .and_then(|m| {
                    let probe = probes
                        .iter()
                        .find(|p| p.source_name == m.source_name)
                        .cloned()?;
                    Some(Resolution::Source {
                        probe,
                        confidence: Some(m.confidence),
                    })
                })
                .unwrap_or_else(|| Resolution::Unresolved {
                    status: Status::NoMapping,
                    note: Status::NoMapping.as_str().to_string(),
                });
            if matches!(resolution, Resolution::Source { .. }) {
                mapped += 1;
            }
            resolutions.push(resolution);
        }
        if mapped == 0 {
            return Err(StrategyError::NoMappings);
        }
        Ok(compare_resolved(ctx, resolutions))
    }
}

/// Resolves sheets through the configured fixed sheet-name table.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyFixedMappingStrategy;

impl LegacyFixedMappingStrategy {
    /// An entry whose compacted label equals the compacted sheet name, else
    /// the longest one contained in it.
    pub fn entry_for<'a>(sheet_name: &str, table: &'a [LegacyEntry]) -> Option<&'a LegacyEntry> {
        let sheet = compact_name(sheet_name);
        table
            .iter()
            .find(|e| compact_name(&e.label) == sheet)
            .or_else(|| {
                table
                    .iter()
                    .filter(|e| {
                        let label = compact_name(&e.label);
                        !label.is_empty() && sheet.contains(&label)
                    })
                    .max_by_key(|e| compact_name(&e.label).len())
            })
    }
}

impl ComparisonStrategy for LegacyFixedMappingStrategy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn compare(&self, ctx: &RunContext<'_>) -> Result<Vec<SheetReport>, StrategyError> {
        let config = ctx.config;
        let mut mapped = 0usize;
        let mut working = 0usize;
        let mut resolutions = Vec::with_capacity(ctx.analyses.len());
        for (sheet, _) in ctx.sheets() {
            if kpi::is_kpi_sheet(sheet, config) {
                mapped += 1;
                working += 1;
                resolutions.push(Resolution::Kpi);
                continue;
            }
            let Some(entry) = Self::entry_for(&sheet.name, &config.legacy_mapping) else {
                warn!("Sheet '{}' has no fixed mapping", sheet.name);
                resolutions.push(Resolution::Unresolved {
                    status: Status::NoMapping,
                    note: Status::NoMapping.as_str().to_string(),
                });
                continue;
            };
            mapped += 1;
            let probe = ctx.cache.get_or_probe(ctx.executor, &entry.source, ctx.params);
            let resolution = if probe.works {
                working += 1;
                Resolution::Source {
                    probe,
                    confidence: None,
                }
            } else {
                let status = if probe.missing {
                    Status::SourceMissing
                } else {
                    Status::SourceError
                };
                Resolution::Unresolved {
                    status,
                    note: format!(
                        "{}: {}",
                        status,
                        probe.error.as_deref().unwrap_or(entry.source.as_str())
                    ),
                }
            };
            resolutions.push(resolution);
        }
        if mapped == 0 {
            return Err(StrategyError::NoMappings);
        }
        if working == 0 {
            return Err(StrategyError::NoWorkingSources);
        }
        Ok(compare_resolved(ctx, resolutions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn legacy_entry_prefers_exact_then_longest_contained() {
        let table = EngineConfig::default().legacy_mapping;
        let exact = LegacyFixedMappingStrategy::entry_for("Top Sub Categories", &table);
        assert_eq!(exact.map(|e| e.source.as_str()), Some("TopSubCategoriesBySales"));
        let contained = LegacyFixedMappingStrategy::entry_for("Drill - Top Brands (717)", &table);
        assert_eq!(contained.map(|e| e.source.as_str()), Some("TopBrandsBySales"));
        assert!(LegacyFixedMappingStrategy::entry_for("Odd", &table).is_none());
    }
}
