//! The reconciliation entry point.
//!
//! A [`Reconciler`] owns the source executor, the resolved configuration and
//! the probe cache. Each call builds its own analyses, plan and flat data;
//! only probe results are shared between calls with equal parameters.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};

use crate::{
    analyzer::analyze_workbook,
    config::EngineConfig,
    params::Parameters,
    probe::ProbeCache,
    report::{ReconcileOutcome, write_report},
    source::SourceExecutor,
    strategy::{ComparisonStrategy, DynamicStrategy, LegacyFixedMappingStrategy, RunContext},
    workbook::load_export,
};

pub struct Reconciler {
    executor: Arc<dyn SourceExecutor>,
    config: EngineConfig,
    cache: ProbeCache,
    input_encoding: Option<String>,
}

impl Reconciler {
    pub fn new(executor: Arc<dyn SourceExecutor>, config: EngineConfig) -> Self {
        Reconciler {
            executor,
            config,
            cache: ProbeCache::new(),
            input_encoding: None,
        }
    }

    /// Encoding used when the export is a delimited text file.
    pub fn with_input_encoding(mut self, encoding: Option<String>) -> Self {
        self.input_encoding = encoding;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ProbeCache {
        &self.cache
    }

    pub fn executor(&self) -> &dyn SourceExecutor {
        self.executor.as_ref()
    }

    /// Parameters for a drill-through selection, based on the configured
    /// defaults.
    pub fn drillthrough_parameters(&self, selection: &str) -> Parameters {
        self.config
            .default_parameters
            .for_drillthrough(selection, &self.config.drillthrough)
    }

    /// Analyzes and compares an export without writing anything.
    ///
    /// Tries the dynamic strategy, then the fixed mapping. Errors when the
    /// export cannot be read or both strategies fail outright.
    pub fn run(&self, export_path: &Path, params: &Parameters) -> Result<ReconcileOutcome> {
        params.validate().context("Validating run parameters")?;
        let workbook = load_export(export_path, self.input_encoding.as_deref())
            .with_context(|| format!("Loading export {export_path:?}"))?;
        let analyses = analyze_workbook(&workbook);
        info!(
            "Reconciling {:?}: {} sheet(s), {} skipped, parameters {}",
            export_path,
            workbook.sheets.len(),
            workbook.skipped.len(),
            params
        );

        let ctx = RunContext {
            workbook: &workbook,
            analyses: &analyses,
            executor: self.executor.as_ref(),
            cache: &self.cache,
            params,
            config: &self.config,
        };
        let strategies: [&dyn ComparisonStrategy; 2] =
            [&DynamicStrategy, &LegacyFixedMappingStrategy];
        for strategy in strategies {
            match strategy.compare(&ctx) {
                Ok(sheets) => {
                    return Ok(ReconcileOutcome {
                        export_path: export_path.to_path_buf(),
                        strategy: strategy.name().to_string(),
                        parameters: params.clone(),
                        sheets,
                        skipped: workbook.skipped.clone(),
                    });
                }
                Err(err) => warn!("The {} strategy produced no report: {err}", strategy.name()),
            }
        }
        Err(anyhow!("No strategy could reconcile {export_path:?}"))
    }

    /// Runs and writes the report to `output_path`.
    pub fn try_reconcile(
        &self,
        export_path: &Path,
        params: &Parameters,
        output_path: &Path,
    ) -> Result<ReconcileOutcome> {
        let outcome = self.run(export_path, params)?;
        write_report(&outcome, self.config.report_layout, output_path)?;
        Ok(outcome)
    }

    /// `true` iff a report was written, whatever its verdicts.
    pub fn reconcile(&self, export_path: &Path, params: &Parameters, output_path: &Path) -> bool {
        match self.try_reconcile(export_path, params, output_path) {
            Ok(outcome) => {
                let totals = outcome.totals();
                info!(
                    "Reconciliation finished ({} strategy): {} match(es), {} mismatch(es), {} not found, {:.2}% success",
                    outcome.strategy,
                    totals.matches,
                    totals.mismatches,
                    totals.not_found,
                    totals.success_rate()
                );
                true
            }
            Err(err) => {
                error!("Reconciliation of {export_path:?} failed: {err:#}");
                false
            }
        }
    }
}
