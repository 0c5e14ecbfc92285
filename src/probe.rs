//! Source probing: run each candidate once, classify its output shape and
//! keep the result for the formatter.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use log::{debug, info, warn};
use rayon::{ThreadPoolBuilder, prelude::*};
use serde::Serialize;

use crate::{
    data::Value,
    params::Parameters,
    shape::{ShapeTag, classify_columns},
    source::{QueryResult, SourceExecutor},
};

#[derive(Debug, Clone, Serialize)]
pub struct SourceProbe {
    pub source_name: String,
    pub works: bool,
    pub columns: Vec<String>,
    pub output_shape: ShapeTag,
    pub row_count: usize,
    pub sample_row: Option<BTreeMap<String, Value>>,
    pub error: Option<String>,
    /// The source does not exist, as opposed to failing when run.
    pub missing: bool,
    #[serde(skip)]
    result: Option<Arc<QueryResult>>,
}

impl SourceProbe {
    fn succeeded(name: &str, result: QueryResult) -> Self {
        let output_shape = classify_columns(&result.columns, result.first_row());
        let sample_row = result.first_row().map(|row| {
            result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<BTreeMap<_, _>>()
        });
        SourceProbe {
            source_name: name.to_string(),
            works: true,
            columns: result.columns.clone(),
            output_shape,
            row_count: result.rows.len(),
            sample_row,
            error: None,
            missing: false,
            result: Some(Arc::new(result)),
        }
    }

    fn failed(name: &str, error: String, missing: bool) -> Self {
        SourceProbe {
            source_name: name.to_string(),
            works: false,
            columns: Vec::new(),
            output_shape: ShapeTag::Generic,
            row_count: 0,
            sample_row: None,
            error: Some(error),
            missing,
            result: None,
        }
    }

    /// Rows fetched while probing; `None` for a failed probe.
    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_deref()
    }
}

/// Runs one source and classifies its output. Never fails: an execution
/// error is captured in the returned probe.
pub fn probe(executor: &dyn SourceExecutor, name: &str, params: &Parameters) -> SourceProbe {
    match executor.execute(name, params) {
        Ok(result) => {
            let probe = SourceProbe::succeeded(name, result);
            debug!(
                "Probe '{}' returned {} row(s) shaped {}",
                name, probe.row_count, probe.output_shape
            );
            probe
        }
        Err(err) => {
            warn!("Probe '{name}' failed: {err}");
            SourceProbe::failed(name, err.to_string(), err.is_missing())
        }
    }
}

type ProbeKey = (String, Parameters);

/// Probe results keyed by `(source, parameters)`, shared across runs that
/// reuse a [`crate::engine::Reconciler`]. Each key is probed at most once even
/// when several threads ask for it concurrently.
#[derive(Debug, Default)]
pub struct ProbeCache {
    entries: Mutex<HashMap<ProbeKey, Arc<OnceLock<Arc<SourceProbe>>>>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_probe(
        &self,
        executor: &dyn SourceExecutor,
        name: &str,
        params: &Parameters,
    ) -> Arc<SourceProbe> {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .entry((name.to_string(), params.clone()))
                .or_default()
                .clone()
        };
        slot.get_or_init(|| Arc::new(probe(executor, name, params)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Probes `names` on a bounded pool. Results come back in `names` order.
pub fn probe_all(
    executor: &dyn SourceExecutor,
    names: &[String],
    params: &Parameters,
    cache: &ProbeCache,
    workers: usize,
) -> Vec<Arc<SourceProbe>> {
    let run = |name: &String| cache.get_or_probe(executor, name, params);
    let probes = match ThreadPoolBuilder::new().num_threads(workers.max(1)).build() {
        Ok(pool) => pool.install(|| names.par_iter().map(run).collect::<Vec<_>>()),
        Err(err) => {
            warn!("Falling back to sequential probing: {err}");
            names.iter().map(run).collect()
        }
    };
    let working = probes.iter().filter(|p| p.works).count();
    info!(
        "Probed {} source(s) with {}: {} working",
        probes.len(),
        params,
        working
    );
    probes
}
