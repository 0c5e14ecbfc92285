pub mod analyzer;
pub mod cli;
pub mod compare;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod io_utils;
pub mod keys;
pub mod kpi;
pub mod normalize;
pub mod params;
pub mod probe;
pub mod report;
pub mod selector;
pub mod shape;
pub mod source;
pub mod strategy;
pub mod table;
pub mod workbook;

pub use engine::Reconciler;
pub use params::Parameters;

use std::{env, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, info};

use crate::{
    cli::{AnalyzeArgs, Cli, Commands, InitConfigArgs, PlanArgs, ProbeArgs, ReconcileArgs},
    config::EngineConfig,
    probe::{ProbeCache, SourceProbe, probe_all},
    source::{SourceCatalog, SqliteExecutor},
    table::Table,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_recon", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Probe(args) => handle_probe(&args),
        Commands::Plan(args) => handle_plan(&args),
        Commands::Reconcile(args) => handle_reconcile(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

fn open_executor(sources: &cli::SourceArgs) -> Result<SqliteExecutor> {
    let catalog = SourceCatalog::load(&sources.queries)
        .with_context(|| format!("Loading source queries from {:?}", sources.queries))?;
    info!(
        "Loaded {} source definition(s) for database {:?}",
        catalog.sources.len(),
        sources.db
    );
    Ok(SqliteExecutor::new(&sources.db, catalog))
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<()> {
    let workbook = workbook::load_export(&args.input, args.input_encoding.as_deref())
        .with_context(|| format!("Loading export {:?}", args.input))?;
    let analyses = analyzer::analyze_workbook(&workbook);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&analyses)?);
        return Ok(());
    }
    let mut table = Table::new(["Sheet", "Rows", "Tags", "Roles", "Suggested"]);
    for analysis in &analyses {
        let roles = analysis
            .key_columns
            .iter()
            .map(|(role, idx)| {
                let header = analysis.headers.get(*idx).map(String::as_str).unwrap_or("?");
                format!("{role}={header}")
            })
            .join(", ");
        let suggested = analysis
            .suggested_sources
            .iter()
            .map(|s| format!("{} ({:.1})", s.source, s.confidence))
            .join(", ");
        table.push_row([
            analysis.name.clone(),
            analysis.row_count.to_string(),
            analysis.tags.iter().map(|t| t.as_str()).join(", "),
            roles,
            suggested,
        ]);
    }
    for skipped in &workbook.skipped {
        table.push_row([
            skipped.name.clone(),
            "-".to_string(),
            format!("skipped: {}", skipped.reason),
        ]);
    }
    table.print();
    Ok(())
}

fn handle_probe(args: &ProbeArgs) -> Result<()> {
    let config = args.sources.load_config()?;
    let params = args.params.resolve(&config)?;
    let executor = open_executor(&args.sources)?;
    let probes = probe_all(
        &executor,
        &config.sources,
        &params,
        &ProbeCache::new(),
        config.probe_workers,
    );
    if args.json {
        let probes = probes.iter().map(|p| p.as_ref()).collect::<Vec<&SourceProbe>>();
        println!("{}", serde_json::to_string_pretty(&probes)?);
        return Ok(());
    }
    let mut table = Table::new(["Source", "Works", "Shape", "Rows", "Columns"]);
    for probe in &probes {
        let detail = match &probe.error {
            Some(err) => err.clone(),
            None => probe.columns.join(", "),
        };
        table.push_row([
            probe.source_name.clone(),
            if probe.works { "yes" } else { "no" }.to_string(),
            probe.output_shape.to_string(),
            probe.row_count.to_string(),
            detail,
        ]);
    }
    table.print();
    Ok(())
}

fn handle_plan(args: &PlanArgs) -> Result<()> {
    let config = args.sources.load_config()?;
    let params = args.params.resolve(&config)?;
    let executor = open_executor(&args.sources)?;
    let workbook = workbook::load_export(&args.input, args.input_encoding.as_deref())
        .with_context(|| format!("Loading export {:?}", args.input))?;
    let analyses = analyzer::analyze_workbook(&workbook);
    let probes = probe_all(
        &executor,
        &config.sources,
        &params,
        &ProbeCache::new(),
        config.probe_workers,
    );
    let plans = selector::plan(&analyses, &probes, &config);

    let mut table = Table::new(["Sheet", "Source", "Confidence", "Evidence"]);
    for plan in &plans {
        match &plan.mapping {
            Some(mapping) => {
                let evidence = plan
                    .candidates
                    .iter()
                    .find(|c| c.source_name == mapping.source_name)
                    .map(|c| c.explain())
                    .unwrap_or_default();
                table.push_row([
                    plan.sheet_name.clone(),
                    mapping.source_name.clone(),
                    format!("{:.2}", mapping.confidence),
                    evidence,
                ]);
            }
            None => table.push_row([
                plan.sheet_name.clone(),
                compare::Status::NoMapping.to_string(),
            ]),
        }
    }
    table.print();
    Ok(())
}

fn handle_reconcile(args: &ReconcileArgs) -> Result<()> {
    let mut config = args.sources.load_config()?;
    if let Some(layout) = args.layout {
        config.report_layout = layout.into();
    }
    let params = args.params.resolve(&config)?;
    let executor = open_executor(&args.sources)?;
    let reconciler = Reconciler::new(Arc::new(executor), config)
        .with_input_encoding(args.input_encoding.clone());
    let outcome = reconciler
        .try_reconcile(&args.input, &params, &args.output)
        .with_context(|| format!("Reconciling {:?}", args.input))?;
    if let Some(path) = &args.summary_json {
        report::write_summary_json(&outcome, path)?;
    }

    let mut table = Table::new(["Sheet", "Source", "Match", "Mismatch", "Not Found", "Other"]);
    for sheet in &outcome.sheets {
        let counts = sheet.counts();
        table.push_row([
            sheet.sheet_name.clone(),
            sheet
                .source_name
                .clone()
                .unwrap_or_else(|| compare::Status::NoMapping.to_string()),
            counts.matches.to_string(),
            counts.mismatches.to_string(),
            counts.not_found.to_string(),
            (counts.total() - counts.compared()).to_string(),
        ]);
    }
    table.print();
    let totals = outcome.totals();
    println!(
        "{} strategy, success rate {:.2}%, report {}",
        outcome.strategy,
        totals.success_rate(),
        args.output.display()
    );
    Ok(())
}

fn handle_init_config(args: &InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    EngineConfig::default()
        .save(&args.output)
        .with_context(|| format!("Writing default config to {:?}", args.output))?;
    info!("Default engine configuration written to {:?}", args.output);
    Ok(())
}
