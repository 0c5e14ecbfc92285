use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    config::{EngineConfig, ReportLayout},
    data::parse_naive_date,
    params::Parameters,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile exported dashboard workbooks against database queries",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the inferred structure of every sheet in an export
    Analyze(AnalyzeArgs),
    /// Run every candidate source once and print its output shape
    Probe(ProbeArgs),
    /// Print the sheet to source plan with score breakdowns
    Plan(PlanArgs),
    /// Compare an export against its sources and write the report workbook
    Reconcile(ReconcileArgs),
    /// Write the built-in engine configuration as YAML
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// SQLite database the sources run against
    #[arg(long = "db")]
    pub db: PathBuf,
    /// YAML file mapping source names to SQL
    #[arg(short = 'q', long = "queries")]
    pub queries: PathBuf,
    /// Engine configuration YAML (built-in rules if omitted)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

impl SourceArgs {
    pub fn load_config(&self) -> Result<EngineConfig> {
        match &self.config {
            Some(path) => {
                EngineConfig::load(path).with_context(|| format!("Loading config from {path:?}"))
            }
            None => Ok(EngineConfig::default()),
        }
    }
}

/// The seven query parameters. Unset values come from the configured
/// defaults.
#[derive(Debug, Args, Default)]
pub struct ParamArgs {
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long)]
    pub month: Option<u32>,
    #[arg(long)]
    pub store: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub channel: Option<String>,
    /// Start date (YYYY-MM-DD, DD/MM/YYYY, ...)
    #[arg(long = "from-date", value_parser = parse_date)]
    pub from_date: Option<NaiveDate>,
    /// End date (YYYY-MM-DD, DD/MM/YYYY, ...)
    #[arg(long = "to-date", value_parser = parse_date)]
    pub to_date: Option<NaiveDate>,
    /// Drill-through selection such as a store name or id
    #[arg(long = "drillthrough")]
    pub drillthrough: Option<String>,
}

impl ParamArgs {
    pub fn resolve(&self, config: &EngineConfig) -> Result<Parameters> {
        let mut params = config.default_parameters.clone();
        if let Some(year) = self.year {
            params.year = year;
        }
        params.month = self.month.or(params.month);
        params.store = self.store.clone().or(params.store);
        params.state = self.state.clone().or(params.state);
        params.channel = self.channel.clone().or(params.channel);
        params.from_date = self.from_date.or(params.from_date);
        params.to_date = self.to_date.or(params.to_date);
        if let Some(selection) = &self.drillthrough {
            params = params.for_drillthrough(selection, &config.drillthrough);
        }
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Exported workbook (.xlsx, .xls, .ods) or CSV/TSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Character encoding of a CSV export (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub sources: SourceArgs,
    #[command(flatten)]
    pub params: ParamArgs,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Exported workbook (.xlsx, .xls, .ods) or CSV/TSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub sources: SourceArgs,
    #[command(flatten)]
    pub params: ParamArgs,
    /// Character encoding of a CSV export (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum LayoutChoice {
    /// Shape-specific wide columns per sheet
    Structure,
    /// `[Identifier, Metric, Excel Value, DB Value, Status]` rows
    Rows,
}

impl From<LayoutChoice> for ReportLayout {
    fn from(choice: LayoutChoice) -> Self {
        match choice {
            LayoutChoice::Structure => ReportLayout::Structure,
            LayoutChoice::Rows => ReportLayout::Rows,
        }
    }
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Exported workbook (.xlsx, .xls, .ods) or CSV/TSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination report workbook (.xlsx)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    #[command(flatten)]
    pub sources: SourceArgs,
    #[command(flatten)]
    pub params: ParamArgs,
    /// Override the configured report layout
    #[arg(long, value_enum)]
    pub layout: Option<LayoutChoice>,
    /// Also write a JSON run summary to this path
    #[arg(long = "summary-json")]
    pub summary_json: Option<PathBuf>,
    /// Character encoding of a CSV export (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_naive_date(value).map_err(|err| err.to_string())
}
