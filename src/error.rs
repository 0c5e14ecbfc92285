use std::path::PathBuf;

use thiserror::Error;

/// Failure raised by a [`crate::source::SourceExecutor`].
///
/// A source error never aborts a run: the prober marks the source as not
/// working and the comparison engine records it against the affected rows.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{0}' is not defined")]
    Unknown(String),
    #[error("source '{name}' failed: {message}")]
    Execution { name: String, message: String },
    #[error("source '{name}' rejected parameter '{parameter}'")]
    InvalidParameter { name: String, parameter: String },
}

impl SourceError {
    pub fn execution(name: &str, err: impl std::fmt::Display) -> Self {
        SourceError::Execution {
            name: name.to_string(),
            message: err.to_string(),
        }
    }

    /// `true` when the source itself does not exist, as opposed to a failing
    /// execution of an existing source.
    pub fn is_missing(&self) -> bool {
        matches!(self, SourceError::Unknown(_))
    }
}

/// File-level failures. These are the only errors that escape a run.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("export file {path:?} could not be opened: {message}")]
    UnreadableExport { path: PathBuf, message: String },
    #[error("export file {0:?} contains no sheets")]
    EmptyExport(PathBuf),
    #[error("report {path:?} could not be written: {message}")]
    ReportWrite { path: PathBuf, message: String },
}

/// Total failure of one comparison strategy. The engine falls back to the
/// next strategy when it sees one of these.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no candidate source returned data")]
    NoWorkingSources,
    #[error("no sheet could be mapped to a source")]
    NoMappings,
}
