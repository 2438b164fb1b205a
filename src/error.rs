//! Typed errors for configuration, pipeline execution and output resolution.
//!
//! The CLI converts these into `anyhow` errors at the boundary; everything below
//! `cli.rs` returns one of the enums here so callers can render diagnostics
//! (blowup events, residual stderr, partial classifications) without re-parsing logs.

use crate::model::BlowupEvent;
use crate::outputs::Classification;
use std::path::PathBuf;

/// Invalid run configuration, detected when the configuration is built or mutated.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("end date {end} must be after start date {start}")]
    DateOrder { start: String, end: String },

    #[error("mesh has no coordinate reference system; set one before setting up a model run")]
    MissingCrs,

    #[error("station {name} already exists in the {variable} station group; station names must be unique")]
    DuplicateStation { variable: String, name: String },

    #[error("station {name} is not in the {variable} station group")]
    UnknownStation { variable: String, name: String },

    #[error("station {name} needs exactly two coordinates, got {got}")]
    CoordinateShape { name: String, got: usize },

    #[error("station {name} has non-finite coordinates")]
    NonFiniteCoordinate { name: String },

    #[error("invalid {field}: {reason}")]
    InvalidOption { field: &'static str, reason: String },

    #[error("invalid worker count {0:?}: expected a positive integer or \"auto\"")]
    WorkerCount(String),

    #[error("manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

/// Failure of a pipeline run. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("simulation diverged: Elevation.gt.ErrorElev ({} warning events before stop)", events.len())]
    Divergence { events: Vec<BlowupEvent> },

    #[error("solver wrote unexpected diagnostics to stderr:\n{residual}")]
    UnexpectedProcessOutput { residual: String },

    #[error("could not read blowup diagnostics: missing {field} in segment {segment:?}")]
    MalformedDiagnostics { field: &'static str, segment: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("no outputs found (looked for {})", display_paths(searched))]
    NoOutputsFound { searched: Vec<PathBuf> },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failure to classify or load a result file.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unsupported output format in {path}: {reason}")]
    UnsupportedOutputFormat {
        path: PathBuf,
        reason: String,
        partial: Classification,
    },

    #[error("{0}")]
    MissingDependency(String),

    #[error("{path}: leading integer {value} suggests a harmonic constituents file, but {reason}; the header may be a malformed two-integer header")]
    AmbiguousHeader {
        path: PathBuf,
        value: usize,
        reason: String,
    },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{path}: {reason}")]
    Container { path: PathBuf, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
