//! Divergence detection over solver stderr.
//!
//! ADCIRC reports each elevation excursion as a block introduced by
//! `** WARNING: Elevation.gt.WarnElev **` and gives up with
//! `Elevation.gt.ErrorElev, ADCIRC stopping.` once the error threshold is hit.

use crate::error::PipelineError;
use crate::model::BlowupEvent;

pub const FATAL_MARKER: &str = "Elevation.gt.ErrorElev, ADCIRC stopping.";
pub const WARNING_MARKER: &str = "Elevation.gt.WarnElev";
/// gfortran prints this (plus a line listing the flags) on exit; it carries no failure.
pub const BENIGN_MARKER: &str = "floating-point exceptions are signalling";

const TIMESTEP_KEY: &str = "TIME STEP =";
const TIME_KEY: &str = "TIME =";
const ELMAX_KEY: &str = "ELMAX =";
const SPEEDMAX_KEY: &str = "SPEEDMAX =";
const NODE_KEY: &str = "AT NODE";

#[derive(Debug, Clone, PartialEq)]
pub enum BlowupFailure {
    /// Fatal marker seen; events in the order the solver reported them.
    Diverged(Vec<BlowupEvent>),
    /// No fatal marker, but stderr had content that is not known to be harmless.
    Unexpected(String),
    /// Fatal marker seen but a warning block could not be read.
    Malformed { field: &'static str, segment: String },
}

impl From<BlowupFailure> for PipelineError {
    fn from(failure: BlowupFailure) -> Self {
        match failure {
            BlowupFailure::Diverged(events) => PipelineError::Divergence { events },
            BlowupFailure::Unexpected(residual) => PipelineError::UnexpectedProcessOutput { residual },
            BlowupFailure::Malformed { field, segment } => {
                PipelineError::MalformedDiagnostics { field, segment }
            }
        }
    }
}

/// Decide whether a solver run succeeded from its stderr alone.
pub fn inspect(stderr: &[String]) -> Result<(), BlowupFailure> {
    let text = stderr.join("\n");
    if text.contains(FATAL_MARKER) {
        return Err(match events(&text) {
            Ok(events) => BlowupFailure::Diverged(events),
            Err(failure) => failure,
        });
    }

    let residual = residual_lines(stderr);
    if residual.is_empty() {
        Ok(())
    } else {
        Err(BlowupFailure::Unexpected(residual.join("\n")))
    }
}

/// One event per warning block that mentions `TIME`.
fn events(text: &str) -> Result<Vec<BlowupEvent>, BlowupFailure> {
    text.split(WARNING_MARKER)
        .filter(|segment| segment.contains("TIME"))
        .map(parse_segment)
        .collect()
}

fn parse_segment(segment: &str) -> Result<BlowupEvent, BlowupFailure> {
    let mut nodes = segment.split(NODE_KEY).skip(1);
    let max_elevation_node = nodes.next().and_then(first_token);
    let max_speed_node = nodes.next().and_then(first_token);

    Ok(BlowupEvent {
        timestep: number(segment, "timestep", token_after(segment, TIMESTEP_KEY))?,
        time: number(segment, "time", token_after(segment, TIME_KEY))?,
        max_elevation: number(segment, "max elevation", token_after(segment, ELMAX_KEY))?,
        max_elevation_node: number(segment, "max elevation node", max_elevation_node)?,
        max_speed: number(segment, "max speed", token_after(segment, SPEEDMAX_KEY))?,
        max_speed_node: number(segment, "max speed node", max_speed_node)?,
    })
}

fn token_after<'a>(segment: &'a str, key: &str) -> Option<&'a str> {
    segment.split_once(key).and_then(|(_, rest)| first_token(rest))
}

fn first_token(s: &str) -> Option<&str> {
    s.split_whitespace()
        .next()
        .map(|t| t.trim_end_matches(','))
}

fn number<T: std::str::FromStr>(
    segment: &str,
    field: &'static str,
    token: Option<&str>,
) -> Result<T, BlowupFailure> {
    token
        // Fortran may print double-precision exponents as `1.0D+01`.
        .map(|t| t.replace(['D', 'd'], "E"))
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| BlowupFailure::Malformed {
            field,
            segment: segment.trim().to_string(),
        })
}

/// Stderr minus blank lines and the benign floating-point note with its flag list.
fn residual_lines(stderr: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut lines = stderr.iter().map(String::as_str).peekable();
    while let Some(line) = lines.next() {
        if line.contains(BENIGN_MARKER) {
            if lines.peek().is_some_and(|next| is_fpe_flag_list(next)) {
                lines.next();
            }
            continue;
        }
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    out
}

/// e.g. `IEEE_UNDERFLOW_FLAG IEEE_DENORMAL`
fn is_fpe_flag_list(line: &str) -> bool {
    let mut tokens = line.split_whitespace().peekable();
    tokens.peek().is_some() && tokens.all(|t| t.starts_with("IEEE_"))
}
