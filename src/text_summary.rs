//! Text summary builder for CLI output.
//!
//! This module formats human-readable lines for reports, resolved outputs and
//! divergence diagnostics.

use crate::metrics::ExtremaSummary;
use crate::model::{BlowupEvent, RunReport};
use crate::outputs::{Classification, OutputDescriptor};
use std::path::Path;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a finished run.
pub(crate) fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();

    let phases = report
        .phases
        .iter()
        .map(|p| format!("{p:?}").to_lowercase())
        .collect::<Vec<_>>()
        .join(" -> ");
    lines.push(format!("Working directory: {}", report.workdir.display()));
    lines.push(format!(
        "Phases: {} ({} workers{})",
        if phases.is_empty() { "-" } else { phases.as_str() },
        report.workers,
        if report.remote { ", cluster job" } else { "" }
    ));
    lines.push(format!("CRS: {}", report.crs));

    for output in &report.outputs {
        lines.push(format!(
            "Output: {} ({}, {:?})",
            output.path.display(),
            output.kind,
            output.family
        ));
        if let Some(summary) = output.summary.as_ref() {
            lines.extend(extrema_lines(summary));
        }
    }

    TextSummary { lines }
}

pub(crate) fn extrema_lines(summary: &ExtremaSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "  Nodes: {} ({} masked)",
        summary.nodes, summary.masked
    )];
    if let (Some(value), Some(node)) = (summary.max_value, summary.max_node) {
        lines.push(format!("  Max: {value:.3} at node {node}"));
    }
    if let (Some(mean), Some(median), Some(p25), Some(p75)) =
        (summary.mean, summary.median, summary.p25, summary.p75)
    {
        lines.push(format!(
            "  Values: avg {mean:.3} med {median:.3} p25 {p25:.3} p75 {p75:.3}"
        ));
    }
    lines
}

/// Describe a resolved file.
pub(crate) fn descriptor_lines(path: &Path, descriptor: &OutputDescriptor) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", path.display(), descriptor.kind())];
    match descriptor {
        OutputDescriptor::Container { variables, .. } => {
            let names = variables.iter().map(String::as_str).collect::<Vec<_>>();
            lines.push(format!("  NetCDF variables: {}", names.join(", ")));
        }
        OutputDescriptor::Text { header, .. } => {
            lines.push(format!("  Points: {}", header.point_count));
            if let Some(datasets) = header.dataset_count {
                lines.push(format!("  Datasets: {datasets}"));
            }
            if let Some(constituents) = header.constituent_count {
                lines.push(format!("  Constituents: {constituents}"));
            }
        }
    }
    lines
}

/// How far classification got before a file was rejected.
pub(crate) fn classification_lines(partial: &Classification) -> Vec<String> {
    match partial {
        Classification::Container { kind, variables } => {
            let names = variables.iter().map(String::as_str).collect::<Vec<_>>();
            vec![
                format!(
                    "  Container, kind: {}",
                    kind.map_or("unknown", |k| k.as_str())
                ),
                format!("  Variables: {}", names.join(", ")),
            ]
        }
        Classification::Text { kind, header } => {
            let mut lines = vec![format!(
                "  Text, kind: {}",
                kind.map_or("unknown", |k| k.as_str())
            )];
            if let Some(h) = header {
                lines.push(format!(
                    "  Header: {} points, {} datasets",
                    h.point_count,
                    h.dataset_count.map_or("-".to_string(), |d| d.to_string())
                ));
            }
            lines
        }
    }
}

/// Table of the warning events leading up to a divergence.
pub(crate) fn divergence_lines(events: &[BlowupEvent]) -> Vec<String> {
    if events.is_empty() {
        return vec!["No Elevation.gt.WarnElev events were reported before the stop.".into()];
    }
    let mut lines = vec![format!(
        "{:>10} {:>14} {:>12} {:>10} {:>12} {:>10}",
        "timestep", "time (s)", "max elev", "node", "max speed", "node"
    )];
    for e in events {
        lines.push(format!(
            "{:>10} {:>14.1} {:>12.4} {:>10} {:>12.4} {:>10}",
            e.timestep, e.time, e.max_elevation, e.max_elevation_node, e.max_speed, e.max_speed_node
        ));
    }
    lines
}
