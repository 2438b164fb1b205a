//! Post-run processing utilities.
//!
//! Turns an engine outcome into a report, then handles auto-save and exports.

use crate::engine::RunOutcome;
use crate::metrics;
use crate::model::{ReportedOutput, RunReport};
use crate::outputs::OutputRecord;
use crate::storage;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub report: RunReport,
    pub export_messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Summarise every collected output of a finished run.
pub(crate) fn build_report(outcome: &RunOutcome) -> RunReport {
    let outputs = outcome
        .outputs
        .iter()
        .map(|collected| ReportedOutput {
            path: collected.path.clone(),
            family: collected.descriptor.family(),
            kind: collected.descriptor.kind(),
            summary: match &collected.record {
                OutputRecord::SurfaceExtrema(extrema) => Some(metrics::summarize_extrema(extrema)),
                OutputRecord::ClassifiedOnly => None,
            },
        })
        .collect();

    RunReport {
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        workdir: outcome.workdir.clone(),
        phases: outcome.phases.clone(),
        workers: outcome.workers,
        remote: outcome.remote,
        crs: outcome.outputs.crs.clone(),
        outputs,
    }
}

/// Auto-save and export a report. Failures become messages, not errors.
pub(crate) fn process_run_completion(
    outcome: &RunOutcome,
    auto_save: bool,
    export_json: Option<&Path>,
) -> ProcessedRun {
    let report = build_report(outcome);

    let auto_saved_path = if auto_save {
        storage::save_run(&report).ok()
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = export_json {
        match storage::export_json(export_path, &report) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        report,
        export_messages,
        auto_saved_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionPhase;
    use crate::outputs::{CollectedOutput, OutputCollection, OutputDescriptor, OutputKind, SurfaceExtrema, TextHeader};

    fn outcome() -> RunOutcome {
        let mut outputs = OutputCollection::new("EPSG:4326");
        outputs.outputs.push(CollectedOutput {
            path: PathBuf::from("/w/hotstart/maxele.63"),
            descriptor: OutputDescriptor::Text {
                kind: OutputKind::SurfaceMaxima,
                header: TextHeader {
                    point_count: 3,
                    dataset_count: Some(1),
                    constituent_count: None,
                    data_offset: 2,
                },
            },
            record: OutputRecord::SurfaceExtrema(SurfaceExtrema {
                time: 0.0,
                timestep: 0,
                node_ids: vec![1, 2, 3],
                values: vec![Some(1.0), None, Some(3.0)],
                extremum_times: None,
            }),
        });
        RunOutcome {
            workdir: PathBuf::from("/w"),
            phases: vec![ExecutionPhase::Coldstart, ExecutionPhase::Hotstart],
            workers: 4,
            remote: false,
            outputs,
        }
    }

    #[test]
    fn report_summarises_extrema() {
        let report = build_report(&outcome());
        assert_eq!(report.crs, "EPSG:4326");
        assert_eq!(report.outputs.len(), 1);
        let summary = report.outputs[0].summary.as_ref().unwrap();
        assert_eq!(summary.max_value, Some(3.0));
        assert_eq!(summary.max_node, Some(3));
        assert_eq!(summary.masked, 1);
    }

    #[test]
    fn export_failures_are_reported_as_messages() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let processed =
            process_run_completion(&outcome(), false, Some(&blocker.join("report.json")));
        assert!(processed.auto_saved_path.is_none());
        assert_eq!(processed.export_messages.len(), 1);
        assert!(processed.export_messages[0].starts_with("Export JSON failed"));
    }
}
