use crate::model::RunReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Directory that auto-saved run reports go to.
pub fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory for this user")?;
    Ok(base.join("adcirc-driver").join("runs"))
}

/// Save a report under [`runs_dir`], named after its timestamp.
pub fn save_run(report: &RunReport) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, report)
}

fn save_run_in(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let name = format!(
        "run-{}.json",
        report.timestamp_utc.replace(':', "-").replace('T', "_")
    );
    let path = dir.join(name);
    export_json(&path, report)?;
    Ok(path)
}

pub fn export_json(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
