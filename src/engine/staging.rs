//! Phase directory staging.
//!
//! Each phase of a two-phase run gets a fresh `<workdir>/<phase>/` populated with
//! symlinks to the shared decks, so both phases see the same mesh and forcing.

use crate::error::PipelineError;
use crate::model::ExecutionPhase;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hot-start checkpoint written by the coldstart phase.
pub const RESTART_ARTIFACT: &str = "fort.67.nc";

/// Create `<workdir>/<phase>/` from scratch and link its inputs. Returns the phase directory.
///
/// `shared` names the decks written for this run; anything else lying in the
/// working directory is left out.
pub fn stage_phase(
    workdir: &Path,
    phase: ExecutionPhase,
    shared: &[&str],
) -> Result<PathBuf, PipelineError> {
    let Some(name) = phase.dir_name() else {
        return Ok(workdir.to_path_buf());
    };
    let workdir = std::path::absolute(workdir)
        .map_err(|e| PipelineError::io(format!("resolving {}", workdir.display()), e))?;
    let phase_dir = workdir.join(name);

    if phase_dir.exists() {
        debug!(dir = %phase_dir.display(), "removing previous phase directory");
        std::fs::remove_dir_all(&phase_dir)
            .map_err(|e| PipelineError::io(format!("removing {}", phase_dir.display()), e))?;
    }
    std::fs::create_dir(&phase_dir)
        .map_err(|e| PipelineError::io(format!("creating {}", phase_dir.display()), e))?;

    for &deck in shared {
        let src = require(&workdir.join(deck), name)?;
        link(&src, &phase_dir.join(deck))?;
    }

    let control = require(&workdir.join(phase.control_deck_name()), name)?;
    link(&control, &phase_dir.join("fort.15"))?;

    if phase == ExecutionPhase::Hotstart {
        let restart = workdir.join("coldstart").join(RESTART_ARTIFACT);
        if !restart.exists() {
            // The link is still created; the solver reports the missing checkpoint itself.
            warn!(path = %restart.display(), "coldstart restart artifact not found");
        }
        link(&restart, &phase_dir.join(RESTART_ARTIFACT))?;
    }

    Ok(phase_dir)
}

fn require(path: &Path, phase_name: &str) -> Result<PathBuf, PipelineError> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    Err(PipelineError::io(
        format!("staging {phase_name}"),
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} was not written", path.display()),
        ),
    ))
}

fn link(src: &Path, dst: &Path) -> Result<(), PipelineError> {
    debug!(src = %src.display(), dst = %dst.display(), "linking");
    symlink(src, dst).map_err(|e| {
        PipelineError::io(
            format!("linking {} -> {}", dst.display(), src.display()),
            e,
        )
    })
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn workdir_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            fs::write(dir.path().join(f), f).unwrap();
        }
        dir
    }

    #[test]
    fn coldstart_links_shared_decks_and_phase_control() {
        let dir = workdir_with(&["fort.14", "fort.15.coldstart", "fort.15.hotstart"]);
        let staged = stage_phase(dir.path(), ExecutionPhase::Coldstart, &["fort.14"]).unwrap();

        assert_eq!(staged, dir.path().join("coldstart"));
        assert_eq!(fs::read_to_string(staged.join("fort.15")).unwrap(), "fort.15.coldstart");
        assert!(fs::symlink_metadata(staged.join("fort.14")).unwrap().file_type().is_symlink());
        assert!(!staged.join("fort.13").exists());
        assert!(!staged.join("fort.67.nc").exists());
    }

    #[test]
    fn hotstart_links_coldstart_checkpoint() {
        let dir = workdir_with(&["fort.14", "fort.13", "fort.15.coldstart", "fort.15.hotstart"]);
        fs::create_dir(dir.path().join("coldstart")).unwrap();
        fs::write(dir.path().join("coldstart/fort.67.nc"), "checkpoint").unwrap();

        let staged =
            stage_phase(dir.path(), ExecutionPhase::Hotstart, &["fort.14", "fort.13"]).unwrap();
        assert_eq!(fs::read_to_string(staged.join("fort.15")).unwrap(), "fort.15.hotstart");
        assert_eq!(fs::read_to_string(staged.join("fort.13")).unwrap(), "fort.13");
        assert_eq!(fs::read_to_string(staged.join("fort.67.nc")).unwrap(), "checkpoint");
    }

    #[test]
    fn restaging_starts_from_an_empty_directory() {
        let dir = workdir_with(&["fort.14", "fort.15.coldstart"]);
        let staged = stage_phase(dir.path(), ExecutionPhase::Coldstart, &["fort.14"]).unwrap();
        fs::write(staged.join("fort.63.nc"), "stale").unwrap();

        let staged = stage_phase(dir.path(), ExecutionPhase::Coldstart, &["fort.14"]).unwrap();
        assert!(!staged.join("fort.63.nc").exists());
        assert!(staged.join("fort.15").exists());
    }

    #[test]
    fn missing_control_deck_is_an_io_error() {
        let dir = workdir_with(&["fort.14"]);
        let err = stage_phase(dir.path(), ExecutionPhase::Coldstart, &["fort.14"]).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn missing_shared_deck_is_an_io_error() {
        let dir = workdir_with(&["fort.14", "fort.15.coldstart"]);
        let err = stage_phase(dir.path(), ExecutionPhase::Coldstart, &["fort.14", "fort.22"])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn leftover_decks_outside_the_list_are_not_linked() {
        let dir = workdir_with(&["fort.14", "fort.13", "fort.22", "fort.15.coldstart"]);
        let staged = stage_phase(dir.path(), ExecutionPhase::Coldstart, &["fort.14"]).unwrap();
        assert!(staged.join("fort.14").exists());
        assert!(!staged.join("fort.13").exists());
        assert!(!staged.join("fort.22").exists());
    }

    #[test]
    fn single_phase_uses_the_workdir() {
        let dir = workdir_with(&["fort.14", "fort.15"]);
        let staged = stage_phase(dir.path(), ExecutionPhase::Single, &["fort.14"]).unwrap();
        assert_eq!(staged, dir.path());
    }
}
