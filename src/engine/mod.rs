pub mod blowup;
pub mod process;
pub mod staging;

pub use process::{ProcessLauncher, SystemLauncher};

use crate::decks::{ClusterJob, ControlDeck, ControlDeckWriter};
use crate::error::{ConfigError, PipelineError};
use crate::model::{ExecutionPhase, InfoEvent, RunConfiguration, RunEvent};
use crate::outputs::{OutputCollection, ResolveOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Job script name used when a cluster collaborator is configured.
pub const JOB_SCRIPT: &str = "slurm.job";

/// Number of MPI workers. `Auto` means one per physical core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerCount {
    #[default]
    Auto,
    Explicit(usize),
}

impl WorkerCount {
    pub fn resolve(self) -> usize {
        match self {
            WorkerCount::Auto => num_cpus::get_physical(),
            WorkerCount::Explicit(n) => n,
        }
    }
}

impl FromStr for WorkerCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(WorkerCount::Auto);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(WorkerCount::Explicit(n)),
            _ => Err(ConfigError::WorkerCount(s.to_string())),
        }
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerCount::Auto => f.write_str("auto"),
            WorkerCount::Explicit(n) => write!(f, "{n}"),
        }
    }
}

/// Where a run currently is. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    WriteInputs,
    Phase(ExecutionPhase),
    Remote,
    CollectOutputs,
    Done,
    Failed,
}

/// Per-run knobs that are not part of the model configuration.
pub struct RunOptions<'a> {
    pub workdir: PathBuf,
    pub workers: WorkerCount,
    pub run_coldstart: bool,
    pub run_hotstart: bool,
    pub overwrite: bool,
    /// Replaces local staging and solver runs with a submitted job.
    pub cluster: Option<&'a dyn ClusterJob>,
}

impl<'a> RunOptions<'a> {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            workers: WorkerCount::Auto,
            run_coldstart: true,
            run_hotstart: true,
            overwrite: false,
            cluster: None,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub workdir: PathBuf,
    pub phases: Vec<ExecutionPhase>,
    pub workers: usize,
    pub remote: bool,
    pub outputs: OutputCollection,
}

pub struct SimulationEngine<'a, L> {
    launcher: L,
    decks: &'a dyn ControlDeckWriter,
}

impl<'a, L: ProcessLauncher> SimulationEngine<'a, L> {
    pub fn new(launcher: L, decks: &'a dyn ControlDeckWriter) -> Self {
        Self { launcher, decks }
    }

    /// Write every input deck the run needs into `outdir`.
    pub fn write(
        &self,
        config: &RunConfiguration<'_>,
        outdir: &Path,
        overwrite: bool,
        cluster: Option<&dyn ClusterJob>,
    ) -> Result<(), PipelineError> {
        create_outdir(outdir, overwrite)?;
        let mesh = config.mesh();

        for deck in shared_decks(config) {
            let path = outdir.join(deck);
            let written = match (deck, config.wind_forcing()) {
                ("fort.14", _) => mesh.write_mesh_deck(&path),
                ("fort.13", _) => mesh.write_nodal_attributes_deck(&path),
                ("fort.22", Some(wind)) => {
                    debug!(forcing = %wind.label(), "writing wind deck");
                    wind.write_deck(&path)
                }
                _ => continue,
            };
            written.map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))?;
        }

        // A single phase never hot-starts.
        let phases: &[ExecutionPhase] = if config.spinup().is_zero() {
            &[ExecutionPhase::Single]
        } else {
            &[ExecutionPhase::Coldstart, ExecutionPhase::Hotstart]
        };
        for &phase in phases {
            self.write_control(config, outdir, phase)?;
        }

        if let Some(cluster) = cluster {
            let script = outdir.join(JOB_SCRIPT);
            cluster
                .write_script(config, &script)
                .map_err(|e| PipelineError::io(format!("writing {}", script.display()), e))?;
        }
        Ok(())
    }

    /// Write inputs, run every phase and collect the outputs of the last one.
    pub async fn run(
        &self,
        config: &RunConfiguration<'_>,
        opts: &RunOptions<'_>,
        event_tx: mpsc::UnboundedSender<RunEvent>,
    ) -> Result<RunOutcome, PipelineError> {
        let mut state = PipelineState::Init;
        let result = self.drive(config, opts, &event_tx, &mut state).await;
        if let Err(e) = &result {
            warn!(state = ?state, error = %e, "run failed");
            enter(&mut state, PipelineState::Failed);
        }
        result
    }

    async fn drive(
        &self,
        config: &RunConfiguration<'_>,
        opts: &RunOptions<'_>,
        event_tx: &mpsc::UnboundedSender<RunEvent>,
        state: &mut PipelineState,
    ) -> Result<RunOutcome, PipelineError> {
        let workdir = &opts.workdir;
        let workers = opts.workers.resolve();
        let _ = event_tx.send(RunEvent::Info(InfoEvent::WorkersResolved {
            count: workers,
            auto: opts.workers == WorkerCount::Auto,
        }));

        enter(state, PipelineState::WriteInputs);
        self.write(config, workdir, opts.overwrite, opts.cluster)?;
        let _ = event_tx.send(RunEvent::Info(InfoEvent::InputsWritten {
            dir: workdir.clone(),
        }));

        let phases = config.phases(opts.run_coldstart, opts.run_hotstart);
        let remote = opts.cluster.is_some();
        if let Some(cluster) = opts.cluster {
            enter(state, PipelineState::Remote);
            let script = workdir.join(JOB_SCRIPT);
            cluster
                .submit(&script, workdir)
                .map_err(|e| PipelineError::io(format!("submitting {}", script.display()), e))?;
            let _ = event_tx.send(RunEvent::Info(InfoEvent::JobSubmitted { script }));
        } else {
            for &phase in &phases {
                enter(state, PipelineState::Phase(phase));
                let _ = event_tx.send(RunEvent::PhaseStarted { phase });
                self.run_phase(config, phase, workdir, workers, event_tx).await?;
            }
        }

        enter(state, PipelineState::CollectOutputs);
        let final_phase = phases.last().copied().unwrap_or(ExecutionPhase::Hotstart);
        let outputs = collect_outputs(config, workdir, final_phase, event_tx)?;

        enter(state, PipelineState::Done);
        Ok(RunOutcome {
            workdir: workdir.clone(),
            phases,
            workers,
            remote,
            outputs,
        })
    }

    async fn run_phase(
        &self,
        config: &RunConfiguration<'_>,
        phase: ExecutionPhase,
        workdir: &Path,
        workers: usize,
        event_tx: &mpsc::UnboundedSender<RunEvent>,
    ) -> Result<(), PipelineError> {
        let solver = solver_for(config, phase)?;
        let dir = staging::stage_phase(workdir, phase, &shared_decks(config))?;
        if phase != ExecutionPhase::Single {
            let _ = event_tx.send(RunEvent::Info(InfoEvent::PhaseStaged {
                phase,
                dir: dir.clone(),
            }));
        }
        self.partition(&dir, workers, event_tx).await?;

        let argv = vec![
            "mpiexec".to_string(),
            "-n".to_string(),
            workers.to_string(),
            solver.to_string(),
        ];
        let result = self.launch(argv, &dir, event_tx).await?;
        if let Err(failure) = blowup::inspect(&result.stderr) {
            warn!(?phase, exit_code = ?result.exit_code, "solver reported a failure");
            return Err(failure.into());
        }
        info!(?phase, exit_code = ?result.exit_code, "phase finished");
        Ok(())
    }

    /// `adcprep --partmesh` then `--prepall`. Serial runs are not supported.
    async fn partition(
        &self,
        dir: &Path,
        workers: usize,
        event_tx: &mpsc::UnboundedSender<RunEvent>,
    ) -> Result<(), PipelineError> {
        if workers <= 1 {
            return Err(PipelineError::NotImplemented(format!(
                "serial runs (mesh partitioning needs at least 2 workers, got {workers})"
            )));
        }
        for step in ["--partmesh", "--prepall"] {
            let argv = vec![
                "adcprep".to_string(),
                "--np".to_string(),
                workers.to_string(),
                step.to_string(),
            ];
            let result = self.launch(argv, dir, event_tx).await?;
            for line in &result.stderr {
                debug!(step, %line, "adcprep stderr");
            }
        }
        let _ = event_tx.send(RunEvent::Info(InfoEvent::Message(format!(
            "Partitioned mesh for {workers} workers"
        ))));
        Ok(())
    }

    async fn launch(
        &self,
        argv: Vec<String>,
        cwd: &Path,
        event_tx: &mpsc::UnboundedSender<RunEvent>,
    ) -> Result<crate::model::ProcessResult, PipelineError> {
        info!(command = %argv.join(" "), cwd = %cwd.display(), "launching");
        let _ = event_tx.send(RunEvent::ProcessStarted {
            argv: argv.clone(),
            cwd: cwd.to_path_buf(),
        });
        self.launcher.launch(&argv, cwd, event_tx).await
    }

    fn write_control(
        &self,
        config: &RunConfiguration<'_>,
        outdir: &Path,
        phase: ExecutionPhase,
    ) -> Result<(), PipelineError> {
        let path = outdir.join(phase.control_deck_name());
        let deck = ControlDeck {
            phase,
            restart: phase.restart(),
        };
        self.decks
            .write_control_deck(config, deck, &path)
            .map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))
    }
}

/// Decks written next to the control decks and linked into every phase directory.
/// The wind deck is only used by two-phase runs.
fn shared_decks(config: &RunConfiguration<'_>) -> Vec<&'static str> {
    let mut decks = vec!["fort.14"];
    if !config.mesh().nodal_attribute_names().is_empty() {
        decks.push("fort.13");
    }
    if !config.spinup().is_zero() && config.wind_forcing().is_some() {
        decks.push("fort.22");
    }
    decks
}

/// Wave coupling only applies to the production (hotstart) phase.
fn solver_for(config: &RunConfiguration<'_>, phase: ExecutionPhase) -> Result<&'static str, PipelineError> {
    match (phase, config.waves()) {
        (ExecutionPhase::Hotstart, Some(waves)) if waves.is_swan() => Ok("padcswan"),
        (ExecutionPhase::Hotstart, Some(waves)) => Err(PipelineError::NotImplemented(format!(
            "unknown wave coupling type {:?}",
            waves.model
        ))),
        _ => Ok("padcirc"),
    }
}

fn create_outdir(outdir: &Path, overwrite: bool) -> Result<(), PipelineError> {
    let context = || format!("creating {}", outdir.display());
    if outdir.exists() {
        if overwrite {
            return Ok(());
        }
        return Err(PipelineError::io(
            context(),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "directory exists and overwrite is not enabled",
            ),
        ));
    }
    std::fs::create_dir_all(outdir).map_err(|e| PipelineError::io(context(), e))
}

/// Expected maxima file of the final phase: NetCDF or ASCII per the run's flag.
fn collect_outputs(
    config: &RunConfiguration<'_>,
    workdir: &Path,
    final_phase: ExecutionPhase,
    event_tx: &mpsc::UnboundedSender<RunEvent>,
) -> Result<OutputCollection, PipelineError> {
    let dir = match final_phase.dir_name() {
        Some(name) => workdir.join(name),
        None => workdir.to_path_buf(),
    };
    let name = if config.netcdf() { "maxele.63.nc" } else { "maxele.63" };
    let expected = vec![dir.join(name)];

    let opts = ResolveOptions {
        mesh_points: Some(config.mesh().node_count()),
        control_file: None,
    };
    let mut collection = OutputCollection::new(config.mesh().crs().unwrap_or_default());
    for path in &expected {
        if !path.is_file() {
            debug!(path = %path.display(), "expected output missing");
            continue;
        }
        collection.add(path, &opts)?;
        let _ = event_tx.send(RunEvent::Info(InfoEvent::OutputResolved { path: path.clone() }));
    }

    if collection.is_empty() {
        return Err(PipelineError::NoOutputsFound { searched: expected });
    }
    Ok(collection)
}

fn enter(state: &mut PipelineState, next: PipelineState) {
    debug!(from = ?*state, to = ?next, "pipeline state");
    *state = next;
}
