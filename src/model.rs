use crate::decks::{ForcingModel, MeshModel};
use crate::error::ConfigError;
use crate::metrics::ExtremaSummary;
use crate::outputs::{FormatFamily, OutputKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;

/// Phase of an ADCIRC run. Chosen once per run: `Single` iff the spin-up is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Single,
    Coldstart,
    Hotstart,
}

impl ExecutionPhase {
    /// Name of the time-control deck written for this phase in the working directory.
    pub fn control_deck_name(self) -> &'static str {
        match self {
            ExecutionPhase::Single => "fort.15",
            ExecutionPhase::Coldstart => "fort.15.coldstart",
            ExecutionPhase::Hotstart => "fort.15.hotstart",
        }
    }

    /// Sub-directory the phase runs in; `None` means the working directory itself.
    pub fn dir_name(self) -> Option<&'static str> {
        match self {
            ExecutionPhase::Single => None,
            ExecutionPhase::Coldstart => Some("coldstart"),
            ExecutionPhase::Hotstart => Some("hotstart"),
        }
    }

    pub fn restart(self) -> RestartMode {
        match self {
            ExecutionPhase::Single | ExecutionPhase::Coldstart => RestartMode::Cold,
            ExecutionPhase::Hotstart => RestartMode::Hot,
        }
    }
}

/// The IHOT setting of a time-control deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    Cold,
    Hot,
}

impl RestartMode {
    /// IHOT value: 0 for a cold start, 567 for a hot start from `fort.67.nc`.
    pub fn ihot(self) -> u32 {
        match self {
            RestartMode::Cold => 0,
            RestartMode::Hot => 567,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    Surface,
    Stations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicalVariable {
    Elevation,
    Velocity,
    Meteorological,
    Concentration,
}

impl PhysicalVariable {
    pub fn as_str(self) -> &'static str {
        match self {
            PhysicalVariable::Elevation => "elevation",
            PhysicalVariable::Velocity => "velocity",
            PhysicalVariable::Meteorological => "meteorological",
            PhysicalVariable::Concentration => "concentration",
        }
    }
}

/// Output window boundary: either an offset from the phase start or a timestep index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    Step(u64),
    Offset(#[serde(with = "humantime_serde")] Duration),
}

/// One output request for a (target, variable) pair.
///
/// Fields are private so every request goes through the validating constructor
/// and `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRequest {
    #[serde(with = "humantime_serde")]
    sampling_interval: Option<Duration>,
    #[serde(with = "humantime_serde")]
    spinup_sampling_interval: Option<Duration>,
    start: Option<TimeBound>,
    end: Option<TimeBound>,
    spinup_start: Option<TimeBound>,
    spinup_end: Option<TimeBound>,
    container: bool,
    harmonic_analysis: bool,
}

impl OutputRequest {
    /// `None` samples every timestep.
    pub fn new(sampling_interval: Option<Duration>) -> Result<Self, ConfigError> {
        check_interval("sampling interval", sampling_interval)?;
        Ok(Self {
            sampling_interval,
            spinup_sampling_interval: None,
            start: None,
            end: None,
            spinup_start: None,
            spinup_end: None,
            container: true,
            harmonic_analysis: false,
        })
    }

    pub fn with_window(
        mut self,
        start: Option<TimeBound>,
        end: Option<TimeBound>,
    ) -> Result<Self, ConfigError> {
        check_window("output window", start, end)?;
        self.start = start;
        self.end = end;
        Ok(self)
    }

    pub fn with_spinup_window(
        mut self,
        start: Option<TimeBound>,
        end: Option<TimeBound>,
    ) -> Result<Self, ConfigError> {
        check_window("spin-up output window", start, end)?;
        self.spinup_start = start;
        self.spinup_end = end;
        Ok(self)
    }

    pub fn with_spinup_sampling(mut self, interval: Option<Duration>) -> Result<Self, ConfigError> {
        check_interval("spin-up sampling interval", interval)?;
        self.spinup_sampling_interval = interval;
        Ok(self)
    }

    pub fn with_container(mut self, container: bool) -> Self {
        self.container = container;
        self
    }

    pub fn with_harmonic_analysis(mut self, harmonic_analysis: bool) -> Self {
        self.harmonic_analysis = harmonic_analysis;
        self
    }

    pub fn sampling_interval(&self) -> Option<Duration> {
        self.sampling_interval
    }

    pub fn window(&self) -> (Option<TimeBound>, Option<TimeBound>) {
        (self.start, self.end)
    }

    pub fn container(&self) -> bool {
        self.container
    }

    pub fn harmonic_analysis(&self) -> bool {
        self.harmonic_analysis
    }
}

fn check_interval(field: &'static str, interval: Option<Duration>) -> Result<(), ConfigError> {
    match interval {
        Some(d) if d.is_zero() => Err(ConfigError::InvalidOption {
            field,
            reason: "must be positive; leave unset to sample every timestep".into(),
        }),
        _ => Ok(()),
    }
}

fn check_window(
    field: &'static str,
    start: Option<TimeBound>,
    end: Option<TimeBound>,
) -> Result<(), ConfigError> {
    let ordered = match (start, end) {
        (Some(TimeBound::Offset(s)), Some(TimeBound::Offset(e))) => e >= s,
        (Some(TimeBound::Step(s)), Some(TimeBound::Step(e))) => e >= s,
        _ => true,
    };
    if ordered {
        Ok(())
    } else {
        Err(ConfigError::InvalidOption {
            field,
            reason: "end bound precedes start bound".into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub name: String,
    pub coordinates: [f64; 2],
}

/// Stations for one physical variable plus the request that samples them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StationGroup {
    pub request: Option<OutputRequest>,
    stations: Vec<Station>,
}

impl StationGroup {
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    fn add(
        &mut self,
        variable: PhysicalVariable,
        name: &str,
        coordinates: &[f64],
    ) -> Result<(), ConfigError> {
        let coordinates: [f64; 2] =
            coordinates
                .try_into()
                .map_err(|_| ConfigError::CoordinateShape {
                    name: name.to_string(),
                    got: coordinates.len(),
                })?;
        if !coordinates.iter().all(|c| c.is_finite()) {
            return Err(ConfigError::NonFiniteCoordinate {
                name: name.to_string(),
            });
        }
        if self.stations.iter().any(|s| s.name == name) {
            return Err(ConfigError::DuplicateStation {
                variable: variable.as_str().to_string(),
                name: name.to_string(),
            });
        }
        self.stations.push(Station {
            name: name.to_string(),
            coordinates,
        });
        Ok(())
    }

    fn remove(&mut self, variable: PhysicalVariable, name: &str) -> Result<Station, ConfigError> {
        let idx = self
            .stations
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownStation {
                variable: variable.as_str().to_string(),
                name: name.to_string(),
            })?;
        Ok(self.stations.remove(idx))
    }
}

/// One value per physical variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariableOutputs<T> {
    pub elevation: T,
    pub velocity: T,
    pub meteorological: T,
    pub concentration: T,
}

impl<T> VariableOutputs<T> {
    pub fn get(&self, variable: PhysicalVariable) -> &T {
        match variable {
            PhysicalVariable::Elevation => &self.elevation,
            PhysicalVariable::Velocity => &self.velocity,
            PhysicalVariable::Meteorological => &self.meteorological,
            PhysicalVariable::Concentration => &self.concentration,
        }
    }

    pub fn get_mut(&mut self, variable: PhysicalVariable) -> &mut T {
        match variable {
            PhysicalVariable::Elevation => &mut self.elevation,
            PhysicalVariable::Velocity => &mut self.velocity,
            PhysicalVariable::Meteorological => &mut self.meteorological,
            PhysicalVariable::Concentration => &mut self.concentration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputRequests {
    pub surface: VariableOutputs<Option<OutputRequest>>,
    pub stations: VariableOutputs<StationGroup>,
}

/// Wave model coupled to the hotstart phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveCoupling {
    pub model: String,
}

impl WaveCoupling {
    pub fn is_swan(&self) -> bool {
        self.model.eq_ignore_ascii_case("swan")
    }
}

/// Everything the pipeline needs to stage and run one simulation.
///
/// The mesh is owned by the caller. Output requests and stations may only be
/// changed while nothing else borrows the configuration, so registration always
/// happens before `run`/`write`.
pub struct RunConfiguration<'m> {
    mesh: &'m dyn MeshModel,
    start_date: OffsetDateTime,
    end_date: OffsetDateTime,
    spinup: Duration,
    tidal_forcing: Option<Box<dyn ForcingModel>>,
    wind_forcing: Option<Box<dyn ForcingModel>>,
    waves: Option<WaveCoupling>,
    netcdf: bool,
    outputs: OutputRequests,
}

impl<'m> RunConfiguration<'m> {
    pub fn new(
        mesh: &'m dyn MeshModel,
        start_date: OffsetDateTime,
        end_date: OffsetDateTime,
        spinup: Duration,
    ) -> Result<Self, ConfigError> {
        if mesh.crs().is_none() {
            return Err(ConfigError::MissingCrs);
        }
        if end_date <= start_date {
            return Err(ConfigError::DateOrder {
                start: start_date.to_string(),
                end: end_date.to_string(),
            });
        }
        Ok(Self {
            mesh,
            start_date,
            end_date,
            spinup,
            tidal_forcing: None,
            wind_forcing: None,
            waves: None,
            netcdf: true,
            outputs: OutputRequests::default(),
        })
    }

    pub fn with_tidal_forcing(mut self, forcing: Box<dyn ForcingModel>) -> Self {
        self.tidal_forcing = Some(forcing);
        self
    }

    pub fn with_wind_forcing(mut self, forcing: Box<dyn ForcingModel>) -> Self {
        self.wind_forcing = Some(forcing);
        self
    }

    pub fn with_waves(mut self, waves: WaveCoupling) -> Self {
        self.waves = Some(waves);
        self
    }

    /// Default container flag for requests registered afterwards.
    pub fn with_netcdf(mut self, netcdf: bool) -> Self {
        self.netcdf = netcdf;
        self
    }

    pub fn mesh(&self) -> &'m dyn MeshModel {
        self.mesh
    }

    pub fn start_date(&self) -> OffsetDateTime {
        self.start_date
    }

    pub fn end_date(&self) -> OffsetDateTime {
        self.end_date
    }

    pub fn spinup(&self) -> Duration {
        self.spinup
    }

    /// Forcing has to start before the run window by the spin-up duration.
    pub fn forcing_start_date(&self) -> OffsetDateTime {
        self.start_date - self.spinup
    }

    pub fn tidal_forcing(&self) -> Option<&dyn ForcingModel> {
        self.tidal_forcing.as_deref()
    }

    pub fn wind_forcing(&self) -> Option<&dyn ForcingModel> {
        self.wind_forcing.as_deref()
    }

    pub fn waves(&self) -> Option<&WaveCoupling> {
        self.waves.as_ref()
    }

    pub fn netcdf(&self) -> bool {
        self.netcdf
    }

    pub fn outputs(&self) -> &OutputRequests {
        &self.outputs
    }

    /// Phases implied by the spin-up, filtered by the caller's phase switches.
    /// A zero spin-up always yields a single production phase.
    pub fn phases(&self, run_coldstart: bool, run_hotstart: bool) -> Vec<ExecutionPhase> {
        if self.spinup.is_zero() {
            return vec![ExecutionPhase::Single];
        }
        let mut phases = Vec::with_capacity(2);
        if run_coldstart {
            phases.push(ExecutionPhase::Coldstart);
        }
        if run_hotstart {
            phases.push(ExecutionPhase::Hotstart);
        }
        phases
    }

    /// Register or replace the request for a (target, variable) pair. A request
    /// built with [`OutputRequest::new`] inherits the run's container flag unless
    /// `with_container` was called on it explicitly afterwards.
    pub fn set_output(
        &mut self,
        target: OutputTarget,
        variable: PhysicalVariable,
        request: OutputRequest,
    ) {
        match target {
            OutputTarget::Surface => *self.outputs.surface.get_mut(variable) = Some(request),
            OutputTarget::Stations => self.outputs.stations.get_mut(variable).request = Some(request),
        }
    }

    /// A fresh request whose container flag follows the run's netcdf setting.
    pub fn output_request(&self, sampling_interval: Option<Duration>) -> Result<OutputRequest, ConfigError> {
        Ok(OutputRequest::new(sampling_interval)?.with_container(self.netcdf))
    }

    pub fn add_station(
        &mut self,
        variable: PhysicalVariable,
        name: &str,
        coordinates: &[f64],
    ) -> Result<(), ConfigError> {
        self.outputs
            .stations
            .get_mut(variable)
            .add(variable, name, coordinates)
    }

    pub fn remove_station(
        &mut self,
        variable: PhysicalVariable,
        name: &str,
    ) -> Result<Station, ConfigError> {
        self.outputs.stations.get_mut(variable).remove(variable, name)
    }
}

/// Outcome of one external process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    /// Lines read before the MPI termination sentinel (if any).
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// One `Elevation.gt.WarnElev` report from the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlowupEvent {
    pub timestep: u64,
    pub time: f64,
    pub max_elevation: f64,
    pub max_elevation_node: u64,
    pub max_speed: f64,
    pub max_speed_node: u64,
}

/// Serialisable record of a finished run, printed, exported and auto-saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub timestamp_utc: String,
    pub workdir: PathBuf,
    pub phases: Vec<ExecutionPhase>,
    pub workers: usize,
    pub remote: bool,
    pub crs: String,
    pub outputs: Vec<ReportedOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedOutput {
    pub path: PathBuf,
    pub family: FormatFamily,
    pub kind: OutputKind,
    pub summary: Option<ExtremaSummary>,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    PhaseStarted {
        phase: ExecutionPhase,
    },
    ProcessStarted {
        argv: Vec<String>,
        cwd: PathBuf,
    },
    /// One echoed stdout line of the running process.
    ProcessOutput {
        line: String,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the engine and consumed by the CLI layer.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    WorkersResolved { count: usize, auto: bool },
    InputsWritten { dir: PathBuf },
    PhaseStaged { phase: ExecutionPhase, dir: PathBuf },
    JobSubmitted { script: PathBuf },
    OutputResolved { path: PathBuf },
}

impl InfoEvent {
    /// Render a human-readable message for the CLI.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::WorkersResolved { count, auto } => {
                if *auto {
                    format!("Using {} workers (physical cores)", count)
                } else {
                    format!("Using {} workers", count)
                }
            }
            InfoEvent::InputsWritten { dir } => format!("Wrote input decks to {}", dir.display()),
            InfoEvent::PhaseStaged { phase, dir } => {
                format!("Staged {:?} in {}", phase, dir.display())
            }
            InfoEvent::JobSubmitted { script } => {
                format!("Submitted cluster job {}", script.display())
            }
            InfoEvent::OutputResolved { path } => format!("Found output {}", path.display()),
        }
    }
}
