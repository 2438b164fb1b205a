//! JSON run manifest.
//!
//! Relative paths are resolved against the manifest's own directory. Every value
//! goes through the same validating constructors as the programmatic API.

use crate::decks::{ForcingFile, MeshFiles, TemplateControlDeck, TidalConstituents};
use crate::error::ConfigError;
use crate::model::{
    OutputRequest, OutputTarget, PhysicalVariable, RunConfiguration, TimeBound, WaveCoupling,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshEntry {
    pub fort14: PathBuf,
    #[serde(default)]
    pub fort13: Option<PathBuf>,
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputEntry {
    pub target: OutputTarget,
    pub variable: PhysicalVariable,
    /// Omit to sample every timestep.
    #[serde(default, with = "humantime_serde")]
    pub sampling: Option<Duration>,
    #[serde(default)]
    pub start: Option<TimeBound>,
    #[serde(default)]
    pub end: Option<TimeBound>,
    #[serde(default, with = "humantime_serde")]
    pub spinup_sampling: Option<Duration>,
    #[serde(default)]
    pub spinup_start: Option<TimeBound>,
    #[serde(default)]
    pub spinup_end: Option<TimeBound>,
    /// Defaults to the run's `netcdf` flag.
    #[serde(default)]
    pub netcdf: Option<bool>,
    #[serde(default)]
    pub harmonic_analysis: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationEntry {
    pub variable: PhysicalVariable,
    pub name: String,
    /// Kept as a list so a wrong shape is reported by name rather than as a parse error.
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    #[serde(skip)]
    path: PathBuf,
    pub mesh: MeshEntry,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(default, with = "humantime_serde")]
    pub spinup: Option<Duration>,
    /// `minijinja` template for the fort.15 decks.
    pub control_template: PathBuf,
    #[serde(default)]
    pub tidal_constituents: Vec<String>,
    /// Prepared fort.22 wind deck.
    #[serde(default)]
    pub wind_deck: Option<PathBuf>,
    /// Wave model coupled to the hotstart phase (`swan`).
    #[serde(default)]
    pub waves: Option<String>,
    #[serde(default = "default_netcdf")]
    pub netcdf: bool,
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
    #[serde(default)]
    pub stations: Vec<StationEntry>,
}

fn default_netcdf() -> bool {
    true
}

impl RunManifest {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| manifest_error(path, e))?;
        Self::from_json(path, &text)
    }

    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let mut manifest: RunManifest =
            serde_json::from_str(text).map_err(|e| manifest_error(path, e))?;
        manifest.path = path.to_path_buf();
        debug!(path = %path.display(), outputs = manifest.outputs.len(), stations = manifest.stations.len(), "loaded manifest");
        Ok(manifest)
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        match self.path.parent() {
            Some(base) => base.join(p),
            None => p.to_path_buf(),
        }
    }

    pub fn open_mesh(&self) -> Result<MeshFiles, ConfigError> {
        let fort14 = self.resolve(&self.mesh.fort14);
        let fort13 = self.mesh.fort13.as_deref().map(|p| self.resolve(p));
        MeshFiles::open(&fort14, fort13.as_deref(), self.mesh.crs.clone())
            .map_err(|e| manifest_error(&self.path, format!("mesh {}: {e}", fort14.display())))
    }

    pub fn control_decks(&self) -> Result<TemplateControlDeck, ConfigError> {
        let template = self.resolve(&self.control_template);
        TemplateControlDeck::from_file(&template)
            .map_err(|e| manifest_error(&self.path, format!("template {}: {e}", template.display())))
    }

    /// Build the run configuration over an already opened mesh.
    pub fn configuration<'m>(&self, mesh: &'m MeshFiles) -> Result<RunConfiguration<'m>, ConfigError> {
        let mut config = RunConfiguration::new(
            mesh,
            self.start_date,
            self.end_date,
            self.spinup.unwrap_or(Duration::ZERO),
        )?
        .with_netcdf(self.netcdf);

        if !self.tidal_constituents.is_empty() {
            config = config.with_tidal_forcing(Box::new(TidalConstituents(
                self.tidal_constituents.clone(),
            )));
        }
        if let Some(deck) = &self.wind_deck {
            let path = self.resolve(deck);
            if !path.is_file() {
                return Err(manifest_error(
                    &self.path,
                    format!("wind deck {} does not exist", path.display()),
                ));
            }
            config = config.with_wind_forcing(Box::new(ForcingFile {
                label: format!("wind ({})", deck.display()),
                path,
            }));
        }
        if let Some(model) = &self.waves {
            config = config.with_waves(WaveCoupling {
                model: model.clone(),
            });
        }

        for out in &self.outputs {
            let request = OutputRequest::new(out.sampling)?
                .with_window(out.start, out.end)?
                .with_spinup_window(out.spinup_start, out.spinup_end)?
                .with_spinup_sampling(out.spinup_sampling)?
                .with_container(out.netcdf.unwrap_or(self.netcdf))
                .with_harmonic_analysis(out.harmonic_analysis);
            config.set_output(out.target, out.variable, request);
        }
        for station in &self.stations {
            config.add_station(station.variable, &station.name, &station.coordinates)?;
        }
        Ok(config)
    }
}

fn manifest_error(path: &Path, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Manifest {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
