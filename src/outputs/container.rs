//! Self-describing container (NetCDF) probing.
//!
//! Whether a file is a container is decided from its magic bytes, not from a
//! failed open, so a corrupt NetCDF file is reported as such rather than being
//! sniffed as text.

use super::OutputKind;
use crate::error::ResolveError;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

pub const MESH_TOPOLOGY: &str = "adcirc_mesh";
pub const MAX_ELEVATION: &str = "zeta_max";
pub const TIME_OF_MAX_ELEVATION: &str = "time_of_zeta_max";
pub const ELEVATION: &str = "zeta";
pub const HARMONIC_PHASE: &str = "phs";

const HDF5_SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    NotContainer,
    Variables(BTreeSet<String>),
}

/// Map a container's variable set to the output it holds.
pub fn classify(variables: &BTreeSet<String>) -> Option<OutputKind> {
    let has = |name: &str| variables.contains(name);
    if has(MESH_TOPOLOGY) {
        if has(MAX_ELEVATION) {
            Some(OutputKind::SurfaceMaxima)
        } else if has(ELEVATION) {
            Some(OutputKind::SurfaceTimeseries)
        } else {
            None
        }
    } else if has(ELEVATION) {
        Some(OutputKind::Stations)
    } else if has(HARMONIC_PHASE) {
        Some(OutputKind::HarmonicConstituentsStations)
    } else {
        None
    }
}

/// NetCDF classic (`CDF\x01`, `CDF\x02`, `CDF\x05`) or NetCDF-4/HDF5.
pub fn has_container_signature(path: &Path) -> Result<bool, ResolveError> {
    let mut head = [0u8; 8];
    let mut file = std::fs::File::open(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ResolveError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    let head = &head[..filled];
    let classic = head.len() >= 4 && &head[..3] == b"CDF" && matches!(head[3], 1 | 2 | 5);
    Ok(classic || head == HDF5_SIGNATURE)
}

/// List the container's variable names, or report that it is not a container.
pub fn inspect(path: &Path) -> Result<Inspection, ResolveError> {
    if !has_container_signature(path)? {
        return Ok(Inspection::NotContainer);
    }
    list_variables(path).map(Inspection::Variables)
}

#[cfg(feature = "netcdf")]
fn list_variables(path: &Path) -> Result<BTreeSet<String>, ResolveError> {
    let file = netcdf::open(path).map_err(|e| container_error(path, e))?;
    Ok(file.variables().map(|v| v.name()).collect())
}

#[cfg(not(feature = "netcdf"))]
fn list_variables(path: &Path) -> Result<BTreeSet<String>, ResolveError> {
    Err(ResolveError::Container {
        path: path.to_path_buf(),
        reason: "NetCDF support not compiled in (rebuild with --features netcdf)".into(),
    })
}

/// Read a 1-D float variable; `None` when the container lacks it.
#[cfg(feature = "netcdf")]
pub fn read_f64(path: &Path, name: &str) -> Result<Option<Vec<f64>>, ResolveError> {
    let file = netcdf::open(path).map_err(|e| container_error(path, e))?;
    let Some(var) = file.variable(name) else {
        return Ok(None);
    };
    var.get_values::<f64, _>(..)
        .map(Some)
        .map_err(|e| container_error(path, e))
}

#[cfg(feature = "netcdf")]
fn container_error(path: &Path, e: netcdf::Error) -> ResolveError {
    ResolveError::Container {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
