//! Result-file classification and loading.
//!
//! `resolve` decides what a file is; `dispatch` turns a resolved file into a
//! record for the kinds that have a reader. Both are pure functions of the file
//! contents and the supplied options.

pub mod container;
mod lines;
mod maxima;
mod resolver;

pub use maxima::SurfaceExtrema;
pub use resolver::{resolve, ResolveOptions, TextHeader};

use crate::error::ResolveError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Container,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    SurfaceMaxima,
    SurfaceTimeseries,
    Stations,
    HarmonicConstituentsStations,
    HarmonicConstituentsSurface,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::SurfaceMaxima => "surface maxima",
            OutputKind::SurfaceTimeseries => "surface time series",
            OutputKind::Stations => "stations",
            OutputKind::HarmonicConstituentsStations => "harmonic constituents (stations)",
            OutputKind::HarmonicConstituentsSurface => "harmonic constituents (surface)",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully classified result file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum OutputDescriptor {
    Container {
        kind: OutputKind,
        variables: BTreeSet<String>,
    },
    Text {
        kind: OutputKind,
        header: TextHeader,
    },
}

impl OutputDescriptor {
    pub fn family(&self) -> FormatFamily {
        match self {
            OutputDescriptor::Container { .. } => FormatFamily::Container,
            OutputDescriptor::Text { .. } => FormatFamily::Text,
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            OutputDescriptor::Container { kind, .. } | OutputDescriptor::Text { kind, .. } => *kind,
        }
    }
}

/// How far classification got. Carried by unsupported-format errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Container {
        kind: Option<OutputKind>,
        variables: BTreeSet<String>,
    },
    Text {
        kind: Option<OutputKind>,
        header: Option<TextHeader>,
    },
}

/// What a resolved file was loaded into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum OutputRecord {
    SurfaceExtrema(SurfaceExtrema),
    /// Classified, but no reader exists for this kind.
    ClassifiedOnly,
}

/// Route a resolved file to the reader for its kind.
pub fn dispatch(path: &Path, descriptor: &OutputDescriptor) -> Result<OutputRecord, ResolveError> {
    debug!(path = %path.display(), kind = %descriptor.kind(), "dispatching output");
    match descriptor {
        OutputDescriptor::Text {
            kind: OutputKind::SurfaceMaxima,
            header,
        } => SurfaceExtrema::read_text(path, header).map(OutputRecord::SurfaceExtrema),
        #[cfg(feature = "netcdf")]
        OutputDescriptor::Container {
            kind: OutputKind::SurfaceMaxima,
            ..
        } => SurfaceExtrema::read_container(path).map(OutputRecord::SurfaceExtrema),
        _ => Ok(OutputRecord::ClassifiedOnly),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedOutput {
    pub path: PathBuf,
    pub descriptor: OutputDescriptor,
    pub record: OutputRecord,
}

/// Loaded outputs of one run, tagged with the mesh CRS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputCollection {
    pub crs: String,
    pub outputs: Vec<CollectedOutput>,
}

impl OutputCollection {
    pub fn new(crs: impl Into<String>) -> Self {
        Self {
            crs: crs.into(),
            outputs: Vec::new(),
        }
    }

    /// Resolve and load one file into the collection.
    pub fn add(&mut self, path: &Path, opts: &ResolveOptions) -> Result<&CollectedOutput, ResolveError> {
        let descriptor = resolve(path, opts)?;
        let record = dispatch(path, &descriptor)?;
        self.outputs.push(CollectedOutput {
            path: path.to_path_buf(),
            descriptor,
            record,
        });
        Ok(&self.outputs[self.outputs.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectedOutput> {
        self.outputs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_loads_text_maxima() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxele.63");
        std::fs::write(
            &path,
            "maxele\n1 3 -99999 -99999 1\n86400.0 1440\n1 0.5\n2 -99999.0\n3 1.5\n",
        )
        .unwrap();

        let mut collection = OutputCollection::new("EPSG:4326");
        assert!(collection.is_empty());
        let opts = ResolveOptions {
            mesh_points: Some(3),
            control_file: None,
        };
        let added = collection.add(&path, &opts).unwrap();
        assert_eq!(added.descriptor.kind(), OutputKind::SurfaceMaxima);
        assert_eq!(added.descriptor.family(), FormatFamily::Text);
        match &added.record {
            OutputRecord::SurfaceExtrema(extrema) => {
                assert_eq!(extrema.values, vec![Some(0.5), None, Some(1.5)]);
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn harmonic_stations_are_classified_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.51");
        std::fs::write(&path, "1\n1.405e-4 1.0 0.0 M2\n2\n").unwrap();
        let opts = ResolveOptions {
            mesh_points: None,
            control_file: Some(dir.path().join("fort.15")),
        };
        let descriptor = resolve(&path, &opts).unwrap();
        assert_eq!(dispatch(&path, &descriptor).unwrap(), OutputRecord::ClassifiedOnly);
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn netcdf_maxima_resolve_and_load_with_masking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxele.63.nc");
        container::testing::write_maxele(&path, &[0.5, -99999.0, 1.5]);

        let descriptor = resolve(&path, &ResolveOptions::default()).unwrap();
        assert_eq!(descriptor.family(), FormatFamily::Container);
        assert_eq!(descriptor.kind(), OutputKind::SurfaceMaxima);

        match dispatch(&path, &descriptor).unwrap() {
            OutputRecord::SurfaceExtrema(extrema) => {
                assert_eq!(extrema.values, vec![Some(0.5), None, Some(1.5)]);
                assert_eq!(extrema.node_ids, vec![1, 2, 3]);
                assert_eq!(extrema.time, 172_800.0);
                assert_eq!(extrema.extremum_times, Some(vec![0.0, 3600.0, 7200.0]));
                assert_eq!(extrema.masked_count(), 1);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
