//! Input-deck collaborators.
//!
//! The pipeline never serializes meshes or forcing itself. It talks to these
//! traits, and the CLI plugs in file-backed implementations (`files`) plus a
//! template-rendered time-control deck (`template`).

mod files;
mod template;

pub use files::{ForcingFile, MeshFiles, TidalConstituents};
pub use template::TemplateControlDeck;

use crate::model::{ExecutionPhase, RestartMode, RunConfiguration};
use std::io;
use std::path::Path;

/// Mesh geometry as far as the driver cares: size, CRS and deck writing.
pub trait MeshModel {
    fn node_count(&self) -> usize;
    fn crs(&self) -> Option<&str>;
    fn nodal_attribute_names(&self) -> Vec<String>;
    /// Write the fort.14 deck.
    fn write_mesh_deck(&self, path: &Path) -> io::Result<()>;
    /// Write the fort.13 deck. Only called when nodal attributes exist.
    fn write_nodal_attributes_deck(&self, path: &Path) -> io::Result<()>;
}

/// Tidal or meteorological forcing.
pub trait ForcingModel {
    /// Short label used in logs, reports and deck templates.
    fn label(&self) -> String;

    /// Write the forcing's own deck. Forcing carried by the control deck has none.
    fn write_deck(&self, path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} has no deck of its own ({})", self.label(), path.display()),
        ))
    }
}

/// Which time-control deck to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlDeck {
    pub phase: ExecutionPhase,
    pub restart: RestartMode,
}

/// Writer for fort.15 time-control decks.
pub trait ControlDeckWriter {
    fn write_control_deck(
        &self,
        config: &RunConfiguration<'_>,
        deck: ControlDeck,
        path: &Path,
    ) -> io::Result<()>;
}

/// Queue-managed cluster execution. When configured, local staging and solver
/// runs are replaced by a job script that the cluster runs in the working directory.
pub trait ClusterJob {
    fn write_script(&self, config: &RunConfiguration<'_>, path: &Path) -> io::Result<()>;
    /// Submit the script and return once the remote run has finished.
    fn submit(&self, script: &Path, workdir: &Path) -> io::Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators for tests.

    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    pub struct FakeMesh {
        nodes: usize,
        crs: Option<String>,
        attributes: Vec<String>,
    }

    impl FakeMesh {
        pub fn new(nodes: usize) -> Self {
            Self {
                nodes,
                crs: Some("EPSG:4326".into()),
                attributes: Vec::new(),
            }
        }

        pub fn without_crs(mut self) -> Self {
            self.crs = None;
            self
        }

        pub fn with_attribute(mut self, name: &str) -> Self {
            self.attributes.push(name.into());
            self
        }
    }

    impl MeshModel for FakeMesh {
        fn node_count(&self) -> usize {
            self.nodes
        }

        fn crs(&self) -> Option<&str> {
            self.crs.as_deref()
        }

        fn nodal_attribute_names(&self) -> Vec<String> {
            self.attributes.clone()
        }

        fn write_mesh_deck(&self, path: &Path) -> io::Result<()> {
            std::fs::write(path, format!("fake mesh\n0 {}\n", self.nodes))
        }

        fn write_nodal_attributes_deck(&self, path: &Path) -> io::Result<()> {
            std::fs::write(path, self.attributes.join("\n"))
        }
    }

    pub struct FakeForcing(pub &'static str);

    impl ForcingModel for FakeForcing {
        fn label(&self) -> String {
            self.0.to_string()
        }

        fn write_deck(&self, path: &Path) -> io::Result<()> {
            std::fs::write(path, self.0)
        }
    }

    /// Records every deck it writes as `(phase, restart, file name)`.
    #[derive(Default)]
    pub struct RecordingDecks {
        pub written: RefCell<Vec<(ExecutionPhase, RestartMode, String)>>,
    }

    impl ControlDeckWriter for RecordingDecks {
        fn write_control_deck(
            &self,
            _config: &RunConfiguration<'_>,
            deck: ControlDeck,
            path: &Path,
        ) -> io::Result<()> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.written
                .borrow_mut()
                .push((deck.phase, deck.restart, name));
            std::fs::write(path, format!("IHOT = {}\n", deck.restart.ihot()))
        }
    }

    /// Pretends to run the job remotely by dropping the given artifact into the workdir.
    pub struct FakeCluster {
        pub artifact: Option<(PathBuf, String)>,
        pub submitted: RefCell<Vec<PathBuf>>,
    }

    impl ClusterJob for FakeCluster {
        fn write_script(&self, _config: &RunConfiguration<'_>, path: &Path) -> io::Result<()> {
            std::fs::write(path, "#!/bin/bash\n#SBATCH -J adcirc\n")
        }

        fn submit(&self, script: &Path, workdir: &Path) -> io::Result<()> {
            self.submitted.borrow_mut().push(script.to_path_buf());
            if let Some((rel, content)) = &self.artifact {
                let path = workdir.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
            }
            Ok(())
        }
    }
}
