//! File-backed collaborators: decks that were prepared outside this tool and are
//! copied into the working directory as-is.

use super::{ForcingModel, MeshModel};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A fort.14 (and optional fort.13) already on disk.
#[derive(Debug, Clone)]
pub struct MeshFiles {
    fort14: PathBuf,
    fort13: Option<PathBuf>,
    crs: Option<String>,
    node_count: usize,
    attributes: Vec<String>,
}

impl MeshFiles {
    /// Read the node count from the fort.14 header and the attribute names from fort.13.
    pub fn open(fort14: &Path, fort13: Option<&Path>, crs: Option<String>) -> io::Result<Self> {
        let node_count = read_fort14_node_count(fort14)?;
        let attributes = match fort13 {
            Some(p) => read_fort13_attribute_names(p)?,
            None => Vec::new(),
        };
        Ok(Self {
            fort14: fort14.to_path_buf(),
            fort13: fort13.map(Path::to_path_buf),
            crs,
            node_count,
            attributes,
        })
    }
}

impl MeshModel for MeshFiles {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    fn nodal_attribute_names(&self) -> Vec<String> {
        self.attributes.clone()
    }

    fn write_mesh_deck(&self, path: &Path) -> io::Result<()> {
        fs::copy(&self.fort14, path).map(|_| ())
    }

    fn write_nodal_attributes_deck(&self, path: &Path) -> io::Result<()> {
        match &self.fort13 {
            Some(src) => fs::copy(src, path).map(|_| ()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "mesh has no fort.13 to write",
            )),
        }
    }
}

/// fort.14 line 2 is `NE NP`: element count then node count.
fn read_fort14_node_count(path: &Path) -> io::Result<usize> {
    let mut lines = BufReader::new(fs::File::open(path)?).lines();
    let _title = lines.next().transpose()?;
    let header = lines.next().transpose()?.unwrap_or_default();
    header
        .split_whitespace()
        .nth(1)
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{}: expected `NE NP` on line 2, got {:?}",
                    path.display(),
                    header
                ),
            )
        })
}

/// fort.13 layout: title, node count, attribute count, then four lines per
/// attribute (name, units, values per node, defaults).
fn read_fort13_attribute_names(path: &Path) -> io::Result<Vec<String>> {
    let lines = BufReader::new(fs::File::open(path)?)
        .lines()
        .collect::<io::Result<Vec<_>>>()?;
    let count = lines
        .get(2)
        .and_then(|l| l.split_whitespace().next())
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: missing attribute count on line 3", path.display()),
            )
        })?;
    Ok((0..count)
        .filter_map(|i| lines.get(3 + 4 * i))
        .map(|l| l.trim().to_string())
        .collect())
}

/// A prepared forcing deck (e.g. fort.22) copied into the working directory.
#[derive(Debug, Clone)]
pub struct ForcingFile {
    pub path: PathBuf,
    pub label: String,
}

impl ForcingModel for ForcingFile {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn write_deck(&self, path: &Path) -> io::Result<()> {
        fs::copy(&self.path, path).map(|_| ())
    }
}

/// Tidal constituents; the harmonic forcing itself lives in the time-control deck.
#[derive(Debug, Clone)]
pub struct TidalConstituents(pub Vec<String>);

impl ForcingModel for TidalConstituents {
    fn label(&self) -> String {
        format!("tides ({})", self.0.join(", "))
    }
}
