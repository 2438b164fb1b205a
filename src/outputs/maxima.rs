use super::lines::LineReader;
use super::resolver::TextHeader;
use crate::error::ResolveError;
use serde::Serialize;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Written by ADCIRC for dry or never-wetted nodes.
pub const MASK_VALUE: f64 = -99999.0;

/// Per-node extremum of a surface field (e.g. maxele.63).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceExtrema {
    pub time: f64,
    pub timestep: u64,
    pub node_ids: Vec<u64>,
    /// `None` where the file holds the mask value.
    pub values: Vec<Option<f64>>,
    /// Time each node reached its extremum, when the file has a second dataset.
    pub extremum_times: Option<Vec<f64>>,
}

impl SurfaceExtrema {
    /// Read a text surface-maxima file whose header has already been classified.
    pub fn read_text(path: &Path, header: &TextHeader) -> Result<Self, ResolveError> {
        let file = std::fs::File::open(path).map_err(|source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = LineReader::new(BufReader::new(file));
        reader
            .skip(header.data_offset)
            .map_err(|source| ResolveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_lines(path, &mut reader, header)
    }

    /// Parse the records following the header: a `time timestep` line, one
    /// `node value` line per point, then for two datasets a second block whose
    /// second column is the time of the extremum.
    pub fn from_lines<R: BufRead>(
        path: &Path,
        reader: &mut LineReader<R>,
        header: &TextHeader,
    ) -> Result<Self, ResolveError> {
        let points = header.point_count;
        let mut records = Records { path, reader };

        let (time, timestep) = records.pair::<f64, u64>("time and timestep")?;
        let mut node_ids = Vec::with_capacity(points);
        let mut values = Vec::with_capacity(points);
        for _ in 0..points {
            let (node, value) = records.pair::<u64, f64>("node id and value")?;
            node_ids.push(node);
            values.push((value != MASK_VALUE).then_some(value));
        }

        let extremum_times = if header.dataset_count == Some(2) {
            let mut times = Vec::with_capacity(points);
            for _ in 0..points {
                let (_, t) = records.pair::<String, f64>("node id and time of extremum")?;
                times.push(t);
            }
            Some(times)
        } else {
            None
        };

        Ok(Self {
            time,
            timestep,
            node_ids,
            values,
            extremum_times,
        })
    }

    /// Read `zeta_max` (and `time_of_zeta_max` when present) from a NetCDF maxele.
    #[cfg(feature = "netcdf")]
    pub fn read_container(path: &Path) -> Result<Self, ResolveError> {
        use super::container::{read_f64, MAX_ELEVATION, TIME_OF_MAX_ELEVATION};

        let raw = read_f64(path, MAX_ELEVATION)?.ok_or_else(|| ResolveError::Container {
            path: path.to_path_buf(),
            reason: format!("missing {MAX_ELEVATION}"),
        })?;
        let time = read_f64(path, "time")?
            .and_then(|t| t.last().copied())
            .unwrap_or(0.0);
        Ok(Self {
            time,
            timestep: 0,
            node_ids: (1..=raw.len() as u64).collect(),
            values: raw
                .into_iter()
                .map(|v| (v != MASK_VALUE && v.is_finite()).then_some(v))
                .collect(),
            extremum_times: read_f64(path, TIME_OF_MAX_ELEVATION)?,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(node id, value)` for every unmasked node.
    pub fn valid(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.node_ids
            .iter()
            .zip(&self.values)
            .filter_map(|(id, v)| v.map(|v| (*id, v)))
    }

    pub fn masked_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

struct Records<'a, R> {
    path: &'a Path,
    reader: &'a mut LineReader<R>,
}

impl<R: BufRead> Records<'_, R> {
    fn pair<A: std::str::FromStr, B: std::str::FromStr>(
        &mut self,
        what: &str,
    ) -> Result<(A, B), ResolveError> {
        let line = self
            .reader
            .next_line()
            .map_err(|source| ResolveError::Io {
                path: self.path.to_path_buf(),
                source,
            })?;
        let number = self.reader.line_number();
        let Some(line) = line else {
            return Err(self.malformed(number + 1, format!("unexpected end of file, expected {what}")));
        };
        let mut tokens = line.split_whitespace();
        let a = tokens.next().and_then(|t| t.parse().ok());
        let b = tokens.next().and_then(|t| t.parse().ok());
        match (a, b) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(self.malformed(number, format!("expected {what}, got {line:?}"))),
        }
    }

    fn malformed(&self, line: usize, reason: String) -> ResolveError {
        ResolveError::Malformed {
            path: self.path.to_path_buf(),
            line,
            reason,
        }
    }
}
