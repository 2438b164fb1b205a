//! Ordered sniffing of result files: container first, then text layouts.

use super::container::{self, Inspection};
use super::lines::LineReader;
use super::{Classification, OutputDescriptor, OutputKind};
use crate::error::ResolveError;
use serde::Serialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Side information some text layouts need.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Node count of the reference mesh (fort.14).
    pub mesh_points: Option<usize>,
    /// Control file (fort.15) naming the stations of a fort.51.
    pub control_file: Option<PathBuf>,
}

/// Header fields read while classifying a text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextHeader {
    pub point_count: usize,
    pub dataset_count: Option<usize>,
    pub constituent_count: Option<usize>,
    /// Lines before the first record, including any title line.
    pub data_offset: usize,
}

/// Classify `path`. Unimplemented and unrecognised layouts are errors carrying
/// the partial classification.
pub fn resolve(path: &Path, opts: &ResolveOptions) -> Result<OutputDescriptor, ResolveError> {
    let classification = match container::inspect(path)? {
        Inspection::Variables(variables) => Classification::Container {
            kind: container::classify(&variables),
            variables,
        },
        Inspection::NotContainer => {
            let file = std::fs::File::open(path).map_err(|source| ResolveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            classify_text(path, &mut LineReader::new(BufReader::new(file)), opts)?
        }
    };
    debug!(path = %path.display(), ?classification, "classified output");

    match classification {
        Classification::Container {
            kind: Some(kind),
            variables,
        } => Ok(OutputDescriptor::Container { kind, variables }),
        Classification::Text {
            kind: Some(kind @ (OutputKind::SurfaceMaxima | OutputKind::HarmonicConstituentsStations)),
            header: Some(header),
        } => Ok(OutputDescriptor::Text { kind, header }),
        partial => Err(ResolveError::UnsupportedOutputFormat {
            path: path.to_path_buf(),
            reason: unsupported_reason(&partial),
            partial,
        }),
    }
}

fn unsupported_reason(partial: &Classification) -> String {
    match partial {
        Classification::Container { .. } => {
            "container holds no recognised ADCIRC output variables".into()
        }
        Classification::Text {
            kind: Some(kind), ..
        } => format!("reading {kind} text files is not implemented"),
        Classification::Text {
            kind: None,
            header: Some(h),
        } => format!(
            "{} datasets of {} points is not a known surface layout",
            h.dataset_count.unwrap_or(0),
            h.point_count
        ),
        Classification::Text { .. } => "unrecognised layout".into(),
    }
}

/// Text-layout classifier. A bare integer on the first line is taken as the
/// harmonic-constituents layout; anything else must be a `NDSETS NP` header,
/// optionally preceded by one title line.
pub fn classify_text<R: BufRead>(
    path: &Path,
    reader: &mut LineReader<R>,
    opts: &ResolveOptions,
) -> Result<Classification, ResolveError> {
    let io_err = |source: std::io::Error| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let constituents = match reader.peek().map_err(io_err)? {
        None => return Err(malformed(path, 1, "file is empty")),
        Some(first) => first.trim().parse::<usize>().ok(),
    };
    if let Some(count) = constituents {
        reader.next_line().map_err(io_err)?;
        return harmonic(path, reader, count, opts);
    }

    let Some(mesh_points) = opts.mesh_points else {
        return Err(ResolveError::MissingDependency(format!(
            "{}: a mesh (fort.14) is required to classify this output",
            path.display()
        )));
    };

    let header_is_first = reader
        .peek()
        .map_err(io_err)?
        .and_then(fields_header)
        .is_some();
    if !header_is_first {
        reader.next_line().map_err(io_err)?; // title
    }
    let line = reader
        .next_line()
        .map_err(io_err)?
        .ok_or_else(|| malformed(path, reader.line_number() + 1, "missing NDSETS NP header"))?;
    let (datasets, points) = fields_header(&line).ok_or_else(|| {
        malformed(
            path,
            reader.line_number(),
            &format!("expected NDSETS NP header, got {line:?}"),
        )
    })?;

    let header = TextHeader {
        point_count: points,
        dataset_count: Some(datasets),
        constituent_count: None,
        data_offset: reader.line_number(),
    };
    let kind = if points == mesh_points {
        match datasets {
            1 | 2 => Some(OutputKind::SurfaceMaxima),
            n if n > 2 => Some(OutputKind::SurfaceTimeseries),
            _ => None,
        }
    } else {
        Some(OutputKind::Stations)
    };
    Ok(Classification::Text {
        kind,
        header: Some(header),
    })
}

fn harmonic<R: BufRead>(
    path: &Path,
    reader: &mut LineReader<R>,
    constituents: usize,
    opts: &ResolveOptions,
) -> Result<Classification, ResolveError> {
    let ambiguous = |reason: String| ResolveError::AmbiguousHeader {
        path: path.to_path_buf(),
        value: constituents,
        reason,
    };
    let io_err = |source: std::io::Error| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let skipped = reader.skip(constituents).map_err(io_err)?;
    if skipped < constituents {
        return Err(ambiguous(format!(
            "the file ends after {skipped} constituent lines"
        )));
    }
    let points = match reader.next_line().map_err(io_err)? {
        Some(line) => line.trim().parse::<usize>().map_err(|_| {
            ambiguous(format!(
                "line {} is {line:?}, not a point count",
                reader.line_number()
            ))
        })?,
        None => return Err(ambiguous("the point count line is missing".into())),
    };

    let header = TextHeader {
        point_count: points,
        dataset_count: None,
        constituent_count: Some(constituents),
        data_offset: reader.line_number(),
    };
    let kind = if opts.mesh_points == Some(points) {
        OutputKind::HarmonicConstituentsSurface
    } else if opts.control_file.is_some() {
        OutputKind::HarmonicConstituentsStations
    } else {
        return Err(ResolveError::MissingDependency(format!(
            "{}: harmonic constituents files need the mesh (fort.14) for surface output \
             or the control file (fort.15) for station output",
            path.display()
        )));
    };
    Ok(Classification::Text {
        kind: Some(kind),
        header: Some(header),
    })
}

/// `NDSETS NP ...`: the first two tokens as integers.
fn fields_header(line: &str) -> Option<(usize, usize)> {
    let mut tokens = line.split_whitespace();
    let datasets = tokens.next()?.parse().ok()?;
    let points = tokens.next()?.parse().ok()?;
    Some((datasets, points))
}

fn malformed(path: &Path, line: usize, reason: &str) -> ResolveError {
    ResolveError::Malformed {
        path: path.to_path_buf(),
        line,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn mesh(points: usize) -> ResolveOptions {
        ResolveOptions {
            mesh_points: Some(points),
            control_file: None,
        }
    }

    #[test]
    fn three_datasets_on_the_mesh_is_unsupported_timeseries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "fort.63", "3 150\n");
        match resolve(&path, &mesh(150)).unwrap_err() {
            ResolveError::UnsupportedOutputFormat { partial, .. } => match partial {
                Classification::Text {
                    kind: Some(kind),
                    header: Some(header),
                } => {
                    assert_eq!(kind, OutputKind::SurfaceTimeseries);
                    assert_eq!(header.dataset_count, Some(3));
                }
                other => panic!("unexpected partial {other:?}"),
            },
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn two_datasets_on_the_mesh_is_maxima() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "maxele.63", "2 150\n");
        let descriptor = resolve(&path, &mesh(150)).unwrap();
        assert_eq!(
            descriptor,
            OutputDescriptor::Text {
                kind: OutputKind::SurfaceMaxima,
                header: TextHeader {
                    point_count: 150,
                    dataset_count: Some(2),
                    constituent_count: None,
                    data_offset: 1,
                },
            }
        );
        // No state carried between calls.
        assert_eq!(resolve(&path, &mesh(150)).unwrap(), descriptor);
    }

    #[test]
    fn title_line_is_skipped_before_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "maxele.63",
            "Shinnecock Inlet maxele\n1 150 -99999 -99999 1\n",
        );
        let descriptor = resolve(&path, &mesh(150)).unwrap();
        match descriptor {
            OutputDescriptor::Text { header, .. } => assert_eq!(header.data_offset, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn point_count_mismatch_is_stations() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "fort.61", "title\n24 3 360 36 1\n");
        match resolve(&path, &mesh(150)).unwrap_err() {
            ResolveError::UnsupportedOutputFormat {
                partial:
                    Classification::Text {
                        kind: Some(OutputKind::Stations),
                        ..
                    },
                ..
            } => {}
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn zero_datasets_is_unrecognised() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "fort.63", "0 150\n");
        assert!(matches!(
            resolve(&path, &mesh(150)),
            Err(ResolveError::UnsupportedOutputFormat {
                partial: Classification::Text { kind: None, .. },
                ..
            })
        ));
    }

    #[test]
    fn surface_layouts_need_a_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "maxele.63", "2 150\n");
        assert!(matches!(
            resolve(&path, &ResolveOptions::default()),
            Err(ResolveError::MissingDependency(_))
        ));
    }

    #[test]
    fn garbage_header_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "notes.txt", "hello\nworld\n");
        assert!(matches!(
            resolve(&path, &mesh(150)),
            Err(ResolveError::Malformed { line: 2, .. })
        ));
        let empty = write(&dir, "empty", "");
        assert!(matches!(
            resolve(&empty, &mesh(150)),
            Err(ResolveError::Malformed { line: 1, .. })
        ));
    }

    const FORT53: &str = "2\n1.405e-4 1.0 0.0 M2\n1.454e-4 1.0 0.0 S2\n150\n";

    #[test]
    fn harmonic_on_the_mesh_is_unsupported_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "fort.53", FORT53);
        assert!(matches!(
            resolve(&path, &mesh(150)),
            Err(ResolveError::UnsupportedOutputFormat {
                partial: Classification::Text {
                    kind: Some(OutputKind::HarmonicConstituentsSurface),
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn harmonic_stations_need_the_control_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "fort.51", FORT53);
        assert!(matches!(
            resolve(&path, &mesh(3070)),
            Err(ResolveError::MissingDependency(_))
        ));

        let opts = ResolveOptions {
            mesh_points: Some(3070),
            control_file: Some(dir.path().join("fort.15")),
        };
        match resolve(&path, &opts).unwrap() {
            OutputDescriptor::Text { kind, header } => {
                assert_eq!(kind, OutputKind::HarmonicConstituentsStations);
                assert_eq!(header.constituent_count, Some(2));
                assert_eq!(header.point_count, 150);
                assert_eq!(header.data_offset, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_harmonic_header_is_flagged_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let short = write(&dir, "short", "5\nM2\n");
        assert!(matches!(
            resolve(&short, &mesh(150)),
            Err(ResolveError::AmbiguousHeader { value: 5, .. })
        ));
        let bad_count = write(&dir, "bad", "1\nM2\n150 2\n");
        assert!(matches!(
            resolve(&bad_count, &mesh(150)),
            Err(ResolveError::AmbiguousHeader { value: 1, .. })
        ));
    }
}
