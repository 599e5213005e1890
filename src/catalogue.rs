//! Filament catalogue parsing.
//!
//! Catalogues are delimited text with a fixed comment block:
//!
//! ```text
//! # /path/to/snapshot.hdf5
//! # cube size [Mpc]
//! # number of particles used to build the catalogue
//! # free-text tag (particle species etc.)
//! colname_1, ..., x, y, z
//! DATA, ..., x, y, z
//! ```
//!
//! Only the last three columns of each data row are read as centre
//! coordinates; earlier columns may carry anything and are ignored here.

use log::{info, warn};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Comment lines before the column header.
const COMMENT_LINES: usize = 4;
/// Lines before the first data row (comments + column header).
const HEADER_LINES: usize = COMMENT_LINES + 1;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("cannot read catalogue {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalogue header in {}: {detail}", path.display())]
    MalformedHeader { path: PathBuf, detail: String },
    #[error("catalogue {} declares unreadable snapshot {}", path.display(), snapshot.display())]
    SnapshotMissing { path: PathBuf, snapshot: PathBuf },
    #[error("bad row (line {line}) in {}: {detail}", path.display())]
    BadRow {
        path: PathBuf,
        line: usize,
        detail: String,
    },
}

pub struct CatalogueReader {
    path: PathBuf,
    delimiter: u8,
    snapshot_path: PathBuf,
    cube_length: Option<f64>,
    num_particles: Option<u64>,
    metadata: String,
}

impl CatalogueReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogueError> {
        Self::with_delimiter(path, b',')
    }

    pub fn with_delimiter(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, CatalogueError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| CatalogueError::Io {
            path: path.clone(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();

        let mut comment = |what: &str| -> Result<String, CatalogueError> {
            match lines.next() {
                Some(Ok(line)) if line.starts_with('#') => {
                    Ok(line.trim_start_matches('#').trim().to_string())
                }
                Some(Ok(line)) => Err(CatalogueError::MalformedHeader {
                    path: path.clone(),
                    detail: format!("expected a comment line for the {what}, got {line:?}"),
                }),
                Some(Err(source)) => Err(CatalogueError::Io {
                    path: path.clone(),
                    source,
                }),
                None => Err(CatalogueError::MalformedHeader {
                    path: path.clone(),
                    detail: format!("file ends before the {what} line"),
                }),
            }
        };

        let snapshot_line = comment("snapshot location")?;
        let cube_line = comment("cube size")?;
        let particles_line = comment("particle count")?;
        let metadata = comment("metadata tag")?;

        // the column-name header must exist; its content is not interpreted
        match lines.next() {
            Some(Ok(_)) => {}
            Some(Err(source)) => {
                return Err(CatalogueError::Io {
                    path: path.clone(),
                    source,
                });
            }
            None => {
                return Err(CatalogueError::MalformedHeader {
                    path: path.clone(),
                    detail: "file ends before the column header".to_string(),
                });
            }
        }

        let cube_length = match cube_line.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(
                    "catalogue {}: cube size {cube_line:?} is not a number",
                    path.display()
                );
                None
            }
        };
        let num_particles = match particles_line.parse::<u64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(
                    "catalogue {}: particle count {particles_line:?} is not an integer",
                    path.display()
                );
                None
            }
        };

        let snapshot_path = PathBuf::from(&snapshot_line);
        if !snapshot_path.is_file() {
            return Err(CatalogueError::SnapshotMissing {
                path,
                snapshot: snapshot_path,
            });
        }

        Ok(CatalogueReader {
            path,
            delimiter,
            snapshot_path,
            cube_length,
            num_particles,
            metadata,
        })
    }

    /// Snapshot file this catalogue was built from.
    #[inline]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Cube size declared by the catalogue, if the header carries one.
    #[inline]
    pub fn cube_length(&self) -> Option<f64> {
        self.cube_length
    }

    /// Resolution of the catalogue build. Not the number of centres: it is
    /// how many particles went into constructing the filament skeleton.
    #[inline]
    pub fn num_particles(&self) -> Option<u64> {
        self.num_particles
    }

    /// Content of the fourth comment line, usually the particle species the
    /// catalogue was built from.
    #[inline]
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Total number of data rows: physical lines minus the header block.
    pub fn num_centres(&self) -> Result<usize, CatalogueError> {
        let file = File::open(&self.path).map_err(|source| CatalogueError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut count = 0usize;
        for line in BufReader::new(file).lines() {
            line.map_err(|source| CatalogueError::Io {
                path: self.path.clone(),
                source,
            })?;
            count += 1;
        }
        Ok(count.saturating_sub(HEADER_LINES))
    }

    /// Centre coordinates for data rows `[start, end)` (0-based, counted
    /// after the header block); `end = None` reads to the end of the file.
    ///
    /// The result is always 2-D of shape (n, 3), even for a single row.
    pub fn load(&self, start: usize, end: Option<usize>) -> Result<Array2<f64>, CatalogueError> {
        let file = File::open(&self.path).map_err(|source| CatalogueError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .comment(Some(b'#'))
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let mut flat: Vec<f64> = Vec::new();
        let mut rows = 0usize;
        for (i, record) in reader.records().enumerate() {
            if i < start {
                continue;
            }
            if let Some(end) = end {
                if i >= end {
                    break;
                }
            }
            let line = HEADER_LINES + i + 1;
            let record = record.map_err(|e| CatalogueError::BadRow {
                path: self.path.clone(),
                line,
                detail: e.to_string(),
            })?;
            if record.len() < 3 {
                return Err(CatalogueError::BadRow {
                    path: self.path.clone(),
                    line,
                    detail: format!("{} columns, need at least 3", record.len()),
                });
            }
            for field in record.iter().skip(record.len() - 3) {
                let value: f64 = field.parse().map_err(|_| CatalogueError::BadRow {
                    path: self.path.clone(),
                    line,
                    detail: format!("{field:?} is not a number"),
                })?;
                flat.push(value);
            }
            rows += 1;
        }

        info!("loaded {rows} centres from {}", self.path.display());
        Array2::from_shape_vec((rows, 3), flat).map_err(|e| CatalogueError::BadRow {
            path: self.path.clone(),
            line: 0,
            detail: e.to_string(),
        })
    }
}
