//! HDF5-backed snapshot access.
//!
//! EAGLE-style layout: global fields live as attributes of `/Header`,
//! particle data in `/PartType{i}/{Attribute}` datasets whose conversion
//! exponents ride along as dataset attributes.

use hdf5::File;
use ndarray::{Array1, Array2, Axis};
use std::path::Path;

use super::{AttributeScaling, Region, SnapshotError, SnapshotHeader, SnapshotSource};

pub struct EagleSnapshot {
    file: File,
    header: SnapshotHeader,
    selection: Option<Selection>,
}

/// Particles picked by the last `select_region` call. Indices refer to the
/// full on-disk order, so scalar reads stay co-indexed with the cached
/// coordinates.
struct Selection {
    part_type: usize,
    indices: Vec<usize>,
    coords: Array2<f64>,
    total: usize,
}

impl EagleSnapshot {
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path).map_err(|source| SnapshotError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let header = read_header(&file)?;
        Ok(EagleSnapshot {
            file,
            header,
            selection: None,
        })
    }

    fn dataset(&self, part_type: usize, name: &str) -> Result<hdf5::Dataset, SnapshotError> {
        self.file
            .dataset(&format!("PartType{part_type}/{name}"))
            .map_err(|_| SnapshotError::MissingAttribute {
                part_type,
                name: name.to_string(),
            })
    }
}

fn read_header(file: &File) -> Result<SnapshotHeader, SnapshotError> {
    let header = file.group("Header").map_err(SnapshotError::Header)?;
    let field = |name: &str| -> Result<f64, SnapshotError> {
        header
            .attr(name)
            .and_then(|a| a.read_scalar::<f64>())
            .map_err(SnapshotError::Header)
    };
    Ok(SnapshotHeader {
        scale_factor: field("Time")?,
        hubble_param: field("HubbleParam")?,
        box_size: field("BoxSize")?,
    })
}

impl SnapshotSource for EagleSnapshot {
    fn header(&self) -> SnapshotHeader {
        self.header
    }

    fn scaling(&self, part_type: usize, name: &str) -> Result<AttributeScaling, SnapshotError> {
        let dataset = self.dataset(part_type, name)?;
        let exponent = |attr: &str| -> Result<f64, SnapshotError> {
            Ok(dataset.attr(attr)?.read_scalar::<f64>()?)
        };
        Ok(AttributeScaling {
            cgs_factor: exponent("CGSConversionFactor")?,
            aexp: exponent("aexp-scale-exponent")?,
            hexp: exponent("h-scale-exponent")?,
        })
    }

    fn select_region(&mut self, part_type: usize, region: &Region) -> Result<usize, SnapshotError> {
        // No spatial index in the raw file: read all coordinates once and
        // keep the covered subset. The inclusive test makes this a superset
        // of the exact box; the extractor applies the strict mask.
        let coords: Array2<f64> = self.dataset(part_type, "Coordinates")?.read_2d()?;
        let total = coords.nrows();
        let indices: Vec<usize> = coords
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| region.covers([row[0], row[1], row[2]]))
            .map(|(i, _)| i)
            .collect();
        let selected = coords.select(Axis(0), &indices);
        let n = indices.len();
        self.selection = Some(Selection {
            part_type,
            indices,
            coords: selected,
            total,
        });
        Ok(n)
    }

    fn read_coordinates(&self) -> Result<Array2<f64>, SnapshotError> {
        let selection = self.selection.as_ref().ok_or(SnapshotError::NoSelection)?;
        Ok(selection.coords.clone())
    }

    fn read_scalar(&self, name: &str) -> Result<Array1<f64>, SnapshotError> {
        let selection = self.selection.as_ref().ok_or(SnapshotError::NoSelection)?;
        let values: Array1<f64> = self.dataset(selection.part_type, name)?.read_1d()?;
        if values.len() != selection.total {
            return Err(SnapshotError::Misaligned {
                name: name.to_string(),
                got: values.len(),
                expected: selection.total,
            });
        }
        Ok(values.select(Axis(0), &selection.indices))
    }
}
