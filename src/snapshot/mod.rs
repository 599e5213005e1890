use ndarray::{Array1, Array2};
use std::path::PathBuf;
use thiserror::Error;

pub mod eagle;

pub use eagle::EagleSnapshot;

/// Axis-aligned readout box, flat bounds
/// `[xmin, xmax, ymin, ymax, zmin, zmax]` in simulation length units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub bounds: [f64; 6],
}

impl Region {
    /// Cube of side `length` centred on `centre`.
    pub fn from_centre(centre: [f64; 3], length: f64) -> Self {
        let half = 0.5 * length;
        Region {
            bounds: [
                centre[0] - half,
                centre[0] + half,
                centre[1] - half,
                centre[1] + half,
                centre[2] - half,
                centre[2] + half,
            ],
        }
    }

    /// The full simulation cube `[0, side]^3`.
    pub fn cube(side: f64) -> Self {
        Region {
            bounds: [0.0, side, 0.0, side, 0.0, side],
        }
    }

    /// Strict-interior test. Boundary points are excluded on every axis.
    #[inline]
    pub fn contains(&self, p: [f64; 3]) -> bool {
        let b = &self.bounds;
        b[0] < p[0] && p[0] < b[1] && b[2] < p[1] && p[1] < b[3] && b[4] < p[2] && p[2] < b[5]
    }

    /// Inclusive test, used for coarse selection at the file boundary.
    #[inline]
    pub fn covers(&self, p: [f64; 3]) -> bool {
        let b = &self.bounds;
        b[0] <= p[0] && p[0] <= b[1] && b[2] <= p[1] && p[1] <= b[3] && b[4] <= p[2] && p[2] <= b[5]
    }

    /// Same box with every bound multiplied by `factor` (unit changes).
    pub fn scaled(&self, factor: f64) -> Self {
        let mut bounds = self.bounds;
        for v in &mut bounds {
            *v *= factor;
        }
        Region { bounds }
    }
}

/// Global snapshot header fields.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotHeader {
    /// Scale factor a.
    pub scale_factor: f64,
    /// Hubble parameter h.
    pub hubble_param: f64,
    /// Box side length [cMpc/h].
    pub box_size: f64,
}

/// Per-attribute conversion exponents carried by the snapshot file.
#[derive(Debug, Clone, Copy)]
pub struct AttributeScaling {
    pub cgs_factor: f64,
    pub aexp: f64,
    pub hexp: f64,
}

impl AttributeScaling {
    /// Multiplicative conversion to physical CGS for a snapshot at scale
    /// factor `a` with Hubble parameter `h`.
    #[inline]
    pub fn factor(&self, a: f64, h: f64) -> f64 {
        self.cgs_factor * a.powf(self.aexp) * h.powf(self.hexp)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot open snapshot {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: hdf5::Error,
    },
    #[error("snapshot header incomplete: {0}")]
    Header(#[source] hdf5::Error),
    #[error("PartType{part_type} has no attribute {name:?}")]
    MissingAttribute { part_type: usize, name: String },
    #[error("attribute {name:?} has {got} values, expected {expected}")]
    Misaligned {
        name: String,
        got: usize,
        expected: usize,
    },
    #[error("no region selected before read")]
    NoSelection,
    #[error(transparent)]
    Hdf5(#[from] hdf5::Error),
}

/// Region-query boundary to a simulation snapshot: select a box, then read
/// particle attribute arrays for the selection.
///
/// The selection may be a superset of the exact box (read granularity);
/// callers own the precise masking. All reads between two `select_region`
/// calls are co-indexed.
pub trait SnapshotSource {
    /// Global header fields, read once at open time.
    fn header(&self) -> SnapshotHeader;

    /// Conversion exponents for one attribute of one particle species.
    fn scaling(&self, part_type: usize, name: &str) -> Result<AttributeScaling, SnapshotError>;

    /// Select a rectangular region (bounds in file units, cMpc/h) for one
    /// particle species. Returns the number of selected particles.
    fn select_region(&mut self, part_type: usize, region: &Region) -> Result<usize, SnapshotError>;

    /// Raw coordinates (file units) of the current selection, shape (n, 3).
    fn read_coordinates(&self) -> Result<Array2<f64>, SnapshotError>;

    /// One scalar attribute of the current selection.
    fn read_scalar(&self, name: &str) -> Result<Array1<f64>, SnapshotError>;
}
