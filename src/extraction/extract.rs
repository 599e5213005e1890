//! Region construction and particle readout around catalogue centres.
//!
//! Centres come out of the catalogue in co-moving Mpc; the snapshot file
//! keeps everything h-scaled (cMpc/h). Regions are built in co-moving
//! units, queries against the file are issued in file units, and the
//! coordinates read back are divided by h before masking.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{info, warn};
use ndarray::{Array1, Array2};

use crate::catalogue::CatalogueReader;
use crate::snapshot::{Region, SnapshotError, SnapshotSource};

use super::range::{self, CatalogueIndex, ResolvedRange};
use super::types::{COORDINATES, ParticleTable};

/// How the snapshot is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// One query covering the whole box, masked afterwards. Simple, and
    /// fine when the regions cover a fair fraction of the volume.
    #[default]
    Global,
    /// One query per region; cheaper when regions are small and sparse.
    PerBox,
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Scalar attributes to read, e.g. `["Density", "Temperature"]`.
    pub attributes: Vec<String>,
    /// Region cube side in co-moving Mpc.
    pub box_length: f64,
    /// Optional catalogue row restriction.
    pub range: Option<CatalogueIndex>,
    /// Particle species (0 = gas).
    pub part_type: usize,
    pub mode: ReadMode,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            attributes: vec![
                "Density".to_string(),
                "Temperature".to_string(),
                "StarFormationRate".to_string(),
            ],
            box_length: 1.0,
            range: None,
            part_type: 0,
            mode: ReadMode::Global,
        }
    }
}

/// Extraction result: the masked table plus every warning the run emitted.
/// Warnings are also logged as they happen; the list exists so callers and
/// tests can assert on them.
#[derive(Debug)]
pub struct Extraction {
    pub table: ParticleTable,
    pub warnings: Vec<String>,
}

fn note(warnings: &mut Vec<String>, msg: String) {
    // per-box runs repeat the same complaint for every region
    if warnings.contains(&msg) {
        return;
    }
    warn!("{msg}");
    warnings.push(msg);
}

pub fn extract(
    catalogue: &CatalogueReader,
    snapshot: &mut dyn SnapshotSource,
    config: &ExtractionConfig,
) -> Result<Extraction> {
    let mut warnings = Vec::new();

    let header = snapshot.header();
    let (a, h) = (header.scale_factor, header.hubble_param);

    let num_centres = catalogue.num_centres().context("counting catalogue rows")?;
    info!("catalogue has {num_centres} centres");

    let (start, end) = match range::resolve(config.range, num_centres, &mut warnings) {
        ResolvedRange::All => (0, None),
        ResolvedRange::Rows { start, end } => (start, Some(end)),
        ResolvedRange::Empty => return Ok(empty(config, warnings)),
    };

    if let Some(reason) = bad_box_length(config.box_length, catalogue.cube_length()) {
        note(&mut warnings, reason);
        return Ok(empty(config, warnings));
    }

    let centres = catalogue
        .load(start, end)
        .context("loading catalogue centres")?;
    let regions: Vec<Region> = centres
        .outer_iter()
        .map(|c| Region::from_centre([c[0], c[1], c[2]], config.box_length))
        .collect();

    let attributes = scalar_attributes(&config.attributes);

    let table = match config.mode {
        ReadMode::Global => read_global(
            snapshot,
            config.part_type,
            &attributes,
            &regions,
            a,
            h,
            &mut warnings,
        )?,
        ReadMode::PerBox => read_per_box(
            snapshot,
            config.part_type,
            &attributes,
            &regions,
            a,
            h,
            &mut warnings,
        )?,
    };

    info!(
        "retained {} particles across {} regions",
        table.len(),
        regions.len()
    );
    Ok(Extraction { table, warnings })
}

/// The scalar set actually read: the request minus the coordinate block
/// (always carried anyway), de-duplicated in request order.
fn scalar_attributes(requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| name.as_str() != COORDINATES)
        .unique()
        .cloned()
        .collect()
}

fn bad_box_length(length: f64, cube: Option<f64>) -> Option<String> {
    if !(length > 0.0) {
        return Some(format!("box length {length} must be positive; loading nothing"));
    }
    if let Some(cube) = cube {
        if length > cube {
            return Some(format!(
                "box length {length} exceeds the catalogue cube size {cube}; loading nothing"
            ));
        }
    }
    None
}

/// Zero-particle result that still carries the requested column set, so a
/// dump of it has the right header.
fn empty(config: &ExtractionConfig, warnings: Vec<String>) -> Extraction {
    let mut table = ParticleTable::empty();
    for name in scalar_attributes(&config.attributes) {
        table.insert(&name, Array1::zeros(0));
    }
    Extraction { table, warnings }
}

fn read_global(
    snapshot: &mut dyn SnapshotSource,
    part_type: usize,
    attributes: &[String],
    regions: &[Region],
    a: f64,
    h: f64,
    warnings: &mut Vec<String>,
) -> Result<ParticleTable> {
    let box_size = snapshot.header().box_size;
    let selected = snapshot.select_region(part_type, &Region::cube(box_size))?;
    info!("selected {selected} particles across the full box");

    let raw = snapshot.read_coordinates()?;
    let mut table = ParticleTable::new(raw.mapv(|v| v / h));
    read_columns(snapshot, part_type, attributes, a, h, &mut table, warnings)?;

    let mask = union_mask(table.coords(), regions);
    table.retain(&mask);
    Ok(table)
}

fn read_per_box(
    snapshot: &mut dyn SnapshotSource,
    part_type: usize,
    attributes: &[String],
    regions: &[Region],
    a: f64,
    h: f64,
    warnings: &mut Vec<String>,
) -> Result<ParticleTable> {
    let bar = ProgressBar::new(regions.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} regions [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut out: Option<ParticleTable> = None;
    for (i, region) in regions.iter().enumerate() {
        // query bounds go to the file in h-scaled units
        snapshot.select_region(part_type, &region.scaled(h))?;

        let raw = snapshot.read_coordinates()?;
        let mut table = ParticleTable::new(raw.mapv(|v| v / h));
        read_columns(snapshot, part_type, attributes, a, h, &mut table, warnings)?;

        // keep strict-interior hits for this region, minus anything an
        // earlier region already claimed (overlaps must not duplicate)
        let earlier = &regions[..i];
        let mask: Vec<bool> = table
            .coords()
            .outer_iter()
            .map(|p| {
                let p = [p[0], p[1], p[2]];
                region.contains(p) && !earlier.iter().any(|r| r.contains(p))
            })
            .collect();
        table.retain(&mask);

        match &mut out {
            Some(acc) => acc.append(&table),
            None => out = Some(table),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(out.unwrap_or_else(|| {
        let mut table = ParticleTable::empty();
        for name in attributes {
            table.insert(name, Array1::zeros(0));
        }
        table
    }))
}

/// Read, convert and insert every requested scalar column. Unknown or
/// inconsistent attributes are skipped with a warning, never fatal.
fn read_columns(
    snapshot: &mut dyn SnapshotSource,
    part_type: usize,
    attributes: &[String],
    a: f64,
    h: f64,
    table: &mut ParticleTable,
    warnings: &mut Vec<String>,
) -> Result<()> {
    for name in attributes {
        let scaling = match snapshot.scaling(part_type, name) {
            Ok(s) => s,
            Err(SnapshotError::MissingAttribute { .. }) => {
                note(
                    warnings,
                    format!("PartType{part_type} has no attribute {name:?}; skipping it"),
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let raw = match snapshot.read_scalar(name) {
            Ok(v) => v,
            Err(SnapshotError::MissingAttribute { .. }) => {
                note(
                    warnings,
                    format!("PartType{part_type} has no attribute {name:?}; skipping it"),
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if raw.len() != table.len() {
            note(
                warnings,
                format!(
                    "attribute {name:?} has {} values for {} particles; skipping it",
                    raw.len(),
                    table.len()
                ),
            );
            continue;
        }
        let factor = scaling.factor(a, h);
        table.insert(name, raw.mapv(|v| v * factor));
    }
    Ok(())
}

/// Strict-interior membership in at least one region: a plain OR per
/// particle, so overlapping regions never duplicate anything.
fn union_mask(coords: &Array2<f64>, regions: &[Region]) -> Vec<bool> {
    coords
        .outer_iter()
        .map(|p| {
            let p = [p[0], p[1], p[2]];
            regions.iter().any(|r| r.contains(p))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::testing::MemorySnapshot;
    use crate::snapshot::{AttributeScaling, SnapshotHeader};
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::io::Write;
    use tempfile::TempDir;

    const NEUTRAL: AttributeScaling = AttributeScaling {
        cgs_factor: 1.0,
        aexp: 0.0,
        hexp: 0.0,
    };

    fn plain_header() -> SnapshotHeader {
        SnapshotHeader {
            scale_factor: 1.0,
            hubble_param: 1.0,
            box_size: 25.0,
        }
    }

    fn write_catalogue(dir: &TempDir, centres: &[[f64; 3]]) -> CatalogueReader {
        let snapshot = dir.path().join("snap.hdf5");
        std::fs::File::create(&snapshot).unwrap();
        let path = dir.path().join("catalogue.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# {}", snapshot.display()).unwrap();
        writeln!(f, "# 25.0").unwrap();
        writeln!(f, "# 376").unwrap();
        writeln!(f, "# Baryons").unwrap();
        writeln!(f, "x,y,z").unwrap();
        for c in centres {
            writeln!(f, "{},{},{}", c[0], c[1], c[2]).unwrap();
        }
        CatalogueReader::open(&path).unwrap()
    }

    /// Three centres, one particle sitting on each of them, one far away.
    fn spread_fixture(dir: &TempDir) -> (CatalogueReader, MemorySnapshot) {
        let centres = [[2.0, 2.0, 2.0], [10.0, 10.0, 10.0], [20.0, 4.0, 16.0]];
        let catalogue = write_catalogue(dir, &centres);
        let coords = array![
            [2.0, 2.0, 2.0],
            [10.0, 10.0, 10.0],
            [20.0, 4.0, 16.0],
            [24.0, 24.0, 24.0],
        ];
        let snapshot = MemorySnapshot::new(plain_header(), coords)
            .with_scalar("Density", array![1.0, 2.0, 3.0, 4.0], NEUTRAL);
        (catalogue, snapshot)
    }

    fn config(mode: ReadMode) -> ExtractionConfig {
        ExtractionConfig {
            attributes: vec!["Density".to_string()],
            box_length: 1.0,
            range: None,
            part_type: 0,
            mode,
        }
    }

    #[test]
    fn retains_exactly_the_particles_near_centres() {
        let dir = TempDir::new().unwrap();
        let (catalogue, mut snapshot) = spread_fixture(&dir);
        let result = extract(&catalogue, &mut snapshot, &config(ReadMode::Global)).unwrap();
        assert_eq!(result.table.len(), 3);
        assert!(result.warnings.is_empty());
        let density = result.table.column("Density").unwrap();
        assert_eq!(density.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn per_box_mode_agrees_with_global() {
        let dir = TempDir::new().unwrap();
        let (catalogue, mut snapshot) = spread_fixture(&dir);
        let global = extract(&catalogue, &mut snapshot, &config(ReadMode::Global)).unwrap();
        let (catalogue, mut snapshot) = spread_fixture(&dir);
        let per_box = extract(&catalogue, &mut snapshot, &config(ReadMode::PerBox)).unwrap();
        assert_eq!(global.table.len(), per_box.table.len());
        let sum = |t: &ParticleTable| t.column("Density").unwrap().sum();
        assert_relative_eq!(sum(&global.table), sum(&per_box.table));
    }

    #[test]
    fn boundary_particles_are_excluded() {
        let dir = TempDir::new().unwrap();
        let catalogue = write_catalogue(&dir, &[[10.0, 10.0, 10.0]]);
        // exactly on the +x face of the box of side 1.0
        let coords = array![[10.5, 10.0, 10.0], [10.0, 10.0, 10.0]];
        let mut snapshot = MemorySnapshot::new(plain_header(), coords)
            .with_scalar("Density", array![1.0, 2.0], NEUTRAL);
        let result = extract(&catalogue, &mut snapshot, &config(ReadMode::Global)).unwrap();
        assert_eq!(result.table.len(), 1);
        assert_eq!(result.table.column("Density").unwrap()[0], 2.0);
    }

    #[test]
    fn overlapping_boxes_count_a_particle_once() {
        let dir = TempDir::new().unwrap();
        let centres = [[10.0, 10.0, 10.0], [10.4, 10.0, 10.0]];
        let coords = array![[10.2, 10.0, 10.0]];
        for mode in [ReadMode::Global, ReadMode::PerBox] {
            let catalogue = write_catalogue(&dir, &centres);
            let mut snapshot = MemorySnapshot::new(plain_header(), coords.clone())
                .with_scalar("Density", array![1.0], NEUTRAL);
            let result = extract(&catalogue, &mut snapshot, &config(mode)).unwrap();
            assert_eq!(result.table.len(), 1, "{mode:?}");
        }
    }

    #[test]
    fn unknown_attribute_warns_and_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (catalogue, mut snapshot) = spread_fixture(&dir);
        let mut cfg = config(ReadMode::Global);
        cfg.attributes.push("Vorticity".to_string());
        let result = extract(&catalogue, &mut snapshot, &cfg).unwrap();
        assert_eq!(result.table.len(), 3);
        assert!(result.table.column("Density").is_some());
        assert!(result.table.column("Vorticity").is_none());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Vorticity"));
    }

    #[test]
    fn out_of_range_index_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let (catalogue, mut snapshot) = spread_fixture(&dir);
        let mut cfg = config(ReadMode::Global);
        cfg.range = Some(CatalogueIndex::Single(99));
        let result = extract(&catalogue, &mut snapshot, &cfg).unwrap();
        assert!(result.table.is_empty());
        assert_eq!(result.table.names(), ["Density"]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn clamped_range_still_extracts() {
        let dir = TempDir::new().unwrap();
        let (catalogue, mut snapshot) = spread_fixture(&dir);
        let mut cfg = config(ReadMode::Global);
        cfg.range = Some(CatalogueIndex::Span { start: 1, end: 50 });
        let result = extract(&catalogue, &mut snapshot, &cfg).unwrap();
        // centres 1 and 2 survive the clamp, so their two particles do too
        assert_eq!(result.table.len(), 2);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("clamping"));
    }

    #[test]
    fn invalid_box_length_loads_nothing() {
        let dir = TempDir::new().unwrap();
        for bad in [0.0, -1.0, 30.0] {
            let (catalogue, mut snapshot) = spread_fixture(&dir);
            let mut cfg = config(ReadMode::Global);
            cfg.box_length = bad;
            let result = extract(&catalogue, &mut snapshot, &cfg).unwrap();
            assert!(result.table.is_empty(), "box length {bad}");
            assert_eq!(result.warnings.len(), 1);
        }
    }

    #[test]
    fn unit_conversion_is_applied() {
        let dir = TempDir::new().unwrap();
        let header = SnapshotHeader {
            scale_factor: 0.5,
            hubble_param: 0.7,
            box_size: 25.0,
        };
        let catalogue = write_catalogue(&dir, &[[10.0, 10.0, 10.0]]);
        // raw file coordinates are h-scaled
        let coords = array![[7.0, 7.0, 7.0]];
        let scaling = AttributeScaling {
            cgs_factor: 2.0,
            aexp: -3.0,
            hexp: 2.0,
        };
        let mut snapshot = MemorySnapshot::new(header, coords)
            .with_scalar("Density", array![5.0], scaling);
        let result = extract(&catalogue, &mut snapshot, &config(ReadMode::Global)).unwrap();
        assert_eq!(result.table.len(), 1);
        assert_relative_eq!(result.table.coords()[[0, 0]], 10.0, max_relative = 1e-12);
        let expected = 5.0 * 2.0 * 0.5f64.powf(-3.0) * 0.7f64.powf(2.0);
        assert_relative_eq!(
            result.table.column("Density").unwrap()[0],
            expected,
            max_relative = 1e-12
        );
    }

    #[test]
    fn duplicate_requests_read_once() {
        assert_eq!(
            scalar_attributes(&[
                "Density".to_string(),
                "Coordinates".to_string(),
                "Density".to_string(),
            ]),
            ["Density"]
        );
    }
}
