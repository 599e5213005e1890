//! Dump files: the attribute table as delimited text, plus the shard merge
//! used after batched extraction runs.
//!
//! Layout is one header line (`x,y,z` then the scalar attributes in table
//! order) and one row per particle. Floats are written in shortest
//! round-trip form, so a dump re-loaded through [`load`] reproduces the
//! table exactly.

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, WriterBuilder};
use log::warn;
use ndarray::{Array1, Array2};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::types::ParticleTable;

const COORD_COLUMNS: [&str; 3] = ["x", "y", "z"];

pub fn dump(table: &ParticleTable, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(BufWriter::new(file));

    let header: Vec<&str> = COORD_COLUMNS
        .iter()
        .copied()
        .chain(table.names().iter().map(String::as_str))
        .collect();
    writer.write_record(&header)?;

    let columns: Vec<&Array1<f64>> = table.iter().map(|(_, column)| column).collect();
    let mut record = Vec::with_capacity(header.len());
    for i in 0..table.len() {
        record.clear();
        let p = table.coords().row(i);
        record.push(p[0].to_string());
        record.push(p[1].to_string());
        record.push(p[2].to_string());
        for column in &columns {
            record.push(column[i].to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<ParticleTable> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().from_reader(BufReader::new(file));

    let names: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    if names.len() < 3 || names.iter().take(3).map(String::as_str).ne(COORD_COLUMNS) {
        bail!(
            "{} is not a dump file (header must start with x,y,z)",
            path.display()
        );
    }

    let ncols = names.len();
    let mut flat: Vec<f64> = Vec::new();
    let mut rows = 0usize;
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("dump row {i}"))?;
        if record.len() != ncols {
            bail!(
                "dump row {i} has {} fields, the header has {ncols}",
                record.len()
            );
        }
        for field in record.iter() {
            let value: f64 = field
                .trim()
                .parse()
                .with_context(|| format!("dump row {i}: {field:?} is not a number"))?;
            flat.push(value);
        }
        rows += 1;
    }

    let mut coords = Array2::zeros((rows, 3));
    for r in 0..rows {
        for k in 0..3 {
            coords[[r, k]] = flat[r * ncols + k];
        }
    }
    let mut table = ParticleTable::new(coords);
    for (j, name) in names.iter().enumerate().skip(3) {
        let column = Array1::from_iter((0..rows).map(|r| flat[r * ncols + j]));
        table.insert(name, column);
    }
    Ok(table)
}

/// Merge dump shards: the first file is copied whole, every following file
/// contributes its data rows only. Shard ranges being contiguous and
/// disjoint is the caller's responsibility.
pub fn gather(paths: &[PathBuf], out: &Path) -> Result<()> {
    let Some((first, rest)) = paths.split_first() else {
        warn!("gather called with no input files; nothing to do");
        return Ok(());
    };

    std::fs::copy(first, out)
        .with_context(|| format!("copy {} to {}", first.display(), out.display()))?;
    let expected_header = read_header_line(first)?;

    let mut sink = BufWriter::new(
        OpenOptions::new()
            .append(true)
            .open(out)
            .with_context(|| format!("append to {}", out.display()))?,
    );
    for path in rest {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut lines = BufReader::new(file);
        let mut header = String::new();
        lines
            .read_line(&mut header)
            .with_context(|| format!("reading header of {}", path.display()))?;
        if header.trim_end() != expected_header {
            warn!(
                "{} has a different header than {}; appending its rows anyway",
                path.display(),
                first.display()
            );
        }
        std::io::copy(&mut lines, &mut sink)
            .with_context(|| format!("append {}", path.display()))?;
    }
    sink.flush()?;
    Ok(())
}

fn read_header_line(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .with_context(|| format!("reading header of {}", path.display()))?;
    Ok(line.trim_end().to_string())
}
