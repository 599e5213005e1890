//! Histograms and phase diagrams over extracted tables.
//!
//! Everything is drawn in log10 space. Attributes missing from a table
//! skip that series with a warning instead of failing the whole plot, and
//! non-positive values are dropped before taking logs.

use anyhow::{Context, Result};
use itertools::{Itertools, MinMaxResult};
use log::{debug, warn};
use plotters::prelude::*;
use std::path::Path;

use crate::extraction::types::ParticleTable;

const PLOT_SIZE: (u32, u32) = (1024, 768);

fn note(warnings: &mut Vec<String>, msg: String) {
    warn!("{msg}");
    warnings.push(msg);
}

/// log10 of the positive values of `attribute`, or `None` (with a warning)
/// if the series has nothing usable.
fn log_values(
    label: &str,
    table: &ParticleTable,
    attribute: &str,
    warnings: &mut Vec<String>,
) -> Option<Vec<f64>> {
    let Some(column) = table.column(attribute) else {
        note(
            warnings,
            format!(
                "{label}: attribute {attribute:?} not present (has: {}); skipping this series",
                table.names().iter().join(", ")
            ),
        );
        return None;
    };
    let values: Vec<f64> = column
        .iter()
        .copied()
        .filter(|v| *v > 0.0)
        .map(f64::log10)
        .collect();
    let dropped = column.len() - values.len();
    if dropped > 0 {
        debug!("{label}: dropped {dropped} non-positive values before log10");
    }
    if values.is_empty() {
        note(
            warnings,
            format!("{label}: no positive {attribute:?} values; skipping this series"),
        );
        return None;
    }
    Some(values)
}

/// Draw a base-10-log, density-normalised histogram of one attribute for
/// one or several labelled tables. Returns the warnings for series that
/// had to be skipped.
pub fn histogram(
    series: &[(String, &ParticleTable)],
    attribute: &str,
    bins: usize,
    title: &str,
    out: &Path,
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    let plottable: Vec<(String, Vec<f64>)> = series
        .iter()
        .filter_map(|(label, table)| {
            log_values(label, table, attribute, &mut warnings)
                .map(|values| (label.clone(), values))
        })
        .collect();

    if plottable.is_empty() {
        note(&mut warnings, format!("nothing to plot for {attribute:?}"));
        return Ok(warnings);
    }

    let (mut lo, mut hi) = match plottable
        .iter()
        .flat_map(|(_, values)| values.iter().copied())
        .minmax()
    {
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::NoElements => return Ok(warnings),
    };
    if !(hi > lo) {
        // a degenerate range still needs a drawable axis
        lo -= 0.5;
        hi += 0.5;
    }

    let bins = bins.max(1);
    let bin_width = (hi - lo) / bins as f64;
    let counts: Vec<Vec<f64>> = plottable
        .iter()
        .map(|(_, values)| {
            let mut histogram = vec![0.0f64; bins];
            for &v in values {
                let index = (((v - lo) / bin_width) as usize).min(bins - 1);
                histogram[index] += 1.0;
            }
            // density normalisation: the bar areas integrate to one
            let norm = values.len() as f64 * bin_width;
            for count in &mut histogram {
                *count /= norm;
            }
            histogram
        })
        .collect();
    let y_max = counts
        .iter()
        .flatten()
        .copied()
        .fold(f64::MIN_POSITIVE, f64::max);

    let root = BitMapBackend::new(out, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, 0.0..y_max * 1.05)?;

    chart
        .configure_mesh()
        .x_desc(format!("log10 {attribute}"))
        .y_desc("normalised count")
        .draw()?;

    for (i, ((label, _), histogram)) in plottable.iter().zip(&counts).enumerate() {
        let color = Palette99::pick(i).mix(0.5);
        chart
            .draw_series(histogram.iter().enumerate().map(|(j, &count)| {
                let x0 = lo + j as f64 * bin_width;
                Rectangle::new([(x0, 0.0), (x0 + bin_width, count)], color.filled())
            }))?
            .label(label.as_str())
            .legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
            });
    }

    if plottable.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }

    root.present()
        .with_context(|| format!("writing {}", out.display()))?;
    Ok(warnings)
}

/// Temperature--density relation of one table: log-log scatter with
/// star-forming gas (SFR > 0) in red and quiescent gas in blue.
pub fn phase_diagram(table: &ParticleTable, title: &str, out: &Path) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    let (Some(density), Some(temperature), Some(sfr)) = (
        table.column("Density"),
        table.column("Temperature"),
        table.column("StarFormationRate"),
    ) else {
        note(
            &mut warnings,
            format!(
                "phase diagram needs Density, Temperature and StarFormationRate (table has: {}); skipping",
                table.names().iter().join(", ")
            ),
        );
        return Ok(warnings);
    };

    let mut forming = Vec::new();
    let mut quiescent = Vec::new();
    for ((&d, &t), &s) in density.iter().zip(temperature).zip(sfr) {
        if d <= 0.0 || t <= 0.0 {
            continue;
        }
        let point = (d.log10(), t.log10());
        if s > 0.0 {
            forming.push(point);
        } else {
            quiescent.push(point);
        }
    }
    if forming.is_empty() && quiescent.is_empty() {
        note(
            &mut warnings,
            "no positive density/temperature pairs to plot; skipping".to_string(),
        );
        return Ok(warnings);
    }

    let all = || forming.iter().chain(&quiescent);
    let (x_lo, x_hi) = padded_range(all().map(|&(x, _)| x));
    let (y_lo, y_hi) = padded_range(all().map(|&(_, y)| y));

    let root = BitMapBackend::new(out, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("log10 Density [g/cm^3]")
        .y_desc("log10 Temperature [K]")
        .draw()?;

    chart
        .draw_series(
            quiescent
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 2, BLUE.filled())),
        )?
        .label("quiescent gas")
        .legend(|(x, y)| Circle::new((x + 5, y), 3, BLUE.filled()));
    chart
        .draw_series(
            forming
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 2, RED.filled())),
        )?
        .label("star-forming gas")
        .legend(|(x, y)| Circle::new((x + 5, y), 3, RED.filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()
        .with_context(|| format!("writing {}", out.display()))?;
    Ok(warnings)
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = match values.minmax() {
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::NoElements => (0.0, 1.0),
    };
    let pad = ((hi - lo) * 0.05).max(0.25);
    (lo - pad, hi + pad)
}
