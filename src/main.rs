use anyhow::{Context, Result, bail};
use log::info;
use std::env;
use std::path::{Path, PathBuf};

mod catalogue;
mod extraction;
mod snapshot;
mod viz;

use catalogue::CatalogueReader;
use extraction::extract::{Extraction, ExtractionConfig, ReadMode, extract};
use extraction::io;
use extraction::range::CatalogueIndex;
use extraction::types::ParticleTable;
use snapshot::EagleSnapshot;

enum RunMode {
    Extract {
        catalogue: PathBuf,
        config: ExtractionConfig,
        delimiter: u8,
        out: PathBuf,
    },
    Gather {
        out: PathBuf,
        parts: Vec<PathBuf>,
    },
    Hist {
        attribute: String,
        out: PathBuf,
        dumps: Vec<PathBuf>,
        bins: usize,
        title: String,
    },
    Phase {
        out: PathBuf,
        dump: PathBuf,
        title: String,
    },
}

fn usage() -> ! {
    eprintln!(
        "usage: filaments extract <catalogue.csv> [options]\n       filaments gather <out.csv> <part.csv> [part.csv ...]\n       filaments hist <attribute> <out.png> <dump.csv> [dump.csv ...] [--bins N] [--title T]\n       filaments phase <out.png> <dump.csv> [--title T]\n\nextract options:\n  --attributes A,B,C   attributes to read (default Density,Temperature,StarFormationRate)\n  --box-length L       region cube side in cMpc (default 1.0)\n  --range a:b          catalogue rows [a, b)\n  --index i            a single catalogue row\n  --part-type N        particle species (default 0, gas)\n  --per-box            query the snapshot once per region instead of once globally\n  --delimiter C        catalogue delimiter (default ,)\n  --out FILE           dump path (default <catalogue stem>_dump.csv, or FILAMENTS_DUMP_PATH)"
    );
    std::process::exit(1);
}

fn default_dump_path(catalogue: &Path) -> PathBuf {
    let parent = catalogue
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = catalogue
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("filaments");
    parent.join(format!("{stem}_dump.csv"))
}

fn parse_extract(args: &[String]) -> Result<RunMode> {
    let mut catalogue: Option<PathBuf> = None;
    let mut config = ExtractionConfig::default();
    let mut delimiter = b',';
    let mut out: Option<PathBuf> = None;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--attributes" => {
                let list = it.next().context("--attributes needs a value")?;
                config.attributes = list
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "--box-length" => {
                config.box_length = it
                    .next()
                    .context("--box-length needs a value")?
                    .parse()
                    .context("--box-length must be a number")?;
            }
            "--range" => {
                let value = it.next().context("--range needs a value")?;
                let (a, b) = value
                    .split_once(':')
                    .context("--range must look like a:b")?;
                config.range = Some(CatalogueIndex::Span {
                    start: a.trim().parse().context("range start must be an integer")?,
                    end: b.trim().parse().context("range end must be an integer")?,
                });
            }
            "--index" => {
                let value = it.next().context("--index needs a value")?;
                config.range = Some(CatalogueIndex::Single(
                    value.parse().context("--index must be an integer")?,
                ));
            }
            "--part-type" => {
                config.part_type = it
                    .next()
                    .context("--part-type needs a value")?
                    .parse()
                    .context("--part-type must be an integer")?;
            }
            "--per-box" => config.mode = ReadMode::PerBox,
            "--delimiter" => {
                let value = it.next().context("--delimiter needs a value")?;
                if value.len() != 1 {
                    bail!("--delimiter must be a single character");
                }
                delimiter = value.as_bytes()[0];
            }
            "--out" => {
                out = Some(PathBuf::from(it.next().context("--out needs a value")?));
            }
            other if !other.starts_with('-') && catalogue.is_none() => {
                catalogue = Some(PathBuf::from(other));
            }
            other => bail!("unknown extract argument {other:?}"),
        }
    }

    let Some(catalogue) = catalogue else { usage() };
    let out = out
        .or_else(|| env::var("FILAMENTS_DUMP_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| default_dump_path(&catalogue));

    Ok(RunMode::Extract {
        catalogue,
        config,
        delimiter,
        out,
    })
}

fn parse_hist(args: &[String]) -> Result<RunMode> {
    let mut positional: Vec<String> = Vec::new();
    let mut bins = 50usize;
    let mut title = String::new();

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bins" => {
                bins = it
                    .next()
                    .context("--bins needs a value")?
                    .parse()
                    .context("--bins must be an integer")?;
            }
            "--title" => title = it.next().context("--title needs a value")?.clone(),
            other if !other.starts_with('-') => positional.push(other.to_string()),
            other => bail!("unknown hist argument {other:?}"),
        }
    }

    if positional.len() < 3 {
        usage();
    }
    let attribute = positional.remove(0);
    let out = PathBuf::from(positional.remove(0));
    let dumps = positional.into_iter().map(PathBuf::from).collect();
    Ok(RunMode::Hist {
        attribute,
        out,
        dumps,
        bins,
        title,
    })
}

fn parse_phase(args: &[String]) -> Result<RunMode> {
    let mut positional: Vec<String> = Vec::new();
    let mut title = String::new();

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--title" => title = it.next().context("--title needs a value")?.clone(),
            other if !other.starts_with('-') => positional.push(other.to_string()),
            other => bail!("unknown phase argument {other:?}"),
        }
    }

    if positional.len() != 2 {
        usage();
    }
    let out = PathBuf::from(positional.remove(0));
    let dump = PathBuf::from(positional.remove(0));
    Ok(RunMode::Phase { out, dump, title })
}

fn parse_args() -> Result<RunMode> {
    let mut args = env::args().skip(1);
    let command = args.next().unwrap_or_else(|| usage());
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "extract" => parse_extract(&rest),
        "gather" => {
            if rest.len() < 2 {
                usage();
            }
            let out = PathBuf::from(&rest[0]);
            let parts = rest[1..].iter().map(PathBuf::from).collect();
            Ok(RunMode::Gather { out, parts })
        }
        "hist" => parse_hist(&rest),
        "phase" => parse_phase(&rest),
        _ => usage(),
    }
}

fn run_extract(
    catalogue_path: &Path,
    config: &ExtractionConfig,
    delimiter: u8,
    out: &Path,
) -> Result<()> {
    let catalogue = CatalogueReader::with_delimiter(catalogue_path, delimiter)?;
    info!(
        "catalogue {} (tag: {}, built from {} particles)",
        catalogue_path.display(),
        catalogue.metadata(),
        catalogue
            .num_particles()
            .map_or_else(|| "?".to_string(), |n| n.to_string()),
    );

    let mut snapshot = EagleSnapshot::open(catalogue.snapshot_path())?;
    let Extraction { table, warnings } = extract(&catalogue, &mut snapshot, config)?;
    if !warnings.is_empty() {
        info!("extraction finished with {} warnings", warnings.len());
    }

    io::dump(&table, out).with_context(|| format!("writing dump {}", out.display()))?;
    info!("dumped {} particles to {}", table.len(), out.display());
    Ok(())
}

fn run_hist(attribute: &str, out: &Path, dumps: &[PathBuf], bins: usize, title: &str) -> Result<()> {
    let tables: Vec<(String, ParticleTable)> = dumps
        .iter()
        .map(|path| Ok((label_for(path), io::load(path)?)))
        .collect::<Result<_>>()?;
    let series: Vec<(String, &ParticleTable)> = tables
        .iter()
        .map(|(label, table)| (label.clone(), table))
        .collect();
    viz::histogram(&series, attribute, bins, title, out)?;
    info!("histogram of {attribute} written to {}", out.display());
    Ok(())
}

fn label_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dump")
        .to_string()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match parse_args()? {
        RunMode::Extract {
            catalogue,
            config,
            delimiter,
            out,
        } => run_extract(&catalogue, &config, delimiter, &out),
        RunMode::Gather { out, parts } => {
            io::gather(&parts, &out)?;
            info!("gathered {} files into {}", parts.len(), out.display());
            Ok(())
        }
        RunMode::Hist {
            attribute,
            out,
            dumps,
            bins,
            title,
        } => run_hist(&attribute, &out, &dumps, bins, &title),
        RunMode::Phase { out, dump, title } => {
            let table = io::load(&dump)?;
            viz::phase_diagram(&table, &title, &out)?;
            info!("phase diagram written to {}", out.display());
            Ok(())
        }
    }
}
