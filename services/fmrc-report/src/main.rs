//! Inventory report tool for forecast model run collections.
//!
//! Reads the per-run `.fmrInv.xml` caches under a collection directory
//! and emits the inventory matrix, a discrepancy report against a
//! collection definition, a generated definition, or per-run level
//! listings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

use fmrc_common::format_iso8601;
use fmrc_inventory::xml::{self, CACHE_SUFFIX};
use fmrc_inventory::{
    variable_matrix_xml, CollectionBuilder, CollectionDefinition, DiscrepancyReport,
    FmrcCollection, TimeMatrix,
};

#[derive(Parser, Debug)]
#[command(name = "fmrc-report")]
#[command(about = "Inventory reports for forecast model run collections")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the inventory matrix XML for a collection directory
    Matrix {
        /// Directory holding the per-run .fmrInv.xml caches
        dir: PathBuf,

        /// Collection name (default: the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Definition XML giving the expected inventory
        #[arg(short, long)]
        definition: Option<PathBuf>,

        /// Report a single variable instead of the whole collection
        #[arg(short, long)]
        variable: Option<String>,

        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare observed inventory against a definition
    Check {
        dir: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        /// Definition XML to check against
        #[arg(short, long)]
        definition: PathBuf,

        /// Also report expected inventory that was never observed
        #[arg(long)]
        include_missing: bool,

        /// Emit the report as JSON instead of text
        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        recursive: bool,
    },

    /// Generate a definition from the observed inventory
    MakeDef {
        dir: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        recursive: bool,

        /// Write the definition here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List one variable's vertical levels at one forecast offset, per run
    Levels {
        dir: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        variable: String,

        /// Forecast offset in hours
        #[arg(long)]
        offset: f64,

        #[arg(short, long)]
        recursive: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Matrix {
            dir,
            name,
            definition,
            variable,
            recursive,
            output,
        } => {
            let def = definition.as_deref().map(load_definition).transpose()?;
            let fmrc = load_collection(
                &dir,
                name.as_deref(),
                def.as_ref().and_then(|d| d.suffix_filter.as_deref()),
                recursive,
            )?;
            let doc = match &variable {
                Some(var) => variable_matrix_xml(&fmrc, def.as_ref(), var)?,
                None => TimeMatrix::build(&fmrc, def.as_ref()).to_xml()?,
            };
            emit(output.as_deref(), &doc)?;
        }

        Command::Check {
            dir,
            name,
            definition,
            include_missing,
            json,
            recursive,
        } => {
            let def = load_definition(&definition)?;
            let fmrc = load_collection(
                &dir,
                name.as_deref(),
                def.suffix_filter.as_deref(),
                recursive,
            )?;
            let report = DiscrepancyReport::build(&fmrc, &def, include_missing);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
            if !report.is_clean() {
                bail!("collection does not match definition {}", def.name);
            }
            info!(dataset = %report.dataset, "Collection matches definition");
        }

        Command::MakeDef {
            dir,
            name,
            recursive,
            output,
        } => {
            let fmrc = load_collection(&dir, name.as_deref(), None, recursive)?;
            let def = CollectionDefinition::from_collection(&fmrc)?;
            emit(output.as_deref(), &def.to_xml()?)?;
        }

        Command::Levels {
            dir,
            name,
            variable,
            offset,
            recursive,
        } => {
            let fmrc = load_collection(&dir, name.as_deref(), None, recursive)?;
            let Some(var) = fmrc.find_var(&variable) else {
                bail!("variable {variable} not found in collection {}", fmrc.name);
            };
            println!("{} at offset {offset}:", var.name);
            for (ri, run) in fmrc.runs.iter().enumerate() {
                let levels = match fmrc.grid_for(var, ri) {
                    Some(grid) => grid.vert_values_at(&fmrc.registry, offset),
                    None => Vec::new(),
                };
                println!("  {} {levels:?}", format_iso8601(run.run_time));
            }
        }
    }

    Ok(())
}

/// Build a collection from every inventory cache under `dir`.
/// Unreadable caches are logged and skipped.
fn load_collection(
    dir: &Path,
    name: Option<&str>,
    suffix: Option<&str>,
    recursive: bool,
) -> Result<FmrcCollection> {
    let name = match name {
        Some(n) => n.to_string(),
        None => dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("collection")
            .to_string(),
    };

    let depth = if recursive { usize::MAX } else { 1 };
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_cache_for(path, suffix))
        .collect();
    paths.sort();

    let mut builder = CollectionBuilder::new(name);
    let mut added = 0usize;
    for path in &paths {
        match xml::read_inventory(path) {
            Ok(run) => {
                builder.add_run(run)?;
                added += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache"),
        }
    }
    if added == 0 {
        bail!("no inventory caches found under {}", dir.display());
    }
    info!(runs = added, dir = %dir.display(), "Loaded collection");
    Ok(builder.finish())
}

/// True for `*.fmrInv.xml` files whose source name also carries the
/// definition's suffix filter, when one is set.
fn is_cache_for(path: &Path, suffix: Option<&str>) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(source_name) = file_name.strip_suffix(CACHE_SUFFIX) else {
        return false;
    };
    match suffix {
        Some(s) => source_name.ends_with(s),
        None => true,
    }
}

fn load_definition(path: &Path) -> Result<CollectionDefinition> {
    CollectionDefinition::read(path)
        .with_context(|| format!("reading definition {}", path.display()))
}

fn emit(output: Option<&Path>, doc: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, doc).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Wrote report");
        }
        None => println!("{doc}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_filter() {
        assert!(is_cache_for(Path::new("/d/gfs_00z.grib2.fmrInv.xml"), None));
        assert!(is_cache_for(
            Path::new("/d/gfs_00z.grib2.fmrInv.xml"),
            Some(".grib2")
        ));
        assert!(!is_cache_for(
            Path::new("/d/gfs_00z.nc.fmrInv.xml"),
            Some(".grib2")
        ));
        assert!(!is_cache_for(Path::new("/d/gfs_00z.grib2"), None));
    }
}
