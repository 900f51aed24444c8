//! Multi-run collection: run-sequence grouping and per-variable
//! aggregation.
//!
//! A collection is built through [`CollectionBuilder`] and derived
//! wholesale by [`CollectionBuilder::finish`]; a rebuild produces a new
//! collection, nothing is updated in place. Run enumeration order is the
//! caller's and is preserved, it decides which run wins in the best
//! series view.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fmrc_common::{close_enough, BoundingBox};
use tracing::{info, warn};

use crate::coords::{union_vert_coord, CoordRegistry, EnsId, TimeId, VertId};
use crate::error::Result;
use crate::run::{GridInventory, RunInventory};
use crate::xml::{read_inventory, CACHE_SUFFIX};

/// One run as it sits inside a collection: the same grid records as its
/// [`RunInventory`], but with coordinate ids rehomed into the collection
/// registry.
#[derive(Debug)]
pub struct CollectionRun {
    pub name: String,
    pub run_time: DateTime<Utc>,
    pub grids: Vec<GridInventory>,
    pub bbox: Option<BoundingBox>,
}

impl CollectionRun {
    pub fn find_grid(&self, name: &str) -> Option<&GridInventory> {
        self.grids.iter().find(|g| g.name == name)
    }
}

/// One run's contribution to a run sequence: its run time and the
/// canonical time coordinate its variable used in that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSlot {
    pub run_time: DateTime<Utc>,
    pub tc: TimeId,
}

/// A group of runs sharing one per-run time-coordinate shape.
///
/// Two variables share a sequence iff their slot lists are identical,
/// canonical time-coordinate id for id.
#[derive(Debug)]
pub struct RunSeq {
    pub slots: Vec<RunSlot>,
    pub variables: Vec<String>,
}

impl RunSeq {
    /// Canonical time coordinate for a given run time, if the sequence
    /// covers it.
    pub fn time_coord_for(&self, run_time: DateTime<Utc>) -> Option<TimeId> {
        self.slots
            .iter()
            .find(|s| s.run_time == run_time)
            .map(|s| s.tc)
    }

    /// Whether every slot uses the same canonical time coordinate.
    pub fn is_uniform(&self) -> bool {
        self.slots
            .windows(2)
            .all(|w| w[0].tc == w[1].tc)
    }
}

/// Cross-run aggregate for one variable name.
#[derive(Debug)]
pub struct UberGrid {
    pub name: String,
    /// Index of the owning [`RunSeq`] in the collection.
    pub seq: usize,
    /// Union vertical coordinate, interned in the collection registry.
    pub vert: Option<VertId>,
    /// Winning ensemble coordinate (larger member count wins).
    pub ens: Option<EnsId>,
    /// Per-run grid index, parallel to the collection's run list; `None`
    /// where the variable is absent from that run.
    pub grids: Vec<Option<usize>>,
}

/// The reconciled multi-run inventory.
#[derive(Debug)]
pub struct FmrcCollection {
    pub name: String,
    pub registry: CoordRegistry,
    pub runs: Vec<CollectionRun>,
    pub run_seqs: Vec<RunSeq>,
    /// Aggregates sorted by variable name.
    pub vars: Vec<UberGrid>,
    pub bbox: Option<BoundingBox>,
}

impl FmrcCollection {
    pub fn find_var(&self, name: &str) -> Option<&UberGrid> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Run reference times in enumeration order, de-duplicated.
    pub fn run_times(&self) -> Vec<DateTime<Utc>> {
        let mut out: Vec<DateTime<Utc>> = Vec::new();
        for run in &self.runs {
            if !out.contains(&run.run_time) {
                out.push(run.run_time);
            }
        }
        out
    }

    /// Every forecast (valid) time reachable from any grid, ascending.
    pub fn forecast_times(&self) -> Vec<DateTime<Utc>> {
        let mut out: Vec<DateTime<Utc>> = Vec::new();
        for run in &self.runs {
            for grid in &run.grids {
                for &h in &self.registry.time(grid.time).offset_hours {
                    let ft = fmrc_common::add_hours(run.run_time, h);
                    if !out.contains(&ft) {
                        out.push(ft);
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// Every lead-time offset appearing in any grid, ascending.
    pub fn offset_hours(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for tc in self.registry.times() {
            for &h in &tc.offset_hours {
                if !out.iter().any(|&x| close_enough(x, h)) {
                    out.push(h);
                }
            }
        }
        out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// The grid observed for `var` in the run at `run_index`.
    pub fn grid_for(&self, var: &UberGrid, run_index: usize) -> Option<&GridInventory> {
        var.grids[run_index].map(|gi| &self.runs[run_index].grids[gi])
    }
}

/// Accumulates runs and derives the collection in a final pass.
pub struct CollectionBuilder {
    name: String,
    registry: CoordRegistry,
    runs: Vec<CollectionRun>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CollectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: CoordRegistry::new(),
            runs: Vec::new(),
            cancel: None,
        }
    }

    /// Cooperative cancellation flag, checked between runs only.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |c| c.load(Ordering::Relaxed))
    }

    /// Fold one ingested run into the collection, rehoming its
    /// coordinates into the collection registry.
    pub fn add_run(&mut self, run: RunInventory) -> Result<()> {
        let mut grids = Vec::with_capacity(run.grids.len());
        for grid in &run.grids {
            let time = self
                .registry
                .intern_time(run.registry.time(grid.time).clone())?;
            let vert = match grid.vert {
                Some(id) => Some(self.registry.intern_vert(run.registry.vert(id).clone())?),
                None => None,
            };
            let ens = grid
                .ens
                .map(|id| self.registry.intern_ens(run.registry.ens(id).clone()));
            grids.push(GridInventory {
                name: grid.name.clone(),
                time,
                vert,
                ens,
                missing: grid.missing.clone(),
            });
        }
        self.runs.push(CollectionRun {
            name: run.name,
            run_time: run.run_time,
            grids,
            bbox: run.bbox,
        });
        Ok(())
    }

    /// Load every inventory cache file in a directory, non-recursively,
    /// in file-name order.
    ///
    /// `suffix` filters source names, on top of the mandatory cache
    /// suffix. A file that fails to load is logged and skipped; the
    /// build keeps going. Returns the number of runs added.
    pub fn add_directory(&mut self, dir: &Path, suffix: Option<&str>) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                let Some(stem) = name.strip_suffix(CACHE_SUFFIX) else {
                    return false;
                };
                suffix.map_or(true, |s| stem.ends_with(s))
            })
            .collect();
        paths.sort();

        let mut added = 0;
        for path in paths {
            if self.cancelled() {
                info!(dir = %dir.display(), "Collection build cancelled");
                break;
            }
            match read_inventory(&path) {
                Ok(run) => {
                    self.add_run(run)?;
                    added += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run inventory");
                }
            }
        }
        Ok(added)
    }

    /// Derive run sequences and per-variable aggregates.
    pub fn finish(self) -> FmrcCollection {
        let mut registry = self.registry;
        let runs = self.runs;

        // Distinct variable names, sorted.
        let mut names: Vec<String> = Vec::new();
        for run in &runs {
            for grid in &run.grids {
                if !names.contains(&grid.name) {
                    names.push(grid.name.clone());
                }
            }
        }
        names.sort();

        let mut run_seqs: Vec<RunSeq> = Vec::new();
        let mut vars: Vec<UberGrid> = Vec::with_capacity(names.len());

        for name in names {
            let grid_refs: Vec<Option<usize>> = runs
                .iter()
                .map(|run| run.grids.iter().position(|g| g.name == name))
                .collect();

            let slots: Vec<RunSlot> = runs
                .iter()
                .zip(&grid_refs)
                .filter_map(|(run, gi)| {
                    gi.map(|gi| RunSlot {
                        run_time: run.run_time,
                        tc: run.grids[gi].time,
                    })
                })
                .collect();

            let seq = match run_seqs.iter().position(|rs| rs.slots == slots) {
                Some(i) => {
                    run_seqs[i].variables.push(name.clone());
                    i
                }
                None => {
                    run_seqs.push(RunSeq {
                        slots,
                        variables: vec![name.clone()],
                    });
                    run_seqs.len() - 1
                }
            };

            let vert = union_vert(&mut registry, &runs, &grid_refs);
            let ens = winning_ens(&registry, &runs, &grid_refs);

            vars.push(UberGrid {
                name,
                seq,
                vert,
                ens,
                grids: grid_refs,
            });
        }

        let mut bbox: Option<BoundingBox> = None;
        for run in &runs {
            if let Some(rb) = &run.bbox {
                match &mut bbox {
                    Some(bb) => bb.extend(rb),
                    None => bbox = Some(rb.clone()),
                }
            }
        }

        info!(
            collection = %self.name,
            runs = runs.len(),
            variables = vars.len(),
            sequences = run_seqs.len(),
            "Collection build finished"
        );

        FmrcCollection {
            name: self.name,
            registry,
            runs,
            run_seqs,
            vars,
            bbox,
        }
    }
}

/// Union vertical coordinate across every run carrying this variable,
/// interned into the collection registry. Name and units come from the
/// first run that has a vertical axis.
fn union_vert(
    registry: &mut CoordRegistry,
    runs: &[CollectionRun],
    grid_refs: &[Option<usize>],
) -> Option<VertId> {
    let ids: Vec<VertId> = runs
        .iter()
        .zip(grid_refs)
        .filter_map(|(run, gi)| gi.and_then(|gi| run.grids[gi].vert))
        .collect();
    if ids.is_empty() {
        return None;
    }
    if ids.iter().all(|&id| id == ids[0]) {
        return Some(ids[0]);
    }
    let inputs: Vec<_> = ids.iter().map(|&id| registry.vert(id).clone()).collect();
    let input_refs: Vec<&_> = inputs.iter().collect();
    let first = &inputs[0];
    let union = union_vert_coord(&first.name, first.units.clone(), &input_refs);
    // Union values are finite because every input already passed interning.
    registry.intern_vert(union).ok()
}

/// Larger member count wins when runs disagree; a true union is not
/// attempted, downstream consumers depend on this tie-break.
fn winning_ens(
    registry: &CoordRegistry,
    runs: &[CollectionRun],
    grid_refs: &[Option<usize>],
) -> Option<EnsId> {
    let mut best: Option<EnsId> = None;
    for (run, gi) in runs.iter().zip(grid_refs) {
        let Some(id) = gi.and_then(|gi| run.grids[gi].ens) else {
            continue;
        };
        best = match best {
            None => Some(id),
            Some(cur) if registry.ens(id).len() > registry.ens(cur).len() => Some(id),
            Some(cur) => Some(cur),
        };
    }
    best
}
