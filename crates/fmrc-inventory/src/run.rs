//! Single-run inventory: one reference time, one grid per variable.

use chrono::{DateTime, Utc};
use fmrc_common::BoundingBox;
use tracing::warn;

use crate::coords::{CoordRegistry, EnsId, TimeCoord, TimeId, VertCoord, VertId};
use crate::error::Result;
use crate::source::RunSource;

/// A (time, ensemble, level) slice that holds no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Missing {
    pub time_index: usize,
    pub ens_index: usize,
    pub vert_index: usize,
}

/// Inventory of one gridded variable within a run.
///
/// Axes are ids into the owning registry; `vert`/`ens` are `None` for 2D
/// and deterministic variables respectively. The registry is passed in
/// rather than back-referenced, so a grid can be rehomed from its run's
/// registry into a collection-wide one.
#[derive(Debug, Clone)]
pub struct GridInventory {
    pub name: String,
    pub time: TimeId,
    pub vert: Option<VertId>,
    pub ens: Option<EnsId>,
    pub missing: Vec<Missing>,
}

impl GridInventory {
    /// Total slice count, missing or not. Absent axes count as 1.
    pub fn count_total(&self, registry: &CoordRegistry) -> usize {
        let ntimes = registry.time(self.time).len();
        let nverts = self.vert.map_or(1, |id| registry.vert(id).len());
        let nens = self.ens.map_or(1, |id| registry.ens(id).len());
        ntimes * nverts * nens
    }

    /// Slices that actually hold data.
    pub fn count_present(&self, registry: &CoordRegistry) -> usize {
        self.count_total(registry) - self.missing.len()
    }

    /// Present slice count at one forecast offset; zero when the grid has
    /// no such offset.
    pub fn count_at_offset(&self, registry: &CoordRegistry, offset_hour: f64) -> usize {
        let Some(time_index) = registry.time(self.time).find_index(offset_hour) else {
            return 0;
        };
        let nverts = self.vert.map_or(1, |id| registry.vert(id).len());
        let nens = self.ens.map_or(1, |id| registry.ens(id).len());
        let gone = self
            .missing
            .iter()
            .filter(|m| m.time_index == time_index)
            .count();
        nverts * nens - gone
    }

    /// Vertical level values actually present at one offset.
    ///
    /// Returns an empty vec when the grid has no such offset. A 2D grid
    /// reports a single `-0.0` sentinel when present. Levels whose slice
    /// is missing come back as NaN so the caller can line positions up
    /// against the full vertical axis.
    pub fn vert_values_at(&self, registry: &CoordRegistry, offset_hour: f64) -> Vec<f64> {
        let Some(time_index) = registry.time(self.time).find_index(offset_hour) else {
            return Vec::new();
        };

        let is_missing = |vert_index: usize| {
            self.missing
                .iter()
                .any(|m| m.time_index == time_index && m.ens_index == 0 && m.vert_index == vert_index)
        };

        match self.vert {
            None => {
                if is_missing(0) {
                    vec![f64::NAN]
                } else {
                    vec![-0.0]
                }
            }
            Some(id) => registry
                .vert(id)
                .values1
                .iter()
                .enumerate()
                .map(|(i, &v)| if is_missing(i) { f64::NAN } else { v })
                .collect(),
        }
    }
}

/// Everything recorded about one model run.
#[derive(Debug)]
pub struct RunInventory {
    pub name: String,
    pub run_time: DateTime<Utc>,
    pub registry: CoordRegistry,
    pub grids: Vec<GridInventory>,
    pub bbox: Option<BoundingBox>,
}

impl RunInventory {
    /// Ingest one run through the [`RunSource`] contract.
    ///
    /// A variable whose axes cannot be read is logged and dropped; the
    /// rest of the run is kept.
    pub fn from_source(source: &dyn RunSource) -> Result<Self> {
        let mut registry = CoordRegistry::new();
        let mut grids = Vec::new();

        let mut names = source.variable_names();
        names.sort();

        for var in names {
            let offsets = match source.forecast_offsets(&var) {
                Ok(v) => v,
                Err(e) => {
                    warn!(variable = %var, error = %e, "Skipping variable, cannot read time axis");
                    continue;
                }
            };
            let vert_axis = match source.vertical_axis(&var) {
                Ok(v) => v,
                Err(e) => {
                    warn!(variable = %var, error = %e, "Skipping variable, cannot read vertical axis");
                    continue;
                }
            };
            let ens_axis = match source.ensemble_axis(&var) {
                Ok(v) => v,
                Err(e) => {
                    warn!(variable = %var, error = %e, "Skipping variable, cannot read ensemble axis");
                    continue;
                }
            };

            let time = registry.intern_time(TimeCoord::new(offsets))?;
            let vert = match vert_axis {
                Some(axis) => {
                    let mut vc = VertCoord::new(axis.name, axis.units, axis.values);
                    if let Some(bounds) = axis.bounds {
                        vc.values2 = Some(bounds);
                    }
                    Some(registry.intern_vert(vc)?)
                }
                None => None,
            };
            let ens = ens_axis.map(|info| {
                registry.intern_ens(crate::coords::EnsCoord::new(
                    info.name,
                    info.product_definition,
                    info.member_types,
                ))
            });

            let ntimes = registry.time(time).len();
            let nverts = vert.map_or(1, |id| registry.vert(id).len());
            let nens = ens.map_or(1, |id| registry.ens(id).len());

            let mut missing = Vec::new();
            for t in 0..ntimes {
                for e in 0..nens {
                    for v in 0..nverts {
                        if source.is_missing(&var, t, e, v) {
                            missing.push(Missing {
                                time_index: t,
                                ens_index: e,
                                vert_index: v,
                            });
                        }
                    }
                }
            }

            grids.push(GridInventory {
                name: var,
                time,
                vert,
                ens,
                missing,
            });
        }

        Ok(Self {
            name: source.name().to_string(),
            run_time: source.reference_time(),
            registry,
            grids,
            bbox: source.bounding_box(),
        })
    }

    pub fn find_grid(&self, name: &str) -> Option<&GridInventory> {
        self.grids.iter().find(|g| g.name == name)
    }

    /// Total slice count for one grid, missing or not.
    pub fn count_total(&self, grid: &GridInventory) -> usize {
        grid.count_total(&self.registry)
    }

    /// Present slice count for one grid at one forecast offset.
    ///
    /// Zero when the grid has no such offset.
    pub fn count_at_offset(&self, grid: &GridInventory, offset_hour: f64) -> usize {
        grid.count_at_offset(&self.registry, offset_hour)
    }

    /// Vertical level values actually present for one grid at one offset.
    pub fn vert_values_at(&self, grid: &GridInventory, offset_hour: f64) -> Vec<f64> {
        grid.vert_values_at(&self.registry, offset_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EnsembleInfo, VerticalAxis};
    use chrono::TimeZone;

    struct FakeSource {
        name: String,
        run_time: DateTime<Utc>,
        missing: Vec<(String, usize, usize, usize)>,
    }

    impl FakeSource {
        fn new(missing: Vec<(String, usize, usize, usize)>) -> Self {
            Self {
                name: "run-00z".to_string(),
                run_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                missing,
            }
        }
    }

    impl RunSource for FakeSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn reference_time(&self) -> DateTime<Utc> {
            self.run_time
        }

        fn variable_names(&self) -> Vec<String> {
            vec!["Temperature".to_string(), "Pressure_surface".to_string()]
        }

        fn forecast_offsets(&self, _variable: &str) -> Result<Vec<f64>> {
            Ok(vec![0.0, 3.0, 6.0])
        }

        fn vertical_axis(&self, variable: &str) -> Result<Option<VerticalAxis>> {
            if variable == "Temperature" {
                Ok(Some(VerticalAxis {
                    name: "isobaric".to_string(),
                    units: Some("hPa".to_string()),
                    values: vec![500.0, 850.0, 1000.0],
                    bounds: None,
                }))
            } else {
                Ok(None)
            }
        }

        fn ensemble_axis(&self, _variable: &str) -> Result<Option<EnsembleInfo>> {
            Ok(None)
        }

        fn is_missing(
            &self,
            variable: &str,
            time_index: usize,
            ens_index: usize,
            vert_index: usize,
        ) -> bool {
            self.missing
                .iter()
                .any(|(v, t, e, z)| v == variable && *t == time_index && *e == ens_index && *z == vert_index)
        }
    }

    #[test]
    fn test_from_source_counts() {
        let src = FakeSource::new(vec![("Temperature".to_string(), 1, 0, 2)]);
        let run = RunInventory::from_source(&src).unwrap();
        assert_eq!(run.grids.len(), 2);

        let temp = run.find_grid("Temperature").unwrap();
        assert_eq!(run.count_total(temp), 9);
        assert_eq!(run.count_at_offset(temp, 0.0), 3);
        assert_eq!(run.count_at_offset(temp, 3.0), 2);
        assert_eq!(run.count_at_offset(temp, 12.0), 0);

        let sfc = run.find_grid("Pressure_surface").unwrap();
        assert_eq!(run.count_total(sfc), 3);
        assert_eq!(run.count_at_offset(sfc, 6.0), 1);
    }

    #[test]
    fn test_grids_sorted_by_name() {
        let src = FakeSource::new(vec![]);
        let run = RunInventory::from_source(&src).unwrap();
        assert_eq!(run.grids[0].name, "Pressure_surface");
        assert_eq!(run.grids[1].name, "Temperature");
    }

    #[test]
    fn test_vert_values_at() {
        let src = FakeSource::new(vec![("Temperature".to_string(), 1, 0, 2)]);
        let run = RunInventory::from_source(&src).unwrap();

        let temp = run.find_grid("Temperature").unwrap();
        let full = run.vert_values_at(temp, 0.0);
        assert_eq!(full, vec![500.0, 850.0, 1000.0]);

        let partial = run.vert_values_at(temp, 3.0);
        assert_eq!(partial[0], 500.0);
        assert_eq!(partial[1], 850.0);
        assert!(partial[2].is_nan());

        assert!(run.vert_values_at(temp, 12.0).is_empty());

        let sfc = run.find_grid("Pressure_surface").unwrap();
        assert_eq!(run.vert_values_at(sfc, 0.0), vec![-0.0]);
    }

    #[test]
    fn test_shared_time_coord_interned_once() {
        let src = FakeSource::new(vec![]);
        let run = RunInventory::from_source(&src).unwrap();
        assert_eq!(run.registry.times().len(), 1);
        assert_eq!(run.grids[0].time, run.grids[1].time);
    }
}
