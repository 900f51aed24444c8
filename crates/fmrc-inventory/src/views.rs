//! The four virtual dataset projections over a collection.
//!
//! A view never copies grid payloads. It is an ordered table of
//! `(run index, time index)` entries per run sequence; reading a virtual
//! index looks the entry up and delegates to the per-run [`GridReader`].

use chrono::{DateTime, Utc};
use fmrc_common::{add_hours, close_enough, format_iso8601};

use crate::collection::FmrcCollection;
use crate::error::{InventoryError, Result};

/// Read access to the original per-run payloads, supplied by the caller.
pub trait GridReader {
    /// One (time) slice of one variable in one run, every vertical level
    /// and ensemble member included.
    fn read_slice(&self, run_index: usize, variable: &str, time_index: usize) -> Result<Vec<f32>>;
}

/// Which projection a view represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    FixedRun,
    FixedForecast,
    FixedOffset,
    BestSeries,
}

/// One virtual index: where its data lives and the times it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntry {
    /// Index into the collection's run list.
    pub run: usize,
    /// Time index within that run's time coordinate.
    pub time: usize,
    pub run_time: DateTime<Utc>,
    pub forecast_time: DateTime<Utc>,
    pub offset_hours: f64,
}

/// The entries of one run sequence within a view, shared by all the
/// sequence's variables.
#[derive(Debug)]
pub struct ViewSection {
    pub seq: usize,
    pub variables: Vec<String>,
    pub entries: Vec<ViewEntry>,
}

impl ViewSection {
    /// Read the whole virtual axis for one variable, concatenated in
    /// entry order.
    pub fn read_variable(&self, reader: &dyn GridReader, variable: &str) -> Result<Vec<f32>> {
        self.read_range(reader, variable, 0, self.entries.len())
    }

    /// Read virtual indices `start..end`, concatenated. The range is
    /// checked against the index map, not against storage.
    pub fn read_range(
        &self,
        reader: &dyn GridReader,
        variable: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<f32>> {
        if !self.variables.iter().any(|v| v == variable) {
            return Err(InventoryError::VariableNotFound(variable.to_string()));
        }
        if start > end || end > self.entries.len() {
            return Err(InventoryError::RangeOutOfBounds {
                start,
                end,
                len: self.entries.len(),
            });
        }
        let mut out = Vec::new();
        for entry in &self.entries[start..end] {
            let mut slice = reader.read_slice(entry.run, variable, entry.time)?;
            out.append(&mut slice);
        }
        Ok(out)
    }
}

/// A materialized projection: one section per run sequence.
#[derive(Debug)]
pub struct ViewDataset {
    pub kind: ViewKind,
    pub sections: Vec<ViewSection>,
}

impl ViewDataset {
    pub fn find_section(&self, variable: &str) -> Option<&ViewSection> {
        self.sections
            .iter()
            .find(|s| s.variables.iter().any(|v| v == variable))
    }

    pub fn read_variable(&self, reader: &dyn GridReader, variable: &str) -> Result<Vec<f32>> {
        self.find_section(variable)
            .ok_or_else(|| InventoryError::VariableNotFound(variable.to_string()))?
            .read_variable(reader, variable)
    }

    pub fn read_range(
        &self,
        reader: &dyn GridReader,
        variable: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<f32>> {
        self.find_section(variable)
            .ok_or_else(|| InventoryError::VariableNotFound(variable.to_string()))?
            .read_range(reader, variable, start, end)
    }
}

impl FmrcCollection {
    /// All forecast slices of one run; the virtual coordinate is the
    /// forecast time.
    pub fn run_view(&self, run_time: DateTime<Utc>) -> Result<ViewDataset> {
        if !self.runs.iter().any(|r| r.run_time == run_time) {
            return Err(InventoryError::RunNotFound(format_iso8601(run_time)));
        }
        Ok(self.build_view(ViewKind::FixedRun, |ri, _, hour| {
            if self.runs[ri].run_time == run_time {
                Some(add_hours(run_time, hour))
            } else {
                None
            }
        }))
    }

    /// Every run's slice valid at one instant; the virtual coordinate is
    /// the run time.
    pub fn forecast_view(&self, forecast_time: DateTime<Utc>) -> Result<ViewDataset> {
        if !self.forecast_times().contains(&forecast_time) {
            return Err(InventoryError::ForecastNotFound(format_iso8601(
                forecast_time,
            )));
        }
        Ok(self.build_view(ViewKind::FixedForecast, |ri, _, hour| {
            let ft = add_hours(self.runs[ri].run_time, hour);
            (ft == forecast_time).then_some(ft)
        }))
    }

    /// Every run's slice at one lead time; the virtual coordinate is the
    /// forecast time, with per-entry run times alongside.
    pub fn offset_view(&self, hours: f64) -> Result<ViewDataset> {
        if !self.offset_hours().iter().any(|&h| close_enough(h, hours)) {
            return Err(InventoryError::OffsetNotFound(hours));
        }
        Ok(self.build_view(ViewKind::FixedOffset, |ri, _, hour| {
            close_enough(hour, hours).then(|| add_hours(self.runs[ri].run_time, hour))
        }))
    }

    /// The merged series: at each forecast time, the slice from the last
    /// enumerated run covering it, sorted by forecast time ascending.
    ///
    /// Enumeration order is the caller's; enumerate runs oldest to
    /// newest to make "last" mean "most recent".
    pub fn best_series(&self) -> ViewDataset {
        let mut view = self.build_view(ViewKind::BestSeries, |ri, _, hour| {
            Some(add_hours(self.runs[ri].run_time, hour))
        });
        for section in &mut view.sections {
            let mut best: Vec<ViewEntry> = Vec::new();
            for entry in section.entries.drain(..) {
                match best
                    .iter_mut()
                    .find(|e| e.forecast_time == entry.forecast_time)
                {
                    Some(slot) => *slot = entry,
                    None => best.push(entry),
                }
            }
            best.sort_by_key(|e| e.forecast_time);
            section.entries = best;
        }
        view
    }

    /// Walk runs in enumeration order per sequence; `select` decides
    /// whether one (run, offset) pair joins the view and supplies its
    /// forecast time.
    fn build_view<F>(&self, kind: ViewKind, select: F) -> ViewDataset
    where
        F: Fn(usize, usize, f64) -> Option<DateTime<Utc>>,
    {
        let mut sections = Vec::with_capacity(self.run_seqs.len());
        for (si, seq) in self.run_seqs.iter().enumerate() {
            // Every variable of a sequence appears in the same runs with
            // the same time coordinate; the first one stands in for all.
            let Some(var) = seq.variables.first().and_then(|n| self.find_var(n)) else {
                continue;
            };
            let mut entries = Vec::new();
            for (ri, run) in self.runs.iter().enumerate() {
                let Some(grid) = self.grid_for(var, ri) else {
                    continue;
                };
                let tc = self.registry.time(grid.time);
                for (ti, &hour) in tc.offset_hours.iter().enumerate() {
                    if let Some(forecast_time) = select(ri, ti, hour) {
                        entries.push(ViewEntry {
                            run: ri,
                            time: ti,
                            run_time: run.run_time,
                            forecast_time,
                            offset_hours: hour,
                        });
                    }
                }
            }
            sections.push(ViewSection {
                seq: si,
                variables: seq.variables.clone(),
                entries,
            });
        }
        ViewDataset { kind, sections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionBuilder;
    use crate::coords::{CoordRegistry, TimeCoord, VertCoord};
    use crate::run::{GridInventory, Missing, RunInventory};
    use chrono::TimeZone;

    /// Deterministic fake payloads: value identifies (run, time, level).
    struct FakeReader {
        nverts: usize,
    }

    impl GridReader for FakeReader {
        fn read_slice(
            &self,
            run_index: usize,
            _variable: &str,
            time_index: usize,
        ) -> Result<Vec<f32>> {
            Ok((0..self.nverts)
                .map(|v| (run_index * 1000 + time_index * 10 + v) as f32)
                .collect())
        }
    }

    fn make_run(
        name: &str,
        run_time: DateTime<Utc>,
        offsets: &[f64],
        levels: &[f64],
        missing: Vec<Missing>,
    ) -> RunInventory {
        let mut registry = CoordRegistry::new();
        let time = registry
            .intern_time(TimeCoord::new(offsets.to_vec()))
            .unwrap();
        let vert = registry
            .intern_vert(VertCoord::new("isobaric", Some("hPa".into()), levels.to_vec()))
            .unwrap();
        RunInventory {
            name: name.to_string(),
            run_time,
            registry,
            grids: vec![GridInventory {
                name: "T".to_string(),
                time,
                vert: Some(vert),
                ens: None,
                missing,
            }],
            bbox: None,
        }
    }

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn two_run_collection() -> FmrcCollection {
        let mut builder = CollectionBuilder::new("gfs");
        builder
            .add_run(make_run(
                "a",
                t(0),
                &[0.0, 3.0, 6.0, 9.0],
                &[1000.0, 850.0, 500.0],
                vec![],
            ))
            .unwrap();
        builder
            .add_run(make_run(
                "b",
                t(12),
                &[0.0, 3.0, 6.0, 9.0],
                &[1000.0, 500.0, 250.0],
                vec![],
            ))
            .unwrap();
        builder.finish()
    }

    #[test]
    fn test_fixed_offset_two_entries_in_run_order() {
        let fmrc = two_run_collection();
        let view = fmrc.offset_view(3.0).unwrap();
        let section = view.find_section("T").unwrap();
        assert_eq!(section.entries.len(), 2);
        assert_eq!(section.entries[0].run, 0);
        assert_eq!(section.entries[0].forecast_time, t(3));
        assert_eq!(section.entries[1].run, 1);
        assert_eq!(section.entries[1].forecast_time, t(15));
    }

    #[test]
    fn test_offset_lookup_failure_is_distinct() {
        let fmrc = two_run_collection();
        let err = fmrc.offset_view(42.0);
        assert!(matches!(err, Err(InventoryError::OffsetNotFound(_))));
    }

    #[test]
    fn test_fixed_run_view() {
        let fmrc = two_run_collection();
        let view = fmrc.run_view(t(12)).unwrap();
        let section = view.find_section("T").unwrap();
        assert_eq!(section.entries.len(), 4);
        assert!(section.entries.iter().all(|e| e.run == 1));
        assert_eq!(section.entries[2].forecast_time, t(18));

        let err = fmrc.run_view(t(6));
        assert!(matches!(err, Err(InventoryError::RunNotFound(_))));
    }

    #[test]
    fn test_fixed_forecast_view() {
        let fmrc = two_run_collection();
        // 12Z valid time: run a at +12 does not exist, run b at +0 does.
        let view = fmrc.forecast_view(t(12)).unwrap();
        let section = view.find_section("T").unwrap();
        assert_eq!(section.entries.len(), 1);
        assert_eq!(section.entries[0].run, 1);
        assert_eq!(section.entries[0].offset_hours, 0.0);

        let err = fmrc.forecast_view(t(1));
        assert!(matches!(err, Err(InventoryError::ForecastNotFound(_))));
    }

    #[test]
    fn test_best_series_last_enumerated_wins() {
        let fmrc = two_run_collection();
        let view = fmrc.best_series();
        let section = view.find_section("T").unwrap();

        // Valid times 0,3,6,9 only from run a; 12,15,18,21 from run b.
        // 12Z run's 0h overlaps nothing here, so 8 distinct times.
        assert_eq!(section.entries.len(), 8);
        let times: Vec<_> = section.entries.iter().map(|e| e.forecast_time).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);

        // Overlapping case: offsets 12h from run a collide with 0h of
        // run b; the later-enumerated run must win.
        let mut builder = CollectionBuilder::new("overlap");
        builder
            .add_run(make_run("a", t(0), &[0.0, 12.0], &[1000.0], vec![]))
            .unwrap();
        builder
            .add_run(make_run("b", t(12), &[0.0, 12.0], &[1000.0], vec![]))
            .unwrap();
        let fmrc = builder.finish();
        let view = fmrc.best_series();
        let section = view.find_section("T").unwrap();
        assert_eq!(section.entries.len(), 3);
        let at_12 = section
            .entries
            .iter()
            .find(|e| e.forecast_time == t(12))
            .unwrap();
        assert_eq!(at_12.run, 1);
        assert_eq!(at_12.time, 0);
    }

    #[test]
    fn test_virtual_read_equivalence_identical_offsets() {
        let fmrc = two_run_collection();
        let reader = FakeReader { nverts: 3 };
        let view = fmrc.offset_view(6.0).unwrap();
        let data = view.read_variable(&reader, "T").unwrap();

        // Entry 0 -> run 0 time 2; entry 1 -> run 1 time 2.
        let direct: Vec<f32> = [
            reader.read_slice(0, "T", 2).unwrap(),
            reader.read_slice(1, "T", 2).unwrap(),
        ]
        .concat();
        assert_eq!(data, direct);
    }

    #[test]
    fn test_virtual_read_equivalence_disjoint_offsets() {
        let mut builder = CollectionBuilder::new("disjoint");
        builder
            .add_run(make_run("a", t(0), &[0.0, 3.0], &[1000.0], vec![]))
            .unwrap();
        builder
            .add_run(make_run("b", t(12), &[6.0, 9.0], &[1000.0], vec![]))
            .unwrap();
        let fmrc = builder.finish();
        let reader = FakeReader { nverts: 1 };

        // Offset 6 exists only in run b, at its time index 0.
        let view = fmrc.offset_view(6.0).unwrap();
        let section = view.find_section("T").unwrap();
        assert_eq!(section.entries.len(), 1);
        let data = view.read_variable(&reader, "T").unwrap();
        assert_eq!(data, reader.read_slice(1, "T", 0).unwrap());
    }

    #[test]
    fn test_virtual_read_equivalence_with_missing_slice() {
        let mut builder = CollectionBuilder::new("gappy");
        builder
            .add_run(make_run(
                "a",
                t(0),
                &[0.0, 3.0, 6.0],
                &[1000.0, 500.0],
                vec![Missing {
                    time_index: 1,
                    ens_index: 0,
                    vert_index: 1,
                }],
            ))
            .unwrap();
        let fmrc = builder.finish();
        let reader = FakeReader { nverts: 2 };

        // The index map is unaffected by missing slices; the read
        // delegates to the source, which serves its fill values.
        let view = fmrc.run_view(t(0)).unwrap();
        let data = view.read_variable(&reader, "T").unwrap();
        let direct: Vec<f32> = (0..3)
            .flat_map(|ti| reader.read_slice(0, "T", ti).unwrap())
            .collect();
        assert_eq!(data, direct);
    }

    #[test]
    fn test_read_range_intersection() {
        let fmrc = two_run_collection();
        let reader = FakeReader { nverts: 3 };
        let view = fmrc.run_view(t(0)).unwrap();
        let section = view.find_section("T").unwrap();

        let sub = section.read_range(&reader, "T", 1, 3).unwrap();
        let whole = section.read_variable(&reader, "T").unwrap();
        assert_eq!(sub, whole[3..9].to_vec());

        let err = section.read_range(&reader, "T", 2, 9);
        assert!(matches!(err, Err(InventoryError::RangeOutOfBounds { .. })));
    }

    #[test]
    fn test_unknown_variable_read() {
        let fmrc = two_run_collection();
        let reader = FakeReader { nverts: 1 };
        let view = fmrc.best_series();
        let err = view.read_variable(&reader, "Z");
        assert!(matches!(err, Err(InventoryError::VariableNotFound(_))));
    }
}
