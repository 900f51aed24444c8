//! End-to-end scenario: ingest runs through the RunSource contract,
//! build a collection, and exercise the query surface the way a
//! downstream dataset consumer would.

use chrono::{DateTime, TimeZone, Utc};
use fmrc_inventory::{
    CollectionBuilder, CollectionDefinition, DiscrepancyReport, GridReader, InventoryError,
    Result, RunInventory, RunSource, TimeMatrix, VerticalAxis,
};

/// A fake model run: variable "T" on pressure levels plus a surface
/// variable, with configurable offsets and levels.
struct FakeRun {
    name: String,
    run_time: DateTime<Utc>,
    offsets: Vec<f64>,
    levels: Vec<f64>,
}

impl RunSource for FakeRun {
    fn name(&self) -> &str {
        &self.name
    }

    fn reference_time(&self) -> DateTime<Utc> {
        self.run_time
    }

    fn variable_names(&self) -> Vec<String> {
        vec!["T".to_string(), "P_sfc".to_string()]
    }

    fn forecast_offsets(&self, _variable: &str) -> Result<Vec<f64>> {
        Ok(self.offsets.clone())
    }

    fn vertical_axis(&self, variable: &str) -> Result<Option<VerticalAxis>> {
        if variable == "T" {
            Ok(Some(VerticalAxis {
                name: "isobaric".to_string(),
                units: Some("hPa".to_string()),
                values: self.levels.clone(),
                bounds: None,
            }))
        } else {
            Ok(None)
        }
    }

    fn ensemble_axis(&self, _variable: &str) -> Result<Option<fmrc_inventory::EnsembleInfo>> {
        Ok(None)
    }

    fn is_missing(&self, _variable: &str, _t: usize, _e: usize, _v: usize) -> bool {
        false
    }
}

struct IndexReader;

impl GridReader for IndexReader {
    fn read_slice(&self, run_index: usize, _variable: &str, time_index: usize) -> Result<Vec<f32>> {
        Ok(vec![(run_index * 100 + time_index) as f32])
    }
}

fn t(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
}

fn build_collection() -> fmrc_inventory::FmrcCollection {
    let runs = [
        FakeRun {
            name: "gfs_00z".to_string(),
            run_time: t(0),
            offsets: vec![0.0, 3.0, 6.0, 9.0],
            levels: vec![1000.0, 850.0, 500.0],
        },
        FakeRun {
            name: "gfs_12z".to_string(),
            run_time: t(12),
            offsets: vec![0.0, 3.0, 6.0, 9.0],
            levels: vec![1000.0, 500.0, 250.0],
        },
    ];

    let mut builder = CollectionBuilder::new("gfs");
    for run in &runs {
        let inv = RunInventory::from_source(run).unwrap();
        builder.add_run(inv).unwrap();
    }
    builder.finish()
}

#[test]
fn union_vertical_coordinate_over_two_runs() {
    let fmrc = build_collection();
    let var = fmrc.find_var("T").unwrap();
    let vc = fmrc.registry.vert(var.vert.unwrap());
    assert_eq!(vc.values1, vec![250.0, 500.0, 850.0, 1000.0]);
}

#[test]
fn fixed_offset_view_in_run_order() {
    let fmrc = build_collection();
    let view = fmrc.offset_view(3.0).unwrap();
    let section = view.find_section("T").unwrap();
    assert_eq!(section.entries.len(), 2);
    assert_eq!(section.entries[0].forecast_time, t(3));
    assert_eq!(section.entries[1].forecast_time, t(15));
}

#[test]
fn query_surface_enumerations_and_lookups() {
    let fmrc = build_collection();
    assert_eq!(fmrc.run_times(), vec![t(0), t(12)]);
    assert_eq!(fmrc.offset_hours(), vec![0.0, 3.0, 6.0, 9.0]);
    assert_eq!(fmrc.forecast_times().len(), 8);

    // Lookup failures are distinct errors, not empty views.
    assert!(matches!(
        fmrc.run_view(t(6)),
        Err(InventoryError::RunNotFound(_))
    ));
    assert!(matches!(
        fmrc.forecast_view(t(1)),
        Err(InventoryError::ForecastNotFound(_))
    ));
    assert!(matches!(
        fmrc.offset_view(48.0),
        Err(InventoryError::OffsetNotFound(_))
    ));
}

#[test]
fn best_series_covers_every_forecast_time_once() {
    let fmrc = build_collection();
    let view = fmrc.best_series();
    let section = view.find_section("T").unwrap();

    let expected = fmrc.forecast_times();
    let got: Vec<_> = section.entries.iter().map(|e| e.forecast_time).collect();
    assert_eq!(got, expected);
}

#[test]
fn virtual_reads_delegate_per_entry() {
    let fmrc = build_collection();
    let reader = IndexReader;

    let view = fmrc.best_series();
    let whole = view.read_variable(&reader, "P_sfc").unwrap();
    assert_eq!(whole.len(), 8);

    let section = view.find_section("P_sfc").unwrap();
    let sub = section.read_range(&reader, "P_sfc", 2, 5).unwrap();
    assert_eq!(sub, whole[2..5].to_vec());
}

#[test]
fn definition_round_trip_through_reconciler() {
    // Two runs with identical axes reconcile cleanly against the
    // definition generated from them.
    let mut builder = CollectionBuilder::new("gfs");
    for (name, hour) in [("gfs_00z", 0), ("gfs_12z", 12)] {
        let run = FakeRun {
            name: name.to_string(),
            run_time: t(hour),
            offsets: vec![0.0, 3.0, 6.0, 9.0],
            levels: vec![1000.0, 850.0, 500.0],
        };
        builder
            .add_run(RunInventory::from_source(&run).unwrap())
            .unwrap();
    }
    let fmrc = builder.finish();
    let def = CollectionDefinition::from_collection(&fmrc).unwrap();

    let report = DiscrepancyReport::build(&fmrc, &def, true);
    assert!(report.is_clean(), "{report}");

    let matrix = TimeMatrix::build(&fmrc, Some(&def));
    assert_eq!(matrix.run_totals, matrix.expected_run_totals);

    // Same definition rejects a collection with extra offsets.
    let mut builder = CollectionBuilder::new("gfs");
    let longer = FakeRun {
        name: "gfs_00z".to_string(),
        run_time: t(0),
        offsets: vec![0.0, 3.0, 6.0, 9.0, 12.0],
        levels: vec![1000.0, 850.0, 500.0],
    };
    builder
        .add_run(RunInventory::from_source(&longer).unwrap())
        .unwrap();
    let bigger = builder.finish();
    let report = DiscrepancyReport::build(&bigger, &def, false);
    assert!(!report.is_clean());
    assert!(report
        .entries
        .iter()
        .any(|e| e.extra_offsets.contains(&12.0)));
}
