//! Cache behavior on disk: per-run inventory XML round trips, the open
//! modes, and a directory-level collection build ending in matrix XML.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use fmrc_inventory::xml::{self, OpenMode};
use fmrc_inventory::{
    CollectionBuilder, EnsembleInfo, InventoryError, Result, RunInventory, RunSource, TimeMatrix,
    VerticalAxis,
};

struct FakeSource {
    name: String,
    run_time: DateTime<Utc>,
    variable: String,
}

impl FakeSource {
    fn new(name: &str, run_time: DateTime<Utc>, variable: &str) -> Self {
        Self {
            name: name.to_string(),
            run_time,
            variable: variable.to_string(),
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
        vec![self.variable.clone()]
    }

    fn forecast_offsets(&self, _variable: &str) -> Result<Vec<f64>> {
        Ok(vec![0.0, 6.0, 12.0])
    }

    fn vertical_axis(&self, _variable: &str) -> Result<Option<VerticalAxis>> {
        Ok(Some(VerticalAxis {
            name: "isobaric".to_string(),
            units: Some("hPa".to_string()),
            values: vec![500.0, 1000.0],
            bounds: None,
        }))
    }

    fn ensemble_axis(&self, _variable: &str) -> Result<Option<EnsembleInfo>> {
        Ok(None)
    }

    fn is_missing(&self, _variable: &str, _t: usize, _e: usize, _v: usize) -> bool {
        false
    }
}

fn t00() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn write_source_and_cache(dir: &Path, name: &str, variable: &str) -> std::path::PathBuf {
    let source_path = dir.join(name);
    std::fs::write(&source_path, b"payload").unwrap();
    let source = FakeSource::new(name, t00(), variable);
    let inv = RunInventory::from_source(&source).unwrap();
    xml::write_inventory(&inv, &xml::cache_path(&source_path)).unwrap();
    source_path
}

#[test]
fn normal_mode_prefers_fresh_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("run.grib2");
    std::fs::write(&source_path, b"payload").unwrap();

    // Cache written after the source, naming a different variable than
    // the live source would produce.
    let cached = FakeSource::new("run.grib2", t00(), "FromCache");
    let inv = RunInventory::from_source(&cached).unwrap();
    xml::write_inventory(&inv, &xml::cache_path(&source_path)).unwrap();

    let live = FakeSource::new("run.grib2", t00(), "FromSource");
    let opened = xml::open(&live, &source_path, OpenMode::Normal).unwrap();
    assert!(opened.find_grid("FromCache").is_some());
}

#[test]
fn normal_mode_rederives_when_source_newer() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = write_source_and_cache(dir.path(), "run.grib2", "FromCache");

    // Rewriting the source makes the cache stale.
    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(&source_path, b"newer payload").unwrap();

    let live = FakeSource::new("run.grib2", t00(), "FromSource");
    let opened = xml::open(&live, &source_path, OpenMode::Normal).unwrap();
    assert!(opened.find_grid("FromSource").is_some());

    // And the rewrite refreshed the cache.
    let cached = xml::read_inventory(&xml::cache_path(&source_path)).unwrap();
    assert!(cached.find_grid("FromSource").is_some());
}

#[test]
fn normal_mode_falls_back_on_corrupt_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("run.grib2");
    std::fs::write(&source_path, b"payload").unwrap();
    std::fs::write(xml::cache_path(&source_path), b"<not really xml").unwrap();

    let live = FakeSource::new("run.grib2", t00(), "FromSource");
    let opened = xml::open(&live, &source_path, OpenMode::Normal).unwrap();
    assert!(opened.find_grid("FromSource").is_some());
}

#[test]
fn force_new_ignores_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = write_source_and_cache(dir.path(), "run.grib2", "FromCache");

    let live = FakeSource::new("run.grib2", t00(), "FromSource");
    let opened = xml::open(&live, &source_path, OpenMode::ForceNew).unwrap();
    assert!(opened.find_grid("FromSource").is_some());
}

#[test]
fn cache_only_errors_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("run.grib2");
    std::fs::write(&source_path, b"payload").unwrap();

    let live = FakeSource::new("run.grib2", t00(), "FromSource");
    let err = xml::open(&live, &source_path, OpenMode::CacheOnly);
    assert!(matches!(err, Err(InventoryError::Io(_))));
}

#[test]
fn directory_build_to_matrix_xml() {
    let dir = tempfile::tempdir().unwrap();

    for (name, hour) in [("gfs_00z.grib2", 0), ("gfs_12z.grib2", 12)] {
        let source = FakeSource::new(
            name,
            Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            "T",
        );
        let inv = RunInventory::from_source(&source).unwrap();
        xml::write_inventory(&inv, &xml::cache_path(&dir.path().join(name))).unwrap();
    }
    // A stray file that is not an inventory cache is ignored.
    std::fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();
    // An unreadable cache is skipped, not fatal.
    std::fs::write(dir.path().join("bad.grib2.fmrInv.xml"), b"<broken").unwrap();

    let mut builder = CollectionBuilder::new("gfs");
    let added = builder.add_directory(dir.path(), Some(".grib2")).unwrap();
    assert_eq!(added, 2);
    let fmrc = builder.finish();

    assert_eq!(fmrc.runs.len(), 2);
    assert_eq!(fmrc.offset_hours(), vec![0.0, 6.0, 12.0]);

    let matrix = TimeMatrix::build(&fmrc, None);
    let report = matrix.to_xml().unwrap();
    assert!(report.contains("forecastModelRunCollectionInventory"));
    assert!(report.contains("dataset=\"gfs\""));
    assert!(report.contains("variable name=\"T\""));
}
