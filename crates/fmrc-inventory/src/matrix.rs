//! Reconciliation of observed inventory against an expected definition:
//! the inventory matrix (counts) and the discrepancy report (specific
//! offending offsets and levels).
//!
//! Both are derived on demand from a finished collection and discarded
//! after reporting; nothing here is persisted except the matrix XML
//! document itself.

use std::fmt;

use chrono::{DateTime, Utc};
use fmrc_common::{add_hours, close_enough, fmt_f64, format_iso8601, offset_hours};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::Serialize;

use crate::collection::{FmrcCollection, UberGrid};
use crate::definition::CollectionDefinition;
use crate::error::{InventoryError, Result};

/// Present/expected grid counts indexed by (forecast time, run) and by
/// (run, offset), plus per-run and per-variable totals.
#[derive(Debug)]
pub struct TimeMatrix {
    pub dataset: String,
    pub run_times: Vec<DateTime<Utc>>,
    pub forecast_times: Vec<DateTime<Utc>>,
    pub offsets: Vec<f64>,
    /// `count_inv[forecast][run]` = present grids at that valid time/run.
    pub count_inv: Vec<Vec<u32>>,
    pub expected: Vec<Vec<u32>>,
    /// `count_offset[run][offset]` = present grids at that run/lead time.
    pub count_offset: Vec<Vec<u32>>,
    pub expected_offset: Vec<Vec<u32>>,
    pub run_totals: Vec<u32>,
    pub expected_run_totals: Vec<u32>,
    /// Per variable: (name, present, expected), in variable order.
    pub var_counts: Vec<(String, u32, u32)>,
}

impl TimeMatrix {
    /// Count every variable over the (run, offset) lattice. Expected
    /// counts come from the definition where it covers a variable, else
    /// from the grid's own nominal slot count.
    pub fn build(fmrc: &FmrcCollection, definition: Option<&CollectionDefinition>) -> Self {
        let run_times = fmrc.run_times();
        let forecast_times = fmrc.forecast_times();
        let offsets = fmrc.offset_hours();
        let nruns = run_times.len();
        let ntimes = forecast_times.len();
        let noffsets = offsets.len();

        let mut count_inv = vec![vec![0u32; nruns]; ntimes];
        let mut expected = vec![vec![0u32; nruns]; ntimes];
        let mut count_offset = vec![vec![0u32; noffsets]; nruns];
        let mut expected_offset = vec![vec![0u32; noffsets]; nruns];
        let mut var_counts = Vec::with_capacity(fmrc.vars.len());

        for var in &fmrc.vars {
            let mut var_inv = 0u32;
            let mut var_expected = 0u32;

            for (run_index, &run_time) in run_times.iter().enumerate() {
                // Runs can repeat a run time; count each matching run.
                for (ri, run) in fmrc.runs.iter().enumerate() {
                    if run.run_time != run_time {
                        continue;
                    }
                    let Some(grid) = fmrc.grid_for(var, ri) else {
                        continue;
                    };
                    for (offset_index, &hour) in offsets.iter().enumerate() {
                        let inv = grid.count_at_offset(&fmrc.registry, hour) as u32;
                        let exp = expected_count(fmrc, definition, var, run_time, hour)
                            .unwrap_or_else(|| nominal_count(fmrc, grid, hour));

                        if let Some(fi) = forecast_times
                            .iter()
                            .position(|&ft| ft == add_hours(run_time, hour))
                        {
                            count_inv[fi][run_index] += inv;
                            expected[fi][run_index] += exp;
                        }
                        count_offset[run_index][offset_index] += inv;
                        expected_offset[run_index][offset_index] += exp;
                        var_inv += inv;
                        var_expected += exp;
                    }
                }
            }

            var_counts.push((var.name.clone(), var_inv, var_expected));
        }

        let run_totals = count_offset.iter().map(|row| row.iter().sum()).collect();
        let expected_run_totals = expected_offset
            .iter()
            .map(|row| row.iter().sum())
            .collect();

        Self {
            dataset: fmrc.name.clone(),
            run_times,
            forecast_times,
            offsets,
            count_inv,
            expected,
            count_offset,
            expected_offset,
            run_totals,
            expected_run_totals,
            var_counts,
        }
    }

    /// The `forecastModelRunCollectionInventory` summary document. Runs
    /// and forecast times are listed newest first.
    pub fn to_xml(&self) -> Result<String> {
        let werr = |e: &dyn fmt::Display| InventoryError::CacheWrite {
            path: self.dataset.clone(),
            message: e.to_string(),
        };
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| werr(&e))?;

        let mut root = BytesStart::new("forecastModelRunCollectionInventory");
        root.push_attribute(("dataset", self.dataset.as_str()));
        writer.write_event(Event::Start(root)).map_err(|e| werr(&e))?;

        for &offset in &self.offsets {
            let mut elem = BytesStart::new("offsetTime");
            elem.push_attribute(("hours", fmt_f64(offset).as_str()));
            writer.write_event(Event::Empty(elem)).map_err(|e| werr(&e))?;
        }

        for (name, have, want) in &self.var_counts {
            let mut elem = BytesStart::new("variable");
            elem.push_attribute(("name", name.as_str()));
            push_count_percent(&mut elem, *have, *want, false);
            writer.write_event(Event::Empty(elem)).map_err(|e| werr(&e))?;
        }

        for run_index in (0..self.run_times.len()).rev() {
            let mut elem = BytesStart::new("run");
            elem.push_attribute(("date", format_iso8601(self.run_times[run_index]).as_str()));
            push_count_percent(
                &mut elem,
                self.run_totals[run_index],
                self.expected_run_totals[run_index],
                true,
            );
            writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;

            for (offset_index, &offset) in self.offsets.iter().enumerate() {
                let mut oelem = BytesStart::new("offset");
                oelem.push_attribute(("hours", fmt_f64(offset).as_str()));
                push_count_percent(
                    &mut oelem,
                    self.count_offset[run_index][offset_index],
                    self.expected_offset[run_index][offset_index],
                    false,
                );
                writer.write_event(Event::Empty(oelem)).map_err(|e| werr(&e))?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("run")))
                .map_err(|e| werr(&e))?;
        }

        for fi in (0..self.forecast_times.len()).rev() {
            let mut elem = BytesStart::new("forecastTime");
            elem.push_attribute(("date", format_iso8601(self.forecast_times[fi]).as_str()));
            writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;

            for run_index in (0..self.run_times.len()).rev() {
                let mut relem = BytesStart::new("runTime");
                push_count_percent(
                    &mut relem,
                    self.count_inv[fi][run_index],
                    self.expected[fi][run_index],
                    false,
                );
                writer.write_event(Event::Empty(relem)).map_err(|e| werr(&e))?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("forecastTime")))
                .map_err(|e| werr(&e))?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("forecastModelRunCollectionInventory")))
            .map_err(|e| werr(&e))?;

        String::from_utf8(writer.into_inner()).map_err(|e| InventoryError::CacheWrite {
            path: self.dataset.clone(),
            message: e.to_string(),
        })
    }
}

/// The `forecastModelRunCollectionInventory` document for one variable.
pub fn variable_matrix_xml(
    fmrc: &FmrcCollection,
    definition: Option<&CollectionDefinition>,
    variable: &str,
) -> Result<String> {
    let var = fmrc
        .find_var(variable)
        .ok_or_else(|| InventoryError::VariableNotFound(variable.to_string()))?;

    let werr = |e: &dyn fmt::Display| InventoryError::CacheWrite {
        path: fmrc.name.clone(),
        message: e.to_string(),
    };
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| werr(&e))?;

    let mut root = BytesStart::new("forecastModelRunCollectionInventory");
    root.push_attribute(("dataset", fmrc.name.as_str()));
    root.push_attribute(("variable", variable));
    writer.write_event(Event::Start(root)).map_err(|e| werr(&e))?;

    let offsets = fmrc.offset_hours();
    for &offset in &offsets {
        let mut elem = BytesStart::new("offsetTime");
        elem.push_attribute(("hour", fmt_f64(offset).as_str()));
        writer.write_event(Event::Empty(elem)).map_err(|e| werr(&e))?;
    }

    let run_times = fmrc.run_times();
    for &run_time in run_times.iter().rev() {
        let mut elem = BytesStart::new("run");
        elem.push_attribute(("date", format_iso8601(run_time).as_str()));
        writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;

        for &hour in &offsets {
            let mut oelem = BytesStart::new("offset");
            oelem.push_attribute(("hour", fmt_f64(hour).as_str()));
            let (have, want) = var_counts_at(fmrc, definition, var, run_time, hour);
            push_count_percent(&mut oelem, have, want, false);
            writer.write_event(Event::Empty(oelem)).map_err(|e| werr(&e))?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("run")))
            .map_err(|e| werr(&e))?;
    }

    for &forecast_time in fmrc.forecast_times().iter().rev() {
        let mut elem = BytesStart::new("forecastTime");
        elem.push_attribute(("date", format_iso8601(forecast_time).as_str()));
        writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;

        for &run_time in run_times.iter().rev() {
            let mut relem = BytesStart::new("runTime");
            let hour = offset_hours(run_time, forecast_time);
            let (have, want) = var_counts_at(fmrc, definition, var, run_time, hour);
            push_count_percent(&mut relem, have, want, false);
            writer.write_event(Event::Empty(relem)).map_err(|e| werr(&e))?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("forecastTime")))
            .map_err(|e| werr(&e))?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("forecastModelRunCollectionInventory")))
        .map_err(|e| werr(&e))?;

    String::from_utf8(writer.into_inner()).map_err(|e| InventoryError::CacheWrite {
        path: fmrc.name.clone(),
        message: e.to_string(),
    })
}

fn var_counts_at(
    fmrc: &FmrcCollection,
    definition: Option<&CollectionDefinition>,
    var: &UberGrid,
    run_time: DateTime<Utc>,
    hour: f64,
) -> (u32, u32) {
    let mut have = 0u32;
    let mut want = 0u32;
    for (ri, run) in fmrc.runs.iter().enumerate() {
        if run.run_time != run_time {
            continue;
        }
        let Some(grid) = fmrc.grid_for(var, ri) else {
            continue;
        };
        have += grid.count_at_offset(&fmrc.registry, hour) as u32;
        want += expected_count(fmrc, definition, var, run_time, hour)
            .unwrap_or_else(|| nominal_count(fmrc, grid, hour));
    }
    (have, want)
}

/// Expected grid count per the definition, `None` when the definition is
/// absent or does not cover this variable.
fn expected_count(
    fmrc: &FmrcCollection,
    definition: Option<&CollectionDefinition>,
    var: &UberGrid,
    run_time: DateTime<Utc>,
    hour: f64,
) -> Option<u32> {
    let def = definition?;
    let (seq, dvar) = def.find_variable(&var.name)?;
    let tc = seq.seq.time_coord_for(run_time)?;
    if def.registry.time(tc).find_index(hour).is_none() {
        return Some(0);
    }
    let nverts = dvar
        .vtc
        .as_ref()
        .map_or(1, |vtc| vtc.count_vert(hour).max(1));
    let nens = dvar.ens.map_or(1, |id| def.registry.ens(id).len());
    Some((nverts * nens) as u32)
}

/// Nominal slot count of the observed grid itself, used as "expected"
/// when no definition covers the variable.
fn nominal_count(
    fmrc: &FmrcCollection,
    grid: &crate::run::GridInventory,
    hour: f64,
) -> u32 {
    if fmrc.registry.time(grid.time).find_index(hour).is_none() {
        return 0;
    }
    let nverts = grid.vert.map_or(1, |id| fmrc.registry.vert(id).len());
    let nens = grid.ens.map_or(1, |id| fmrc.registry.ens(id).len());
    (nverts * nens) as u32
}

/// `count="have/want" percent=...` when short, bare `count` when complete.
fn push_count_percent(elem: &mut BytesStart<'_>, have: u32, want: u32, always_percent: bool) {
    if (have == want || want == 0) && have != 0 {
        elem.push_attribute(("count", have.to_string().as_str()));
        if always_percent {
            elem.push_attribute(("percent", "100"));
        }
    } else if want != 0 {
        let percent = (100.0 * have as f64 / want as f64) as u32;
        elem.push_attribute(("count", format!("{have}/{want}").as_str()));
        elem.push_attribute(("percent", percent.to_string().as_str()));
    }
}

/// One (run, variable) discrepancy against the definition.
#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub run_time: DateTime<Utc>,
    pub variable: String,
    /// Observed offsets the definition does not expect.
    pub extra_offsets: Vec<f64>,
    /// Expected offsets with no observed data (verbose mode only).
    pub missing_offsets: Vec<f64>,
    /// Per matched offset: observed levels the definition does not expect.
    pub extra_levels: Vec<(f64, Vec<f64>)>,
    /// Per matched offset: expected levels not observed (verbose mode only).
    pub missing_levels: Vec<(f64, Vec<f64>)>,
}

impl Discrepancy {
    fn is_empty(&self) -> bool {
        self.extra_offsets.is_empty()
            && self.missing_offsets.is_empty()
            && self.extra_levels.is_empty()
            && self.missing_levels.is_empty()
    }
}

/// Everything observed that the definition does not expect, and (when
/// `include_missing` is set) everything expected that was not observed.
#[derive(Debug, Default, Serialize)]
pub struct DiscrepancyReport {
    pub dataset: String,
    /// Observed variables the definition does not name.
    pub extra_variables: Vec<String>,
    /// Defined variables never observed (verbose mode only).
    pub missing_variables: Vec<String>,
    pub entries: Vec<Discrepancy>,
}

impl DiscrepancyReport {
    pub fn build(
        fmrc: &FmrcCollection,
        definition: &CollectionDefinition,
        include_missing: bool,
    ) -> Self {
        let mut report = DiscrepancyReport {
            dataset: fmrc.name.clone(),
            ..Default::default()
        };

        for var in &fmrc.vars {
            if definition.find_variable(&var.name).is_none() {
                report.extra_variables.push(var.name.clone());
                continue;
            }

            for (ri, run) in fmrc.runs.iter().enumerate() {
                let Some(grid) = fmrc.grid_for(var, ri) else {
                    continue;
                };
                let observed = &fmrc.registry.time(grid.time).offset_hours;
                let expected: Vec<f64> = definition
                    .expected_offsets(run.run_time, &var.name)
                    .map(|tc| tc.offset_hours.clone())
                    .unwrap_or_default();

                let extra_offsets = set_difference(observed, &expected);
                let missing_offsets = if include_missing {
                    set_difference(&expected, observed)
                } else {
                    Vec::new()
                };

                let mut extra_levels = Vec::new();
                let mut missing_levels = Vec::new();
                for &hour in observed {
                    if !expected.iter().any(|&e| close_enough(e, hour)) {
                        continue;
                    }
                    let obs_levels = observed_levels(fmrc, grid, hour);
                    let exp_levels: Vec<f64> = definition
                        .expected_verts(&var.name, hour)
                        .unwrap_or_default();
                    if obs_levels.is_empty() && exp_levels.is_empty() {
                        continue;
                    }
                    let extra = set_difference(&obs_levels, &exp_levels);
                    if !extra.is_empty() {
                        extra_levels.push((hour, extra));
                    }
                    if include_missing {
                        let missing = set_difference(&exp_levels, &obs_levels);
                        if !missing.is_empty() {
                            missing_levels.push((hour, missing));
                        }
                    }
                }

                let entry = Discrepancy {
                    run_time: run.run_time,
                    variable: var.name.clone(),
                    extra_offsets,
                    missing_offsets,
                    extra_levels,
                    missing_levels,
                };
                if !entry.is_empty() {
                    report.entries.push(entry);
                }
            }
        }

        if include_missing {
            for seq in &definition.run_seqs {
                for dvar in &seq.variables {
                    if fmrc.find_var(&dvar.name).is_none() {
                        report.missing_variables.push(dvar.name.clone());
                    }
                }
            }
        }

        report
    }

    pub fn is_clean(&self) -> bool {
        self.extra_variables.is_empty()
            && self.missing_variables.is_empty()
            && self.entries.is_empty()
    }
}

impl fmt::Display for DiscrepancyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Discrepancy report for {}", self.dataset)?;
        for name in &self.extra_variables {
            writeln!(f, "  extra variable: {name}")?;
        }
        for name in &self.missing_variables {
            writeln!(f, "  missing variable: {name}")?;
        }
        for entry in &self.entries {
            writeln!(
                f,
                "  {} {}:",
                format_iso8601(entry.run_time),
                entry.variable
            )?;
            if !entry.extra_offsets.is_empty() {
                writeln!(f, "    extra offsets: {:?}", entry.extra_offsets)?;
            }
            if !entry.missing_offsets.is_empty() {
                writeln!(f, "    missing offsets: {:?}", entry.missing_offsets)?;
            }
            for (hour, levels) in &entry.extra_levels {
                writeln!(f, "    offset {hour}: extra levels {levels:?}")?;
            }
            for (hour, levels) in &entry.missing_levels {
                writeln!(f, "    offset {hour}: missing levels {levels:?}")?;
            }
        }
        Ok(())
    }
}

/// Observed finite vertical levels at one offset, ascending. The 2D
/// sentinel is dropped; only real levels compare against the definition.
fn observed_levels(
    fmrc: &FmrcCollection,
    grid: &crate::run::GridInventory,
    hour: f64,
) -> Vec<f64> {
    if grid.vert.is_none() {
        return Vec::new();
    }
    let mut levels: Vec<f64> = grid
        .vert_values_at(&fmrc.registry, hour)
        .into_iter()
        .filter(|v| v.is_finite())
        .collect();
    levels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    levels
}

/// Values of `a` with no tolerance-equal counterpart in `b`, sorted
/// ascending so descending inputs compare the same as ascending ones.
fn set_difference(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = a
        .iter()
        .copied()
        .filter(|&x| !b.iter().any(|&y| close_enough(x, y)))
        .collect();
    out.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    out
}
