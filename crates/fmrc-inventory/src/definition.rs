//! Externally authored expected-inventory definition.
//!
//! A definition names, per variable, the run sequence it should follow
//! (one offset list for all runs, or a run-hour dependent mapping) and
//! the vertical levels it should carry, optionally restricted per lead
//! time. The reconciler compares a built collection against it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::error;

use fmrc_common::{close_enough, fmt_f64, fmt_f64_list, hour_of_day};

use crate::collection::FmrcCollection;
use crate::coords::{CoordRegistry, EnsId, TimeCoord, TimeId, VertCoord};
use crate::error::{InventoryError, Result};
use crate::xml::{parse_vert_values, vert_values_text};

/// Which canonical time coordinate each run in a sequence uses.
#[derive(Debug, Clone)]
pub enum RunSeqDef {
    /// Every run uses one offset list.
    AllRuns(TimeId),
    /// Run-hour dependent mapping, extended to a full daily cycle.
    PerHour(Vec<(f64, TimeId)>),
}

impl RunSeqDef {
    /// Build a per-hour mapping: pairs are sorted by hour, then the cycle
    /// is extended past 24h by repeating the increment pattern, so a run
    /// at any hour of day can match by exact hour equality.
    pub fn per_hour(mut pairs: Vec<(f64, TimeId)>) -> Self {
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        if pairs.len() > 1 {
            let mut match_index = 0;
            let mut run_hour = pairs[pairs.len() - 1].0;
            while run_hour < 24.0 {
                let incr = pairs[match_index + 1].0 - pairs[match_index].0;
                if incr <= 0.0 {
                    break;
                }
                run_hour += incr;
                let tc = pairs[match_index + 1].1;
                pairs.push((run_hour, tc));
                match_index += 1;
            }
        }
        RunSeqDef::PerHour(pairs)
    }

    /// Expected time coordinate for a run time, `None` when the sequence
    /// has no entry for that hour of day.
    pub fn time_coord_for(&self, run_time: DateTime<Utc>) -> Option<TimeId> {
        match self {
            RunSeqDef::AllRuns(tc) => Some(*tc),
            RunSeqDef::PerHour(pairs) => {
                let hour = hour_of_day(run_time);
                pairs.iter().find(|(h, _)| *h == hour).map(|(_, tc)| *tc)
            }
        }
    }
}

/// A vertical coordinate whose levels may vary by lead-time offset.
///
/// The override table starts empty; a restriction replaces the levels at
/// the named offsets only. Without a time coordinate, every offset gets
/// the base levels.
#[derive(Debug, Clone)]
pub struct VertTimeCoord {
    pub vert: VertCoord,
    pub time: Option<TimeCoord>,
    overrides: Vec<Option<Vec<f64>>>,
}

impl VertTimeCoord {
    pub fn new(vert: VertCoord) -> Self {
        Self {
            vert,
            time: None,
            overrides: Vec::new(),
        }
    }

    pub fn with_time(vert: VertCoord, time: TimeCoord) -> Self {
        let n = time.len();
        Self {
            vert,
            time: Some(time),
            overrides: vec![None; n],
        }
    }

    /// Whether any offset carries restricted levels.
    pub fn is_restricted(&self) -> bool {
        self.overrides.iter().any(|o| o.is_some())
    }

    /// Restrictions as `(levels, offsets)` groups, for serialization.
    pub fn restrictions(&self) -> Vec<(Vec<f64>, Vec<f64>)> {
        let Some(tc) = &self.time else {
            return Vec::new();
        };
        let mut groups: Vec<(Vec<f64>, Vec<f64>)> = Vec::new();
        for (i, ov) in self.overrides.iter().enumerate() {
            let Some(levels) = ov else { continue };
            match groups.iter_mut().find(|(l, _)| l == levels) {
                Some((_, offsets)) => offsets.push(tc.offset_hours[i]),
                None => groups.push((levels.clone(), vec![tc.offset_hours[i]])),
            }
        }
        groups
    }

    /// Replace the levels at each listed offset.
    ///
    /// An offset not present in the owning time coordinate is reported
    /// and skipped; the remaining offsets are still applied.
    pub fn add_restriction(&mut self, levels: &[f64], offsets: &[f64]) {
        let Some(tc) = &self.time else {
            error!(coord = %self.vert.name, "Restriction on a vertical coordinate with no time axis");
            return;
        };
        for &offset in offsets {
            match tc.find_index(offset) {
                Some(i) => self.overrides[i] = Some(levels.to_vec()),
                None => {
                    error!(
                        coord = %self.vert.name,
                        offset_hour = offset,
                        "Restriction offset not found in time coordinate"
                    );
                }
            }
        }
    }

    /// Expected levels at one offset: the override when set, else the
    /// base levels; empty when the offset is not in the time coordinate
    /// at all.
    pub fn vert_values_for(&self, offset_hour: f64) -> Vec<f64> {
        let Some(tc) = &self.time else {
            return self.vert.values1.clone();
        };
        if !self.is_restricted() {
            return self.vert.values1.clone();
        }
        match tc.find_index(offset_hour) {
            Some(i) => self.overrides[i]
                .clone()
                .unwrap_or_else(|| self.vert.values1.clone()),
            None => Vec::new(),
        }
    }

    pub fn count_vert(&self, offset_hour: f64) -> usize {
        self.vert_values_for(offset_hour).len()
    }
}

/// One expected variable within a run sequence.
#[derive(Debug, Clone)]
pub struct DefVariable {
    pub name: String,
    pub ens: Option<EnsId>,
    pub vtc: Option<VertTimeCoord>,
}

/// One expected run sequence and its member variables.
#[derive(Debug, Clone)]
pub struct DefRunSeq {
    pub seq: RunSeqDef,
    pub variables: Vec<DefVariable>,
}

impl DefRunSeq {
    pub fn find_variable(&self, name: &str) -> Option<&DefVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// The complete expected inventory for a collection.
#[derive(Debug)]
pub struct CollectionDefinition {
    pub name: String,
    /// Source-name filter used when scanning a directory for runs.
    pub suffix_filter: Option<String>,
    pub registry: CoordRegistry,
    pub run_seqs: Vec<DefRunSeq>,
}

impl CollectionDefinition {
    /// The run sequence owning a variable, with the variable itself.
    pub fn find_variable(&self, name: &str) -> Option<(&DefRunSeq, &DefVariable)> {
        for seq in &self.run_seqs {
            if let Some(var) = seq.find_variable(name) {
                return Some((seq, var));
            }
        }
        None
    }

    /// Expected offsets for one (run time, variable), `None` when the
    /// definition does not cover either.
    pub fn expected_offsets(&self, run_time: DateTime<Utc>, variable: &str) -> Option<&TimeCoord> {
        let (seq, _) = self.find_variable(variable)?;
        let tc = seq.seq.time_coord_for(run_time)?;
        Some(self.registry.time(tc))
    }

    /// Expected vertical levels for one (variable, offset); `None` when
    /// the variable is not defined, empty when it has no vertical axis.
    pub fn expected_verts(&self, variable: &str, offset_hour: f64) -> Option<Vec<f64>> {
        let (_, var) = self.find_variable(variable)?;
        Some(
            var.vtc
                .as_ref()
                .map(|vtc| vtc.vert_values_for(offset_hour))
                .unwrap_or_default(),
        )
    }

    /// Derive a definition from an already-built collection: each
    /// sequence keeps one offset list when uniform, else its per-hour
    /// mapping; each variable gets its union coordinates as the expected
    /// ones.
    pub fn from_collection(fmrc: &FmrcCollection) -> Result<Self> {
        let mut registry = CoordRegistry::new();
        let mut run_seqs = Vec::with_capacity(fmrc.run_seqs.len());

        for rs in &fmrc.run_seqs {
            let seq = if rs.is_uniform() && !rs.slots.is_empty() {
                let tc = fmrc.registry.time(rs.slots[0].tc).clone();
                RunSeqDef::AllRuns(registry.intern_time(tc)?)
            } else {
                let mut pairs = Vec::with_capacity(rs.slots.len());
                for slot in &rs.slots {
                    let hour = hour_of_day(slot.run_time);
                    let tc = registry.intern_time(fmrc.registry.time(slot.tc).clone())?;
                    if !pairs.iter().any(|(h, t)| *h == hour && *t == tc) {
                        pairs.push((hour, tc));
                    }
                }
                RunSeqDef::per_hour(pairs)
            };

            let mut variables = Vec::with_capacity(rs.variables.len());
            for name in &rs.variables {
                let ug = fmrc
                    .find_var(name)
                    .ok_or_else(|| InventoryError::VariableNotFound(name.clone()))?;
                let ens = match ug.ens {
                    Some(id) => Some(registry.intern_ens(fmrc.registry.ens(id).clone())),
                    None => None,
                };
                let vtc = match ug.vert {
                    Some(id) => Some(VertTimeCoord::new(fmrc.registry.vert(id).clone())),
                    None => None,
                };
                variables.push(DefVariable {
                    name: name.clone(),
                    ens,
                    vtc,
                });
            }

            run_seqs.push(DefRunSeq { seq, variables });
        }

        Ok(Self {
            name: fmrc.name.clone(),
            suffix_filter: None,
            registry,
            run_seqs,
        })
    }

    /// Serialize to the `fmrcDefinition` XML document.
    pub fn to_xml(&self) -> Result<String> {
        let werr = |e: &dyn std::fmt::Display| InventoryError::CacheWrite {
            path: self.name.clone(),
            message: e.to_string(),
        };
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| werr(&e))?;

        let mut root = BytesStart::new("fmrcDefinition");
        root.push_attribute(("dataset", self.name.as_str()));
        if let Some(suffix) = &self.suffix_filter {
            root.push_attribute(("suffixFilter", suffix.as_str()));
        }
        writer.write_event(Event::Start(root)).map_err(|e| werr(&e))?;

        for (i, ec) in self.registry.ens_coords().iter().enumerate() {
            let mut elem = BytesStart::new("ensCoord");
            elem.push_attribute(("id", i.to_string().as_str()));
            elem.push_attribute(("name", ec.name.as_str()));
            elem.push_attribute(("productDefinition", ec.product_definition.to_string().as_str()));
            writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;
            let text = ec
                .member_types
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(|e| werr(&e))?;
            writer
                .write_event(Event::End(BytesEnd::new("ensCoord")))
                .map_err(|e| werr(&e))?;
        }

        for (i, vc) in self.registry.verts().iter().enumerate() {
            let mut elem = BytesStart::new("vertCoord");
            elem.push_attribute(("id", i.to_string().as_str()));
            elem.push_attribute(("name", vc.name.as_str()));
            if let Some(units) = &vc.units {
                elem.push_attribute(("units", units.as_str()));
            }
            writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;
            writer
                .write_event(Event::Text(BytesText::new(&vert_values_text(vc))))
                .map_err(|e| werr(&e))?;
            writer
                .write_event(Event::End(BytesEnd::new("vertCoord")))
                .map_err(|e| werr(&e))?;
        }

        for (i, tc) in self.registry.times().iter().enumerate() {
            let mut elem = BytesStart::new("offsetHours");
            elem.push_attribute(("id", i.to_string().as_str()));
            writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;
            writer
                .write_event(Event::Text(BytesText::new(&fmt_f64_list(&tc.offset_hours))))
                .map_err(|e| werr(&e))?;
            writer
                .write_event(Event::End(BytesEnd::new("offsetHours")))
                .map_err(|e| werr(&e))?;
        }

        for rs in &self.run_seqs {
            let mut elem = BytesStart::new("runSequence");
            if let RunSeqDef::AllRuns(tc) = &rs.seq {
                elem.push_attribute(("allUseSeq", tc.0.to_string().as_str()));
            }
            writer.write_event(Event::Start(elem)).map_err(|e| werr(&e))?;

            if let RunSeqDef::PerHour(pairs) = &rs.seq {
                for (hour, tc) in pairs {
                    let mut run = BytesStart::new("run");
                    run.push_attribute(("runHour", fmt_f64(*hour).as_str()));
                    run.push_attribute(("offsetHourSeq", tc.0.to_string().as_str()));
                    writer.write_event(Event::Empty(run)).map_err(|e| werr(&e))?;
                }
            }

            for var in &rs.variables {
                let mut velem = BytesStart::new("variable");
                velem.push_attribute(("name", var.name.as_str()));
                if let Some(ens) = var.ens {
                    velem.push_attribute(("ensCoord", ens.0.to_string().as_str()));
                }
                let vert_id = var.vtc.as_ref().and_then(|vtc| {
                    self.registry
                        .verts()
                        .iter()
                        .position(|vc| vc.equals_data(&vtc.vert))
                });
                if let Some(id) = vert_id {
                    velem.push_attribute(("vertCoord", id.to_string().as_str()));
                }

                let restrictions = var
                    .vtc
                    .as_ref()
                    .map(|vtc| vtc.restrictions())
                    .unwrap_or_default();
                if restrictions.is_empty() {
                    writer.write_event(Event::Empty(velem)).map_err(|e| werr(&e))?;
                } else {
                    writer.write_event(Event::Start(velem)).map_err(|e| werr(&e))?;
                    for (levels, offsets) in restrictions {
                        let mut relem = BytesStart::new("vertTimeCoord");
                        relem.push_attribute(("restrict", fmt_f64_list(&levels).as_str()));
                        writer.write_event(Event::Start(relem)).map_err(|e| werr(&e))?;
                        writer
                            .write_event(Event::Text(BytesText::new(&fmt_f64_list(&offsets))))
                            .map_err(|e| werr(&e))?;
                        writer
                            .write_event(Event::End(BytesEnd::new("vertTimeCoord")))
                            .map_err(|e| werr(&e))?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new("variable")))
                        .map_err(|e| werr(&e))?;
                }
            }

            writer
                .write_event(Event::End(BytesEnd::new("runSequence")))
                .map_err(|e| werr(&e))?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("fmrcDefinition")))
            .map_err(|e| werr(&e))?;

        String::from_utf8(writer.into_inner()).map_err(|e| InventoryError::CacheWrite {
            path: self.name.clone(),
            message: e.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        fs::write(path, xml).map_err(|e| InventoryError::CacheWrite {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)?;
        Self::from_xml(&xml, &path.display().to_string())
    }

    /// Parse a `fmrcDefinition` document.
    pub fn from_xml(xml: &str, label: &str) -> Result<Self> {
        let parse_err = |message: String| InventoryError::XmlParse {
            path: label.to_string(),
            message,
        };

        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut name = String::new();
        let mut suffix_filter = None;
        let mut registry = CoordRegistry::new();
        let mut run_seqs: Vec<DefRunSeq> = Vec::new();

        let mut time_ids: HashMap<usize, TimeId> = HashMap::new();
        let mut vert_ids: HashMap<usize, crate::coords::VertId> = HashMap::new();
        let mut ens_ids: HashMap<usize, EnsId> = HashMap::new();

        enum Pending {
            Ens { id: usize, name: String, pdn: i32 },
            Vert { id: usize, name: String, units: Option<String> },
            Time { id: usize },
            Restriction { levels: Vec<f64> },
        }
        let mut pending: Option<Pending> = None;
        // Per-hour pairs of the runSequence currently open.
        let mut open_pairs: Option<Vec<(f64, TimeId)>> = None;

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let attrs = attrs_of(&e).map_err(&parse_err)?;
                    match e.name().as_ref() {
                        b"fmrcDefinition" => {
                            name = attrs.get("dataset").cloned().unwrap_or_default();
                            suffix_filter = attrs.get("suffixFilter").cloned();
                        }
                        b"ensCoord" => {
                            pending = Some(Pending::Ens {
                                id: parse_attr(&attrs, "id").map_err(&parse_err)?,
                                name: attrs.get("name").cloned().unwrap_or_default(),
                                pdn: parse_attr(&attrs, "productDefinition").map_err(&parse_err)?,
                            });
                        }
                        b"vertCoord" => {
                            pending = Some(Pending::Vert {
                                id: parse_attr(&attrs, "id").map_err(&parse_err)?,
                                name: attrs.get("name").cloned().unwrap_or_default(),
                                units: attrs.get("units").cloned(),
                            });
                        }
                        b"offsetHours" => {
                            pending = Some(Pending::Time {
                                id: parse_attr(&attrs, "id").map_err(&parse_err)?,
                            });
                        }
                        b"runSequence" => {
                            match attrs.get("allUseSeq") {
                                Some(raw) => {
                                    let id: usize =
                                        raw.parse().map_err(|e: std::num::ParseIntError| {
                                            parse_err(e.to_string())
                                        })?;
                                    let tc = *time_ids.get(&id).ok_or_else(|| {
                                        parse_err(format!("unknown offsetHours id {id}"))
                                    })?;
                                    run_seqs.push(DefRunSeq {
                                        seq: RunSeqDef::AllRuns(tc),
                                        variables: Vec::new(),
                                    });
                                    open_pairs = None;
                                }
                                None => {
                                    run_seqs.push(DefRunSeq {
                                        // Replaced by the per-hour pairs at close.
                                        seq: RunSeqDef::PerHour(Vec::new()),
                                        variables: Vec::new(),
                                    });
                                    open_pairs = Some(Vec::new());
                                }
                            }
                        }
                        b"run" => {
                            let hour: f64 = parse_attr(&attrs, "runHour").map_err(&parse_err)?;
                            let id: usize =
                                parse_attr(&attrs, "offsetHourSeq").map_err(&parse_err)?;
                            let tc = *time_ids
                                .get(&id)
                                .ok_or_else(|| parse_err(format!("unknown offsetHours id {id}")))?;
                            if let Some(pairs) = &mut open_pairs {
                                pairs.push((hour, tc));
                            }
                        }
                        b"variable" => {
                            let var_name = attrs
                                .get("name")
                                .cloned()
                                .ok_or_else(|| parse_err("variable missing name".into()))?;
                            let ens = match attrs.get("ensCoord") {
                                Some(raw) => {
                                    let id: usize =
                                        raw.parse().map_err(|e: std::num::ParseIntError| {
                                            parse_err(e.to_string())
                                        })?;
                                    Some(*ens_ids.get(&id).ok_or_else(|| {
                                        parse_err(format!("unknown ensCoord id {id}"))
                                    })?)
                                }
                                None => None,
                            };
                            let vtc = match attrs.get("vertCoord") {
                                Some(raw) => {
                                    let id: usize =
                                        raw.parse().map_err(|e: std::num::ParseIntError| {
                                            parse_err(e.to_string())
                                        })?;
                                    let vid = *vert_ids.get(&id).ok_or_else(|| {
                                        parse_err(format!("unknown vertCoord id {id}"))
                                    })?;
                                    Some(VertTimeCoord::new(registry.vert(vid).clone()))
                                }
                                None => None,
                            };
                            let seq = run_seqs
                                .last_mut()
                                .ok_or_else(|| parse_err("variable outside runSequence".into()))?;
                            seq.variables.push(DefVariable {
                                name: var_name,
                                ens,
                                vtc,
                            });
                        }
                        b"vertTimeCoord" => {
                            let raw = attrs
                                .get("restrict")
                                .cloned()
                                .ok_or_else(|| parse_err("vertTimeCoord missing restrict".into()))?;
                            let levels = floats_of(&raw).map_err(&parse_err)?;
                            pending = Some(Pending::Restriction { levels });
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| parse_err(e.to_string()))?;
                    match pending.take() {
                        Some(Pending::Time { id }) => {
                            let offsets = floats_of(&text).map_err(&parse_err)?;
                            time_ids.insert(id, registry.intern_time(TimeCoord::new(offsets))?);
                        }
                        Some(Pending::Vert { id, name, units }) => {
                            let vc = parse_vert_values(&text, name, units).map_err(&parse_err)?;
                            vert_ids.insert(id, registry.intern_vert(vc)?);
                        }
                        Some(Pending::Ens { id, name, pdn }) => {
                            let types = text
                                .split_whitespace()
                                .map(|s| s.parse::<i32>())
                                .collect::<std::result::Result<Vec<_>, _>>()
                                .map_err(|e| parse_err(e.to_string()))?;
                            ens_ids.insert(
                                id,
                                registry.intern_ens(crate::coords::EnsCoord::new(name, pdn, types)),
                            );
                        }
                        Some(Pending::Restriction { levels }) => {
                            let offsets = floats_of(&text).map_err(&parse_err)?;
                            let seq = run_seqs
                                .last_mut()
                                .ok_or_else(|| parse_err("restriction outside runSequence".into()))?;
                            let union_tc = union_time_coord(&seq.seq, &open_pairs, &registry);
                            let var = seq
                                .variables
                                .last_mut()
                                .ok_or_else(|| parse_err("restriction outside variable".into()))?;
                            if let Some(vtc) = &mut var.vtc {
                                if vtc.time.is_none() {
                                    *vtc = VertTimeCoord::with_time(vtc.vert.clone(), union_tc);
                                }
                                vtc.add_restriction(&levels, &offsets);
                            }
                        }
                        None => {}
                    }
                }
                Ok(Event::End(e)) => {
                    if e.name().as_ref() == b"runSequence" {
                        if let Some(pairs) = open_pairs.take() {
                            if let Some(seq) = run_seqs.last_mut() {
                                seq.seq = RunSeqDef::per_hour(pairs);
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(parse_err(format!(
                        "error at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(Self {
            name,
            suffix_filter,
            registry,
            run_seqs,
        })
    }
}

/// The time coordinate a restricted vertical coordinate is keyed by: the
/// sequence's single coordinate, or the sorted union of its per-hour
/// coordinates.
fn union_time_coord(
    seq: &RunSeqDef,
    open_pairs: &Option<Vec<(f64, TimeId)>>,
    registry: &CoordRegistry,
) -> TimeCoord {
    match seq {
        RunSeqDef::AllRuns(tc) => registry.time(*tc).clone(),
        RunSeqDef::PerHour(_) => {
            let mut hours: Vec<f64> = Vec::new();
            if let Some(pairs) = open_pairs {
                for (_, tc) in pairs {
                    for &h in &registry.time(*tc).offset_hours {
                        if !hours.iter().any(|&x| close_enough(x, h)) {
                            hours.push(h);
                        }
                    }
                }
            }
            hours.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            TimeCoord::new(hours)
        }
    }
}

fn attrs_of(e: &BytesStart<'_>) -> std::result::Result<HashMap<String, String>, String> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        out.insert(
            String::from_utf8_lossy(attr.key.as_ref()).to_string(),
            attr.unescape_value().map_err(|e| e.to_string())?.to_string(),
        );
    }
    Ok(out)
}

fn parse_attr<T: std::str::FromStr>(
    attrs: &HashMap<String, String>,
    key: &str,
) -> std::result::Result<T, String>
where
    T::Err: std::fmt::Display,
{
    attrs
        .get(key)
        .ok_or_else(|| format!("missing attribute {key}"))?
        .parse::<T>()
        .map_err(|e| format!("attribute {key}: {e}"))
}

fn floats_of(text: &str) -> std::result::Result<Vec<f64>, String> {
    text.split([' ', ','])
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<f64>().map_err(|e| format!("{s}: {e}")))
        .collect()
}
