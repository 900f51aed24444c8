//! Per-run inventory XML cache.
//!
//! One run's inventory persists as `<source>.fmrInv.xml` next to the file
//! it was derived from. Reading the cache back skips the coordinate scan
//! entirely, which is what makes rebuilding large collections cheap.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use fmrc_common::{fmt_f64, fmt_f64_list, format_iso8601, parse_iso8601, BoundingBox};

use crate::coords::{CoordRegistry, EnsCoord, EnsId, TimeCoord, TimeId, VertCoord, VertId};
use crate::error::{InventoryError, Result};
use crate::run::{GridInventory, Missing, RunInventory};
use crate::source::RunSource;

/// Suffix appended to the source file name to form the cache path.
pub const CACHE_SUFFIX: &str = ".fmrInv.xml";

/// Cache policy for [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Use the cache when it exists and is at least as new as the source,
    /// otherwise derive and rewrite it.
    Normal,
    /// Always derive from the source and rewrite the cache.
    ForceNew,
    /// Read the cache only; error when it is absent or unreadable.
    CacheOnly,
}

/// Cache path for a source file: the file name plus [`CACHE_SUFFIX`].
pub fn cache_path(source_path: &Path) -> PathBuf {
    let mut name = source_path.as_os_str().to_os_string();
    name.push(CACHE_SUFFIX);
    PathBuf::from(name)
}

/// Obtain a run's inventory, going through the XML cache per `mode`.
///
/// A stale or unparseable cache falls back to re-deriving from the
/// source; a cache write failure is logged and the derived inventory
/// returned anyway.
pub fn open(source: &dyn RunSource, source_path: &Path, mode: OpenMode) -> Result<RunInventory> {
    let cache = cache_path(source_path);

    match mode {
        OpenMode::CacheOnly => read_inventory(&cache),
        OpenMode::ForceNew => {
            let run = RunInventory::from_source(source)?;
            write_cache(&run, &cache);
            Ok(run)
        }
        OpenMode::Normal => {
            if cache_is_fresh(source_path, &cache) {
                match read_inventory(&cache) {
                    Ok(run) => {
                        debug!(cache = %cache.display(), "Loaded run inventory from cache");
                        return Ok(run);
                    }
                    Err(e) => {
                        warn!(cache = %cache.display(), error = %e, "Ignoring unreadable cache");
                    }
                }
            }
            let run = RunInventory::from_source(source)?;
            write_cache(&run, &cache);
            Ok(run)
        }
    }
}

fn cache_is_fresh(source_path: &Path, cache: &Path) -> bool {
    let Ok(cache_meta) = fs::metadata(cache) else {
        return false;
    };
    let (Ok(cache_time), Ok(source_meta)) = (cache_meta.modified(), fs::metadata(source_path))
    else {
        return false;
    };
    match source_meta.modified() {
        Ok(source_time) => cache_time >= source_time,
        Err(_) => false,
    }
}

fn write_cache(run: &RunInventory, cache: &Path) {
    if let Err(e) = write_inventory(run, cache) {
        warn!(cache = %cache.display(), error = %e, "Failed to write inventory cache");
    }
}

/// Serialize one run inventory to its XML document form.
pub fn to_xml(run: &RunInventory) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| write_err(run, e))?;

    let mut root = BytesStart::new("forecastModelRun");
    root.push_attribute(("name", run.name.as_str()));
    root.push_attribute(("runTime", format_iso8601(run.run_time).as_str()));
    writer
        .write_event(Event::Start(root))
        .map_err(|e| write_err(run, e))?;

    if let Some(bb) = &run.bbox {
        let mut elem = BytesStart::new("horizBB");
        elem.push_attribute(("west", fmt_f64(bb.west).as_str()));
        elem.push_attribute(("east", fmt_f64(bb.east).as_str()));
        elem.push_attribute(("south", fmt_f64(bb.south).as_str()));
        elem.push_attribute(("north", fmt_f64(bb.north).as_str()));
        writer
            .write_event(Event::Empty(elem))
            .map_err(|e| write_err(run, e))?;
    }

    for (i, ec) in run.registry.ens_coords().iter().enumerate() {
        let mut elem = BytesStart::new("ensCoord");
        elem.push_attribute(("id", i.to_string().as_str()));
        elem.push_attribute(("name", ec.name.as_str()));
        elem.push_attribute(("productDefinition", ec.product_definition.to_string().as_str()));
        writer
            .write_event(Event::Start(elem))
            .map_err(|e| write_err(run, e))?;
        let text = ec
            .member_types
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(|e| write_err(run, e))?;
        writer
            .write_event(Event::End(BytesEnd::new("ensCoord")))
            .map_err(|e| write_err(run, e))?;
    }

    for (i, vc) in run.registry.verts().iter().enumerate() {
        let mut elem = BytesStart::new("vertCoord");
        elem.push_attribute(("id", i.to_string().as_str()));
        elem.push_attribute(("name", vc.name.as_str()));
        if let Some(units) = &vc.units {
            elem.push_attribute(("units", units.as_str()));
        }
        writer
            .write_event(Event::Start(elem))
            .map_err(|e| write_err(run, e))?;
        writer
            .write_event(Event::Text(BytesText::new(&vert_values_text(vc))))
            .map_err(|e| write_err(run, e))?;
        writer
            .write_event(Event::End(BytesEnd::new("vertCoord")))
            .map_err(|e| write_err(run, e))?;
    }

    for (i, tc) in run.registry.times().iter().enumerate() {
        let mut elem = BytesStart::new("offsetHours");
        elem.push_attribute(("id", i.to_string().as_str()));
        writer
            .write_event(Event::Start(elem))
            .map_err(|e| write_err(run, e))?;
        writer
            .write_event(Event::Text(BytesText::new(&fmt_f64_list(&tc.offset_hours))))
            .map_err(|e| write_err(run, e))?;
        writer
            .write_event(Event::End(BytesEnd::new("offsetHours")))
            .map_err(|e| write_err(run, e))?;
    }

    for grid in &run.grids {
        let mut elem = BytesStart::new("variable");
        elem.push_attribute(("name", grid.name.as_str()));
        elem.push_attribute(("timeCoord", grid.time.0.to_string().as_str()));
        if let Some(vert) = grid.vert {
            elem.push_attribute(("vertCoord", vert.0.to_string().as_str()));
        }
        if let Some(ens) = grid.ens {
            elem.push_attribute(("ensCoord", ens.0.to_string().as_str()));
        }
        if grid.missing.is_empty() {
            writer
                .write_event(Event::Empty(elem))
                .map_err(|e| write_err(run, e))?;
        } else {
            writer
                .write_event(Event::Start(elem))
                .map_err(|e| write_err(run, e))?;
            for m in &grid.missing {
                let mut miss = BytesStart::new("missing");
                miss.push_attribute(("timeIndex", m.time_index.to_string().as_str()));
                miss.push_attribute(("ensIndex", m.ens_index.to_string().as_str()));
                miss.push_attribute(("vertIndex", m.vert_index.to_string().as_str()));
                writer
                    .write_event(Event::Empty(miss))
                    .map_err(|e| write_err(run, e))?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("variable")))
                .map_err(|e| write_err(run, e))?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("forecastModelRun")))
        .map_err(|e| write_err(run, e))?;

    String::from_utf8(writer.into_inner()).map_err(|e| InventoryError::CacheWrite {
        path: run.name.clone(),
        message: e.to_string(),
    })
}

/// Write one run inventory to `path`.
pub fn write_inventory(run: &RunInventory, path: &Path) -> Result<()> {
    let xml = to_xml(run)?;
    fs::write(path, xml).map_err(|e| InventoryError::CacheWrite {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Read one run inventory back from `path`.
pub fn read_inventory(path: &Path) -> Result<RunInventory> {
    let xml = fs::read_to_string(path)?;
    from_xml(&xml, &path.display().to_string())
}

/// Parse one run inventory from its XML document form.
///
/// `label` identifies the document in error messages, usually a path.
pub fn from_xml(xml: &str, label: &str) -> Result<RunInventory> {
    let parse_err = |message: String| InventoryError::XmlParse {
        path: label.to_string(),
        message,
    };

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut name = String::new();
    let mut run_time = None;
    let mut bbox = None;
    let mut registry = CoordRegistry::new();
    let mut grids: Vec<GridInventory> = Vec::new();

    // Declared ids remapped to interned ids; interning may renumber.
    let mut time_ids: HashMap<usize, TimeId> = HashMap::new();
    let mut vert_ids: HashMap<usize, VertId> = HashMap::new();
    let mut ens_ids: HashMap<usize, EnsId> = HashMap::new();

    // Pending element whose text body is still to come.
    enum Pending {
        Ens { id: usize, name: String, pdn: i32 },
        Vert { id: usize, name: String, units: Option<String> },
        Time { id: usize },
    }
    let mut pending: Option<Pending> = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let attrs = read_attrs(&e).map_err(&parse_err)?;
                match e.name().as_ref() {
                    b"forecastModelRun" => {
                        name = attrs
                            .get("name")
                            .cloned()
                            .ok_or_else(|| parse_err("forecastModelRun missing name".into()))?;
                        let raw = attrs
                            .get("runTime")
                            .ok_or_else(|| InventoryError::MissingRunTime(name.clone()))?;
                        run_time = Some(parse_iso8601(raw).map_err(|e| {
                            InventoryError::InvalidRunTime {
                                value: raw.clone(),
                                message: e.to_string(),
                            }
                        })?);
                    }
                    b"horizBB" => {
                        bbox = Some(BoundingBox {
                            west: attr_f64(&attrs, "west").map_err(&parse_err)?,
                            east: attr_f64(&attrs, "east").map_err(&parse_err)?,
                            south: attr_f64(&attrs, "south").map_err(&parse_err)?,
                            north: attr_f64(&attrs, "north").map_err(&parse_err)?,
                        });
                    }
                    b"ensCoord" => {
                        pending = Some(Pending::Ens {
                            id: attr_usize(&attrs, "id").map_err(&parse_err)?,
                            name: attrs.get("name").cloned().unwrap_or_default(),
                            pdn: attr_i32(&attrs, "productDefinition").map_err(&parse_err)?,
                        });
                    }
                    b"vertCoord" => {
                        pending = Some(Pending::Vert {
                            id: attr_usize(&attrs, "id").map_err(&parse_err)?,
                            name: attrs.get("name").cloned().unwrap_or_default(),
                            units: attrs.get("units").cloned(),
                        });
                    }
                    b"offsetHours" => {
                        pending = Some(Pending::Time {
                            id: attr_usize(&attrs, "id").map_err(&parse_err)?,
                        });
                    }
                    b"variable" => {
                        let var_name = attrs
                            .get("name")
                            .cloned()
                            .ok_or_else(|| parse_err("variable missing name".into()))?;
                        let tid = attr_usize(&attrs, "timeCoord").map_err(&parse_err)?;
                        let time = *time_ids
                            .get(&tid)
                            .ok_or_else(|| parse_err(format!("unknown timeCoord id {tid}")))?;
                        let vert = match attrs.get("vertCoord") {
                            Some(raw) => {
                                let vid = raw
                                    .parse::<usize>()
                                    .map_err(|e| parse_err(e.to_string()))?;
                                Some(*vert_ids.get(&vid).ok_or_else(|| {
                                    parse_err(format!("unknown vertCoord id {vid}"))
                                })?)
                            }
                            None => None,
                        };
                        let ens = match attrs.get("ensCoord") {
                            Some(raw) => {
                                let eid = raw
                                    .parse::<usize>()
                                    .map_err(|e| parse_err(e.to_string()))?;
                                Some(*ens_ids.get(&eid).ok_or_else(|| {
                                    parse_err(format!("unknown ensCoord id {eid}"))
                                })?)
                            }
                            None => None,
                        };
                        grids.push(GridInventory {
                            name: var_name,
                            time,
                            vert,
                            ens,
                            missing: Vec::new(),
                        });
                    }
                    b"missing" => {
                        let grid = grids
                            .last_mut()
                            .ok_or_else(|| parse_err("missing element outside variable".into()))?;
                        grid.missing.push(Missing {
                            time_index: attr_usize(&attrs, "timeIndex").map_err(&parse_err)?,
                            ens_index: attr_usize(&attrs, "ensIndex").map_err(&parse_err)?,
                            vert_index: attr_usize(&attrs, "vertIndex").map_err(&parse_err)?,
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| parse_err(e.to_string()))?;
                match pending.take() {
                    Some(Pending::Time { id }) => {
                        let offsets = parse_f64_list(&text).map_err(&parse_err)?;
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
                        ens_ids.insert(id, registry.intern_ens(EnsCoord::new(name, pdn, types)));
                    }
                    None => {}
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

    let run_time = run_time.ok_or_else(|| InventoryError::MissingRunTime(label.to_string()))?;
    Ok(RunInventory {
        name,
        run_time,
        registry,
        grids,
        bbox,
    })
}

fn read_attrs(e: &BytesStart<'_>) -> std::result::Result<HashMap<String, String>, String> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
        out.insert(key, value);
    }
    Ok(out)
}

fn attr_f64(attrs: &HashMap<String, String>, key: &str) -> std::result::Result<f64, String> {
    attrs
        .get(key)
        .ok_or_else(|| format!("missing attribute {key}"))?
        .parse::<f64>()
        .map_err(|e| format!("attribute {key}: {e}"))
}

fn attr_usize(attrs: &HashMap<String, String>, key: &str) -> std::result::Result<usize, String> {
    attrs
        .get(key)
        .ok_or_else(|| format!("missing attribute {key}"))?
        .parse::<usize>()
        .map_err(|e| format!("attribute {key}: {e}"))
}

fn attr_i32(attrs: &HashMap<String, String>, key: &str) -> std::result::Result<i32, String> {
    attrs
        .get(key)
        .ok_or_else(|| format!("missing attribute {key}"))?
        .parse::<i32>()
        .map_err(|e| format!("attribute {key}: {e}"))
}

fn parse_f64_list(text: &str) -> std::result::Result<Vec<f64>, String> {
    text.split_whitespace()
        .map(|s| s.parse::<f64>().map_err(|e| format!("{s}: {e}")))
        .collect()
}

/// Layer coordinates serialize as `lower,upper` pairs; single-value levels
/// as bare numbers. One coordinate uses one form throughout.
pub(crate) fn vert_values_text(vc: &VertCoord) -> String {
    match &vc.values2 {
        Some(bounds) => vc
            .values1
            .iter()
            .zip(bounds)
            .map(|(v1, v2)| format!("{},{}", fmt_f64(*v1), fmt_f64(*v2)))
            .collect::<Vec<_>>()
            .join(" "),
        None => fmt_f64_list(&vc.values1),
    }
}

pub(crate) fn parse_vert_values(
    text: &str,
    name: String,
    units: Option<String>,
) -> std::result::Result<VertCoord, String> {
    let mut values1 = Vec::new();
    let mut values2 = Vec::new();
    let mut layered = false;
    for token in text.split_whitespace() {
        match token.split_once(',') {
            Some((a, b)) => {
                layered = true;
                values1.push(a.parse::<f64>().map_err(|e| format!("{a}: {e}"))?);
                values2.push(b.parse::<f64>().map_err(|e| format!("{b}: {e}"))?);
            }
            None => {
                values1.push(token.parse::<f64>().map_err(|e| format!("{token}: {e}"))?);
                values2.push(0.0);
            }
        }
    }
    let mut vc = VertCoord::new(name, units, values1);
    if layered {
        vc.values2 = Some(values2);
    }
    Ok(vc)
}

fn write_err(run: &RunInventory, e: impl std::fmt::Display) -> InventoryError {
    InventoryError::CacheWrite {
        path: run.name.clone(),
        message: e.to_string(),
    }
}
