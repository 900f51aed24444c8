//! Canonical coordinate definitions and the per-collection registry.
//!
//! A run's time/vertical/ensemble axes are deduplicated by tolerance-based
//! data equality: two axes with the same values (within
//! [`fmrc_common::close_enough`]) share one canonical instance. Each
//! registry owns its own sequential id counters, so several collections can
//! be built independently in one process.

use fmrc_common::{all_close, close_enough};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Index of a canonical [`TimeCoord`] within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeId(pub usize);

/// Index of a canonical [`VertCoord`] within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertId(pub usize);

/// Index of a canonical [`EnsCoord`] within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnsId(pub usize);

/// An ordered sequence of forecast lead-time offsets, in hours since the
/// run's reference time.
///
/// Offsets are kept in whatever order the source produced; equality is
/// pairwise within tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCoord {
    pub offset_hours: Vec<f64>,
}

impl TimeCoord {
    pub fn new(offset_hours: Vec<f64>) -> Self {
        Self { offset_hours }
    }

    pub fn len(&self) -> usize {
        self.offset_hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offset_hours.is_empty()
    }

    /// Position of an offset hour, or `None` if this coordinate does not
    /// contain it.
    pub fn find_index(&self, offset_hour: f64) -> Option<usize> {
        self.offset_hours
            .iter()
            .position(|&h| close_enough(h, offset_hour))
    }

    pub fn equals_data(&self, other: &TimeCoord) -> bool {
        all_close(&self.offset_hours, &other.offset_hours)
    }
}

/// A named, unit-tagged vertical coordinate.
///
/// `values2` is present only for layer axes (lower/upper bound pairs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertCoord {
    pub name: String,
    pub units: Option<String>,
    pub values1: Vec<f64>,
    pub values2: Option<Vec<f64>>,
}

impl VertCoord {
    pub fn new(name: impl Into<String>, units: Option<String>, values1: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            units,
            values1,
            values2: None,
        }
    }

    pub fn with_bounds(mut self, values2: Vec<f64>) -> Self {
        self.values2 = Some(values2);
        self
    }

    pub fn len(&self) -> usize {
        self.values1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values1.is_empty()
    }

    pub fn equals_data(&self, other: &VertCoord) -> bool {
        if !all_close(&self.values1, &other.values1) {
            return false;
        }
        match (&self.values2, &other.values2) {
            (None, None) => true,
            (Some(a), Some(b)) => all_close(a, b),
            _ => false,
        }
    }
}

/// An ensemble coordinate: member count, product-definition number, and
/// per-member type codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsCoord {
    pub name: String,
    pub product_definition: i32,
    pub member_types: Vec<i32>,
}

impl EnsCoord {
    pub fn new(name: impl Into<String>, product_definition: i32, member_types: Vec<i32>) -> Self {
        Self {
            name: name.into(),
            product_definition,
            member_types,
        }
    }

    pub fn len(&self) -> usize {
        self.member_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_types.is_empty()
    }

    pub fn equals_data(&self, other: &EnsCoord) -> bool {
        self.member_types.len() == other.member_types.len()
            && self.product_definition == other.product_definition
            && self.member_types == other.member_types
    }
}

/// One vertical level as a (lower, upper) bound pair, keyed by midpoint.
///
/// `value2 == 0.0` means the upper bound is unset; the midpoint is then the
/// lower bound itself. Used to build union vertical coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LevelValue {
    pub value1: f64,
    pub value2: f64,
}

impl LevelValue {
    pub fn new(value1: f64, value2: f64) -> Self {
        Self { value1, value2 }
    }

    pub fn midpoint(&self) -> f64 {
        if self.value2 == 0.0 {
            self.value1
        } else {
            (self.value1 + self.value2) / 2.0
        }
    }

    pub fn equals_data(&self, other: &LevelValue) -> bool {
        close_enough(self.value1, other.value1) && close_enough(self.value2, other.value2)
    }
}

/// Arena of canonical coordinates, one per collection (or per run).
///
/// Ids are assigned in first-seen order and stay stable for the lifetime of
/// the registry. Interning scans for a data-equal instance before
/// registering a new one, so tolerance-equal candidates always resolve to
/// the same id.
#[derive(Debug, Default)]
pub struct CoordRegistry {
    times: Vec<TimeCoord>,
    verts: Vec<VertCoord>,
    ens: Vec<EnsCoord>,
}

impl CoordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_time(&mut self, candidate: TimeCoord) -> Result<TimeId> {
        if !candidate.offset_hours.iter().all(|v| v.is_finite()) {
            return Err(InventoryError::NonFiniteCoordinate("time"));
        }
        if let Some(i) = self.times.iter().position(|tc| tc.equals_data(&candidate)) {
            return Ok(TimeId(i));
        }
        self.times.push(candidate);
        Ok(TimeId(self.times.len() - 1))
    }

    pub fn intern_vert(&mut self, candidate: VertCoord) -> Result<VertId> {
        let finite = candidate.values1.iter().all(|v| v.is_finite())
            && candidate
                .values2
                .as_ref()
                .map_or(true, |v| v.iter().all(|x| x.is_finite()));
        if !finite {
            return Err(InventoryError::NonFiniteCoordinate("vertical"));
        }
        if let Some(i) = self.verts.iter().position(|vc| vc.equals_data(&candidate)) {
            return Ok(VertId(i));
        }
        self.verts.push(candidate);
        Ok(VertId(self.verts.len() - 1))
    }

    pub fn intern_ens(&mut self, candidate: EnsCoord) -> EnsId {
        if let Some(i) = self.ens.iter().position(|ec| ec.equals_data(&candidate)) {
            return EnsId(i);
        }
        self.ens.push(candidate);
        EnsId(self.ens.len() - 1)
    }

    pub fn time(&self, id: TimeId) -> &TimeCoord {
        &self.times[id.0]
    }

    pub fn vert(&self, id: VertId) -> &VertCoord {
        &self.verts[id.0]
    }

    pub fn ens(&self, id: EnsId) -> &EnsCoord {
        &self.ens[id.0]
    }

    pub fn times(&self) -> &[TimeCoord] {
        &self.times
    }

    pub fn verts(&self) -> &[VertCoord] {
        &self.verts
    }

    pub fn ens_coords(&self) -> &[EnsCoord] {
        &self.ens
    }
}

/// Build the union of vertical levels across several coordinates.
///
/// Levels are collected into a midpoint-keyed set with tolerance equality,
/// sorted ascending by midpoint, and rebuilt into bound arrays. `values2`
/// is emitted only when at least one input pair carried an upper bound.
pub fn union_vert_coord(name: &str, units: Option<String>, inputs: &[&VertCoord]) -> VertCoord {
    let mut levels: Vec<LevelValue> = Vec::new();
    for vc in inputs {
        for (i, &v1) in vc.values1.iter().enumerate() {
            let v2 = vc.values2.as_ref().map_or(0.0, |b| b[i]);
            let lv = LevelValue::new(v1, v2);
            if !levels.iter().any(|l| l.equals_data(&lv)) {
                levels.push(lv);
            }
        }
    }
    levels.sort_by(|a, b| {
        a.midpoint()
            .partial_cmp(&b.midpoint())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let values1: Vec<f64> = levels.iter().map(|l| l.value1).collect();
    let has_values2 = levels.iter().any(|l| l.value2 != 0.0);
    let mut out = VertCoord::new(name, units, values1);
    if has_values2 {
        out.values2 = Some(levels.iter().map(|l| l.value2).collect());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_dedup_idempotence() {
        let mut reg = CoordRegistry::new();
        let a = TimeCoord::new(vec![0.0, 3.0, 6.0]);
        let b = TimeCoord::new(vec![0.0, 3.0 + 1e-12, 6.0]);
        let id_a = reg.intern_time(a).unwrap();
        let id_b = reg.intern_time(b).unwrap();
        assert_eq!(id_a, id_b);
        assert_eq!(reg.times().len(), 1);
    }

    #[test]
    fn test_distinct_time_coords_get_sequential_ids() {
        let mut reg = CoordRegistry::new();
        let a = reg.intern_time(TimeCoord::new(vec![0.0, 3.0])).unwrap();
        let b = reg.intern_time(TimeCoord::new(vec![0.0, 6.0])).unwrap();
        assert_eq!(a, TimeId(0));
        assert_eq!(b, TimeId(1));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut reg = CoordRegistry::new();
        let err = reg.intern_time(TimeCoord::new(vec![0.0, f64::NAN]));
        assert!(err.is_err());

        let err = reg.intern_vert(VertCoord::new("isobaric", None, vec![f64::INFINITY]));
        assert!(err.is_err());
    }

    #[test]
    fn test_vert_coord_bounds_equality() {
        let plain = VertCoord::new("depth", None, vec![0.0, 10.0]);
        let layered = VertCoord::new("depth", None, vec![0.0, 10.0]).with_bounds(vec![5.0, 15.0]);
        assert!(!plain.equals_data(&layered));
        assert!(layered.equals_data(&layered.clone()));
    }

    #[test]
    fn test_ens_coord_equality() {
        let a = EnsCoord::new("ens", 2, vec![1, 1, 2]);
        let b = EnsCoord::new("ens", 2, vec![1, 1, 2]);
        let c = EnsCoord::new("ens", 3, vec![1, 1, 2]);
        assert!(a.equals_data(&b));
        assert!(!a.equals_data(&c));
    }

    #[test]
    fn test_union_vert_sorted_by_midpoint() {
        let a = VertCoord::new("isobaric", Some("hPa".into()), vec![1000.0, 850.0, 500.0]);
        let b = VertCoord::new("isobaric", Some("hPa".into()), vec![1000.0, 500.0, 250.0]);
        let u = union_vert_coord("isobaric", Some("hPa".into()), &[&a, &b]);
        assert_eq!(u.values1, vec![250.0, 500.0, 850.0, 1000.0]);
        assert!(u.values2.is_none());
    }

    #[test]
    fn test_union_vert_with_layers() {
        let a = VertCoord::new("layer", None, vec![0.0, 10.0]).with_bounds(vec![10.0, 20.0]);
        let b = VertCoord::new("layer", None, vec![20.0]).with_bounds(vec![30.0]);
        let u = union_vert_coord("layer", None, &[&a, &b]);
        assert_eq!(u.values1, vec![0.0, 10.0, 20.0]);
        assert_eq!(u.values2, Some(vec![10.0, 20.0, 30.0]));
    }

    #[test]
    fn test_union_vert_duplicate_overlap() {
        let a = VertCoord::new("isobaric", None, vec![500.0, 1000.0]);
        let b = VertCoord::new("isobaric", None, vec![1000.0 + 1e-9, 500.0]);
        let u = union_vert_coord("isobaric", None, &[&a, &b]);
        assert_eq!(u.values1.len(), 2);
        assert_eq!(u.values1, vec![500.0, 1000.0]);
    }
}
