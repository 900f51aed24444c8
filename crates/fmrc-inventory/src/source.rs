//! The ingest contract between a decoded model-output file and the
//! inventory builder.
//!
//! A [`RunSource`] exposes exactly what the inventory needs from one run:
//! identity, reference time, per-variable axes, and a presence test for
//! individual (time, ensemble, level) slices. Format decoding stays on the
//! other side of this trait.

use chrono::{DateTime, Utc};
use fmrc_common::BoundingBox;

use crate::error::Result;

/// A vertical axis as read from the source, before canonicalization.
#[derive(Debug, Clone)]
pub struct VerticalAxis {
    pub name: String,
    pub units: Option<String>,
    pub values: Vec<f64>,
    /// Upper-bound values for layer axes, same length as `values`.
    pub bounds: Option<Vec<f64>>,
}

/// An ensemble axis as read from the source, before canonicalization.
#[derive(Debug, Clone)]
pub struct EnsembleInfo {
    pub name: String,
    pub product_definition: i32,
    pub member_types: Vec<i32>,
}

/// One decoded model run, viewed only through what the inventory records.
///
/// All variable-keyed methods take names returned by [`variable_names`];
/// behavior for unknown names is an `AxisRead` error.
///
/// [`variable_names`]: RunSource::variable_names
pub trait RunSource {
    /// Collection-relative identity of this run, usually the file name.
    fn name(&self) -> &str;

    /// The run (reference) time.
    fn reference_time(&self) -> DateTime<Utc>;

    /// Gridded variables present in this run.
    fn variable_names(&self) -> Vec<String>;

    /// Forecast lead times for one variable, hours since the reference
    /// time, in source order.
    fn forecast_offsets(&self, variable: &str) -> Result<Vec<f64>>;

    /// Vertical axis for one variable, or `None` for 2D variables.
    fn vertical_axis(&self, variable: &str) -> Result<Option<VerticalAxis>>;

    /// Ensemble axis for one variable, or `None` when the run is
    /// deterministic.
    fn ensemble_axis(&self, variable: &str) -> Result<Option<EnsembleInfo>>;

    /// Whether the slice at (time, ensemble, level) indices holds no data.
    ///
    /// Indices address the axes returned above; 2D and deterministic
    /// variables are probed with index 0 on the absent axes.
    fn is_missing(&self, variable: &str, time_index: usize, ens_index: usize, vert_index: usize)
        -> bool;

    /// Horizontal extent of the run's grid, if the source knows it.
    fn bounding_box(&self) -> Option<BoundingBox> {
        None
    }
}
