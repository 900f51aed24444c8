//! Shared leaf types for forecast model run collections.
//!
//! Everything here is format-agnostic: time arithmetic between run
//! (reference) times and forecast (valid) times, the floating-point
//! tolerance comparison used for coordinate deduplication, and the
//! geographic bounding box persisted with per-run inventories.

pub mod bbox;
pub mod time;
pub mod values;

pub use bbox::BoundingBox;
pub use time::{add_hours, format_iso8601, hour_of_day, offset_hours, parse_iso8601, TimeParseError};
pub use values::{all_close, close_enough, fmt_f64, fmt_f64_list};
