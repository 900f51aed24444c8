//! Forecast model run collection inventory.
//!
//! Indexes a set of model-output "runs" (one reference time each, with
//! forecast-time / vertical / ensemble axes) and reconciles them into a
//! single multi-run inventory without copying any grid payloads.
//!
//! # Architecture
//!
//! - [`coords`] canonicalizes time/vertical/ensemble coordinate definitions
//!   by tolerance-based data equality, one arena per collection.
//! - [`run`] ingests a single run through the narrow [`source::RunSource`]
//!   contract and tracks per-grid missing slices.
//! - [`xml`] persists a per-run inventory as an XML cache next to the
//!   source file, so repeated collection builds skip coordinate reads.
//! - [`collection`] groups runs into run sequences, aggregates each
//!   variable across runs ([`collection::UberGrid`]), and exposes the
//!   run-time / forecast-time / offset enumerations.
//! - [`definition`] is the externally authored expected inventory, with
//!   run-hour dependent time coordinates and time-dependent vertical
//!   coordinates.
//! - [`matrix`] compares observed against expected inventory (counts and
//!   discrepancy reports).
//! - [`views`] materializes the four virtual dataset projections
//!   (fixed-run, fixed-forecast, fixed-offset, best series) as
//!   index-remapping lazy views.

pub mod collection;
pub mod coords;
pub mod definition;
pub mod error;
pub mod matrix;
pub mod run;
pub mod source;
pub mod views;
pub mod xml;

pub use collection::{CollectionBuilder, CollectionRun, FmrcCollection, RunSeq, RunSlot, UberGrid};
pub use coords::{CoordRegistry, EnsCoord, EnsId, TimeCoord, TimeId, VertCoord, VertId};
pub use definition::{CollectionDefinition, DefRunSeq, DefVariable, RunSeqDef, VertTimeCoord};
pub use error::{InventoryError, Result};
pub use matrix::{variable_matrix_xml, Discrepancy, DiscrepancyReport, TimeMatrix};
pub use run::{GridInventory, Missing, RunInventory};
pub use source::{EnsembleInfo, RunSource, VerticalAxis};
pub use views::{GridReader, ViewDataset, ViewEntry, ViewKind, ViewSection};
pub use xml::OpenMode;
