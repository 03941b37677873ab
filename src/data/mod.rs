//! Data module for weather observations
//!
//! This module provides:
//! - The raw observation table and its CSV representation
//! - Nearest-grid-point extraction from decoded forecast grids
//! - Unit conversions and variable naming

mod grid;
mod observation;
pub mod units;

pub use grid::{observations_from_records, GridAxes, GridField, GridFile, GridRecord, PointExtractor};
pub use observation::{parse_timestamp, Column, ObservationTable, TIMESTAMP_COLUMN};
pub use units::GridVariable;
