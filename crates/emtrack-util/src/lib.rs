//! Shared utilities for emtrack
//!
//! This crate provides:
//! - ID types (ScheduleId, SessionId, BatchId, PlateId, PointId, IncubatorId)
//! - Time utilities (injectable clock, manual clock for tests)
//! - Plate identifier generation
//! - Error types

mod clock;
mod error;
mod ids;
mod plate;

pub use clock::*;
pub use error::*;
pub use ids::*;
pub use plate::*;
