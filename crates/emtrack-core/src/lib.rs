//! Core state machines for emtrack
//!
//! This crate is the heart of the monitoring core, containing:
//! - Schedule expansion (recurrence rule -> future session skeletons)
//! - Session lifecycle (media verification -> exposure -> incubation hand-off)
//! - Incubation lifecycle (two temperature-controlled stages with 24h gates)
//! - The entity registry that dispatches operator commands and appends
//!   audit events
//!
//! All transitions are synchronous single-writer value transformations;
//! time-gated checks read from one injected clock.

pub mod expander;
pub mod incubation;
mod registry;
pub mod session;

pub use registry::*;
