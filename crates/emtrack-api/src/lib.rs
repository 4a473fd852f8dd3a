//! Shared domain types for emtrack
//!
//! This crate defines the value types exchanged between the core state
//! machines, the store, and any surrounding service or UI:
//! - Schedule, session, and incubation batch models
//! - Operator command payloads (structured, reason fields required up front)
//!
//! The core never formats display strings; these types are plain data
//! suitable for read-only rendering after each transition.

mod commands;
mod incubation;
mod schedule;
mod session;

pub use commands::*;
pub use incubation::*;
pub use schedule::*;
pub use session::*;
