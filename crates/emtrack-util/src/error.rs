//! Error types for emtrack
//!
//! Every failure is a typed result; none are fatal and each leaves the
//! entity in its prior valid state.

use thiserror::Error;

use crate::{BatchId, PlateId, ScheduleId, SessionId};

/// Core error type for emtrack operations
#[derive(Debug, Error)]
pub enum EmtrackError {
    /// Malformed or missing required command fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Chosen lot fails growth-promotion, sterility, or expiry checks
    #[error("Invalid media lot {lot}: {reason}")]
    InvalidMediaLot { lot: String, reason: String },

    /// Exposure start repeated on the same plate
    #[error("Exposure already started for plate {0}")]
    AlreadyStarted(PlateId),

    /// Regular exposure end attempted before the 4-hour minimum
    #[error("Exposure on plate {plate} has run {elapsed_minutes} minutes, 4-hour minimum not met")]
    PrematureEnd {
        plate: PlateId,
        elapsed_minutes: i64,
    },

    /// Incubation stage end attempted before the 24-hour minimum
    #[error("Stage {stage} has run {elapsed_minutes} minutes, 24-hour minimum not met")]
    StageDurationNotMet { stage: u8, elapsed_minutes: i64 },

    /// Command issued against a state that does not permit it
    #[error("Illegal transition: {action} not allowed in state {state}")]
    IllegalTransition {
        action: &'static str,
        state: String,
    },

    /// Incubator temperature outside the stage's valid band
    #[error("Temperature {value}°C outside stage {stage} band {low}-{high}°C")]
    TemperatureOutOfBand {
        value: f64,
        stage: u8,
        low: f64,
        high: f64,
    },

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(ScheduleId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Plate not found: {0}")]
    PlateNotFound(PlateId),

    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("Store error: {0}")]
    StoreError(String),
}

impl EmtrackError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_lot(lot: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMediaLot {
            lot: lot.into(),
            reason: reason.into(),
        }
    }

    pub fn illegal(action: &'static str, state: impl Into<String>) -> Self {
        Self::IllegalTransition {
            action,
            state: state.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EmtrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_entity() {
        let err = EmtrackError::PrematureEnd {
            plate: PlateId::new("TSA-20231123-S01-123456"),
            elapsed_minutes: 90,
        };
        let msg = err.to_string();
        assert!(msg.contains("TSA-20231123-S01-123456"));
        assert!(msg.contains("90"));
    }

    #[test]
    fn out_of_band_names_the_range() {
        let err = EmtrackError::TemperatureOutOfBand {
            value: 36.0,
            stage: 1,
            low: 30.0,
            high: 35.0,
        };
        assert!(err.to_string().contains("30-35"));
    }
}
