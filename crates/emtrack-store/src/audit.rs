//! Audit event types

use chrono::{DateTime, Local};
use emtrack_util::{BatchId, IncubatorId, PlateId, ScheduleId, SessionId};
use serde::{Deserialize, Serialize};

/// Types of audit events, one per successful core transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Schedule expanded into session skeletons
    ScheduleExpanded {
        schedule_id: ScheduleId,
        session_count: usize,
    },

    /// Media lot verified and plate identifiers generated
    MediaVerified {
        session_id: SessionId,
        lot_number: String,
        sample_plates: usize,
        negative_controls: usize,
        actor: String,
    },

    /// Negative controls placed in storage
    ControlsStored {
        session_id: SessionId,
        location: String,
        actor: String,
    },

    /// Plate exposure started
    ExposureStarted {
        session_id: SessionId,
        plate_id: PlateId,
    },

    /// Plate exposure ended (normally or early)
    ExposureEnded {
        session_id: SessionId,
        plate_id: PlateId,
        early: bool,
    },

    /// Plate skipped before exposure
    ExposureSkipped {
        session_id: SessionId,
        plate_id: PlateId,
        reason: String,
    },

    /// Plate reported damaged
    PlateDamaged {
        session_id: SessionId,
        plate_id: PlateId,
        reason: String,
    },

    /// Every exposure reached a terminal outcome
    SessionReady { session_id: SessionId },

    /// Incubation batch created from handed-off sessions
    BatchCreated {
        batch_id: BatchId,
        media_type: String,
        plate_count: usize,
        session_count: usize,
    },

    /// Batch placed in an incubator, stage clock started
    IncubatorAssigned {
        batch_id: BatchId,
        incubator_id: IncubatorId,
        stage: u8,
        temperature: f64,
        actor: String,
    },

    /// Temperature reading appended
    TemperatureRecorded {
        batch_id: BatchId,
        stage: u8,
        value: f64,
        actor: String,
    },

    /// Batch moved between incubators mid-stage
    IncubatorChanged {
        batch_id: BatchId,
        from: IncubatorId,
        to: IncubatorId,
        reason: String,
        actor: String,
    },

    /// Incubation stage completed
    StageCompleted {
        batch_id: BatchId,
        stage: u8,
        actor: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    /// Event stamped with an explicit instant (the core's clock)
    pub fn at(timestamp: DateTime<Local>, event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }

    pub fn new(event: AuditEventType) -> Self {
        Self::at(Local::now(), event)
    }
}
