//! Monitoring session model
//!
//! A session is one instance of monitoring at one scheduled time. It
//! exclusively owns its plate exposures and negative-control storage
//! record; an incubation batch is only ever referenced back by id.

use chrono::{DateTime, Local, NaiveDate};
use emtrack_util::{BatchId, PlateId, PlateRole, PointId, ScheduleId, SessionId};
use serde::{Deserialize, Serialize};

use crate::ActivityStatus;

/// Culture media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "TSA")]
    Tsa,
    #[serde(rename = "SDA")]
    Sda,
}

impl MediaType {
    /// Lot-number prefix for this media type
    pub fn code(&self) -> &'static str {
        match self {
            MediaType::Tsa => "TSA",
            MediaType::Sda => "SDA",
        }
    }
}

/// A media lot as registered in the lot inventory, with its QC results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaLot {
    pub lot_number: String,
    pub media_type: MediaType,
    pub expiry_date: NaiveDate,
    pub gpt_passed: bool,
    pub gpt_date: NaiveDate,
    pub sterility_passed: bool,
    pub sterility_date: NaiveDate,
}

/// A generated sample plate bound to its sampling point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateAssignment {
    pub plate_id: PlateId,
    pub point_id: PointId,
}

/// Recorded when media verification succeeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDetails {
    pub actual_start_time: DateTime<Local>,
    pub lot: MediaLot,
    pub verified_by: String,
    pub sample_plates: Vec<PlateAssignment>,
    pub negative_control_plates: Vec<PlateId>,
}

/// Storage metadata for the session's negative-control plates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeControlStorage {
    pub storage_time: DateTime<Local>,
    pub location: String,
    pub stored_by: String,
    pub temperature: f64,
}

/// Closed outcome type for one plate exposure.
///
/// A plate reaches exactly one terminal outcome; invalid flag combinations
/// (skipped and damaged, ended without started) are unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExposureOutcome {
    Pending,
    Started {
        started_at: DateTime<Local>,
    },
    EndedNormal {
        started_at: DateTime<Local>,
        ended_at: DateTime<Local>,
    },
    EndedEarly {
        started_at: DateTime<Local>,
        ended_at: DateTime<Local>,
        reason: String,
    },
    Skipped {
        reason: String,
    },
    Damaged {
        reason: String,
    },
}

impl ExposureOutcome {
    /// True once the plate can take no further exposure action
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExposureOutcome::Pending | ExposureOutcome::Started { .. })
    }

    /// True when the plate was exposed and survives to incubation
    pub fn yields_plate(&self) -> bool {
        matches!(
            self,
            ExposureOutcome::EndedNormal { .. } | ExposureOutcome::EndedEarly { .. }
        )
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        match self {
            ExposureOutcome::Started { started_at }
            | ExposureOutcome::EndedNormal { started_at, .. }
            | ExposureOutcome::EndedEarly { started_at, .. } => Some(*started_at),
            _ => None,
        }
    }

    pub fn ended_at(&self) -> Option<DateTime<Local>> {
        match self {
            ExposureOutcome::EndedNormal { ended_at, .. }
            | ExposureOutcome::EndedEarly { ended_at, .. } => Some(*ended_at),
            _ => None,
        }
    }
}

/// One sample plate's exposure record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateExposure {
    pub point_id: PointId,
    pub plate_id: PlateId,
    pub outcome: ExposureOutcome,
}

/// Coarse session status for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
}

/// Fine-grained lifecycle phase governing which commands are permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Pending,
    MediaVerified,
    ControlsStored,
    ExposureInProgress,
    ReadyForIncubation,
    IncubationAssigned,
}

/// One instance of monitoring at one scheduled time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub id: SessionId,

    /// Parent schedule, absent for manually created sessions
    pub schedule_id: Option<ScheduleId>,

    pub scheduled_time: DateTime<Local>,

    pub sampling_points: Vec<PointId>,

    pub status: SessionStatus,

    pub phase: SessionPhase,

    /// Snapshot of the schedule's activity status at generation time
    pub activity_status: ActivityStatus,

    pub start_details: Option<StartDetails>,

    pub negative_control_storage: Option<NegativeControlStorage>,

    /// One record per sample plate, initialized at media verification
    pub exposures: Vec<PlateExposure>,

    /// Back-reference only; the batch owns its own state
    pub incubation_batch_id: Option<BatchId>,
}

impl MonitoringSession {
    /// Fresh skeleton as emitted by the schedule expander
    pub fn skeleton(
        id: SessionId,
        schedule_id: Option<ScheduleId>,
        scheduled_time: DateTime<Local>,
        sampling_points: Vec<PointId>,
        activity_status: ActivityStatus,
    ) -> Self {
        Self {
            id,
            schedule_id,
            scheduled_time,
            sampling_points,
            status: SessionStatus::Pending,
            phase: SessionPhase::Pending,
            activity_status,
            start_details: None,
            negative_control_storage: None,
            exposures: Vec::new(),
            incubation_batch_id: None,
        }
    }
}

/// Plate set emitted by a session on hand-off to incubation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateHandOff {
    pub session_id: SessionId,
    pub lot_number: String,
    pub plates: Vec<HandOffPlate>,
}

/// One plate within a hand-off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandOffPlate {
    pub plate_id: PlateId,
    pub role: PlateRole,
}
