//! Incubation batch model
//!
//! A batch aggregates plates handed off by one or more sessions and walks
//! them through two sequential temperature-controlled stages. Per-stage
//! temperature readings and incubator changes are append-only audit trails,
//! frozen into the stage record when the stage completes.

use chrono::{DateTime, Local};
use emtrack_util::{BatchId, IncubatorId, PlateId, PlateRole, SessionId};
use serde::{Deserialize, Serialize};

use crate::MediaType;

/// A plate within a batch, tagged with its role and owning session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlate {
    pub plate_id: PlateId,
    pub role: PlateRole,
    pub session_id: SessionId,
}

/// One entry in a stage's temperature audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub time: DateTime<Local>,
    pub value: f64,
    pub recorded_by: String,
    pub comment: Option<String>,
}

/// One incubator reassignment during a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncubatorChange {
    pub time: DateTime<Local>,
    pub from: IncubatorId,
    pub to: IncubatorId,
    pub reason: String,
    pub changed_by: String,
}

/// State of one incubation stage, created at incubator placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub incubator: IncubatorId,
    pub target_temperature: f64,
    pub placement_temperature: f64,
    pub placed_by: String,
    pub started_at: DateTime<Local>,
    pub readings: Vec<TemperatureReading>,
    pub incubator_changes: Vec<IncubatorChange>,
    pub completed_at: Option<DateTime<Local>>,
    pub completed_by: Option<String>,
}

impl StageRecord {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Latest recorded temperature, falling back to the placement reading
    pub fn current_temperature(&self) -> f64 {
        self.readings
            .last()
            .map(|r| r.value)
            .unwrap_or(self.placement_temperature)
    }
}

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Stage1Completed,
    Completed,
}

/// A two-stage incubation batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncubationBatch {
    pub id: BatchId,

    pub media_type: MediaType,

    /// Aggregated plate set from all contributing sessions
    pub plates: Vec<BatchPlate>,

    /// Sessions that contributed plates
    pub sessions: Vec<SessionId>,

    pub created_at: DateTime<Local>,

    pub status: BatchStatus,

    /// Current stage, 1 or 2; never advances past 2
    pub current_stage: u8,

    /// Present once an incubator has been assigned for stage 1
    pub stage1: Option<StageRecord>,

    /// Present iff the batch has advanced to stage 2
    pub stage2: Option<StageRecord>,
}

impl IncubationBatch {
    /// Incubator currently holding the batch, if placed
    pub fn current_incubator(&self) -> Option<&IncubatorId> {
        self.current_stage_record().map(|s| &s.incubator)
    }

    /// Stage record for the stage currently in progress
    pub fn current_stage_record(&self) -> Option<&StageRecord> {
        match self.current_stage {
            2 => self.stage2.as_ref(),
            _ => self.stage1.as_ref(),
        }
    }

    pub fn stage2_start_time(&self) -> Option<DateTime<Local>> {
        self.stage2.as_ref().map(|s| s.started_at)
    }

    pub fn stage1_completion_time(&self) -> Option<DateTime<Local>> {
        self.stage1.as_ref().and_then(|s| s.completed_at)
    }

    pub fn stage2_completion_time(&self) -> Option<DateTime<Local>> {
        self.stage2.as_ref().and_then(|s| s.completed_at)
    }
}
