//! Monitoring schedule model

use chrono::{DateTime, Local};
use emtrack_util::{EmtrackError, PointId, Result, ScheduleId};
use serde::{Deserialize, Serialize};

/// How often a schedule spawns a monitoring cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// Unit for the schedule tolerance window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceUnit {
    Minutes,
    Hours,
    Days,
}

/// Acceptable lateness before a session counts as missed.
/// Consumed by external compliance reporting, not evaluated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tolerance {
    pub value: u32,
    pub unit: ToleranceUnit,
}

/// Time-of-day slot within a monitoring cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub hour: u8,
    pub minute: u8,
    pub label: Option<String>,
}

impl TimeSlot {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self {
            hour,
            minute,
            label: None,
        }
    }
}

/// Sampling method tag. Only settle plates are modeled; the tag is carried
/// for reporting compatibility, never branched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringType {
    #[default]
    #[serde(rename = "settle-plate")]
    SettlePlate,
}

/// Activity state of the monitored area at scheduling time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityStatus {
    ProductionOngoing { batch_reference: String },
    Idle,
}

/// Schedule lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Completed,
}

/// Recurrence rule for generating monitoring sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSchedule {
    pub id: ScheduleId,

    /// Sampling points covered by each generated session
    pub sampling_points: Vec<PointId>,

    pub monitoring_type: MonitoringType,

    pub frequency: Frequency,

    pub tolerance: Tolerance,

    pub start_date: DateTime<Local>,

    /// Expansion horizon defaults to start date + 1 year when absent
    pub end_date: Option<DateTime<Local>>,

    /// Each distinct slot instant yields one session per cycle; duplicate
    /// instants collapse during expansion
    pub time_slots: Vec<TimeSlot>,

    pub assigned_personnel: Vec<String>,

    pub activity_status: ActivityStatus,

    pub status: ScheduleStatus,
}

impl MonitoringSchedule {
    /// Reject malformed schedule definitions before expansion
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().is_empty() {
            return Err(EmtrackError::validation("schedule id must not be empty"));
        }
        for slot in &self.time_slots {
            if slot.hour > 23 {
                return Err(EmtrackError::validation(format!(
                    "time slot hour {} out of range 0-23",
                    slot.hour
                )));
            }
            if slot.minute > 59 {
                return Err(EmtrackError::validation(format!(
                    "time slot minute {} out of range 0-59",
                    slot.minute
                )));
            }
        }
        Ok(())
    }
}
