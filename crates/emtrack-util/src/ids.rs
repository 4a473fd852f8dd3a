//! Strongly-typed identifiers for emtrack

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a monitoring schedule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ScheduleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ScheduleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a monitoring session.
///
/// Schedule-generated sessions use the stable `{scheduleId}-{epochMillis}`
/// form; manually created sessions carry an opaque externally supplied string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Opaque id for a manually created session
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random opaque id for a manually created session
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Stable id for a schedule-generated session
    pub fn scheduled(schedule_id: &ScheduleId, at: DateTime<Local>) -> Self {
        Self(format!("{}-{}", schedule_id, at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an incubation batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier printed on a physical plate (see `plate_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlateId(String);

impl PlateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PlateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier for a sampling point within a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointId(String);

impl PointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier for an incubator unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncubatorId(String);

impl IncubatorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncubatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IncubatorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IncubatorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn scheduled_session_id_format() {
        let schedule_id = ScheduleId::new("SCH-001");
        let at = Local.with_ymd_and_hms(2023, 11, 23, 9, 0, 0).unwrap();

        let id = SessionId::scheduled(&schedule_id, at);
        assert_eq!(
            id.as_str(),
            format!("SCH-001-{}", at.timestamp_millis())
        );
    }

    #[test]
    fn batch_id_uniqueness() {
        let b1 = BatchId::new();
        let b2 = BatchId::new();
        assert_ne!(b1, b2);
    }

    #[test]
    fn ids_serialize_deserialize() {
        let plate_id = PlateId::new("TSA-20231123-S01-123456");
        let json = serde_json::to_string(&plate_id).unwrap();
        let parsed: PlateId = serde_json::from_str(&json).unwrap();
        assert_eq!(plate_id, parsed);

        let batch_id = BatchId::new();
        let json = serde_json::to_string(&batch_id).unwrap();
        let parsed: BatchId = serde_json::from_str(&json).unwrap();
        assert_eq!(batch_id, parsed);
    }
}
