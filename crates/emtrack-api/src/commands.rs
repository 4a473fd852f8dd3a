//! Operator command payloads
//!
//! Commands arrive from the surrounding service as structured payloads:
//! actor identity and reason text are required fields validated before the
//! transition is attempted, never gathered interactively mid-transition.

use emtrack_util::{IncubatorId, PlateId};
use serde::{Deserialize, Serialize};

use crate::MediaLot;

/// Commands applied to one monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Verify the chosen media lot and generate plate identifiers
    VerifyMedia {
        lot: MediaLot,
        negative_controls: u32,
        actor: String,
    },

    /// Record negative-control storage metadata
    StoreNegativeControls {
        location: String,
        temperature: f64,
        actor: String,
    },

    /// Begin exposing the named plate
    StartExposure { plate_id: PlateId },

    /// End exposure after the 4-hour minimum
    EndExposure { plate_id: PlateId },

    /// End exposure before the 4-hour minimum, with justification
    EndExposureEarly { plate_id: PlateId, reason: String },

    /// Skip a plate that was never started
    SkipExposure { plate_id: PlateId, reason: String },

    /// Mark a plate damaged (before or during exposure)
    ReportDamage { plate_id: PlateId, reason: String },
}

/// Commands applied to one incubation batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchCommand {
    /// Place the batch in an incubator and start the stage clock
    AssignIncubator {
        incubator_id: IncubatorId,
        target_temperature: f64,
        actual_temperature: f64,
        actor: String,
    },

    /// Append a temperature reading to the current stage's audit trail
    RecordTemperature {
        value: f64,
        comment: Option<String>,
        actor: String,
    },

    /// Move the batch to another incubator without resetting the stage clock
    ChangeIncubator {
        incubator_id: IncubatorId,
        reason: String,
        actor: String,
    },

    /// Complete stage 1 after the 24-hour minimum
    EndStage1 { actor: String },

    /// Place the batch for stage 2 and start its clock
    StartStage2 {
        incubator_id: IncubatorId,
        target_temperature: f64,
        actual_temperature: f64,
        actor: String,
    },

    /// Complete stage 2 after the 24-hour minimum
    EndStage2 { actor: String },
}
