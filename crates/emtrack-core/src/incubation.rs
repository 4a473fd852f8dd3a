//! Incubation batch state machine
//!
//! Two sequential temperature-controlled stages. Stage 1 runs warm
//! (30-35 C for both media); stage 2 runs at room band, 20-25 C for TSA and
//! 20-30 C for SDA. Each stage must run at least 24 hours before it can be
//! completed, and every placement, reading and incubator move is appended
//! to the stage's audit trail.

use chrono::{DateTime, Duration, Local};
use emtrack_api::{
    BatchPlate, BatchStatus, IncubationBatch, IncubatorChange, MediaType, PlateHandOff,
    StageRecord, TemperatureReading,
};
use emtrack_util::{BatchId, EmtrackError, IncubatorId, Result};
use tracing::debug;

/// Minimum duration of each incubation stage
pub fn min_stage_duration() -> Duration {
    Duration::hours(24)
}

/// Acceptable temperature band for a stage, inclusive on both ends
pub fn stage_band(stage: u8, media_type: MediaType) -> (f64, f64) {
    match (stage, media_type) {
        (1, _) => (30.0, 35.0),
        (_, MediaType::Tsa) => (20.0, 25.0),
        (_, MediaType::Sda) => (20.0, 30.0),
    }
}

fn check_band(value: f64, stage: u8, media_type: MediaType) -> Result<()> {
    let (low, high) = stage_band(stage, media_type);
    // contains() also rejects NaN, which would pass naive comparisons
    if !(low..=high).contains(&value) {
        return Err(EmtrackError::TemperatureOutOfBand {
            value,
            stage,
            low,
            high,
        });
    }
    Ok(())
}

/// Build a batch from one or more session hand-offs.
///
/// Every contributing lot must match the batch's media type, checked by the
/// lot number prefix. Batches never mix media types because the two stages
/// run at media-specific temperatures.
pub fn create_batch(
    media_type: MediaType,
    hand_offs: &[PlateHandOff],
    now: DateTime<Local>,
) -> Result<IncubationBatch> {
    if hand_offs.is_empty() {
        return Err(EmtrackError::validation(
            "a batch needs at least one contributing session",
        ));
    }

    let mut plates = Vec::new();
    let mut sessions = Vec::new();
    for hand_off in hand_offs {
        if !hand_off.lot_number.starts_with(media_type.code()) {
            return Err(EmtrackError::invalid_lot(
                &hand_off.lot_number,
                format!("lot does not match batch media type {}", media_type.code()),
            ));
        }
        plates.extend(hand_off.plates.iter().map(|plate| BatchPlate {
            plate_id: plate.plate_id.clone(),
            role: plate.role,
            session_id: hand_off.session_id.clone(),
        }));
        sessions.push(hand_off.session_id.clone());
    }

    if plates.is_empty() {
        return Err(EmtrackError::validation(
            "contributing sessions yielded no plates",
        ));
    }

    let batch = IncubationBatch {
        id: BatchId::new(),
        media_type,
        plates,
        sessions,
        created_at: now,
        status: BatchStatus::InProgress,
        current_stage: 1,
        stage1: None,
        stage2: None,
    };

    debug!(
        batch_id = %batch.id,
        plate_count = batch.plates.len(),
        session_count = batch.sessions.len(),
        "Incubation batch created"
    );
    Ok(batch)
}

/// Place the batch in an incubator for stage 1 and start the stage clock
pub fn assign_incubator(
    batch: &mut IncubationBatch,
    incubator_id: &IncubatorId,
    target_temperature: f64,
    actual_temperature: f64,
    actor: &str,
    now: DateTime<Local>,
) -> Result<()> {
    if batch.current_stage != 1 || batch.stage1.is_some() {
        return Err(EmtrackError::illegal(
            "assign_incubator",
            batch_state(batch),
        ));
    }
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }
    check_band(target_temperature, 1, batch.media_type)?;
    check_band(actual_temperature, 1, batch.media_type)?;

    batch.stage1 = Some(StageRecord {
        incubator: incubator_id.clone(),
        target_temperature,
        placement_temperature: actual_temperature,
        placed_by: actor.to_string(),
        started_at: now,
        readings: Vec::new(),
        incubator_changes: Vec::new(),
        completed_at: None,
        completed_by: None,
    });

    debug!(batch_id = %batch.id, incubator = %incubator_id, "Stage 1 started");
    Ok(())
}

/// Append a temperature reading to the current stage's audit trail.
///
/// Readings are append-only and must carry non-decreasing timestamps; a
/// value outside the stage band is rejected without being recorded.
pub fn record_temperature(
    batch: &mut IncubationBatch,
    value: f64,
    comment: Option<&str>,
    actor: &str,
    now: DateTime<Local>,
) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }
    let stage = batch.current_stage;
    check_band(value, stage, batch.media_type)?;

    let state = batch_state(batch);
    let record = active_stage_mut(batch, "record_temperature", state)?;

    if let Some(last) = record.readings.last() {
        if now < last.time {
            return Err(EmtrackError::validation(
                "reading time precedes the latest recorded reading",
            ));
        }
    }

    record.readings.push(TemperatureReading {
        time: now,
        value,
        recorded_by: actor.to_string(),
        comment: comment.map(|c| c.to_string()),
    });

    debug!(batch_id = %batch.id, stage, value, "Temperature recorded");
    Ok(())
}

/// Move the batch to another incubator mid-stage.
///
/// The stage clock keeps running from the original placement; only the
/// holding incubator changes, and the move itself is audit-trailed.
pub fn change_incubator(
    batch: &mut IncubationBatch,
    incubator_id: &IncubatorId,
    reason: &str,
    actor: &str,
    now: DateTime<Local>,
) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(EmtrackError::validation("change reason must not be empty"));
    }
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }

    let state = batch_state(batch);
    let record = active_stage_mut(batch, "change_incubator", state)?;

    if &record.incubator == incubator_id {
        return Err(EmtrackError::validation(
            "batch is already in that incubator",
        ));
    }

    record.incubator_changes.push(IncubatorChange {
        time: now,
        from: record.incubator.clone(),
        to: incubator_id.clone(),
        reason: reason.to_string(),
        changed_by: actor.to_string(),
    });
    record.incubator = incubator_id.clone();

    debug!(batch_id = %batch.id, incubator = %incubator_id, "Incubator changed");
    Ok(())
}

/// Complete stage 1 once the 24-hour minimum has elapsed
pub fn end_stage1(batch: &mut IncubationBatch, actor: &str, now: DateTime<Local>) -> Result<()> {
    if batch.current_stage != 1 {
        return Err(EmtrackError::illegal("end_stage1", batch_state(batch)));
    }
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }

    let state = batch_state(batch);
    let record = active_stage_mut(batch, "end_stage1", state)?;

    let elapsed = now - record.started_at;
    if elapsed < min_stage_duration() {
        return Err(EmtrackError::StageDurationNotMet {
            stage: 1,
            elapsed_minutes: elapsed.num_minutes(),
        });
    }

    record.completed_at = Some(now);
    record.completed_by = Some(actor.to_string());
    batch.status = BatchStatus::Stage1Completed;

    debug!(batch_id = %batch.id, "Stage 1 completed");
    Ok(())
}

/// Place the batch for stage 2 and start its clock
pub fn start_stage2(
    batch: &mut IncubationBatch,
    incubator_id: &IncubatorId,
    target_temperature: f64,
    actual_temperature: f64,
    actor: &str,
    now: DateTime<Local>,
) -> Result<()> {
    if batch.status != BatchStatus::Stage1Completed || batch.stage2.is_some() {
        return Err(EmtrackError::illegal("start_stage2", batch_state(batch)));
    }
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }
    check_band(target_temperature, 2, batch.media_type)?;
    check_band(actual_temperature, 2, batch.media_type)?;

    batch.stage2 = Some(StageRecord {
        incubator: incubator_id.clone(),
        target_temperature,
        placement_temperature: actual_temperature,
        placed_by: actor.to_string(),
        started_at: now,
        readings: Vec::new(),
        incubator_changes: Vec::new(),
        completed_at: None,
        completed_by: None,
    });
    batch.current_stage = 2;
    batch.status = BatchStatus::InProgress;

    debug!(batch_id = %batch.id, incubator = %incubator_id, "Stage 2 started");
    Ok(())
}

/// Complete stage 2 once the 24-hour minimum has elapsed; terminal
pub fn end_stage2(batch: &mut IncubationBatch, actor: &str, now: DateTime<Local>) -> Result<()> {
    if batch.current_stage != 2 {
        return Err(EmtrackError::illegal("end_stage2", batch_state(batch)));
    }
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }

    let state = batch_state(batch);
    let record = active_stage_mut(batch, "end_stage2", state)?;

    let elapsed = now - record.started_at;
    if elapsed < min_stage_duration() {
        return Err(EmtrackError::StageDurationNotMet {
            stage: 2,
            elapsed_minutes: elapsed.num_minutes(),
        });
    }

    record.completed_at = Some(now);
    record.completed_by = Some(actor.to_string());
    batch.status = BatchStatus::Completed;

    debug!(batch_id = %batch.id, "Stage 2 completed, batch finished");
    Ok(())
}

fn batch_state(batch: &IncubationBatch) -> String {
    format!("stage {} ({:?})", batch.current_stage, batch.status)
}

/// Stage record currently accepting audit entries. Fails if the batch was
/// never placed or the stage has already been completed.
fn active_stage_mut<'a>(
    batch: &'a mut IncubationBatch,
    action: &'static str,
    state: String,
) -> Result<&'a mut StageRecord> {
    let record = match batch.current_stage {
        2 => batch.stage2.as_mut(),
        _ => batch.stage1.as_mut(),
    };
    match record {
        Some(record) if !record.is_completed() => Ok(record),
        _ => Err(EmtrackError::illegal(action, state)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use emtrack_api::HandOffPlate;
    use emtrack_util::{PlateId, PlateRole, SessionId};

    fn make_hand_off(lot: &str) -> PlateHandOff {
        PlateHandOff {
            session_id: SessionId::from("SCH-001-1700730000000"),
            lot_number: lot.to_string(),
            plates: vec![
                HandOffPlate {
                    plate_id: PlateId::new("TSA-20231123-S01-123456"),
                    role: PlateRole::Sample,
                },
                HandOffPlate {
                    plate_id: PlateId::new("TSA-20231123-NC01-123456"),
                    role: PlateRole::NegativeControl,
                },
            ],
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2023, 11, 23, 14, 0, 0).unwrap()
    }

    fn batch_in_stage1() -> IncubationBatch {
        let mut batch =
            create_batch(MediaType::Tsa, &[make_hand_off("TSA-2023-001")], now()).unwrap();
        assign_incubator(
            &mut batch,
            &IncubatorId::new("INC-001"),
            32.5,
            32.0,
            "A. Reyes",
            now(),
        )
        .unwrap();
        batch
    }

    fn batch_in_stage2() -> IncubationBatch {
        let mut batch = batch_in_stage1();
        let t1 = now() + Duration::hours(25);
        end_stage1(&mut batch, "A. Reyes", t1).unwrap();
        start_stage2(
            &mut batch,
            &IncubatorId::new("INC-007"),
            22.5,
            22.0,
            "A. Reyes",
            t1,
        )
        .unwrap();
        batch
    }

    #[test]
    fn create_rejects_media_type_mismatch() {
        let err = create_batch(MediaType::Sda, &[make_hand_off("TSA-2023-001")], now())
            .unwrap_err();
        assert!(matches!(err, EmtrackError::InvalidMediaLot { .. }));
    }

    #[test]
    fn create_aggregates_plates_and_sessions() {
        let batch =
            create_batch(MediaType::Tsa, &[make_hand_off("TSA-2023-001")], now()).unwrap();
        assert_eq!(batch.plates.len(), 2);
        assert_eq!(batch.sessions.len(), 1);
        assert_eq!(batch.current_stage, 1);
        assert_eq!(batch.status, BatchStatus::InProgress);
        assert!(batch.stage1.is_none());
    }

    #[test]
    fn stage1_placement_rejects_out_of_band() {
        let mut batch =
            create_batch(MediaType::Tsa, &[make_hand_off("TSA-2023-001")], now()).unwrap();
        let err = assign_incubator(
            &mut batch,
            &IncubatorId::new("INC-001"),
            32.5,
            36.0,
            "A. Reyes",
            now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EmtrackError::TemperatureOutOfBand {
                stage: 1,
                low,
                high,
                ..
            } if low == 30.0 && high == 35.0
        ));
        assert!(batch.stage1.is_none());
    }

    #[test]
    fn stage1_band_is_inclusive() {
        for value in [30.0, 35.0] {
            let mut batch =
                create_batch(MediaType::Tsa, &[make_hand_off("TSA-2023-001")], now()).unwrap();
            assign_incubator(
                &mut batch,
                &IncubatorId::new("INC-001"),
                value,
                value,
                "A. Reyes",
                now(),
            )
            .unwrap();
        }
    }

    #[test]
    fn stage2_band_depends_on_media_type() {
        assert_eq!(stage_band(2, MediaType::Tsa), (20.0, 25.0));
        assert_eq!(stage_band(2, MediaType::Sda), (20.0, 30.0));
        assert_eq!(stage_band(1, MediaType::Sda), (30.0, 35.0));

        // 27 C is fine for SDA stage 2, out of band for TSA
        assert!(check_band(27.0, 2, MediaType::Sda).is_ok());
        assert!(check_band(27.0, 2, MediaType::Tsa).is_err());
    }

    #[test]
    fn reading_out_of_band_is_rejected_and_not_recorded() {
        let mut batch = batch_in_stage1();
        let err =
            record_temperature(&mut batch, 29.0, None, "A. Reyes", now() + Duration::hours(1))
                .unwrap_err();
        assert!(matches!(err, EmtrackError::TemperatureOutOfBand { .. }));
        assert!(batch.stage1.as_ref().unwrap().readings.is_empty());
    }

    #[test]
    fn nan_temperature_is_out_of_band() {
        assert!(check_band(f64::NAN, 1, MediaType::Tsa).is_err());

        let mut batch = batch_in_stage1();
        let err = record_temperature(
            &mut batch,
            f64::NAN,
            None,
            "A. Reyes",
            now() + Duration::hours(1),
        )
        .unwrap_err();
        assert!(matches!(err, EmtrackError::TemperatureOutOfBand { .. }));
        assert!(batch.stage1.as_ref().unwrap().readings.is_empty());
    }

    #[test]
    fn readings_append_in_time_order() {
        let mut batch = batch_in_stage1();
        record_temperature(&mut batch, 32.2, None, "A. Reyes", now() + Duration::hours(2))
            .unwrap();
        record_temperature(
            &mut batch,
            32.8,
            Some("after door opening"),
            "A. Reyes",
            now() + Duration::hours(4),
        )
        .unwrap();

        let err =
            record_temperature(&mut batch, 32.0, None, "A. Reyes", now() + Duration::hours(3))
                .unwrap_err();
        assert!(matches!(err, EmtrackError::Validation(_)));

        let stage = batch.stage1.as_ref().unwrap();
        assert_eq!(stage.readings.len(), 2);
        assert_eq!(stage.current_temperature(), 32.8);
    }

    #[test]
    fn incubator_change_keeps_stage_clock() {
        let mut batch = batch_in_stage1();
        let started_at = batch.stage1.as_ref().unwrap().started_at;

        change_incubator(
            &mut batch,
            &IncubatorId::new("INC-002"),
            "compressor fault on INC-001",
            "A. Reyes",
            now() + Duration::hours(6),
        )
        .unwrap();

        let stage = batch.stage1.as_ref().unwrap();
        assert_eq!(stage.started_at, started_at);
        assert_eq!(stage.incubator.as_str(), "INC-002");
        assert_eq!(stage.incubator_changes.len(), 1);
        assert_eq!(stage.incubator_changes[0].from.as_str(), "INC-001");

        // Stage 1 still completes against the original placement time
        end_stage1(&mut batch, "A. Reyes", started_at + Duration::hours(24)).unwrap();
    }

    #[test]
    fn change_to_same_incubator_is_rejected() {
        let mut batch = batch_in_stage1();
        let err = change_incubator(
            &mut batch,
            &IncubatorId::new("INC-001"),
            "no-op move",
            "A. Reyes",
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, EmtrackError::Validation(_)));
    }

    #[test]
    fn stage1_cannot_end_before_24_hours() {
        let mut batch = batch_in_stage1();
        let err = end_stage1(&mut batch, "A. Reyes", now() + Duration::hours(23)).unwrap_err();
        assert!(matches!(
            err,
            EmtrackError::StageDurationNotMet { stage: 1, .. }
        ));
        assert!(batch.stage1.as_ref().unwrap().completed_at.is_none());

        // Exactly 24 hours qualifies
        end_stage1(&mut batch, "A. Reyes", now() + Duration::hours(24)).unwrap();
        assert_eq!(batch.status, BatchStatus::Stage1Completed);
    }

    #[test]
    fn stage2_requires_stage1_completion() {
        let mut batch = batch_in_stage1();
        let err = start_stage2(
            &mut batch,
            &IncubatorId::new("INC-007"),
            22.5,
            22.0,
            "A. Reyes",
            now() + Duration::hours(2),
        )
        .unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }

    #[test]
    fn stage2_gate_counts_from_its_own_start() {
        let mut batch = batch_in_stage2();
        let t2 = batch.stage2_start_time().unwrap();

        let err = end_stage2(&mut batch, "A. Reyes", t2 + Duration::hours(20)).unwrap_err();
        assert!(matches!(
            err,
            EmtrackError::StageDurationNotMet { stage: 2, .. }
        ));

        end_stage2(&mut batch, "A. Reyes", t2 + Duration::hours(24)).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert!(batch.stage2_completion_time().is_some());
    }

    #[test]
    fn completed_batch_accepts_no_further_commands() {
        let mut batch = batch_in_stage2();
        let t2 = batch.stage2_start_time().unwrap();
        end_stage2(&mut batch, "A. Reyes", t2 + Duration::hours(26)).unwrap();

        let err = record_temperature(
            &mut batch,
            22.0,
            None,
            "A. Reyes",
            t2 + Duration::hours(27),
        )
        .unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));

        let err = end_stage2(&mut batch, "A. Reyes", t2 + Duration::hours(27)).unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }

    #[test]
    fn stage_readings_are_kept_per_stage() {
        let mut batch = batch_in_stage2();
        let t2 = batch.stage2_start_time().unwrap();

        record_temperature(&mut batch, 22.4, None, "A. Reyes", t2 + Duration::hours(1))
            .unwrap();

        assert!(batch.stage1.as_ref().unwrap().readings.is_empty());
        assert_eq!(batch.stage2.as_ref().unwrap().readings.len(), 1);
    }
}
