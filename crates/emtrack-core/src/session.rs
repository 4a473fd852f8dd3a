//! Session lifecycle state machine
//!
//! Phases: Pending -> MediaVerified -> ControlsStored -> ExposureInProgress
//! -> ReadyForIncubation -> IncubationAssigned. Each transition validates
//! first and mutates only on success, so a failed command leaves the
//! session exactly as it was. All effects are confined to the session's own
//! state; the incubation batch is only ever referenced back by id.

use chrono::{DateTime, Duration, Local};
use emtrack_api::{
    ExposureOutcome, HandOffPlate, MediaLot, MonitoringSession, NegativeControlStorage,
    PlateAssignment, PlateExposure, PlateHandOff, SessionPhase, SessionStatus, StartDetails,
};
use emtrack_util::{EmtrackError, PlateId, PlateRole, Result, disambiguator_from_millis, plate_id};
use tracing::debug;

/// Minimum exposure duration before a regular end is allowed
pub fn min_exposure_duration() -> Duration {
    Duration::hours(4)
}

/// Verify the chosen media lot and generate plate identifiers.
///
/// Requires the lot to have passed growth-promotion and sterility tests and
/// not be expired as of `now`, plus an explicit negative-control count of at
/// least one. Generates one sample plate per sampling point and the
/// requested negative controls, both sequences starting at 1.
pub fn verify_media(
    session: &mut MonitoringSession,
    lot: &MediaLot,
    negative_controls: u32,
    actor: &str,
    now: DateTime<Local>,
) -> Result<()> {
    if session.phase != SessionPhase::Pending {
        return Err(EmtrackError::illegal(
            "verify_media",
            format!("{:?}", session.phase),
        ));
    }
    if actor.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }
    if negative_controls == 0 {
        return Err(EmtrackError::validation(
            "at least one negative control plate is required",
        ));
    }
    if !lot.gpt_passed {
        return Err(EmtrackError::invalid_lot(
            &lot.lot_number,
            "growth promotion test not passed",
        ));
    }
    if !lot.sterility_passed {
        return Err(EmtrackError::invalid_lot(
            &lot.lot_number,
            "sterility test not passed",
        ));
    }
    if lot.expiry_date <= now.date_naive() {
        return Err(EmtrackError::invalid_lot(
            &lot.lot_number,
            format!("lot expired on {}", lot.expiry_date),
        ));
    }

    let date = now.date_naive();
    let disambiguator = disambiguator_from_millis(now.timestamp_millis());

    let sample_plates: Vec<PlateAssignment> = session
        .sampling_points
        .iter()
        .enumerate()
        .map(|(index, point_id)| PlateAssignment {
            plate_id: plate_id(
                &lot.lot_number,
                date,
                PlateRole::Sample,
                index as u32 + 1,
                &disambiguator,
            ),
            point_id: point_id.clone(),
        })
        .collect();

    let negative_control_plates: Vec<PlateId> = (1..=negative_controls)
        .map(|sequence| {
            plate_id(
                &lot.lot_number,
                date,
                PlateRole::NegativeControl,
                sequence,
                &disambiguator,
            )
        })
        .collect();

    session.exposures = sample_plates
        .iter()
        .map(|plate| PlateExposure {
            point_id: plate.point_id.clone(),
            plate_id: plate.plate_id.clone(),
            outcome: ExposureOutcome::Pending,
        })
        .collect();

    session.start_details = Some(StartDetails {
        actual_start_time: now,
        lot: lot.clone(),
        verified_by: actor.to_string(),
        sample_plates,
        negative_control_plates,
    });
    session.phase = SessionPhase::MediaVerified;

    debug!(session_id = %session.id, lot = %lot.lot_number, "Media verified");
    Ok(())
}

/// Record negative-control storage metadata
pub fn store_negative_controls(
    session: &mut MonitoringSession,
    location: &str,
    temperature: f64,
    stored_by: &str,
    now: DateTime<Local>,
) -> Result<()> {
    if session.phase != SessionPhase::MediaVerified {
        return Err(EmtrackError::illegal(
            "store_negative_controls",
            format!("{:?}", session.phase),
        ));
    }
    if location.trim().is_empty() {
        return Err(EmtrackError::validation("storage location must not be empty"));
    }
    if stored_by.trim().is_empty() {
        return Err(EmtrackError::validation("actor must not be empty"));
    }

    session.negative_control_storage = Some(NegativeControlStorage {
        storage_time: now,
        location: location.to_string(),
        stored_by: stored_by.to_string(),
        temperature,
    });
    session.phase = SessionPhase::ControlsStored;

    debug!(session_id = %session.id, location, "Negative controls stored");
    Ok(())
}

/// Begin exposing the named plate. Rejected if the plate was already started.
pub fn start_exposure(
    session: &mut MonitoringSession,
    plate_id: &PlateId,
    now: DateTime<Local>,
) -> Result<()> {
    require_exposure_phase(session, "start_exposure")?;

    let exposure = find_exposure(session, plate_id)?;
    match &exposure.outcome {
        ExposureOutcome::Pending => {
            exposure.outcome = ExposureOutcome::Started { started_at: now };
        }
        ExposureOutcome::Started { .. } => {
            return Err(EmtrackError::AlreadyStarted(plate_id.clone()));
        }
        other => {
            return Err(EmtrackError::illegal("start_exposure", outcome_name(other)));
        }
    }

    session.status = SessionStatus::InProgress;
    session.phase = SessionPhase::ExposureInProgress;

    debug!(session_id = %session.id, plate_id = %plate_id, "Exposure started");
    Ok(())
}

/// End exposure normally. Only allowed once the 4-hour minimum has elapsed;
/// before that the transition fails with `PrematureEnd` and no end time is
/// recorded.
pub fn end_exposure(
    session: &mut MonitoringSession,
    plate_id: &PlateId,
    now: DateTime<Local>,
) -> Result<()> {
    require_exposure_phase(session, "end_exposure")?;

    let exposure = find_exposure(session, plate_id)?;
    let started_at = match &exposure.outcome {
        ExposureOutcome::Started { started_at } => *started_at,
        other => {
            return Err(EmtrackError::illegal("end_exposure", outcome_name(other)));
        }
    };

    let elapsed = now - started_at;
    if elapsed < min_exposure_duration() {
        return Err(EmtrackError::PrematureEnd {
            plate: plate_id.clone(),
            elapsed_minutes: elapsed.num_minutes(),
        });
    }

    let exposure = find_exposure(session, plate_id)?;
    exposure.outcome = ExposureOutcome::EndedNormal {
        started_at,
        ended_at: now,
    };

    debug!(session_id = %session.id, plate_id = %plate_id, "Exposure ended");
    mark_ready_if_complete(session);
    Ok(())
}

/// End exposure before the 4-hour minimum, with justification. Once the
/// minimum has elapsed the regular end applies instead, keeping early-end
/// records strictly shorter than four hours.
pub fn end_exposure_early(
    session: &mut MonitoringSession,
    plate_id: &PlateId,
    reason: &str,
    now: DateTime<Local>,
) -> Result<()> {
    require_exposure_phase(session, "end_exposure_early")?;

    if reason.trim().is_empty() {
        return Err(EmtrackError::validation("early end reason must not be empty"));
    }

    let exposure = find_exposure(session, plate_id)?;
    let started_at = match &exposure.outcome {
        ExposureOutcome::Started { started_at } => *started_at,
        other => {
            return Err(EmtrackError::illegal(
                "end_exposure_early",
                outcome_name(other),
            ));
        }
    };

    if now - started_at >= min_exposure_duration() {
        return Err(EmtrackError::validation(
            "exposure has reached the 4-hour minimum, use the regular end",
        ));
    }

    let exposure = find_exposure(session, plate_id)?;
    exposure.outcome = ExposureOutcome::EndedEarly {
        started_at,
        ended_at: now,
        reason: reason.to_string(),
    };

    debug!(session_id = %session.id, plate_id = %plate_id, reason, "Exposure ended early");
    mark_ready_if_complete(session);
    Ok(())
}

/// Skip a plate that was never started
pub fn skip_exposure(
    session: &mut MonitoringSession,
    plate_id: &PlateId,
    reason: &str,
) -> Result<()> {
    require_exposure_phase(session, "skip_exposure")?;

    if reason.trim().is_empty() {
        return Err(EmtrackError::validation("skip reason must not be empty"));
    }

    let exposure = find_exposure(session, plate_id)?;
    match &exposure.outcome {
        ExposureOutcome::Pending => {
            exposure.outcome = ExposureOutcome::Skipped {
                reason: reason.to_string(),
            };
        }
        other => {
            return Err(EmtrackError::illegal("skip_exposure", outcome_name(other)));
        }
    }

    debug!(session_id = %session.id, plate_id = %plate_id, reason, "Exposure skipped");
    mark_ready_if_complete(session);
    Ok(())
}

/// Mark a plate damaged. Allowed before or during exposure; terminal either
/// way.
pub fn report_damage(
    session: &mut MonitoringSession,
    plate_id: &PlateId,
    reason: &str,
) -> Result<()> {
    require_exposure_phase(session, "report_damage")?;

    if reason.trim().is_empty() {
        return Err(EmtrackError::validation("damage reason must not be empty"));
    }

    let exposure = find_exposure(session, plate_id)?;
    match &exposure.outcome {
        ExposureOutcome::Pending | ExposureOutcome::Started { .. } => {
            exposure.outcome = ExposureOutcome::Damaged {
                reason: reason.to_string(),
            };
        }
        other => {
            return Err(EmtrackError::illegal("report_damage", outcome_name(other)));
        }
    }

    debug!(session_id = %session.id, plate_id = %plate_id, reason, "Plate damaged");
    mark_ready_if_complete(session);
    Ok(())
}

/// Plate set the session would hand off to incubation: every exposure that
/// ended (normally or early) plus all negative controls. Leaves the
/// session's state untouched so callers can combine several sessions and
/// only commit once every check has passed.
pub fn hand_off_plates(session: &MonitoringSession) -> Result<PlateHandOff> {
    if session.phase != SessionPhase::ReadyForIncubation {
        return Err(EmtrackError::illegal(
            "hand_off_to_incubation",
            format!("{:?}", session.phase),
        ));
    }

    // ReadyForIncubation is only reachable after media verification
    let details = session
        .start_details
        .as_ref()
        .ok_or_else(|| EmtrackError::illegal("hand_off_to_incubation", "no start details"))?;

    let mut plates: Vec<HandOffPlate> = session
        .exposures
        .iter()
        .filter(|exposure| exposure.outcome.yields_plate())
        .map(|exposure| HandOffPlate {
            plate_id: exposure.plate_id.clone(),
            role: PlateRole::Sample,
        })
        .collect();

    plates.extend(details.negative_control_plates.iter().map(|plate_id| {
        HandOffPlate {
            plate_id: plate_id.clone(),
            role: PlateRole::NegativeControl,
        }
    }));

    Ok(PlateHandOff {
        session_id: session.id.clone(),
        lot_number: details.lot.lot_number.clone(),
        plates,
    })
}

/// Mark the session handed off once its plate set has been taken
pub(crate) fn commit_hand_off(session: &mut MonitoringSession) {
    session.phase = SessionPhase::IncubationAssigned;
    session.status = SessionStatus::Completed;
    debug!(session_id = %session.id, "Session handed off to incubation");
}

/// Collect the plates that survive to incubation and move the session to
/// IncubationAssigned
pub fn hand_off_to_incubation(session: &mut MonitoringSession) -> Result<PlateHandOff> {
    let hand_off = hand_off_plates(session)?;
    commit_hand_off(session);
    Ok(hand_off)
}

/// True once every exposure holds a terminal outcome
pub fn is_exposure_complete(session: &MonitoringSession) -> bool {
    !session.exposures.is_empty()
        && session
            .exposures
            .iter()
            .all(|exposure| exposure.outcome.is_terminal())
}

fn mark_ready_if_complete(session: &mut MonitoringSession) {
    if is_exposure_complete(session) {
        session.phase = SessionPhase::ReadyForIncubation;
    }
}

fn require_exposure_phase(session: &MonitoringSession, action: &'static str) -> Result<()> {
    match session.phase {
        SessionPhase::ControlsStored | SessionPhase::ExposureInProgress => Ok(()),
        phase => Err(EmtrackError::illegal(action, format!("{:?}", phase))),
    }
}

fn find_exposure<'a>(
    session: &'a mut MonitoringSession,
    plate_id: &PlateId,
) -> Result<&'a mut PlateExposure> {
    session
        .exposures
        .iter_mut()
        .find(|exposure| &exposure.plate_id == plate_id)
        .ok_or_else(|| EmtrackError::PlateNotFound(plate_id.clone()))
}

fn outcome_name(outcome: &ExposureOutcome) -> &'static str {
    match outcome {
        ExposureOutcome::Pending => "Pending",
        ExposureOutcome::Started { .. } => "Started",
        ExposureOutcome::EndedNormal { .. } => "EndedNormal",
        ExposureOutcome::EndedEarly { .. } => "EndedEarly",
        ExposureOutcome::Skipped { .. } => "Skipped",
        ExposureOutcome::Damaged { .. } => "Damaged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use emtrack_api::{ActivityStatus, MediaType};
    use emtrack_util::{PointId, ScheduleId, SessionId};

    fn make_lot() -> MediaLot {
        MediaLot {
            lot_number: "TSA-2023-001".into(),
            media_type: MediaType::Tsa,
            expiry_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            gpt_passed: true,
            gpt_date: NaiveDate::from_ymd_opt(2023, 10, 15).unwrap(),
            sterility_passed: true,
            sterility_date: NaiveDate::from_ymd_opt(2023, 10, 16).unwrap(),
        }
    }

    fn make_session() -> MonitoringSession {
        MonitoringSession::skeleton(
            SessionId::from("SCH-001-1700730000000"),
            Some(ScheduleId::new("SCH-001")),
            Local.with_ymd_and_hms(2023, 11, 23, 9, 0, 0).unwrap(),
            vec![PointId::new("POINT-001"), PointId::new("POINT-002")],
            ActivityStatus::Idle,
        )
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2023, 11, 23, 9, 0, 0).unwrap()
    }

    /// Session advanced to ControlsStored with two sample plates and one
    /// negative control
    fn session_at_exposure() -> (MonitoringSession, Vec<PlateId>) {
        let mut session = make_session();
        verify_media(&mut session, &make_lot(), 1, "J. Okafor", now()).unwrap();
        store_negative_controls(&mut session, "sterile-cabinet-1", 21.0, "J. Okafor", now())
            .unwrap();

        let plates: Vec<PlateId> = session
            .exposures
            .iter()
            .map(|e| e.plate_id.clone())
            .collect();
        (session, plates)
    }

    #[test]
    fn verify_media_generates_plates() {
        let mut session = make_session();
        verify_media(&mut session, &make_lot(), 2, "J. Okafor", now()).unwrap();

        assert_eq!(session.phase, SessionPhase::MediaVerified);
        let details = session.start_details.as_ref().unwrap();
        assert_eq!(details.sample_plates.len(), 2);
        assert_eq!(details.negative_control_plates.len(), 2);
        assert_eq!(session.exposures.len(), details.sample_plates.len());

        // Sample and negative-control sequences both start at 1
        assert!(details.sample_plates[0].plate_id.as_str().contains("-S01-"));
        assert!(details.sample_plates[1].plate_id.as_str().contains("-S02-"));
        assert!(
            details.negative_control_plates[0]
                .as_str()
                .contains("-NC01-")
        );

        // Plate ids unique within the session
        let mut all: Vec<&str> = details
            .sample_plates
            .iter()
            .map(|p| p.plate_id.as_str())
            .chain(details.negative_control_plates.iter().map(|p| p.as_str()))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn verify_media_rejects_failed_lot() {
        let mut session = make_session();

        let mut lot = make_lot();
        lot.sterility_passed = false;
        let err = verify_media(&mut session, &lot, 1, "J. Okafor", now()).unwrap_err();
        assert!(matches!(err, EmtrackError::InvalidMediaLot { .. }));

        let mut lot = make_lot();
        lot.gpt_passed = false;
        let err = verify_media(&mut session, &lot, 1, "J. Okafor", now()).unwrap_err();
        assert!(matches!(err, EmtrackError::InvalidMediaLot { .. }));

        let mut lot = make_lot();
        lot.expiry_date = NaiveDate::from_ymd_opt(2023, 11, 23).unwrap();
        let err = verify_media(&mut session, &lot, 1, "J. Okafor", now()).unwrap_err();
        assert!(matches!(err, EmtrackError::InvalidMediaLot { .. }));

        // Failed verification leaves the session untouched
        assert_eq!(session.phase, SessionPhase::Pending);
        assert!(session.start_details.is_none());
    }

    #[test]
    fn verify_media_requires_explicit_control_count() {
        let mut session = make_session();
        let err = verify_media(&mut session, &make_lot(), 0, "J. Okafor", now()).unwrap_err();
        assert!(matches!(err, EmtrackError::Validation(_)));
    }

    #[test]
    fn storage_requires_media_verification_first() {
        let mut session = make_session();
        let err = store_negative_controls(&mut session, "sterile-cabinet-1", 21.0, "J", now())
            .unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }

    #[test]
    fn exposure_cannot_start_twice() {
        let (mut session, plates) = session_at_exposure();

        start_exposure(&mut session, &plates[0], now()).unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);

        let err = start_exposure(&mut session, &plates[0], now()).unwrap_err();
        assert!(matches!(err, EmtrackError::AlreadyStarted(_)));
    }

    #[test]
    fn end_before_four_hours_is_premature() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();
        start_exposure(&mut session, &plates[0], t0).unwrap();

        let err = end_exposure(&mut session, &plates[0], t0 + Duration::minutes(90)).unwrap_err();
        assert!(matches!(err, EmtrackError::PrematureEnd { .. }));

        // No end time recorded on failure
        let exposure = session
            .exposures
            .iter()
            .find(|e| e.plate_id == plates[0])
            .unwrap();
        assert!(exposure.outcome.ended_at().is_none());
    }

    #[test]
    fn end_at_exactly_four_hours_succeeds() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();
        start_exposure(&mut session, &plates[0], t0).unwrap();
        end_exposure(&mut session, &plates[0], t0 + Duration::hours(4)).unwrap();

        let exposure = session
            .exposures
            .iter()
            .find(|e| e.plate_id == plates[0])
            .unwrap();
        assert!(matches!(exposure.outcome, ExposureOutcome::EndedNormal { .. }));
    }

    #[test]
    fn early_end_requires_reason_and_records_it() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();
        start_exposure(&mut session, &plates[0], t0).unwrap();

        let err = end_exposure_early(&mut session, &plates[0], "  ", t0 + Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, EmtrackError::Validation(_)));

        end_exposure_early(
            &mut session,
            &plates[0],
            "room entered maintenance",
            t0 + Duration::hours(1),
        )
        .unwrap();

        let exposure = session
            .exposures
            .iter()
            .find(|e| e.plate_id == plates[0])
            .unwrap();
        assert!(matches!(
            &exposure.outcome,
            ExposureOutcome::EndedEarly { reason, .. } if reason == "room entered maintenance"
        ));
    }

    #[test]
    fn early_end_rejected_after_minimum_reached() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();
        start_exposure(&mut session, &plates[0], t0).unwrap();

        let err = end_exposure_early(
            &mut session,
            &plates[0],
            "operator preference",
            t0 + Duration::hours(5),
        )
        .unwrap_err();
        assert!(matches!(err, EmtrackError::Validation(_)));
    }

    #[test]
    fn skip_only_before_start() {
        let (mut session, plates) = session_at_exposure();

        skip_exposure(&mut session, &plates[0], "point inaccessible").unwrap();

        start_exposure(&mut session, &plates[1], now()).unwrap();
        let err = skip_exposure(&mut session, &plates[1], "changed my mind").unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }

    #[test]
    fn damage_allowed_before_or_during_exposure() {
        let (mut session, plates) = session_at_exposure();

        report_damage(&mut session, &plates[0], "dropped during transport").unwrap();

        start_exposure(&mut session, &plates[1], now()).unwrap();
        report_damage(&mut session, &plates[1], "lid cracked mid-exposure").unwrap();

        // Both terminal: session is ready
        assert_eq!(session.phase, SessionPhase::ReadyForIncubation);
    }

    #[test]
    fn terminal_outcomes_are_mutually_exclusive() {
        let (mut session, plates) = session_at_exposure();

        skip_exposure(&mut session, &plates[0], "point inaccessible").unwrap();
        let err = report_damage(&mut session, &plates[0], "cracked").unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));

        let err = start_exposure(&mut session, &plates[0], now()).unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }

    #[test]
    fn ready_iff_every_exposure_terminal() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();

        start_exposure(&mut session, &plates[0], t0).unwrap();
        end_exposure(&mut session, &plates[0], t0 + Duration::hours(4)).unwrap();
        assert_ne!(session.phase, SessionPhase::ReadyForIncubation);

        skip_exposure(&mut session, &plates[1], "point inaccessible").unwrap();
        assert_eq!(session.phase, SessionPhase::ReadyForIncubation);
        assert!(is_exposure_complete(&session));
    }

    #[test]
    fn hand_off_collects_ended_and_negative_controls() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();

        // Plate 0 ends normally, plate 1 is damaged
        start_exposure(&mut session, &plates[0], t0).unwrap();
        end_exposure(&mut session, &plates[0], t0 + Duration::hours(4)).unwrap();
        report_damage(&mut session, &plates[1], "lid cracked").unwrap();

        let hand_off = hand_off_to_incubation(&mut session).unwrap();

        // One surviving sample plate plus one negative control
        assert_eq!(hand_off.plates.len(), 2);
        assert_eq!(
            hand_off
                .plates
                .iter()
                .filter(|p| p.role == PlateRole::Sample)
                .count(),
            1
        );
        assert_eq!(
            hand_off
                .plates
                .iter()
                .filter(|p| p.role == PlateRole::NegativeControl)
                .count(),
            1
        );
        assert_eq!(hand_off.lot_number, "TSA-2023-001");

        assert_eq!(session.phase, SessionPhase::IncubationAssigned);
        assert_eq!(session.status, SessionStatus::Completed);

        // Hand-off is one-shot
        let err = hand_off_to_incubation(&mut session).unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }

    #[test]
    fn hand_off_plate_listing_is_read_only() {
        let (mut session, plates) = session_at_exposure();
        let t0 = now();
        start_exposure(&mut session, &plates[0], t0).unwrap();
        end_exposure(&mut session, &plates[0], t0 + Duration::hours(4)).unwrap();
        skip_exposure(&mut session, &plates[1], "point inaccessible").unwrap();

        let listed = hand_off_plates(&session).unwrap();
        assert_eq!(listed.plates.len(), 2);

        // Listing alone commits nothing
        assert_eq!(session.phase, SessionPhase::ReadyForIncubation);
        assert_eq!(session.status, SessionStatus::InProgress);
    }

    #[test]
    fn hand_off_requires_ready_phase() {
        let (mut session, _) = session_at_exposure();
        let err = hand_off_to_incubation(&mut session).unwrap_err();
        assert!(matches!(err, EmtrackError::IllegalTransition { .. }));
    }
}
