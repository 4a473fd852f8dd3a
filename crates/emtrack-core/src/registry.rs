//! Entity registry and command dispatch
//!
//! The registry is the single writer over all sessions and batches. Every
//! operator command is validated by the state machines in [`crate::session`]
//! and [`crate::incubation`]; on success the registry appends the matching
//! audit event and saves a snapshot. Audit and snapshot failures are logged
//! and never roll back an applied transition.

use std::collections::HashMap;
use std::sync::Arc;

use emtrack_api::{
    ActivityStatus, BatchCommand, IncubationBatch, MediaType, MonitoringSchedule,
    MonitoringSession, SessionCommand, SessionPhase,
};
use emtrack_store::{AuditEvent, AuditEventType, Store};
use emtrack_util::{BatchId, Clock, EmtrackError, Result, SessionId};
use tracing::{info, warn};

use crate::{expander, incubation, session};

/// In-memory registry of sessions and incubation batches
pub struct MonitoringRegistry {
    clock: Arc<dyn Clock>,
    store: Arc<dyn Store>,
    sessions: HashMap<SessionId, MonitoringSession>,
    batches: HashMap<BatchId, IncubationBatch>,
}

impl MonitoringRegistry {
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn Store>) -> Self {
        Self {
            clock,
            store,
            sessions: HashMap::new(),
            batches: HashMap::new(),
        }
    }

    /// Expand a schedule and register the sessions it implies.
    ///
    /// Re-running with the same schedule is idempotent: a session whose id
    /// already exists keeps its current state untouched. Returns the ids of
    /// newly registered sessions.
    pub fn materialize_schedule(
        &mut self,
        schedule: &MonitoringSchedule,
    ) -> Result<Vec<SessionId>> {
        schedule.validate()?;

        let now = self.clock.now();
        let mut created = Vec::new();

        for session in expander::expand(schedule, now) {
            if self.sessions.contains_key(&session.id) {
                continue;
            }
            self.save_session_snapshot(&session);
            created.push(session.id.clone());
            self.sessions.insert(session.id.clone(), session);
        }

        info!(
            schedule_id = %schedule.id,
            session_count = created.len(),
            "Schedule materialized"
        );
        self.audit(AuditEventType::ScheduleExpanded {
            schedule_id: schedule.id.clone(),
            session_count: created.len(),
        });

        Ok(created)
    }

    /// Register a one-off session not backed by any schedule
    pub fn create_manual_session(
        &mut self,
        sampling_points: Vec<emtrack_util::PointId>,
        activity_status: ActivityStatus,
    ) -> Result<SessionId> {
        if sampling_points.is_empty() {
            return Err(EmtrackError::validation(
                "a session needs at least one sampling point",
            ));
        }

        let now = self.clock.now();
        let session = MonitoringSession::skeleton(
            SessionId::random(),
            None,
            now,
            sampling_points,
            activity_status,
        );
        let id = session.id.clone();

        self.save_session_snapshot(&session);
        self.sessions.insert(id.clone(), session);

        info!(session_id = %id, "Manual session created");
        Ok(id)
    }

    pub fn session(&self, id: &SessionId) -> Option<&MonitoringSession> {
        self.sessions.get(id)
    }

    pub fn batch(&self, id: &BatchId) -> Option<&IncubationBatch> {
        self.batches.get(id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &MonitoringSession> {
        self.sessions.values()
    }

    pub fn batches(&self) -> impl Iterator<Item = &IncubationBatch> {
        self.batches.values()
    }

    /// Apply one command to one session
    pub fn apply_session(&mut self, id: &SessionId, command: SessionCommand) -> Result<()> {
        let now = self.clock.now();
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EmtrackError::SessionNotFound(id.clone()))?;
        let was_ready = session.phase == SessionPhase::ReadyForIncubation;

        let event = match &command {
            SessionCommand::VerifyMedia {
                lot,
                negative_controls,
                actor,
            } => {
                session::verify_media(session, lot, *negative_controls, actor, now)?;
                AuditEventType::MediaVerified {
                    session_id: id.clone(),
                    lot_number: lot.lot_number.clone(),
                    sample_plates: session.exposures.len(),
                    negative_controls: *negative_controls as usize,
                    actor: actor.clone(),
                }
            }
            SessionCommand::StoreNegativeControls {
                location,
                temperature,
                actor,
            } => {
                session::store_negative_controls(session, location, *temperature, actor, now)?;
                AuditEventType::ControlsStored {
                    session_id: id.clone(),
                    location: location.clone(),
                    actor: actor.clone(),
                }
            }
            SessionCommand::StartExposure { plate_id } => {
                session::start_exposure(session, plate_id, now)?;
                AuditEventType::ExposureStarted {
                    session_id: id.clone(),
                    plate_id: plate_id.clone(),
                }
            }
            SessionCommand::EndExposure { plate_id } => {
                session::end_exposure(session, plate_id, now)?;
                AuditEventType::ExposureEnded {
                    session_id: id.clone(),
                    plate_id: plate_id.clone(),
                    early: false,
                }
            }
            SessionCommand::EndExposureEarly { plate_id, reason } => {
                session::end_exposure_early(session, plate_id, reason, now)?;
                AuditEventType::ExposureEnded {
                    session_id: id.clone(),
                    plate_id: plate_id.clone(),
                    early: true,
                }
            }
            SessionCommand::SkipExposure { plate_id, reason } => {
                session::skip_exposure(session, plate_id, reason)?;
                AuditEventType::ExposureSkipped {
                    session_id: id.clone(),
                    plate_id: plate_id.clone(),
                    reason: reason.clone(),
                }
            }
            SessionCommand::ReportDamage { plate_id, reason } => {
                session::report_damage(session, plate_id, reason)?;
                AuditEventType::PlateDamaged {
                    session_id: id.clone(),
                    plate_id: plate_id.clone(),
                    reason: reason.clone(),
                }
            }
        };

        let became_ready =
            !was_ready && session.phase == SessionPhase::ReadyForIncubation;
        let snapshot = session.clone();

        self.audit(event);
        if became_ready {
            self.audit(AuditEventType::SessionReady {
                session_id: id.clone(),
            });
        }
        self.save_session_snapshot(&snapshot);

        Ok(())
    }

    /// Build an incubation batch from sessions whose exposures are complete.
    ///
    /// All-or-nothing: every named session is checked for readiness and
    /// media-type match before any of them is handed off, so a failed call
    /// leaves every session untouched.
    pub fn create_batch(
        &mut self,
        media_type: MediaType,
        session_ids: &[SessionId],
    ) -> Result<BatchId> {
        if session_ids.is_empty() {
            return Err(EmtrackError::validation(
                "a batch needs at least one contributing session",
            ));
        }

        let mut distinct = session_ids.to_vec();
        distinct.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        distinct.dedup();
        if distinct.len() != session_ids.len() {
            return Err(EmtrackError::validation(
                "a session may contribute to a batch only once",
            ));
        }

        let mut hand_offs = Vec::new();
        for id in session_ids {
            let session = self
                .sessions
                .get(id)
                .ok_or_else(|| EmtrackError::SessionNotFound(id.clone()))?;
            let hand_off = session::hand_off_plates(session)?;
            let lot = &session
                .start_details
                .as_ref()
                .ok_or_else(|| EmtrackError::illegal("create_batch", "no start details"))?
                .lot;
            if lot.media_type != media_type {
                return Err(EmtrackError::invalid_lot(
                    &lot.lot_number,
                    format!("lot does not match batch media type {}", media_type.code()),
                ));
            }
            hand_offs.push(hand_off);
        }

        // The lot prefix check inside create_batch can still fail; no
        // session is committed until the batch exists.
        let now = self.clock.now();
        let batch = incubation::create_batch(media_type, &hand_offs, now)?;
        let batch_id = batch.id.clone();

        for id in session_ids {
            if let Some(session) = self.sessions.get_mut(id) {
                session::commit_hand_off(session);
                session.incubation_batch_id = Some(batch_id.clone());
                let snapshot = session.clone();
                self.save_session_snapshot(&snapshot);
            }
        }

        info!(
            batch_id = %batch_id,
            media_type = media_type.code(),
            plate_count = batch.plates.len(),
            "Incubation batch created"
        );
        self.audit(AuditEventType::BatchCreated {
            batch_id: batch_id.clone(),
            media_type: media_type.code().to_string(),
            plate_count: batch.plates.len(),
            session_count: batch.sessions.len(),
        });

        self.save_batch_snapshot(&batch);
        self.batches.insert(batch_id.clone(), batch);

        Ok(batch_id)
    }

    /// Apply one command to one batch
    pub fn apply_batch(&mut self, id: &BatchId, command: BatchCommand) -> Result<()> {
        let now = self.clock.now();
        let batch = self
            .batches
            .get_mut(id)
            .ok_or_else(|| EmtrackError::BatchNotFound(id.clone()))?;

        let event = match &command {
            BatchCommand::AssignIncubator {
                incubator_id,
                target_temperature,
                actual_temperature,
                actor,
            } => {
                incubation::assign_incubator(
                    batch,
                    incubator_id,
                    *target_temperature,
                    *actual_temperature,
                    actor,
                    now,
                )?;
                AuditEventType::IncubatorAssigned {
                    batch_id: id.clone(),
                    incubator_id: incubator_id.clone(),
                    stage: 1,
                    temperature: *actual_temperature,
                    actor: actor.clone(),
                }
            }
            BatchCommand::RecordTemperature {
                value,
                comment,
                actor,
            } => {
                incubation::record_temperature(batch, *value, comment.as_deref(), actor, now)?;
                AuditEventType::TemperatureRecorded {
                    batch_id: id.clone(),
                    stage: batch.current_stage,
                    value: *value,
                    actor: actor.clone(),
                }
            }
            BatchCommand::ChangeIncubator {
                incubator_id,
                reason,
                actor,
            } => {
                let from = batch
                    .current_incubator()
                    .cloned()
                    .ok_or_else(|| EmtrackError::illegal("change_incubator", "not placed"))?;
                incubation::change_incubator(batch, incubator_id, reason, actor, now)?;
                AuditEventType::IncubatorChanged {
                    batch_id: id.clone(),
                    from,
                    to: incubator_id.clone(),
                    reason: reason.clone(),
                    actor: actor.clone(),
                }
            }
            BatchCommand::EndStage1 { actor } => {
                incubation::end_stage1(batch, actor, now)?;
                AuditEventType::StageCompleted {
                    batch_id: id.clone(),
                    stage: 1,
                    actor: actor.clone(),
                }
            }
            BatchCommand::StartStage2 {
                incubator_id,
                target_temperature,
                actual_temperature,
                actor,
            } => {
                incubation::start_stage2(
                    batch,
                    incubator_id,
                    *target_temperature,
                    *actual_temperature,
                    actor,
                    now,
                )?;
                AuditEventType::IncubatorAssigned {
                    batch_id: id.clone(),
                    incubator_id: incubator_id.clone(),
                    stage: 2,
                    temperature: *actual_temperature,
                    actor: actor.clone(),
                }
            }
            BatchCommand::EndStage2 { actor } => {
                incubation::end_stage2(batch, actor, now)?;
                AuditEventType::StageCompleted {
                    batch_id: id.clone(),
                    stage: 2,
                    actor: actor.clone(),
                }
            }
        };

        let snapshot = batch.clone();
        self.audit(event);
        self.save_batch_snapshot(&snapshot);

        Ok(())
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(error) = self
            .store
            .append_audit(AuditEvent::at(self.clock.now(), event))
        {
            warn!(%error, "Failed to append audit event");
        }
    }

    fn save_session_snapshot(&self, session: &MonitoringSession) {
        if let Err(error) = self.store.save_session(session) {
            warn!(session_id = %session.id, %error, "Failed to save session snapshot");
        }
    }

    fn save_batch_snapshot(&self, batch: &IncubationBatch) {
        if let Err(error) = self.store.save_batch(batch) {
            warn!(batch_id = %batch.id, %error, "Failed to save batch snapshot");
        }
    }
}
