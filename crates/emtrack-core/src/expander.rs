//! Schedule expansion
//!
//! Turns a recurrence rule into the ordered sequence of future session
//! skeletons it implies. Pure function of its inputs: calling it twice with
//! the same schedule and `now` yields identical output.

use chrono::{DateTime, Duration, Local, Months, NaiveTime, TimeZone};
use emtrack_api::{Frequency, MonitoringSchedule, MonitoringSession};
use emtrack_util::SessionId;
use std::collections::HashSet;
use tracing::debug;

/// Expand a schedule into pending session skeletons.
///
/// Only future slots are materialized: a candidate instant earlier than
/// `now` is never emitted, so slots already passed in the current cycle are
/// skipped while later same-day slots still qualify. Unbounded schedules
/// are capped at start date + 1 year to guarantee termination. Duplicate
/// candidate instants (possible when an hourly step revisits the same
/// calendar date) collapse to a single session, keeping ids collision-free.
pub fn expand(schedule: &MonitoringSchedule, now: DateTime<Local>) -> Vec<MonitoringSession> {
    let horizon = schedule
        .end_date
        .or_else(|| schedule.start_date.checked_add_months(Months::new(12)))
        .unwrap_or(schedule.start_date);

    let mut sessions = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = schedule.start_date;

    while cursor <= horizon {
        for slot in &schedule.time_slots {
            let Some(time) = NaiveTime::from_hms_opt(slot.hour as u32, slot.minute as u32, 0)
            else {
                continue;
            };
            let naive = cursor.date_naive().and_time(time);
            // A DST gap can make a local time unrepresentable; such slots
            // have no instant to monitor at and are skipped for that cycle.
            let Some(candidate) = Local.from_local_datetime(&naive).earliest() else {
                continue;
            };

            if candidate >= now && seen.insert(candidate.timestamp_millis()) {
                sessions.push(MonitoringSession::skeleton(
                    SessionId::scheduled(&schedule.id, candidate),
                    Some(schedule.id.clone()),
                    candidate,
                    schedule.sampling_points.clone(),
                    schedule.activity_status.clone(),
                ));
            }
        }

        cursor = match schedule.frequency {
            Frequency::Hourly => cursor + Duration::hours(1),
            Frequency::Daily => cursor + Duration::days(1),
            Frequency::Weekly => cursor + Duration::days(7),
            Frequency::Monthly => match cursor.checked_add_months(Months::new(1)) {
                Some(next) => next,
                None => break,
            },
        };
    }

    debug!(
        schedule_id = %schedule.id,
        session_count = sessions.len(),
        "Schedule expanded"
    );

    sessions
}
