use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::Serialize;

use super::availability::{check_availability, AvailabilityQuery};
use super::error::{SchedError, SchedResult};
use super::interval::WeeklyWindow;
use super::lessons::ensure_window_holds_a_slot;
use super::model::{fmt_stamp, fmt_time, Enrollment, Lesson, LessonRef, ResourceKind};
use super::notify::{AffectedStudent, NotificationSink, RescheduleNotice};
use super::repo;

#[derive(Debug, Clone, Copy)]
pub struct NewPlacement {
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl NewPlacement {
    fn window(&self) -> WeeklyWindow {
        WeeklyWindow::new(self.day_of_week, self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub teacher_conflict: Option<LessonRef>,
    pub room_conflict: Option<LessonRef>,
    pub affected_students: usize,
    pub affected_enrollments: Vec<Enrollment>,
}

#[derive(Debug, Clone)]
pub struct RescheduleInput {
    pub placement: NewPlacement,
    pub notify_parents: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleOutcome {
    pub lesson: Lesson,
    pub affected_students: usize,
    pub notification_queued: bool,
}

fn build_report(conn: &Connection, tenant_id: &str, lesson: &Lesson, placement: &NewPlacement) -> SchedResult<ConflictReport> {
    if !placement.window().is_well_formed() {
        return Err(SchedError::BadParams(
            "newDayOfWeek must be 0..=6 and newStartTime must be before newEndTime".into(),
        ));
    }
    let clash = |kind: ResourceKind, resource_id: &str| {
        check_availability(
            conn,
            tenant_id,
            &AvailabilityQuery {
                kind,
                resource_id,
                day_of_week: placement.day_of_week,
                start_time: placement.start_time,
                end_time: placement.end_time,
                exclude_lesson_id: Some(lesson.id.as_str()),
            },
        )
        .map(|a| a.conflicting_lesson)
    };
    let teacher_conflict = clash(ResourceKind::Teacher, &lesson.teacher_id)?;
    let room_conflict = clash(ResourceKind::Room, &lesson.room_id)?;
    let affected_enrollments = repo::active_enrollments(conn, tenant_id, &lesson.id)?;
    Ok(ConflictReport {
        has_conflicts: teacher_conflict.is_some() || room_conflict.is_some(),
        teacher_conflict,
        room_conflict,
        affected_students: affected_enrollments.len(),
        affected_enrollments,
    })
}

/// Preview of moving a lesson to a new weekly window. Writes nothing.
pub fn check_reschedule_conflicts(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    placement: &NewPlacement,
) -> SchedResult<ConflictReport> {
    let lesson = repo::load_lesson(conn, tenant_id, lesson_id)?;
    build_report(conn, tenant_id, &lesson, placement)
}

/// Moves a lesson to a new weekly window. The move commits on its own; the
/// parent notice is queued afterwards and a failure there is only logged.
/// Existing individual bookings keep their dates and times.
pub fn reschedule_lesson(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    input: &RescheduleInput,
    actor_id: &str,
    sink: &dyn NotificationSink,
    now: NaiveDateTime,
) -> SchedResult<RescheduleOutcome> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let before = repo::load_lesson(&tx, tenant_id, lesson_id)?;
    if !before.active {
        return Err(SchedError::conflict("lesson is no longer active"));
    }
    let report = build_report(&tx, tenant_id, &before, &input.placement)?;
    if let Some(lesson) = report.teacher_conflict.clone().or(report.room_conflict.clone()) {
        let resource = if report.teacher_conflict.is_some() { "teacher" } else { "room" };
        return Err(SchedError::lesson_conflict(
            format!(
                "{} is already booked for {} ({}-{})",
                resource, lesson.name, lesson.start_time, lesson.end_time
            ),
            lesson,
        ));
    }
    let window = input.placement.window();
    ensure_window_holds_a_slot(&tx, tenant_id, lesson_id, window)?;
    tx.execute(
        "UPDATE lessons
         SET day_of_week = ?, start_time = ?, end_time = ?, duration_minutes = ?, updated_at = ?
         WHERE tenant_id = ? AND id = ?",
        params![
            i64::from(window.day_of_week),
            fmt_time(window.start),
            fmt_time(window.end),
            window.minutes(),
            fmt_stamp(now),
            tenant_id,
            lesson_id
        ],
    )?;
    let after = repo::load_lesson(&tx, tenant_id, lesson_id)?;
    tx.commit()?;

    tracing::info!(
        tenant = tenant_id,
        lesson = lesson_id,
        actor = actor_id,
        from_day = before.day_of_week,
        from = %fmt_time(before.start_time),
        to_day = after.day_of_week,
        to = %fmt_time(after.start_time),
        "lesson rescheduled"
    );

    let mut notification_queued = false;
    if input.notify_parents && !report.affected_enrollments.is_empty() {
        let notice = RescheduleNotice {
            lesson_id: lesson_id.to_string(),
            previous: before.summary(),
            current: after.summary(),
            reason: input.reason.clone(),
            actor_id: actor_id.to_string(),
            affected_students: report
                .affected_enrollments
                .iter()
                .map(|e| AffectedStudent {
                    student_id: e.student_id.clone(),
                    student_name: e.student_name.clone(),
                })
                .collect(),
        };
        match sink.enqueue(tenant_id, &notice) {
            Ok(()) => notification_queued = true,
            Err(e) => tracing::warn!(
                tenant = tenant_id,
                lesson = lesson_id,
                error = %e,
                "failed to queue reschedule notice"
            ),
        }
    }

    Ok(RescheduleOutcome {
        lesson: after,
        affected_students: report.affected_students,
        notification_queued,
    })
}
