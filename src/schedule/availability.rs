use chrono::NaiveTime;
use rusqlite::Connection;
use serde::Serialize;

use super::error::{SchedError, SchedResult};
use super::interval::{conflicts, WeeklyWindow};
use super::model::{LessonRef, ResourceKind};
use super::repo;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_lesson: Option<LessonRef>,
}

#[derive(Debug, Clone)]
pub struct AvailabilityQuery<'a> {
    pub kind: ResourceKind,
    pub resource_id: &'a str,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub exclude_lesson_id: Option<&'a str>,
}

/// Whether a teacher or room is free for a weekly window. Read-only.
pub fn check_availability(
    conn: &Connection,
    tenant_id: &str,
    q: &AvailabilityQuery<'_>,
) -> SchedResult<Availability> {
    let candidate = WeeklyWindow::new(q.day_of_week, q.start_time, q.end_time);
    if !candidate.is_well_formed() {
        return Err(SchedError::BadParams(
            "dayOfWeek must be 0..=6 and startTime must be before endTime".into(),
        ));
    }
    let existing = repo::active_lessons_for_resource(
        conn,
        tenant_id,
        q.kind,
        q.resource_id,
        q.day_of_week,
        q.exclude_lesson_id,
    )?;
    let hit = existing.iter().find(|l| {
        conflicts(
            &candidate,
            &WeeklyWindow::new(l.day_of_week, l.start_time, l.end_time),
        )
    });
    if let Some(l) = hit {
        tracing::debug!(
            tenant = tenant_id,
            resource = q.resource_id,
            kind = q.kind.label(),
            conflicting_lesson = %l.id,
            "resource is busy"
        );
    }
    Ok(Availability {
        available: hit.is_none(),
        conflicting_lesson: hit.map(|l| l.summary()),
    })
}

/// Runs the teacher and room checks used by lesson create/update, failing with
/// a conflict that names the colliding lesson.
pub fn ensure_lesson_slot_free(
    conn: &Connection,
    tenant_id: &str,
    teacher_id: &str,
    room_id: &str,
    window: WeeklyWindow,
    exclude_lesson_id: Option<&str>,
) -> SchedResult<()> {
    for (kind, resource_id) in [(ResourceKind::Teacher, teacher_id), (ResourceKind::Room, room_id)] {
        let result = check_availability(
            conn,
            tenant_id,
            &AvailabilityQuery {
                kind,
                resource_id,
                day_of_week: window.day_of_week,
                start_time: window.start,
                end_time: window.end,
                exclude_lesson_id,
            },
        )?;
        if let Some(lesson) = result.conflicting_lesson {
            return Err(SchedError::lesson_conflict(
                format!(
                    "{} is already booked for {} ({}-{})",
                    kind.label(),
                    lesson.name,
                    lesson.start_time,
                    lesson.end_time
                ),
                lesson,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::testutil::{seed, t};

    #[test]
    fn detects_teacher_overlap_but_allows_back_to_back() {
        let fx = seed();
        let busy = check_availability(
            &fx.conn,
            &fx.tenant,
            &AvailabilityQuery {
                kind: ResourceKind::Teacher,
                resource_id: &fx.teacher,
                day_of_week: 2,
                start_time: t(9, 30),
                end_time: t(10, 30),
                exclude_lesson_id: None,
            },
        )
        .expect("check");
        assert!(!busy.available);
        assert_eq!(
            busy.conflicting_lesson.map(|l| l.id),
            Some(fx.hybrid_lesson.clone())
        );

        let free = check_availability(
            &fx.conn,
            &fx.tenant,
            &AvailabilityQuery {
                kind: ResourceKind::Teacher,
                resource_id: &fx.teacher,
                day_of_week: 2,
                start_time: t(10, 0),
                end_time: t(11, 0),
                exclude_lesson_id: None,
            },
        )
        .expect("check");
        assert!(free.available);
        assert!(free.conflicting_lesson.is_none());
    }

    #[test]
    fn excluding_the_lesson_itself_reports_free() {
        let fx = seed();
        for kind in [ResourceKind::Teacher, ResourceKind::Room] {
            let resource_id = match kind {
                ResourceKind::Teacher => fx.teacher.as_str(),
                ResourceKind::Room => fx.room.as_str(),
            };
            let r = check_availability(
                &fx.conn,
                &fx.tenant,
                &AvailabilityQuery {
                    kind,
                    resource_id,
                    day_of_week: 2,
                    start_time: t(9, 0),
                    end_time: t(10, 0),
                    exclude_lesson_id: Some(&fx.hybrid_lesson),
                },
            )
            .expect("check");
            assert!(r.available, "{:?} should be free once self is excluded", kind);
        }
    }

    #[test]
    fn other_tenants_lessons_are_invisible() {
        let fx = seed();
        let r = check_availability(
            &fx.conn,
            "some-other-tenant",
            &AvailabilityQuery {
                kind: ResourceKind::Teacher,
                resource_id: &fx.teacher,
                day_of_week: 2,
                start_time: t(9, 0),
                end_time: t(10, 0),
                exclude_lesson_id: None,
            },
        )
        .expect("check");
        assert!(r.available);
    }

    #[test]
    fn malformed_window_is_rejected() {
        let fx = seed();
        let r = check_availability(
            &fx.conn,
            &fx.tenant,
            &AvailabilityQuery {
                kind: ResourceKind::Room,
                resource_id: &fx.room,
                day_of_week: 2,
                start_time: t(10, 0),
                end_time: t(9, 0),
                exclude_lesson_id: None,
            },
        );
        assert!(matches!(r, Err(SchedError::BadParams(_))));
    }
}
