use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use super::error::{SchedError, SchedResult};
use super::model::{fmt_stamp, Enrollment};
use super::repo;

/// Adds an active enrollment. The duplicate and capacity checks run under a
/// write lock so two concurrent enrollments cannot both take the last seat.
pub fn enroll_student(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    student_id: &str,
    now: NaiveDateTime,
) -> SchedResult<Enrollment> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let lesson = repo::load_lesson(&tx, tenant_id, lesson_id)?;
    if !lesson.active {
        return Err(SchedError::conflict("lesson is no longer active"));
    }
    let Some(student_name) = repo::student_name(&tx, tenant_id, student_id)? else {
        return Err(SchedError::NotFound("student not found".into()));
    };
    if repo::is_actively_enrolled(&tx, tenant_id, lesson_id, student_id)? {
        return Err(SchedError::conflict("student is already enrolled in this lesson"));
    }
    let enrolled = repo::count_active_enrollments(&tx, tenant_id, lesson_id)?;
    if enrolled >= lesson.capacity {
        return Err(SchedError::conflict(format!(
            "lesson is at capacity ({} students)",
            lesson.capacity
        )));
    }

    let id = Uuid::new_v4().to_string();
    let enrolled_at = fmt_stamp(now);
    tx.execute(
        "INSERT INTO enrollments(id, tenant_id, lesson_id, student_id, active, enrolled_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        params![id, tenant_id, lesson_id, student_id, enrolled_at],
    )?;
    tx.commit()?;
    tracing::info!(tenant = tenant_id, lesson = lesson_id, student = student_id, "student enrolled");
    Ok(Enrollment {
        id,
        lesson_id: lesson_id.to_string(),
        student_id: student_id.to_string(),
        student_name,
        enrolled_at,
    })
}

pub fn remove_enrollment(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    student_id: &str,
    now: NaiveDateTime,
) -> SchedResult<()> {
    let changed = conn.execute(
        "UPDATE enrollments SET active = 0, removed_at = ?
         WHERE tenant_id = ? AND lesson_id = ? AND student_id = ? AND active = 1",
        params![fmt_stamp(now), tenant_id, lesson_id, student_id],
    )?;
    if changed == 0 {
        return Err(SchedError::NotFound("active enrollment not found".into()));
    }
    tracing::info!(tenant = tenant_id, lesson = lesson_id, student = student_id, "enrollment removed");
    Ok(())
}

pub fn list_enrollments(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<Vec<Enrollment>> {
    repo::load_lesson(conn, tenant_id, lesson_id)?;
    repo::active_enrollments(conn, tenant_id, lesson_id)
}
