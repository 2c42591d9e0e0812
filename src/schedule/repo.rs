//! Tenant-scoped row access. Every query takes the tenant id; nothing here
//! reads across tenants.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

use super::error::{SchedError, SchedResult};
use super::model::{
    parse_date, parse_time, Booking, BookingStatus, Enrollment, HybridPattern, Lesson,
    LessonCategory, PatternKind, ResourceKind, Term,
};

const LESSON_COLS: &str = "id, name, teacher_id, room_id, term_id, day_of_week, start_time, end_time, duration_minutes, category, capacity, active";

const BOOKING_COLS: &str = "id, lesson_id, student_id, parent_id, week_number, scheduled_date, start_time, end_time, status, cancellation_reason, created_at";

fn bad_row(what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid {} in row: {}", what, value).into(),
    )
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    parse_time(&raw).ok_or_else(|| bad_row("time", &raw))
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).ok_or_else(|| bad_row("date", &raw))
}

fn weeks_col(row: &Row, idx: usize) -> rusqlite::Result<BTreeSet<u32>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str::<BTreeSet<u32>>(&raw).map_err(|_| bad_row("week list", &raw))
}

fn lesson_from_row(r: &Row) -> rusqlite::Result<Lesson> {
    let category_raw: String = r.get(9)?;
    Ok(Lesson {
        id: r.get(0)?,
        name: r.get(1)?,
        teacher_id: r.get(2)?,
        room_id: r.get(3)?,
        term_id: r.get(4)?,
        day_of_week: r.get::<_, i64>(5)? as u8,
        start_time: time_col(r, 6)?,
        end_time: time_col(r, 7)?,
        duration_minutes: r.get(8)?,
        category: LessonCategory::parse(&category_raw)
            .ok_or_else(|| bad_row("category", &category_raw))?,
        capacity: r.get(10)?,
        active: r.get::<_, i64>(11)? != 0,
    })
}

fn booking_from_row(r: &Row) -> rusqlite::Result<Booking> {
    let status_raw: String = r.get(8)?;
    Ok(Booking {
        id: r.get(0)?,
        lesson_id: r.get(1)?,
        student_id: r.get(2)?,
        parent_id: r.get(3)?,
        week_number: r.get::<_, i64>(4)? as u32,
        scheduled_date: date_col(r, 5)?,
        start_time: time_col(r, 6)?,
        end_time: time_col(r, 7)?,
        status: BookingStatus::parse(&status_raw).ok_or_else(|| bad_row("status", &status_raw))?,
        cancellation_reason: r.get(9)?,
        created_at: r.get(10)?,
    })
}

pub fn find_lesson(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<Option<Lesson>> {
    let sql = format!(
        "SELECT {} FROM lessons WHERE tenant_id = ? AND id = ?",
        LESSON_COLS
    );
    Ok(conn
        .query_row(&sql, params![tenant_id, lesson_id], lesson_from_row)
        .optional()?)
}

pub fn load_lesson(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<Lesson> {
    find_lesson(conn, tenant_id, lesson_id)?
        .ok_or_else(|| SchedError::NotFound("lesson not found".into()))
}

/// Active lessons using `resource_id` on `day_of_week`, ordered by start time.
pub fn active_lessons_for_resource(
    conn: &Connection,
    tenant_id: &str,
    kind: ResourceKind,
    resource_id: &str,
    day_of_week: u8,
    exclude_lesson_id: Option<&str>,
) -> SchedResult<Vec<Lesson>> {
    let sql = format!(
        "SELECT {} FROM lessons
         WHERE tenant_id = ? AND {} = ? AND day_of_week = ? AND active = 1 AND id <> ?
         ORDER BY start_time, id",
        LESSON_COLS,
        kind.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            tenant_id,
            resource_id,
            i64::from(day_of_week),
            exclude_lesson_id.unwrap_or("")
        ],
        lesson_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_lessons(
    conn: &Connection,
    tenant_id: &str,
    term_id: Option<&str>,
    teacher_id: Option<&str>,
    include_inactive: bool,
) -> SchedResult<Vec<Lesson>> {
    let sql = format!(
        "SELECT {} FROM lessons
         WHERE tenant_id = ?1
           AND (?2 IS NULL OR term_id = ?2)
           AND (?3 IS NULL OR teacher_id = ?3)
           AND (?4 = 1 OR active = 1)
         ORDER BY day_of_week, start_time, name, id",
        LESSON_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![tenant_id, term_id, teacher_id, if include_inactive { 1 } else { 0 }],
        lesson_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn load_term(conn: &Connection, tenant_id: &str, term_id: &str) -> SchedResult<Term> {
    let row = conn
        .query_row(
            "SELECT id, name, start_date, end_date FROM terms WHERE tenant_id = ? AND id = ?",
            params![tenant_id, term_id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, date_col(r, 2)?, date_col(r, 3)?)),
        )
        .optional()?;
    let Some((id, name, start_date, end_date)) = row else {
        return Err(SchedError::NotFound("term not found".into()));
    };
    Ok(Term {
        id,
        name,
        start_date,
        end_date,
        total_weeks: Term::weeks_between(start_date, end_date),
    })
}

pub fn list_terms(conn: &Connection, tenant_id: &str) -> SchedResult<Vec<Term>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date FROM terms WHERE tenant_id = ? ORDER BY start_date, id",
    )?;
    let rows = stmt.query_map([tenant_id], |r| {
        let start_date = date_col(r, 2)?;
        let end_date = date_col(r, 3)?;
        Ok(Term {
            id: r.get(0)?,
            name: r.get(1)?,
            start_date,
            end_date,
            total_weeks: Term::weeks_between(start_date, end_date),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn find_pattern(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<Option<HybridPattern>> {
    Ok(conn
        .query_row(
            "SELECT lesson_id, term_id, kind, group_weeks_json, individual_weeks_json,
                    slot_duration_minutes, booking_deadline_hours, booking_open
             FROM hybrid_patterns WHERE tenant_id = ? AND lesson_id = ?",
            params![tenant_id, lesson_id],
            |r| {
                let kind_raw: String = r.get(2)?;
                Ok(HybridPattern {
                    lesson_id: r.get(0)?,
                    term_id: r.get(1)?,
                    kind: PatternKind::parse(&kind_raw).ok_or_else(|| bad_row("pattern kind", &kind_raw))?,
                    group_weeks: weeks_col(r, 3)?,
                    individual_weeks: weeks_col(r, 4)?,
                    slot_duration_minutes: r.get(5)?,
                    booking_deadline_hours: r.get(6)?,
                    booking_open: r.get::<_, i64>(7)? != 0,
                })
            },
        )
        .optional()?)
}

pub fn find_booking(conn: &Connection, tenant_id: &str, booking_id: &str) -> SchedResult<Option<Booking>> {
    let sql = format!(
        "SELECT {} FROM individual_bookings WHERE tenant_id = ? AND id = ?",
        BOOKING_COLS
    );
    Ok(conn
        .query_row(&sql, params![tenant_id, booking_id], booking_from_row)
        .optional()?)
}

/// Non-cancelled bookings occupying a (lesson, week).
pub fn live_bookings_for_week(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    week_number: u32,
) -> SchedResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {} FROM individual_bookings
         WHERE tenant_id = ? AND lesson_id = ? AND week_number = ? AND status <> 'CANCELLED'
         ORDER BY start_time, id",
        BOOKING_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![tenant_id, lesson_id, i64::from(week_number)],
        booking_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_bookings(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: Option<&str>,
    week_number: Option<u32>,
    parent_id: Option<&str>,
) -> SchedResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {} FROM individual_bookings
         WHERE tenant_id = ?1
           AND (?2 IS NULL OR lesson_id = ?2)
           AND (?3 IS NULL OR week_number = ?3)
           AND (?4 IS NULL OR parent_id = ?4)
         ORDER BY scheduled_date, start_time, id",
        BOOKING_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![tenant_id, lesson_id, week_number.map(i64::from), parent_id],
        booking_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Bookings that still hold their slot or record an outcome (anything but
/// CANCELLED) with a scheduled date inside `[from, to]`.
pub fn held_bookings_between(
    conn: &Connection,
    tenant_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> SchedResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {} FROM individual_bookings
         WHERE tenant_id = ? AND status <> 'CANCELLED' AND scheduled_date BETWEEN ? AND ?
         ORDER BY scheduled_date, start_time, id",
        BOOKING_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            tenant_id,
            super::model::fmt_date(from),
            super::model::fmt_date(to)
        ],
        booking_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn active_enrollments(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<Vec<Enrollment>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.lesson_id, e.student_id, s.first_name || ' ' || s.last_name, e.enrolled_at
         FROM enrollments e
         JOIN students s ON s.id = e.student_id AND s.tenant_id = e.tenant_id
         WHERE e.tenant_id = ? AND e.lesson_id = ? AND e.active = 1
         ORDER BY s.last_name, s.first_name, e.id",
    )?;
    let rows = stmt.query_map(params![tenant_id, lesson_id], |r| {
        Ok(Enrollment {
            id: r.get(0)?,
            lesson_id: r.get(1)?,
            student_id: r.get(2)?,
            student_name: r.get(3)?,
            enrolled_at: r.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn is_actively_enrolled(conn: &Connection, tenant_id: &str, lesson_id: &str, student_id: &str) -> SchedResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM enrollments
             WHERE tenant_id = ? AND lesson_id = ? AND student_id = ? AND active = 1",
            params![tenant_id, lesson_id, student_id],
            |_r| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn count_active_enrollments(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE tenant_id = ? AND lesson_id = ? AND active = 1",
        params![tenant_id, lesson_id],
        |r| r.get(0),
    )?)
}

pub fn parent_family_id(conn: &Connection, tenant_id: &str, parent_id: &str) -> SchedResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT family_id FROM parents WHERE tenant_id = ? AND id = ?",
            params![tenant_id, parent_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn student_family_id(conn: &Connection, tenant_id: &str, student_id: &str) -> SchedResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT family_id FROM students WHERE tenant_id = ? AND id = ?",
            params![tenant_id, student_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Ids of the students a parent may act for: same tenant, same family.
pub fn family_students(conn: &Connection, tenant_id: &str, parent_id: &str) -> SchedResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT s.id
         FROM students s
         JOIN parents p ON p.family_id = s.family_id AND p.tenant_id = s.tenant_id
         WHERE s.tenant_id = ? AND p.id = ?
         ORDER BY s.last_name, s.first_name, s.id",
    )?;
    let rows = stmt.query_map(params![tenant_id, parent_id], |r| r.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn student_name(conn: &Connection, tenant_id: &str, student_id: &str) -> SchedResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT first_name || ' ' || last_name FROM students WHERE tenant_id = ? AND id = ?",
            params![tenant_id, student_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn resource_name(conn: &Connection, tenant_id: &str, kind: ResourceKind, id: &str) -> SchedResult<Option<String>> {
    let sql = match kind {
        ResourceKind::Teacher => "SELECT name FROM teachers WHERE tenant_id = ? AND id = ?",
        ResourceKind::Room => "SELECT name FROM rooms WHERE tenant_id = ? AND id = ?",
    };
    Ok(conn
        .query_row(sql, params![tenant_id, id], |r| r.get(0))
        .optional()?)
}

/// Active lessons the student holds an active enrollment in.
pub fn lessons_for_student(conn: &Connection, tenant_id: &str, student_id: &str) -> SchedResult<Vec<Lesson>> {
    let cols = LESSON_COLS
        .split(", ")
        .map(|c| format!("l.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM lessons l
         JOIN enrollments e ON e.lesson_id = l.id AND e.tenant_id = l.tenant_id
         WHERE l.tenant_id = ? AND e.student_id = ? AND e.active = 1 AND l.active = 1
         ORDER BY l.day_of_week, l.start_time, l.id",
        cols
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![tenant_id, student_id], lesson_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
