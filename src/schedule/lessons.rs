use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, types::Value, params_from_iter, Connection};
use uuid::Uuid;

use super::availability::ensure_lesson_slot_free;
use super::error::{SchedError, SchedResult};
use super::interval::WeeklyWindow;
use super::model::{fmt_date, fmt_stamp, fmt_time, Lesson, LessonCategory, ResourceKind, Term};
use super::repo;

pub fn create_term(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    now: NaiveDateTime,
) -> SchedResult<Term> {
    if end_date < start_date {
        return Err(SchedError::BadParams("endDate must not be before startDate".into()));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO terms(id, tenant_id, name, start_date, end_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![id, tenant_id, name, fmt_date(start_date), fmt_date(end_date), fmt_stamp(now)],
    )?;
    repo::load_term(conn, tenant_id, &id)
}

#[derive(Debug, Clone)]
pub struct LessonInput {
    pub name: String,
    pub teacher_id: String,
    pub room_id: String,
    pub term_id: String,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub category: LessonCategory,
    pub capacity: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LessonPatch {
    pub name: Option<String>,
    pub teacher_id: Option<String>,
    pub room_id: Option<String>,
    pub day_of_week: Option<u8>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub capacity: Option<i64>,
}

fn ensure_resource_exists(conn: &Connection, tenant_id: &str, kind: ResourceKind, id: &str) -> SchedResult<()> {
    if repo::resource_name(conn, tenant_id, kind, id)?.is_none() {
        return Err(SchedError::NotFound(format!("{} not found", kind.label())));
    }
    Ok(())
}

fn checked_window(day_of_week: u8, start: NaiveTime, end: NaiveTime) -> SchedResult<WeeklyWindow> {
    let window = WeeklyWindow::new(day_of_week, start, end);
    if !window.is_well_formed() {
        return Err(SchedError::BadParams(
            "dayOfWeek must be 0..=6 and startTime must be before endTime".into(),
        ));
    }
    Ok(window)
}

pub fn create_lesson(conn: &Connection, tenant_id: &str, input: &LessonInput, now: NaiveDateTime) -> SchedResult<Lesson> {
    if input.name.trim().is_empty() {
        return Err(SchedError::BadParams("name must not be empty".into()));
    }
    if input.capacity < 1 {
        return Err(SchedError::BadParams("capacity must be >= 1".into()));
    }
    let window = checked_window(input.day_of_week, input.start_time, input.end_time)?;
    ensure_resource_exists(conn, tenant_id, ResourceKind::Teacher, &input.teacher_id)?;
    ensure_resource_exists(conn, tenant_id, ResourceKind::Room, &input.room_id)?;
    repo::load_term(conn, tenant_id, &input.term_id)?;
    ensure_lesson_slot_free(conn, tenant_id, &input.teacher_id, &input.room_id, window, None)?;

    let id = Uuid::new_v4().to_string();
    let ts = fmt_stamp(now);
    conn.execute(
        "INSERT INTO lessons(
            id, tenant_id, name, teacher_id, room_id, term_id, day_of_week, start_time, end_time,
            duration_minutes, category, capacity, active, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        params![
            id,
            tenant_id,
            input.name.trim(),
            input.teacher_id,
            input.room_id,
            input.term_id,
            i64::from(input.day_of_week),
            fmt_time(input.start_time),
            fmt_time(input.end_time),
            window.minutes(),
            input.category.as_str(),
            input.capacity,
            ts,
            ts
        ],
    )?;
    tracing::info!(tenant = tenant_id, lesson = %id, category = input.category.as_str(), "lesson created");
    repo::load_lesson(conn, tenant_id, &id)
}

/// A hybrid lesson's window has to hold at least one individual slot.
pub fn ensure_window_holds_a_slot(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    window: WeeklyWindow,
) -> SchedResult<()> {
    if let Some(pattern) = repo::find_pattern(conn, tenant_id, lesson_id)? {
        if window.minutes() < pattern.slot_duration_minutes {
            return Err(SchedError::BadParams(format!(
                "a {} minute window cannot hold the {} minute individual slots of this lesson",
                window.minutes(),
                pattern.slot_duration_minutes
            )));
        }
    }
    Ok(())
}

pub fn update_lesson(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    patch: &LessonPatch,
    now: NaiveDateTime,
) -> SchedResult<Lesson> {
    let current = repo::load_lesson(conn, tenant_id, lesson_id)?;
    let teacher_id = patch.teacher_id.clone().unwrap_or_else(|| current.teacher_id.clone());
    let room_id = patch.room_id.clone().unwrap_or_else(|| current.room_id.clone());
    let window = checked_window(
        patch.day_of_week.unwrap_or(current.day_of_week),
        patch.start_time.unwrap_or(current.start_time),
        patch.end_time.unwrap_or(current.end_time),
    )?;

    let placement_changed = teacher_id != current.teacher_id
        || room_id != current.room_id
        || window != WeeklyWindow::new(current.day_of_week, current.start_time, current.end_time);
    if placement_changed {
        ensure_window_holds_a_slot(conn, tenant_id, lesson_id, window)?;
        if teacher_id != current.teacher_id {
            ensure_resource_exists(conn, tenant_id, ResourceKind::Teacher, &teacher_id)?;
        }
        if room_id != current.room_id {
            ensure_resource_exists(conn, tenant_id, ResourceKind::Room, &room_id)?;
        }
        if current.active {
            ensure_lesson_slot_free(conn, tenant_id, &teacher_id, &room_id, window, Some(lesson_id))?;
        }
    }

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedError::BadParams("name must not be empty".into()));
        }
        fields.push("name = ?");
        values.push(Value::Text(name.to_string()));
    }
    if let Some(capacity) = patch.capacity {
        let enrolled = repo::count_active_enrollments(conn, tenant_id, lesson_id)?;
        if capacity < 1 {
            return Err(SchedError::BadParams("capacity must be >= 1".into()));
        }
        if capacity < enrolled {
            return Err(SchedError::conflict(format!(
                "capacity {} is below the {} active enrollments",
                capacity, enrolled
            )));
        }
        fields.push("capacity = ?");
        values.push(Value::Integer(capacity));
    }
    if placement_changed {
        fields.extend(["teacher_id = ?", "room_id = ?", "day_of_week = ?", "start_time = ?", "end_time = ?", "duration_minutes = ?"]);
        values.push(Value::Text(teacher_id));
        values.push(Value::Text(room_id));
        values.push(Value::Integer(i64::from(window.day_of_week)));
        values.push(Value::Text(fmt_time(window.start)));
        values.push(Value::Text(fmt_time(window.end)));
        values.push(Value::Integer(window.minutes()));
    }
    if fields.is_empty() {
        return Ok(current);
    }
    fields.push("updated_at = ?");
    values.push(Value::Text(fmt_stamp(now)));
    values.push(Value::Text(tenant_id.to_string()));
    values.push(Value::Text(lesson_id.to_string()));
    let sql = format!(
        "UPDATE lessons SET {} WHERE tenant_id = ? AND id = ?",
        fields.join(", ")
    );
    conn.execute(&sql, params_from_iter(values))?;
    tracing::info!(tenant = tenant_id, lesson = lesson_id, placement_changed, "lesson updated");
    repo::load_lesson(conn, tenant_id, lesson_id)
}

/// Removes a lesson that never had enrollments or bookings; otherwise only
/// clears its active flag so history stays intact. Returns true on hard delete.
pub fn deactivate_lesson(conn: &Connection, tenant_id: &str, lesson_id: &str, now: NaiveDateTime) -> SchedResult<bool> {
    repo::load_lesson(conn, tenant_id, lesson_id)?;
    let history: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM enrollments WHERE tenant_id = ?1 AND lesson_id = ?2)
              + (SELECT COUNT(*) FROM individual_bookings WHERE tenant_id = ?1 AND lesson_id = ?2)",
        params![tenant_id, lesson_id],
        |r| r.get(0),
    )?;
    let tx = conn.unchecked_transaction()?;
    let deleted = if history == 0 {
        tx.execute(
            "DELETE FROM hybrid_patterns WHERE tenant_id = ? AND lesson_id = ?",
            params![tenant_id, lesson_id],
        )?;
        tx.execute(
            "DELETE FROM lessons WHERE tenant_id = ? AND id = ?",
            params![tenant_id, lesson_id],
        )?;
        true
    } else {
        tx.execute(
            "UPDATE lessons SET active = 0, updated_at = ? WHERE tenant_id = ? AND id = ?",
            params![fmt_stamp(now), tenant_id, lesson_id],
        )?;
        false
    };
    tx.commit()?;
    tracing::info!(tenant = tenant_id, lesson = lesson_id, deleted, "lesson deactivated");
    Ok(deleted)
}
