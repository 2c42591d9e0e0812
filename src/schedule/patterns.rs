use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

use super::error::{SchedError, SchedResult};
use super::hybrid::{alternating_weeks, validate_week_sets};
use super::model::{fmt_stamp, HybridPattern, LessonCategory, PatternKind};
use super::repo;

#[derive(Debug, Clone)]
pub struct PatternInput {
    pub kind: PatternKind,
    pub group_weeks: Option<BTreeSet<u32>>,
    pub individual_weeks: Option<BTreeSet<u32>>,
    /// ALTERNATING only: first individual week when explicit sets are absent.
    pub first_individual_week: Option<u32>,
    pub slot_duration_minutes: Option<i64>,
    pub booking_deadline_hours: Option<i64>,
    pub booking_open: Option<bool>,
}

/// Two weeks.
pub const MAX_BOOKING_DEADLINE_HOURS: i64 = 336;

/// Values used when the caller leaves a pattern setting out.
#[derive(Debug, Clone, Copy)]
pub struct PatternDefaults {
    pub slot_duration_minutes: i64,
    pub booking_deadline_hours: i64,
}

fn weeks_json(weeks: &BTreeSet<u32>) -> String {
    serde_json::to_string(weeks).unwrap_or_else(|_| "[]".to_string())
}

pub fn upsert_pattern(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    input: &PatternInput,
    defaults: PatternDefaults,
    now: NaiveDateTime,
) -> SchedResult<HybridPattern> {
    let lesson = repo::load_lesson(conn, tenant_id, lesson_id)?;
    if lesson.category != LessonCategory::Hybrid {
        return Err(SchedError::BadParams(
            "week patterns can only be attached to HYBRID lessons".into(),
        ));
    }
    let term = repo::load_term(conn, tenant_id, &lesson.term_id)?;
    let existing = repo::find_pattern(conn, tenant_id, lesson_id)?;

    let (group_weeks, individual_weeks) = match (&input.group_weeks, &input.individual_weeks) {
        (Some(g), Some(i)) => (g.clone(), i.clone()),
        (None, None) if input.kind == PatternKind::Alternating => {
            alternating_weeks(term.total_weeks, input.first_individual_week.unwrap_or(2))
        }
        _ => {
            return Err(SchedError::BadParams(
                "groupWeeks and individualWeeks must be provided together".into(),
            ))
        }
    };
    validate_week_sets(&group_weeks, &individual_weeks, term.total_weeks)?;

    let slot_duration_minutes = input
        .slot_duration_minutes
        .or(existing.as_ref().map(|p| p.slot_duration_minutes))
        .unwrap_or(defaults.slot_duration_minutes);
    if slot_duration_minutes <= 0 || slot_duration_minutes > lesson.duration_minutes {
        return Err(SchedError::BadParams(format!(
            "individualSlotDuration must be in 1..={} minutes",
            lesson.duration_minutes
        )));
    }
    let booking_deadline_hours = input
        .booking_deadline_hours
        .or(existing.as_ref().map(|p| p.booking_deadline_hours))
        .unwrap_or(defaults.booking_deadline_hours);
    if !(0..=MAX_BOOKING_DEADLINE_HOURS).contains(&booking_deadline_hours) {
        return Err(SchedError::BadParams(format!(
            "bookingDeadlineHours must be in 0..={}",
            MAX_BOOKING_DEADLINE_HOURS
        )));
    }
    let booking_open = input
        .booking_open
        .or(existing.as_ref().map(|p| p.booking_open))
        .unwrap_or(true);

    // Live bookings pin their week to INDIVIDUAL.
    let live = repo::list_bookings(conn, tenant_id, Some(lesson_id), None, None)?;
    if let Some(b) = live
        .iter()
        .find(|b| !b.status.is_terminal() && !individual_weeks.contains(&b.week_number))
    {
        return Err(SchedError::conflict(format!(
            "week {} has active individual bookings and must stay an individual week",
            b.week_number
        )));
    }

    conn.execute(
        "INSERT INTO hybrid_patterns(
            lesson_id, tenant_id, term_id, kind, group_weeks_json, individual_weeks_json,
            slot_duration_minutes, booking_deadline_hours, booking_open, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(lesson_id) DO UPDATE SET
            term_id = excluded.term_id,
            kind = excluded.kind,
            group_weeks_json = excluded.group_weeks_json,
            individual_weeks_json = excluded.individual_weeks_json,
            slot_duration_minutes = excluded.slot_duration_minutes,
            booking_deadline_hours = excluded.booking_deadline_hours,
            booking_open = excluded.booking_open,
            updated_at = excluded.updated_at",
        params![
            lesson_id,
            tenant_id,
            term.id,
            input.kind.as_str(),
            weeks_json(&group_weeks),
            weeks_json(&individual_weeks),
            slot_duration_minutes,
            booking_deadline_hours,
            if booking_open { 1 } else { 0 },
            fmt_stamp(now)
        ],
    )?;
    tracing::info!(
        tenant = tenant_id,
        lesson = lesson_id,
        kind = input.kind.as_str(),
        individual_weeks = individual_weeks.len(),
        "hybrid pattern saved"
    );
    repo::find_pattern(conn, tenant_id, lesson_id)?
        .ok_or_else(|| SchedError::Internal("pattern vanished after write".into()))
}

pub fn load_pattern(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<HybridPattern> {
    repo::load_lesson(conn, tenant_id, lesson_id)?;
    repo::find_pattern(conn, tenant_id, lesson_id)?
        .ok_or_else(|| SchedError::NotFound("lesson has no hybrid pattern".into()))
}

pub fn set_booking_open(
    conn: &Connection,
    tenant_id: &str,
    lesson_id: &str,
    open: bool,
    now: NaiveDateTime,
) -> SchedResult<HybridPattern> {
    load_pattern(conn, tenant_id, lesson_id)?;
    conn.execute(
        "UPDATE hybrid_patterns SET booking_open = ?, updated_at = ? WHERE tenant_id = ? AND lesson_id = ?",
        params![if open { 1 } else { 0 }, fmt_stamp(now), tenant_id, lesson_id],
    )?;
    load_pattern(conn, tenant_id, lesson_id)
}
