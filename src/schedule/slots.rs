use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use super::error::{SchedError, SchedResult};
use super::hybrid::{classify_week, date_for_week};
use super::model::{hhmm, ymd, HybridPattern, Lesson, LessonCategory, Term, WeekKind};
use super::repo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(with = "ymd")]
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub is_available: bool,
}

/// Consecutive full-length sub-windows of `[start, end)`. A remainder shorter
/// than one slot is not offered.
pub fn partition_window(start: NaiveTime, end: NaiveTime, slot_minutes: i64) -> Vec<(NaiveTime, NaiveTime)> {
    let mut out = Vec::new();
    if slot_minutes <= 0 || start >= end {
        return out;
    }
    let step = Duration::minutes(slot_minutes);
    let mut cursor = start;
    while end - cursor >= step {
        let next = cursor + step;
        out.push((cursor, next));
        cursor = next;
    }
    out
}

/// Everything the slot and booking paths need about a hybrid lesson, loaded once.
pub(crate) struct HybridContext {
    pub lesson: Lesson,
    pub pattern: HybridPattern,
    pub term: Term,
}

pub(crate) fn load_hybrid_context(conn: &Connection, tenant_id: &str, lesson_id: &str) -> SchedResult<HybridContext> {
    let lesson = repo::load_lesson(conn, tenant_id, lesson_id)?;
    if lesson.category != LessonCategory::Hybrid {
        return Err(SchedError::InvalidWeek(
            "lesson is not a hybrid lesson; not an individual booking week".into(),
        ));
    }
    let Some(pattern) = repo::find_pattern(conn, tenant_id, lesson_id)? else {
        return Err(SchedError::InvalidWeek(
            "hybrid lesson has no week pattern; not an individual booking week".into(),
        ));
    };
    let term = repo::load_term(conn, tenant_id, &pattern.term_id)?;
    Ok(HybridContext {
        lesson,
        pattern,
        term,
    })
}

impl HybridContext {
    pub fn require_individual_week(&self, week_number: u32) -> SchedResult<()> {
        match classify_week(&self.pattern, week_number) {
            WeekKind::Individual => Ok(()),
            WeekKind::Group => Err(SchedError::InvalidWeek(format!(
                "week {} is a group week, not an individual booking week",
                week_number
            ))),
            WeekKind::Unscheduled => Err(SchedError::InvalidWeek(format!(
                "week {} is not scheduled; not an individual booking week",
                week_number
            ))),
        }
    }

    pub fn date_for(&self, week_number: u32) -> NaiveDate {
        date_for_week(self.term.start_date, week_number, self.lesson.day_of_week)
    }

    /// Slot list for a week, treating `ignore_booking_id` as if it did not exist.
    pub fn slots(
        &self,
        conn: &Connection,
        tenant_id: &str,
        week_number: u32,
        ignore_booking_id: Option<&str>,
    ) -> SchedResult<Vec<Slot>> {
        let date = self.date_for(week_number);
        let taken = repo::live_bookings_for_week(conn, tenant_id, &self.lesson.id, week_number)?;
        let slots = partition_window(
            self.lesson.start_time,
            self.lesson.end_time,
            self.pattern.slot_duration_minutes,
        )
        .into_iter()
        .map(|(start_time, end_time)| {
            let occupied = taken.iter().any(|b| {
                Some(b.id.as_str()) != ignore_booking_id
                    && b.start_time == start_time
                    && b.end_time == end_time
            });
            Slot {
                date,
                start_time,
                end_time,
                is_available: !occupied,
            }
        })
        .collect();
        Ok(slots)
    }
}

/// Bookable windows of an individual week of a hybrid lesson.
pub fn available_slots(conn: &Connection, tenant_id: &str, lesson_id: &str, week_number: u32) -> SchedResult<Vec<Slot>> {
    let ctx = load_hybrid_context(conn, tenant_id, lesson_id)?;
    ctx.require_individual_week(week_number)?;
    ctx.slots(conn, tenant_id, week_number, None)
}
