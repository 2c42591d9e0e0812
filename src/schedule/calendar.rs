//! Projection of recurring lessons, hybrid patterns and bookings onto dated
//! calendar events. Recurrence is expanded per request and never stored.

use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::error::{SchedError, SchedResult};
use super::hybrid::{classify_week, date_for_week};
use super::model::{hhmm, weekday_index, ymd, Booking, BookingStatus, HybridPattern, Lesson, LessonCategory, Term, WeekKind};
use super::repo;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEvent {
    pub lesson_id: String,
    pub lesson_name: String,
    pub category: LessonCategory,
    pub teacher_id: String,
    pub room_id: String,
    pub week_number: u32,
    #[serde(with = "ymd")]
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub enrolled_count: i64,
    pub student_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub booking_id: String,
    pub lesson_id: String,
    pub lesson_name: String,
    pub student_id: String,
    pub week_number: u32,
    #[serde(with = "ymd")]
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: BookingStatus,
}

/// An individual week the student has not booked yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderEvent {
    pub lesson_id: String,
    pub lesson_name: String,
    pub student_id: String,
    pub week_number: u32,
    #[serde(with = "ymd")]
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub label: &'static str,
    pub booking_open: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarEvent {
    Group(GroupEvent),
    IndividualBooking(BookingEvent),
    Placeholder(PlaceholderEvent),
}

impl CalendarEvent {
    fn sort_key(&self) -> (NaiveDate, NaiveTime, &str, &str) {
        match self {
            CalendarEvent::Group(e) => (e.date, e.start_time, e.lesson_id.as_str(), e.student_id.as_str()),
            CalendarEvent::IndividualBooking(e) => (e.date, e.start_time, e.lesson_id.as_str(), e.student_id.as_str()),
            CalendarEvent::Placeholder(e) => (e.date, e.start_time, e.lesson_id.as_str(), e.student_id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CalendarFilter {
    pub term_id: Option<String>,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct CalendarRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<CalendarEvent>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Validates a requested range against the configured cap (inclusive day count).
pub fn check_range(range: &CalendarRange, max_range_days: i64) -> SchedResult<()> {
    if range.from > range.to {
        return Err(SchedError::BadParams("from must not be after to".into()));
    }
    let days = (range.to - range.from).num_days() + 1;
    if days > max_range_days {
        return Err(SchedError::BadParams(format!(
            "date range spans {} days; at most {} allowed",
            days, max_range_days
        )));
    }
    Ok(())
}

/// `(week number, date)` of every session of a weekly lesson that falls inside
/// both the term and `range`. Lazy; stops once a week starts after the range.
pub fn lesson_weeks(term: &Term, day_of_week: u8, range: CalendarRange) -> impl Iterator<Item = (u32, NaiveDate)> + '_ {
    let limit = term.end_date.min(range.to);
    (1..=term.total_weeks)
        .map(move |w| (w, date_for_week(term.start_date, w, day_of_week)))
        .take_while(move |(_, date)| {
            let week_start = *date - Duration::days(i64::from(weekday_index(*date)));
            week_start <= limit
        })
        .filter(move |(_, date)| term.contains(*date) && range.from <= *date && *date <= range.to)
}

/// How a lesson behaves in a given week.
fn week_kind(lesson: &Lesson, pattern: Option<&HybridPattern>, week: u32) -> WeekKind {
    match (lesson.category, pattern) {
        (LessonCategory::Hybrid, Some(p)) => classify_week(p, week),
        // An unconfigured hybrid lesson has nothing to show yet.
        (LessonCategory::Hybrid, None) => WeekKind::Unscheduled,
        _ => WeekKind::Group,
    }
}

struct LessonPlan {
    lesson: Lesson,
    term: Term,
    pattern: Option<HybridPattern>,
    enrolled: i64,
}

fn plan_lessons(conn: &Connection, tenant_id: &str, lessons: Vec<Lesson>, filter: &CalendarFilter) -> SchedResult<Vec<LessonPlan>> {
    let mut terms: HashMap<String, Term> = HashMap::new();
    let mut plans = Vec::new();
    for lesson in lessons {
        if filter.term_id.as_deref().is_some_and(|t| t != lesson.term_id)
            || filter.teacher_id.as_deref().is_some_and(|t| t != lesson.teacher_id)
        {
            continue;
        }
        let term = match terms.get(&lesson.term_id) {
            Some(t) => t.clone(),
            None => {
                let t = repo::load_term(conn, tenant_id, &lesson.term_id)?;
                terms.insert(t.id.clone(), t.clone());
                t
            }
        };
        let pattern = if lesson.category == LessonCategory::Hybrid {
            repo::find_pattern(conn, tenant_id, &lesson.id)?
        } else {
            None
        };
        let enrolled = repo::count_active_enrollments(conn, tenant_id, &lesson.id)?;
        plans.push(LessonPlan {
            lesson,
            term,
            pattern,
            enrolled,
        });
    }
    Ok(plans)
}

fn group_event(plan: &LessonPlan, week: u32, date: NaiveDate, student_id: &str) -> CalendarEvent {
    CalendarEvent::Group(GroupEvent {
        lesson_id: plan.lesson.id.clone(),
        lesson_name: plan.lesson.name.clone(),
        category: plan.lesson.category,
        teacher_id: plan.lesson.teacher_id.clone(),
        room_id: plan.lesson.room_id.clone(),
        week_number: week,
        date,
        start_time: plan.lesson.start_time,
        end_time: plan.lesson.end_time,
        enrolled_count: plan.enrolled,
        student_id: student_id.to_string(),
    })
}

fn booking_event(b: &Booking, lesson_name: &str) -> CalendarEvent {
    CalendarEvent::IndividualBooking(BookingEvent {
        booking_id: b.id.clone(),
        lesson_id: b.lesson_id.clone(),
        lesson_name: lesson_name.to_string(),
        student_id: b.student_id.clone(),
        week_number: b.week_number,
        date: b.scheduled_date,
        start_time: b.start_time,
        end_time: b.end_time,
        status: b.status,
    })
}

fn paginate(mut events: Vec<CalendarEvent>, page: PageRequest) -> SchedResult<EventPage> {
    if page.page == 0 || page.page_size == 0 {
        return Err(SchedError::BadParams("page and pageSize must be >= 1".into()));
    }
    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    let total = events.len();
    let total_pages = total.div_ceil(page.page_size);
    let skip = (page.page - 1).saturating_mul(page.page_size);
    let events = events.into_iter().skip(skip).take(page.page_size).collect();
    Ok(EventPage {
        events,
        page: page.page,
        page_size: page.page_size,
        total,
        total_pages,
    })
}

/// (student, week) pairs holding a non-cancelled booking for the lesson.
fn booked_weeks(conn: &Connection, tenant_id: &str, plan: &LessonPlan) -> SchedResult<Vec<(String, u32)>> {
    if plan.pattern.is_none() {
        return Ok(Vec::new());
    }
    Ok(repo::list_bookings(conn, tenant_id, Some(&plan.lesson.id), None, None)?
        .into_iter()
        .filter(|b| b.status != BookingStatus::Cancelled)
        .map(|b| (b.student_id, b.week_number))
        .collect())
}

/// One event per (week, student): GROUP for group weeks and PLACEHOLDER for
/// individual weeks the student has not booked. Booked weeks are covered by
/// the booking events.
fn student_events(
    plan: &LessonPlan,
    student_id: &str,
    booked: &[(String, u32)],
    range: CalendarRange,
    events: &mut Vec<CalendarEvent>,
) {
    let booked: BTreeSet<u32> = booked
        .iter()
        .filter(|(s, _)| s == student_id)
        .map(|(_, w)| *w)
        .collect();
    for (week, date) in lesson_weeks(&plan.term, plan.lesson.day_of_week, range) {
        match week_kind(&plan.lesson, plan.pattern.as_ref(), week) {
            WeekKind::Group => events.push(group_event(plan, week, date, student_id)),
            WeekKind::Individual if !booked.contains(&week) => {
                events.push(CalendarEvent::Placeholder(PlaceholderEvent {
                    lesson_id: plan.lesson.id.clone(),
                    lesson_name: plan.lesson.name.clone(),
                    student_id: student_id.to_string(),
                    week_number: week,
                    date,
                    start_time: plan.lesson.start_time,
                    end_time: plan.lesson.end_time,
                    label: "book individual session",
                    booking_open: plan.pattern.as_ref().is_some_and(|p| p.booking_open),
                }))
            }
            WeekKind::Individual | WeekKind::Unscheduled => {}
        }
    }
}

/// Administrator and teacher view: per-student events for every active
/// enrollment of the selected lessons, plus one INDIVIDUAL_BOOKING event per
/// held booking.
pub fn staff_events(
    conn: &Connection,
    tenant_id: &str,
    filter: &CalendarFilter,
    range: CalendarRange,
    page: PageRequest,
    max_range_days: i64,
) -> SchedResult<EventPage> {
    check_range(&range, max_range_days)?;
    let lessons = repo::list_lessons(
        conn,
        tenant_id,
        filter.term_id.as_deref(),
        filter.teacher_id.as_deref(),
        false,
    )?;
    let plans = plan_lessons(conn, tenant_id, lessons, filter)?;

    let mut events = Vec::new();
    for plan in &plans {
        let booked = booked_weeks(conn, tenant_id, plan)?;
        for enrollment in repo::active_enrollments(conn, tenant_id, &plan.lesson.id)? {
            student_events(plan, &enrollment.student_id, &booked, range, &mut events);
        }
    }
    let names: HashMap<&str, &str> = plans
        .iter()
        .map(|p| (p.lesson.id.as_str(), p.lesson.name.as_str()))
        .collect();
    for b in repo::held_bookings_between(conn, tenant_id, range.from, range.to)? {
        if let Some(name) = names.get(b.lesson_id.as_str()) {
            events.push(booking_event(&b, name));
        }
    }
    tracing::debug!(tenant = tenant_id, events = events.len(), "projected staff calendar");
    paginate(events, page)
}

/// Parent view: the same per-student events, limited to the family's
/// students and their bookings.
pub fn parent_events(
    conn: &Connection,
    tenant_id: &str,
    parent_id: &str,
    filter: &CalendarFilter,
    range: CalendarRange,
    page: PageRequest,
    max_range_days: i64,
) -> SchedResult<EventPage> {
    check_range(&range, max_range_days)?;
    let students = repo::family_students(conn, tenant_id, parent_id)?;

    let mut events = Vec::new();
    let mut names: HashMap<String, String> = HashMap::new();
    for student_id in &students {
        let lessons = repo::lessons_for_student(conn, tenant_id, student_id)?;
        for plan in plan_lessons(conn, tenant_id, lessons, filter)? {
            let booked = booked_weeks(conn, tenant_id, &plan)?;
            student_events(&plan, student_id, &booked, range, &mut events);
            names.insert(plan.lesson.id.clone(), plan.lesson.name.clone());
        }
    }

    let family: BTreeSet<&str> = students.iter().map(String::as_str).collect();
    for b in repo::held_bookings_between(conn, tenant_id, range.from, range.to)? {
        if !family.contains(b.student_id.as_str()) {
            continue;
        }
        if let Some(name) = names.get(&b.lesson_id) {
            events.push(booking_event(&b, name));
        }
    }
    tracing::debug!(tenant = tenant_id, parent = parent_id, events = events.len(), "projected parent calendar");
    paginate(events, page)
}
