use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use super::error::{classify_booking_write, SchedError, SchedResult};
use super::model::{fmt_date, fmt_stamp, fmt_time, Booking, BookingStatus};
use super::repo;
use super::slots::{load_hybrid_context, HybridContext};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub lesson_id: String,
    pub student_id: String,
    pub week_number: u32,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy)]
pub struct NewTime {
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub lesson_id: Option<String>,
    pub week_number: Option<u32>,
    pub parent_id: Option<String>,
}

/// Rejects anything that starts within `deadline_hours` of `now`, including
/// sessions that already started.
pub fn check_deadline(deadline_hours: i64, date: NaiveDate, start: NaiveTime, now: NaiveDateTime) -> SchedResult<()> {
    let deadline = Duration::try_hours(deadline_hours)
        .ok_or_else(|| SchedError::BadParams(format!("bookingDeadlineHours {} is out of range", deadline_hours)))?;
    let starts_at = date.and_time(start);
    if starts_at - now <= deadline {
        return Err(SchedError::DeadlineExceeded(format!(
            "must book at least {} hours in advance",
            deadline_hours
        )));
    }
    Ok(())
}

fn ensure_own_child(conn: &Connection, tenant_id: &str, parent_id: &str, student_id: &str) -> SchedResult<()> {
    let parent_family = repo::parent_family_id(conn, tenant_id, parent_id)?;
    let student_family = repo::student_family_id(conn, tenant_id, student_id)?;
    match (parent_family, student_family) {
        (Some(p), Some(s)) if p == s => Ok(()),
        _ => Err(SchedError::Forbidden(
            "parents can book for their own children only".into(),
        )),
    }
}

/// Steps shared by create and reschedule once the week is known: the date has
/// to be the computed one and the start has to clear the deadline.
fn check_timing(ctx: &HybridContext, week_number: u32, t: &NewTime, now: NaiveDateTime) -> SchedResult<()> {
    let expected = ctx.date_for(week_number);
    if t.scheduled_date != expected {
        return Err(SchedError::DateMismatch(format!(
            "week {} of this lesson falls on {}, not {}",
            week_number,
            fmt_date(expected),
            fmt_date(t.scheduled_date)
        )));
    }
    check_deadline(ctx.pattern.booking_deadline_hours, t.scheduled_date, t.start_time, now)
}

/// Duplicate and occupancy checks. Must run inside the write transaction.
fn check_capacity(
    tx: &Transaction<'_>,
    tenant_id: &str,
    ctx: &HybridContext,
    student_id: &str,
    week_number: u32,
    t: &NewTime,
    moving_booking_id: Option<&str>,
) -> SchedResult<()> {
    let live = repo::live_bookings_for_week(tx, tenant_id, &ctx.lesson.id, week_number)?;
    if live
        .iter()
        .any(|b| b.student_id == student_id && Some(b.id.as_str()) != moving_booking_id)
    {
        return Err(SchedError::conflict("student already has a booking for this week"));
    }
    let slots = ctx.slots(tx, tenant_id, week_number, moving_booking_id)?;
    let free = slots
        .iter()
        .any(|s| s.is_available && s.start_time == t.start_time && s.end_time == t.end_time);
    if !free {
        return Err(SchedError::SlotUnavailable(format!(
            "{}-{} on {} is not an available slot",
            fmt_time(t.start_time),
            fmt_time(t.end_time),
            fmt_date(t.scheduled_date)
        )));
    }
    Ok(())
}

pub fn create_booking(
    conn: &Connection,
    tenant_id: &str,
    parent_id: &str,
    req: &BookingRequest,
    now: NaiveDateTime,
) -> SchedResult<Booking> {
    ensure_own_child(conn, tenant_id, parent_id, &req.student_id)?;
    let ctx = load_hybrid_context(conn, tenant_id, &req.lesson_id)?;
    if !repo::is_actively_enrolled(conn, tenant_id, &req.lesson_id, &req.student_id)? {
        return Err(SchedError::Forbidden("student is not enrolled in this lesson".into()));
    }
    if !ctx.pattern.booking_open {
        return Err(SchedError::Forbidden("booking is closed for this lesson".into()));
    }
    ctx.require_individual_week(req.week_number)?;
    let when = NewTime {
        scheduled_date: req.scheduled_date,
        start_time: req.start_time,
        end_time: req.end_time,
    };
    check_timing(&ctx, req.week_number, &when, now)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    check_capacity(&tx, tenant_id, &ctx, &req.student_id, req.week_number, &when, None)?;
    let id = Uuid::new_v4().to_string();
    let ts = fmt_stamp(now);
    tx.execute(
        "INSERT INTO individual_bookings(
            id, tenant_id, lesson_id, student_id, parent_id, week_number, scheduled_date,
            start_time, end_time, status, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            tenant_id,
            req.lesson_id,
            req.student_id,
            parent_id,
            i64::from(req.week_number),
            fmt_date(req.scheduled_date),
            fmt_time(req.start_time),
            fmt_time(req.end_time),
            BookingStatus::Confirmed.as_str(),
            ts,
            ts
        ],
    )
    .map_err(classify_booking_write)?;
    tx.commit().map_err(classify_booking_write)?;

    tracing::info!(
        tenant = tenant_id,
        booking = %id,
        lesson = %req.lesson_id,
        student = %req.student_id,
        week = req.week_number,
        "individual booking confirmed"
    );
    load_booking(conn, tenant_id, &id)
}

fn load_booking(conn: &Connection, tenant_id: &str, booking_id: &str) -> SchedResult<Booking> {
    repo::find_booking(conn, tenant_id, booking_id)?
        .ok_or_else(|| SchedError::NotFound("booking not found".into()))
}

/// Moves a booking within its own week. Student and week number never change.
pub fn reschedule_booking(
    conn: &Connection,
    tenant_id: &str,
    parent_id: &str,
    booking_id: &str,
    when: &NewTime,
    now: NaiveDateTime,
) -> SchedResult<Booking> {
    let booking = load_booking(conn, tenant_id, booking_id)?;
    if booking.parent_id != parent_id {
        return Err(SchedError::Forbidden("only the parent who booked can reschedule".into()));
    }
    if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
        return Err(SchedError::conflict(format!(
            "a {} booking cannot be rescheduled",
            booking.status.as_str()
        )));
    }
    let ctx = load_hybrid_context(conn, tenant_id, &booking.lesson_id)?;
    ctx.require_individual_week(booking.week_number)?;
    check_timing(&ctx, booking.week_number, when, now)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    check_capacity(
        &tx,
        tenant_id,
        &ctx,
        &booking.student_id,
        booking.week_number,
        when,
        Some(booking_id),
    )?;
    tx.execute(
        "UPDATE individual_bookings
         SET scheduled_date = ?, start_time = ?, end_time = ?, updated_at = ?
         WHERE tenant_id = ? AND id = ?",
        params![
            fmt_date(when.scheduled_date),
            fmt_time(when.start_time),
            fmt_time(when.end_time),
            fmt_stamp(now),
            tenant_id,
            booking_id
        ],
    )
    .map_err(classify_booking_write)?;
    tx.commit().map_err(classify_booking_write)?;

    tracing::info!(
        tenant = tenant_id,
        booking = booking_id,
        from = %fmt_time(booking.start_time),
        to = %fmt_time(when.start_time),
        "individual booking rescheduled"
    );
    load_booking(conn, tenant_id, booking_id)
}

fn transition(
    conn: &Connection,
    tenant_id: &str,
    booking: &Booking,
    next: BookingStatus,
    reason: Option<&str>,
    now: NaiveDateTime,
) -> SchedResult<Booking> {
    if !booking.status.can_transition_to(next) {
        return Err(SchedError::conflict(format!(
            "booking is {} and cannot become {}",
            booking.status.as_str(),
            next.as_str()
        )));
    }
    // The status guard in WHERE keeps a concurrent transition from being overwritten.
    let changed = conn.execute(
        "UPDATE individual_bookings
         SET status = ?, cancellation_reason = COALESCE(?, cancellation_reason), updated_at = ?
         WHERE tenant_id = ? AND id = ? AND status = ?",
        params![
            next.as_str(),
            reason,
            fmt_stamp(now),
            tenant_id,
            booking.id,
            booking.status.as_str()
        ],
    )?;
    if changed == 0 {
        return Err(SchedError::conflict("booking changed concurrently; reload and retry"));
    }
    tracing::info!(
        tenant = tenant_id,
        booking = %booking.id,
        from = booking.status.as_str(),
        to = next.as_str(),
        "booking status changed"
    );
    load_booking(conn, tenant_id, &booking.id)
}

/// Cancels a booking. The booking's author or any guardian of the student may
/// cancel; the slot becomes bookable again immediately.
pub fn cancel_booking(
    conn: &Connection,
    tenant_id: &str,
    parent_id: &str,
    booking_id: &str,
    reason: Option<&str>,
    now: NaiveDateTime,
) -> SchedResult<Booking> {
    let booking = load_booking(conn, tenant_id, booking_id)?;
    if booking.parent_id != parent_id {
        ensure_own_child(conn, tenant_id, parent_id, &booking.student_id).map_err(|_| {
            SchedError::Forbidden("only the student's guardians can cancel this booking".into())
        })?;
    }
    transition(conn, tenant_id, &booking, BookingStatus::Cancelled, reason, now)
}

/// Records how a session went. Only meaningful once it has started.
pub fn mark_outcome(
    conn: &Connection,
    tenant_id: &str,
    booking_id: &str,
    outcome: BookingStatus,
    now: NaiveDateTime,
) -> SchedResult<Booking> {
    if !matches!(outcome, BookingStatus::Completed | BookingStatus::NoShow) {
        return Err(SchedError::BadParams("outcome must be COMPLETED or NO_SHOW".into()));
    }
    let booking = load_booking(conn, tenant_id, booking_id)?;
    if booking.scheduled_date.and_time(booking.start_time) > now {
        return Err(SchedError::conflict("session has not started yet"));
    }
    transition(conn, tenant_id, &booking, outcome, None, now)
}

pub fn list_bookings(conn: &Connection, tenant_id: &str, filter: &BookingFilter) -> SchedResult<Vec<Booking>> {
    repo::list_bookings(
        conn,
        tenant_id,
        filter.lesson_id.as_deref(),
        filter.week_number,
        filter.parent_id.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::slots::available_slots;
    use crate::schedule::testutil::{at, d, now, seed, t, Fixture};

    const WEEK4: (i32, u32, u32) = (2030, 1, 29);

    fn req(fx: &Fixture, student: &str, start: NaiveTime, end: NaiveTime) -> BookingRequest {
        BookingRequest {
            lesson_id: fx.hybrid_lesson.clone(),
            student_id: student.to_string(),
            week_number: 4,
            scheduled_date: d(WEEK4.0, WEEK4.1, WEEK4.2),
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn booking_confirms_and_occupies_its_slot_only() {
        let fx = seed();
        let b = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.week_number, 4);

        let slots = available_slots(&fx.conn, &fx.tenant, &fx.hybrid_lesson, 4).expect("slots");
        assert!(!slots[0].is_available);
        assert!(slots[1].is_available);
    }

    #[test]
    fn second_booking_for_same_student_week_conflicts_in_either_order() {
        for first in [(9, 0), (9, 30)] {
            let fx = seed();
            let second = if first == (9, 0) { (9, 30) } else { (9, 0) };
            let f = t(first.0, first.1);
            let s = t(second.0, second.1);
            create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, f, f + Duration::minutes(30)), now())
                .expect("first");
            let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, s, s + Duration::minutes(30)), now());
            assert!(matches!(r, Err(SchedError::Conflict { .. })), "got {:?}", r);
        }
    }

    #[test]
    fn taken_slot_is_unavailable_to_another_family() {
        let fx = seed();
        create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("first");
        let r = create_booking(
            &fx.conn,
            &fx.tenant,
            &fx.other_parent,
            &req(&fx, &fx.other_student, t(9, 0), t(9, 30)),
            now(),
        );
        assert!(matches!(r, Err(SchedError::SlotUnavailable(_))));
    }

    #[test]
    fn window_must_match_a_generated_slot() {
        let fx = seed();
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 15), t(9, 45)), now());
        assert!(matches!(r, Err(SchedError::SlotUnavailable(_))));
    }

    #[test]
    fn parents_cannot_book_other_families_children() {
        let fx = seed();
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.other_student, t(9, 0), t(9, 30)), now());
        assert!(matches!(r, Err(SchedError::Forbidden(_))));
    }

    #[test]
    fn unenrolled_child_and_closed_booking_are_forbidden() {
        let fx = seed();
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.sibling, t(9, 0), t(9, 30)), now());
        assert!(matches!(r, Err(SchedError::Forbidden(_))));

        crate::schedule::patterns::set_booking_open(&fx.conn, &fx.tenant, &fx.hybrid_lesson, false, now())
            .expect("close");
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now());
        assert!(matches!(r, Err(SchedError::Forbidden(_))));
    }

    #[test]
    fn group_week_and_wrong_date_are_rejected() {
        let fx = seed();
        let mut group_week = req(&fx, &fx.student, t(9, 0), t(9, 30));
        group_week.week_number = 3;
        group_week.scheduled_date = d(2030, 1, 22);
        assert!(matches!(
            create_booking(&fx.conn, &fx.tenant, &fx.parent, &group_week, now()),
            Err(SchedError::InvalidWeek(_))
        ));

        let mut wrong_day = req(&fx, &fx.student, t(9, 0), t(9, 30));
        wrong_day.scheduled_date = d(2030, 1, 30);
        assert!(matches!(
            create_booking(&fx.conn, &fx.tenant, &fx.parent, &wrong_day, now()),
            Err(SchedError::DateMismatch(_))
        ));
    }

    #[test]
    fn deadline_boundary_is_exclusive() {
        let fx = seed();
        // Slot starts 2030-01-29 09:00; the pattern demands 24 hours notice.
        let exactly_at_deadline = at(2030, 1, 28, 9, 0);
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), exactly_at_deadline);
        assert!(matches!(r, Err(SchedError::DeadlineExceeded(_))));

        let inside = at(2030, 1, 28, 20, 0);
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), inside);
        assert!(matches!(r, Err(SchedError::DeadlineExceeded(_))));

        let just_outside = at(2030, 1, 28, 8, 59);
        create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), just_outside)
            .expect("one minute before the deadline is fine");
    }

    #[test]
    fn deadline_check_in_isolation() {
        let date = d(2030, 3, 1);
        for hours in [0, 1, 24, 48] {
            let start = date.and_time(t(10, 0));
            assert!(check_deadline(hours, date, t(10, 0), start - Duration::hours(hours)).is_err());
            assert!(check_deadline(hours, date, t(10, 0), start - Duration::hours(hours) - Duration::seconds(1)).is_ok());
        }
    }

    #[test]
    fn oversized_deadline_is_an_error_not_a_panic() {
        let date = d(2030, 3, 1);
        let r = check_deadline(9_000_000_000_000, date, t(10, 0), at(2030, 1, 1, 0, 0));
        assert!(matches!(r, Err(SchedError::BadParams(_))));

        // A row written around the pattern validation still fails cleanly.
        let fx = seed();
        fx.conn
            .execute(
                "UPDATE hybrid_patterns SET booking_deadline_hours = 9000000000000 WHERE lesson_id = ?",
                [&fx.hybrid_lesson],
            )
            .expect("update");
        let r = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now());
        assert!(matches!(r, Err(SchedError::BadParams(_))));
    }

    #[test]
    fn cancel_frees_the_slot_for_rebooking() {
        let fx = seed();
        let b = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        let c = cancel_booking(&fx.conn, &fx.tenant, &fx.parent, &b.id, Some("sick"), now()).expect("cancel");
        assert_eq!(c.status, BookingStatus::Cancelled);
        assert_eq!(c.cancellation_reason.as_deref(), Some("sick"));

        let slots = available_slots(&fx.conn, &fx.tenant, &fx.hybrid_lesson, 4).expect("slots");
        assert!(slots.iter().all(|s| s.is_available));

        create_booking(
            &fx.conn,
            &fx.tenant,
            &fx.other_parent,
            &req(&fx, &fx.other_student, t(9, 0), t(9, 30)),
            now(),
        )
        .expect("slot reusable after cancel");
        create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 30), t(10, 0)), now())
            .expect("student may book again after cancelling");
    }

    #[test]
    fn cancel_rules() {
        let fx = seed();
        let b = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        assert!(matches!(
            cancel_booking(&fx.conn, &fx.tenant, &fx.other_parent, &b.id, None, now()),
            Err(SchedError::Forbidden(_))
        ));
        assert!(matches!(
            cancel_booking(&fx.conn, "other-tenant", &fx.parent, &b.id, None, now()),
            Err(SchedError::NotFound(_))
        ));
        cancel_booking(&fx.conn, &fx.tenant, &fx.parent, &b.id, None, now()).expect("cancel");
        assert!(matches!(
            cancel_booking(&fx.conn, &fx.tenant, &fx.parent, &b.id, None, now()),
            Err(SchedError::Conflict { .. })
        ));
    }

    #[test]
    fn reschedule_moves_within_the_week() {
        let fx = seed();
        let b = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        let when = NewTime {
            scheduled_date: d(WEEK4.0, WEEK4.1, WEEK4.2),
            start_time: t(9, 30),
            end_time: t(10, 0),
        };
        let moved = reschedule_booking(&fx.conn, &fx.tenant, &fx.parent, &b.id, &when, now()).expect("move");
        assert_eq!(moved.id, b.id);
        assert_eq!(moved.week_number, 4);
        assert_eq!(moved.start_time, t(9, 30));

        let slots = available_slots(&fx.conn, &fx.tenant, &fx.hybrid_lesson, 4).expect("slots");
        assert!(slots[0].is_available);
        assert!(!slots[1].is_available);

        // Staying put is allowed: the booking does not block itself.
        reschedule_booking(&fx.conn, &fx.tenant, &fx.parent, &b.id, &when, now()).expect("no-op move");
    }

    #[test]
    fn reschedule_rejections() {
        let fx = seed();
        let mine = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        create_booking(
            &fx.conn,
            &fx.tenant,
            &fx.other_parent,
            &req(&fx, &fx.other_student, t(9, 30), t(10, 0)),
            now(),
        )
        .expect("book other");

        let taken = NewTime {
            scheduled_date: d(WEEK4.0, WEEK4.1, WEEK4.2),
            start_time: t(9, 30),
            end_time: t(10, 0),
        };
        assert!(matches!(
            reschedule_booking(&fx.conn, &fx.tenant, &fx.parent, &mine.id, &taken, now()),
            Err(SchedError::SlotUnavailable(_))
        ));
        assert!(matches!(
            reschedule_booking(&fx.conn, &fx.tenant, &fx.other_parent, &mine.id, &taken, now()),
            Err(SchedError::Forbidden(_))
        ));
        let other_week_date = NewTime {
            scheduled_date: d(2030, 2, 26),
            start_time: t(9, 0),
            end_time: t(9, 30),
        };
        assert!(matches!(
            reschedule_booking(&fx.conn, &fx.tenant, &fx.parent, &mine.id, &other_week_date, now()),
            Err(SchedError::DateMismatch(_))
        ));
    }

    #[test]
    fn outcomes_follow_the_lifecycle() {
        let fx = seed();
        let b = create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        assert!(matches!(
            mark_outcome(&fx.conn, &fx.tenant, &b.id, BookingStatus::Completed, now()),
            Err(SchedError::Conflict { .. })
        ));
        let after = at(2030, 1, 29, 10, 0);
        let done = mark_outcome(&fx.conn, &fx.tenant, &b.id, BookingStatus::Completed, after).expect("complete");
        assert_eq!(done.status, BookingStatus::Completed);
        assert!(matches!(
            cancel_booking(&fx.conn, &fx.tenant, &fx.parent, &b.id, None, after),
            Err(SchedError::Conflict { .. })
        ));
        assert!(matches!(
            mark_outcome(&fx.conn, &fx.tenant, &b.id, BookingStatus::Cancelled, after),
            Err(SchedError::BadParams(_))
        ));
        // Completed sessions still occupy their slot.
        let slots = available_slots(&fx.conn, &fx.tenant, &fx.hybrid_lesson, 4).expect("slots");
        assert!(!slots[0].is_available);
    }

    #[test]
    fn storage_uniqueness_backs_up_the_checks() {
        let fx = seed();
        create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        // A writer that skipped the application checks still loses at the index.
        let dup_student = fx.conn.execute(
            "INSERT INTO individual_bookings(id, tenant_id, lesson_id, student_id, parent_id, week_number,
                scheduled_date, start_time, end_time, status, created_at)
             VALUES('raw-1', ?, ?, ?, ?, 4, '2030-01-29', '09:30', '10:00', 'CONFIRMED', 'x')",
            params![fx.tenant, fx.hybrid_lesson, fx.student, fx.parent],
        );
        assert!(matches!(
            dup_student.map_err(classify_booking_write),
            Err(SchedError::Conflict { .. })
        ));
        let dup_slot = fx.conn.execute(
            "INSERT INTO individual_bookings(id, tenant_id, lesson_id, student_id, parent_id, week_number,
                scheduled_date, start_time, end_time, status, created_at)
             VALUES('raw-2', ?, ?, ?, ?, 4, '2030-01-29', '09:00', '09:30', 'CONFIRMED', 'x')",
            params![fx.tenant, fx.hybrid_lesson, fx.other_student, fx.other_parent],
        );
        assert!(matches!(
            dup_slot.map_err(classify_booking_write),
            Err(SchedError::SlotUnavailable(_))
        ));
    }

    #[test]
    fn listing_filters_by_parent_and_week() {
        let fx = seed();
        create_booking(&fx.conn, &fx.tenant, &fx.parent, &req(&fx, &fx.student, t(9, 0), t(9, 30)), now())
            .expect("book");
        create_booking(
            &fx.conn,
            &fx.tenant,
            &fx.other_parent,
            &req(&fx, &fx.other_student, t(9, 30), t(10, 0)),
            now(),
        )
        .expect("book other");
        let mine = list_bookings(
            &fx.conn,
            &fx.tenant,
            &BookingFilter {
                parent_id: Some(fx.parent.clone()),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(mine.len(), 1);
        let week = list_bookings(
            &fx.conn,
            &fx.tenant,
            &BookingFilter {
                lesson_id: Some(fx.hybrid_lesson.clone()),
                week_number: Some(4),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(week.len(), 2);
    }
}
