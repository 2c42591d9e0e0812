use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    auth_context, db_conn, now, opt_str, opt_week, required_date, required_str, required_time, required_week,
    sched_err, HandlerResult, ANYONE, PARENT, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::booking::{
    cancel_booking, create_booking, list_bookings, mark_outcome, reschedule_booking, BookingFilter, BookingRequest,
    NewTime,
};
use crate::schedule::model::{BookingStatus, Role};
use crate::schedule::SchedError;
use serde_json::json;

fn rejected(req: &Request, tenant_id: &str, e: SchedError) -> serde_json::Value {
    tracing::info!(tenant = tenant_id, method = %req.method, code = e.code(), reason = %e, "booking rejected");
    sched_err(&req.id, e)
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, PARENT)?;
    let conn = db_conn(state, req)?;
    let booking_req = BookingRequest {
        lesson_id: required_str(req, "lessonId")?,
        student_id: required_str(req, "studentId")?,
        week_number: required_week(req, "weekNumber")?,
        scheduled_date: required_date(req, "scheduledDate")?,
        start_time: required_time(req, "startTime")?,
        end_time: required_time(req, "endTime")?,
    };
    let booking = create_booking(conn, &ctx.tenant_id, &ctx.actor_id, &booking_req, now())
        .map_err(|e| rejected(req, &ctx.tenant_id, e))?;
    Ok(ok(&req.id, json!({ "booking": booking })))
}

fn handle_reschedule(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, PARENT)?;
    let conn = db_conn(state, req)?;
    let booking_id = required_str(req, "bookingId")?;
    let when = NewTime {
        scheduled_date: required_date(req, "newDate")?,
        start_time: required_time(req, "newStartTime")?,
        end_time: required_time(req, "newEndTime")?,
    };
    let booking = reschedule_booking(conn, &ctx.tenant_id, &ctx.actor_id, &booking_id, &when, now())
        .map_err(|e| rejected(req, &ctx.tenant_id, e))?;
    Ok(ok(&req.id, json!({ "booking": booking })))
}

fn handle_cancel(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, PARENT)?;
    let conn = db_conn(state, req)?;
    let booking_id = required_str(req, "bookingId")?;
    let reason = opt_str(req, "reason")?;
    let booking = cancel_booking(conn, &ctx.tenant_id, &ctx.actor_id, &booking_id, reason.as_deref(), now())
        .map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "booking": booking })))
}

fn handle_mark_outcome(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, STAFF)?;
    let conn = db_conn(state, req)?;
    let booking_id = required_str(req, "bookingId")?;
    let outcome_raw = required_str(req, "outcome")?;
    let Some(outcome) = BookingStatus::parse(&outcome_raw) else {
        return Err(err(&req.id, "bad_params", "outcome must be COMPLETED or NO_SHOW", None));
    };
    let booking =
        mark_outcome(conn, &ctx.tenant_id, &booking_id, outcome, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "booking": booking })))
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let filter = match ctx.role {
        // Parents only ever see what they booked.
        Role::Parent => BookingFilter {
            lesson_id: opt_str(req, "lessonId")?,
            week_number: opt_week(req, "weekNumber")?,
            parent_id: Some(ctx.actor_id.clone()),
        },
        Role::Admin | Role::Teacher => BookingFilter {
            lesson_id: Some(required_str(req, "lessonId")?),
            week_number: opt_week(req, "weekNumber")?,
            parent_id: None,
        },
    };
    let bookings = list_bookings(conn, &ctx.tenant_id, &filter).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "bookings": bookings })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "bookings.create" => handle_create(state, req),
        "bookings.reschedule" => handle_reschedule(state, req),
        "bookings.cancel" => handle_cancel(state, req),
        "bookings.markOutcome" => handle_mark_outcome(state, req),
        "bookings.list" => handle_list(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
