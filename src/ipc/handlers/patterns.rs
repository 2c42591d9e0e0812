use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::booking_settings;
use crate::ipc::helpers::{
    auth_context, db_conn, now, opt_bool, opt_i64, opt_week, opt_week_set, required_str, sched_err, HandlerResult,
    ANYONE, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::model::PatternKind;
use crate::schedule::patterns::{load_pattern, set_booking_open, upsert_pattern, PatternInput};
use serde_json::json;

fn handle_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, STAFF)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let kind_raw = required_str(req, "kind")?;
    let Some(kind) = PatternKind::parse(&kind_raw) else {
        return Err(err(&req.id, "bad_params", "kind must be ALTERNATING or CUSTOM", None));
    };
    let input = PatternInput {
        kind,
        group_weeks: opt_week_set(req, "groupWeeks")?,
        individual_weeks: opt_week_set(req, "individualWeeks")?,
        first_individual_week: opt_week(req, "firstIndividualWeek")?,
        slot_duration_minutes: opt_i64(req, "individualSlotDuration")?,
        booking_deadline_hours: opt_i64(req, "bookingDeadlineHours")?,
        booking_open: opt_bool(req, "bookingOpen")?,
    };
    let defaults = booking_settings(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
        .pattern_defaults;
    let pattern =
        upsert_pattern(conn, &ctx.tenant_id, &lesson_id, &input, defaults, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "pattern": pattern })))
}

fn handle_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let pattern = load_pattern(conn, &ctx.tenant_id, &lesson_id).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "pattern": pattern })))
}

fn handle_set_booking_open(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, STAFF)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let Some(open) = opt_bool(req, "open")? else {
        return Err(err(&req.id, "bad_params", "missing open", None));
    };
    let pattern =
        set_booking_open(conn, &ctx.tenant_id, &lesson_id, open, now()).map_err(|e| sched_err(&req.id, e))?;
    tracing::info!(tenant = %ctx.tenant_id, lesson = %lesson_id, open, "booking window toggled");
    Ok(ok(&req.id, json!({ "pattern": pattern })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "patterns.upsert" => handle_upsert(state, req),
        "patterns.get" => handle_get(state, req),
        "patterns.setBookingOpen" => handle_set_booking_open(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
