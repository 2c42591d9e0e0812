use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    auth_context, db_conn, opt_str, required_day, required_str, required_time, required_week, sched_err,
    HandlerResult, ANYONE, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::availability::{check_availability, AvailabilityQuery};
use crate::schedule::model::ResourceKind;
use crate::schedule::slots::available_slots;
use serde_json::json;

fn handle_check(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, STAFF)?;
    let conn = db_conn(state, req)?;
    let kind_raw = required_str(req, "resourceKind")?;
    let Some(kind) = ResourceKind::parse(&kind_raw) else {
        return Err(err(&req.id, "bad_params", "resourceKind must be TEACHER or ROOM", None));
    };
    let resource_id = required_str(req, "resourceId")?;
    let exclude = opt_str(req, "excludeLessonId")?;
    let query = AvailabilityQuery {
        kind,
        resource_id: &resource_id,
        day_of_week: required_day(req, "dayOfWeek")?,
        start_time: required_time(req, "startTime")?,
        end_time: required_time(req, "endTime")?,
        exclude_lesson_id: exclude.as_deref(),
    };
    let availability = check_availability(conn, &ctx.tenant_id, &query).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!(availability)))
}

fn handle_slots(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let week = required_week(req, "weekNumber")?;
    let slots = available_slots(conn, &ctx.tenant_id, &lesson_id, week).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "lessonId": lesson_id, "weekNumber": week, "slots": slots })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "availability.check" => handle_check(state, req),
        "slots.list" => handle_slots(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
