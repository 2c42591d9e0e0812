use crate::ipc::error::ok;
use crate::ipc::helpers::{auth_context, db_conn, now, required_str, sched_err, HandlerResult, ADMIN, STAFF};
use crate::ipc::types::{AppState, Request};
use crate::schedule::enrollments::{enroll_student, list_enrollments, remove_enrollment};
use serde_json::json;

fn handle_add(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let student_id = required_str(req, "studentId")?;
    let enrollment =
        enroll_student(conn, &ctx.tenant_id, &lesson_id, &student_id, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "enrollment": enrollment })))
}

fn handle_remove(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let student_id = required_str(req, "studentId")?;
    remove_enrollment(conn, &ctx.tenant_id, &lesson_id, &student_id, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, STAFF)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let enrollments = list_enrollments(conn, &ctx.tenant_id, &lesson_id).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "enrollments": enrollments })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "enrollments.add" => handle_add(state, req),
        "enrollments.remove" => handle_remove(state, req),
        "enrollments.list" => handle_list(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
