use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{auth_context, db_conn, now, sched_err, HandlerResult, ADMIN};
use crate::ipc::types::{AppState, Request};
use crate::schedule::notify::{mark_delivered, pending_notifications};
use serde_json::json;

fn handle_pending(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let pending = pending_notifications(conn, &ctx.tenant_id).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "notifications": pending })))
}

fn handle_ack(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let Some(ids) = req.params.get("ids").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "ids must be an array", None));
    };
    let ids: Vec<String> = ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    let delivered = mark_delivered(conn, &ctx.tenant_id, &ids, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "delivered": delivered })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notifications.pending" => handle_pending(state, req),
        "notifications.ack" => handle_ack(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
