use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::scheduling_settings;
use crate::ipc::helpers::{auth_context, db_conn, opt_i64, opt_str, required_date, sched_err, HandlerResult, ANYONE};
use crate::ipc::types::{AppState, Request};
use crate::schedule::calendar::{parent_events, staff_events, CalendarFilter, CalendarRange, PageRequest};
use crate::schedule::model::Role;
use serde_json::json;

fn handle_events(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let settings = scheduling_settings(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;

    let range = CalendarRange {
        from: required_date(req, "from")?,
        to: required_date(req, "to")?,
    };
    let filter = CalendarFilter {
        term_id: opt_str(req, "termId")?,
        teacher_id: opt_str(req, "teacherId")?,
    };
    let page = opt_i64(req, "page")?.unwrap_or(1);
    let page_size = opt_i64(req, "pageSize")?.unwrap_or(settings.default_page_size as i64);
    if page < 1 {
        return Err(err(&req.id, "bad_params", "page must be >= 1", None));
    }
    if page_size < 1 || page_size as usize > settings.max_page_size {
        return Err(err(
            &req.id,
            "bad_params",
            format!("pageSize must be in 1..={}", settings.max_page_size),
            None,
        ));
    }
    let page = PageRequest {
        page: page as usize,
        page_size: page_size as usize,
    };

    let result = match ctx.role {
        Role::Parent => parent_events(
            conn,
            &ctx.tenant_id,
            &ctx.actor_id,
            &filter,
            range,
            page,
            settings.max_calendar_range_days,
        ),
        Role::Admin | Role::Teacher => staff_events(
            conn,
            &ctx.tenant_id,
            &filter,
            range,
            page,
            settings.max_calendar_range_days,
        ),
    };
    let events = result.map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!(events)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "calendar.events" => handle_events(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
