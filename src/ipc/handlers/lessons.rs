use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::booking_settings;
use crate::ipc::helpers::{
    auth_context, db_conn, now, opt_day, opt_i64, opt_str, opt_time, parse_bool, required_date, required_day,
    required_str, required_time, sched_err, HandlerResult, ADMIN, ANYONE, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::lessons::{create_lesson, create_term, deactivate_lesson, update_lesson, LessonInput, LessonPatch};
use crate::schedule::model::LessonCategory;
use crate::schedule::notify::OutboxSink;
use crate::schedule::repo;
use crate::schedule::reschedule::{check_reschedule_conflicts, reschedule_lesson, NewPlacement, RescheduleInput};
use serde_json::{json, Value as JsonValue};

fn handle_terms_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    let start = required_date(req, "startDate")?;
    let end = required_date(req, "endDate")?;
    let term = create_term(conn, &ctx.tenant_id, &name, start, end, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "term": term })))
}

fn handle_terms_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let terms = repo::list_terms(conn, &ctx.tenant_id).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "terms": terms })))
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let category_raw = required_str(req, "category")?;
    let Some(category) = LessonCategory::parse(&category_raw) else {
        return Err(err(
            &req.id,
            "bad_params",
            "category must be one of: INDIVIDUAL, GROUP, BAND, HYBRID",
            None,
        ));
    };
    let input = LessonInput {
        name: required_str(req, "name")?,
        teacher_id: required_str(req, "teacherId")?,
        room_id: required_str(req, "roomId")?,
        term_id: required_str(req, "termId")?,
        day_of_week: required_day(req, "dayOfWeek")?,
        start_time: required_time(req, "startTime")?,
        end_time: required_time(req, "endTime")?,
        category,
        capacity: opt_i64(req, "capacity")?.unwrap_or(1),
    };
    let lesson = create_lesson(conn, &ctx.tenant_id, &input, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "lessonId": lesson.id, "lesson": lesson })))
}

fn handle_lessons_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let patch = LessonPatch {
        name: opt_str(req, "name")?,
        teacher_id: opt_str(req, "teacherId")?,
        room_id: opt_str(req, "roomId")?,
        day_of_week: opt_day(req, "dayOfWeek")?,
        start_time: opt_time(req, "startTime")?,
        end_time: opt_time(req, "endTime")?,
        capacity: opt_i64(req, "capacity")?,
    };
    let lesson = update_lesson(conn, &ctx.tenant_id, &lesson_id, &patch, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "lesson": lesson })))
}

fn handle_lessons_deactivate(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let deleted = deactivate_lesson(conn, &ctx.tenant_id, &lesson_id, now()).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "deleted": deleted })))
}

fn handle_lessons_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let term_id = opt_str(req, "termId")?;
    let teacher_id = opt_str(req, "teacherId")?;
    let include_inactive = parse_bool(req, "includeInactive", false)?;
    let lessons = repo::list_lessons(
        conn,
        &ctx.tenant_id,
        term_id.as_deref(),
        teacher_id.as_deref(),
        include_inactive,
    )
    .map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "lessons": lessons })))
}

fn handle_lessons_open(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ANYONE)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let to_err = |e| sched_err(&req.id, e);
    let lesson = repo::load_lesson(conn, &ctx.tenant_id, &lesson_id).map_err(to_err)?;
    let pattern = repo::find_pattern(conn, &ctx.tenant_id, &lesson_id).map_err(to_err)?;
    let enrolled = repo::count_active_enrollments(conn, &ctx.tenant_id, &lesson_id).map_err(to_err)?;
    Ok(ok(
        &req.id,
        json!({ "lesson": lesson, "pattern": pattern, "enrolledCount": enrolled }),
    ))
}

fn placement(req: &Request) -> Result<NewPlacement, JsonValue> {
    Ok(NewPlacement {
        day_of_week: required_day(req, "newDayOfWeek")?,
        start_time: required_time(req, "newStartTime")?,
        end_time: required_time(req, "newEndTime")?,
    })
}

fn handle_reschedule_preview(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, STAFF)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let plan = placement(req)?;
    let report = check_reschedule_conflicts(conn, &ctx.tenant_id, &lesson_id, &plan).map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!(report)))
}

fn handle_reschedule(state: &mut AppState, req: &Request) -> HandlerResult {
    let ctx = auth_context(req, ADMIN)?;
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let settings = booking_settings(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let input = RescheduleInput {
        placement: placement(req)?,
        notify_parents: parse_bool(req, "notifyParents", settings.notify_parents_by_default)?,
        reason: opt_str(req, "reason")?,
    };
    let at = now();
    let sink = OutboxSink::new(conn, at);
    let outcome = reschedule_lesson(conn, &ctx.tenant_id, &lesson_id, &input, &ctx.actor_id, &sink, at)
        .map_err(|e| sched_err(&req.id, e))?;
    Ok(ok(&req.id, json!(outcome)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "terms.create" => handle_terms_create(state, req),
        "terms.list" => handle_terms_list(state, req),
        "lessons.create" => handle_lessons_create(state, req),
        "lessons.update" => handle_lessons_update(state, req),
        "lessons.deactivate" => handle_lessons_deactivate(state, req),
        "lessons.list" => handle_lessons_list(state, req),
        "lessons.open" => handle_lessons_open(state, req),
        "lessons.reschedulePreview" => handle_reschedule_preview(state, req),
        "lessons.reschedule" => handle_reschedule(state, req),
        _ => return None,
    };
    Some(result.unwrap_or_else(|e| e))
}
