use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::schedule::model::{parse_date, parse_time, AuthContext, Role};
use crate::schedule::SchedError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Caller identity. Every scheduling method needs one.
pub fn auth_context<'a>(req: &'a Request, allowed: &[Role]) -> Result<&'a AuthContext, JsonValue> {
    let Some(ctx) = req.context.as_ref() else {
        return Err(err(&req.id, "bad_params", "missing context", None));
    };
    if ctx.tenant_id.trim().is_empty() || ctx.actor_id.trim().is_empty() {
        return Err(err(&req.id, "bad_params", "context.tenantId and context.actorId are required", None));
    }
    if !allowed.contains(&ctx.role) {
        return Err(sched_err(
            &req.id,
            SchedError::Forbidden(format!("{:?} may not call {}", ctx.role, req.method)),
        ));
    }
    Ok(ctx)
}

pub fn sched_err(id: &str, e: SchedError) -> JsonValue {
    if matches!(e, SchedError::Storage(_) | SchedError::Internal(_)) {
        tracing::error!(error = %e, "request failed");
    }
    err(id, e.code(), e.to_string(), Some(e.details()))
}

pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be string or null", key), None))?
                .trim()
                .to_string();
            Ok(if s.is_empty() { None } else { Some(s) })
        }
    }
}

pub fn parse_bool(req: &Request, key: &str, default: bool) -> Result<bool, JsonValue> {
    match req.params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be boolean", key), None)),
    }
}

pub fn opt_bool(req: &Request, key: &str) -> Result<Option<bool>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => parse_bool(req, key, false).map(Some),
    }
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be integer or null", key), None)),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, JsonValue> {
    opt_i64(req, key)?.ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_week(req: &Request, key: &str) -> Result<u32, JsonValue> {
    let n = required_i64(req, key)?;
    u32::try_from(n)
        .ok()
        .filter(|w| *w >= 1)
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be >= 1", key), None))
}

pub fn opt_week(req: &Request, key: &str) -> Result<Option<u32>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(_) => required_week(req, key).map(Some),
    }
}

pub fn opt_day(req: &Request, key: &str) -> Result<Option<u8>, JsonValue> {
    match opt_i64(req, key)? {
        None => Ok(None),
        Some(n) if (0..=6).contains(&n) => Ok(Some(n as u8)),
        Some(_) => Err(err(&req.id, "bad_params", format!("{} must be in 0..=6", key), None)),
    }
}

pub fn required_day(req: &Request, key: &str) -> Result<u8, JsonValue> {
    opt_day(req, key)?.ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn opt_time(req: &Request, key: &str) -> Result<Option<NaiveTime>, JsonValue> {
    match opt_str(req, key)? {
        None => Ok(None),
        Some(raw) => parse_time(&raw)
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be HH:MM", key), None)),
    }
}

pub fn required_time(req: &Request, key: &str) -> Result<NaiveTime, JsonValue> {
    opt_time(req, key)?.ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_date(req: &Request, key: &str) -> Result<NaiveDate, JsonValue> {
    let raw = required_str(req, key)?;
    parse_date(&raw).ok_or_else(|| err(&req.id, "bad_params", format!("{} must be YYYY-MM-DD", key), None))
}

pub fn opt_week_set(req: &Request, key: &str) -> Result<Option<BTreeSet<u32>>, JsonValue> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let bad = || err(&req.id, "bad_params", format!("{} must be an array of week numbers", key), None);
            let arr = v.as_array().ok_or_else(bad)?;
            let mut out = BTreeSet::new();
            for item in arr {
                let n = item.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(bad)?;
                out.insert(n);
            }
            Ok(Some(out))
        }
    }
}

pub const ADMIN: &[Role] = &[Role::Admin];
pub const STAFF: &[Role] = &[Role::Admin, Role::Teacher];
pub const PARENT: &[Role] = &[Role::Parent];
pub const ANYONE: &[Role] = &[Role::Admin, Role::Teacher, Role::Parent];

/// Handlers return the error envelope in `Err` so parameter parsing can use `?`.
pub type HandlerResult = Result<JsonValue, JsonValue>;
