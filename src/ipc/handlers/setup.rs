use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::patterns::{PatternDefaults, MAX_BOOKING_DEADLINE_HOURS};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Scheduling,
    Booking,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Scheduling, SetupSection::Booking];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduling" => Some(Self::Scheduling),
            "booking" => Some(Self::Booking),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::Booking => "booking",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Scheduling => "setup.scheduling",
            Self::Booking => "setup.booking",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Scheduling => json!({
            "maxCalendarRangeDays": 366,
            "defaultPageSize": 50,
            "maxPageSize": 500
        }),
        SetupSection::Booking => json!({
            "defaultSlotDurationMinutes": 30,
            "defaultBookingDeadlineHours": 24,
            "notifyParentsByDefault": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Scheduling => match k.as_str() {
                "maxCalendarRangeDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 730)?));
                }
                "defaultPageSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                "maxPageSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 10, 1000)?));
                }
                _ => return Err(format!("unknown scheduling field: {}", k)),
            },
            SetupSection::Booking => match k.as_str() {
                "defaultSlotDurationMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 5, 240)?));
                }
                "defaultBookingDeadlineHours" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, MAX_BOOKING_DEADLINE_HOURS)?));
                }
                "notifyParentsByDefault" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown booking field: {}", k)),
            },
        }
    }
    if let SetupSection::Scheduling = section {
        let default_size = obj.get("defaultPageSize").and_then(|v| v.as_i64()).unwrap_or(50);
        let max_size = obj.get("maxPageSize").and_then(|v| v.as_i64()).unwrap_or(500);
        if default_size > max_size {
            return Err("defaultPageSize must not exceed maxPageSize".into());
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults rather than failing reads.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Calendar limits as currently configured.
#[derive(Clone, Copy, Debug)]
pub struct SchedulingSettings {
    pub max_calendar_range_days: i64,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct BookingSettings {
    pub pattern_defaults: PatternDefaults,
    pub notify_parents_by_default: bool,
}

fn int_field(section: &Value, key: &str) -> i64 {
    section.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

pub fn scheduling_settings(conn: &rusqlite::Connection) -> anyhow::Result<SchedulingSettings> {
    let s = load_section(conn, SetupSection::Scheduling)?;
    Ok(SchedulingSettings {
        max_calendar_range_days: int_field(&s, "maxCalendarRangeDays"),
        default_page_size: int_field(&s, "defaultPageSize").max(1) as usize,
        max_page_size: int_field(&s, "maxPageSize").max(1) as usize,
    })
}

pub fn booking_settings(conn: &rusqlite::Connection) -> anyhow::Result<BookingSettings> {
    let s = load_section(conn, SetupSection::Booking)?;
    Ok(BookingSettings {
        pattern_defaults: PatternDefaults {
            slot_duration_minutes: int_field(&s, "defaultSlotDurationMinutes"),
            booking_deadline_hours: int_field(&s, "defaultBookingDeadlineHours"),
        },
        notify_parents_by_default: s
            .get("notifyParentsByDefault")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.name(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
