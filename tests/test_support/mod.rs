#![allow(dead_code)]

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub const TENANT: &str = "tenant-a";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, nanos));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_lessond");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lessond");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn ctx(role: &str, actor_id: &str) -> serde_json::Value {
    json!({ "tenantId": TENANT, "role": role, "actorId": actor_id })
}

pub fn admin() -> serde_json::Value {
    ctx("ADMIN", "admin-1")
}

pub fn teacher() -> serde_json::Value {
    ctx("TEACHER", "t-1")
}

pub fn parent(id: &str) -> serde_json::Value {
    ctx("PARENT", id)
}

fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    payload: serde_json::Value,
) -> serde_json::Value {
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", payload["method"]);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id"), payload.get("id"));
    value
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    send(stdin, reader, json!({ "id": id, "method": method, "params": params }))
}

pub fn request_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    context: serde_json::Value,
    params: serde_json::Value,
) -> serde_json::Value {
    send(
        stdin,
        reader,
        json!({ "id": id, "method": method, "params": params, "context": context }),
    )
}

fn unwrap_ok(method: &str, value: serde_json::Value) -> serde_json::Value {
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    unwrap_ok(method, value)
}

pub fn request_as_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    context: serde_json::Value,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_as(stdin, reader, id, method, context, params);
    unwrap_ok(method, value)
}

/// Asserts a failed response and returns its error object.
pub fn request_as_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    context: serde_json::Value,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_as(stdin, reader, id, method, context, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

/// Directory rows the engine reads but never writes. Must run after
/// `workspace.select` has created the schema.
///
/// Family f-1 has parent p-1 and students s-1, s-2. Family f-2 has parent
/// p-2 and student s-3.
pub fn seed_directory(workspace: &Path) {
    let conn = rusqlite::Connection::open(workspace.join("lessond.sqlite3")).expect("open db");
    conn.busy_timeout(std::time::Duration::from_secs(5)).expect("busy timeout");
    conn.execute_batch(&format!(
        "INSERT INTO teachers(id, tenant_id, name) VALUES
            ('t-1', '{t}', 'Alice Keys'),
            ('t-2', '{t}', 'Bob Strings');
         INSERT INTO rooms(id, tenant_id, name) VALUES
            ('r-1', '{t}', 'Studio 1'),
            ('r-2', '{t}', 'Studio 2');
         INSERT INTO parents(id, tenant_id, family_id, name) VALUES
            ('p-1', '{t}', 'f-1', 'Pat One'),
            ('p-2', '{t}', 'f-2', 'Sam Two');
         INSERT INTO students(id, tenant_id, family_id, first_name, last_name) VALUES
            ('s-1', '{t}', 'f-1', 'Ada', 'One'),
            ('s-2', '{t}', 'f-1', 'Ben', 'One'),
            ('s-3', '{t}', 'f-2', 'Cy', 'Two');",
        t = TENANT
    ))
    .expect("seed directory");
}

/// First Sunday at least three weeks out, so booking deadlines measured
/// against the wall clock never trip.
pub fn future_term_start() -> NaiveDate {
    let base = Local::now().date_naive() + Duration::days(21);
    let back = i64::from(base.weekday().num_days_from_sunday());
    base - Duration::days(back) + Duration::days(7)
}

/// Calendar date of `day_of_week` (0 = Sunday) in `week` of a term that
/// starts on a Sunday.
pub fn week_date(term_start: NaiveDate, week: u32, day_of_week: u8) -> NaiveDate {
    term_start + Duration::days(7 * (i64::from(week) - 1) + i64::from(day_of_week))
}

pub fn ymd(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub struct HybridFixture {
    pub term_id: String,
    pub lesson_id: String,
    pub term_start: NaiveDate,
}

/// Selects `workspace`, seeds the directory and builds a ten-week term with
/// one HYBRID lesson (Tuesdays 16:00-17:00, teacher t-1, room r-1). Odd weeks
/// are group weeks, even weeks are individual weeks with 30-minute slots.
/// Students s-1, s-2 and s-3 are enrolled.
pub fn hybrid_fixture(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> HybridFixture {
    request_ok(
        stdin,
        reader,
        "fx-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_directory(workspace);

    let term_start = future_term_start();
    let term = request_as_ok(
        stdin,
        reader,
        "fx-term",
        "terms.create",
        admin(),
        json!({
            "name": "Spring",
            "startDate": ymd(term_start),
            "endDate": ymd(term_start + Duration::days(69)),
        }),
    );
    let term_id = term["term"]["id"].as_str().expect("term id").to_string();
    assert_eq!(term["term"]["totalWeeks"], 10);

    let lesson = request_as_ok(
        stdin,
        reader,
        "fx-lesson",
        "lessons.create",
        admin(),
        json!({
            "name": "Piano Hybrid",
            "teacherId": "t-1",
            "roomId": "r-1",
            "termId": term_id,
            "dayOfWeek": 2,
            "startTime": "16:00",
            "endTime": "17:00",
            "category": "HYBRID",
            "capacity": 4,
        }),
    );
    let lesson_id = lesson["lessonId"].as_str().expect("lesson id").to_string();

    request_as_ok(
        stdin,
        reader,
        "fx-pattern",
        "patterns.upsert",
        teacher(),
        json!({
            "lessonId": lesson_id,
            "kind": "ALTERNATING",
            "individualSlotDuration": 30,
            "bookingDeadlineHours": 24,
        }),
    );
    for student in ["s-1", "s-2", "s-3"] {
        request_as_ok(
            stdin,
            reader,
            &format!("fx-enroll-{}", student),
            "enrollments.add",
            admin(),
            json!({ "lessonId": lesson_id, "studentId": student }),
        );
    }

    HybridFixture {
        term_id,
        lesson_id,
        term_start,
    }
}
