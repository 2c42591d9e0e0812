//! Outbound notices about lesson changes. Delivery belongs to another system;
//! the engine only records what should be sent.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use super::error::SchedResult;
use super::model::{fmt_stamp, LessonRef};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedStudent {
    pub student_id: String,
    pub student_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleNotice {
    pub lesson_id: String,
    pub previous: LessonRef,
    pub current: LessonRef,
    pub reason: Option<String>,
    pub actor_id: String,
    pub affected_students: Vec<AffectedStudent>,
}

pub trait NotificationSink {
    fn enqueue(&self, tenant_id: &str, notice: &RescheduleNotice) -> anyhow::Result<()>;
}

/// Writes notices to the `notification_outbox` table for a relay to pick up.
pub struct OutboxSink<'a> {
    conn: &'a Connection,
    now: NaiveDateTime,
}

impl<'a> OutboxSink<'a> {
    pub fn new(conn: &'a Connection, now: NaiveDateTime) -> Self {
        Self { conn, now }
    }
}

impl NotificationSink for OutboxSink<'_> {
    fn enqueue(&self, tenant_id: &str, notice: &RescheduleNotice) -> anyhow::Result<()> {
        let payload = serde_json::to_string(notice)?;
        self.conn.execute(
            "INSERT INTO notification_outbox(id, tenant_id, kind, lesson_id, payload_json, created_at)
             VALUES(?, ?, 'LESSON_RESCHEDULED', ?, ?, ?)",
            params![
                Uuid::new_v4().to_string(),
                tenant_id,
                notice.lesson_id,
                payload,
                fmt_stamp(self.now)
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: String,
    pub kind: String,
    pub lesson_id: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// Undelivered notices, oldest first.
pub fn pending_notifications(conn: &Connection, tenant_id: &str) -> SchedResult<Vec<OutboxEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, lesson_id, payload_json, created_at
         FROM notification_outbox
         WHERE tenant_id = ? AND delivered_at IS NULL
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map([tenant_id], |r| {
        let raw: String = r.get(3)?;
        Ok(OutboxEntry {
            id: r.get(0)?,
            kind: r.get(1)?,
            lesson_id: r.get(2)?,
            payload: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            created_at: r.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Marks notices as handed off. Unknown ids are ignored; returns how many changed.
pub fn mark_delivered(conn: &Connection, tenant_id: &str, ids: &[String], now: NaiveDateTime) -> SchedResult<usize> {
    let stamp = fmt_stamp(now);
    let mut changed = 0;
    for id in ids {
        changed += conn.execute(
            "UPDATE notification_outbox SET delivered_at = ?
             WHERE tenant_id = ? AND id = ? AND delivered_at IS NULL",
            params![stamp, tenant_id, id],
        )?;
    }
    Ok(changed)
}
