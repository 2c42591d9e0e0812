//! In-memory fixture shared by the engine's unit tests.
//!
//! Term: 2030-01-06 (a Sunday) through 2030-04-20, 15 weeks.
//! Hybrid lesson: Tuesdays 09:00-10:00, group weeks 1,2,3,5,6,7,9,10, individual
//! weeks 4 and 8, 30-minute slots, 24h booking deadline, capacity 3.
//! Group lesson: Wednesdays 14:00-15:00 with the same teacher in another room.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use super::enrollments::enroll_student;
use super::lessons::{create_lesson, create_term, LessonInput};
use super::model::{LessonCategory, PatternKind};
use super::patterns::{upsert_pattern, PatternDefaults, PatternInput};

pub const DEFAULTS: PatternDefaults = PatternDefaults {
    slot_duration_minutes: 30,
    booking_deadline_hours: 24,
};

pub struct Fixture {
    pub conn: Connection,
    pub tenant: String,
    pub teacher: String,
    pub room: String,
    pub term: String,
    pub hybrid_lesson: String,
    pub group_lesson: String,
    pub parent: String,
    pub student: String,
    pub sibling: String,
    pub other_parent: String,
    pub other_student: String,
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("time")
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("date")
}

pub fn at(y: i32, m: u32, day: u32, h: u32, min: u32) -> NaiveDateTime {
    d(y, m, day).and_time(t(h, min))
}

/// A moment well before the term starts.
pub fn now() -> NaiveDateTime {
    at(2030, 1, 1, 8, 0)
}

pub fn seed() -> Fixture {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    crate::db::init_schema(&conn).expect("schema");
    let tenant = "tenant-a".to_string();

    for sql in [
        "INSERT INTO teachers(id, tenant_id, name) VALUES('teacher-1', 'tenant-a', 'Ms Rivera')",
        "INSERT INTO rooms(id, tenant_id, name) VALUES('room-1', 'tenant-a', 'Studio A')",
        "INSERT INTO rooms(id, tenant_id, name) VALUES('room-2', 'tenant-a', 'Studio B')",
        "INSERT INTO parents(id, tenant_id, family_id, name) VALUES('parent-1', 'tenant-a', 'fam-1', 'Pat One')",
        "INSERT INTO parents(id, tenant_id, family_id, name) VALUES('parent-2', 'tenant-a', 'fam-2', 'Sam Two')",
        "INSERT INTO students(id, tenant_id, family_id, first_name, last_name) VALUES('student-1', 'tenant-a', 'fam-1', 'Ada', 'One')",
        "INSERT INTO students(id, tenant_id, family_id, first_name, last_name) VALUES('student-3', 'tenant-a', 'fam-1', 'Cy', 'One')",
        "INSERT INTO students(id, tenant_id, family_id, first_name, last_name) VALUES('student-2', 'tenant-a', 'fam-2', 'Bo', 'Two')",
    ] {
        conn.execute(sql, []).expect("seed directory");
    }

    let term = create_term(&conn, &tenant, "Spring 2030", d(2030, 1, 6), d(2030, 4, 20), now())
        .expect("term");
    let hybrid = create_lesson(
        &conn,
        &tenant,
        &LessonInput {
            name: "Piano Hybrid".into(),
            teacher_id: "teacher-1".into(),
            room_id: "room-1".into(),
            term_id: term.id.clone(),
            day_of_week: 2,
            start_time: t(9, 0),
            end_time: t(10, 0),
            category: LessonCategory::Hybrid,
            capacity: 3,
        },
        now(),
    )
    .expect("hybrid lesson");
    upsert_pattern(
        &conn,
        &tenant,
        &hybrid.id,
        &PatternInput {
            kind: PatternKind::Custom,
            group_weeks: Some([1, 2, 3, 5, 6, 7, 9, 10].into_iter().collect()),
            individual_weeks: Some([4, 8].into_iter().collect()),
            first_individual_week: None,
            slot_duration_minutes: Some(30),
            booking_deadline_hours: Some(24),
            booking_open: Some(true),
        },
        DEFAULTS,
        now(),
    )
    .expect("pattern");
    let group = create_lesson(
        &conn,
        &tenant,
        &LessonInput {
            name: "Theory Group".into(),
            teacher_id: "teacher-1".into(),
            room_id: "room-2".into(),
            term_id: term.id.clone(),
            day_of_week: 3,
            start_time: t(14, 0),
            end_time: t(15, 0),
            category: LessonCategory::Group,
            capacity: 8,
        },
        now(),
    )
    .expect("group lesson");

    enroll_student(&conn, &tenant, &hybrid.id, "student-1", now()).expect("enroll");
    enroll_student(&conn, &tenant, &hybrid.id, "student-2", now()).expect("enroll");
    enroll_student(&conn, &tenant, &group.id, "student-1", now()).expect("enroll");

    Fixture {
        conn,
        tenant,
        teacher: "teacher-1".into(),
        room: "room-1".into(),
        term: term.id,
        hybrid_lesson: hybrid.id,
        group_lesson: group.id,
        parent: "parent-1".into(),
        student: "student-1".into(),
        sibling: "student-3".into(),
        other_parent: "parent-2".into(),
        other_student: "student-2".into(),
    }
}
