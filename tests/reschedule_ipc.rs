mod test_support;

use serde_json::json;
use test_support::{admin, hybrid_fixture, request_as_err, request_as_ok, spawn_sidecar, teacher, temp_dir};

#[test]
fn reschedule_reports_conflicts_and_queues_parent_notice() {
    let workspace = temp_dir("lessond-reschedule");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = hybrid_fixture(&mut stdin, &mut reader, &workspace);

    // Same teacher as the hybrid lesson, other room, Wednesdays.
    request_as_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lessons.create",
        admin(),
        json!({
            "name": "Theory Group",
            "teacherId": "t-1",
            "roomId": "r-2",
            "termId": fx.term_id,
            "dayOfWeek": 3,
            "startTime": "16:00",
            "endTime": "17:00",
            "category": "GROUP",
            "capacity": 8,
        }),
    );

    let preview = request_as_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lessons.reschedulePreview",
        teacher(),
        json!({
            "lessonId": fx.lesson_id,
            "newDayOfWeek": 3,
            "newStartTime": "16:30",
            "newEndTime": "17:30",
        }),
    );
    assert_eq!(preview["hasConflicts"], true);
    assert_eq!(preview["teacherConflict"]["name"], "Theory Group");
    assert!(preview["roomConflict"].is_null());
    assert_eq!(preview["affectedStudents"], 3);
    assert_eq!(preview["affectedEnrollments"].as_array().map(|v| v.len()), Some(3));

    let blocked = request_as_err(
        &mut stdin,
        &mut reader,
        "3",
        "lessons.reschedule",
        admin(),
        json!({
            "lessonId": fx.lesson_id,
            "newDayOfWeek": 3,
            "newStartTime": "16:30",
            "newEndTime": "17:30",
        }),
    );
    assert_eq!(blocked["code"], "conflict");
    assert!(blocked["message"].as_str().unwrap_or("").contains("Theory Group"));
    assert_eq!(blocked["details"]["conflictingLesson"]["name"], "Theory Group");

    let unchanged = request_as_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lessons.open",
        teacher(),
        json!({ "lessonId": fx.lesson_id }),
    );
    assert_eq!(unchanged["lesson"]["dayOfWeek"], 2);
    assert_eq!(unchanged["enrolledCount"], 3);

    // Teachers may preview but not commit.
    let by_teacher = request_as_err(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.reschedule",
        teacher(),
        json!({
            "lessonId": fx.lesson_id,
            "newDayOfWeek": 4,
            "newStartTime": "16:00",
            "newEndTime": "17:00",
        }),
    );
    assert_eq!(by_teacher["code"], "forbidden");

    let moved = request_as_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lessons.reschedule",
        admin(),
        json!({
            "lessonId": fx.lesson_id,
            "newDayOfWeek": 4,
            "newStartTime": "16:00",
            "newEndTime": "17:00",
            "reason": "hall maintenance",
        }),
    );
    assert_eq!(moved["lesson"]["dayOfWeek"], 4);
    assert_eq!(moved["affectedStudents"], 3);
    assert_eq!(moved["notificationQueued"], true);

    let pending = request_as_ok(
        &mut stdin,
        &mut reader,
        "7",
        "notifications.pending",
        admin(),
        json!({}),
    );
    let notices = pending["notifications"].as_array().expect("notifications");
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["kind"], "LESSON_RESCHEDULED");
    assert_eq!(notices[0]["lessonId"], fx.lesson_id.as_str());
    let payload = &notices[0]["payload"];
    assert_eq!(payload["previous"]["dayOfWeek"], 2);
    assert_eq!(payload["current"]["dayOfWeek"], 4);
    assert_eq!(payload["reason"], "hall maintenance");
    assert_eq!(payload["actorId"], "admin-1");
    assert_eq!(payload["affectedStudents"].as_array().map(|v| v.len()), Some(3));

    let notice_id = notices[0]["id"].as_str().expect("notice id").to_string();
    let acked = request_as_ok(
        &mut stdin,
        &mut reader,
        "8",
        "notifications.ack",
        admin(),
        json!({ "ids": [notice_id, "missing"] }),
    );
    assert_eq!(acked["delivered"], 1);

    // Opting out commits the move without a notice.
    let quiet = request_as_ok(
        &mut stdin,
        &mut reader,
        "9",
        "lessons.reschedule",
        admin(),
        json!({
            "lessonId": fx.lesson_id,
            "newDayOfWeek": 5,
            "newStartTime": "15:00",
            "newEndTime": "16:00",
            "notifyParents": false,
        }),
    );
    assert_eq!(quiet["notificationQueued"], false);
    let pending = request_as_ok(
        &mut stdin,
        &mut reader,
        "10",
        "notifications.pending",
        admin(),
        json!({}),
    );
    assert_eq!(pending["notifications"].as_array().map(|v| v.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn availability_check_sees_existing_lessons() {
    let workspace = temp_dir("lessond-availability");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let fx = hybrid_fixture(&mut stdin, &mut reader, &workspace);

    let busy = request_as_ok(
        &mut stdin,
        &mut reader,
        "1",
        "availability.check",
        teacher(),
        json!({
            "resourceKind": "TEACHER",
            "resourceId": "t-1",
            "dayOfWeek": 2,
            "startTime": "16:30",
            "endTime": "17:30",
        }),
    );
    assert_eq!(busy["available"], false);
    assert_eq!(busy["conflictingLesson"]["name"], "Piano Hybrid");

    // Back-to-back windows do not collide.
    let adjacent = request_as_ok(
        &mut stdin,
        &mut reader,
        "2",
        "availability.check",
        teacher(),
        json!({
            "resourceKind": "ROOM",
            "resourceId": "r-1",
            "dayOfWeek": 2,
            "startTime": "17:00",
            "endTime": "18:00",
        }),
    );
    assert_eq!(adjacent["available"], true);
    assert!(adjacent.get("conflictingLesson").is_none());

    let excluded = request_as_ok(
        &mut stdin,
        &mut reader,
        "3",
        "availability.check",
        admin(),
        json!({
            "resourceKind": "ROOM",
            "resourceId": "r-1",
            "dayOfWeek": 2,
            "startTime": "16:00",
            "endTime": "17:00",
            "excludeLessonId": fx.lesson_id,
        }),
    );
    assert_eq!(excluded["available"], true);

    let clash = request_as_err(
        &mut stdin,
        &mut reader,
        "4",
        "lessons.create",
        admin(),
        json!({
            "name": "Late Piano",
            "teacherId": "t-2",
            "roomId": "r-1",
            "termId": fx.term_id,
            "dayOfWeek": 2,
            "startTime": "16:45",
            "endTime": "17:15",
            "category": "INDIVIDUAL",
        }),
    );
    assert_eq!(clash["code"], "conflict");
    assert_eq!(clash["details"]["conflictingLesson"]["name"], "Piano Hybrid");

    drop(stdin);
    let _ = child.wait();
}
