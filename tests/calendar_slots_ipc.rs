mod test_support;

use serde_json::json;
use test_support::{open_seeded_workspace, request_err, request_ok, spawn_sidecar, temp_dir};

fn slot_id(result: &serde_json::Value) -> String {
    result
        .pointer("/slot/id")
        .and_then(|v| v.as_str())
        .expect("slot id")
        .to_string()
}

#[test]
fn move_onto_occupied_time_is_rejected_and_leaves_both_slots() {
    let workspace = temp_dir("guidance-calendar-conflict");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 2, "start": "14:00", "end": "15:00" }),
    );
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "physics", "day": 2, "start": "16:00", "end": "17:00" }),
    );
    let a_id = slot_id(&a);
    let b_id = slot_id(&b);

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.slots.move",
        json!({ "slotId": &b_id, "day": 2, "start": "14:30" }),
    );
    assert_eq!(code, "schedule_conflict");
    assert_eq!(
        error
            .pointer("/details/conflictingSlot/id")
            .and_then(|v| v.as_str()),
        Some(a_id.as_str())
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.slots.list",
        json!({ "studentId": "s1" }),
    );
    let slots = listed
        .get("slots")
        .and_then(|v| v.as_array())
        .expect("slots");
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["id"], json!(a_id));
    assert_eq!(slots[0]["start"], "14:00");
    assert_eq!(slots[0]["end"], "15:00");
    assert_eq!(slots[1]["id"], json!(b_id));
    assert_eq!(slots[1]["start"], "16:00");
    assert_eq!(slots[1]["end"], "17:00");
    assert_eq!(listed["weeklyTotalMinutes"], 120);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn add_validates_grid_window_and_subject() {
    let workspace = temp_dir("guidance-calendar-add");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 1, "start": "09:15", "end": "10:00" }),
    );
    assert_eq!(code, "invalid_boundary");

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 1, "start": "06:00", "end": "07:30" }),
    );
    assert_eq!(code, "invalid_boundary");

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 8, "start": "09:00" }),
    );
    assert_eq!(code, "invalid_boundary");

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "chemistry", "day": 1, "start": "09:00" }),
    );
    assert_eq!(code, "unknown_subject");

    // Without an end the configured default length applies.
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 1, "start": "09:00" }),
    );
    assert_eq!(added.pointer("/slot/end").and_then(|v| v.as_str()), Some("10:00"));

    // Touching ends do not overlap.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "physics", "day": 1, "start": "10:00", "end": "11:00" }),
    );
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "physics", "day": 1, "start": "09:30", "end": "10:30" }),
    );
    assert_eq!(code, "schedule_conflict");

    // Another student's week is independent.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "calendar.slots.add",
        json!({ "studentId": "s2", "subjectId": "physics", "day": 1, "start": "09:30", "end": "10:30" }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn move_and_resize_snap_and_clamp() {
    let workspace = temp_dir("guidance-calendar-snap");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 3, "start": "09:00", "end": "10:00" }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "physics", "day": 3, "start": "12:00", "end": "13:00" }),
    );
    let first_id = slot_id(&first);
    let second_id = slot_id(&second);

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.slots.move",
        json!({ "slotId": &first_id, "day": 4, "start": "23:40" }),
    );
    assert_eq!(moved.pointer("/slot/day").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(moved.pointer("/slot/start").and_then(|v| v.as_str()), Some("23:00"));
    assert_eq!(moved.pointer("/slot/end").and_then(|v| v.as_str()), Some("24:00"));

    let moved_back = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.slots.move",
        json!({ "slotId": &first_id, "day": 3, "start": "10:10" }),
    );
    assert_eq!(moved_back.pointer("/slot/start").and_then(|v| v.as_str()), Some("10:00"));

    let stretched = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.slots.resize",
        json!({ "slotId": &first_id, "edge": "end", "time": "14:00" }),
    );
    assert_eq!(stretched.pointer("/slot/end").and_then(|v| v.as_str()), Some("12:00"));

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.slots.resize",
        json!({ "slotId": &second_id, "edge": "start", "time": "13:30" }),
    );
    assert_eq!(code, "invalid_boundary");

    let total = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "calendar.weeklyTotal",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(total["weeklyTotalMinutes"], 180);
    assert_eq!(total["load"], "under");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn remove_and_unknown_slot() {
    let workspace = temp_dir("guidance-calendar-remove");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 5, "start": "18:00", "end": "19:30" }),
    );
    let id = slot_id(&added);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.slots.remove",
        json!({ "slotId": &id }),
    );
    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.slots.remove",
        json!({ "slotId": &id }),
    );
    assert_eq!(code, "unknown_slot");
    assert_eq!(error.pointer("/details/slotId"), Some(&json!(id)));

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.slots.move",
        json!({ "slotId": "missing", "day": 1, "start": "09:00" }),
    );
    assert_eq!(code, "unknown_slot");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.slots.list",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(listed["slots"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(listed["weeklyTotalMinutes"], 0);

    let _ = std::fs::remove_dir_all(workspace);
}
