mod test_support;

use serde_json::json;
use test_support::{open_seeded_workspace, request_ok, spawn_sidecar, temp_dir};

#[test]
fn summary_breaks_down_scheduled_minutes() {
    let workspace = temp_dir("guidance-workload-summary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let slots = [
        (1, "09:00", "11:00", "math"),
        (1, "14:00", "15:00", "physics"),
        (3, "09:00", "12:00", "math"),
        (6, "10:00", "11:30", "physics"),
    ];
    for (i, (day, start, end, subject)) in slots.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("add{}", i),
            "calendar.slots.add",
            json!({ "studentId": "s1", "subjectId": subject, "day": day, "start": start, "end": end }),
        );
    }

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workload.summary",
        json!({ "studentId": "s1", "date": "2026-10-25" }),
    );
    assert_eq!(summary["studentId"], "s1");
    assert_eq!(summary["weekStart"], "2026-10-19");
    assert_eq!(summary["scheduledMinutes"], 450);
    assert_eq!(summary["load"], "balanced");
    assert_eq!(summary.pointer("/thresholds/minWeeklyMinutes"), Some(&json!(300)));
    assert_eq!(summary.pointer("/thresholds/maxWeeklyMinutes"), Some(&json!(600)));
    assert_eq!(summary["commitCount"], 0);

    let per_day = summary["perDay"].as_array().expect("perDay");
    assert_eq!(per_day.len(), 7);
    assert_eq!(per_day[0]["day"], 1);
    assert_eq!(per_day[0]["label"], "Mon");
    assert_eq!(per_day[0]["minutes"], 180);
    assert_eq!(per_day[1]["minutes"], 0);
    assert_eq!(per_day[2]["minutes"], 180);
    assert_eq!(per_day[5]["minutes"], 90);

    let per_subject = summary["perSubject"].as_array().expect("perSubject");
    assert_eq!(per_subject.len(), 2);
    assert_eq!(per_subject[0]["subjectId"], "math");
    assert_eq!(per_subject[0]["subjectName"], "Matematik");
    assert_eq!(per_subject[0]["minutes"], 300);
    assert_eq!(per_subject[1]["subjectId"], "physics");
    assert_eq!(per_subject[1]["minutes"], 150);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn thresholds_come_from_setup() {
    let workspace = temp_dir("guidance-workload-thresholds");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.slots.add",
        json!({ "studentId": "s1", "subjectId": "math", "day": 2, "start": "08:00", "end": "12:00" }),
    );
    let under = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workload.summary",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(under["load"], "under");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "workload", "patch": { "minWeeklyMinutes": 60, "maxWeeklyMinutes": 120 } }),
    );
    let over = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workload.summary",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(over["load"], "over");
    let total = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.weeklyTotal",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(total["load"], "over");

    let _ = std::fs::remove_dir_all(workspace);
}
