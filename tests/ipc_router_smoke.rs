mod test_support;

use serde_json::json;
use test_support::{open_seeded_workspace, request, spawn_sidecar, temp_dir};

fn assert_routed(value: &serde_json::Value, method: &str) {
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("guidance-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "0", "health", json!({}));
    assert_eq!(health["ok"], true);
    open_seeded_workspace(&mut stdin, &mut reader, &workspace);

    let calls = [
        ("catalog.subjects.list", json!({})),
        ("catalog.topics.list", json!({ "subjectId": "math" })),
        (
            "calendar.slots.add",
            json!({ "studentId": "s1", "subjectId": "math", "day": 1, "start": "09:00" }),
        ),
        ("calendar.slots.list", json!({ "studentId": "s1" })),
        ("calendar.slots.move", json!({ "slotId": "missing", "day": 1, "start": "09:00" })),
        (
            "calendar.slots.resize",
            json!({ "slotId": "missing", "edge": "end", "time": "10:00" }),
        ),
        ("calendar.slots.remove", json!({ "slotId": "missing" })),
        ("calendar.weeklyTotal", json!({ "studentId": "s1" })),
        ("progress.ensure", json!({ "studentId": "s1" })),
        ("progress.get", json!({ "studentId": "s1" })),
        ("progress.update", json!({ "studentId": "s1", "topicId": "m-a", "minutes": 5 })),
        ("progress.reset", json!({ "studentId": "s1", "topicId": "m-a" })),
        ("plan.preview", json!({ "studentId": "s1" })),
        ("plan.apply", json!({ "studentId": "s1", "entries": [] })),
        ("plan.commitWeek", json!({ "studentId": "s1" })),
        ("workload.summary", json!({ "studentId": "s1" })),
        ("setup.get", json!({})),
        (
            "setup.update",
            json!({ "section": "calendar", "patch": { "defaultSlotMinutes": 60 } }),
        ),
        (
            "backup.exportWorkspaceBundle",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
        (
            "backup.importWorkspaceBundle",
            json!({ "inPath": bundle_out.to_string_lossy() }),
        ),
    ];
    for (i, (method, params)) in calls.iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &format!("{}", i + 1), method, params.clone());
        assert_routed(&value, method);
    }

    let unknown = request(&mut stdin, &mut reader, "99", "grades.list", json!({}));
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown.pointer("/error/code"), Some(&json!("not_implemented")));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn requests_before_workspace_select_fail_cleanly() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let value = request(
        &mut stdin,
        &mut reader,
        "1",
        "calendar.slots.list",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(value["ok"], false);
    assert_eq!(value.pointer("/error/code"), Some(&json!("no_workspace")));
}
