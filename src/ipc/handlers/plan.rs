use crate::allocator::{self, PlanEntry};
use crate::catalog::SqliteCatalog;
use crate::commit;
use crate::ipc::error::{err, ok, plan_err};
use crate::ipc::helpers::{db_conn, required_str, week_start_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_plan_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let week_start = match week_start_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match allocator::preview_week(conn, &student_id, week_start) {
        Ok(v) => v,
        Err(e) => return plan_err(&req.id, &e),
    };
    let commits = match commit::week_commits(conn, &student_id, week_start) {
        Ok(v) => v,
        Err(e) => return plan_err(&req.id, &e),
    };
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "weekStart": week_start,
            "entries": entries,
            "totalAllocatedMinutes": allocator::total_allocated(&entries),
            "alreadyCommitted": commits.commit_count > 0
        }),
    )
}

fn handle_plan_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw_entries) = req.params.get("entries") else {
        return err(&req.id, "bad_params", "missing entries", None);
    };
    let entries: Vec<PlanEntry> = match serde_json::from_value(raw_entries.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("entries are not plan entries: {}", e),
                None,
            )
        }
    };
    match commit::apply_plan(conn, &SqliteCatalog::new(conn), &student_id, &entries) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => plan_err(&req.id, &e),
    }
}

/// Recomputes the week's preview and commits it in one step, so the client never has to
/// round-trip entries it did not edit.
fn handle_plan_commit_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let week_start = match week_start_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match allocator::preview_week(conn, &student_id, week_start) {
        Ok(v) => v,
        Err(e) => return plan_err(&req.id, &e),
    };
    match commit::apply_plan(conn, &SqliteCatalog::new(conn), &student_id, &entries) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "weekStart": week_start,
                "entries": entries,
                "commit": summary
            }),
        ),
        Err(e) => plan_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plan.preview" => Some(handle_plan_preview(state, req)),
        "plan.apply" => Some(handle_plan_apply(state, req)),
        "plan.commitWeek" => Some(handle_plan_commit_week(state, req)),
        _ => None,
    }
}
