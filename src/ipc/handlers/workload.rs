use crate::calendar;
use crate::catalog::{Catalog, SqliteCatalog};
use crate::commit;
use crate::ipc::error::{ok, plan_err};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, required_str, week_start_param};
use crate::ipc::types::{AppState, Request};
use crate::workload;
use serde_json::json;

fn handle_workload_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let thresholds = setup::load_workload_thresholds(conn);

    let cal = match calendar::load_calendar(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return plan_err(&req.id, &e),
    };
    let subjects = match SqliteCatalog::new(conn).list_subjects() {
        Ok(v) => v,
        Err(e) => return plan_err(&req.id, &e),
    };
    let commits = match commit::week_commits(conn, &student_id, week_start) {
        Ok(v) => v,
        Err(e) => return plan_err(&req.id, &e),
    };

    let summary = workload::summarize(&cal, &subjects, thresholds, week_start, commits);
    ok(&req.id, json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workload.summary" => Some(handle_workload_summary(state, req)),
        _ => None,
    }
}
