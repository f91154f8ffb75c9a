use crate::catalog::SqliteCatalog;
use crate::ipc::error::{ok, plan_err};
use crate::ipc::helpers::{db_conn, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use serde_json::json;

fn handle_progress_ensure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match ledger::ensure_progress_for_student(conn, &SqliteCatalog::new(conn), &student_id) {
        Ok(created) => ok(
            &req.id,
            json!({ "studentId": student_id, "created": created }),
        ),
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_progress_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match ledger::get_progress(conn, &student_id) {
        Ok(rows) => {
            let completed = rows.iter().filter(|r| r.progress.completed).count();
            ok(
                &req.id,
                json!({
                    "studentId": student_id,
                    "progress": rows,
                    "completedTopics": completed
                }),
            )
        }
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_progress_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let minutes = match required_i64(req, "minutes") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match ledger::update_progress(
        conn,
        &SqliteCatalog::new(conn),
        &student_id,
        &topic_id,
        minutes,
    ) {
        Ok(progress) => ok(&req.id, json!({ "progress": progress })),
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_progress_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match ledger::reset_topic_progress(conn, &SqliteCatalog::new(conn), &student_id, &topic_id) {
        Ok(progress) => {
            tracing::info!(student_id = %student_id, topic_id = %topic_id, "topic progress reset");
            ok(&req.id, json!({ "progress": progress }))
        }
        Err(e) => plan_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.ensure" => Some(handle_progress_ensure(state, req)),
        "progress.get" => Some(handle_progress_get(state, req)),
        "progress.update" => Some(handle_progress_update(state, req)),
        "progress.reset" => Some(handle_progress_reset(state, req)),
        _ => None,
    }
}
