use crate::catalog::{self, Catalog, Category, MemoryCatalog, SqliteCatalog};
use crate::ipc::error::{err, ok, plan_err};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;

fn str_field<'a>(obj: &'a JsonValue, key: &str, path: &str) -> Result<&'a str, String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("{}.{} must be a non-empty string", path, key))
}

/// Builds an in-memory catalog from `params.subjects`; array positions become sort order.
fn parse_import(params: &JsonValue) -> Result<MemoryCatalog, String> {
    let subjects = params
        .get("subjects")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "subjects must be an array".to_string())?;

    let mut out = MemoryCatalog::new();
    let mut seen_subjects = HashSet::new();
    let mut seen_topics = HashSet::new();
    for (si, subject) in subjects.iter().enumerate() {
        let path = format!("subjects[{}]", si);
        let id = str_field(subject, "id", &path)?;
        let name = str_field(subject, "name", &path)?;
        let raw_category = str_field(subject, "category", &path)?;
        let category = Category::parse(raw_category).ok_or_else(|| {
            format!(
                "{}.category must be one of: LGS, YKS, TYT, AYT, YDT",
                path
            )
        })?;
        if !seen_subjects.insert(id.to_string()) {
            return Err(format!("duplicate subject id: {}", id));
        }
        out.push_subject(id, name, category);

        let topics = match subject.get("topics") {
            None | Some(JsonValue::Null) => continue,
            Some(v) => v
                .as_array()
                .ok_or_else(|| format!("{}.topics must be an array", path))?,
        };
        for (ti, topic) in topics.iter().enumerate() {
            let tpath = format!("{}.topics[{}]", path, ti);
            let topic_id = str_field(topic, "id", &tpath)?;
            let topic_name = str_field(topic, "name", &tpath)?;
            let minutes = topic
                .get("avgMinutes")
                .or_else(|| topic.get("requiredMinutes"))
                .and_then(|v| v.as_i64())
                .filter(|m| *m >= 0)
                .ok_or_else(|| format!("{}.avgMinutes must be a non-negative integer", tpath))?;
            if !seen_topics.insert(topic_id.to_string()) {
                return Err(format!("duplicate topic id: {}", topic_id));
            }
            out.push_topic(id, topic_id, topic_name, minutes);
        }
    }
    Ok(out)
}

fn handle_catalog_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let incoming = match parse_import(&req.params) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    match catalog::import_catalog(conn, &incoming) {
        Ok(summary) => {
            tracing::info!(
                subjects = incoming.subject_count(),
                topics = incoming.topic_count(),
                reconciled = summary.progress_rows_reconciled,
                "catalog imported"
            );
            ok(&req.id, json!(summary))
        }
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match SqliteCatalog::new(conn).list_subjects() {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_topics_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cat = SqliteCatalog::new(conn);
    match cat.subject(&subject_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return plan_err(
                &req.id,
                &crate::error::PlanError::UnknownSubject(subject_id),
            )
        }
        Err(e) => return plan_err(&req.id, &e),
    }
    match cat.list_topics(&subject_id) {
        Ok(topics) => ok(&req.id, json!({ "subjectId": subject_id, "topics": topics })),
        Err(e) => plan_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.import" => Some(handle_catalog_import(state, req)),
        "catalog.subjects.list" => Some(handle_subjects_list(state, req)),
        "catalog.topics.list" => Some(handle_topics_list(state, req)),
        _ => None,
    }
}
