use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::timegrid::{parse_iso_date, week_start_for, ClockTime, Weekday};
use chrono::NaiveDate;
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be integer", key), None))
}

pub fn required_day(req: &Request, key: &str) -> Result<Weekday, serde_json::Value> {
    let n = required_i64(req, key)?;
    Weekday::from_number(n).ok_or_else(|| {
        err(
            &req.id,
            "invalid_boundary",
            format!("{} must be in 1..=7", key),
            Some(serde_json::json!({ key: n })),
        )
    })
}

/// `HH:MM` strings only; grid and window rules belong to the calendar.
pub fn clock_param(req: &Request, key: &str) -> Result<Option<ClockTime>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let raw = v.as_str().unwrap_or("");
            ClockTime::parse(raw).map(Some).ok_or_else(|| {
                err(
                    &req.id,
                    "invalid_boundary",
                    format!("{} must be HH:MM", key),
                    Some(serde_json::json!({ key: v })),
                )
            })
        }
    }
}

pub fn required_clock(req: &Request, key: &str) -> Result<ClockTime, serde_json::Value> {
    clock_param(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Monday of the week containing `params.date` (or today when absent).
pub fn week_start_param(req: &Request) -> Result<NaiveDate, serde_json::Value> {
    let date = match req.params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => parse_iso_date(raw).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "date must be YYYY-MM-DD",
                Some(serde_json::json!({ "date": raw })),
            )
        })?,
        None => chrono::Local::now().date_naive(),
    };
    Ok(week_start_for(date))
}
