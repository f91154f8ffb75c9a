use crate::calendar::{self, Edge, SlotCalendar, WeeklySlot};
use crate::catalog::{Catalog, SqliteCatalog};
use crate::error::{PlanError, PlanResult};
use crate::ipc::error::{err, ok, plan_err};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{clock_param, db_conn, required_clock, required_day, required_str};
use crate::ipc::types::{AppState, Request};
use crate::timegrid::{ClockTime, Weekday};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Loads the owning student's calendar inside a transaction, applies `op` and persists the
/// slot it returns. Nothing is written when `op` fails.
fn mutate_slot<P, O>(conn: &Connection, slot_id: &str, persist: P, op: O) -> PlanResult<WeeklySlot>
where
    P: FnOnce(&Connection, &WeeklySlot) -> PlanResult<()>,
    O: FnOnce(&mut SlotCalendar) -> PlanResult<WeeklySlot>,
{
    let tx = conn.unchecked_transaction()?;
    let owner = calendar::slot_owner(&tx, slot_id)?;
    let mut cal = calendar::load_calendar(&tx, &owner)?;
    let slot = op(&mut cal)?;
    persist(&*tx, &slot)?;
    tx.commit()?;
    Ok(slot)
}

fn insert_new_slot(
    conn: &Connection,
    student_id: &str,
    subject_id: &str,
    day: Weekday,
    start: ClockTime,
    end: ClockTime,
) -> PlanResult<WeeklySlot> {
    let tx = conn.unchecked_transaction()?;
    if SqliteCatalog::new(&tx).subject(subject_id)?.is_none() {
        return Err(PlanError::UnknownSubject(subject_id.to_string()));
    }
    let mut cal = calendar::load_calendar(&tx, student_id)?;
    let slot = cal.add(Uuid::new_v4().to_string(), day, start, end, subject_id)?;
    calendar::insert_slot(&tx, &slot)?;
    tx.commit()?;
    Ok(slot)
}

fn log_rejection(method: &str, e: &PlanError) {
    if !matches!(e, PlanError::Storage(_)) {
        tracing::debug!(method, code = e.code(), error = %e, "calendar change rejected");
    }
}

fn handle_slots_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match calendar::load_calendar(conn, &student_id) {
        Ok(cal) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "slots": cal.slots(),
                "weeklyTotalMinutes": cal.weekly_total_minutes()
            }),
        ),
        Err(e) => plan_err(&req.id, &e),
    }
}

fn add_slot(conn: &Connection, req: &Request) -> Result<WeeklySlot, serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let subject_id = required_str(req, "subjectId")?;
    let day = required_day(req, "day")?;
    let start = required_clock(req, "start")?;
    let end = match clock_param(req, "end")? {
        Some(end) => end,
        None => {
            let minutes = setup::load_calendar_defaults(conn).default_slot_minutes;
            ClockTime::from_minutes(start.minutes() + minutes).ok_or_else(|| {
                plan_err(
                    &req.id,
                    &PlanError::InvalidBoundary(format!(
                        "a {}-minute slot from {} runs past 24:00",
                        minutes, start
                    )),
                )
            })?
        }
    };

    insert_new_slot(conn, &student_id, &subject_id, day, start, end).map_err(|e| {
        log_rejection("calendar.slots.add", &e);
        plan_err(&req.id, &e)
    })
}

fn handle_slots_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match add_slot(conn, req) {
        Ok(slot) => ok(&req.id, json!({ "slot": slot })),
        Err(e) => e,
    }
}

fn handle_slots_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slot_id = match required_str(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day = match required_day(req, "day") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start = match required_clock(req, "start") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match mutate_slot(conn, &slot_id, calendar::update_slot_times, |cal| {
        cal.move_slot(&slot_id, day, start)
    }) {
        Ok(slot) => ok(&req.id, json!({ "slot": slot })),
        Err(e) => {
            log_rejection("calendar.slots.move", &e);
            plan_err(&req.id, &e)
        }
    }
}

fn handle_slots_resize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slot_id = match required_str(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let edge = match req
        .params
        .get("edge")
        .and_then(|v| v.as_str())
        .and_then(Edge::parse)
    {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "edge must be one of: start, end", None),
    };
    let time = match required_clock(req, "time") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match mutate_slot(conn, &slot_id, calendar::update_slot_times, |cal| {
        cal.resize(&slot_id, edge, time)
    }) {
        Ok(slot) => ok(&req.id, json!({ "slot": slot })),
        Err(e) => {
            log_rejection("calendar.slots.resize", &e);
            plan_err(&req.id, &e)
        }
    }
}

fn handle_slots_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slot_id = match required_str(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match mutate_slot(
        conn,
        &slot_id,
        |tx, slot| calendar::delete_slot(tx, &slot.id),
        |cal| cal.remove(&slot_id),
    ) {
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_weekly_total(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let thresholds = setup::load_workload_thresholds(conn);
    match calendar::load_calendar(conn, &student_id) {
        Ok(cal) => {
            let total = cal.weekly_total_minutes();
            ok(
                &req.id,
                json!({
                    "studentId": student_id,
                    "weeklyTotalMinutes": total,
                    "load": thresholds.classify(total)
                }),
            )
        }
        Err(e) => plan_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.slots.list" => Some(handle_slots_list(state, req)),
        "calendar.slots.add" => Some(handle_slots_add(state, req)),
        "calendar.slots.move" => Some(handle_slots_move(state, req)),
        "calendar.slots.resize" => Some(handle_slots_resize(state, req)),
        "calendar.slots.remove" => Some(handle_slots_remove(state, req)),
        "calendar.weeklyTotal" => Some(handle_weekly_total(state, req)),
        _ => None,
    }
}
