use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::timegrid::GRID_MINUTES;
use crate::workload::WorkloadThresholds;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Calendar,
    Workload,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(Self::Calendar),
            "workload" => Some(Self::Workload),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Calendar => "setup.calendar",
            Self::Workload => "setup.workload",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CalendarDefaults {
    pub default_slot_minutes: i64,
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Calendar => json!({
            "defaultSlotMinutes": 60
        }),
        SetupSection::Workload => {
            let th = WorkloadThresholds::default();
            json!({
                "minWeeklyMinutes": th.min_weekly_minutes,
                "maxWeeklyMinutes": th.max_weekly_minutes
            })
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Calendar => match k.as_str() {
                "defaultSlotMinutes" => {
                    let n = parse_i64_range(v, k, GRID_MINUTES, 240)?;
                    if n % GRID_MINUTES != 0 {
                        return Err(format!("{} must be a multiple of {}", k, GRID_MINUTES));
                    }
                    obj.insert(k.clone(), Value::from(n));
                }
                _ => return Err(format!("unknown calendar field: {}", k)),
            },
            SetupSection::Workload => match k.as_str() {
                "minWeeklyMinutes" | "maxWeeklyMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 7 * 17 * 60)?));
                }
                _ => return Err(format!("unknown workload field: {}", k)),
            },
        }
    }
    if let SetupSection::Workload = section {
        let min = obj.get("minWeeklyMinutes").and_then(|v| v.as_i64()).unwrap_or(0);
        let max = obj.get("maxWeeklyMinutes").and_then(|v| v.as_i64()).unwrap_or(0);
        if min >= max {
            return Err("minWeeklyMinutes must be below maxWeeklyMinutes".into());
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values must not block the planner; keep the defaults instead.
            let mut candidate = current.clone();
            match merge_section_patch(section, &mut candidate, saved_obj) {
                Ok(()) => current = candidate,
                Err(msg) => {
                    tracing::warn!(key = section.key(), error = %msg, "ignoring stored settings")
                }
            }
        }
    }
    Ok(current)
}

fn load_or_default(conn: &rusqlite::Connection, section: SetupSection) -> Value {
    load_section(conn, section).unwrap_or_else(|e| {
        tracing::warn!(key = section.key(), error = %e, "settings unreadable, using defaults");
        default_section(section)
    })
}

pub fn load_calendar_defaults(conn: &rusqlite::Connection) -> CalendarDefaults {
    let obj = load_or_default(conn, SetupSection::Calendar);
    CalendarDefaults {
        default_slot_minutes: obj
            .get("defaultSlotMinutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(60),
    }
}

pub fn load_workload_thresholds(conn: &rusqlite::Connection) -> WorkloadThresholds {
    let obj = load_or_default(conn, SetupSection::Workload);
    let fallback = WorkloadThresholds::default();
    WorkloadThresholds {
        min_weekly_minutes: obj
            .get("minWeeklyMinutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(fallback.min_weekly_minutes),
        max_weekly_minutes: obj
            .get("maxWeeklyMinutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(fallback.max_weekly_minutes),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let calendar = match load_section(conn, SetupSection::Calendar) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let workload = match load_section(conn, SetupSection::Workload) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "calendar": calendar,
            "workload": workload
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(key = section.key(), "settings updated");
    ok(&req.id, json!({ "ok": true, section_raw: current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
