use crate::timegrid::{ClockTime, Weekday};
use serde_json::json;

/// Failures raised by the calendar, ledger and allocator.
///
/// Every variant is recoverable at the call site; calendar operations that fail leave the
/// calendar exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("slot overlaps {slot_id} on {day} {start}-{end}")]
    ScheduleConflict {
        slot_id: String,
        day: Weekday,
        start: ClockTime,
        end: ClockTime,
    },
    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),
    #[error("unknown slot: {0}")]
    UnknownSlot(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
    #[error("minutes must be >= 0 (got {0})")]
    InvalidMinutes(i64),
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub type PlanResult<T> = Result<T, PlanError>;

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::ScheduleConflict { .. } => "schedule_conflict",
            PlanError::InvalidBoundary(_) => "invalid_boundary",
            PlanError::UnknownSlot(_) => "unknown_slot",
            PlanError::UnknownTopic(_) => "unknown_topic",
            PlanError::UnknownSubject(_) => "unknown_subject",
            PlanError::InvalidMinutes(_) => "invalid_minutes",
            PlanError::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            PlanError::ScheduleConflict {
                slot_id,
                day,
                start,
                end,
            } => Some(json!({
                "conflictingSlot": {
                    "id": slot_id,
                    "day": day,
                    "start": start,
                    "end": end
                }
            })),
            PlanError::UnknownSlot(id) => Some(json!({ "slotId": id })),
            PlanError::UnknownTopic(id) => Some(json!({ "topicId": id })),
            PlanError::UnknownSubject(id) => Some(json!({ "subjectId": id })),
            _ => None,
        }
    }
}
