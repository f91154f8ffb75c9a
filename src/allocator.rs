//! Weekly allocation: turns a student's recurring slots into a concrete, ordered plan of topic
//! study for one week without touching the ledger.
//!
//! Slots are visited strictly in `(date, start)` order. Each subject keeps a cursor into its
//! curriculum and a working copy of remaining minutes, so a topic that does not fit in one slot
//! carries over into the next slot of the same subject, even on a later day. Leftover capacity
//! after a subject runs out of topics stays idle.

use crate::calendar::{self, WeeklySlot};
use crate::catalog::{Catalog, SqliteCatalog, Topic};
use crate::error::PlanResult;
use crate::ledger;
use crate::timegrid::{date_in_week, ClockTime};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    #[serde(default)]
    pub slot_id: String,
    pub date: NaiveDate,
    pub start: ClockTime,
    pub end: ClockTime,
    pub subject_id: String,
    pub topic_id: String,
    pub allocated_minutes: i64,
    pub remaining_after: i64,
}

struct TopicQueue {
    topics: Vec<(Topic, i64)>,
    cursor: usize,
}

impl TopicQueue {
    fn new(topics: Vec<Topic>, remaining: &HashMap<String, i64>) -> Self {
        let topics = topics
            .into_iter()
            .map(|t| {
                // No ledger row yet means the topic has not been started.
                let left = remaining
                    .get(&t.id)
                    .copied()
                    .unwrap_or(t.required_minutes)
                    .max(0);
                (t, left)
            })
            .collect();
        let mut queue = Self { topics, cursor: 0 };
        queue.skip_finished();
        queue
    }

    fn skip_finished(&mut self) {
        while self.cursor < self.topics.len() && self.topics[self.cursor].1 <= 0 {
            self.cursor += 1;
        }
    }

    fn current(&mut self) -> Option<&mut (Topic, i64)> {
        self.topics.get_mut(self.cursor)
    }
}

/// Distributes outstanding topic minutes over the week starting at `week_start` (a Monday).
///
/// `remaining` maps topic id to the ledger's remaining minutes; topics without an entry count
/// as un-started.
pub fn plan_week(
    week_start: NaiveDate,
    slots: &[WeeklySlot],
    catalog: &impl Catalog,
    remaining: &HashMap<String, i64>,
) -> PlanResult<Vec<PlanEntry>> {
    let mut sequence: Vec<(NaiveDate, &WeeklySlot)> = slots
        .iter()
        .map(|s| (date_in_week(week_start, s.day), s))
        .collect();
    sequence.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.start.cmp(&b.1.start))
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    let mut queues: HashMap<String, TopicQueue> = HashMap::new();
    let mut entries = Vec::new();

    for (date, slot) in sequence {
        if !queues.contains_key(&slot.subject_id) {
            let topics = catalog.list_topics(&slot.subject_id)?;
            queues.insert(slot.subject_id.clone(), TopicQueue::new(topics, remaining));
        }
        let Some(queue) = queues.get_mut(&slot.subject_id) else {
            continue;
        };

        let mut capacity = slot.duration_minutes();
        let mut position = slot.start;
        while capacity > 0 {
            let Some((topic, left)) = queue.current() else {
                break;
            };
            let allocated = capacity.min(*left);
            let end = position.advanced_by(allocated);
            *left -= allocated;
            entries.push(PlanEntry {
                slot_id: slot.id.clone(),
                date,
                start: position,
                end,
                subject_id: slot.subject_id.clone(),
                topic_id: topic.id.clone(),
                allocated_minutes: allocated,
                remaining_after: *left,
            });
            capacity -= allocated;
            position = end;
            queue.skip_finished();
        }
    }

    Ok(entries)
}

/// Loads the student's calendar, catalog and ledger and plans the given week.
pub fn preview_week(
    conn: &Connection,
    student_id: &str,
    week_start: NaiveDate,
) -> PlanResult<Vec<PlanEntry>> {
    let cal = calendar::load_calendar(conn, student_id)?;
    let remaining = ledger::remaining_by_topic(conn, student_id)?;
    let entries = plan_week(week_start, cal.slots(), &SqliteCatalog::new(conn), &remaining)?;
    tracing::debug!(
        student_id,
        %week_start,
        slots = cal.slots().len(),
        entries = entries.len(),
        "planned week"
    );
    Ok(entries)
}

pub fn total_allocated(entries: &[PlanEntry]) -> i64 {
    entries.iter().map(|e| e.allocated_minutes).sum()
}
