use crate::db::now_ts;
use crate::error::{PlanError, PlanResult};
use crate::timegrid::{ClockTime, Weekday, DAY_END, DAY_START};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySlot {
    pub id: String,
    pub student_id: String,
    pub day: Weekday,
    pub start: ClockTime,
    pub end: ClockTime,
    pub subject_id: String,
}

impl WeeklySlot {
    pub fn duration_minutes(&self) -> i64 {
        self.start.minutes_until(self.end)
    }

    pub fn overlaps(&self, day: Weekday, start: ClockTime, end: ClockTime) -> bool {
        self.day == day && spans_overlap(self.start, self.end, start, end)
    }
}

/// Half-open spans `[a_start, a_end)` and `[b_start, b_end)` share at least one minute.
pub fn spans_overlap(a_start: ClockTime, a_end: ClockTime, b_start: ClockTime, b_end: ClockTime) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
}

impl Edge {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" | "top" => Some(Self::Start),
            "end" | "bottom" => Some(Self::End),
            _ => None,
        }
    }
}

fn validate_span(start: ClockTime, end: ClockTime) -> PlanResult<()> {
    if !start.is_on_grid() || !end.is_on_grid() {
        return Err(PlanError::InvalidBoundary(format!(
            "{}-{} is not on the 30-minute grid",
            start, end
        )));
    }
    if start < DAY_START || end > DAY_END {
        return Err(PlanError::InvalidBoundary(format!(
            "{}-{} is outside {}-{}",
            start, end, DAY_START, DAY_END
        )));
    }
    if end <= start {
        return Err(PlanError::InvalidBoundary(format!(
            "end {} must be after start {}",
            end, start
        )));
    }
    Ok(())
}

/// One student's recurring week.
///
/// All mutations compute the candidate position first and only touch `slots` once the
/// candidate has passed validation and the overlap check, so a failed call is a no-op.
#[derive(Debug, Clone, Default)]
pub struct SlotCalendar {
    student_id: String,
    slots: Vec<WeeklySlot>,
}

impl SlotCalendar {
    pub fn new(student_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            slots: Vec::new(),
        }
    }

    pub fn from_slots(student_id: &str, slots: Vec<WeeklySlot>) -> Self {
        let mut cal = Self {
            student_id: student_id.to_string(),
            slots,
        };
        cal.sort();
        cal
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    /// Ordered by `(day, start)`.
    pub fn slots(&self) -> &[WeeklySlot] {
        &self.slots
    }

    pub fn get(&self, slot_id: &str) -> Option<&WeeklySlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    pub fn weekly_total_minutes(&self) -> i64 {
        self.slots.iter().map(WeeklySlot::duration_minutes).sum()
    }

    pub fn day_minutes(&self, day: Weekday) -> i64 {
        self.slots
            .iter()
            .filter(|s| s.day == day)
            .map(WeeklySlot::duration_minutes)
            .sum()
    }

    fn sort(&mut self) {
        self.slots
            .sort_by(|a, b| (a.day, a.start, &a.id).cmp(&(b.day, b.start, &b.id)));
    }

    fn index_of(&self, slot_id: &str) -> PlanResult<usize> {
        self.slots
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| PlanError::UnknownSlot(slot_id.to_string()))
    }

    /// Fails with the first other slot on `day` that shares a minute with `[start, end)`.
    pub fn check_free(
        &self,
        ignore_id: Option<&str>,
        day: Weekday,
        start: ClockTime,
        end: ClockTime,
    ) -> PlanResult<()> {
        let hit = self
            .slots
            .iter()
            .filter(|s| Some(s.id.as_str()) != ignore_id)
            .find(|s| s.overlaps(day, start, end));
        match hit {
            Some(other) => Err(PlanError::ScheduleConflict {
                slot_id: other.id.clone(),
                day: other.day,
                start: other.start,
                end: other.end,
            }),
            None => Ok(()),
        }
    }

    /// Explicit times must already sit on the grid inside the day window.
    pub fn add(
        &mut self,
        id: String,
        day: Weekday,
        start: ClockTime,
        end: ClockTime,
        subject_id: &str,
    ) -> PlanResult<WeeklySlot> {
        validate_span(start, end)?;
        self.check_free(None, day, start, end)?;
        let slot = WeeklySlot {
            id,
            student_id: self.student_id.clone(),
            day,
            start,
            end,
            subject_id: subject_id.to_string(),
        };
        self.slots.push(slot.clone());
        self.sort();
        Ok(slot)
    }

    /// Keeps the duration; the new start is snapped and the block clamped into the day window.
    pub fn move_slot(
        &mut self,
        slot_id: &str,
        new_day: Weekday,
        new_start: ClockTime,
    ) -> PlanResult<WeeklySlot> {
        let idx = self.index_of(slot_id)?;
        let duration = self.slots[idx].duration_minutes();
        let latest_start = DAY_END.advanced_by(-duration);
        let start = new_start.snapped().clamp(DAY_START, latest_start);
        let end = start.advanced_by(duration);
        self.check_free(Some(slot_id), new_day, start, end)?;

        let slot = &mut self.slots[idx];
        slot.day = new_day;
        slot.start = start;
        slot.end = end;
        let moved = slot.clone();
        self.sort();
        Ok(moved)
    }

    /// Moves one edge. The boundary is snapped, clamped to the day window and to the nearest
    /// neighbour on the same day, so a resize stops at an adjacent slot instead of covering it.
    pub fn resize(
        &mut self,
        slot_id: &str,
        edge: Edge,
        boundary: ClockTime,
    ) -> PlanResult<WeeklySlot> {
        let idx = self.index_of(slot_id)?;
        let current = self.slots[idx].clone();
        let same_day = self
            .slots
            .iter()
            .filter(|s| s.id != current.id && s.day == current.day);
        let snapped = boundary.snapped();

        let (start, end) = match edge {
            Edge::Start => {
                let floor = same_day
                    .filter(|s| s.end <= current.start)
                    .map(|s| s.end)
                    .max()
                    .unwrap_or(DAY_START)
                    .max(DAY_START);
                (snapped.max(floor), current.end)
            }
            Edge::End => {
                let ceiling = same_day
                    .filter(|s| s.start >= current.end)
                    .map(|s| s.start)
                    .min()
                    .unwrap_or(DAY_END)
                    .min(DAY_END);
                (current.start, snapped.min(ceiling))
            }
        };
        if end <= start {
            return Err(PlanError::InvalidBoundary(format!(
                "resize would leave {}-{}",
                start, end
            )));
        }
        self.check_free(Some(slot_id), current.day, start, end)?;

        let slot = &mut self.slots[idx];
        slot.start = start;
        slot.end = end;
        let resized = slot.clone();
        self.sort();
        Ok(resized)
    }

    pub fn remove(&mut self, slot_id: &str) -> PlanResult<WeeklySlot> {
        let idx = self.index_of(slot_id)?;
        Ok(self.slots.remove(idx))
    }
}

fn slot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WeeklySlot> {
    let day_raw: i64 = row.get(2)?;
    let start_raw: i64 = row.get(3)?;
    let end_raw: i64 = row.get(4)?;
    let day = Weekday::from_number(day_raw)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, day_raw))?;
    let start = ClockTime::from_minutes(start_raw)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(3, start_raw))?;
    let end = ClockTime::from_minutes(end_raw)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, end_raw))?;
    Ok(WeeklySlot {
        id: row.get(0)?,
        student_id: row.get(1)?,
        day,
        start,
        end,
        subject_id: row.get(5)?,
    })
}

pub fn load_calendar(conn: &Connection, student_id: &str) -> PlanResult<SlotCalendar> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, day, start_minute, end_minute, subject_id
         FROM weekly_slots
         WHERE student_id = ?",
    )?;
    let slots = stmt
        .query_map([student_id], slot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SlotCalendar::from_slots(student_id, slots))
}

pub fn slot_owner(conn: &Connection, slot_id: &str) -> PlanResult<String> {
    conn.query_row(
        "SELECT student_id FROM weekly_slots WHERE id = ?",
        [slot_id],
        |r| r.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| PlanError::UnknownSlot(slot_id.to_string()))
}

pub fn insert_slot(conn: &Connection, slot: &WeeklySlot) -> PlanResult<()> {
    conn.execute(
        "INSERT INTO weekly_slots(id, student_id, day, start_minute, end_minute, subject_id, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &slot.id,
            &slot.student_id,
            slot.day.number() as i64,
            slot.start.minutes(),
            slot.end.minutes(),
            &slot.subject_id,
            now_ts(),
        ),
    )?;
    Ok(())
}

pub fn update_slot_times(conn: &Connection, slot: &WeeklySlot) -> PlanResult<()> {
    let changed = conn.execute(
        "UPDATE weekly_slots
         SET day = ?, start_minute = ?, end_minute = ?, updated_at = ?
         WHERE id = ?",
        (
            slot.day.number() as i64,
            slot.start.minutes(),
            slot.end.minutes(),
            now_ts(),
            &slot.id,
        ),
    )?;
    if changed == 0 {
        return Err(PlanError::UnknownSlot(slot.id.clone()));
    }
    Ok(())
}

pub fn delete_slot(conn: &Connection, slot_id: &str) -> PlanResult<()> {
    let changed = conn.execute("DELETE FROM weekly_slots WHERE id = ?", [slot_id])?;
    if changed == 0 {
        return Err(PlanError::UnknownSlot(slot_id.to_string()));
    }
    Ok(())
}
