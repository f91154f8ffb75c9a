use crate::catalog::{Catalog, Topic};
use crate::db::now_ts;
use crate::error::{PlanError, PlanResult};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

/// One student's standing on one topic.
///
/// `completed_minutes + remaining_minutes` always equals the topic's required minutes and
/// `completed` is true exactly when nothing remains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub student_id: String,
    pub topic_id: String,
    pub completed_minutes: i64,
    pub remaining_minutes: i64,
    pub completed: bool,
}

impl TopicProgress {
    pub fn fresh(student_id: &str, topic: &Topic) -> Self {
        let required = topic.required_minutes.max(0);
        Self {
            student_id: student_id.to_string(),
            topic_id: topic.id.clone(),
            completed_minutes: 0,
            remaining_minutes: required,
            completed: required == 0,
        }
    }

    pub fn required_minutes(&self) -> i64 {
        self.completed_minutes + self.remaining_minutes
    }

    /// Returns the minutes actually credited; anything past `remaining_minutes` is dropped.
    pub fn record(&mut self, minutes: i64) -> PlanResult<i64> {
        if minutes < 0 {
            return Err(PlanError::InvalidMinutes(minutes));
        }
        let applied = minutes.min(self.remaining_minutes);
        self.completed_minutes += applied;
        self.remaining_minutes -= applied;
        self.completed = self.remaining_minutes == 0;
        Ok(applied)
    }

    pub fn reset(&mut self) {
        self.remaining_minutes = self.required_minutes();
        self.completed_minutes = 0;
        self.completed = self.remaining_minutes == 0;
    }

    /// Re-bases the row on a changed requirement. Returns whether anything moved.
    pub fn reconcile(&mut self, required_minutes: i64) -> bool {
        let required = required_minutes.max(0);
        if required == self.required_minutes() {
            return false;
        }
        self.completed_minutes = self.completed_minutes.min(required);
        self.remaining_minutes = required - self.completed_minutes;
        self.completed = self.remaining_minutes == 0;
        true
    }
}

/// Ledger row joined with catalog labels, as shown in progress screens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    #[serde(flatten)]
    pub progress: TopicProgress,
    pub subject_id: String,
    pub topic_name: String,
    pub required_minutes: i64,
}

fn progress_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TopicProgress> {
    Ok(TopicProgress {
        student_id: row.get(0)?,
        topic_id: row.get(1)?,
        completed_minutes: row.get(2)?,
        remaining_minutes: row.get(3)?,
        completed: row.get::<_, i64>(4)? != 0,
    })
}

fn load_row(conn: &Connection, student_id: &str, topic_id: &str) -> PlanResult<Option<TopicProgress>> {
    Ok(conn
        .query_row(
            "SELECT student_id, topic_id, completed_minutes, remaining_minutes, completed
             FROM topic_progress
             WHERE student_id = ? AND topic_id = ?",
            [student_id, topic_id],
            progress_from_row,
        )
        .optional()?)
}

fn save_row(conn: &Connection, p: &TopicProgress) -> PlanResult<()> {
    conn.execute(
        "INSERT INTO topic_progress(student_id, topic_id, completed_minutes, remaining_minutes, completed, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, topic_id) DO UPDATE SET
           completed_minutes = excluded.completed_minutes,
           remaining_minutes = excluded.remaining_minutes,
           completed = excluded.completed,
           updated_at = excluded.updated_at",
        (
            &p.student_id,
            &p.topic_id,
            p.completed_minutes,
            p.remaining_minutes,
            p.completed as i64,
            now_ts(),
        ),
    )?;
    Ok(())
}

/// Creates an un-started row for every catalog topic this student has no row for.
/// Returns how many rows were created; a second call creates none.
pub fn ensure_progress_for_student(
    conn: &Connection,
    catalog: &impl Catalog,
    student_id: &str,
) -> PlanResult<usize> {
    let mut created = 0;
    for topic in catalog.all_topics()? {
        let fresh = TopicProgress::fresh(student_id, &topic);
        created += conn.execute(
            "INSERT OR IGNORE INTO topic_progress(student_id, topic_id, completed_minutes, remaining_minutes, completed, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &fresh.student_id,
                &fresh.topic_id,
                fresh.completed_minutes,
                fresh.remaining_minutes,
                fresh.completed as i64,
                now_ts(),
            ),
        )?;
    }
    Ok(created)
}

/// Rows in curriculum order: subject order, then topic order.
pub fn get_progress(conn: &Connection, student_id: &str) -> PlanResult<Vec<ProgressView>> {
    let mut stmt = conn.prepare(
        "SELECT p.student_id, p.topic_id, p.completed_minutes, p.remaining_minutes, p.completed,
                t.subject_id, t.name, t.avg_minutes
         FROM topic_progress p
         JOIN topics t ON t.id = p.topic_id
         JOIN subjects s ON s.id = t.subject_id
         WHERE p.student_id = ?
         ORDER BY s.sort_order, s.id, t.sort_order, t.id",
    )?;
    let rows = stmt
        .query_map([student_id], |row| {
            Ok(ProgressView {
                progress: progress_from_row(row)?,
                subject_id: row.get(5)?,
                topic_name: row.get(6)?,
                required_minutes: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remaining minutes keyed by topic id, for topics that have a row.
pub fn remaining_by_topic(conn: &Connection, student_id: &str) -> PlanResult<HashMap<String, i64>> {
    let mut stmt =
        conn.prepare("SELECT topic_id, remaining_minutes FROM topic_progress WHERE student_id = ?")?;
    let rows = stmt
        .query_map([student_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

fn current_or_fresh(
    conn: &Connection,
    catalog: &impl Catalog,
    student_id: &str,
    topic_id: &str,
) -> PlanResult<TopicProgress> {
    let topic = catalog
        .topic(topic_id)?
        .ok_or_else(|| PlanError::UnknownTopic(topic_id.to_string()))?;
    let mut row = match load_row(conn, student_id, topic_id)? {
        Some(row) => row,
        None => TopicProgress::fresh(student_id, &topic),
    };
    // Heal rows written before a catalog change that skipped reconciliation.
    row.reconcile(topic.required_minutes);
    Ok(row)
}

pub fn update_progress(
    conn: &Connection,
    catalog: &impl Catalog,
    student_id: &str,
    topic_id: &str,
    minutes: i64,
) -> PlanResult<TopicProgress> {
    credit_minutes(conn, catalog, student_id, topic_id, minutes).map(|(row, _)| row)
}

/// Like [`update_progress`] but also reports how many minutes were actually credited.
pub fn credit_minutes(
    conn: &Connection,
    catalog: &impl Catalog,
    student_id: &str,
    topic_id: &str,
    minutes: i64,
) -> PlanResult<(TopicProgress, i64)> {
    if minutes < 0 {
        return Err(PlanError::InvalidMinutes(minutes));
    }
    let mut row = current_or_fresh(conn, catalog, student_id, topic_id)?;
    let applied = row.record(minutes)?;
    if applied < minutes {
        tracing::debug!(
            student_id,
            topic_id,
            requested = minutes,
            applied,
            "progress update clamped at topic requirement"
        );
    }
    save_row(conn, &row)?;
    Ok((row, applied))
}

pub fn reset_topic_progress(
    conn: &Connection,
    catalog: &impl Catalog,
    student_id: &str,
    topic_id: &str,
) -> PlanResult<TopicProgress> {
    let mut row = current_or_fresh(conn, catalog, student_id, topic_id)?;
    row.reset();
    save_row(conn, &row)?;
    Ok(row)
}

/// Re-bases every student's row for `topic_id` on a new requirement.
pub fn reconcile_topic(conn: &Connection, topic_id: &str, required_minutes: i64) -> PlanResult<usize> {
    let mut stmt = conn.prepare(
        "SELECT student_id, topic_id, completed_minutes, remaining_minutes, completed
         FROM topic_progress
         WHERE topic_id = ?",
    )?;
    let rows = stmt
        .query_map([topic_id], progress_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut changed = 0;
    for mut row in rows {
        if row.reconcile(required_minutes) {
            save_row(conn, &row)?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(required: i64) -> Topic {
        Topic {
            id: "t1".into(),
            subject_id: "math".into(),
            name: "Limits".into(),
            required_minutes: required,
            sort_order: 0,
        }
    }

    fn assert_conserved(p: &TopicProgress, required: i64) {
        assert_eq!(p.completed_minutes + p.remaining_minutes, required);
        assert!(p.remaining_minutes >= 0);
        assert_eq!(p.completed, p.remaining_minutes == 0);
    }

    #[test]
    fn record_clamps_and_flags_completion() {
        let mut p = TopicProgress::fresh("stu", &topic(90));
        assert!(!p.completed);
        assert_eq!(p.record(60).unwrap(), 60);
        assert_conserved(&p, 90);
        assert_eq!(p.record(45).unwrap(), 30);
        assert_eq!(p.remaining_minutes, 0);
        assert!(p.completed);
        assert_conserved(&p, 90);
        assert_eq!(p.record(10).unwrap(), 0);
        assert!(matches!(p.record(-5), Err(PlanError::InvalidMinutes(-5))));
    }

    #[test]
    fn reset_restores_unstarted_state() {
        let mut p = TopicProgress::fresh("stu", &topic(120));
        p.record(120).unwrap();
        p.reset();
        assert_eq!(p, TopicProgress::fresh("stu", &topic(120)));
    }

    #[test]
    fn zero_requirement_topic_starts_complete() {
        let p = TopicProgress::fresh("stu", &topic(0));
        assert!(p.completed);
        assert_conserved(&p, 0);
    }

    #[test]
    fn reconcile_keeps_conservation() {
        let mut p = TopicProgress::fresh("stu", &topic(100));
        p.record(70).unwrap();

        assert!(p.reconcile(50));
        assert_eq!((p.completed_minutes, p.remaining_minutes), (50, 0));
        assert_conserved(&p, 50);

        assert!(p.reconcile(80));
        assert_eq!((p.completed_minutes, p.remaining_minutes), (50, 30));
        assert_conserved(&p, 80);

        assert!(!p.reconcile(80));
    }
}
