use crate::allocator::PlanEntry;
use crate::catalog::Catalog;
use crate::db::now_ts;
use crate::error::{PlanError, PlanResult};
use crate::ledger;
use crate::timegrid::week_start_for;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub commit_id: Option<String>,
    pub week_start: Option<NaiveDate>,
    pub entries_applied: usize,
    pub minutes_applied: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekCommits {
    pub committed_minutes: i64,
    pub commit_count: i64,
}

/// Folds a previewed plan into the ledger, entry by entry in the given order, and logs the
/// commit against the week of its earliest entry. Runs in one transaction: a failing entry
/// leaves the ledger untouched.
pub fn apply_plan(
    conn: &Connection,
    catalog: &impl Catalog,
    student_id: &str,
    entries: &[PlanEntry],
) -> PlanResult<CommitSummary> {
    if entries.is_empty() {
        return Ok(CommitSummary {
            commit_id: None,
            week_start: None,
            entries_applied: 0,
            minutes_applied: 0,
        });
    }
    if let Some(bad) = entries.iter().find(|e| e.allocated_minutes < 0) {
        return Err(PlanError::InvalidMinutes(bad.allocated_minutes));
    }

    let tx = conn.unchecked_transaction()?;
    let mut minutes_applied = 0;
    for entry in entries {
        let (_, applied) = ledger::credit_minutes(
            &tx,
            catalog,
            student_id,
            &entry.topic_id,
            entry.allocated_minutes,
        )?;
        minutes_applied += applied;
    }

    let week_start = entries
        .iter()
        .map(|e| e.date)
        .min()
        .map(week_start_for);
    let commit_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO plan_commits(id, student_id, week_start, total_minutes, entry_count, committed_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &commit_id,
            student_id,
            week_start.map(|d| d.format("%Y-%m-%d").to_string()),
            minutes_applied,
            entries.len() as i64,
            now_ts(),
        ),
    )?;
    tx.commit()?;

    tracing::info!(
        student_id,
        commit_id = %commit_id,
        entries = entries.len(),
        minutes_applied,
        "plan committed"
    );

    Ok(CommitSummary {
        commit_id: Some(commit_id),
        week_start,
        entries_applied: entries.len(),
        minutes_applied,
    })
}

pub fn week_commits(
    conn: &Connection,
    student_id: &str,
    week_start: NaiveDate,
) -> PlanResult<WeekCommits> {
    let (committed_minutes, commit_count) = conn.query_row(
        "SELECT COALESCE(SUM(total_minutes), 0), COUNT(*)
         FROM plan_commits
         WHERE student_id = ? AND week_start = ?",
        (student_id, week_start.format("%Y-%m-%d").to_string()),
        |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
    )?;
    Ok(WeekCommits {
        committed_minutes,
        commit_count,
    })
}
