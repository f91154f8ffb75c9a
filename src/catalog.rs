use crate::error::{PlanError, PlanResult};
use crate::ledger;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "LGS")]
    Lgs,
    #[serde(rename = "YKS")]
    Yks,
    #[serde(rename = "TYT")]
    Tyt,
    #[serde(rename = "AYT")]
    Ayt,
    #[serde(rename = "YDT")]
    Ydt,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LGS" => Some(Self::Lgs),
            "YKS" => Some(Self::Yks),
            "TYT" => Some(Self::Tyt),
            "AYT" => Some(Self::Ayt),
            "YDT" => Some(Self::Ydt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lgs => "LGS",
            Self::Yks => "YKS",
            Self::Tyt => "TYT",
            Self::Ayt => "AYT",
            Self::Ydt => "YDT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub subject_id: String,
    pub name: String,
    pub required_minutes: i64,
    pub sort_order: i64,
}

/// Read side of the subject/topic catalog.
///
/// `list_topics` must return topics in curriculum order (ascending `sort_order`); the allocator
/// relies on it.
pub trait Catalog {
    fn list_subjects(&self) -> PlanResult<Vec<Subject>>;
    fn list_topics(&self, subject_id: &str) -> PlanResult<Vec<Topic>>;

    fn topic(&self, topic_id: &str) -> PlanResult<Option<Topic>> {
        for subject in self.list_subjects()? {
            if let Some(t) = self
                .list_topics(&subject.id)?
                .into_iter()
                .find(|t| t.id == topic_id)
            {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }

    fn subject(&self, subject_id: &str) -> PlanResult<Option<Subject>> {
        Ok(self
            .list_subjects()?
            .into_iter()
            .find(|s| s.id == subject_id))
    }

    fn all_topics(&self) -> PlanResult<Vec<Topic>> {
        let mut out = Vec::new();
        for subject in self.list_subjects()? {
            out.extend(self.list_topics(&subject.id)?);
        }
        Ok(out)
    }
}

pub struct SqliteCatalog<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCatalog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn subject_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    let raw_category: String = row.get(2)?;
    let category = Category::parse(&raw_category).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown category {}", raw_category).into(),
        )
    })?;
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        category,
        sort_order: row.get(3)?,
    })
}

fn topic_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        name: row.get(2)?,
        required_minutes: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

impl Catalog for SqliteCatalog<'_> {
    fn list_subjects(&self) -> PlanResult<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, category, sort_order FROM subjects ORDER BY sort_order, id",
        )?;
        let rows = stmt
            .query_map([], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_topics(&self, subject_id: &str) -> PlanResult<Vec<Topic>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, name, avg_minutes, sort_order
             FROM topics
             WHERE subject_id = ?
             ORDER BY sort_order, id",
        )?;
        let rows = stmt
            .query_map([subject_id], topic_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn topic(&self, topic_id: &str) -> PlanResult<Option<Topic>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, subject_id, name, avg_minutes, sort_order FROM topics WHERE id = ?",
                [topic_id],
                topic_from_row,
            )
            .optional()?)
    }

    fn subject(&self, subject_id: &str) -> PlanResult<Option<Subject>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, category, sort_order FROM subjects WHERE id = ?",
                [subject_id],
                subject_from_row,
            )
            .optional()?)
    }
}

/// A catalog held entirely in memory. Import payloads are parsed into one before they are
/// written, and it can stand in for the store wherever a read-only snapshot is enough.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    subjects: Vec<Subject>,
    topics: HashMap<String, Vec<Topic>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subject; its position becomes its sort order.
    pub fn push_subject(&mut self, id: &str, name: &str, category: Category) {
        let sort_order = self.subjects.len() as i64;
        self.subjects.push(Subject {
            id: id.to_string(),
            name: name.to_string(),
            category,
            sort_order,
        });
        self.topics.entry(id.to_string()).or_default();
    }

    /// Appends a topic at the end of its subject's curriculum.
    pub fn push_topic(&mut self, subject_id: &str, id: &str, name: &str, required_minutes: i64) {
        let list = self.topics.entry(subject_id.to_string()).or_default();
        let sort_order = list.len() as i64;
        list.push(Topic {
            id: id.to_string(),
            subject_id: subject_id.to_string(),
            name: name.to_string(),
            required_minutes,
            sort_order,
        });
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }
}

impl Catalog for MemoryCatalog {
    fn list_subjects(&self) -> PlanResult<Vec<Subject>> {
        Ok(self.subjects.clone())
    }

    fn list_topics(&self, subject_id: &str) -> PlanResult<Vec<Topic>> {
        Ok(self.topics.get(subject_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub subjects_upserted: usize,
    pub topics_upserted: usize,
    pub progress_rows_reconciled: usize,
}

/// Rows a partial import did not mention keep their relative order but move behind the
/// imported ones, so no two rows share a sort order.
fn renumber_untouched(
    conn: &Connection,
    select_sql: &str,
    select_params: &[&str],
    update_sql: &str,
    imported: &[String],
) -> PlanResult<()> {
    let ids = {
        let mut stmt = conn.prepare(select_sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(select_params), |r| {
                r.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    let mut next = imported.len() as i64;
    for id in ids.iter().filter(|id| !imported.contains(id)) {
        conn.execute(update_sql, (next, id))?;
        next += 1;
    }
    Ok(())
}

/// Upserts every subject and topic of `incoming`, keeping the given order, and reconciles
/// ledger rows of topics whose required minutes changed. Entries absent from `incoming` are
/// kept and ordered after the imported ones.
pub fn import_catalog(conn: &Connection, incoming: &MemoryCatalog) -> PlanResult<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    let mut summary = ImportSummary::default();
    let existing = SqliteCatalog::new(&tx);

    for subject in incoming.list_subjects()? {
        tx.execute(
            "INSERT INTO subjects(id, name, category, sort_order) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               category = excluded.category,
               sort_order = excluded.sort_order",
            (
                &subject.id,
                &subject.name,
                subject.category.as_str(),
                subject.sort_order,
            ),
        )?;
        summary.subjects_upserted += 1;

        for topic in incoming.list_topics(&subject.id)? {
            if topic.required_minutes < 0 {
                return Err(PlanError::InvalidMinutes(topic.required_minutes));
            }
            let previous = existing.topic(&topic.id)?;
            tx.execute(
                "INSERT INTO topics(id, subject_id, name, avg_minutes, sort_order)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                   subject_id = excluded.subject_id,
                   name = excluded.name,
                   avg_minutes = excluded.avg_minutes,
                   sort_order = excluded.sort_order",
                (
                    &topic.id,
                    &topic.subject_id,
                    &topic.name,
                    topic.required_minutes,
                    topic.sort_order,
                ),
            )?;
            summary.topics_upserted += 1;

            if let Some(prev) = previous {
                if prev.required_minutes != topic.required_minutes {
                    summary.progress_rows_reconciled +=
                        ledger::reconcile_topic(&tx, &topic.id, topic.required_minutes)?;
                }
            }
        }

        let imported: Vec<String> = incoming
            .list_topics(&subject.id)?
            .into_iter()
            .map(|t| t.id)
            .collect();
        renumber_untouched(
            &tx,
            "SELECT id FROM topics WHERE subject_id = ? ORDER BY sort_order, id",
            &[subject.id.as_str()],
            "UPDATE topics SET sort_order = ? WHERE id = ?",
            &imported,
        )?;
    }

    let imported: Vec<String> = incoming.list_subjects()?.into_iter().map(|s| s.id).collect();
    renumber_untouched(
        &tx,
        "SELECT id FROM subjects ORDER BY sort_order, id",
        &[],
        "UPDATE subjects SET sort_order = ? WHERE id = ?",
        &imported,
    )?;

    tx.commit()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive_and_closed() {
        assert_eq!(Category::parse("tyt"), Some(Category::Tyt));
        assert_eq!(Category::parse(" AYT "), Some(Category::Ayt));
        assert_eq!(Category::parse("SAT"), None);
        assert_eq!(Category::Ydt.as_str(), "YDT");
    }

    #[test]
    fn memory_catalog_keeps_insertion_order() {
        let mut c = MemoryCatalog::new();
        c.push_subject("math", "Math", Category::Tyt);
        c.push_topic("math", "b", "Later topic", 30);
        c.push_topic("math", "a", "Even later", 45);
        let topics = c.list_topics("math").unwrap();
        assert_eq!(
            topics.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        assert_eq!(topics[1].sort_order, 1);
        assert_eq!(c.topic("a").unwrap().map(|t| t.required_minutes), Some(45));
        assert!(c.topic("zzz").unwrap().is_none());
        assert!(c.list_topics("missing").unwrap().is_empty());
    }
}
