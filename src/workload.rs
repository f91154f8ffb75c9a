use crate::calendar::SlotCalendar;
use crate::catalog::Subject;
use crate::commit::WeekCommits;
use crate::timegrid::Weekday;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadThresholds {
    pub min_weekly_minutes: i64,
    pub max_weekly_minutes: i64,
}

impl Default for WorkloadThresholds {
    fn default() -> Self {
        Self {
            min_weekly_minutes: 5 * 60,
            max_weekly_minutes: 10 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadLevel {
    Under,
    Balanced,
    Over,
}

impl WorkloadThresholds {
    pub fn classify(&self, weekly_minutes: i64) -> LoadLevel {
        if weekly_minutes < self.min_weekly_minutes {
            LoadLevel::Under
        } else if weekly_minutes > self.max_weekly_minutes {
            LoadLevel::Over
        } else {
            LoadLevel::Balanced
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLoad {
    pub day: Weekday,
    pub label: &'static str,
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLoad {
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSummary {
    pub student_id: String,
    pub scheduled_minutes: i64,
    pub load: LoadLevel,
    pub thresholds: WorkloadThresholds,
    pub per_day: Vec<DayLoad>,
    pub per_subject: Vec<SubjectLoad>,
    pub week_start: NaiveDate,
    pub committed_minutes: i64,
    pub commit_count: i64,
}

/// Subjects follow catalog order; slots bound to subjects missing from the catalog are listed
/// last without a name.
pub fn summarize(
    cal: &SlotCalendar,
    subjects: &[Subject],
    thresholds: WorkloadThresholds,
    week_start: NaiveDate,
    commits: WeekCommits,
) -> WorkloadSummary {
    let scheduled_minutes = cal.weekly_total_minutes();

    let per_day = Weekday::all()
        .map(|day| DayLoad {
            day,
            label: day.label(),
            minutes: cal.day_minutes(day),
        })
        .collect();

    let mut per_subject: Vec<SubjectLoad> = subjects
        .iter()
        .map(|s| SubjectLoad {
            subject_id: s.id.clone(),
            subject_name: Some(s.name.clone()),
            minutes: 0,
        })
        .collect();
    for slot in cal.slots() {
        match per_subject.iter_mut().find(|l| l.subject_id == slot.subject_id) {
            Some(load) => load.minutes += slot.duration_minutes(),
            None => per_subject.push(SubjectLoad {
                subject_id: slot.subject_id.clone(),
                subject_name: None,
                minutes: slot.duration_minutes(),
            }),
        }
    }
    per_subject.retain(|l| l.minutes > 0);

    WorkloadSummary {
        student_id: cal.student_id().to_string(),
        scheduled_minutes,
        load: thresholds.classify(scheduled_minutes),
        thresholds,
        per_day,
        per_subject,
        week_start,
        committed_minutes: commits.committed_minutes,
        commit_count: commits.commit_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use crate::timegrid::ClockTime;

    fn add(cal: &mut SlotCalendar, id: &str, day: i64, start: &str, end: &str, subject: &str) {
        cal.add(
            id.to_string(),
            Weekday::from_number(day).unwrap(),
            ClockTime::parse(start).unwrap(),
            ClockTime::parse(end).unwrap(),
            subject,
        )
        .unwrap();
    }

    #[test]
    fn classify_uses_strict_bounds() {
        let th = WorkloadThresholds::default();
        assert_eq!(th.classify(299), LoadLevel::Under);
        assert_eq!(th.classify(300), LoadLevel::Balanced);
        assert_eq!(th.classify(600), LoadLevel::Balanced);
        assert_eq!(th.classify(601), LoadLevel::Over);
    }

    #[test]
    fn summary_breaks_down_by_day_and_subject() {
        let mut cal = SlotCalendar::new("stu");
        add(&mut cal, "a", 1, "09:00", "11:00", "math");
        add(&mut cal, "b", 3, "14:00", "15:30", "phys");
        add(&mut cal, "c", 3, "16:00", "17:00", "math");
        add(&mut cal, "d", 7, "10:00", "10:30", "orphan");
        let subjects = vec![
            Subject {
                id: "phys".into(),
                name: "Physics".into(),
                category: Category::Ayt,
                sort_order: 0,
            },
            Subject {
                id: "math".into(),
                name: "Math".into(),
                category: Category::Tyt,
                sort_order: 1,
            },
            Subject {
                id: "bio".into(),
                name: "Biology".into(),
                category: Category::Tyt,
                sort_order: 2,
            },
        ];
        let week = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let s = summarize(
            &cal,
            &subjects,
            WorkloadThresholds::default(),
            week,
            WeekCommits {
                committed_minutes: 90,
                commit_count: 1,
            },
        );
        assert_eq!(s.scheduled_minutes, 300);
        assert_eq!(s.load, LoadLevel::Balanced);
        let days: Vec<i64> = s.per_day.iter().map(|d| d.minutes).collect();
        assert_eq!(days, vec![120, 0, 150, 0, 0, 0, 30]);
        let subs: Vec<(&str, i64)> = s
            .per_subject
            .iter()
            .map(|l| (l.subject_id.as_str(), l.minutes))
            .collect();
        assert_eq!(subs, vec![("phys", 90), ("math", 180), ("orphan", 30)]);
        assert_eq!(s.committed_minutes, 90);
    }
}
