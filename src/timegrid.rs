use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Every slot boundary sits on this grid.
pub const GRID_MINUTES: i64 = 30;
/// Earliest bookable minute (07:00).
pub const DAY_START: ClockTime = ClockTime(7 * 60);
/// Latest boundary (24:00). A slot may end here but never start here.
pub const DAY_END: ClockTime = ClockTime(24 * 60);

/// Minutes after midnight, `00:00..=24:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        if (0..=DAY_END.0 as i64).contains(&minutes) {
            Some(Self(minutes as u16))
        } else {
            None
        }
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes((hour as i64) * 60 + minute as i64)
    }

    /// Accepts `H:MM` or `HH:MM`; `24:00` is the only valid time in hour 24.
    pub fn parse(raw: &str) -> Option<Self> {
        let (h, m) = raw.trim().split_once(':')?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return None;
        }
        let hour: u16 = h.parse().ok()?;
        let minute: u16 = m.parse().ok()?;
        Self::from_hm(hour, minute)
    }

    pub fn minutes(self) -> i64 {
        self.0 as i64
    }

    pub fn is_on_grid(self) -> bool {
        self.minutes() % GRID_MINUTES == 0
    }

    /// Nearest grid line (half-way rounds up), clamped to `[DAY_START, DAY_END]`.
    pub fn snapped(self) -> Self {
        let m = self.minutes();
        let rounded = ((m + GRID_MINUTES / 2) / GRID_MINUTES) * GRID_MINUTES;
        Self(rounded.clamp(DAY_START.minutes(), DAY_END.minutes()) as u16)
    }

    /// Saturates at 24:00.
    pub fn advanced_by(self, minutes: i64) -> Self {
        let m = (self.minutes() + minutes).clamp(0, DAY_END.minutes());
        Self(m as u16)
    }

    pub fn minutes_until(self, later: Self) -> i64 {
        later.minutes() - self.minutes()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ClockTime::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid clock time: {}", raw)))
    }
}

/// ISO weekday number, Monday = 1 .. Sunday = 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Weekday(u8);

impl Weekday {
    pub const MONDAY: Weekday = Weekday(1);

    pub fn from_number(n: i64) -> Option<Self> {
        if (1..=7).contains(&n) {
            Some(Self(n as u8))
        } else {
            None
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Weekday> {
        (1..=7u8).map(Weekday)
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Mon",
            2 => "Tue",
            3 => "Wed",
            4 => "Thu",
            5 => "Fri",
            6 => "Sat",
            _ => "Sun",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - ChronoDuration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn date_in_week(week_start: NaiveDate, day: Weekday) -> NaiveDate {
    week_start + ChronoDuration::days(day.number() as i64 - 1)
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> ClockTime {
        ClockTime::parse(raw).expect("clock time")
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(t("9:30").minutes(), 570);
        assert_eq!(t("24:00"), DAY_END);
        assert_eq!(t("07:00").to_string(), "07:00");
        assert!(ClockTime::parse("24:30").is_none());
        assert!(ClockTime::parse("10:60").is_none());
        assert!(ClockTime::parse("1030").is_none());
        assert!(ClockTime::parse("10:5").is_none());
    }

    #[test]
    fn snapping_rounds_to_grid_and_clamps_to_window() {
        assert_eq!(t("10:14").snapped(), t("10:00"));
        assert_eq!(t("10:15").snapped(), t("10:30"));
        assert_eq!(t("06:00").snapped(), DAY_START);
        assert_eq!(t("23:50").snapped(), DAY_END);
        assert!(t("10:30").is_on_grid());
        assert!(!t("10:20").is_on_grid());
    }

    #[test]
    fn week_start_normalizes_to_monday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(week_start_for(sunday), monday);
        assert_eq!(week_start_for(monday), monday);
        let friday = Weekday::from_number(5).unwrap();
        assert_eq!(
            date_in_week(monday, friday),
            NaiveDate::from_ymd_opt(2026, 10, 23).unwrap()
        );
        assert!(Weekday::from_number(0).is_none());
        assert!(Weekday::from_number(8).is_none());
    }
}
