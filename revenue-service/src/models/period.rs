//! Calendar period key ("YYYY-MM") and inclusive date ranges.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month, the unit every scheduler and reporting operation is
/// keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (2000..=2999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First calendar day of the period.
    pub fn first_day(&self) -> NaiveDate {
        // Year and month are range-checked on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap()
    }

    /// Last calendar day of the period.
    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn date_range(&self) -> DateRange {
        DateRange {
            from: self.first_day(),
            to: self.last_day(),
        }
    }

    /// Day-of-month clamped to a valid day of this period.
    pub fn clamp_day(&self, day: u32) -> NaiveDate {
        let day = day.clamp(1, self.days_in_month());
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("malformed period key '{}', expected YYYY-MM", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("malformed period year in '{}'", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("malformed period month in '{}'", s))?;
        PeriodKey::new(year, month).ok_or_else(|| format!("period '{}' out of range", s))
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeriodKey> for String {
    fn from(value: PeriodKey) -> Self {
        value.to_string()
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Calendar months touched by this range, in order.
    pub fn months(&self) -> Vec<PeriodKey> {
        let mut months = Vec::new();
        let mut current = PeriodKey::from_date(self.from);
        let last = PeriodKey::from_date(self.to);
        while current <= last {
            months.push(current);
            current = current.next();
        }
        months
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let period: PeriodKey = "2025-11".parse().unwrap();
        assert_eq!(period, PeriodKey::new(2025, 11).unwrap());
        assert_eq!(period.to_string(), "2025-11");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("2025".parse::<PeriodKey>().is_err());
        assert!("2025-13".parse::<PeriodKey>().is_err());
        assert!("2025-0".parse::<PeriodKey>().is_err());
        assert!("banana".parse::<PeriodKey>().is_err());
    }

    #[test]
    fn test_month_bounds() {
        let feb = PeriodKey::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(feb.days_in_month(), 29);
    }

    #[test]
    fn test_clamp_day() {
        let feb = PeriodKey::new(2025, 2).unwrap();
        assert_eq!(feb.clamp_day(31), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(feb.clamp_day(0), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(feb.clamp_day(5), NaiveDate::from_ymd_opt(2025, 2, 5).unwrap());
    }

    #[test]
    fn test_range_months() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 11, 15).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        );
        let months = range.months();
        assert_eq!(months.len(), 3);
        assert_eq!(months[0].to_string(), "2025-11");
        assert_eq!(months[2].to_string(), "2026-01");
    }
}
