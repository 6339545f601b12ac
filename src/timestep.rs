//! # Calendar and Timestep Enumeration
//!
//! ERA5 monthly files carry one field every six hours, starting at 00:00 on
//! day 1. This module turns a validated `(year, month)` pair into the ordered
//! list of timesteps that a monthly file is expected to contain.
//!
//! ```rust
//! use era5split::timestep::YearMonth;
//!
//! let feb = YearMonth::parse("2018", "02")?;
//! assert_eq!(feb.total_timesteps(), 112);
//!
//! let last = feb.timestep(112).unwrap();
//! assert_eq!((last.day, last.hour), (28, 18));
//! # Ok::<(), era5split::error::SplitError>(())
//! ```

use crate::error::{SplitError, SplitResult};
use serde::Serialize;
use std::fmt;

/// Synoptic times per day (00, 06, 12, 18 UTC)
pub const STEPS_PER_DAY: u32 = 4;

/// Spacing between consecutive timesteps, in hours
pub const HOURS_PER_STEP: u32 = 6;

/// Gregorian leap year rule.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` of `year`.
///
/// # Errors
///
/// Returns [`SplitError::InvalidDate`] when `month` is outside 1-12.
pub fn days_in_month(year: i32, month: u32) -> SplitResult<u32> {
    month_days(year, month)
        .ok_or_else(|| SplitError::InvalidDate(format!("month {} is outside 01-12", month)))
}

fn month_days(year: i32, month: u32) -> Option<u32> {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => Some(31),
        4 | 6 | 9 | 11 => Some(30),
        2 if is_leap_year(year) => Some(29),
        2 => Some(28),
        _ => None,
    }
}

/// Parses a year given as exactly four ASCII digits.
pub fn parse_year(s: &str) -> SplitResult<i32> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SplitError::InvalidDate(format!(
            "year '{}' must be exactly four digits (e.g. 2018)",
            s
        )));
    }
    s.parse::<i32>()
        .map_err(|e| SplitError::InvalidDate(format!("year '{}': {}", s, e)))
}

/// Parses a month given as exactly two ASCII digits in 01-12.
pub fn parse_month(s: &str) -> SplitResult<u32> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SplitError::InvalidDate(format!(
            "month '{}' must be exactly two digits (e.g. 02)",
            s
        )));
    }
    let month = s
        .parse::<u32>()
        .map_err(|e| SplitError::InvalidDate(format!("month '{}': {}", s, e)))?;
    if !(1..=12).contains(&month) {
        return Err(SplitError::InvalidDate(format!(
            "month '{}' is outside 01-12",
            s
        )));
    }
    Ok(month)
}

/// A validated calendar month.
///
/// Ordering is chronological (year first, then month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> SplitResult<Self> {
        if !(0..=9999).contains(&year) {
            return Err(SplitError::InvalidDate(format!(
                "year {} cannot be rendered as four digits",
                year
            )));
        }
        days_in_month(year, month)?;
        Ok(YearMonth { year, month })
    }

    /// Builds a period from the textual forms used on the command line and in
    /// the `ERA5_YEAR` / `ERA5_MONTH` environment variables.
    pub fn parse(year: &str, month: &str) -> SplitResult<Self> {
        YearMonth::new(parse_year(year)?, parse_month(month)?)
    }

    /// Parses `YYYY-MM` or `YYYYMM`.
    pub fn parse_compact(s: &str) -> SplitResult<Self> {
        match s.split_once('-') {
            Some((year, month)) => YearMonth::parse(year, month),
            None if s.len() == 6 && s.is_ascii() => YearMonth::parse(&s[..4], &s[4..]),
            None => Err(SplitError::InvalidDate(format!(
                "'{}' is not a month in YYYY-MM or YYYYMM form",
                s
            ))),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days(&self) -> u32 {
        // month was validated on construction
        month_days(self.year, self.month).unwrap_or(0)
    }

    pub fn total_timesteps(&self) -> usize {
        (self.days() * STEPS_PER_DAY) as usize
    }

    /// The timestep at a 1-based `index`, or `None` outside `[1, total_timesteps]`.
    pub fn timestep(&self, index: usize) -> Option<Timestep> {
        if index == 0 || index > self.total_timesteps() {
            return None;
        }
        Timestep::from_index(index)
    }

    /// All timesteps of the month in index order.
    pub fn timesteps(&self) -> impl Iterator<Item = Timestep> + use<> {
        (1..=self.total_timesteps()).filter_map(Timestep::from_index)
    }

    /// The following calendar month.
    pub fn succ(&self) -> YearMonth {
        if self.month == 12 {
            YearMonth {
                year: self.year + 1,
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// `YYYY-MM`, for human-readable messages.
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// One 6-hourly snapshot within a monthly file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Timestep {
    /// 1-based position in the input file's time axis
    pub index: usize,
    /// Day of month, starting at 1
    pub day: u32,
    /// Hour of day: 0, 6, 12 or 18
    pub hour: u32,
}

impl Timestep {
    /// Maps a 1-based index to its `(day, hour)`. Returns `None` for index 0.
    pub fn from_index(index: usize) -> Option<Self> {
        let zero_based = index.checked_sub(1)?;
        let per_day = STEPS_PER_DAY as usize;
        Some(Timestep {
            index,
            day: (zero_based / per_day) as u32 + 1,
            hour: (zero_based % per_day) as u32 * HOURS_PER_STEP,
        })
    }
}

/// An inclusive range of calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    start: YearMonth,
    end: YearMonth,
}

impl MonthRange {
    pub fn new(start: YearMonth, end: YearMonth) -> SplitResult<Self> {
        if start > end {
            return Err(SplitError::InvalidDate(format!(
                "range start {} is after range end {}",
                start.label(),
                end.label()
            )));
        }
        Ok(MonthRange { start, end })
    }

    /// A range covering a single month.
    pub fn single(month: YearMonth) -> Self {
        MonthRange {
            start: month,
            end: month,
        }
    }

    pub fn start(&self) -> YearMonth {
        self.start
    }

    pub fn end(&self) -> YearMonth {
        self.end
    }

    pub fn len(&self) -> usize {
        let months = |ym: YearMonth| ym.year as i64 * 12 + ym.month as i64;
        (months(self.end) - months(self.start) + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = YearMonth> + use<> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |ym| {
            if *ym < end { Some(ym.succ()) } else { None }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    #[test]
    fn test_days_in_month_leap_years() {
        assert_eq!(days_in_month(2000, 2).unwrap(), 29);
        assert_eq!(days_in_month(1900, 2).unwrap(), 28);
        assert_eq!(days_in_month(2004, 2).unwrap(), 29);
        assert_eq!(days_in_month(2018, 2).unwrap(), 28);
        assert_eq!(days_in_month(2020, 2).unwrap(), 29);
    }

    #[test]
    fn test_days_in_month_matches_chrono() {
        for year in 1900..=2100 {
            for month in 1..=12u32 {
                let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
                };
                let expected = (next - first).num_days() as u32;
                assert_eq!(
                    days_in_month(year, month).unwrap(),
                    expected,
                    "{}-{:02}",
                    year,
                    month
                );
            }
        }
    }

    #[test]
    fn test_days_in_month_rejects_invalid_month() {
        assert!(matches!(
            days_in_month(2018, 0),
            Err(SplitError::InvalidDate(_))
        ));
        assert!(matches!(
            days_in_month(2018, 13),
            Err(SplitError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_parse_year_and_month() {
        assert_eq!(parse_year("2018").unwrap(), 2018);
        assert_eq!(parse_month("02").unwrap(), 2);
        assert_eq!(parse_month("12").unwrap(), 12);

        assert!(parse_year("18").is_err());
        assert!(parse_year("20180").is_err());
        assert!(parse_year("20a8").is_err());
        assert!(parse_year("+201").is_err());
        assert!(parse_month("13").is_err());
        assert!(parse_month("00").is_err());
        assert!(parse_month("2").is_err());
        assert!(parse_month("-1").is_err());

        // surrounding whitespace is not part of the pattern
        assert!(parse_year(" 2018").is_err());
        assert!(parse_year("2018\n").is_err());
        assert!(parse_month("02 ").is_err());
        assert!(YearMonth::parse_compact(" 2018-02").is_err());
    }

    #[test]
    fn test_year_month_parse_compact() {
        let ym = YearMonth::parse_compact("2018-02").unwrap();
        assert_eq!((ym.year(), ym.month()), (2018, 2));
        assert_eq!(YearMonth::parse_compact("201812").unwrap().month(), 12);
        assert!(YearMonth::parse_compact("2018-2").is_err());
        assert!(YearMonth::parse_compact("2018").is_err());
        assert!(YearMonth::parse_compact("2018-13").is_err());
    }

    #[test]
    fn test_february_2018_mapping() {
        let feb = YearMonth::parse("2018", "02").unwrap();
        assert_eq!(feb.total_timesteps(), 112);
        assert_eq!(feb.to_string(), "201802");

        let first = feb.timestep(1).unwrap();
        assert_eq!((first.day, first.hour), (1, 0));

        let fifth = feb.timestep(5).unwrap();
        assert_eq!((fifth.day, fifth.hour), (2, 0));

        let last = feb.timestep(112).unwrap();
        assert_eq!((last.day, last.hour), (28, 18));

        assert!(feb.timestep(0).is_none());
        assert!(feb.timestep(113).is_none());
    }

    #[test]
    fn test_timestep_mapping_is_bijection() {
        for (year, month) in [(2018, 2), (2020, 2), (2018, 4), (2018, 12)] {
            let ym = YearMonth::new(year, month).unwrap();
            let steps: Vec<Timestep> = ym.timesteps().collect();
            assert_eq!(steps.len(), ym.total_timesteps());

            let pairs: HashSet<(u32, u32)> = steps.iter().map(|t| (t.day, t.hour)).collect();
            assert_eq!(pairs.len(), steps.len(), "duplicate (day, hour) pair");

            for day in 1..=ym.days() {
                for hour in [0, 6, 12, 18] {
                    assert!(pairs.contains(&(day, hour)), "missing {} {}", day, hour);
                }
            }

            let indices: Vec<usize> = steps.iter().map(|t| t.index).collect();
            assert_eq!(indices, (1..=ym.total_timesteps()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_month_range_rolls_over_year() {
        let range = MonthRange::new(
            YearMonth::new(2017, 11).unwrap(),
            YearMonth::new(2018, 2).unwrap(),
        )
        .unwrap();
        let months: Vec<String> = range.iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["201711", "201712", "201801", "201802"]);
        assert_eq!(range.len(), 4);

        let single = MonthRange::single(YearMonth::new(2018, 2).unwrap());
        assert_eq!(single.iter().count(), 1);
    }

    #[test]
    fn test_month_range_rejects_reversed_bounds() {
        let result = MonthRange::new(
            YearMonth::new(2018, 3).unwrap(),
            YearMonth::new(2018, 2).unwrap(),
        );
        assert!(matches!(result, Err(SplitError::InvalidDate(_))));
    }
}
