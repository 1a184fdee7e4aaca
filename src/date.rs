//! Calendar and timestamp helpers.
//!
//! Timestamps are epoch milliseconds. Every conversion takes the time zone
//! it happens in; pass `&chrono::Local` for the process zone.
//!
//! Patterns use `chrono` strftime syntax (`%Y-%m-%d`). They are validated
//! once, when a [`DateFormat`] is built, and can be kept in a caller-owned
//! [`DateFormats`] registry.

use crate::{Error, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;

pub const DATE_PATTERN: &str = "%Y-%m-%d";
pub const DATETIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// Midnight at the start of `date`, in epoch milliseconds.
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, Utc};
/// use servicekit::date::to_millis;
///
/// let date = NaiveDate::from_ymd_opt(2019, 12, 30).unwrap();
/// assert_eq!(to_millis(date, &Utc), 1_577_664_000_000);
/// ```
pub fn to_millis<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> i64 {
    datetime_to_millis(date.and_time(NaiveTime::MIN), tz)
}

/// A wall-clock time in `tz`, in epoch milliseconds.
///
/// A time skipped by a DST transition is read as UTC.
pub fn datetime_to_millis<Tz: TimeZone>(datetime: NaiveDateTime, tz: &Tz) -> i64 {
    match tz.from_local_datetime(&datetime).earliest() {
        Some(at) => at.timestamp_millis(),
        None => datetime.and_utc().timestamp_millis(),
    }
}

/// The calendar date at `millis` in `tz`.
pub fn to_date<Tz: TimeZone>(millis: i64, tz: &Tz) -> Result<NaiveDate> {
    to_datetime(millis, tz).map(|datetime| datetime.date())
}

/// The wall-clock time at `millis` in `tz`.
pub fn to_datetime<Tz: TimeZone>(millis: i64, tz: &Tz) -> Result<NaiveDateTime> {
    tz.timestamp_millis_opt(millis)
        .single()
        .map(|at| at.naive_local())
        .ok_or_else(|| Error::InvalidDate(format!("timestamp {millis} is out of range")))
}

pub fn first_second_of_day<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> i64 {
    to_millis(day, tz)
}

/// Midnight today in `tz`.
pub fn first_second_of_today<Tz: TimeZone>(tz: &Tz) -> i64 {
    first_second_of_day(Utc::now().with_timezone(tz).date_naive(), tz)
}

/// Midnight on the 1st of the month containing `day`.
pub fn first_second_of_month<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<i64> {
    Some(to_millis(day.with_day(1)?, tz))
}

/// 23:59:59 on the last day of the month containing `day`.
///
/// # Examples
///
/// ```
/// use chrono::{FixedOffset, NaiveDate, Utc};
/// use servicekit::date::last_second_of_month;
///
/// let day = NaiveDate::from_ymd_opt(2019, 12, 31).unwrap();
/// let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
/// assert_eq!(last_second_of_month(day, &shanghai), Some(1_577_807_999_000));
/// assert_eq!(last_second_of_month(day, &Utc), Some(1_577_836_799_000));
/// ```
pub fn last_second_of_month<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<i64> {
    let next_month = day.with_day(1)?.checked_add_months(Months::new(1))?;
    Some(to_millis(next_month, tz) - 1000)
}

/// Midnight on January 1st of the year containing `day`.
pub fn first_second_of_year<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<i64> {
    Some(to_millis(day.with_ordinal(1)?, tz))
}

/// 23:59:59 on December 31st of the year containing `day`.
pub fn last_second_of_year<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<i64> {
    let next_year = NaiveDate::from_ymd_opt(day.year().checked_add(1)?, 1, 1)?;
    Some(to_millis(next_year, tz) - 1000)
}

/// A validated strftime pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateFormat {
    pattern: String,
}

impl DateFormat {
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for a pattern `chrono` cannot
    /// use.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(Error::ConfigurationError(format!(
                "Invalid date pattern '{pattern}'"
            )));
        }
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        date.format(&self.pattern).to_string()
    }

    pub fn format_datetime(&self, datetime: NaiveDateTime) -> String {
        datetime.format(&self.pattern).to_string()
    }

    /// Formats a timestamp as wall-clock time in `tz`.
    pub fn format_millis<Tz: TimeZone>(&self, millis: i64, tz: &Tz) -> Result<String> {
        Ok(self.format_datetime(to_datetime(millis, tz)?))
    }

    pub fn parse_date(&self, text: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(text, &self.pattern)
            .map_err(|e| Error::InvalidDate(format!("'{text}' does not match '{}': {e}", self.pattern)))
    }

    pub fn parse_datetime(&self, text: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, &self.pattern)
            .map_err(|e| Error::InvalidDate(format!("'{text}' does not match '{}': {e}", self.pattern)))
    }

    /// Parses a date and returns its first millisecond in `tz`.
    pub fn parse_date_to_millis<Tz: TimeZone>(&self, text: &str, tz: &Tz) -> Result<i64> {
        Ok(to_millis(self.parse_date(text)?, tz))
    }

    pub fn parse_datetime_to_millis<Tz: TimeZone>(&self, text: &str, tz: &Tz) -> Result<i64> {
        Ok(datetime_to_millis(self.parse_datetime(text)?, tz))
    }
}

/// Formats keyed by pattern, built up front and owned by the caller.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use servicekit::date::{DateFormats, DATE_PATTERN};
///
/// let mut formats = DateFormats::with_defaults();
/// formats.register("%d/%m/%Y").unwrap();
///
/// let iso = formats.get(DATE_PATTERN).unwrap();
/// assert_eq!(iso.format_millis(1_577_664_000_000, &Utc).unwrap(), "2019-12-30");
/// assert!(formats.get("%d/%m/%Y").is_some());
/// assert!(formats.register("%Q").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DateFormats {
    formats: HashMap<String, DateFormat>,
}

impl DateFormats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding [`DATE_PATTERN`] and [`DATETIME_PATTERN`].
    pub fn with_defaults() -> Self {
        let mut formats = Self::new();
        for pattern in [DATE_PATTERN, DATETIME_PATTERN] {
            formats.formats.insert(
                pattern.to_string(),
                DateFormat {
                    pattern: pattern.to_string(),
                },
            );
        }
        formats
    }

    /// Validates and stores a pattern; registering it again is a no-op.
    pub fn register(&mut self, pattern: &str) -> Result<&DateFormat> {
        if !self.formats.contains_key(pattern) {
            let format = DateFormat::new(pattern)?;
            self.formats.insert(pattern.to_string(), format);
        }
        self.formats
            .get(pattern)
            .ok_or_else(|| Error::ConfigurationError(format!("Date pattern '{pattern}' not registered")))
    }

    pub fn get(&self, pattern: &str) -> Option<&DateFormat> {
        self.formats.get(pattern)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use proptest::prelude::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn shanghai() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_known_values() {
        assert_eq!(to_millis(ymd(2019, 12, 30), &Utc), 1_577_664_000_000);
        assert_eq!(
            last_second_of_month(ymd(2019, 12, 31), &shanghai()),
            Some(1_577_807_999_000)
        );
        assert_eq!(
            last_second_of_month(ymd(2019, 12, 31), &Utc),
            Some(1_577_836_799_000)
        );
    }

    #[test]
    fn test_period_bounds() {
        let tz = Utc;
        let day = ymd(2020, 2, 17);
        assert_eq!(first_second_of_day(day, &tz), to_millis(day, &tz));
        assert_eq!(first_second_of_month(day, &tz), Some(to_millis(ymd(2020, 2, 1), &tz)));
        assert_eq!(
            last_second_of_month(day, &tz),
            Some(to_millis(ymd(2020, 3, 1), &tz) - 1000)
        );
        assert_eq!(first_second_of_year(day, &tz), Some(to_millis(ymd(2020, 1, 1), &tz)));
        assert_eq!(
            last_second_of_year(day, &tz),
            Some(to_millis(ymd(2021, 1, 1), &tz) - 1000)
        );
    }

    #[test]
    fn test_first_second_of_today_is_local_midnight() {
        let tz = shanghai();
        let before = Utc::now().timestamp_millis();
        let midnight = first_second_of_today(&tz);
        assert!(midnight <= before);
        assert!(before - midnight < 86_400_000);
        assert_eq!(to_datetime(midnight, &tz).unwrap().time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_to_datetime_in_zone() {
        let at = to_datetime(1_577_664_000_000, &shanghai()).unwrap();
        assert_eq!(at, ymd(2019, 12, 30).and_hms_opt(8, 0, 0).unwrap());
        assert!(to_datetime(i64::MAX, &Utc).is_err());
    }

    #[test]
    fn test_format_and_parse() {
        let format = DateFormat::new(DATETIME_PATTERN).unwrap();
        assert_eq!(
            format.format_millis(1_577_807_999_000, &shanghai()).unwrap(),
            "2019-12-31 23:59:59"
        );
        assert_eq!(
            format.parse_datetime_to_millis("2019-12-31 23:59:59", &shanghai()).unwrap(),
            1_577_807_999_000
        );

        let date = DateFormat::new(DATE_PATTERN).unwrap();
        assert_eq!(date.parse_date("2019-12-30").unwrap(), ymd(2019, 12, 30));
        assert_eq!(
            date.parse_date_to_millis("2019-12-30", &Utc).unwrap(),
            1_577_664_000_000
        );
        assert!(matches!(date.parse_date("30/12/2019"), Err(Error::InvalidDate(_))));
    }

    #[test]
    fn test_registry() {
        let mut formats = DateFormats::new();
        assert!(formats.is_empty());
        formats.register("%H:%M").unwrap();
        formats.register("%H:%M").unwrap();
        assert_eq!(formats.len(), 1);
        assert!(formats.register("%").unwrap_err().is_configuration());
        assert_eq!(DateFormats::with_defaults().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_date_round_trip(days in -100_000i64..100_000, offset_hours in -12i32..=14) {
            let tz = FixedOffset::east_opt(offset_hours * 3600).unwrap();
            let date = ymd(1970, 1, 1) + chrono::Duration::days(days);
            prop_assert_eq!(to_date(to_millis(date, &tz), &tz).unwrap(), date);
        }

        #[test]
        fn prop_month_bounds_are_ordered(days in -50_000i64..50_000) {
            let date = ymd(2000, 1, 1) + chrono::Duration::days(days);
            let first = first_second_of_month(date, &Utc).unwrap();
            let last = last_second_of_month(date, &Utc).unwrap();
            let day = to_millis(date, &Utc);
            prop_assert!(first <= day && day < last);
        }
    }
}
