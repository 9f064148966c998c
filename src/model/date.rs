//! Calendar dates as they appear in the ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const DISPLAY_FORMAT: &str = "%Y/%m/%d";
const ACCEPTED_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];

/// A calendar date without time or timezone.
///
/// Parsing accepts `2024/01/28`, `2024-01-28` and unpadded forms like `2024/1/8`. Display always
/// normalizes to `YYYY/MM/DD`, which is also the persisted form. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerDate(NaiveDate);

impl LedgerDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Returns `None` when the year, month and day do not form a real date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Today in local time.
    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }
}

/// The input could not be read as a date in any of the accepted formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateError(String);

impl Display for DateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid date '{}', expected YYYY/MM/DD or YYYY-MM-DD",
            self.0
        )
    }
}

impl std::error::Error for DateError {}

impl FromStr for LedgerDate {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ACCEPTED_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
            .map(Self)
            .ok_or_else(|| DateError(trimmed.to_string()))
    }
}

impl Display for LedgerDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(DISPLAY_FORMAT))
    }
}

impl From<NaiveDate> for LedgerDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl Serialize for LedgerDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LedgerDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LedgerDate::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_and_dash() {
        let a = LedgerDate::from_str("2024/01/28").unwrap();
        let b = LedgerDate::from_str("2024-01-28").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2024/01/28");
    }

    #[test]
    fn test_parse_unpadded() {
        let d = LedgerDate::from_str(" 2024/1/8 ").unwrap();
        assert_eq!(d.to_string(), "2024/01/08");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(LedgerDate::from_str("").is_err());
        assert!(LedgerDate::from_str("2024/02/30").is_err());
        let e = LedgerDate::from_str("yesterday").unwrap_err();
        assert!(e.to_string().contains("yesterday"));
    }

    #[test]
    fn test_ordering_is_chronological() {
        let early = LedgerDate::from_str("2023/12/31").unwrap();
        let late = LedgerDate::from_str("2024/01/01").unwrap();
        assert!(early < late);
    }

    #[test]
    fn test_serde_uses_display_form() {
        let d: LedgerDate = serde_json::from_str("\"2024-01-21\"").unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"2024/01/21\"");
    }
}
