//! Agency-local time handling
//!
//! Timestamps are stored in UTC. Anything shown to a client or caregiver
//! (receipt dates, invoice due dates, visit dates) is rendered in the
//! agency's configured timezone.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Timezone wrapper for the agency's operating region
///
/// Serializes as the IANA name (`America/New_York`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Converts a UTC datetime to the local timezone
    pub fn to_local(&self, utc: DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.0)
    }

    /// Calendar date of `utc` as seen in this timezone
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        self.to_local(utc).date_naive()
    }

    /// Today's date in this timezone
    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// Long-form date used in emails, e.g. "March 4, 2025"
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%B %-d, %Y").to_string()
    }

    /// Local date-time with zone abbreviation, e.g. "March 4, 2025 2:05 PM EST"
    pub fn format_timestamp(&self, utc: DateTime<Utc>) -> String {
        self.to_local(utc).format("%B %-d, %Y %-I:%M %p %Z").to_string()
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::America::New_York)
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

impl FromStr for Timezone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s.trim())
            .map(Timezone)
            .map_err(|_| CoreError::InvalidTimezone(s.to_string()))
    }
}

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_date_crosses_midnight() {
        let tz: Timezone = "America/Los_Angeles".parse().unwrap();
        // 03:00 UTC on the 5th is still the evening of the 4th in LA
        let utc = Utc.with_ymd_and_hms(2025, 3, 5, 3, 0, 0).unwrap();
        assert_eq!(tz.local_date(utc), NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(Timezone::format_date(date), "March 4, 2025");
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(matches!(
            "Mars/Olympus".parse::<Timezone>(),
            Err(CoreError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_serde_uses_iana_name() {
        let tz = Timezone::new(chrono_tz::America::Chicago);
        let json = serde_json::to_string(&tz).unwrap();
        assert_eq!(json, "\"America/Chicago\"");
        let back: Timezone = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tz);
    }
}
