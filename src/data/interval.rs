use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A bar interval. Closed set — new cadences require a code change, matching the way
/// `barter-data`'s `SubscriptionKind` marker types are a closed, exchange-agnostic taxonomy
/// rather than a free-form string.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Interval {
    OneSecond,
    FiveSecond,
    OneMinute,
    FiveMinute,
    FifteenMinute,
    ThirtyMinute,
    OneHour,
    OneDay,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Interval::OneSecond => "1s",
            Interval::FiveSecond => "5s",
            Interval::OneMinute => "1m",
            Interval::FiveMinute => "5m",
            Interval::FifteenMinute => "15m",
            Interval::ThirtyMinute => "30m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
        };
        f.write_str(text)
    }
}

impl Interval {
    /// Duration of one bar on this interval, as used for bucket-floor and bucket-end
    /// arithmetic. `OneDay` has no fixed duration (a trading day's span varies with early
    /// closes) — callers needing the day's span must consult `TradingSession` instead.
    pub fn duration(self) -> Option<chrono::Duration> {
        use Interval::*;
        match self {
            OneSecond => Some(chrono::Duration::seconds(1)),
            FiveSecond => Some(chrono::Duration::seconds(5)),
            OneMinute => Some(chrono::Duration::minutes(1)),
            FiveMinute => Some(chrono::Duration::minutes(5)),
            FifteenMinute => Some(chrono::Duration::minutes(15)),
            ThirtyMinute => Some(chrono::Duration::minutes(30)),
            OneHour => Some(chrono::Duration::hours(1)),
            OneDay => None,
        }
    }

    /// Interval length expressed in minutes, fractional for sub-minute intervals (spec §4.8:
    /// `bars_per_minute = 1 / interval_in_minutes`, e.g. 1s -> 60 bars per minute).
    pub fn as_minutes(self) -> f64 {
        use Interval::*;
        match self {
            OneSecond => 1.0 / 60.0,
            FiveSecond => 5.0 / 60.0,
            OneMinute => 1.0,
            FiveMinute => 5.0,
            FifteenMinute => 15.0,
            ThirtyMinute => 30.0,
            OneHour => 60.0,
            OneDay => f64::NAN, // callers must use TradingSession span instead
        }
    }

    /// True for the only intervals a `DataAdapter` is expected to store directly (spec §4.5):
    /// everything else is synthesized by aggregation.
    pub fn is_adapter_native(self) -> bool {
        matches!(self, Interval::OneSecond | Interval::OneMinute | Interval::OneDay)
    }

    pub fn is_sub_minute(self) -> bool {
        matches!(self, Interval::OneSecond | Interval::FiveSecond)
    }

    pub fn is_day(self) -> bool {
        matches!(self, Interval::OneDay)
    }

    /// Floor `timestamp` to the start of the bucket it falls in on this interval. `OneDay`
    /// buckets are not handled here (they need the session's regular_open, see
    /// `TradingSession::day_bucket_start`).
    pub fn floor(self, timestamp: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        let Some(duration) = self.duration() else {
            return timestamp;
        };
        let secs = duration.num_seconds().max(1);
        let epoch = timestamp.timestamp();
        let floored = epoch - epoch.rem_euclid(secs);
        chrono::DateTime::from_timestamp(floored, 0).unwrap_or(timestamp)
    }

    /// Ascending-granularity ordering used to process derived intervals in order (spec §4.6:
    /// "5m before 15m before 1h before 1d").
    pub fn rank(self) -> u8 {
        use Interval::*;
        match self {
            OneSecond => 0,
            FiveSecond => 1,
            OneMinute => 2,
            FiveMinute => 3,
            FifteenMinute => 4,
            ThirtyMinute => 5,
            OneHour => 6,
            OneDay => 7,
        }
    }
}

impl FromStr for Interval {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Interval::*;
        Ok(match s {
            "1s" => OneSecond,
            "5s" => FiveSecond,
            "1m" => OneMinute,
            "5m" => FiveMinute,
            "15m" => FifteenMinute,
            "30m" => ThirtyMinute,
            "1h" => OneHour,
            "1d" => OneDay,
            other => {
                return Err(SessionError::configuration(format!(
                    "unrecognised interval string {other:?}"
                )));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_every_accepted_interval_string() {
        for (text, expected) in [
            ("1s", Interval::OneSecond),
            ("5s", Interval::FiveSecond),
            ("1m", Interval::OneMinute),
            ("5m", Interval::FiveMinute),
            ("15m", Interval::FifteenMinute),
            ("30m", Interval::ThirtyMinute),
            ("1h", Interval::OneHour),
            ("1d", Interval::OneDay),
        ] {
            assert_eq!(text.parse::<Interval>().unwrap(), expected);
        }
    }

    #[test]
    fn rejects_unknown_interval_string() {
        assert!(matches!(
            "3m".parse::<Interval>(),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn floors_to_bucket_start() {
        let t = chrono::Utc.with_ymd_and_hms(2025, 7, 2, 9, 37, 42).unwrap();
        assert_eq!(
            Interval::FiveMinute.floor(t),
            chrono::Utc.with_ymd_and_hms(2025, 7, 2, 9, 35, 0).unwrap()
        );
        assert_eq!(
            Interval::OneMinute.floor(t),
            chrono::Utc.with_ymd_and_hms(2025, 7, 2, 9, 37, 0).unwrap()
        );
    }

    #[test]
    fn rank_orders_base_before_derived_before_day() {
        assert!(Interval::OneMinute.rank() < Interval::FiveMinute.rank());
        assert!(Interval::FiveMinute.rank() < Interval::OneHour.rank());
        assert!(Interval::OneHour.rank() < Interval::OneDay.rank());
    }
}
