/// Window resolution for dashboard time ranges
///
/// Turns a range token ('day', 'week', 'month', 'year', 'custom') plus optional
/// custom bounds into the concrete instant pair every aggregator works against.
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidRangeError;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Range token selected on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeKind {
    Day,
    Week,
    Month,
    Year,
    Custom,
}

impl RangeKind {
    /// Parse a range token. Unknown tokens resolve to `Month`.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "day" => RangeKind::Day,
            "week" => RangeKind::Week,
            "month" => RangeKind::Month,
            "year" => RangeKind::Year,
            "custom" => RangeKind::Custom,
            other => {
                tracing::warn!(token = other, "Unknown range token, using month");
                RangeKind::Month
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeKind::Day => "day",
            RangeKind::Week => "week",
            RangeKind::Month => "month",
            RangeKind::Year => "year",
            RangeKind::Custom => "custom",
        }
    }
}

impl From<Period> for RangeKind {
    fn from(period: Period) -> Self {
        match period {
            Period::Day => RangeKind::Day,
            Period::Week => RangeKind::Week,
            Period::Month => RangeKind::Month,
            Period::Year => RangeKind::Year,
        }
    }
}

/// Fixed calendar period, used both for rolling windows and per-period averages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Day, Period::Week, Period::Month, Period::Year];

    /// Nominal length in days when dividing totals into per-period averages
    pub fn length_days(self) -> i64 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 365,
        }
    }

    /// Start of the rolling period ending at `now`
    ///
    /// Day starts at midnight of `now`; the others step back 7 days, one
    /// calendar month or one calendar year and truncate to midnight.
    pub fn rolling_start(self, now: DateTime<Utc>) -> Result<DateTime<Utc>, InvalidRangeError> {
        let anchor = match self {
            Period::Day => now,
            Period::Week => now
                .checked_sub_signed(Duration::days(7))
                .ok_or(InvalidRangeError::OutOfRange)?,
            Period::Month => now
                .checked_sub_months(Months::new(1))
                .ok_or(InvalidRangeError::OutOfRange)?,
            Period::Year => now
                .checked_sub_months(Months::new(12))
                .ok_or(InvalidRangeError::OutOfRange)?,
        };
        Ok(start_of_day(anchor.date_naive()))
    }
}

/// Resolved `[start, end]` window, both ends inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub kind: RangeKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Resolve a range into a concrete window
    ///
    /// - `day`, `week`, `month`, `year` → rolling period ending at `now`
    /// - `custom` → `from` at 00:00:00.000 through `to` at 23:59:59.999
    pub fn resolve(
        kind: RangeKind,
        from: Option<&str>,
        to: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidRangeError> {
        let period = match kind {
            RangeKind::Day => Period::Day,
            RangeKind::Week => Period::Week,
            RangeKind::Month => Period::Month,
            RangeKind::Year => Period::Year,
            RangeKind::Custom => return Self::custom(from, to),
        };
        Self::rolling(period, now)
    }

    /// Rolling window for a fixed period, ending at `now`
    pub fn rolling(period: Period, now: DateTime<Utc>) -> Result<Self, InvalidRangeError> {
        Ok(TimeWindow {
            kind: period.into(),
            start: period.rolling_start(now)?,
            end: now,
        })
    }

    fn custom(from: Option<&str>, to: Option<&str>) -> Result<Self, InvalidRangeError> {
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                (parse_date(from)?, parse_date(to)?)
            }
            _ => return Err(InvalidRangeError::MissingBound),
        };

        if from > to {
            return Err(InvalidRangeError::Inverted { from, to });
        }

        let end = start_of_day(to.succ_opt().ok_or(InvalidRangeError::OutOfRange)?)
            - Duration::milliseconds(1);

        Ok(TimeWindow {
            kind: RangeKind::Custom,
            start: start_of_day(from),
            end,
        })
    }

    /// Inclusive on both ends
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Window length in fractional days
    pub fn length_days(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / MILLIS_PER_DAY
    }

    /// Number of whole periods the window covers, rounded up, never below 1
    pub fn period_count(&self, period: Period) -> u32 {
        let count = (self.length_days() / period.length_days() as f64).ceil();
        if count.is_finite() && count >= 1.0 {
            count as u32
        } else {
            1
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, InvalidRangeError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        InvalidRangeError::MalformedDate {
            value: value.to_string(),
        }
    })
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
