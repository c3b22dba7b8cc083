use chrono::{DateTime, Utc};

/// Format an instant as a UTC string.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format the calendar date of an instant.
pub fn format_date(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d").to_string()
}

/// Format an hour of day as `HH:00 UTC`, using '-' when missing.
pub fn format_hour_opt(hour: Option<u32>) -> String {
    hour.map(|h| format!("{:02}:00 UTC", h))
        .unwrap_or_else(|| "-".to_string())
}
