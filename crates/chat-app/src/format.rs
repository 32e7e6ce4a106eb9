use chrono::{DateTime, Local, TimeZone, Utc};

/// Short month, day, 12-hour clock: `Oct 16, 3:04 PM`.
pub const TIMESTAMP_FORMAT: &str = "%b %-d, %-I:%M %p";

/// Formats a timestamp in the machine's local time zone.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    format_timestamp_in(timestamp, &Local)
}

pub fn format_timestamp_in<Tz>(timestamp: DateTime<Utc>, timezone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    timestamp
        .with_timezone(timezone)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}
