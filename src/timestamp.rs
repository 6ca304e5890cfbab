// Timestamp normalization to epoch milliseconds

use crate::error::TaskError;
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::borrow::Cow;
use tracing::warn;

/// Date-time layouts carrying an explicit offset, tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Wall-clock layouts without an offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A timestamp as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl From<&str> for TimeInput {
    fn from(s: &str) -> Self {
        TimeInput::Text(s.to_string())
    }
}

impl From<String> for TimeInput {
    fn from(s: String) -> Self {
        TimeInput::Text(s)
    }
}

impl From<i64> for TimeInput {
    fn from(ms: i64) -> Self {
        TimeInput::Millis(ms)
    }
}

/// Outcome of normalizing a [`TimeInput`]
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Parsed(i64),
    Invalid(String),
}

/// What to do with input that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPolicy {
    /// Substitute the current time and log a warning
    #[default]
    Lenient,
    /// Reject with [`TaskError::InvalidTimestamp`]
    Strict,
}

impl TimestampPolicy {
    /// Turn a normalization outcome into milliseconds; `now` is only read when substituting
    pub fn resolve<F>(self, field: &'static str, normalized: Normalized, now: F) -> Result<i64, TaskError>
    where
        F: FnOnce() -> i64,
    {
        match (normalized, self) {
            (Normalized::Parsed(ms), _) => Ok(ms),
            (Normalized::Invalid(reason), TimestampPolicy::Lenient) => {
                let now_ms = now();
                warn!(field, %reason, now_ms, "Unparseable timestamp, substituting current time");
                Ok(now_ms)
            }
            (Normalized::Invalid(reason), TimestampPolicy::Strict) => Err(TaskError::InvalidTimestamp { field, reason }),
        }
    }
}

/// Normalize caller input to epoch milliseconds.
///
/// Numbers are already epoch milliseconds. Text is read as ISO-8601 first and
/// as a number second; offset-less wall-clock text is interpreted in the local
/// time zone of the process. Nothing is guessed: input that fits neither form
/// is [`Normalized::Invalid`] and the [`TimestampPolicy`] decides its fate.
pub fn normalize(input: &TimeInput) -> Normalized {
    match input {
        TimeInput::Millis(ms) => Normalized::Parsed(*ms),
        TimeInput::Fractional(ms) => from_float(*ms),
        TimeInput::Text(text) => normalize_text(text),
    }
}

fn normalize_text(text: &str) -> Normalized {
    if let Some(ms) = parse_iso8601(text) {
        return Normalized::Parsed(ms);
    }

    match text.trim().parse::<f64>() {
        Ok(ms) => from_float(ms),
        Err(_) => Normalized::Invalid(format!("not an ISO-8601 timestamp or number: {:?}", text)),
    }
}

fn from_float(ms: f64) -> Normalized {
    if ms.is_finite() && ms.abs() < i64::MAX as f64 {
        Normalized::Parsed(ms.trunc() as i64)
    } else {
        Normalized::Invalid(format!("numeric timestamp out of range: {}", ms))
    }
}

/// Parse ISO-8601 text to epoch milliseconds
pub fn parse_iso8601(text: &str) -> Option<i64> {
    let text = text.trim();
    let text: Cow<'_, str> = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(rest) => Cow::Owned(format!("{}+00:00", rest)),
        None => Cow::Borrowed(text),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Some(dt.timestamp_millis());
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&text, format) {
            return Some(dt.timestamp_millis());
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return local_millis(&naive);
        }
    }

    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| local_millis(&naive))
}

fn local_millis(naive: &NaiveDateTime) -> Option<i64> {
    resolve_local(&Local, naive).map(|dt| dt.timestamp_millis())
}

/// Wall-clock time in `tz`.
///
/// A repeated time takes its earlier instant. A time skipped by a forward
/// transition keeps the offset in effect before the transition, so
/// `00:30` in a gap from `00:00` to `01:00` lands on `01:30` after it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            // A day back is before the transition for any real-world offset
            let before = naive.checked_sub_signed(TimeDelta::days(1))?;
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc = naive.checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

/// Epoch milliseconds as a local date-time
pub fn to_local(ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(ms).earliest()
}

/// Serde helper for stored timestamp fields.
///
/// Current documents hold integers; older documents hold ISO-8601 strings.
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let input = TimeInput::deserialize(deserializer)?;
    match normalize(&input) {
        Normalized::Parsed(ms) => Ok(ms),
        Normalized::Invalid(reason) => Err(de::Error::custom(reason)),
    }
}
