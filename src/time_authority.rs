// Single source of "now" for the service, pinned to one civil timezone.
// Everything that compares against the current instant (request payloads,
// minutes-from-now, the future-trip filter) goes through a Clock.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock converted into the configured reference zone.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        SystemClock { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

#[cfg(test)]
pub struct FixedClock {
    instant: DateTime<Tz>,
}

#[cfg(test)]
impl FixedClock {
    pub fn at(tz: Tz, local: &str) -> Self {
        let instant = parse_timestamp(local, tz).expect("fixed clock timestamp");
        FixedClock { instant }
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.instant
    }
}

const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an upstream ISO-8601 timestamp into the reference zone.
///
/// Timestamps carrying an offset keep their instant; timestamps without one
/// are read as civil time in `tz`.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&tz));
    }

    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

/// "h:mm am/pm", e.g. `9:05 am`.
pub fn format_clock_time(t: &DateTime<Tz>) -> String {
    t.format("%-I:%M %P").to_string()
}

pub fn minutes_until(t: &DateTime<Tz>, now: &DateTime<Tz>) -> i64 {
    t.signed_duration_since(*now).num_minutes().max(0)
}
