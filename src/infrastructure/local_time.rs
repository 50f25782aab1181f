// Wall-clock timestamps from Halifax-local sources
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::Halifax;
use chrono_tz::Tz;

pub const SOURCE_TZ: Tz = Halifax;

/// Resolves a local wall-clock time. Ambiguous times take the earlier instant and
/// times skipped by a DST jump move forward by the jump.
pub fn to_utc(local: NaiveDateTime) -> Option<DateTime<Utc>> {
    SOURCE_TZ
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| SOURCE_TZ.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_datetime(raw: &str, format: &str) -> Result<DateTime<Utc>> {
    let local = NaiveDateTime::parse_from_str(raw, format)
        .with_context(|| format!("invalid time {:?}", raw))?;
    to_utc(local).with_context(|| format!("time {:?} does not exist in {}", raw, SOURCE_TZ))
}

/// Local midnight of the given day.
pub fn parse_day(raw: &str, format: &str) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(raw, format)
        .with_context(|| format!("invalid date {:?}", raw))?;
    to_utc(day.and_time(chrono::NaiveTime::MIN))
        .with_context(|| format!("date {:?} does not exist in {}", raw, SOURCE_TZ))
}

/// Formats an instant as a local calendar day.
pub fn format_day(dt: DateTime<Utc>, format: &str) -> String {
    dt.with_timezone(&SOURCE_TZ).format(format).to_string()
}
