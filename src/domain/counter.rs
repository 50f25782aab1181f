// Counter directory domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag marking counters whose source revises figures after the fact.
pub const TAG_BACKDATE_1D: &str = "backdate1d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub service_ranges: Vec<ServiceRange>,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub directions: Vec<Direction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Counter {
    /// Only the last service range decides whether a counter is still running.
    pub fn is_active(&self) -> bool {
        self.current_range().is_some_and(|sr| sr.end.is_none())
    }

    pub fn current_range(&self) -> Option<&ServiceRange> {
        self.service_ranges.last()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRange {
    #[serde(with = "service_date")]
    pub start: DateTime<Utc>,
    #[serde(default, with = "service_date::optional")]
    pub end: Option<DateTime<Utc>>,
}

impl ServiceRange {
    pub fn open(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub lon: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub lat: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub id: String,
    pub name: String,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
}

/// Where a direction's data comes from. The URL scheme picks the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
}

/// Service dates travel as `"YYYY-MM-DD"` and are held as midnight UTC.
mod service_date {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        optional::deserialize(d)?
            .ok_or_else(|| serde::de::Error::custom("service range start is required"))
    }

    fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        let day = NaiveDate::parse_from_str(raw, FORMAT)?;
        Ok(day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
    }

    pub mod optional {
        use super::*;

        pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) if raw.is_empty() => Ok(None),
                Some(raw) => parse(&raw).map(Some).map_err(serde::de::Error::custom),
            }
        }
    }
}
