// Normalized count points and the submission envelope
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sampling granularity of a point. Carried on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Resolution {
    Minute,
    Hour,
    Day,
}

impl From<Resolution> for u8 {
    fn from(r: Resolution) -> u8 {
        match r {
            Resolution::Minute => 1,
            Resolution::Hour => 2,
            Resolution::Day => 3,
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Resolution::Minute),
            2 => Ok(Resolution::Hour),
            3 => Ok(Resolution::Day),
            other => Err(format!("unknown resolution {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Unix seconds.
    pub time: i64,
    pub resolution: Resolution,
    pub value: f64,
}

impl Point {
    pub fn new(time: DateTime<Utc>, resolution: Resolution, value: f64) -> Self {
        Self {
            time: time.timestamp(),
            resolution,
            value,
        }
    }

    pub fn is_after(&self, after: DateTime<Utc>) -> bool {
        self.time > after.timestamp()
    }
}

/// Unit of work handed to a submitter. Empty `points` is a valid no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub id: String,
    pub direction_id: String,
    #[serde(default)]
    pub points: Vec<Point>,
}

impl SubmissionRequest {
    pub fn new(id: impl Into<String>, direction_id: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            direction_id: direction_id.into(),
            points,
        }
    }

    /// Earliest time, latest time and value sum, or `None` when empty.
    pub fn summary(&self) -> Option<(i64, i64, f64)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold(
            (first.time, first.time, 0.0),
            |(min, max, sum), p| (min.min(p.time), max.max(p.time), sum + p.value),
        ))
    }
}

/// The most recent point already held by the sink for a counter direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}
