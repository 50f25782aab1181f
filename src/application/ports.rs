// Collaborator traits the crawler is wired against
use crate::domain::counter::Counter;
use crate::domain::point::{Point, StoredPoint, SubmissionRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;

/// Source of the counter listing.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn counters(&self) -> anyhow::Result<Vec<Counter>>;
}

/// Finds the newest point the sink already holds for a counter direction.
#[async_trait]
pub trait LatestPointQuerier: Send + Sync {
    async fn latest_point(
        &self,
        counter_id: &str,
        direction_id: &str,
    ) -> anyhow::Result<Option<StoredPoint>>;
}

/// Accepts normalized points for storage. Points at an already stored time overwrite it.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, req: &SubmissionRequest) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    /// Exclusive lower bound.
    pub after: DateTime<Utc>,
}

/// Retrieves points for one source family.
///
/// Implementations only return points strictly after `req.after`, ascending by time.
/// An empty result means the source had nothing (or is not configured here).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> anyhow::Result<Vec<Point>>;
}
