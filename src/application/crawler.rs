// Crawler - One incremental pass over every active counter direction
use crate::application::error::{CrawlError, FetchFailure, FetchFailures};
use crate::application::ports::{Directory, FetchRequest, Fetcher, LatestPointQuerier, Submitter};
use crate::domain::counter::{Counter, TAG_BACKDATE_1D};
use crate::domain::point::SubmissionRequest;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Crawler {
    directory: Arc<dyn Directory>,
    querier: Arc<dyn LatestPointQuerier>,
    submitter: Arc<dyn Submitter>,
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
}

impl Crawler {
    pub fn new(
        directory: Arc<dyn Directory>,
        querier: Arc<dyn LatestPointQuerier>,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        Self {
            directory,
            querier,
            submitter,
            fetchers: HashMap::new(),
        }
    }

    /// Routes source URLs with `scheme` to `fetcher`. A later registration replaces an earlier one.
    pub fn add_fetcher(&mut self, scheme: impl Into<String>, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(scheme.into(), fetcher);
    }

    /// Runs one full pass.
    ///
    /// Configuration faults, latest-point query failures and submit failures stop the pass
    /// immediately. Fetch failures are collected and returned together once every counter
    /// has been visited.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), CrawlError> {
        let counters = cancellable(cancel, self.directory.counters())
            .await
            .map_err(CrawlError::Directory)?;
        tracing::debug!("crawling {} counters", counters.len());

        let mut failures = FetchFailures::default();

        for counter in counters.iter().filter(|c| c.is_active()) {
            for direction in &counter.directions {
                let url = Url::parse(&direction.source.url).map_err(|e| {
                    CrawlError::InvalidSourceUrl {
                        counter_id: counter.id.clone(),
                        direction_id: direction.id.clone(),
                        url: direction.source.url.clone(),
                        reason: e.to_string(),
                    }
                })?;

                let fetcher = self.fetchers.get(url.scheme()).ok_or_else(|| CrawlError::NoFetcher {
                    counter_id: counter.id.clone(),
                    direction_id: direction.id.clone(),
                    url: direction.source.url.clone(),
                })?;

                let after = self.cutoff(cancel, counter, &direction.id).await?;

                let req = FetchRequest { url, after };
                let mut points = match cancellable(cancel, fetcher.fetch(&req)).await {
                    Ok(points) => points,
                    Err(e) => {
                        tracing::warn!(
                            counter = %counter.id,
                            direction = %direction.id,
                            after = %after.to_rfc3339_opts(SecondsFormat::Secs, true),
                            "fetch failed: {:#}",
                            e
                        );
                        failures.0.push(FetchFailure {
                            counter_id: counter.id.clone(),
                            direction_id: direction.id.clone(),
                            after,
                            source: e,
                        });
                        continue;
                    }
                };

                // The stored boundary point must not be sent again.
                points.retain(|p| p.is_after(after));

                let submission = SubmissionRequest::new(&counter.id, &direction.id, points);
                cancellable(cancel, self.submitter.submit(&submission))
                    .await
                    .map_err(|e| CrawlError::Submit {
                        counter_id: counter.id.clone(),
                        direction_id: direction.id.clone(),
                        source: e,
                    })?;

                tracing::debug!(
                    counter = %counter.id,
                    direction = %direction.id,
                    "submitted {} points",
                    submission.points.len()
                );
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CrawlError::Fetch(failures))
        }
    }

    /// Resume point for a direction: the newest stored point, else just before the
    /// counter's current service start. Backdated counters step back one more day.
    async fn cutoff(
        &self,
        cancel: &CancellationToken,
        counter: &Counter,
        direction_id: &str,
    ) -> Result<DateTime<Utc>, CrawlError> {
        let mut after = default_cutoff(counter);

        let latest = cancellable(cancel, self.querier.latest_point(&counter.id, direction_id))
            .await
            .map_err(|e| CrawlError::LatestQuery {
                counter_id: counter.id.clone(),
                direction_id: direction_id.to_string(),
                source: e,
            })?;
        if let Some(latest) = latest {
            after = latest.time;
        }

        if counter.has_tag(TAG_BACKDATE_1D) {
            after -= Duration::days(1);
            tracing::info!(
                "backdating {} request to {}",
                counter.id,
                after.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }

        Ok(after)
    }
}

/// One minute before the last service range starts, so a point at the start is kept.
pub fn default_cutoff(counter: &Counter) -> DateTime<Utc> {
    counter
        .current_range()
        .map(|sr| sr.start)
        .unwrap_or(DateTime::UNIX_EPOCH)
        - Duration::minutes(1)
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::counter::{Direction, Location, ServiceRange, Source};
    use crate::domain::point::{Point, Resolution, StoredPoint};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct StaticDirectory(Vec<Counter>);

    #[async_trait]
    impl Directory for StaticDirectory {
        async fn counters(&self) -> anyhow::Result<Vec<Counter>> {
            Ok(self.0.clone())
        }
    }

    struct FixedLatest(Option<DateTime<Utc>>);

    #[async_trait]
    impl LatestPointQuerier for FixedLatest {
        async fn latest_point(&self, _: &str, _: &str) -> anyhow::Result<Option<StoredPoint>> {
            Ok(self.0.map(|time| StoredPoint { time, value: 1.0 }))
        }
    }

    #[derive(Default)]
    struct RecordingFetcher {
        seen: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, req: &FetchRequest) -> anyhow::Result<Vec<Point>> {
            self.seen.lock().push(req.after);
            // Deliberately includes the boundary point.
            Ok(vec![Point::new(req.after, Resolution::Hour, 1.0)])
        }
    }

    struct NullSubmitter;

    #[async_trait]
    impl Submitter for NullSubmitter {
        async fn submit(&self, req: &SubmissionRequest) -> anyhow::Result<()> {
            assert!(req.points.is_empty());
            Ok(())
        }
    }

    fn counter(start: DateTime<Utc>, tags: Vec<String>) -> Counter {
        Counter {
            id: "test-1".to_string(),
            name: "Test counter".to_string(),
            service_ranges: vec![ServiceRange::open(start)],
            mode: "cycling".to_string(),
            location: Location::default(),
            directions: vec![Direction {
                id: "nb".to_string(),
                name: "northbound".to_string(),
                source: Source { url: "testscheme:1".to_string() },
            }],
            notes: vec![],
            tags,
        }
    }

    async fn cutoff_for(c: Counter, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let fetcher = Arc::new(RecordingFetcher::default());
        let mut crawler = Crawler::new(
            Arc::new(StaticDirectory(vec![c])),
            Arc::new(FixedLatest(latest)),
            Arc::new(NullSubmitter),
        );
        crawler.add_fetcher("testscheme", fetcher.clone());
        crawler.run(&CancellationToken::new()).await.unwrap();

        let seen = fetcher.seen.lock();
        assert_eq!(seen.len(), 1);
        seen[0]
    }

    #[tokio::test]
    async fn test_cutoff_defaults_to_service_start() {
        let start = Utc::now() - Duration::hours(5);
        let after = cutoff_for(counter(start, vec![]), None).await;
        assert_eq!(after, start - Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_cutoff_uses_latest_point() {
        let start = Utc::now() - Duration::hours(30);
        let latest = Utc::now() - Duration::hours(5);
        let after = cutoff_for(counter(start, vec![]), Some(latest)).await;
        assert_eq!(after, latest);
    }

    #[tokio::test]
    async fn test_cutoff_backdated() {
        let start = Utc::now() - Duration::hours(30);
        let latest = Utc::now() - Duration::hours(5);
        let tags = vec![TAG_BACKDATE_1D.to_string()];

        let after = cutoff_for(counter(start, tags.clone()), Some(latest)).await;
        assert_eq!(after, latest - Duration::days(1));

        let after = cutoff_for(counter(start, tags), None).await;
        assert_eq!(after, start - Duration::minutes(1) - Duration::days(1));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_listing() {
        let crawler = Crawler::new(
            Arc::new(StaticDirectory(vec![])),
            Arc::new(FixedLatest(None)),
            Arc::new(NullSubmitter),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = crawler.run(&cancel).await.unwrap_err();
        assert!(matches!(err, CrawlError::Directory(_)));
    }
}
