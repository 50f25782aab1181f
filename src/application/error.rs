// Crawl error taxonomy
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("listing counters: {0:#}")]
    Directory(anyhow::Error),

    #[error("counter {counter_id:?} direction {direction_id:?}: invalid source URL {url:?}: {reason}")]
    InvalidSourceUrl {
        counter_id: String,
        direction_id: String,
        url: String,
        reason: String,
    },

    #[error("no fetcher for active counter {counter_id:?} direction {direction_id:?} source URL {url:?}")]
    NoFetcher {
        counter_id: String,
        direction_id: String,
        url: String,
    },

    #[error("querying latest point for counter {counter_id:?} direction {direction_id:?}: {source:#}")]
    LatestQuery {
        counter_id: String,
        direction_id: String,
        source: anyhow::Error,
    },

    #[error("submitting counter {counter_id:?} direction {direction_id:?}: {source:#}")]
    Submit {
        counter_id: String,
        direction_id: String,
        source: anyhow::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchFailures),
}

/// A fetch that failed for one direction. The crawl continues past these.
#[derive(Debug, Error)]
#[error("fetch for counter {counter_id:?} direction {direction_id:?} after {}: {source:#}", .after.to_rfc3339_opts(SecondsFormat::Secs, true))]
pub struct FetchFailure {
    pub counter_id: String,
    pub direction_id: String,
    pub after: DateTime<Utc>,
    pub source: anyhow::Error,
}

/// Every fetch failure from one pass, reported together at the end.
#[derive(Debug, Default)]
pub struct FetchFailures(pub Vec<FetchFailure>);

impl FetchFailures {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchFailure> {
        self.0.iter()
    }
}

impl fmt::Display for FetchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchFailures {}
