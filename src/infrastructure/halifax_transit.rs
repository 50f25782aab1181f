// Halifax Transit ridership - one bulk CSV download serving every route
use crate::application::ports::{FetchRequest, Fetcher};
use crate::domain::counter::{Counter, Direction, Location, ServiceRange, Source};
use crate::domain::point::{Point, Resolution};
use crate::infrastructure::http_client::read_success_body;
use crate::infrastructure::local_time;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const SCHEME: &str = "hfxtransit";
pub const DEFAULT_DATASET_URL: &str =
    "https://opendata.arcgis.com/datasets/a0ece3efdc7144d69cb1881b90cd93fe_0.csv";

const DATE_COLUMN: &str = "Route_Date";
const NUMBER_COLUMN: &str = "Route_Number";
const NAME_COLUMN: &str = "Route_Name";
const RIDERSHIP_COLUMN: &str = "Ridership_Total";

/// A route whose newest day trails the freshest route by more than this is discontinued.
const STALE_AFTER_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
struct RouteDay {
    day: DateTime<Utc>,
    count: i64,
}

#[derive(Debug, Clone)]
struct Route {
    number: String,
    name: String,
    /// Ascending by day, never empty.
    days: Vec<RouteDay>,
}

type Snapshot = BTreeMap<String, Route>;

/// Downloads the ridership dataset once per process and answers every route from it.
///
/// The first `fetch` or `counters` call performs the download; concurrent callers wait for
/// it. The result, including a failed download, is kept and returned to every later caller
/// without retrying, even when the caller that started the download gave up on it.
pub struct HalifaxTransit {
    client: reqwest::Client,
    dataset_url: String,
    snapshot: Arc<OnceCell<Result<Snapshot, Arc<anyhow::Error>>>>,
}

impl Default for HalifaxTransit {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), DEFAULT_DATASET_URL)
    }
}

impl HalifaxTransit {
    pub fn new(client: reqwest::Client, dataset_url: &str) -> Self {
        Self {
            client,
            dataset_url: dataset_url.to_string(),
            snapshot: Arc::new(OnceCell::new()),
        }
    }

    async fn snapshot(&self) -> Result<&Snapshot> {
        if self.snapshot.get().is_none() {
            // The download runs in its own task that fills the cell, so a caller dropped
            // mid-download still leaves the result cached for everyone after it.
            let cell = self.snapshot.clone();
            let client = self.client.clone();
            let url = self.dataset_url.clone();
            tokio::spawn(async move {
                cell.get_or_init(|| async {
                    let res = download(&client, &url).await;
                    match &res {
                        Ok(routes) => tracing::info!("loaded {} transit routes", routes.len()),
                        Err(e) => tracing::error!("loading transit ridership: {:#}", e),
                    }
                    res.map_err(Arc::new)
                })
                .await;
            })
            .await
            .context("transit ridership download task failed")?;
        }

        let res = self
            .snapshot
            .get()
            .context("transit ridership download did not complete")?;
        res.as_ref()
            .map_err(|e| anyhow::anyhow!("transit ridership unavailable: {:#}", e))
    }

    /// One counter per route. Routes that stopped reporting well before the freshest
    /// route get their service range closed at their last day.
    pub async fn counters(&self) -> Result<Vec<Counter>> {
        let snapshot = self.snapshot().await?;

        let Some(latest_day) = snapshot.values().filter_map(|r| r.days.last()).map(|d| d.day).max()
        else {
            return Ok(Vec::new());
        };

        Ok(snapshot
            .values()
            .filter_map(|route| {
                let first = route.days.first()?.day;
                let last = route.days.last()?.day;

                let range = if latest_day - last > Duration::days(STALE_AFTER_DAYS) {
                    ServiceRange::closed(first, last)
                } else {
                    ServiceRange::open(first)
                };

                Some(Counter {
                    id: route.number.clone(),
                    name: route.name.clone(),
                    service_ranges: vec![range],
                    mode: "bus".to_string(),
                    location: Location::default(),
                    directions: vec![Direction {
                        id: "non".to_string(),
                        name: "nondirectional".to_string(),
                        source: Source {
                            url: format!("{}:{}", SCHEME, route.number),
                        },
                    }],
                    notes: vec![],
                    tags: vec![],
                })
            })
            .collect())
    }
}

#[async_trait]
impl Fetcher for HalifaxTransit {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<Point>> {
        let snapshot = self.snapshot().await?;

        let key = req.url.path().to_lowercase();
        let Some(route) = snapshot.get(&key) else {
            return Ok(Vec::new());
        };

        Ok(route
            .days
            .iter()
            .filter(|d| d.day > req.after)
            .map(|d| Point::new(d.day, Resolution::Day, d.count as f64))
            .collect())
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Snapshot> {
    let response = client
        .get(url)
        .send()
        .await
        .context("requesting transit ridership")?;
    let body = read_success_body(response, "transit ridership").await?;
    parse_snapshot(body.as_slice())
}

fn parse_snapshot(reader: impl Read) -> Result<Snapshot> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("reading header row")?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("{} not in columns: {:?}", name, headers))
    };
    let date_idx = column(DATE_COLUMN)?;
    let number_idx = column(NUMBER_COLUMN)?;
    let name_idx = column(NAME_COLUMN)?;
    let ridership_idx = column(RIDERSHIP_COLUMN)?;

    let mut routes = Snapshot::new();
    for record in rdr.records() {
        let record = record.context("reading ridership row")?;
        let field = |idx: usize| record.get(idx).unwrap_or_default();

        // Dates look like "2021/03/04 00:00:00+00"; only the day matters.
        let raw_date = field(date_idx).split_whitespace().next().unwrap_or_default();
        let day = local_time::parse_day(raw_date, "%Y/%m/%d")?;

        let raw_count = field(ridership_idx).trim();
        let count: i64 = raw_count
            .parse()
            .with_context(|| format!("invalid ridership {:?}", raw_count))?;

        let number = field(number_idx).to_lowercase();
        routes
            .entry(number.clone())
            .or_insert_with(|| Route {
                number,
                name: field(name_idx).to_string(),
                days: Vec::new(),
            })
            .days
            .push(RouteDay { day, count });
    }

    for route in routes.values_mut() {
        route.days.sort_by_key(|d| d.day);
    }

    Ok(routes)
}
