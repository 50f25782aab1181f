// EcoCounter fetcher - ecocounter://public/<id> and ecocounter://private/<domain>/<flow>
pub mod auth;
pub mod public;
pub mod querier;

use crate::application::ports::{FetchRequest, Fetcher};
use crate::domain::counter::Counter;
use crate::domain::point::{Point, Resolution};
use crate::infrastructure::local_time;
use anyhow::Result;
use async_trait::async_trait;
use auth::TokenCache;
use chrono::Utc;
use public::PublicClient;
use querier::EcoVisioQuerier;
use std::collections::HashMap;
use std::sync::Arc;

pub const SCHEME: &str = "ecocounter";
pub const DEFAULT_BASE_URL: &str = "https://www.eco-visio.net/api/aladdin/1.0.0";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One time bucket as reported by Eco-Visio, in Halifax wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datapoint {
    pub time: String,
    pub count: i64,
}

/// Credentials for one private Eco-Visio domain.
#[derive(Debug, Clone)]
pub struct PrivateDomainCredentials {
    pub name: String,
    pub username: String,
    pub password: String,
    pub user_id: String,
    pub domain_id: String,
}

struct PrivateDomain {
    user_id: String,
    domain_id: String,
    auth: Arc<TokenCache>,
}

pub struct EcoCounterFetcher {
    client: reqwest::Client,
    base_url: String,
    private_domains: HashMap<String, PrivateDomain>,
}

impl Default for EcoCounterFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), DEFAULT_BASE_URL)
    }
}

impl EcoCounterFetcher {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            private_domains: HashMap::new(),
        }
    }

    pub fn add_private_domain(&mut self, creds: PrivateDomainCredentials) {
        let auth = TokenCache::new(
            self.client.clone(),
            &self.base_url,
            creds.username,
            creds.password,
        );
        self.private_domains.insert(
            creds.name,
            PrivateDomain {
                user_id: creds.user_id,
                domain_id: creds.domain_id,
                auth: Arc::new(auth),
            },
        );
    }

    fn public_client(&self) -> PublicClient {
        PublicClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
        }
    }

    /// Counters listed on an organisation's public page.
    pub async fn counters(&self, organisation_id: &str) -> Result<Vec<Counter>> {
        self.public_client().counters(organisation_id).await
    }

    async fn private_datapoints(&self, req: &FetchRequest) -> Result<Option<Vec<Datapoint>>> {
        let path = req.url.path().trim_start_matches('/');
        let Some((domain_name, flow_id)) = path.split_once('/').filter(|(d, f)| {
            !d.is_empty() && !f.is_empty() && !f.contains('/')
        }) else {
            anyhow::bail!("bad path in URL {:?}", req.url.as_str());
        };

        let Some(domain) = self.private_domains.get(domain_name) else {
            tracing::info!(
                "no private auth for URL {:?} domain {:?} available, skipping",
                req.url.as_str(),
                domain_name
            );
            return Ok(None);
        };

        let q = EcoVisioQuerier {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            auth: domain.auth.clone(),
            user_id: domain.user_id.clone(),
            domain_id: domain.domain_id.clone(),
            flow_ids: vec![flow_id.to_string()],
        };
        q.query(req.after, Utc::now(), Resolution::Hour).await.map(Some)
    }
}

#[async_trait]
impl Fetcher for EcoCounterFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<Vec<Point>> {
        let dps = match req.url.host_str() {
            Some("public") => {
                let id = req.url.path().trim_start_matches('/');
                self.public_client()
                    .datapoints(id, req.after, Utc::now(), Resolution::Hour)
                    .await?
            }
            Some("private") => match self.private_datapoints(req).await? {
                Some(dps) => dps,
                None => return Ok(Vec::new()),
            },
            _ => {
                tracing::warn!("not handling url {} yet", req.url);
                return Ok(Vec::new());
            }
        };

        to_points(dps, req)
    }
}

fn to_points(dps: Vec<Datapoint>, req: &FetchRequest) -> Result<Vec<Point>> {
    let mut points = Vec::with_capacity(dps.len());
    for dp in dps {
        let t = local_time::parse_datetime(&dp.time, TIME_FORMAT)?;
        if t <= req.after {
            continue;
        }
        points.push(Point::new(t, Resolution::Hour, dp.count as f64));
    }
    Ok(points)
}

/// Eco-Visio's web client headers; the API rejects requests that look scripted.
pub(crate) fn with_browser_headers(rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    rb.header(
        "User-Agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:80.0) Gecko/20100101 Firefox/80.0",
    )
    .header("Accept-Language", "en-US,en;q=0.5")
    .header("X-Requested-With", "XMLHttpRequest")
    .header("Origin", "https://www.eco-visio.net")
    .header("DNT", "1")
    .header("Referer", "https://www.eco-visio.net/v5/")
}

/// Serves `router` on an ephemeral local port and returns its base URL.
#[cfg(test)]
pub(crate) async fn test_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use chrono::{DateTime, TimeZone};
    use reqwest::Url;

    fn request(url: &str, after: DateTime<Utc>) -> FetchRequest {
        FetchRequest {
            url: Url::parse(url).unwrap(),
            after,
        }
    }

    #[test]
    fn test_to_points_filters_cutoff() {
        // 2023-07-01 01:00 ADT == 04:00 UTC
        let after = Utc.with_ymd_and_hms(2023, 7, 1, 4, 0, 0).unwrap();
        let dps = vec![
            Datapoint { time: "2023-07-01 00:00:00".to_string(), count: 1 },
            Datapoint { time: "2023-07-01 01:00:00".to_string(), count: 2 },
            Datapoint { time: "2023-07-01 02:00:00".to_string(), count: 3 },
        ];

        let points = to_points(dps, &request("ecocounter://public/1", after)).unwrap();
        assert_eq!(
            points,
            vec![Point::new(
                Utc.with_ymd_and_hms(2023, 7, 1, 5, 0, 0).unwrap(),
                Resolution::Hour,
                3.0
            )]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_private_domain_is_empty() {
        let fetcher = EcoCounterFetcher::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let points = fetcher
            .fetch(&request("ecocounter://private/hrm/123", Utc::now()))
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_bad_private_path() {
        let fetcher = EcoCounterFetcher::new(reqwest::Client::new(), "http://127.0.0.1:9");
        for url in ["ecocounter://private/hrm", "ecocounter://private/hrm/1/2"] {
            assert!(fetcher.fetch(&request(url, Utc::now())).await.is_err(), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_unknown_host_is_empty() {
        let fetcher = EcoCounterFetcher::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let points = fetcher
            .fetch(&request("ecocounter://elsewhere/1", Utc::now()))
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_private_domain_fetch() {
        let router = Router::new()
            .route(
                "/connect",
                post(|| async { Json(serde_json::json!({ "access_token": "tok" })) }),
            )
            .route(
                "/domain/77/user/9/query/from/:from/to/:to/by/hour",
                post(|| async {
                    Json(serde_json::json!({
                        "123": { "countdata": [["2023-07-01 00:00:00", 3], ["2023-07-01 01:00:00", 6]] }
                    }))
                }),
            );
        let base = test_server(router).await;

        let mut fetcher = EcoCounterFetcher::new(reqwest::Client::new(), &base);
        fetcher.add_private_domain(PrivateDomainCredentials {
            name: "hrm".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            user_id: "9".to_string(),
            domain_id: "77".to_string(),
        });

        let after = Utc.with_ymd_and_hms(2023, 7, 1, 3, 30, 0).unwrap();
        let points = fetcher
            .fetch(&request("ecocounter://private/hrm/123", after))
            .await
            .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].time, Utc.with_ymd_and_hms(2023, 7, 1, 4, 0, 0).unwrap().timestamp());
        assert_eq!(points[0].value, 6.0);
    }
}
