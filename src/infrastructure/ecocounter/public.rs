// Eco-Visio public page API
use super::{with_browser_headers, Datapoint};
use crate::domain::counter::{Counter, Location, ServiceRange};
use crate::domain::point::Resolution;
use crate::infrastructure::http_client::read_success_body;
use crate::infrastructure::local_time::format_day;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct PublicCount {
    date: String,
    #[serde(default)]
    comptage: Option<f64>,
}

#[derive(Deserialize)]
struct PublicSite {
    #[serde(rename = "idPdc")]
    id_pdc: i64,
    debut: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    nom: String,
}

pub struct PublicClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl PublicClient {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Counts for a public counter between the days of `begin` and `end`, both inclusive.
    pub async fn datapoints(
        &self,
        id: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Datapoint>> {
        let step = match resolution {
            Resolution::Hour => "3",
            Resolution::Day => "4",
            Resolution::Minute => return Ok(Vec::new()),
        };

        let url = format!("{}/pbl/publicwebpageplus/data/{}", self.base(), id);
        let response = with_browser_headers(self.client.get(&url))
            .query(&[
                ("begin", format_day(begin, "%Y%m%d")),
                ("end", format_day(end + Duration::days(1), "%Y%m%d")),
                ("step", step.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("requesting public counter {}", id))?;

        let body = read_success_body(response, &format!("public counter {}", id)).await?;
        let counts: Vec<PublicCount> = serde_json::from_slice(&body)
            .with_context(|| format!("decoding public counter {} response", id))?;

        let mut dps: Vec<Datapoint> = counts
            .into_iter()
            .map(|c| Datapoint {
                time: c.date,
                count: c.comptage.unwrap_or(0.0) as i64,
            })
            .collect();
        dps.sort_by(|a, b| a.time.cmp(&b.time));
        Ok(dps)
    }

    /// Lists the counters an organisation publishes on its public page.
    pub async fn counters(&self, organisation_id: &str) -> Result<Vec<Counter>> {
        let url = format!("{}/pbl/publicwebpageplus/{}", self.base(), organisation_id);
        let response = self
            .client
            .get(&url)
            .query(&[("withNull", "true")])
            .send()
            .await
            .with_context(|| format!("requesting public page {}", organisation_id))?;

        let body = read_success_body(response, "public page").await?;
        let sites: Vec<PublicSite> =
            serde_json::from_slice(&body).context("decoding public page response")?;

        sites
            .into_iter()
            .map(|site| {
                let start = NaiveDate::parse_from_str(&site.debut, "%m/%d/%Y")
                    .with_context(|| format!("invalid start date {:?} for {}", site.debut, site.id_pdc))?;

                Ok(Counter {
                    id: format!("counter-{}", site.id_pdc),
                    name: site.nom,
                    service_ranges: vec![ServiceRange::open(
                        start.and_time(chrono::NaiveTime::MIN).and_utc(),
                    )],
                    mode: String::new(),
                    location: Location {
                        lon: site.lon,
                        lat: site.lat,
                        text: String::new(),
                    },
                    directions: vec![],
                    notes: vec![],
                    tags: vec![],
                })
            })
            .collect()
    }
}
