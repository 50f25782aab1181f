// Eco-Visio authenticated aggregation queries
use super::auth::TokenCache;
use super::{with_browser_headers, Datapoint};
use crate::domain::point::Resolution;
use crate::infrastructure::http_client::truncate_body;
use crate::infrastructure::local_time::format_day;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Serialize)]
struct QueryRequest {
    flows: Vec<i64>,
}

#[derive(Deserialize)]
struct FlowCounts {
    #[serde(default, alias = "countData", alias = "Countdata")]
    countdata: Vec<(String, Option<f64>)>,
}

/// Queries one private domain for a set of flows that together make up one direction.
pub struct EcoVisioQuerier {
    pub client: reqwest::Client,
    pub base_url: String,
    pub auth: Arc<TokenCache>,
    pub user_id: String,
    pub domain_id: String,
    pub flow_ids: Vec<String>,
}

impl EcoVisioQuerier {
    /// Counts for the days `begin` through `end`, both inclusive, summed across flows per
    /// timestamp and sorted by timestamp.
    ///
    /// Resolutions the API has no step for yield nothing.
    pub async fn query(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> Result<Vec<Datapoint>> {
        let step = match resolution {
            Resolution::Day => "day",
            Resolution::Hour => "hour",
            Resolution::Minute => return Ok(Vec::new()),
        };

        // The API's end bound is exclusive.
        let end = end + Duration::days(1);

        let url = format!(
            "{}/domain/{}/user/{}/query/from/{}/to/{}/by/{}",
            self.base_url.trim_end_matches('/'),
            self.domain_id,
            self.user_id,
            urlencoding::encode(&format!("{} 00:00", format_day(begin, "%Y-%m-%d"))),
            urlencoding::encode(&format!("{} 00:00", format_day(end, "%Y-%m-%d"))),
            step
        );

        let flows = self
            .flow_ids
            .iter()
            .map(|id| {
                id.parse::<i64>()
                    .with_context(|| format!("flow id {:?} is not numeric", id))
            })
            .collect::<Result<Vec<_>>>()?;

        let token = self.auth.token().await?;

        let response = with_browser_headers(self.client.post(&url))
            .bearer_auth(&token)
            .json(&QueryRequest { flows })
            .send()
            .await
            .with_context(|| format!("querying flows {:?}", self.flow_ids))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading query response for {:?}", self.flow_ids))?;

        if !status.is_success() {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                // Next call logs in again.
                self.auth.invalidate().await;
            }
            anyhow::bail!(
                "bad status {} querying {:?}: {}",
                status.as_u16(),
                self.flow_ids,
                truncate_body(&body)
            );
        }

        let flows: HashMap<String, FlowCounts> = serde_json::from_slice(&body)
            .with_context(|| format!("unmarshaling query response for {:?}", self.flow_ids))?;

        Ok(merge_flows(flows.into_values()))
    }
}

fn merge_flows(flows: impl IntoIterator<Item = FlowCounts>) -> Vec<Datapoint> {
    let mut summed: BTreeMap<String, i64> = BTreeMap::new();
    for flow in flows {
        for (time, count) in flow.countdata {
            *summed.entry(time).or_default() += count.unwrap_or(0.0) as i64;
        }
    }

    summed
        .into_iter()
        .map(|(time, count)| Datapoint { time, count })
        .collect()
}
