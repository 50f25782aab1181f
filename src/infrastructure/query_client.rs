// HTTP latest-point querier for a Datasette-style SQL endpoint
use crate::application::ports::LatestPointQuerier;
use crate::domain::point::StoredPoint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

/// Newest stored point for one counter direction. Ids are bound as named parameters.
pub const LATEST_POINT_SQL: &str = "select time, value from latest_counter_data \
     where counter_id = :counter_id and direction_id = :direction_id";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct QueryClient {
    client: reqwest::Client,
    url: String,
}

impl QueryClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl LatestPointQuerier for QueryClient {
    async fn latest_point(&self, counter_id: &str, direction_id: &str) -> Result<Option<StoredPoint>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("sql", LATEST_POINT_SQL),
                ("counter_id", counter_id),
                ("direction_id", direction_id),
            ])
            .send()
            .await
            .context("sending latest point query")?;

        if !response.status().is_success() {
            anyhow::bail!("got bad status {}", response.status().as_u16());
        }

        let data = response
            .json::<QueryResponse>()
            .await
            .context("decoding latest point response")?;

        let Some(row) = data.rows.first() else {
            return Ok(None);
        };
        let (Some(&time), Some(&value)) = (row.first(), row.get(1)) else {
            anyhow::bail!("latest point row has {} columns, want 2", row.len());
        };
        let time = DateTime::from_timestamp(time as i64, 0)
            .with_context(|| format!("latest point time {} out of range", time))?;

        Ok(Some(StoredPoint { time, value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ecocounter::test_server;
    use axum::extract::Query;
    use axum::{routing::get, Json, Router};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_latest_point_binds_ids() {
        let router = Router::new().route(
            "/counterbase.json",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["sql"], LATEST_POINT_SQL);
                let rows = match (q["counter_id"].as_str(), q["direction_id"].as_str()) {
                    ("test-1", "nb") => serde_json::json!([[1_600_000_000, 3]]),
                    ("o'brien", "sb") => serde_json::json!([]),
                    other => panic!("unexpected ids {:?}", other),
                };
                Json(serde_json::json!({ "columns": ["time", "value"], "rows": rows }))
            }),
        );
        let base = test_server(router).await;
        let client = QueryClient::new(reqwest::Client::new(), format!("{}/counterbase.json", base));

        let latest = client.latest_point("test-1", "nb").await.unwrap().unwrap();
        assert_eq!(latest.time.timestamp(), 1_600_000_000);
        assert_eq!(latest.value, 3.0);

        assert_eq!(client.latest_point("o'brien", "sb").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_latest_point_bad_status() {
        let router = Router::new().route(
            "/q",
            get(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }),
        );
        let base = test_server(router).await;
        let client = QueryClient::new(reqwest::Client::new(), format!("{}/q", base));

        let err = client.latest_point("a", "b").await.unwrap_err();
        assert_eq!(err.to_string(), "got bad status 502");
    }
}
