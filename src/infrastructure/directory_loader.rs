// Static counter directory loaded from a file or HTTP URL
use crate::application::ports::Directory;
use crate::domain::counter::Counter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;

/// A counter listing fixed at load time.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    counters: Vec<Counter>,
}

impl StaticDirectory {
    pub fn new(counters: Vec<Counter>) -> Self {
        Self { counters }
    }

    /// Loads a JSON array of counters from a `file://` or `http(s)://` URL.
    pub async fn load(client: &reqwest::Client, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("parsing directory URL {:?}", url))?;

        let counters: Vec<Counter> = match parsed.scheme() {
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| anyhow::anyhow!("directory URL {:?} is not a file path", url))?;
                let raw = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading directory {}", path.display()))?;
                serde_json::from_slice(&raw)
                    .with_context(|| format!("decoding directory {}", path.display()))?
            }
            "http" | "https" => {
                let response = client
                    .get(parsed.clone())
                    .send()
                    .await
                    .context("requesting directory")?;
                if !response.status().is_success() {
                    anyhow::bail!("directory URL: bad status {}", response.status().as_u16());
                }
                response.json().await.context("decoding directory")?
            }
            other => anyhow::bail!("directory URL: unsupported scheme {:?}", other),
        };

        tracing::info!("loaded {} counters from {}", counters.len(), url);
        Ok(Self::new(counters))
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn counters(&self) -> Result<Vec<Counter>> {
        Ok(self.counters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ecocounter::test_server;
    use axum::{routing::get, Router};
    use std::io::Write;

    const LISTING: &str = r#"[
        {
            "id": "counter-100034",
            "name": "South Park St",
            "service_ranges": [{"start": "2019-06-21", "end": null}],
            "mode": "cycling",
            "location": {"lon": -63.58, "lat": 44.65},
            "directions": [
                {"id": "nb", "name": "northbound", "source": {"url": "ecocounter://public/100034"}}
            ]
        }
    ]"#;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LISTING.as_bytes()).unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let dir = StaticDirectory::load(&reqwest::Client::new(), url.as_str()).await.unwrap();
        let counters = dir.counters().await.unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].directions[0].source.url, "ecocounter://public/100034");
    }

    #[tokio::test]
    async fn test_load_from_http() {
        let router = Router::new().route("/counters.json", get(|| async { LISTING }));
        let base = test_server(router).await;

        let dir = StaticDirectory::load(&reqwest::Client::new(), &format!("{}/counters.json", base))
            .await
            .unwrap();
        assert_eq!(dir.counters().await.unwrap()[0].id, "counter-100034");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = StaticDirectory::load(&reqwest::Client::new(), "ftp://example.com/c.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }
}
