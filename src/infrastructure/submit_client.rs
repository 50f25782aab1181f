// HTTP submitter posting requests to a submit endpoint
use crate::application::ports::Submitter;
use crate::domain::point::SubmissionRequest;
use crate::infrastructure::http_client::read_success_body;
use anyhow::{Context, Result};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct SubmitClient {
    client: reqwest::Client,
    url: String,
}

impl SubmitClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Submitter for SubmitClient {
    async fn submit(&self, req: &SubmissionRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(req)
            .send()
            .await
            .with_context(|| format!("posting {} points for {}/{}", req.points.len(), req.id, req.direction_id))?;

        read_success_body(response, "submit").await?;
        Ok(())
    }
}
