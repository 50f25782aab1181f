// Shared outbound HTTP helpers
use anyhow::{Context, Result};
use reqwest::Response;

const MAX_ERROR_BODY: usize = 100;

/// Reads the body and fails on a non-2xx status, quoting the start of the body.
pub async fn read_success_body(response: Response, what: &str) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .with_context(|| format!("reading {} response", what))?;

    if !status.is_success() {
        anyhow::bail!(
            "bad status {} for {}: {}",
            status.as_u16(),
            what,
            truncate_body(&body)
        );
    }

    Ok(body.to_vec())
}

pub fn truncate_body(body: &[u8]) -> String {
    let end = body.len().min(MAX_ERROR_BODY);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
