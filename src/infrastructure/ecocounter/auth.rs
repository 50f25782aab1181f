// Eco-Visio bearer token cache
use super::with_browser_headers;
use crate::infrastructure::http_client::read_success_body;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Serialize)]
struct LoginRequest<'a> {
    login: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Holds one bearer token per set of credentials.
///
/// Callers asking for the token wait while another caller is logging in. The token has no
/// expiry tracking; it stays cached until [`TokenCache::invalidate`] is called.
pub struct TokenCache {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl TokenCache {
    pub fn new(client: reqwest::Client, base_url: &str, username: String, password: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            token: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let mut slot = self.token.lock().await;
        if let Some(tok) = slot.as_ref() {
            return Ok(tok.clone());
        }

        // A failed login leaves the slot empty for the next caller.
        let tok = self.login().await?;
        *slot = Some(tok.clone());
        Ok(tok)
    }

    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn login(&self) -> Result<String> {
        let url = format!("{}/connect", self.base_url);
        let request = LoginRequest {
            login: &self.username,
            password: &self.password,
        };

        tracing::debug!("logging in to eco visio as {}", self.username);
        let response = with_browser_headers(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .context("sending eco visio auth request")?;

        let body = read_success_body(response, "eco visio auth").await?;
        let parsed: LoginResponse =
            serde_json::from_slice(&body).context("decoding eco visio auth response")?;
        Ok(parsed.access_token)
    }
}
