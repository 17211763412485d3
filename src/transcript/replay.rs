use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use crate::browser::CapturedRequest;
use crate::ScraperError;

/// Captured headers that must not be sent verbatim: reqwest sets these itself, and it
/// cannot decode every encoding the browser advertises.
const DROPPED_HEADERS: &[&str] = &["content-length", "host", "accept-encoding", "connection"];

/// Re-issues captured player requests outside the browser
#[derive(Debug, Clone)]
pub struct ReplayClient {
    client: Client,
}

impl ReplayClient {
    pub fn new(timeout: Duration) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                ScraperError::Configuration(format!("Failed to build HTTP client: {}", err))
            })?;

        Ok(Self { client })
    }

    /// POST the captured `get_transcript` request and return its JSON body
    pub async fn replay_transcript_panel(&self, captured: &CapturedRequest) -> Result<Value, ScraperError> {
        let body: Value = serde_json::from_str(captured.body.as_deref().unwrap_or_default())
            .map_err(ScraperError::CapturedBody)?;

        tracing::debug!("Replaying transcript request: {}", captured.url);
        let request = self
            .client
            .post(&captured.url)
            .headers(replay_headers(captured))
            .json(&body);

        send_json(&captured.url, request).await
    }

    /// GET a captured `timedtext` URL and return its JSON body
    pub async fn replay_captions_fallback(&self, url: &str) -> Result<Value, ScraperError> {
        tracing::debug!("Replaying timedtext request: {}", url);
        send_json(url, self.client.get(url)).await
    }
}

async fn send_json(url: &str, request: RequestBuilder) -> Result<Value, ScraperError> {
    let response = request.send().await.map_err(|source| ScraperError::Network {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    response.json::<Value>().await.map_err(|source| ScraperError::Network {
        url: url.to_string(),
        source,
    })
}

fn replay_headers(captured: &CapturedRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &captured.headers {
        if name.starts_with(':') || DROPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!("Skipping header that cannot be replayed: {}", name),
        }
    }
    headers
}
