use crate::configuration::FeedConfig;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

const MAX_RENDERED_LOADS: usize = 30;
const MAX_RAW_CHARS: usize = 3500;
const MAX_ERROR_BODY_CHARS: usize = 2000;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed base URL is not configured")]
    NotConfigured,

    #[error("Failed to Build Client")]
    ClientError,

    #[error("Failed to get response:{0}")]
    GetUrlError(String),

    #[error("Feed returned status {status}: {body}")]
    UpstreamError { status: u16, body: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadEntry {
    pub direction: Option<String>,
    pub cargo: Option<String>,
    pub transport: Option<String>,
    pub date: Option<String>,
    pub extra: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadsFeed {
    pub loads: Vec<LoadEntry>,
    pub updated_at: Option<String>,
}

/// Parsed body of a successful feed response. Anything that is not the
/// expected envelope is carried through raw (truncated) for the user to see.
#[derive(Debug, Clone)]
pub enum FeedPayload {
    Loads(LoadsFeed),
    Raw(String),
}

pub struct FeedClient {
    base_url: String,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint: config.endpoint.clone(),
            api_key: env::var("FEED_API_KEY").ok(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// One bounded GET against the loads endpoint. No retries: a failure is
    /// reported to the caller exactly once.
    pub async fn fetch(&self, tg_id: i64) -> Result<FeedPayload, FeedError> {
        if self.base_url.is_empty() {
            return Err(FeedError::NotConfigured);
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|_| FeedError::ClientError)?;

        let url = format!("{}{}", self.base_url, self.endpoint);
        let mut request = client.get(&url).query(&[("tg_id", tg_id.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::GetUrlError(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FeedError::GetUrlError(e.to_string()))?;

        if !status.is_success() {
            return Err(FeedError::UpstreamError {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        match serde_json::from_str::<LoadsFeed>(&body) {
            Ok(feed) => Ok(FeedPayload::Loads(feed)),
            Err(_) => Ok(FeedPayload::Raw(truncate(&body, MAX_RAW_CHARS))),
        }
    }
}

/// Render a feed payload for the chat, bounded to the first 30 entries.
pub fn render(payload: &FeedPayload) -> String {
    let feed = match payload {
        FeedPayload::Raw(raw) => return format!("Response:\n{raw}"),
        FeedPayload::Loads(feed) => feed,
    };

    if feed.loads.is_empty() {
        return "No loads available right now.".to_string();
    }

    let mut out = vec!["🚚 Current loads:".to_string()];
    if let Some(updated_at) = &feed.updated_at {
        out.push(format!("Updated: {updated_at}"));
    }

    for (i, entry) in feed.loads.iter().take(MAX_RENDERED_LOADS).enumerate() {
        out.push(format!(
            "\n{})\nDirection: {}\nCargo and tonnage: {}\nTransport type: {}",
            i + 1,
            field(&entry.direction),
            field(&entry.cargo),
            field(&entry.transport),
        ));
        if let Some(extra) = &entry.extra {
            out.push(format!("Extra: {extra}"));
        }
        out.push(format!("Date: {}", field(&entry.date)));
    }

    out.join("\n")
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("—")
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
