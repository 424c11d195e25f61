use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{Result, SyncError};

pub(crate) fn build_http_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| SyncError::Validation(format!("failed to build HTTP client: {}", e)))
}

/// Send a request and decode its JSON body, mapping provider failures
pub(crate) async fn send_json<T: DeserializeOwned>(req: RequestBuilder, what: &str) -> Result<T> {
    let resp = req
        .send()
        .await
        .map_err(|e| SyncError::SourceUnavailable(format!("{} request failed: {}", what, e)))?;
    let status = resp.status();
    let text = resp.text().await?;

    if status.as_u16() == 429 {
        return Err(SyncError::RateLimited(format!("{} rate limited", what)));
    }

    if !status.is_success() {
        return Err(SyncError::SourceUnavailable(format!(
            "{} failed: status={} body={}",
            what,
            status,
            truncate(&text, 256)
        )));
    }

    serde_json::from_str(&text)
        .map_err(|e| SyncError::InvalidSourceData(format!("invalid {} JSON response: {}", what, e)))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
