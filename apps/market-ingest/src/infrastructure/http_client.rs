//! Crawler HTTP Plumbing
//!
//! Client construction and JSON GETs shared by the REST crawlers.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::application::ports::CrawlerError;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36";

/// Build a browser-like client with a per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, CrawlerError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| CrawlerError::Http {
            message: e.to_string(),
        })
}

/// Send `request` and decode a JSON body.
///
/// Non-success statuses map to `CrawlerError::Status` with the body kept.
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, CrawlerError> {
    let response = request
        .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
        .send()
        .await
        .map_err(|e| CrawlerError::Http {
            message: e.to_string(),
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| CrawlerError::Http {
        message: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(CrawlerError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| CrawlerError::InvalidResponse {
        message: e.to_string(),
    })
}
