//! REST Crawler
//!
//! # Endpoints
//!
//! - Symbols: `GET {symbols_url}` returning `{"items": [{ticker, comGroupCode, organName, organShortName}]}`
//! - History: `GET {history_url}?resolution=&symbol=&from=&to=` returning
//!   parallel `t` (integers) and `o/h/l/c/v` (strings) arrays

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::application::ports::{CrawledBar, Crawler, CrawlerError};
use crate::domain::{Resolution, StockSnapshot, Ticker};
use crate::infrastructure::http_client::{build_client, get_json};

/// Upstream REST endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsiEndpoints {
    /// Listed organizations (query string included).
    pub symbols_url: String,
    /// Chart history.
    pub history_url: String,
}

impl Default for SsiEndpoints {
    fn default() -> Self {
        Self {
            symbols_url: "https://fiin-core.ssi.com.vn/Master/GetListOrganization?language=vi"
                .to_string(),
            history_url: "https://iboard.ssi.com.vn/dchart/api/history".to_string(),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct OrganizationsResponse {
    #[serde(default)]
    items: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    ticker: String,
    #[serde(default)]
    com_group_code: String,
    #[serde(default)]
    organ_name: String,
    #[serde(default)]
    organ_short_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<String>,
    #[serde(default)]
    h: Vec<String>,
    #[serde(default)]
    l: Vec<String>,
    #[serde(default)]
    c: Vec<String>,
    #[serde(default)]
    v: Vec<String>,
}

impl HistoryResponse {
    fn into_bars(self) -> Result<Vec<CrawledBar>, CrawlerError> {
        let len = self.t.len();
        let aligned = [self.o.len(), self.h.len(), self.l.len(), self.c.len(), self.v.len()]
            .iter()
            .all(|n| *n == len);
        if !aligned {
            return Err(CrawlerError::InvalidResponse {
                message: "history arrays differ in length".to_string(),
            });
        }

        (0..len)
            .map(|i| {
                let time = DateTime::from_timestamp(self.t[i], 0).ok_or_else(|| {
                    CrawlerError::InvalidResponse {
                        message: format!("timestamp out of range: {}", self.t[i]),
                    }
                })?;
                Ok(CrawledBar {
                    time,
                    open: parse("o", &self.o[i])?,
                    high: parse("h", &self.h[i])?,
                    low: parse("l", &self.l[i])?,
                    close: parse("c", &self.c[i])?,
                    volume: parse("v", &self.v[i])?,
                })
            })
            .collect()
    }
}

fn parse<T: FromStr>(series: &str, raw: &str) -> Result<T, CrawlerError> {
    raw.trim()
        .parse()
        .map_err(|_| CrawlerError::InvalidResponse {
            message: format!("non-numeric {series} value: {raw:?}"),
        })
}

/// Map an index group code to an exchange.
fn map_exchange(group: &str) -> Result<&'static str, CrawlerError> {
    match group {
        "VNINDEX" => Ok("HOSE"),
        "HNXIndex" => Ok("HNX"),
        "UpcomIndex" => Ok("UPCOM"),
        other => Err(CrawlerError::UnsupportedExchange(other.to_string())),
    }
}

/// Resolution token; the source only charts one-minute and daily bars.
fn resolution_token(resolution: Resolution) -> Result<&'static str, CrawlerError> {
    match resolution {
        Resolution::Minute1 | Resolution::Daily => Ok(resolution.provider_token()),
        other => Err(CrawlerError::UnsupportedResolution(other)),
    }
}

// =============================================================================
// Crawler
// =============================================================================

/// HTTP crawler for the alternate broker's symbol and history APIs.
#[derive(Debug, Clone)]
pub struct SsiRestCrawler {
    http_client: reqwest::Client,
    endpoints: SsiEndpoints,
}

impl SsiRestCrawler {
    /// Create a crawler with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `CrawlerError::Http` if the HTTP client cannot be built.
    pub fn new(endpoints: SsiEndpoints, timeout: Duration) -> Result<Self, CrawlerError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            endpoints,
        })
    }
}

#[async_trait]
impl Crawler for SsiRestCrawler {
    async fn fetch_symbols(&self) -> Result<Vec<Ticker>, CrawlerError> {
        tracing::debug!(url = %self.endpoints.symbols_url, "Fetching symbols");
        let response: OrganizationsResponse =
            get_json(self.http_client.get(&self.endpoints.symbols_url)).await?;

        response
            .items
            .into_iter()
            .map(|entry| {
                let mut ticker = Ticker::new(entry.ticker, map_exchange(&entry.com_group_code)?);
                ticker.full_name = entry.organ_name;
                ticker.short_name = entry.organ_short_name;
                ticker.instrument_type = "Stock".to_string();
                Ok(ticker)
            })
            .collect()
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Result<Vec<CrawledBar>, CrawlerError> {
        let query = [
            ("resolution", resolution_token(resolution)?.to_string()),
            ("symbol", symbol.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ];
        let response: HistoryResponse =
            get_json(self.http_client.get(&self.endpoints.history_url).query(&query)).await?;
        response.into_bars()
    }

    async fn fetch_snapshot(&self, _symbols: &[String]) -> Result<Vec<StockSnapshot>, CrawlerError> {
        Err(CrawlerError::Unsupported("snapshots"))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn crawler(server: &MockServer) -> SsiRestCrawler {
        let base = server.uri();
        SsiRestCrawler::new(
            SsiEndpoints {
                symbols_url: format!("{base}/Master/GetListOrganization"),
                history_url: format!("{base}/dchart/api/history"),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Master/GetListOrganization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "page": 1,
                "pageSize": 2,
                "totalCount": 2,
                "items": [
                    {"organCode": "FPT", "ticker": "FPT", "comGroupCode": "VNINDEX",
                     "organName": "FPT Corp", "organShortName": "FPT"},
                    {"organCode": "ACV", "ticker": "ACV", "comGroupCode": "UpcomIndex",
                     "organName": "Airports Corp", "organShortName": "ACV"}
                ],
                "packageId": null,
                "status": "Success",
                "errors": null
            })))
            .mount(&server)
            .await;

        let tickers = crawler(&server).fetch_symbols().await.unwrap();
        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].symbol, "FPT");
        assert_eq!(tickers[0].exchange, "HOSE");
        assert_eq!(tickers[0].full_name, "FPT Corp");
        assert_eq!(tickers[0].instrument_type, "Stock");
        assert_eq!(tickers[1].exchange, "UPCOM");
        assert!(!tickers[1].is_active);
    }

    #[tokio::test]
    async fn unknown_group_fails_the_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Master/GetListOrganization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"ticker": "XYZ", "comGroupCode": "OTC"}]
            })))
            .mount(&server)
            .await;

        let err = crawler(&server).fetch_symbols().await.unwrap_err();
        assert!(matches!(err, CrawlerError::UnsupportedExchange(group) if group == "OTC"));
    }

    #[tokio::test]
    async fn fetches_string_array_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dchart/api/history"))
            .and(query_param("resolution", "1"))
            .and(query_param("symbol", "FPT"))
            .and(query_param("from", "100"))
            .and(query_param("to", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "s": "ok",
                "t": [120, 180],
                "o": ["10.5", "11"],
                "h": ["12", "13.25"],
                "l": ["9", "10.5"],
                "c": ["11", "12.5"],
                "v": ["1000", "2000"]
            })))
            .mount(&server)
            .await;

        let bars = crawler(&server)
            .fetch_history("FPT", Resolution::Minute1, 100, 200)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 10.5);
        assert_eq!(bars[1].time.timestamp(), 180);
        assert_eq!(bars[1].high, 13.25);
        assert_eq!(bars[1].volume, 2000);
    }

    #[tokio::test]
    async fn non_numeric_history_value_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dchart/api/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "t": [1], "o": ["1"], "h": ["1"], "l": ["1"], "c": ["n/a"], "v": ["1"]
            })))
            .mount(&server)
            .await;

        let err = crawler(&server)
            .fetch_history("FPT", Resolution::Daily, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidResponse { message } if message.contains("non-numeric c")));
    }

    #[tokio::test]
    async fn no_data_history_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dchart/api/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"s": "no_data"})))
            .mount(&server)
            .await;

        let bars = crawler(&server)
            .fetch_history("FPT", Resolution::Daily, 0, 1)
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn intermediate_resolutions_skip_http() {
        let server = MockServer::start().await;
        let err = crawler(&server)
            .fetch_history("FPT", Resolution::Minute60, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::UnsupportedResolution(Resolution::Minute60)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshots_are_unsupported() {
        let server = MockServer::start().await;
        let err = crawler(&server)
            .fetch_snapshot(&["FPT".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::Unsupported(_)));
    }
}
