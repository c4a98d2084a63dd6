//! REST Crawler
//!
//! Symbol list, chart history and snapshot pulls over HTTP.
//!
//! # Endpoints
//!
//! - Symbols: `GET {symbols_url}` returning `{"data": [{code, companyName, shortName, floor}]}`
//! - History: `GET {history_url}?resolution=&symbol=&from=&to=` returning
//!   parallel `t/o/h/l/c/v` arrays
//! - Snapshot: `GET {snapshot_url}?code=A,B` returning a JSON array of
//!   cipher-encoded quote payloads

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::application::ports::{CrawledBar, Crawler, CrawlerError};
use crate::domain::{Resolution, StockSnapshot, Ticker};
use crate::infrastructure::http_client::{build_client, get_json};

use super::codec::decode_snapshot;

// =============================================================================
// Configuration
// =============================================================================

/// Upstream REST endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VndEndpoints {
    /// Listed symbols (query string included).
    pub symbols_url: String,
    /// Chart history.
    pub history_url: String,
    /// Quote snapshots.
    pub snapshot_url: String,
}

impl Default for VndEndpoints {
    fn default() -> Self {
        Self {
            symbols_url: "https://api-finfo.vndirect.com.vn/v4/stocks?q=type:IFC,ETF,STOCK~status:LISTED&fields=code,companyName,companyNameEng,shortName,floor,industryName&size=3000".to_string(),
            history_url: "https://dchart-api.vndirect.com.vn/dchart/history".to_string(),
            snapshot_url: "https://price-api.vndirect.com.vn/stocks/snapshot".to_string(),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    #[serde(default)]
    data: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolEntry {
    code: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    floor: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<i64>,
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
                    open: self.o[i],
                    high: self.h[i],
                    low: self.l[i],
                    close: self.c[i],
                    volume: self.v[i],
                })
            })
            .collect()
    }
}

/// Map an upstream floor name to an exchange.
fn map_exchange(floor: &str) -> Result<&'static str, CrawlerError> {
    match floor {
        "HOSE" => Ok("HOSE"),
        "HNX" => Ok("HNX"),
        "UPCOM" => Ok("UPCOM"),
        other => Err(CrawlerError::UnsupportedExchange(other.to_string())),
    }
}

// =============================================================================
// Crawler
// =============================================================================

/// HTTP crawler for the upstream broker APIs.
#[derive(Debug, Clone)]
pub struct VndRestCrawler {
    http_client: reqwest::Client,
    endpoints: VndEndpoints,
}

impl VndRestCrawler {
    /// Create a crawler with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `CrawlerError::Http` if the HTTP client cannot be built.
    pub fn new(endpoints: VndEndpoints, timeout: Duration) -> Result<Self, CrawlerError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            endpoints,
        })
    }
}

#[async_trait]
impl Crawler for VndRestCrawler {
    async fn fetch_symbols(&self) -> Result<Vec<Ticker>, CrawlerError> {
        tracing::debug!(url = %self.endpoints.symbols_url, "Fetching symbols");
        let response: SymbolsResponse =
            get_json(self.http_client.get(&self.endpoints.symbols_url)).await?;

        response
            .data
            .into_iter()
            .map(|entry| {
                let mut ticker = Ticker::new(entry.code, map_exchange(&entry.floor)?);
                ticker.full_name = entry.company_name;
                ticker.short_name = entry.short_name;
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
            ("resolution", resolution.provider_token().to_string()),
            ("symbol", symbol.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ];
        let response: HistoryResponse =
            get_json(self.http_client.get(&self.endpoints.history_url).query(&query)).await?;
        response.into_bars()
    }

    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<Vec<StockSnapshot>, CrawlerError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let query = [("code", symbols.join(","))];
        let entries: Vec<String> =
            get_json(self.http_client.get(&self.endpoints.snapshot_url).query(&query)).await?;

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Some(snapshot) = decode_snapshot(entry)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::MessageCategory;
    use crate::infrastructure::vnd::codec::encode_frame;

    fn crawler(server: &MockServer) -> VndRestCrawler {
        let base = server.uri();
        VndRestCrawler::new(
            VndEndpoints {
                symbols_url: format!("{base}/v4/stocks"),
                history_url: format!("{base}/dchart/history"),
                snapshot_url: format!("{base}/stocks/snapshot"),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/stocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "currentPage": 1,
                "data": [
                    {"code": "FPT", "companyName": "FPT Corp", "shortName": "FPT", "floor": "HOSE"},
                    {"code": "SHS", "companyName": "SHS Securities", "shortName": "SHS", "floor": "HNX"}
                ]
            })))
            .mount(&server)
            .await;

        let tickers = crawler(&server).fetch_symbols().await.unwrap();
        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].symbol, "FPT");
        assert_eq!(tickers[0].exchange, "HOSE");
        assert_eq!(tickers[0].full_name, "FPT Corp");
        assert!(!tickers[1].is_active);
    }

    #[tokio::test]
    async fn unknown_floor_fails_the_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/stocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"code": "XYZ", "floor": "OTC"}]
            })))
            .mount(&server)
            .await;

        let err = crawler(&server).fetch_symbols().await.unwrap_err();
        assert!(matches!(err, CrawlerError::UnsupportedExchange(floor) if floor == "OTC"));
    }

    #[tokio::test]
    async fn fetches_history_with_provider_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dchart/history"))
            .and(query_param("resolution", "D"))
            .and(query_param("symbol", "FPT"))
            .and(query_param("from", "100"))
            .and(query_param("to", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "s": "ok",
                "t": [86400, 172800],
                "o": [10.0, 11.0],
                "h": [12.0, 13.0],
                "l": [9.0, 10.5],
                "c": [11.0, 12.5],
                "v": [1000, 2000]
            })))
            .mount(&server)
            .await;

        let bars = crawler(&server)
            .fetch_history("FPT", Resolution::Daily, 100, 200)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].time.timestamp(), 172_800);
        assert_eq!(bars[1].close, 12.5);
        assert_eq!(bars[1].volume, 2000);
    }

    #[tokio::test]
    async fn no_data_history_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dchart/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"s": "no_data"})))
            .mount(&server)
            .await;

        let bars = crawler(&server)
            .fetch_history("FPT", Resolution::Minute1, 0, 1)
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn misaligned_history_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dchart/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "t": [1, 2], "o": [1.0], "h": [1.0], "l": [1.0], "c": [1.0], "v": [1]
            })))
            .mount(&server)
            .await;

        let err = crawler(&server)
            .fetch_history("FPT", Resolution::Daily, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = crawler(&server)
            .fetch_history("FPT", Resolution::Daily, 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn fetches_and_decodes_snapshots() {
        let frame = encode_frame(
            MessageCategory::Quote,
            &["SBS", "FPT", "ST", "HOSE", "100", "93", "107"],
        )
        .unwrap();
        let encoded = frame.split_once(':').unwrap().1.to_string();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stocks/snapshot"))
            .and(query_param("code", "FPT,VNM"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([encoded])))
            .mount(&server)
            .await;

        let snapshots = crawler(&server)
            .fetch_snapshot(&["FPT".to_string(), "VNM".to_string()])
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].symbol, "FPT");
        assert_eq!(snapshots[0].ceiling_price, 107.0);
    }

    #[tokio::test]
    async fn empty_snapshot_request_skips_http() {
        let server = MockServer::start().await;
        let snapshots = crawler(&server).fetch_snapshot(&[]).await.unwrap();
        assert!(snapshots.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
