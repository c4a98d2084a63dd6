//! InfluxDB Time-Series Adapter
//!
//! `TimeSeriesBackend` over the InfluxDB v2 HTTP API. Each partition is a
//! bucket. Writes use line protocol at second precision; queries use Flux
//! with a pivot so each CSV row carries every field of one point.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use crate::application::ports::{Point, PointQuery, PointValue, TimeSeriesBackend, TimeSeriesError};

/// Columns Flux adds to every row.
const RESERVED_COLUMNS: &[&str] = &["", "result", "table", "_start", "_stop", "_time", "_measurement"];

/// InfluxDB v2 client.
#[derive(Clone)]
pub struct InfluxTimeSeries {
    http_client: reqwest::Client,
    base_url: String,
    org: String,
    token: String,
}

impl std::fmt::Debug for InfluxTimeSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxTimeSeries")
            .field("base_url", &self.base_url)
            .field("org", &self.org)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl InfluxTimeSeries {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `TimeSeriesError::Backend` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        org: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TimeSeriesError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimeSeriesError::Backend {
                message: e.to_string(),
            })?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            org: org.into(),
            token: token.into(),
        })
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, TimeSeriesError> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| TimeSeriesError::Backend {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TimeSeriesError::Backend {
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(TimeSeriesError::Backend {
                message: format!("HTTP {}: {body}", status.as_u16()),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl TimeSeriesBackend for InfluxTimeSeries {
    async fn write_points(&self, partition: &str, points: &[Point]) -> Result<(), TimeSeriesError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = points.iter().map(line_protocol).collect::<Vec<_>>().join("\n");
        let request = self
            .http_client
            .post(format!("{}/api/v2/write", self.base_url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", partition),
                ("precision", "s"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        self.send(request).await?;

        tracing::debug!(partition, points = points.len(), "Points written");
        Ok(())
    }

    async fn query(
        &self,
        partition: &str,
        query: &PointQuery,
    ) -> Result<Vec<Point>, TimeSeriesError> {
        let request = self
            .http_client
            .post(format!("{}/api/v2/query", self.base_url))
            .query(&[("org", self.org.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.flux")
            .header(reqwest::header::ACCEPT, "application/csv")
            .body(flux_query(partition, query));
        let body = self.send(request).await?;

        let mut points = parse_csv(&body, &query.tag_key)?;
        points.sort_by_key(|p| p.time);
        Ok(points)
    }
}

// =============================================================================
// Line Protocol
// =============================================================================

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Render one point as a line-protocol line with a seconds timestamp.
#[must_use]
pub fn line_protocol(point: &Point) -> String {
    let mut line = escape(&point.measurement, &[',', ' ']);
    for (key, value) in &point.tags {
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    let fields: Vec<String> = point
        .fields
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                PointValue::Float(v) => v.to_string(),
                PointValue::Integer(v) => format!("{v}i"),
            };
            format!("{}={rendered}", escape(key, &[',', '=', ' ']))
        })
        .collect();
    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&point.time.timestamp().to_string());
    line
}

// =============================================================================
// Flux
// =============================================================================

fn flux_string(value: &str) -> String {
    format!("\"{}\"", escape(value, &['\\', '"']))
}

fn flux_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build the range query. The Flux stop bound is exclusive, so it is pushed
/// one second past `to`.
#[must_use]
pub fn flux_query(partition: &str, query: &PointQuery) -> String {
    let mut flux = format!(
        "from(bucket: {bucket})\n  \
         |> range(start: {start}, stop: {stop})\n  \
         |> filter(fn: (r) => r._measurement == {measurement} and r[{tag_key}] == {tag_value})\n  \
         |> pivot(rowKey: [\"_time\"], columnKey: [\"_field\"], valueColumn: \"_value\")\n  \
         |> group()",
        bucket = flux_string(partition),
        start = flux_time(query.from),
        stop = flux_time(query.to + TimeDelta::seconds(1)),
        measurement = flux_string(&query.measurement),
        tag_key = flux_string(&query.tag_key),
        tag_value = flux_string(&query.tag_value),
    );
    if let Some(limit) = query.limit {
        flux.push_str(&format!(
            "\n  |> sort(columns: [\"_time\"], desc: true)\n  |> limit(n: {limit})"
        ));
    }
    flux.push_str("\n  |> sort(columns: [\"_time\"])");
    flux
}

// =============================================================================
// CSV Results
// =============================================================================

fn invalid(message: impl Into<String>) -> TimeSeriesError {
    TimeSeriesError::InvalidResponse {
        message: message.into(),
    }
}

fn parse_value(raw: &str) -> Option<PointValue> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(PointValue::Integer(v));
    }
    raw.parse::<f64>().ok().map(PointValue::Float)
}

/// Parse Flux CSV output. Each table repeats its header row; annotation
/// rows are skipped.
fn parse_csv(body: &str, tag_key: &str) -> Result<Vec<Point>, TimeSeriesError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(body.as_bytes());

    let mut header: Vec<String> = Vec::new();
    let mut points = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| invalid(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.iter().any(|cell| cell == "_time") {
            header = record.iter().map(str::to_string).collect();
            continue;
        }
        if header.is_empty() {
            return Err(invalid("row before header"));
        }

        let mut time = None;
        let mut measurement = String::new();
        let mut tags = BTreeMap::new();
        let mut fields = BTreeMap::new();
        for (column, cell) in header.iter().zip(record.iter()) {
            match column.as_str() {
                "_time" => {
                    let parsed = DateTime::parse_from_rfc3339(cell)
                        .map_err(|e| invalid(format!("bad _time {cell:?}: {e}")))?;
                    time = Some(parsed.with_timezone(&Utc));
                }
                "_measurement" => measurement = cell.to_string(),
                c if c == tag_key => {
                    tags.insert(c.to_string(), cell.to_string());
                }
                c if RESERVED_COLUMNS.contains(&c) || cell.is_empty() => {}
                c => {
                    let value = parse_value(cell)
                        .ok_or_else(|| invalid(format!("bad value for {c}: {cell:?}")))?;
                    fields.insert(c.to_string(), value);
                }
            }
        }

        points.push(Point {
            measurement,
            tags,
            fields,
            time: time.ok_or_else(|| invalid("row without _time"))?,
        });
    }
    Ok(points)
}
