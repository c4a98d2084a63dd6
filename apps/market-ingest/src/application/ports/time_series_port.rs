//! Time-Series Port (Driven Port)
//!
//! Partitioned point storage. A point is identified by its partition,
//! measurement, tag set and timestamp; writing the same identity again
//! replaces the stored field values (upsert).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Time-series backend error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TimeSeriesError {
    /// The backend failed or is unreachable.
    #[error("time-series backend error: {message}")]
    Backend {
        /// Error details.
        message: String,
    },

    /// The backend answered with something we could not parse.
    #[error("invalid time-series response: {message}")]
    InvalidResponse {
        /// Error details.
        message: String,
    },
}

/// A field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    /// Floating point field.
    Float(f64),
    /// Integer field.
    Integer(i64),
}

impl PointValue {
    /// Value as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Float(v) => v,
            Self::Integer(v) => v as f64,
        }
    }

    /// Value as an integer, truncating floats.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Float(v) => v as i64,
            Self::Integer(v) => v,
        }
    }
}

/// One stored point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name.
    pub measurement: String,
    /// Indexed tags.
    pub tags: BTreeMap<String, String>,
    /// Field values.
    pub fields: BTreeMap<String, PointValue>,
    /// Point time.
    pub time: DateTime<Utc>,
}

/// Range query over one tagged series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointQuery {
    /// Measurement to match.
    pub measurement: String,
    /// Tag key to match.
    pub tag_key: String,
    /// Tag value to match.
    pub tag_value: String,
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Inclusive upper bound.
    pub to: DateTime<Utc>,
    /// Keep only the newest `n` points when set.
    pub limit: Option<usize>,
}

/// Port for the partitioned time-series store.
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// Upsert points into a partition.
    async fn write_points(&self, partition: &str, points: &[Point]) -> Result<(), TimeSeriesError>;

    /// Query one series, ascending by time.
    async fn query(&self, partition: &str, query: &PointQuery)
    -> Result<Vec<Point>, TimeSeriesError>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

type SeriesKey = (String, BTreeMap<String, String>);
type Series = BTreeMap<DateTime<Utc>, BTreeMap<String, PointValue>>;

/// In-memory implementation of `TimeSeriesBackend`.
#[derive(Debug, Default)]
pub struct InMemoryTimeSeries {
    partitions: RwLock<HashMap<String, HashMap<SeriesKey, Series>>>,
}

impl InMemoryTimeSeries {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of points in a partition.
    #[must_use]
    pub fn point_count(&self, partition: &str) -> usize {
        self.partitions
            .read()
            .get(partition)
            .map_or(0, |series| series.values().map(BTreeMap::len).sum())
    }
}

#[async_trait]
impl TimeSeriesBackend for InMemoryTimeSeries {
    async fn write_points(&self, partition: &str, points: &[Point]) -> Result<(), TimeSeriesError> {
        let mut partitions = self.partitions.write();
        let store = partitions.entry(partition.to_string()).or_default();
        for point in points {
            let fields = store
                .entry((point.measurement.clone(), point.tags.clone()))
                .or_default()
                .entry(point.time)
                .or_default();
            fields.extend(point.fields.iter().map(|(k, v)| (k.clone(), *v)));
        }
        Ok(())
    }

    async fn query(
        &self,
        partition: &str,
        query: &PointQuery,
    ) -> Result<Vec<Point>, TimeSeriesError> {
        if query.from > query.to {
            return Ok(Vec::new());
        }
        let partitions = self.partitions.read();
        let Some(store) = partitions.get(partition) else {
            return Ok(Vec::new());
        };

        let mut points: Vec<Point> = store
            .iter()
            .filter(|((measurement, tags), _)| {
                *measurement == query.measurement
                    && tags.get(&query.tag_key) == Some(&query.tag_value)
            })
            .flat_map(|((measurement, tags), series)| {
                series
                    .range(query.from..=query.to)
                    .map(move |(time, fields)| Point {
                        measurement: measurement.clone(),
                        tags: tags.clone(),
                        fields: fields.clone(),
                        time: *time,
                    })
            })
            .collect();

        points.sort_by_key(|p| p.time);
        if let Some(limit) = query.limit {
            let skip = points.len().saturating_sub(limit);
            points.drain(..skip);
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn point(symbol: &str, secs: i64, close: f64) -> Point {
        Point {
            measurement: "HOSE".to_string(),
            tags: BTreeMap::from([("symbol".to_string(), symbol.to_string())]),
            fields: BTreeMap::from([("close".to_string(), PointValue::Float(close))]),
            time: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn query(symbol: &str, from: i64, to: i64, limit: Option<usize>) -> PointQuery {
        PointQuery {
            measurement: "HOSE".to_string(),
            tag_key: "symbol".to_string(),
            tag_value: symbol.to_string(),
            from: Utc.timestamp_opt(from, 0).unwrap(),
            to: Utc.timestamp_opt(to, 0).unwrap(),
            limit,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_same_identity() {
        let store = InMemoryTimeSeries::new();
        store.write_points("p", &[point("ABC", 10, 1.0)]).await.unwrap();
        store.write_points("p", &[point("ABC", 10, 2.0)]).await.unwrap();
        assert_eq!(store.point_count("p"), 1);

        let points = store.query("p", &query("ABC", 0, 100, None)).await.unwrap();
        assert_eq!(points[0].fields["close"], PointValue::Float(2.0));
    }

    #[tokio::test]
    async fn range_is_inclusive_and_ascending() {
        let store = InMemoryTimeSeries::new();
        store
            .write_points(
                "p",
                &[
                    point("ABC", 30, 3.0),
                    point("ABC", 10, 1.0),
                    point("ABC", 20, 2.0),
                    point("XYZ", 20, 9.0),
                ],
            )
            .await
            .unwrap();

        let points = store.query("p", &query("ABC", 10, 20, None)).await.unwrap();
        let times: Vec<i64> = points.iter().map(|p| p.time.timestamp()).collect();
        assert_eq!(times, vec![10, 20]);
    }

    #[tokio::test]
    async fn inverted_range_is_empty() {
        let store = InMemoryTimeSeries::new();
        store.write_points("p", &[point("ABC", 10, 1.0)]).await.unwrap();
        assert!(store.query("p", &query("ABC", 20, 0, None)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn limit_keeps_newest() {
        let store = InMemoryTimeSeries::new();
        let points: Vec<Point> = (1..=5).map(|i| point("ABC", i * 10, 0.0)).collect();
        store.write_points("p", &points).await.unwrap();

        let result = store.query("p", &query("ABC", 0, 100, Some(2))).await.unwrap();
        let times: Vec<i64> = result.iter().map(|p| p.time.timestamp()).collect();
        assert_eq!(times, vec![40, 50]);
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let store = InMemoryTimeSeries::new();
        store.write_points("a", &[point("ABC", 10, 1.0)]).await.unwrap();
        assert!(store.query("b", &query("ABC", 0, 100, None)).await.unwrap().is_empty());
    }

    #[test]
    fn point_value_conversions() {
        assert_eq!(PointValue::Integer(7).as_f64(), 7.0);
        assert_eq!(PointValue::Float(7.9).as_i64(), 7);
    }
}
