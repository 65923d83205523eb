//! Prometheus range-query client.
//!
//! Talks to the HTTP API (`/api/v1/query_range`) and turns the JSON envelope
//! into [`QueryResult`]. Only `matrix` and `vector` results carry samples;
//! every other result type is passed through as [`QueryResult::Other`].

use crate::error::{PromtuneError, Result};
use crate::timerange::TimeWindow;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Response bodies longer than this are cut in error messages.
const MAX_ERROR_BODY: usize = 512;

/// One time-stamped scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    /// Unix time in seconds.
    pub timestamp: f64,
    pub value: f64,
}

/// A labelled series of data points in time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub points: Vec<DataPoint>,
}

/// Decoded `data` section of a query response.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Matrix(Vec<Series>),
    /// Instant vector; every series holds exactly one point.
    Vector(Vec<Series>),
    /// Scalar, string or unknown result type (carries the type name).
    Other(String),
}

impl QueryResult {
    /// Series of a matrix or vector result, `None` for any other type.
    pub fn into_series(self) -> Option<Vec<Series>> {
        match self {
            QueryResult::Matrix(series) | QueryResult::Vector(series) => Some(series),
            QueryResult::Other(_) => None,
        }
    }
}

/// Trait for range-query backends.
///
/// This trait allows swapping implementations (real Prometheus vs mock).
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `query` over `window` at `window.step` resolution.
    async fn range_query(&self, query: &str, window: &TimeWindow) -> Result<QueryResult>;
}

/// HTTP client for a Prometheus-compatible server.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl PrometheusClient {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:9090`).
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` if the URL does not parse.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/');
        let endpoint = reqwest::Url::parse(&format!("{}/api/v1/query_range", base)).map_err(
            |e| PromtuneError::ConfigInvalidValue {
                key: "prometheus.url".to_string(),
                message: format!("'{}': {}", base_url, e),
            },
        )?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl MetricsSource for PrometheusClient {
    async fn range_query(&self, query: &str, window: &TimeWindow) -> Result<QueryResult> {
        let params = [
            ("query", query.to_string()),
            ("start", format_timestamp(window.start)),
            ("end", format_timestamp(window.end)),
            ("step", format_step(window.step)),
        ];

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&params)
            .send()
            .await
            .map_err(|e| PromtuneError::Query {
                message: format!("Failed to reach {}: {}", self.endpoint, e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PromtuneError::Query {
            message: format!("Failed to read response body: {}", e),
        })?;

        parse_response(status.as_u16(), &body)
    }
}

/// Unix seconds with millisecond precision, as the API expects.
pub fn format_timestamp(time: SystemTime) -> String {
    let since_epoch = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", since_epoch.as_secs(), since_epoch.subsec_millis())
}

/// Step as (fractional) seconds.
pub fn format_step(step: Duration) -> String {
    format!("{}", step.as_secs_f64())
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    data: Option<EnvelopeData>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

#[derive(Deserialize)]
struct RawMatrixSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

#[derive(Deserialize)]
struct RawVectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Decode a query_range response body.
///
/// # Errors
/// - `Query` when the API reports `status: "error"`
/// - `QueryStatus` for a non-success HTTP status without an API error body
/// - `QueryResponse` when the body is not a well-formed envelope
pub fn parse_response(http_status: u16, body: &str) -> Result<QueryResult> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            if !(200..300).contains(&http_status) {
                return Err(PromtuneError::QueryStatus {
                    status: http_status,
                    body: truncate(body),
                });
            }
            return Err(PromtuneError::QueryResponse {
                message: format!("invalid JSON: {}", e),
            });
        }
    };

    if envelope.status != "success" {
        return Err(PromtuneError::Query {
            message: format!(
                "{}: {}",
                envelope.error_type.as_deref().unwrap_or("error"),
                envelope.error.as_deref().unwrap_or("no error message")
            ),
        });
    }
    if !(200..300).contains(&http_status) {
        return Err(PromtuneError::QueryStatus {
            status: http_status,
            body: truncate(body),
        });
    }

    let data = envelope.data.ok_or_else(|| PromtuneError::QueryResponse {
        message: "missing data section".to_string(),
    })?;

    match data.result_type.as_str() {
        "matrix" => {
            let raw: Vec<RawMatrixSeries> = decode_result(data.result)?;
            let series = raw
                .into_iter()
                .map(|s| {
                    let points = s
                        .values
                        .iter()
                        .map(|(ts, v)| parse_point(*ts, v))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Series {
                        labels: s.metric,
                        points,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(QueryResult::Matrix(series))
        }
        "vector" => {
            let raw: Vec<RawVectorSample> = decode_result(data.result)?;
            let series = raw
                .into_iter()
                .map(|s| {
                    Ok(Series {
                        labels: s.metric,
                        points: vec![parse_point(s.value.0, &s.value.1)?],
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(QueryResult::Vector(series))
        }
        other => Ok(QueryResult::Other(other.to_string())),
    }
}

fn decode_result<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| PromtuneError::QueryResponse {
        message: format!("malformed result: {}", e),
    })
}

fn parse_point(timestamp: f64, value: &str) -> Result<DataPoint> {
    let value = value
        .parse::<f64>()
        .map_err(|_| PromtuneError::QueryResponse {
            message: format!("sample value '{}' is not a number", value),
        })?;
    Ok(DataPoint { timestamp, value })
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Scripted reply of [`MockMetricsSource`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    Result(QueryResult),
    Fail(String),
}

/// Mock metrics source for testing
///
/// Replies are handed out in call order; once they run out every query
/// returns an empty matrix. Every queried window is recorded.
#[derive(Debug, Default)]
pub struct MockMetricsSource {
    responses: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<(String, TimeWindow)>>,
}

impl MockMetricsSource {
    /// Create a mock that returns empty matrices
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a matrix reply with one series holding `values`
    pub fn then_values(self, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &value)| DataPoint {
                timestamp: i as f64,
                value,
            })
            .collect();
        self.then_result(QueryResult::Matrix(vec![Series {
            labels: BTreeMap::new(),
            points,
        }]))
    }

    /// Queue an empty matrix reply
    pub fn then_empty(self) -> Self {
        self.then_result(QueryResult::Matrix(Vec::new()))
    }

    /// Queue an arbitrary reply
    pub fn then_result(self, result: QueryResult) -> Self {
        lock(&self.responses).push_back(MockResponse::Result(result));
        self
    }

    /// Queue a failing reply
    pub fn then_error(self, message: &str) -> Self {
        lock(&self.responses).push_back(MockResponse::Fail(message.to_string()));
        self
    }

    /// Windows queried so far, in order
    pub fn windows(&self) -> Vec<TimeWindow> {
        lock(&self.calls).iter().map(|(_, w)| *w).collect()
    }

    /// Query strings received so far, in order
    pub fn queries(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(q, _)| q.clone()).collect()
    }
}

#[async_trait::async_trait]
impl MetricsSource for MockMetricsSource {
    async fn range_query(&self, query: &str, window: &TimeWindow) -> Result<QueryResult> {
        lock(&self.calls).push((query.to_string(), *window));
        match lock(&self.responses).pop_front() {
            Some(MockResponse::Result(result)) => Ok(result),
            Some(MockResponse::Fail(message)) => Err(PromtuneError::Query { message }),
            None => Ok(QueryResult::Matrix(Vec::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
