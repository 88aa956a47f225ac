use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The four counters the aggregation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Courses,
    Students,
    Webinars,
    Insiders,
}

impl Metric {
    pub fn all() -> &'static [Metric] {
        &[Metric::Courses, Metric::Students, Metric::Webinars, Metric::Insiders]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Courses => "courses",
            Metric::Students => "students",
            Metric::Webinars => "webinars",
            Metric::Insiders => "insiders",
        }
    }

    /// Webinars are derived from a course structure; everything else is a `meta.total` count.
    pub fn is_derived(&self) -> bool { matches!(self, Metric::Webinars) }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
}

/// One upstream endpoint. Immutable once built from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub url: String,
    pub metric: Metric,
    /// Environment variable holding a value for the `apiKey` request header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl Source {
    pub fn new(id: impl Into<String>, url: impl Into<String>, metric: Metric) -> Self {
        Self { id: id.into(), url: url.into(), metric, api_key_env: None }
    }

    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }
}

/// Why a single source produced no payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Error status whose body did not parse as JSON.
    #[error("upstream returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("response body is not JSON: {0}")]
    Decode(String),

    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl FetchError {
    /// Transient failures worth a second attempt within the same run.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { status } => *status >= 500,
            FetchError::Decode(_) | FetchError::TaskFailed(_) => false,
        }
    }
}

/// Settled result of fetching one source.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(serde_json::Value),
    Failure(FetchError),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool { matches!(self, FetchOutcome::Success(_)) }

    /// The payload, unless the fetch failed or the body was JSON `null`.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            FetchOutcome::Success(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }
}

/// A named group of lectures inside a course. Only the lecture count is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Section {
    pub id: Option<String>,
    pub name: Option<String>,
    pub lectures: usize,
}

impl Section {
    pub fn new(name: impl Into<String>, lectures: usize) -> Self {
        Self { id: None, name: Some(name.into()), lectures }
    }
}

/// Summary of one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub courses: u64,
    pub students: u64,
    pub webinars: u64,
    pub insiders: u64,
    pub success_count: usize,
}

impl AggregationResult {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Courses => self.courses,
            Metric::Students => self.students,
            Metric::Webinars => self.webinars,
            Metric::Insiders => self.insiders,
        }
    }

    pub(crate) fn set(&mut self, metric: Metric, value: u64) {
        match metric {
            Metric::Courses => self.courses = value,
            Metric::Students => self.students = value,
            Metric::Webinars => self.webinars = value,
            Metric::Insiders => self.insiders = value,
        }
    }
}
