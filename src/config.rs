use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::types::{Metric, Source};

pub const CONFIG_FILE_NAME: &str = "course-stats.toml";

const DEFAULT_BASE_URL: &str = "https://techforword-courses.vercel.app";

pub const DEFAULT_EXCLUSION_KEYWORDS: &[&str] = &[
    "welcome",
    "intro",
    "getting started",
    "overview",
    "archived",
    "challenges",
    "guest expert sessions",
    "quick wins",
    "roundtables",
    "growth paths",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("source `{id}` has an invalid url `{url}`: {reason}")]
    InvalidUrl { id: String, url: String, reason: String },

    #[error("source id `{0}` is configured more than once")]
    DuplicateSource(String),

    #[error("metric `{metric}` is fed by both `{first}` and `{second}`")]
    DuplicateMetric { metric: Metric, first: String, second: String },

    #[error("fetch timeout must be greater than zero")]
    ZeroTimeout,
}

/// Per-attempt limits applied to every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub slow_warn_ms: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self { timeout_ms: 15_000, retries: 1, backoff_ms: 200, slow_warn_ms: 5_000 }
    }
}

impl FetchPolicy {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
    pub fn slow_warn(&self) -> Duration { Duration::from_millis(self.slow_warn_ms) }

    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub exclusion_keywords: Vec<String>,
    pub fetch: FetchPolicy,
    pub sources: Vec<Source>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            exclusion_keywords: DEFAULT_EXCLUSION_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            fetch: FetchPolicy::default(),
            sources: default_sources(),
        }
    }
}

pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new("courses", format!("{DEFAULT_BASE_URL}/courses"), Metric::Courses),
        Source::new("enrollments", format!("{DEFAULT_BASE_URL}/enrollments"), Metric::Insiders),
        Source::new("course", format!("{DEFAULT_BASE_URL}/course"), Metric::Webinars),
        Source::new("users", format!("{DEFAULT_BASE_URL}/users"), Metric::Students),
    ]
}

impl StatsConfig {
    /// Explicit path, then the platform config dir, then built-in defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("no config file found, using built-in defaults");
                    Self::default()
                }
            },
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let cfg: StatsConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), sources = cfg.sources.len(), "loaded config");
        Ok(cfg)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        if let Some(v) = parse("COURSE_STATS_TIMEOUT_MS") { self.fetch.timeout_ms = v; }
        if let Some(v) = parse("COURSE_STATS_RETRIES") { self.fetch.retries = v.min(u32::MAX as u64) as u32; }
        if let Some(v) = parse("COURSE_STATS_BACKOFF_MS") { self.fetch.backoff_ms = v; }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let mut ids = HashSet::new();
        let mut by_metric: Vec<(Metric, &str)> = Vec::new();
        for s in &self.sources {
            validate_url(s)?;
            if !ids.insert(s.id.as_str()) {
                return Err(ConfigError::DuplicateSource(s.id.clone()));
            }
            if let Some((_, first)) = by_metric.iter().find(|(m, _)| *m == s.metric) {
                return Err(ConfigError::DuplicateMetric {
                    metric: s.metric,
                    first: first.to_string(),
                    second: s.id.clone(),
                });
            }
            by_metric.push((s.metric, s.id.as_str()));
        }
        Ok(())
    }
}

fn validate_url(source: &Source) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        id: source.id.clone(),
        url: source.url.clone(),
        reason,
    };
    let parsed = Url::parse(&source.url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("dev", "course-stats", "course-stats")?;
    Some(proj.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_cover_every_metric_once() {
        let cfg = StatsConfig::default();
        assert!(cfg.validate().is_ok());
        for m in Metric::all() {
            assert_eq!(cfg.sources.iter().filter(|s| s.metric == *m).count(), 1, "{m}");
        }
        assert_eq!(cfg.exclusion_keywords.len(), 10);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[fetch]\ntimeout_ms = 2500\n").unwrap();
        let cfg = StatsConfig::from_file(&path).unwrap();
        assert_eq!(cfg.fetch.timeout_ms, 2500);
        assert_eq!(cfg.fetch.retries, 1);
        assert_eq!(cfg.sources, default_sources());
    }

    #[test]
    fn file_sources_replace_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
exclusion_keywords = ["intro"]

[[sources]]
id = "detail"
url = "http://localhost:9000/course"
metric = "webinars"
api_key_env = "API_KEY"
"#,
        )
        .unwrap();
        let cfg = StatsConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(cfg.exclusion_keywords, vec!["intro".to_string()]);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].metric, Metric::Webinars);
        assert_eq!(cfg.sources[0].api_key_env.as_deref(), Some("API_KEY"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(StatsConfig::load(Some(tmp.path().join("nope.toml").as_path())).is_err());
    }

    #[test]
    fn env_overrides_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("COURSE_STATS_TIMEOUT_MS", "750"),
            ("COURSE_STATS_RETRIES", "not-a-number"),
            ("COURSE_STATS_BACKOFF_MS", " 50 "),
        ]
        .into_iter()
        .collect();
        let mut cfg = StatsConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.fetch.timeout_ms, 750);
        assert_eq!(cfg.fetch.retries, 1);
        assert_eq!(cfg.fetch.backoff_ms, 50);
    }

    #[test]
    fn rejects_bad_urls_and_duplicates() {
        let mut cfg = StatsConfig::default();
        cfg.sources[0].url = "ftp://example.com/x".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidUrl { .. })));

        let mut cfg = StatsConfig::default();
        cfg.sources[1].id = "courses".into();
        assert_eq!(cfg.validate(), Err(ConfigError::DuplicateSource("courses".into())));

        let mut cfg = StatsConfig::default();
        cfg.sources[1].metric = Metric::Courses;
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateMetric { metric: Metric::Courses, .. })));

        let mut cfg = StatsConfig::default();
        cfg.fetch.timeout_ms = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn backoff_doubles() {
        let p = FetchPolicy { backoff_ms: 100, ..FetchPolicy::default() };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
    }
}
