use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::classifier::WebinarClassifier;
use crate::config::StatsConfig;
use crate::extract::{decode_sections, decode_total, extract};
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::types::{AggregationResult, FetchOutcome, Source};

/// Aggregator owns the source list, fetcher and classifier and produces one
/// [`AggregationResult`] per run. Runs share no state beyond configuration.
pub struct Aggregator {
    sources: Vec<Source>,
    fetcher: Fetcher,
    classifier: WebinarClassifier,
}

impl Aggregator {
    pub fn new(sources: Vec<Source>, fetcher: Fetcher, classifier: WebinarClassifier) -> Self {
        Self { sources, fetcher, classifier }
    }

    /// Production wiring: reqwest transport plus the configured policy and keywords.
    pub fn from_config(cfg: &StatsConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(cfg, transport))
    }

    pub fn with_transport(cfg: &StatsConfig, transport: Arc<dyn Transport>) -> Self {
        let fetcher = Fetcher::new(transport, cfg.fetch);
        let classifier = WebinarClassifier::new(&cfg.exclusion_keywords);
        Self::new(cfg.sources.clone(), fetcher, classifier)
    }

    /// Fetches every source, waits for all of them and folds the outcomes into
    /// metrics. Never fails; a failed source reads as 0.
    pub async fn run(&self) -> AggregationResult {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("aggregate", %run_id);
        async {
            let outcomes = self.fetcher.fetch_all(&self.sources).await;
            let result = self.fold(&outcomes);
            info!(
                success_count = result.success_count,
                total_sources = self.sources.len(),
                courses = result.courses,
                students = result.students,
                webinars = result.webinars,
                insiders = result.insiders,
                "aggregation finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Pure step of a run: turns settled outcomes (paired with `self.sources`
    /// by position) into the result record.
    pub fn fold(&self, outcomes: &[FetchOutcome]) -> AggregationResult {
        let mut result = AggregationResult::default();
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            if outcome.is_success() {
                result.success_count += 1;
            }
            result.set(source.metric, self.metric_value(source, outcome));
        }
        result
    }

    fn metric_value(&self, source: &Source, outcome: &FetchOutcome) -> u64 {
        if source.metric.is_derived() {
            let sections = extract(outcome, Vec::new(), |payload| {
                let decoded = decode_sections(payload);
                if decoded.is_none() {
                    warn!(source = %source.id, field = "data.course.lecture_sections", "field missing, using empty section list");
                }
                decoded
            });
            self.classifier.classify(&sections)
        } else {
            extract(outcome, 0, |payload| {
                let decoded = decode_total(payload);
                if decoded.is_none() {
                    warn!(source = %source.id, field = "data.meta.total", "field missing, using 0");
                }
                decoded
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchPolicy;
    use crate::fetcher::mock::ScriptedTransport;
    use crate::types::{FetchError, Metric};
    use serde_json::{json, Value};

    fn total(n: u64) -> Value { json!({"data": {"meta": {"total": n}}}) }

    fn course(sections: Value) -> Value { json!({"data": {"course": {"lecture_sections": sections}}}) }

    fn config() -> StatsConfig {
        StatsConfig {
            fetch: FetchPolicy { timeout_ms: 500, retries: 0, backoff_ms: 1, slow_warn_ms: 5_000 },
            ..StatsConfig::default()
        }
    }

    fn healthy() -> ScriptedTransport {
        ScriptedTransport::new()
            .respond("courses", Ok(total(12)))
            .respond("enrollments", Ok(total(340)))
            .respond("users", Ok(total(1500)))
            .respond(
                "course",
                Ok(course(json!([
                    {"id": 1, "name": "Intro", "lectures": [1, 2]},
                    {"id": 2, "name": "Module 1", "lectures": [1, 2, 3]},
                    {"id": 3, "name": "Archived Q&A", "lectures": [1]}
                ]))),
            )
    }

    #[tokio::test]
    async fn all_sources_succeed() {
        let agg = Aggregator::with_transport(&config(), Arc::new(healthy()));
        let r = agg.run().await;
        assert_eq!(
            r,
            AggregationResult { courses: 12, students: 1500, webinars: 3, insiders: 340, success_count: 4 }
        );
    }

    #[tokio::test]
    async fn all_sources_fail() {
        // No scripts: every source answers with a network error.
        let agg = Aggregator::with_transport(&config(), Arc::new(ScriptedTransport::new()));
        assert_eq!(agg.run().await, AggregationResult::default());
    }

    #[tokio::test]
    async fn one_failure_degrades_only_its_metric() {
        let transport = ScriptedTransport::new()
            .respond("courses", Ok(total(12)))
            .respond("enrollments", Ok(total(340)))
            .respond("users", Err(FetchError::Network("connection reset".into())))
            .respond("course", Ok(course(json!([{"name": "Live 1", "lectures": [1, 2]}]))));
        let agg = Aggregator::with_transport(&config(), Arc::new(transport));
        let r = agg.run().await;
        assert_eq!(r.success_count, 3);
        assert_eq!(r.students, 0);
        assert_eq!(r.courses, 12);
        assert_eq!(r.insiders, 340);
        assert_eq!(r.webinars, 2);
    }

    #[tokio::test]
    async fn empty_section_list_reads_zero_webinars() {
        let transport = ScriptedTransport::new()
            .respond("courses", Ok(total(1)))
            .respond("enrollments", Ok(total(1)))
            .respond("users", Ok(total(1)))
            .respond("course", Ok(course(json!([]))));
        let r = Aggregator::with_transport(&config(), Arc::new(transport)).run().await;
        assert_eq!(r.webinars, 0);
        assert_eq!(r.success_count, 4);
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let agg = Aggregator::with_transport(&config(), Arc::new(healthy()));
        let first = agg.run().await;
        let second = agg.run().await;
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_success_counts_as_success_but_reads_zero() {
        let agg = Aggregator::with_transport(&config(), Arc::new(ScriptedTransport::new()));
        let outcomes = vec![
            FetchOutcome::Success(json!({"data": null})),
            FetchOutcome::Success(Value::Null),
            FetchOutcome::Success(json!({"data": {"course": {}}})),
            FetchOutcome::Success(json!({"data": {"meta": {"total": 9}}})),
        ];
        let r = agg.fold(&outcomes);
        assert_eq!(r, AggregationResult { courses: 0, insiders: 0, webinars: 0, students: 9, success_count: 4 });
    }

    #[test]
    fn metrics_without_a_source_read_zero() {
        let mut cfg = config();
        cfg.sources.retain(|s| s.metric == Metric::Courses);
        let agg = Aggregator::with_transport(&cfg, Arc::new(ScriptedTransport::new()));
        let r = agg.fold(&[FetchOutcome::Success(total(5))]);
        assert_eq!(r, AggregationResult { courses: 5, success_count: 1, ..AggregationResult::default() });
    }

    #[test]
    fn configured_keywords_drive_classification() {
        let mut cfg = config();
        cfg.exclusion_keywords = vec!["module".into()];
        let agg = Aggregator::with_transport(&cfg, Arc::new(ScriptedTransport::new()));
        let outcomes = vec![
            FetchOutcome::Failure(FetchError::Timeout(500)),
            FetchOutcome::Failure(FetchError::Timeout(500)),
            FetchOutcome::Success(course(json!([
                {"name": "Intro", "lectures": [1, 2]},
                {"name": "Module 1", "lectures": [1, 2, 3]}
            ]))),
            FetchOutcome::Failure(FetchError::Timeout(500)),
        ];
        let r = agg.fold(&outcomes);
        assert_eq!(r.webinars, 2);
        assert_eq!(r.success_count, 1);
    }
}
