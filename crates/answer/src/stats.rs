use serde::Serialize;

use crate::orchestrator::QueryResult;

/// Aggregates over one batch. Means cover successful queries only and are
/// `None` when nothing succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub mean_time: Option<f64>,
    pub mean_context_tokens: Option<f64>,
}

impl RunStats {
    pub fn from_results(results: &[QueryResult]) -> Self {
        let ok: Vec<&QueryResult> = results.iter().filter(|r| !r.is_error()).collect();

        let times: Vec<f64> = ok.iter().map(|r| r.time).collect();
        let tokens: Vec<f64> = ok
            .iter()
            .filter_map(|r| r.context_token_count)
            .map(|t| t as f64)
            .collect();

        Self {
            total: results.len(),
            succeeded: ok.len(),
            failed: results.len() - ok.len(),
            mean_time: (!times.is_empty()).then(|| statistical::mean(&times)),
            mean_context_tokens: (!tokens.is_empty()).then(|| statistical::mean(&tokens)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(time: f64, tokens: usize) -> QueryResult {
        QueryResult {
            query: "q".into(),
            answer: "a".into(),
            time,
            context_token_count: Some(tokens),
        }
    }

    #[test]
    fn errors_are_excluded_from_means() {
        let results = vec![ok(1.0, 100), QueryResult::failed("q", "boom"), ok(3.0, 300)];
        let stats = RunStats::from_results(&results);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.mean_time, Some(2.0));
        assert_eq!(stats.mean_context_tokens, Some(200.0));
    }

    #[test]
    fn all_failed_has_no_means() {
        let stats = RunStats::from_results(&[QueryResult::failed("q", "boom")]);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.mean_time, None);
    }
}
