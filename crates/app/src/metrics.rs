use serde::Serialize;
use std::time::{Duration, Instant};

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
}

/// Wall-clock time of each pipeline stage that ran, in run order.
#[derive(Debug, Default, Serialize)]
pub struct StageTimings {
    stages: Vec<StageTiming>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, timer: TimedOperation) {
        let seconds = timer.elapsed().as_secs_f64();
        tracing::info!(stage, seconds, "Stage finished");
        self.stages.push(StageTiming {
            stage: stage.to_string(),
            seconds,
        });
    }

    pub fn stages(&self) -> &[StageTiming] {
        &self.stages
    }

    pub fn total_seconds(&self) -> f64 {
        self.stages.iter().map(|s| s.seconds).sum()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for s in &self.stages {
            out.push_str(&format!("  {:<12} {:>8.2}s\n", s.stage, s.seconds));
        }
        out.push_str(&format!("  {:<12} {:>8.2}s\n", "total", self.total_seconds()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_keep_run_order() {
        let mut timings = StageTimings::new();
        timings.record("extraction", TimedOperation::start());
        timings.record("graph", TimedOperation::start());

        let names: Vec<&str> = timings.stages().iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(names, vec!["extraction", "graph"]);
        assert!(timings.summary().contains("total"));
        assert!(timings.total_seconds() >= 0.0);
    }
}
