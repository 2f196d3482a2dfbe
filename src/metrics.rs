use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// Statistics for one `Agent::process` call.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TurnReport {
    pub agent: String,
    pub duration: Duration,
    /// Completions requested from the model.
    pub rounds: usize,
    pub tool_calls: usize,
    pub usage: Usage,
    pub success: bool,
}

impl TurnReport {
    pub fn success_rate(reports: &[Self]) -> f32 {
        if reports.is_empty() {
            return 0.0;
        }
        let successes = reports.iter().filter(|r| r.success).count();
        successes as f32 / reports.len() as f32
    }
}

#[derive(Default, Clone)]
pub struct MetricsTracker {
    reports: Arc<Mutex<Vec<TurnReport>>>,
}

impl MetricsTracker {
    pub fn start_turn(&self, agent: impl Into<String>) -> TurnGuard {
        TurnGuard {
            start: Instant::now(),
            agent: agent.into(),
            rounds: 0,
            tool_calls: 0,
            usage: Usage::default(),
            metrics: self.clone(),
            finished: false,
        }
    }

    pub fn reports(&self) -> Vec<TurnReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    fn push(&self, report: TurnReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

/// Accumulates one turn. A guard dropped without `finish` (error, timeout or
/// cancellation) is recorded as a failed turn.
pub struct TurnGuard {
    start: Instant,
    agent: String,
    rounds: usize,
    tool_calls: usize,
    usage: Usage,
    metrics: MetricsTracker,
    finished: bool,
}

impl TurnGuard {
    pub fn record_round(&mut self, usage: Usage) {
        self.rounds += 1;
        self.usage += usage;
    }

    pub fn record_tool_calls(&mut self, count: usize) {
        self.tool_calls += count;
    }

    fn report(&self, success: bool) -> TurnReport {
        TurnReport {
            agent: self.agent.clone(),
            duration: self.start.elapsed(),
            rounds: self.rounds,
            tool_calls: self.tool_calls,
            usage: self.usage,
            success,
        }
    }

    pub fn finish(mut self, success: bool) -> TurnReport {
        self.finished = true;
        let report = self.report(success);
        self.metrics.push(report.clone());
        report
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.push(self.report(false));
        }
    }
}
