//! Execution tracing
//!
//! Structured, timestamped step log per trade attempt. Consumed by the
//! guard and executor; steps are also mirrored to `tracing` so nothing
//! here is on any critical path.

use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// One recorded step within a trade attempt
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub at: chrono::DateTime<chrono::Utc>,
    pub stage: String,
    pub detail: String,
    /// Milliseconds since the tracer was created
    pub elapsed_ms: u64,
}

/// Per-trade step log
pub struct ExecutionTracer {
    trade_id: Uuid,
    started: Instant,
    steps: Mutex<Vec<TraceStep>>,
}

impl ExecutionTracer {
    pub fn new() -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            started: Instant::now(),
            steps: Mutex::new(Vec::new()),
        }
    }

    pub fn trade_id(&self) -> Uuid {
        self.trade_id
    }

    /// Record a step. Never fails; a poisoned lock drops the step.
    pub fn step(&self, stage: &str, detail: impl Into<String>) {
        let detail = detail.into();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        debug!(
            trade_id = %self.trade_id,
            stage,
            elapsed_ms,
            "{}",
            detail
        );

        if let Ok(mut steps) = self.steps.lock() {
            steps.push(TraceStep {
                at: chrono::Utc::now(),
                stage: stage.to_string(),
                detail,
                elapsed_ms,
            });
        }
    }

    /// Snapshot of all recorded steps, for the orchestration layer
    pub fn steps(&self) -> Vec<TraceStep> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for ExecutionTracer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered() {
        let tracer = ExecutionTracer::new();
        tracer.step("classify", "venue resolved");
        tracer.step("quote", "curve quote fetched");
        tracer.step("guard", "passed");

        let steps = tracer.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].stage, "classify");
        assert_eq!(steps[2].stage, "guard");
        assert!(steps[0].elapsed_ms <= steps[2].elapsed_ms);
    }

    #[test]
    fn test_trade_ids_are_unique() {
        assert_ne!(ExecutionTracer::new().trade_id(), ExecutionTracer::new().trade_id());
    }
}
