use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::core::service::Capability;

/// How a single stage call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed { status: u16 },
    Failed { status: Option<u16>, reason: String },
    Cancelled,
}

/// A single entry in the execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTrace {
    pub execution_id: Uuid,
    pub stage: String,
    pub capability: Capability,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: StageOutcome,
}

/// Trait for recording execution traces.
pub trait Telemetry: Send + Sync {
    fn record(&self, entry: StageTrace);
    fn flush(&self);
}

/// Simple in-memory collector for traces.
#[derive(Default)]
pub struct MemoryTelemetry {
    traces: Mutex<Vec<StageTrace>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<StageTrace> {
        self.traces
            .lock()
            .map(|traces| traces.clone())
            .unwrap_or_default()
    }

    /// Traces of one execution, in the order its stages ran.
    pub fn execution(&self, execution_id: Uuid) -> Vec<StageTrace> {
        self.traces()
            .into_iter()
            .filter(|t| t.execution_id == execution_id)
            .collect()
    }
}

impl Telemetry for MemoryTelemetry {
    fn record(&self, entry: StageTrace) {
        if let Ok(mut traces) = self.traces.lock() {
            traces.push(entry);
        }
    }

    fn flush(&self) {
        // Nothing buffered outside the vector
    }
}
