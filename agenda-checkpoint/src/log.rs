//! Checkpoint log contract.
//!
//! One append-only stream per correlation id. Backends decide the medium;
//! callers only append, replay, list and prune.

use agenda_core::{AgendaResult, CorrelationId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stage names written by the assistant pipeline.
pub mod stage {
    pub const ROUTE: &str = "route";
    pub const BUILD_CONTEXT: &str = "build_context";
    pub const PROPOSE: &str = "propose";
    pub const VALIDATE: &str = "validate";
    pub const REPAIR: &str = "repair";
    pub const DEDUPE: &str = "dedupe";
    pub const APPLY: &str = "apply";
    pub const SUMMARIZE: &str = "summarize";
    pub const CLARIFY: &str = "clarify";
    pub const DONE: &str = "done";

    pub const ALL: [&str; 10] = [
        ROUTE,
        BUILD_CONTEXT,
        PROPOSE,
        VALIDATE,
        REPAIR,
        DEDUPE,
        APPLY,
        SUMMARIZE,
        CLARIFY,
        DONE,
    ];
}

/// One stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub delta: Value,
}

impl CheckpointEntry {
    pub fn new(stage: impl Into<String>, delta: Value) -> Self {
        Self::at(Utc::now(), stage, delta)
    }

    pub fn at(timestamp: DateTime<Utc>, stage: impl Into<String>, delta: Value) -> Self {
        Self {
            timestamp,
            stage: stage.into(),
            delta,
        }
    }
}

#[async_trait]
pub trait CheckpointLog: Send + Sync {
    /// Append a pre-built entry to the stream for `correlation_id`.
    async fn append_entry(
        &self,
        correlation_id: &CorrelationId,
        entry: CheckpointEntry,
    ) -> AgendaResult<()>;

    /// Every entry for `correlation_id`, in append order. Unknown ids are empty.
    async fn replay(&self, correlation_id: &CorrelationId) -> AgendaResult<Vec<CheckpointEntry>>;

    /// Drop every stream last written before `cutoff`.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> AgendaResult<usize>;

    /// Correlation ids with at least one entry.
    async fn list(&self) -> AgendaResult<Vec<CorrelationId>>;

    /// Append `stage` with `delta`, stamped now.
    async fn append(
        &self,
        correlation_id: &CorrelationId,
        stage: &str,
        delta: Value,
    ) -> AgendaResult<CheckpointEntry> {
        let entry = CheckpointEntry::new(stage, delta);
        self.append_entry(correlation_id, entry.clone()).await?;
        Ok(entry)
    }
}
