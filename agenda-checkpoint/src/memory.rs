//! In-memory checkpoint log for tests and single-process use.

use crate::log::{CheckpointEntry, CheckpointLog};
use agenda_core::{AgendaError, AgendaResult, CorrelationId, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryCheckpointLog {
    streams: RwLock<BTreeMap<CorrelationId, Vec<CheckpointEntry>>>,
}

fn poisoned<T>(_: T) -> AgendaError {
    AgendaError::Storage(StorageError::LockPoisoned)
}

impl InMemoryCheckpointLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage names recorded for `correlation_id`, in order.
    pub fn stages(&self, correlation_id: &CorrelationId) -> Vec<String> {
        self.streams
            .read()
            .map(|s| {
                s.get(correlation_id)
                    .map(|entries| entries.iter().map(|e| e.stage.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointLog for InMemoryCheckpointLog {
    async fn append_entry(
        &self,
        correlation_id: &CorrelationId,
        entry: CheckpointEntry,
    ) -> AgendaResult<()> {
        self.streams
            .write()
            .map_err(poisoned)?
            .entry(correlation_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn replay(&self, correlation_id: &CorrelationId) -> AgendaResult<Vec<CheckpointEntry>> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams.get(correlation_id).cloned().unwrap_or_default())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> AgendaResult<usize> {
        let mut streams = self.streams.write().map_err(poisoned)?;
        let before = streams.len();
        streams.retain(|_, entries| {
            entries
                .iter()
                .map(|e| e.timestamp)
                .max()
                .is_some_and(|newest| newest >= cutoff)
        });
        Ok(before - streams.len())
    }

    async fn list(&self) -> AgendaResult<Vec<CorrelationId>> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams.keys().cloned().collect())
    }
}
