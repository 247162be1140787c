//! AGENDA Checkpoint - Append-Only Stage Log
//!
//! Every pipeline stage writes `{timestamp, stage, delta}` to a stream keyed
//! by the request's correlation id. Streams are replayed for reconnect and
//! pruned by age.
//!
//! ```text
//! route → build_context → propose → validate → repair → dedupe → apply → summarize → done
//!   └──────────── clarify ────────────────────────────────────────────────────────────┘
//! ```

mod jsonl;
mod log;
mod memory;

pub use jsonl::JsonlCheckpointLog;
pub use log::{stage, CheckpointEntry, CheckpointLog};
pub use memory::InMemoryCheckpointLog;

use agenda_core::{AgendaResult, CorrelationId};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of replaying one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeOutcome {
    /// `false` when the correlation id has no entries
    pub ok: bool,
    pub stages: usize,
}

/// Replay a stored stream into `observer`, one call per entry.
pub async fn resume<F>(
    log: &dyn CheckpointLog,
    correlation_id: &CorrelationId,
    mut observer: F,
) -> AgendaResult<ResumeOutcome>
where
    F: FnMut(&str, &Value) + Send,
{
    let entries = log.replay(correlation_id).await?;
    for entry in &entries {
        observer(&entry.stage, &entry.delta);
    }
    tracing::debug!(correlation_id = %correlation_id, stages = entries.len(), "Checkpoint stream replayed");
    Ok(ResumeOutcome {
        ok: !entries.is_empty(),
        stages: entries.len(),
    })
}

/// Prune streams older than `max_age_days`; zero disables pruning.
/// Failures are logged, never raised.
pub async fn prune_expired(log: &dyn CheckpointLog, max_age_days: u32) -> usize {
    if max_age_days == 0 {
        return 0;
    }
    let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
    match log.prune_before(cutoff).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "Checkpoint prune failed");
            0
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_replay_preserves_append_order(picks in proptest::collection::vec(0usize..10, 1..12)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let log = InMemoryCheckpointLog::new();
                let cid = CorrelationId::new();
                for (i, pick) in picks.iter().enumerate() {
                    log.append(&cid, stage::ALL[*pick], json!({"seq": i})).await.unwrap();
                }
                let entries = log.replay(&cid).await.unwrap();
                let stages: Vec<&str> = entries.iter().map(|e| e.stage.as_str()).collect();
                let expected: Vec<&str> = picks.iter().map(|p| stage::ALL[*p]).collect();
                assert_eq!(stages, expected);
                for (i, entry) in entries.iter().enumerate() {
                    assert_eq!(entry.delta["seq"], i);
                }
            });
        }
    }
}
