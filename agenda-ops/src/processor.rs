//! Operation registry and processor
//!
//! The registry maps each operation tag to its executor, schema and
//! example. The processor validates a batch, executes what survives inside
//! one store transaction, and writes an audit row per successful change.

use crate::executor::{Effect, ExecOutcome, OperationExecutor, StoreExecutor};
use crate::schema::{check_against_schema, example_for, schema_for};
use crate::validator::{validate_draft, ValidationContext};
use agenda_core::{
    AgendaResult, CorrelationId, EntityId, EntityKind, ErrorCode, OpAction, Operation,
    OperationDraft, OperationTag,
};
use agenda_storage::{run_in_transaction, AuditEntry, PlannerStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ============================================================================
// REGISTRY
// ============================================================================

/// Tool documentation for one tag, as shown to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDoc {
    pub name: String,
    pub kind: EntityKind,
    pub action: OpAction,
    pub schema: Value,
    pub example: Value,
}

#[derive(Clone)]
pub struct OperationRegistry {
    executors: BTreeMap<OperationTag, Arc<dyn OperationExecutor>>,
}

impl OperationRegistry {
    /// Empty registry. Every tag is unknown until registered.
    pub fn new() -> Self {
        Self {
            executors: BTreeMap::new(),
        }
    }

    /// All 17 tags backed by `StoreExecutor`.
    pub fn with_defaults() -> Self {
        let executor: Arc<dyn OperationExecutor> = Arc::new(StoreExecutor);
        let mut registry = Self::new();
        for tag in OperationTag::ALL {
            registry.register(tag, executor.clone());
        }
        registry
    }

    pub fn register(&mut self, tag: OperationTag, executor: Arc<dyn OperationExecutor>) {
        self.executors.insert(tag, executor);
    }

    pub fn unregister(&mut self, tag: OperationTag) -> bool {
        self.executors.remove(&tag).is_some()
    }

    pub fn is_registered(&self, tag: OperationTag) -> bool {
        self.executors.contains_key(&tag)
    }

    pub fn tags(&self) -> Vec<OperationTag> {
        self.executors.keys().copied().collect()
    }

    pub fn executor(&self, tag: OperationTag) -> Option<Arc<dyn OperationExecutor>> {
        self.executors.get(&tag).cloned()
    }

    /// Schema for a registered tag.
    pub fn schema(&self, tag: OperationTag) -> Option<Value> {
        self.is_registered(tag).then(|| schema_for(tag))
    }

    /// Documentation for every registered tag, in tag order.
    pub fn documentation(&self) -> Vec<ToolDoc> {
        self.tags()
            .into_iter()
            .map(|tag| ToolDoc {
                name: tag.as_str().to_string(),
                kind: tag.kind(),
                action: tag.action(),
                schema: schema_for(tag),
                example: example_for(tag),
            })
            .collect()
    }

    /// Check a tool call's arguments against the registered schema.
    pub fn check_tool_input(&self, tag: OperationTag, input: &Value) -> Result<(), Vec<String>> {
        if !self.is_registered(tag) {
            return Err(vec![ErrorCode::UnknownOperationType.to_string()]);
        }
        check_against_schema(tag, input)
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

// ============================================================================
// BATCH RECORDER
// ============================================================================

/// Before/after snapshot of one applied operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub correlation_id: CorrelationId,
    pub op: Value,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Receives a snapshot per applied operation, e.g. for undo.
#[async_trait]
pub trait BatchRecorder: Send + Sync {
    async fn record(&self, entry: BatchEntry) -> AgendaResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryBatchRecorder {
    entries: Mutex<Vec<BatchEntry>>,
}

impl InMemoryBatchRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<BatchEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn for_correlation(&self, correlation_id: &CorrelationId) -> Vec<BatchEntry> {
        self.entries()
            .into_iter()
            .filter(|e| &e.correlation_id == correlation_id)
            .collect()
    }
}

#[async_trait]
impl BatchRecorder for InMemoryBatchRecorder {
    async fn record(&self, entry: BatchEntry) -> AgendaResult<()> {
        self.entries
            .lock()
            .map_err(|_| agenda_core::StorageError::LockPoisoned)?
            .push(entry);
        Ok(())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome for one draft, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    pub ok: bool,
    pub op: OperationDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub outcome: Option<ExecOutcome>,
}

impl OpResult {
    fn failed(op: OperationDraft, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            op,
            error: Some(error.into()),
            outcome: None,
        }
    }

    fn applied(op: OperationDraft, outcome: ExecOutcome) -> Self {
        Self {
            ok: true,
            op,
            error: None,
            outcome: Some(outcome),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub completed: usize,
}

impl ProcessSummary {
    fn count(&mut self, effect: Effect) {
        match effect {
            Effect::Created => self.created += 1,
            Effect::Updated => self.updated += 1,
            Effect::Deleted => self.deleted += 1,
            Effect::Completed => self.completed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub results: Vec<OpResult>,
    pub summary: ProcessSummary,
    pub correlation_id: CorrelationId,
}

impl ProcessResult {
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }

    pub fn failures(&self) -> Vec<&OpResult> {
        self.results.iter().filter(|r| !r.ok).collect()
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

#[derive(Clone)]
pub struct OperationProcessor {
    store: Arc<dyn PlannerStore>,
    registry: OperationRegistry,
    recorder: Option<Arc<dyn BatchRecorder>>,
}

impl OperationProcessor {
    pub fn new(store: Arc<dyn PlannerStore>) -> Self {
        Self {
            store,
            registry: OperationRegistry::with_defaults(),
            recorder: None,
        }
    }

    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn BatchRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Validate and apply a batch. Anchors for updates come from the store.
    pub async fn process(
        &self,
        drafts: &[OperationDraft],
        correlation_id: &CorrelationId,
    ) -> AgendaResult<ProcessResult> {
        let ctx = self.context_for(drafts).await?;
        self.process_with_context(drafts, &ctx, correlation_id).await
    }

    /// Validate against `ctx` and apply. Multi-operation batches share one
    /// transaction; per-operation failures are reported, not raised.
    pub async fn process_with_context(
        &self,
        drafts: &[OperationDraft],
        ctx: &ValidationContext,
        correlation_id: &CorrelationId,
    ) -> AgendaResult<ProcessResult> {
        let results = if drafts.len() > 1 {
            run_in_transaction(self.store.as_ref(), || async {
                Ok(self.apply_all(drafts, ctx, correlation_id).await)
            })
            .await?
        } else {
            self.apply_all(drafts, ctx, correlation_id).await
        };

        let mut summary = ProcessSummary::default();
        for outcome in results.iter().filter_map(|r| r.outcome.as_ref()) {
            summary.count(outcome.effect);
        }
        tracing::info!(
            correlation_id = %correlation_id,
            operations = drafts.len(),
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            completed = summary.completed,
            failed = results.iter().filter(|r| !r.ok).count(),
            "Operation batch processed"
        );
        Ok(ProcessResult {
            results,
            summary,
            correlation_id: correlation_id.clone(),
        })
    }

    async fn apply_all(
        &self,
        drafts: &[OperationDraft],
        ctx: &ValidationContext,
        correlation_id: &CorrelationId,
    ) -> Vec<OpResult> {
        let mut results = Vec::with_capacity(drafts.len());
        for draft in drafts {
            results.push(self.apply_one(draft, ctx, correlation_id).await);
        }
        results
    }

    async fn apply_one(
        &self,
        draft: &OperationDraft,
        ctx: &ValidationContext,
        correlation_id: &CorrelationId,
    ) -> OpResult {
        let verdict = validate_draft(draft, ctx);
        let (Some(tag), Some(op)) = (verdict.tag, verdict.operation) else {
            return OpResult::failed(draft.clone(), verdict.result.joined());
        };
        let Some(executor) = self.registry.executor(tag) else {
            return OpResult::failed(draft.clone(), ErrorCode::UnknownOperationType.as_str());
        };

        match executor.execute(self.store.as_ref(), &op).await {
            Ok(outcome) => {
                self.audit(&op, &outcome, correlation_id).await;
                self.record(&op, &outcome, correlation_id).await;
                OpResult::applied(draft.clone(), outcome)
            }
            Err(e) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    op = tag.as_str(),
                    error = %e,
                    "Operation failed"
                );
                OpResult::failed(draft.clone(), e.to_string())
            }
        }
    }

    async fn audit(&self, op: &Operation, outcome: &ExecOutcome, correlation_id: &CorrelationId) {
        let entry = AuditEntry::new(op.tag().as_str(), outcome.kind, Some(outcome.id), op.to_wire())
            .with_correlation(correlation_id.clone());
        if let Err(e) = self.store.audit_append(entry).await {
            tracing::warn!(error = %e, op = op.tag().as_str(), "Audit append failed");
        }
    }

    async fn record(&self, op: &Operation, outcome: &ExecOutcome, correlation_id: &CorrelationId) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let entry = BatchEntry {
            correlation_id: correlation_id.clone(),
            op: op.to_wire(),
            before: outcome.before.clone(),
            after: outcome.entity.clone(),
        };
        if let Err(e) = recorder.record(entry).await {
            tracing::warn!(error = %e, op = op.tag().as_str(), "Batch recording failed");
        }
    }

    /// Stored anchors for updates that do not restate `scheduledFor`.
    async fn context_for(&self, drafts: &[OperationDraft]) -> AgendaResult<ValidationContext> {
        let mut ctx = ValidationContext::new();
        for draft in drafts {
            let Some(tag) = draft.tag() else { continue };
            if tag.action() != OpAction::Update || draft.has("scheduledFor") {
                continue;
            }
            let Some(id) = draft.get("id").and_then(Value::as_i64) else {
                continue;
            };
            if let Some(anchor) = self.stored_anchor(tag.kind(), id).await? {
                ctx.add_anchor(id, anchor);
            }
        }
        Ok(ctx)
    }

    async fn stored_anchor(&self, kind: EntityKind, id: EntityId) -> AgendaResult<Option<NaiveDate>> {
        Ok(match kind {
            EntityKind::Task => self.store.task_get(id).await?.and_then(|t| t.scheduled_for),
            EntityKind::Event => self.store.event_get(id).await?.and_then(|e| e.scheduled_for),
            EntityKind::Habit => self.store.habit_get(id).await?.and_then(|h| h.scheduled_for),
            EntityKind::Goal => None,
        })
    }
}

impl std::fmt::Debug for OperationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationProcessor")
            .field("registry", &self.registry)
            .field("has_recorder", &self.recorder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_core::time::parse_ymd;
    use agenda_core::{RecurrenceRule, Task};
    use agenda_storage::MockStorage;
    use serde_json::json;

    fn draft(value: Value) -> OperationDraft {
        OperationDraft::from_value(value).unwrap()
    }

    fn create(title: &str) -> OperationDraft {
        draft(json!({"kind": "task", "action": "create", "title": title, "recurrence": {"type": "none"}}))
    }

    #[tokio::test]
    async fn test_single_create_with_audit() {
        let store = Arc::new(MockStorage::new());
        let processor = OperationProcessor::new(store.clone());
        let cid = CorrelationId::from_string("req-1");

        let result = processor.process(&[create("Buy milk")], &cid).await.unwrap();
        assert!(result.all_ok());
        assert_eq!(result.summary.created, 1);
        assert_eq!(result.correlation_id, cid);
        assert_eq!(store.task_count(), 1);

        let audit = store.audit_log();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "task_create");
        assert_eq!(audit[0].correlation_id, Some(cid));
    }

    #[tokio::test]
    async fn test_invalid_ops_reported_in_order() {
        let store = Arc::new(MockStorage::new());
        let processor = OperationProcessor::new(store.clone());
        let drafts = vec![
            create("A"),
            draft(json!({"kind": "task", "action": "create", "title": "B"})),
            draft(json!({"kind": "note", "action": "create"})),
            draft(json!({"kind": "task", "action": "delete", "id": 404})),
        ];
        let result = processor.process(&drafts, &CorrelationId::new()).await.unwrap();
        let oks: Vec<bool> = result.results.iter().map(|r| r.ok).collect();
        assert_eq!(oks, vec![true, false, false, false]);
        assert_eq!(result.results[1].error.as_deref(), Some("missing_recurrence"));
        assert_eq!(result.results[2].error.as_deref(), Some("unknown_operation_type"));
        assert!(result.results[3].error.as_deref().unwrap().contains("not found"));
        assert_eq!(result.summary.total(), 1);
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_batch() {
        let store = Arc::new(MockStorage::new());
        store.set_fail_commit(true);
        let processor = OperationProcessor::new(store.clone());
        let outcome = processor
            .process(&[create("A"), create("B")], &CorrelationId::new())
            .await;
        assert!(outcome.is_err());
        assert_eq!(store.task_count(), 0);
    }

    #[tokio::test]
    async fn test_update_inherits_stored_anchor() {
        let store = Arc::new(MockStorage::new());
        let mut run = Task::new(5, "Run");
        run.scheduled_for = parse_ymd("2025-09-15");
        store.seed_task(run).unwrap();
        let processor = OperationProcessor::new(store.clone());

        let update = draft(json!({"kind": "task", "action": "update", "id": 5, "recurrence": {"type": "daily"}}));
        let result = processor.process(&[update], &CorrelationId::new()).await.unwrap();
        assert!(result.all_ok(), "{:?}", result.failures());
        assert_eq!(result.summary.updated, 1);
        let stored = store.task_get(5).await.unwrap().unwrap();
        assert_eq!(stored.recurrence, RecurrenceRule::daily());
    }

    #[tokio::test]
    async fn test_unregistered_tag_and_recorder() {
        let store = Arc::new(MockStorage::new());
        let mut registry = OperationRegistry::with_defaults();
        assert!(registry.unregister(OperationTag::TaskDelete));
        let recorder = Arc::new(InMemoryBatchRecorder::new());
        let processor = OperationProcessor::new(store.clone())
            .with_registry(registry)
            .with_recorder(recorder.clone());
        let cid = CorrelationId::new();

        let result = processor
            .process(
                &[create("A"), draft(json!({"kind": "task", "action": "delete", "id": 1}))],
                &cid,
            )
            .await
            .unwrap();
        assert_eq!(result.results[1].error.as_deref(), Some("unknown_operation_type"));
        let entries = recorder.for_correlation(&cid);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].before.is_none());
        assert_eq!(entries[0].after.as_ref().unwrap()["title"], "A");
    }

    #[test]
    fn test_registry_documentation() {
        let registry = OperationRegistry::with_defaults();
        let docs = registry.documentation();
        assert_eq!(docs.len(), OperationTag::ALL.len());
        assert!(docs.iter().any(|d| d.name == "habit_complete_occurrence"));
        assert!(registry
            .check_tool_input(OperationTag::GoalCreate, &json!({"kind": "goal", "action": "create"}))
            .is_err());
        assert!(OperationRegistry::new().schema(OperationTag::TaskCreate).is_none());
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = OpResult::applied(
            create("A"),
            ExecOutcome {
                kind: EntityKind::Task,
                id: 3,
                effect: Effect::Created,
                before: None,
                entity: Some(json!({"id": 3})),
            },
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["id"], 3);
        assert_eq!(value["effect"], "created");
        assert!(value.get("error").is_none());
    }
}
