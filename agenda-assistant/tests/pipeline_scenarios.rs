//! End-to-end pipeline scenarios against a seeded mock store and a
//! scripted model.
//!
//! Every scenario runs on the fixture dataset from `agenda-test-utils`
//! (today is Wednesday 2025-09-17).

use agenda_assistant::summarizer::{APPLY_FAILED, CLARIFY_FIELDS, CLARIFY_TARGET, INVALID_SUGGESTIONS, NO_CHANGES};
use agenda_assistant::{
    note, Assistant, AssistantRequest, ClarifySelection, RepairOutcome, RouteDecision, StageObserver,
    CHAT_FALLBACK, EMPTY_INSTRUCTION_TEXT,
};
use agenda_checkpoint::{resume, stage, CheckpointLog, InMemoryCheckpointLog};
use agenda_core::{CorrelationId, ErrorCode};
use agenda_test_utils::fixtures::*;
use agenda_test_utils::{prompts, MockCompletionProvider, MockReply, MockStorage};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST SUPPORT
// ============================================================================

struct Harness {
    assistant: Assistant,
    store: Arc<MockStorage>,
    log: Arc<InMemoryCheckpointLog>,
    provider: Arc<MockCompletionProvider>,
}

fn harness(provider: Arc<MockCompletionProvider>) -> Harness {
    let store = seeded_store();
    let log = Arc::new(InMemoryCheckpointLog::new());
    let config = test_config(std::env::temp_dir().join("agenda-scenarios-unused"));
    let assistant = Assistant::new(config, store.clone(), registry(provider.clone()), clock())
        .with_checkpoints(log.clone());
    Harness {
        assistant,
        store,
        log,
        provider,
    }
}

/// Router says plan with high confidence; proposer answers `proposal`.
fn planning(proposal: MockReply) -> Arc<MockCompletionProvider> {
    let provider = scripted_provider(route_reply("plan", 0.9));
    provider.on_prompt_containing(prompts::PROPOSER, proposal);
    provider.on_prompt_containing(prompts::SUMMARY, MockReply::text("Plan ready."));
    provider
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<(String, String)>>,
}

impl StageObserver for RecordingObserver {
    fn on_stage(&self, correlation_id: &CorrelationId, stage: &str, _delta: &Value) {
        self.seen
            .lock()
            .unwrap()
            .push((correlation_id.as_str().to_string(), stage.to_string()));
    }
}

// ============================================================================
// ROUTING
// ============================================================================

#[tokio::test]
async fn test_empty_instruction_skips_models() {
    let h = harness(Arc::new(MockCompletionProvider::new()));
    let response = h.assistant.handle(AssistantRequest::new("   ")).await;

    assert_eq!(response.decision, RouteDecision::Chat);
    assert_eq!(response.text, EMPTY_INSTRUCTION_TEXT);
    assert!(response.has_flag(note::EMPTY_INSTRUCTION));
    assert!(response.operations.is_empty());
    assert_eq!(h.provider.call_count(), 0);
    assert_eq!(h.log.stages(&response.correlation_id), vec![stage::DONE.to_string()]);
}

#[tokio::test]
async fn test_low_confidence_plan_becomes_clarify() {
    let h = harness(scripted_provider(route_reply("plan", 0.3)));
    let response = h.assistant.handle(AssistantRequest::new("hmm, the thing from before")).await;

    assert_eq!(response.decision, RouteDecision::Clarify);
    assert_eq!(response.text, CLARIFY_FIELDS);
    assert!(response.operations.is_empty());
    assert_eq!(prompts_with(&h.provider, prompts::PROPOSER), 0);
    assert_eq!(
        h.log.stages(&response.correlation_id),
        vec![stage::ROUTE, stage::CLARIFY, stage::DONE]
    );
}

#[tokio::test]
async fn test_explicit_id_overrides_chat() {
    let provider = scripted_provider(route_reply("chat", 0.95));
    provider.on_prompt_containing(
        prompts::PROPOSER,
        operations_reply(vec![json!({"kind": "task", "action": "delete", "id": 2})]),
    );
    provider.on_prompt_containing(prompts::SUMMARY, MockReply::text("Deleting Laundry."));
    let h = harness(provider);
    let response = h.assistant.handle(AssistantRequest::new("drop #2 please")).await;

    assert_eq!(response.decision, RouteDecision::Plan);
    assert_eq!(response.operations.len(), 1);
    assert_eq!(response.text, "Deleting Laundry.");

    let entries = h.log.replay(&response.correlation_id).await.unwrap();
    assert_eq!(entries[0].delta["reason"], "explicit_id");
    assert_eq!(entries[0].delta["where"]["ids"], json!([2]));
}

#[tokio::test]
async fn test_clarify_selection_routes_without_model() {
    let provider = Arc::new(MockCompletionProvider::new());
    provider.on_prompt_containing(
        prompts::PROPOSER,
        operations_reply(vec![json!({
            "kind": "event", "action": "update", "id": 4,
            "title": "Dentist checkup", "recurrence": {"type": "none"}
        })]),
    );
    provider.on_prompt_containing(prompts::SUMMARY, MockReply::text("Renaming the dentist visit."));
    let h = harness(provider);

    let mut request = AssistantRequest::new("that one");
    request.clarify_selection = Some(ClarifySelection { ids: vec![4] });
    let response = h.assistant.handle(request).await;

    assert_eq!(response.decision, RouteDecision::Plan);
    assert_eq!(response.operations.len(), 1);
    assert_eq!(prompts_with(&h.provider, prompts::ROUTER), 0);
    let entries = h.log.replay(&response.correlation_id).await.unwrap();
    assert_eq!(entries[0].delta["reason"], "clarify_selection");
}

#[tokio::test]
async fn test_failing_provider_falls_back_to_chat() {
    let h = harness(Arc::new(MockCompletionProvider::failing()));
    let response = h.assistant.handle(AssistantRequest::new("hello there")).await;

    assert_eq!(response.decision, RouteDecision::Chat);
    assert_eq!(response.text, CHAT_FALLBACK);
    assert!(response.operations.is_empty());
    let entries = h.log.replay(&response.correlation_id).await.unwrap();
    assert_eq!(entries[0].delta["reason"], "router_error");
}

#[tokio::test]
async fn test_router_timeout_falls_back_to_chat() {
    let h = harness(Arc::new(MockCompletionProvider::hanging()));
    let response = h.assistant.handle(AssistantRequest::new("hello there")).await;

    assert_eq!(response.decision, RouteDecision::Chat);
    assert_eq!(response.text, CHAT_FALLBACK);
    let entries = h.log.replay(&response.correlation_id).await.unwrap();
    assert_eq!(entries[0].stage, stage::ROUTE);
    assert_eq!(entries[0].delta["reason"], "router_timeout");
}

#[tokio::test]
async fn test_chat_reply_passes_through() {
    let provider = scripted_provider(route_reply("chat", 0.9));
    provider.on_prompt_containing(prompts::CHAT, MockReply::text("  Hi! How can I help?  "));
    let h = harness(provider);
    let response = h.assistant.handle(AssistantRequest::new("hello there")).await;

    assert_eq!(response.decision, RouteDecision::Chat);
    assert_eq!(response.text, "Hi! How can I help?");
    assert!(response.steps.is_empty());
}

// ============================================================================
// PROPOSE / VALIDATE / REPAIR
// ============================================================================

#[tokio::test]
async fn test_vague_instruction_yields_no_operations() {
    let h = harness(planning(MockReply::json(json!({"operations": []}))));
    let response = h.assistant.handle(AssistantRequest::new("do something with lunch")).await;

    assert_eq!(response.decision, RouteDecision::Plan);
    assert!(response.operations.is_empty());
    assert!(response.has_flag(note::NO_OPERATIONS_PROPOSED));
    assert_eq!(response.text, NO_CHANGES);
    assert!(!response.text.is_empty());
}

#[tokio::test]
async fn test_missing_recurrence_is_repaired() {
    let provider = planning(operations_reply(vec![
        json!({"kind": "task", "action": "create", "title": "Call mom"}),
    ]));
    provider.on_prompt_containing(
        prompts::REPAIR,
        MockReply::json(json!({"operations": [create_task("Call mom")]})),
    );
    let h = harness(provider);
    let response = h.assistant.handle(AssistantRequest::new("add a task to call mom")).await;

    assert_eq!(response.operations.len(), 1);
    assert_eq!(response.operations[0].str_field("title"), Some("Call mom"));
    assert!(response.notes.errors.is_empty());
    assert!(response.notes.clarify.is_none());
    assert_eq!(
        response.notes.repair,
        Some(RepairOutcome { attempted: true, repaired: 1, dropped: 0 })
    );
    assert_eq!(prompts_with(&h.provider, prompts::REPAIR), 1);
}

#[tokio::test]
async fn test_repair_runs_at_most_once() {
    let broken = json!({"kind": "task", "action": "create", "title": "Call mom"});
    let provider = planning(operations_reply(vec![broken.clone()]));
    provider.on_prompt_containing(prompts::REPAIR, MockReply::json(json!({"operations": [broken]})));
    let h = harness(provider);
    let response = h.assistant.handle(AssistantRequest::new("add a task to call mom")).await;

    assert_eq!(prompts_with(&h.provider, prompts::REPAIR), 1);
    assert!(response.operations.is_empty());
    assert_eq!(response.notes.errors, vec![ErrorCode::MissingRecurrence]);
    assert_eq!(
        response.notes.repair,
        Some(RepairOutcome { attempted: true, repaired: 0, dropped: 1 })
    );
    assert_eq!(response.notes.clarify.as_ref().map(|c| c.question.as_str()), Some(CLARIFY_FIELDS));
    assert_eq!(response.text, INVALID_SUGGESTIONS);
    // no operations left, so the summary model is never asked
    assert_eq!(prompts_with(&h.provider, prompts::SUMMARY), 0);
}

#[tokio::test]
async fn test_unknown_id_asks_for_target() {
    let provider = planning(operations_reply(vec![
        json!({"kind": "task", "action": "delete", "id": 99}),
    ]));
    provider.on_prompt_containing(prompts::REPAIR, MockReply::json(json!({"operations": []})));
    let h = harness(provider);
    let response = h.assistant.handle(AssistantRequest::new("delete #99")).await;

    assert!(response.operations.is_empty());
    assert_eq!(response.notes.errors, vec![ErrorCode::InvalidId]);
    assert_eq!(response.notes.clarify.as_ref().map(|c| c.question.as_str()), Some(CLARIFY_TARGET));
}

#[tokio::test]
async fn test_duplicates_collapse_to_first() {
    let h = harness(planning(operations_reply(vec![
        create_task("Buy bread"),
        create_task("Buy bread"),
        create_task("Buy eggs"),
    ])));
    let response = h.assistant.handle(AssistantRequest::new("add bread and eggs")).await;

    let titles: Vec<_> = response
        .operations
        .iter()
        .filter_map(|op| op.str_field("title"))
        .collect();
    assert_eq!(titles, vec!["Buy bread", "Buy eggs"]);

    let entries = h.log.replay(&response.correlation_id).await.unwrap();
    let dedupe = entries.iter().find(|e| e.stage == stage::DEDUPE).unwrap();
    assert_eq!(dedupe.delta, json!({"before": 3, "after": 2}));
}

#[tokio::test]
async fn test_oversized_proposal_is_rejected() {
    let many: Vec<Value> = (0..25).map(|i| create_task(&format!("Task {}", i))).collect();
    let h = harness(planning(operations_reply(many)));
    let response = h.assistant.handle(AssistantRequest::new("add all of these")).await;

    assert!(response.operations.is_empty());
    assert!(response.has_flag(note::TOO_MANY_OPERATIONS));
}

// ============================================================================
// APPLY / IDEMPOTENCY
// ============================================================================

#[tokio::test]
async fn test_apply_creates_task() {
    let h = harness(planning(operations_reply(vec![create_task("Call mom")])));
    assert_eq!(h.store.task_count(), 3);
    let response = h
        .assistant
        .handle(AssistantRequest::new("add a task to call mom").applying())
        .await;

    let applied = response.applied.as_ref().expect("batch applied");
    assert!(applied.all_ok());
    assert_eq!(applied.correlation_id, response.correlation_id);
    assert_eq!(h.store.task_count(), 4);
    assert!(h.log.stages(&response.correlation_id).contains(&stage::APPLY.to_string()));
}

#[tokio::test]
async fn test_failed_apply_reports_nothing_saved() {
    let h = harness(planning(operations_reply(vec![
        create_task("Call mom"),
        create_task("Book dentist"),
    ])));
    h.store.set_fail_commit(true);
    let response = h
        .assistant
        .handle(AssistantRequest::new("add calls to mom and the dentist").applying())
        .await;

    assert!(response.applied.is_none());
    assert!(response.notes.flags.contains(&"apply_failed".to_string()));
    assert!(response.text.starts_with(APPLY_FAILED), "{}", response.text);
    assert!(response.text.ends_with("creating 2."));
    assert_eq!(h.store.task_count(), 3);
}

#[tokio::test]
async fn test_proposal_only_leaves_store_untouched() {
    let h = harness(planning(operations_reply(vec![create_task("Call mom")])));
    let response = h.assistant.handle(AssistantRequest::new("add a task to call mom")).await;

    assert_eq!(response.operations.len(), 1);
    assert!(response.applied.is_none());
    assert_eq!(h.store.task_count(), 3);
}

#[tokio::test]
async fn test_idempotent_replay_returns_cached_response() {
    let h = harness(planning(operations_reply(vec![create_task("Call mom")])));
    let request = AssistantRequest::new("add a task to call mom").with_idempotency_key("req-1");

    let first = h.assistant.handle(request.clone()).await;
    let calls = h.provider.call_count();
    let second = h.assistant.handle(request).await;

    assert_eq!(second, first);
    assert_eq!(h.provider.call_count(), calls);
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

#[tokio::test]
async fn test_plan_stages_are_checkpointed_and_observed() {
    let observer = Arc::new(RecordingObserver::default());
    let provider = planning(operations_reply(vec![create_task("Call mom")]));
    let Harness { assistant, log, .. } = harness(provider);
    let assistant = assistant.with_observer(observer.clone());

    let response = assistant.handle(AssistantRequest::new("add a task to call mom")).await;
    let expected = vec![
        stage::ROUTE,
        stage::BUILD_CONTEXT,
        stage::PROPOSE,
        stage::VALIDATE,
        stage::DEDUPE,
        stage::SUMMARIZE,
        stage::DONE,
    ];
    assert_eq!(log.stages(&response.correlation_id), expected);

    let seen = observer.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), expected.len());
    assert!(seen.iter().all(|(cid, _)| cid == response.correlation_id.as_str()));
    assert_eq!(seen.iter().map(|(_, s)| s.as_str()).collect::<Vec<_>>(), expected);
}

#[tokio::test]
async fn test_jsonl_stream_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let provider = planning(operations_reply(vec![create_task("Call mom")]));
    let assistant = Assistant::new(test_config(dir.path()), seeded_store(), registry(provider), clock());
    let response = assistant.handle(AssistantRequest::new("add a task to call mom")).await;

    // a fresh log over the same directory sees the stream
    let reopened = agenda_checkpoint::JsonlCheckpointLog::new(dir.path());
    let mut stages = Vec::new();
    let outcome = resume(&reopened, &response.correlation_id, |stage, _| stages.push(stage.to_string()))
        .await
        .unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.stages, stages.len());
    assert_eq!(stages.first().map(String::as_str), Some(stage::ROUTE));
    assert_eq!(stages.last().map(String::as_str), Some(stage::DONE));
}

#[tokio::test]
async fn test_quality_monitor_tracks_requests() {
    let h = harness(planning(operations_reply(vec![create_task("Call mom")])));
    h.assistant.handle(AssistantRequest::new("add a task to call mom")).await;
    h.assistant.handle(AssistantRequest::new("")).await;

    let snapshot = h.assistant.quality().snapshot();
    assert_eq!(snapshot.total_requests, 2);
}
