//! Request orchestration.
//!
//! ```text
//! route ─┬─ chat ──────────────────────────────────────────────► done
//!        ├─ clarify ──────────────────────────────────► clarify ► done
//!        └─ plan ► build_context ► propose ► validate ► [repair] ► dedupe
//!                  ► [clarify] ► [apply] ► summarize ► done
//! ```
//!
//! Every stage is checkpointed under the request's correlation id and
//! handed to the optional [`StageObserver`]. `handle` never fails: the
//! worst case is an empty operation list with an explanatory text.

use crate::proposer::{note, ProposalInput, Proposer, EMPTY_INSTRUCTION_TEXT};
use crate::repairer::{merge_repair, RepairOutcome, Repairer};
use crate::router::{ClarifyOption, ClarifySelection, IntentRouter, RouteDecision, RouteInput, TranscriptTurn};
use crate::summarizer::{apply_failed_summary, clarify_question, Summarizer};
use agenda_checkpoint::{prune_expired, stage, CheckpointLog, JsonlCheckpointLog};
use agenda_context::{ContextBuilder, FocusedContext, Where};
use agenda_core::{AssistantConfig, Clock, CorrelationId, ErrorCode, Operation, OperationDraft};
use agenda_llm::{complete_with_timeout, unwrap_response_envelope, ProviderRegistry, QualityMonitor};
use agenda_ops::{dedupe, validate_all, OperationProcessor, ProcessResult, ValidationContext};
use agenda_storage::PlannerStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

/// Reply when the conversational model is unavailable.
pub const CHAT_FALLBACK: &str = "Sorry, I could not process that right now.";

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    pub instruction: String,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    /// Caller scope hint; a bare string means a title search
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
    /// Execute the resulting operations instead of only proposing them
    #[serde(default)]
    pub apply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarify_selection: Option<ClarifySelection>,
}

impl AssistantRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn applying(mut self) -> Self {
        self.apply = true;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyNote {
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ClarifyOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseNotes {
    /// Validation codes left after repair
    pub errors: Vec<ErrorCode>,
    pub context_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarify: Option<ClarifyNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairOutcome>,
    /// Pipeline note codes such as `no_operations_proposed`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponse {
    pub text: String,
    pub operations: Vec<OperationDraft>,
    pub steps: Vec<Step>,
    pub notes: ResponseNotes,
    pub correlation_id: CorrelationId,
    pub decision: RouteDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<ProcessResult>,
}

impl AssistantResponse {
    fn new(correlation_id: CorrelationId, decision: RouteDecision) -> Self {
        Self {
            text: String::new(),
            operations: Vec::new(),
            steps: Vec::new(),
            notes: ResponseNotes::default(),
            correlation_id,
            decision,
            applied: None,
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.notes.flags.iter().any(|f| f == flag)
    }
}

/// Receives each stage as it is checkpointed; the streaming hook.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, correlation_id: &CorrelationId, stage: &str, delta: &Value);
}

/// sha256 hex of the canonical request JSON, idempotency key excluded.
pub fn request_hash(request: &AssistantRequest) -> String {
    let mut keyless = request.clone();
    keyless.idempotency_key = None;
    let canonical = serde_json::to_value(&keyless)
        .map(|v| v.to_string())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Known ids and stored anchors of a focused context.
pub fn validation_context(context: &FocusedContext) -> ValidationContext {
    let known = context.known_ids();
    let mut ctx = ValidationContext::new().with_known_ids(known.iter().copied());
    for id in known {
        if let Some(anchor) = context.anchor_of(id) {
            ctx.add_anchor(id, anchor);
        }
    }
    ctx
}

// ============================================================================
// ASSISTANT
// ============================================================================

pub struct Assistant {
    config: AssistantConfig,
    store: Arc<dyn PlannerStore>,
    providers: Arc<ProviderRegistry>,
    context: ContextBuilder,
    quality: Arc<QualityMonitor>,
    checkpoints: Arc<dyn CheckpointLog>,
    processor: OperationProcessor,
    observer: Option<Arc<dyn StageObserver>>,
    router: IntentRouter,
    proposer: Proposer,
    repairer: Repairer,
    summarizer: Summarizer,
}

impl Assistant {
    /// Assistant with a JSONL checkpoint log under `config.checkpoint_dir`
    /// and a fresh quality monitor.
    pub fn new(
        config: AssistantConfig,
        store: Arc<dyn PlannerStore>,
        providers: Arc<ProviderRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let context = ContextBuilder::from_config(store.clone(), clock, &config);
        let quality = Arc::new(QualityMonitor::new());
        let processor = OperationProcessor::new(store.clone());
        let checkpoints: Arc<dyn CheckpointLog> =
            Arc::new(JsonlCheckpointLog::new(config.checkpoint_dir.clone()));
        let tools = processor.registry().documentation();
        Self {
            router: IntentRouter::new(providers.clone(), context.clone(), quality.clone(), &config),
            proposer: Proposer::new(providers.clone(), quality.clone(), &tools, &config),
            repairer: Repairer::new(providers.clone(), quality.clone(), &config),
            summarizer: Summarizer::new(providers.clone(), quality.clone(), &config),
            config,
            store,
            providers,
            context,
            quality,
            checkpoints,
            processor,
            observer: None,
        }
    }

    pub fn with_checkpoints(mut self, log: Arc<dyn CheckpointLog>) -> Self {
        self.checkpoints = log;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the processor, e.g. to attach a batch recorder or a reduced
    /// registry. The proposer is re-prompted with the new tool set.
    pub fn with_processor(mut self, processor: OperationProcessor) -> Self {
        self.processor = processor;
        self.rebuild();
        self
    }

    pub fn quality(&self) -> &Arc<QualityMonitor> {
        &self.quality
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointLog> {
        &self.checkpoints
    }

    fn rebuild(&mut self) {
        let tools = self.processor.registry().documentation();
        self.router = IntentRouter::new(self.providers.clone(), self.context.clone(), self.quality.clone(), &self.config);
        self.proposer = Proposer::new(self.providers.clone(), self.quality.clone(), &tools, &self.config);
        self.repairer = Repairer::new(self.providers.clone(), self.quality.clone(), &self.config);
        self.summarizer = Summarizer::new(self.providers.clone(), self.quality.clone(), &self.config);
    }

    /// Run one request end to end.
    pub async fn handle(&self, request: AssistantRequest) -> AssistantResponse {
        let correlation_id = CorrelationId::new();
        self.quality.record_request(correlation_id.as_str());
        let started = Instant::now();

        let hash = request.idempotency_key.as_ref().map(|_| request_hash(&request));
        if let (Some(key), Some(hash)) = (&request.idempotency_key, &hash) {
            if let Some(cached) = self.cached_response(key, hash).await {
                return cached;
            }
        }

        let response = self.run(&request, &correlation_id).await;

        if let (Some(key), Some(hash)) = (&request.idempotency_key, &hash) {
            match serde_json::to_value(&response) {
                Ok(value) => {
                    if let Err(e) = self.store.idempotency_save(key, hash, &value).await {
                        tracing::warn!(correlation_id = %correlation_id, error = %e, "Idempotency save failed");
                    }
                }
                Err(e) => tracing::warn!(correlation_id = %correlation_id, error = %e, "Response not serializable"),
            }
        }

        let max_age = u32::try_from(self.config.checkpoint_max_age_days.max(1)).unwrap_or(u32::MAX);
        prune_expired(self.checkpoints.as_ref(), max_age).await;

        tracing::info!(
            correlation_id = %correlation_id,
            decision = response.decision.as_str(),
            operations = response.operations.len(),
            applied = response.applied.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assistant request handled"
        );
        response
    }

    async fn cached_response(&self, key: &str, hash: &str) -> Option<AssistantResponse> {
        match self.store.idempotency_get(key, hash).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(response) => {
                    tracing::debug!(idempotency_key = key, "Idempotency cache hit");
                    Some(response)
                }
                Err(e) => {
                    tracing::warn!(idempotency_key = key, error = %e, "Cached response unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(idempotency_key = key, error = %e, "Idempotency lookup failed");
                None
            }
        }
    }

    async fn checkpoint(&self, correlation_id: &CorrelationId, stage: &str, delta: Value) {
        if let Some(observer) = &self.observer {
            observer.on_stage(correlation_id, stage, &delta);
        }
        if let Err(e) = self.checkpoints.append(correlation_id, stage, delta).await {
            tracing::warn!(correlation_id = %correlation_id, stage, error = %e, "Checkpoint append failed");
        }
    }

    async fn finish(&self, correlation_id: &CorrelationId, response: AssistantResponse) -> AssistantResponse {
        self.checkpoint(
            correlation_id,
            stage::DONE,
            json!({
                "decision": response.decision.as_str(),
                "operations": response.operations.len(),
                "errors": response.notes.errors,
            }),
        )
        .await;
        response
    }

    async fn run(&self, request: &AssistantRequest, correlation_id: &CorrelationId) -> AssistantResponse {
        let instruction = request.instruction.trim();
        if instruction.is_empty() {
            let mut response = AssistantResponse::new(correlation_id.clone(), RouteDecision::Chat);
            response.text = EMPTY_INSTRUCTION_TEXT.to_string();
            response.notes.flags.push(note::EMPTY_INSTRUCTION.to_string());
            return self.finish(correlation_id, response).await;
        }

        let route = self
            .router
            .route(&RouteInput {
                instruction: instruction.to_string(),
                transcript: request.transcript.clone(),
                hints: request.selector.as_ref().map(Where::from_value).unwrap_or_default(),
                selection: request.clarify_selection.clone(),
            })
            .await;
        self.checkpoint(
            correlation_id,
            stage::ROUTE,
            json!({
                "decision": route.decision.as_str(),
                "confidence": route.confidence,
                "reason": route.reason,
                "where": route.selector.to_value(),
                "fingerprint": route.fingerprint,
            }),
        )
        .await;

        let mut response = AssistantResponse::new(correlation_id.clone(), route.decision);
        match route.decision {
            RouteDecision::Chat => {
                response.text = self.chat(request).await;
                self.finish(correlation_id, response).await
            }
            RouteDecision::Clarify => {
                let note = ClarifyNote {
                    question: route.question.unwrap_or_default(),
                    options: route.options,
                };
                self.checkpoint(correlation_id, stage::CLARIFY, json!({"question": note.question, "options": note.options}))
                    .await;
                response.text = note.question.clone();
                response.notes.clarify = Some(note);
                self.finish(correlation_id, response).await
            }
            RouteDecision::Plan => {
                self.plan(request, &route.selector, correlation_id, &mut response).await;
                self.finish(correlation_id, response).await
            }
        }
    }

    async fn plan(
        &self,
        request: &AssistantRequest,
        selector: &Where,
        correlation_id: &CorrelationId,
        response: &mut AssistantResponse,
    ) {
        response.steps = vec![
            Step { name: "Identify targets".to_string() },
            Step { name: "Propose operations".to_string() },
        ];
        let clock = self.context.clock().clone();
        let (today, timezone) = (clock.today(), clock.zone_name().to_string());

        let context = match self.context.focused(selector).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(correlation_id = %correlation_id, error = %e, "Focused context unavailable");
                response.text = CHAT_FALLBACK.to_string();
                response.notes.flags.push("context_unavailable".to_string());
                return;
            }
        };
        response.notes.context_truncated = context.meta.context_truncated;
        self.checkpoint(
            correlation_id,
            stage::BUILD_CONTEXT,
            json!({
                "where": selector.describe(),
                "items": context.item_count(),
                "truncated": context.meta.context_truncated,
            }),
        )
        .await;

        let proposal = self
            .proposer
            .propose(ProposalInput {
                instruction: request.instruction.trim(),
                transcript: &request.transcript,
                context: &context,
                today,
                timezone: &timezone,
            })
            .await;
        self.checkpoint(
            correlation_id,
            stage::PROPOSE,
            json!({"operations": proposal.operations.len(), "notes": proposal.notes}),
        )
        .await;
        response.notes.flags.extend(proposal.notes.iter().cloned());

        let validation = validation_context(&context);
        let report = validate_all(&proposal.operations, &validation);
        let first_errors = report.error_codes();
        self.checkpoint(
            correlation_id,
            stage::VALIDATE,
            json!({
                "valid": report.verdicts.len() - report.invalid().len(),
                "invalid": report.invalid().len(),
                "errors": first_errors,
            }),
        )
        .await;

        let repaired = if report.all_valid() {
            merge_repair(&report, None)
        } else {
            let result = self.repairer.repair(&report, &validation, &context).await;
            self.checkpoint(correlation_id, stage::REPAIR, json!(result.outcome)).await;
            response.notes.repair = Some(result.outcome);
            result
        };
        self.quality.record_errors(repaired.errors.iter().map(ErrorCode::as_str));

        let before = repaired.operations.len();
        let operations: Vec<Operation> = dedupe(repaired.operations);
        self.checkpoint(
            correlation_id,
            stage::DEDUPE,
            json!({"before": before, "after": operations.len()}),
        )
        .await;
        response.notes.errors = repaired.errors;
        response.operations = operations.iter().map(Operation::to_draft).collect();

        if let Some(question) = clarify_question(&response.notes.errors) {
            self.checkpoint(correlation_id, stage::CLARIFY, json!({"question": question})).await;
            response.notes.clarify = Some(ClarifyNote {
                question: question.to_string(),
                options: Vec::new(),
            });
        }

        let mut apply_failed = false;
        if request.apply && !operations.is_empty() {
            match self
                .processor
                .process_with_context(&response.operations, &validation, correlation_id)
                .await
            {
                Ok(result) => {
                    self.checkpoint(
                        correlation_id,
                        stage::APPLY,
                        json!({"summary": result.summary, "failed": result.failures().len()}),
                    )
                    .await;
                    response.applied = Some(result);
                }
                Err(e) => {
                    tracing::warn!(correlation_id = %correlation_id, error = %e, "Batch apply failed");
                    self.checkpoint(correlation_id, stage::APPLY, json!({"error": e.to_string()})).await;
                    response.notes.flags.push("apply_failed".to_string());
                    apply_failed = true;
                }
            }
        }

        response.text = if apply_failed {
            apply_failed_summary(&operations)
        } else {
            self.summarizer
                .summarize(&operations, &response.notes.errors, today, &timezone)
                .await
        };
        self.checkpoint(
            correlation_id,
            stage::SUMMARIZE,
            json!({"text": response.text.chars().take(120).collect::<String>()}),
        )
        .await;
    }

    async fn chat(&self, request: &AssistantRequest) -> String {
        let Ok(provider) = self.providers.convo() else {
            return CHAT_FALLBACK.to_string();
        };
        let tail = &request.transcript[request.transcript.len().saturating_sub(3)..];
        let convo = tail
            .iter()
            .map(|t| format!("- {}: {}", t.role, t.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are a friendly assistant for a tasks and events app. Answer briefly in plain text.\n\
             Recent conversation:\n{}\nUser: {}\nAssistant:",
            convo,
            request.instruction.trim()
        );
        let started = Instant::now();
        let model = &self.config.convo_model;
        let result = complete_with_timeout(provider.as_ref(), &prompt, model, self.config.model_timeout).await;
        self.quality.record_model_call(model, result.is_ok(), started.elapsed());
        match result {
            Ok(raw) => {
                let text = unwrap_response_envelope(&raw).trim().to_string();
                if text.is_empty() {
                    CHAT_FALLBACK.to_string()
                } else {
                    text
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Chat model call failed");
                CHAT_FALLBACK.to_string()
            }
        }
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("config", &self.config)
            .field("providers", &self.providers)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
