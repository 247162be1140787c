//! Intent routing: `chat`, `plan` or `clarify`.
//!
//! The model gives a first opinion; [`decide`] then applies the confidence
//! threshold and the deterministic overrides. A model that times out or
//! fails leaves the heuristics to decide alone.

use crate::summarizer::{CLARIFY_FIELDS, CLARIFY_TARGET};
use agenda_context::{fuzzy_title_matches, ContextBuilder, ScheduledRange, TitleRef, Where};
use agenda_core::time::{add_days, week_range};
use agenda_core::{AgendaError, AssistantConfig, EntityId, LlmError};
use agenda_llm::{complete_with_timeout, extract_first_json, unwrap_response_envelope, ProviderRegistry, QualityMonitor};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

static QUESTION_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(what|how|why|where|who|which|when|can|could|should|do|does|did|is|are|am|will|would|may|might)\b")
        .expect("valid regex")
});
static ACTION_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(add|create|schedule|update|change|modify|move|reschedule|set|complete|mark|finish|delete|remove|cancel)\b")
        .expect("valid regex")
});
static EXPLICIT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(\d+)\b").expect("valid regex"));
static DATE_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(today|tomorrow|this week)\b").expect("valid regex"));

// ============================================================================
// TYPES
// ============================================================================

/// One prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub text: String,
}

impl TranscriptTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Chat,
    Plan,
    Clarify,
}

impl RouteDecision {
    /// Lenient parse of a model's decision label. `ops` and `act` mean plan.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "chat" => Some(RouteDecision::Chat),
            "clarify" => Some(RouteDecision::Clarify),
            "plan" | "ops" | "act" => Some(RouteDecision::Plan),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Chat => "chat",
            RouteDecision::Plan => "plan",
            RouteDecision::Clarify => "clarify",
        }
    }
}

/// Why the router landed where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    Model,
    RouterTimeout,
    RouterError,
    LowConfidence,
    HeuristicAction,
    ExplicitId,
    DatePhrase,
    ClarifySelection,
    SingleMatch,
}

/// A candidate offered back to the user with a clarify question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub title: String,
}

impl From<&TitleRef> for ClarifyOption {
    fn from(t: &TitleRef) -> Self {
        Self {
            id: Some(t.id),
            title: t.title.clone(),
        }
    }
}

/// The user's answer to an earlier clarify question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifySelection {
    #[serde(default)]
    pub ids: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterOutput {
    pub decision: RouteDecision,
    pub confidence: f64,
    #[serde(rename = "where")]
    pub selector: Where,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ClarifyOption>,
    pub reason: RouteReason,
    pub fingerprint: String,
}

/// Everything routing looks at besides the model.
#[derive(Debug, Clone, Default)]
pub struct RouteInput {
    pub instruction: String,
    pub transcript: Vec<TranscriptTurn>,
    /// Caller-supplied scope, used when the model offers none
    pub hints: Where,
    pub selection: Option<ClarifySelection>,
}

/// The model's routing opinion, leniently parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRoute {
    pub decision: Option<RouteDecision>,
    pub confidence: f64,
    pub selector: Where,
    pub question: Option<String>,
    pub options: Vec<ClarifyOption>,
}

impl ModelRoute {
    /// Missing confidence counts as zero.
    pub fn from_value(value: &Value) -> Self {
        let question = ["question", "clarifyQuestion"]
            .iter()
            .find_map(|k| value.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let options = value
            .get("options")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_option).collect())
            .unwrap_or_default();
        Self {
            decision: value
                .get("decision")
                .and_then(Value::as_str)
                .and_then(RouteDecision::from_label),
            confidence: value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            selector: value.get("where").map(Where::from_value).unwrap_or_default(),
            question,
            options,
        }
    }
}

fn parse_option(raw: &Value) -> Option<ClarifyOption> {
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(ClarifyOption {
            id: None,
            title: s.trim().to_string(),
        }),
        Value::Object(map) => {
            let id = map.get("id").and_then(Value::as_i64).filter(|id| *id > 0);
            let title = map
                .get("title")
                .or_else(|| map.get("label"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| id.map(|id| format!("#{}", id)))?;
            Some(ClarifyOption { id, title })
        }
        _ => None,
    }
}

// ============================================================================
// HEURISTICS
// ============================================================================

pub fn is_question_like(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    !t.is_empty() && (t.contains('?') || QUESTION_LEAD.is_match(&t))
}

pub fn is_action_like(text: &str) -> bool {
    ACTION_VERB.is_match(&text.trim().to_lowercase())
}

/// `#123` references, in order, without repeats.
pub fn explicit_ids(text: &str) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = Vec::new();
    for cap in EXPLICIT_ID.captures_iter(text) {
        if let Some(id) = cap.get(1).and_then(|m| m.as_str().parse().ok()) {
            if id > 0 && !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Scheduled range named by the first date phrase, if any.
pub fn date_phrase_range(text: &str, today: NaiveDate) -> Option<ScheduledRange> {
    let lower = text.to_lowercase();
    let phrase = DATE_PHRASE.captures(&lower)?.get(1)?.as_str().to_string();
    Some(match phrase.as_str() {
        "today" => ScheduledRange::day(today),
        "tomorrow" => ScheduledRange::day(add_days(today, 1)),
        _ => {
            let (from, to) = week_range(today);
            ScheduledRange::between(from, to)
        }
    })
}

/// sha256 over the instruction, the canonical scope and the last two turns.
pub fn route_fingerprint(instruction: &str, selector: &Where, transcript: &[TranscriptTurn]) -> String {
    let tail = &transcript[transcript.len().saturating_sub(2)..];
    let payload = json!({
        "m": instruction.trim(),
        "w": selector.to_value(),
        "t": tail,
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// DECISION
// ============================================================================

/// Combine the model's opinion (or the reason it is missing) with the
/// deterministic rules.
///
/// Order: a clarify selection wins outright; then the threshold; then the
/// heuristics force `plan` unless the model asked to clarify between
/// options; finally a single title match resolves the target.
pub fn decide(
    input: &RouteInput,
    model: Result<ModelRoute, RouteReason>,
    titles: &[TitleRef],
    today: NaiveDate,
    threshold: f64,
) -> RouterOutput {
    let instruction = input.instruction.trim();
    let fingerprint = route_fingerprint(instruction, &input.hints, &input.transcript);

    if let Some(selection) = input.selection.as_ref().filter(|s| !s.ids.is_empty()) {
        return RouterOutput {
            decision: RouteDecision::Plan,
            confidence: 1.0,
            selector: Where::ids(selection.ids.iter().copied()),
            question: None,
            options: Vec::new(),
            reason: RouteReason::ClarifySelection,
            fingerprint,
        };
    }

    let (mut decision, confidence, mut selector, mut question, mut options, mut reason) = match model {
        Ok(route) => {
            let mut decision = route.decision.unwrap_or(RouteDecision::Plan);
            let mut reason = RouteReason::Model;
            if route.confidence < threshold && decision != RouteDecision::Clarify {
                decision = RouteDecision::Clarify;
                reason = RouteReason::LowConfidence;
            }
            (decision, route.confidence, route.selector, route.question, route.options, reason)
        }
        Err(reason) => (RouteDecision::Chat, 0.0, Where::default(), None, Vec::new(), reason),
    };
    if selector.is_empty() {
        selector = input.hints.clone();
    }
    let model_answered = matches!(reason, RouteReason::Model | RouteReason::LowConfidence);

    // Deterministic overrides.
    let ids = explicit_ids(instruction);
    let range = date_phrase_range(instruction, today);
    let action = is_action_like(instruction);
    let question_only = is_question_like(instruction) && !action;
    let honored_clarify = decision == RouteDecision::Clarify && options.len() > 1;
    let forced = if !ids.is_empty() {
        Some(RouteReason::ExplicitId)
    } else if range.is_some() && !question_only {
        Some(RouteReason::DatePhrase)
    } else if action {
        Some(RouteReason::HeuristicAction)
    } else {
        None
    };
    if let Some(forced_reason) = forced {
        if !honored_clarify {
            if decision != RouteDecision::Plan || !model_answered {
                reason = forced_reason;
            }
            decision = RouteDecision::Plan;
            if !ids.is_empty() {
                selector.ids = ids;
            } else if selector.scheduled_range.is_none() {
                selector.scheduled_range = range;
            }
        }
    }

    let matches = fuzzy_title_matches(instruction, titles);
    if !honored_clarify && matches.len() == 1 {
        let target = &matches[0];
        if selector.ids.is_empty() {
            selector.ids = vec![target.id];
        }
        if decision == RouteDecision::Clarify || (!model_answered && decision == RouteDecision::Chat && !question_only) {
            decision = RouteDecision::Plan;
            reason = RouteReason::SingleMatch;
        }
    }

    if decision == RouteDecision::Clarify {
        if options.is_empty() && matches.len() > 1 {
            options = matches.iter().map(ClarifyOption::from).collect();
        }
        if question.is_none() {
            question = Some(if options.is_empty() { CLARIFY_FIELDS } else { CLARIFY_TARGET }.to_string());
        }
    } else {
        question = None;
        options.clear();
    }

    RouterOutput {
        decision,
        confidence,
        selector,
        question,
        options,
        reason,
        fingerprint,
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Model-backed router. Uses the code provider.
#[derive(Clone)]
pub struct IntentRouter {
    providers: Arc<ProviderRegistry>,
    context: ContextBuilder,
    quality: Arc<QualityMonitor>,
    model: String,
    timeout: Duration,
    threshold: f64,
}

impl IntentRouter {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        context: ContextBuilder,
        quality: Arc<QualityMonitor>,
        config: &AssistantConfig,
    ) -> Self {
        Self {
            providers,
            context,
            quality,
            model: config.code_model.clone(),
            timeout: config.router_timeout,
            threshold: config.clarify_threshold,
        }
    }

    pub async fn route(&self, input: &RouteInput) -> RouterOutput {
        let today = self.context.clock().today();
        match self.context.router().await {
            Ok(snapshot) => {
                let model = self.ask_model(input, &snapshot.to_prompt_json()).await;
                self.finish(input, model, &snapshot.titles(), today)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Router context unavailable");
                self.finish(input, Err(RouteReason::RouterError), &[], today)
            }
        }
    }

    fn finish(
        &self,
        input: &RouteInput,
        model: Result<ModelRoute, RouteReason>,
        titles: &[TitleRef],
        today: NaiveDate,
    ) -> RouterOutput {
        if let Ok(route) = &model {
            self.quality.record_confidence(route.confidence);
        }
        let out = decide(input, model, titles, today, self.threshold);
        tracing::debug!(
            decision = out.decision.as_str(),
            confidence = out.confidence,
            reason = ?out.reason,
            selector = %out.selector.describe(),
            fingerprint = %out.fingerprint,
            "Route decided"
        );
        out
    }

    async fn ask_model(&self, input: &RouteInput, snapshot: &Value) -> Result<ModelRoute, RouteReason> {
        if input.selection.as_ref().is_some_and(|s| !s.ids.is_empty()) {
            return Err(RouteReason::ClarifySelection);
        }
        let provider = self.providers.code().map_err(|_| RouteReason::RouterError)?;
        let prompt = router_prompt(input, snapshot, self.context.clock().zone_name());
        let started = Instant::now();
        let result = complete_with_timeout(provider.as_ref(), &prompt, &self.model, self.timeout).await;
        self.quality
            .record_model_call(&self.model, result.is_ok(), started.elapsed());
        match result {
            Ok(raw) => extract_first_json(&unwrap_response_envelope(&raw))
                .map(|v| ModelRoute::from_value(&v))
                .ok_or(RouteReason::RouterError),
            Err(AgendaError::Llm(LlmError::Timeout { .. })) => Err(RouteReason::RouterTimeout),
            Err(e) => {
                tracing::warn!(error = %e, "Router model call failed");
                Err(RouteReason::RouterError)
            }
        }
    }
}

impl std::fmt::Debug for IntentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentRouter")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("threshold", &self.threshold)
            .finish()
    }
}

fn router_prompt(input: &RouteInput, snapshot: &Value, timezone: &str) -> String {
    let tail = &input.transcript[input.transcript.len().saturating_sub(3)..];
    let convo = tail
        .iter()
        .map(|t| format!("- {}: {}", t.role, t.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You route messages for a tasks, events, habits and goals assistant.\n\
         Timezone: {timezone}\n\
         Items: {snapshot}\n\
         Recent conversation:\n{convo}\n\
         Message: {message}\n\n\
         Respond with ONE JSON object: {{\"decision\": \"chat\"|\"plan\"|\"clarify\", \
         \"confidence\": 0.0-1.0, \"where\": object (optional), \
         \"question\": string (clarify only), \"options\": [{{\"id\", \"title\"}}] (clarify only)}}",
        timezone = timezone,
        snapshot = snapshot,
        convo = convo,
        message = input.instruction.trim(),
    )
}
