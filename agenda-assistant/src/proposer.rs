//! Operation proposal: one model call, lenient parse, hard cap.
//!
//! The proposer never validates. It returns whatever drafts the model
//! produced (or none), plus notes explaining an empty result.

use crate::router::TranscriptTurn;
use agenda_context::FocusedContext;
use agenda_core::time::format_ymd;
use agenda_core::{AssistantConfig, OperationDraft};
use agenda_llm::{complete_with_timeout, extract_first_json, unwrap_response_envelope, ProviderRegistry, QualityMonitor};
use agenda_ops::ToolDoc;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Note codes attached to a proposal or a response.
pub mod note {
    pub const EMPTY_INSTRUCTION: &str = "empty_instruction";
    pub const TOO_MANY_OPERATIONS: &str = "too_many_operations";
    pub const NO_OPERATIONS_PROPOSED: &str = "no_operations_proposed";
    pub const MODEL_UNAVAILABLE: &str = "model_unavailable";
    pub const UNPARSEABLE_OUTPUT: &str = "unparseable_output";
}

/// Guidance text for an empty instruction.
pub const EMPTY_INSTRUCTION_TEXT: &str = "Please share what you would like to do.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub version: String,
    pub steps: Vec<Value>,
    pub operations: Vec<OperationDraft>,
    /// Note codes from [`note`]
    pub notes: Vec<String>,
}

impl Proposal {
    fn empty(note: &str) -> Self {
        Self {
            version: "3".to_string(),
            notes: vec![note.to_string()],
            ..Default::default()
        }
    }
}

/// Parse raw model text into a proposal.
///
/// Accepts an envelope with `operations`, a bare array, or either wrapped in
/// an Ollama `{"response": ...}` body. More than `max_operations` drafts
/// rejects the whole set.
pub fn parse_proposal(raw: &str, max_operations: usize) -> Proposal {
    let Some(parsed) = extract_first_json(&unwrap_response_envelope(raw)) else {
        return Proposal::empty(note::UNPARSEABLE_OUTPUT);
    };
    let (items, version, steps) = match parsed {
        Value::Array(items) => (items, None, Vec::new()),
        Value::Object(mut map) => {
            let Some(Value::Array(items)) = map.remove("operations") else {
                return Proposal::empty(note::UNPARSEABLE_OUTPUT);
            };
            let version = map.get("version").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            let steps = match map.remove("steps") {
                Some(Value::Array(steps)) => steps,
                _ => Vec::new(),
            };
            (items, version, steps)
        }
        _ => return Proposal::empty(note::UNPARSEABLE_OUTPUT),
    };

    if items.len() > max_operations {
        tracing::warn!(proposed = items.len(), max_operations, "Proposal exceeds operation cap");
        return Proposal::empty(note::TOO_MANY_OPERATIONS);
    }
    let operations: Vec<OperationDraft> = items.into_iter().filter_map(OperationDraft::from_value).collect();
    let notes = if operations.is_empty() {
        vec![note::NO_OPERATIONS_PROPOSED.to_string()]
    } else {
        Vec::new()
    };
    Proposal {
        version: version.unwrap_or_else(|| "3".to_string()),
        steps,
        operations,
        notes,
    }
}

/// What the proposer sends along with the instruction.
#[derive(Debug, Clone, Copy)]
pub struct ProposalInput<'a> {
    pub instruction: &'a str,
    pub transcript: &'a [TranscriptTurn],
    pub context: &'a FocusedContext,
    pub today: NaiveDate,
    pub timezone: &'a str,
}

/// Model-backed proposer. Uses the code provider.
#[derive(Clone)]
pub struct Proposer {
    providers: Arc<ProviderRegistry>,
    quality: Arc<QualityMonitor>,
    examples: Value,
    model: String,
    timeout: Duration,
    max_operations: usize,
}

impl Proposer {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        quality: Arc<QualityMonitor>,
        tools: &[ToolDoc],
        config: &AssistantConfig,
    ) -> Self {
        let examples = tools
            .iter()
            .map(|doc| (doc.name.clone(), doc.example.clone()))
            .collect::<serde_json::Map<_, _>>();
        Self {
            providers,
            quality,
            examples: Value::Object(examples),
            model: config.code_model.clone(),
            timeout: config.model_timeout,
            max_operations: config.max_operations,
        }
    }

    pub async fn propose(&self, input: ProposalInput<'_>) -> Proposal {
        if input.instruction.trim().is_empty() {
            return Proposal::empty(note::EMPTY_INSTRUCTION);
        }
        let provider = match self.providers.code() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "No code provider for proposal");
                return Proposal::empty(note::MODEL_UNAVAILABLE);
            }
        };
        let prompt = self.prompt(&input);
        let started = Instant::now();
        let result = complete_with_timeout(provider.as_ref(), &prompt, &self.model, self.timeout).await;
        self.quality
            .record_model_call(&self.model, result.is_ok(), started.elapsed());
        match result {
            Ok(raw) => {
                let proposal = parse_proposal(&raw, self.max_operations);
                tracing::debug!(
                    operations = proposal.operations.len(),
                    notes = ?proposal.notes,
                    "Proposal parsed"
                );
                proposal
            }
            Err(e) => {
                tracing::warn!(error = %e, "Proposal model call failed");
                Proposal::empty(note::MODEL_UNAVAILABLE)
            }
        }
    }

    fn prompt(&self, input: &ProposalInput<'_>) -> String {
        let tail = &input.transcript[input.transcript.len().saturating_sub(3)..];
        let convo = tail
            .iter()
            .map(|t| format!("- {}: {}", t.role, t.text))
            .collect::<Vec<_>>()
            .join("\n");
        let envelope = json!({
            "version": "3",
            "steps": [{"name": "Identify targets"}, {"name": "Propose operations"}],
            "operations": [],
        });
        format!(
            "You plan data changes for a tasks, events, habits and goals app.\n\
             Output ONLY one JSON object shaped like {envelope}.\n\
             Rules: include recurrence on create/update ({{\"type\":\"none\"}} when not repeating; \
             habits never use none). A recurrence other than none needs an anchor scheduledFor. \
             No bulk operations. At most {max} operations. Use ONLY ids from the context.\n\n\
             Timezone: {tz}; Today: {today}\n\
             Task: {task}\n\
             Where: {selector}\n\
             Focused context: {context}\n\
             Transcript (last 3):\n{convo}\n\n\
             One example per operation: {examples}",
            envelope = envelope,
            max = self.max_operations,
            tz = input.timezone,
            today = format_ymd(input.today),
            task = input.instruction.trim(),
            selector = input.context.selector.to_value(),
            context = input.context.to_prompt_json(),
            convo = convo,
            examples = self.examples,
        )
    }
}

impl std::fmt::Debug for Proposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proposer")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_operations", &self.max_operations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope_in_prose() {
        let raw = "Here is the plan:\n```json\n{\"version\":\"3\",\"steps\":[{\"name\":\"x\"}],\
                   \"operations\":[{\"kind\":\"task\",\"action\":\"delete\",\"id\":3}]}\n```";
        let p = parse_proposal(raw, 20);
        assert_eq!(p.operations.len(), 1);
        assert_eq!(p.steps.len(), 1);
        assert!(p.notes.is_empty());
        assert_eq!(p.operations[0].str_field("action"), Some("delete"));
    }

    #[test]
    fn test_parse_bare_array_and_ollama_body() {
        let inner = "[{\"kind\":\"task\",\"action\":\"create\",\"title\":\"A\"}]";
        let body = json!({"model": "m", "response": inner, "done": true}).to_string();
        let p = parse_proposal(&body, 20);
        assert_eq!(p.operations.len(), 1);
        assert_eq!(p.version, "3");
    }

    #[test]
    fn test_cap_rejects_whole_set() {
        let ops: Vec<Value> = (1..=21)
            .map(|i| json!({"kind": "task", "action": "delete", "id": i}))
            .collect();
        let p = parse_proposal(&json!({"operations": ops}).to_string(), 20);
        assert!(p.operations.is_empty());
        assert_eq!(p.notes, vec![note::TOO_MANY_OPERATIONS.to_string()]);
    }

    #[test]
    fn test_garbage_and_empty_sets() {
        assert_eq!(parse_proposal("no json here", 20).notes, vec![note::UNPARSEABLE_OUTPUT.to_string()]);
        assert_eq!(parse_proposal("{\"steps\": []}", 20).notes, vec![note::UNPARSEABLE_OUTPUT.to_string()]);
        let p = parse_proposal("{\"operations\": [1, \"x\"]}", 20);
        assert!(p.operations.is_empty());
        assert_eq!(p.notes, vec![note::NO_OPERATIONS_PROPOSED.to_string()]);
    }
}
