//! Single-pass repair of invalid drafts.
//!
//! Invalid drafts go back to the model once, with their error codes.
//! Replies are matched to invalid drafts by position: a reply that validates
//! takes the slot of the draft it fixes, the rest are dropped and only counted.

use agenda_context::FocusedContext;
use agenda_core::{AssistantConfig, ErrorCode, Operation, OperationDraft};
use agenda_llm::{complete_with_timeout, extract_first_json, unwrap_response_envelope, ProviderRegistry, QualityMonitor};
use agenda_ops::{validate_all, ValidationContext, ValidationReport, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters reported in response notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub attempted: bool,
    pub repaired: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairResult {
    /// Proposal order, with repaired operations in the slots they fix
    pub operations: Vec<Operation>,
    pub outcome: RepairOutcome,
    /// Codes still present after the attempt
    pub errors: Vec<ErrorCode>,
}

/// `Operation N: {draft}\nErrors: a, b` blocks, one per invalid draft.
pub fn error_details(invalid: &[&Verdict]) -> String {
    invalid
        .iter()
        .enumerate()
        .map(|(i, v)| {
            format!(
                "Operation {}: {}\nErrors: {}",
                i + 1,
                Value::Object(v.draft.0.clone()),
                v.result.joined()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Drafts from a repair reply: `{"operations": [...]}` or a bare array.
pub fn parse_repair_reply(raw: &str) -> Vec<OperationDraft> {
    let items = match extract_first_json(&unwrap_response_envelope(raw)) {
        Some(Value::Object(mut map)) => match map.remove("operations") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    items.into_iter().filter_map(OperationDraft::from_value).collect()
}

/// Merge a first-pass report with the re-validated repair drafts.
///
/// The n-th repair draft replaces the n-th invalid original. Replies beyond
/// the invalid count are ignored; originals without a reply keep their codes.
pub fn merge_repair(first: &ValidationReport, second: Option<&ValidationReport>) -> RepairResult {
    let mut replies = second.map(|r| r.verdicts.as_slice()).unwrap_or_default().iter();
    let mut operations = Vec::with_capacity(first.verdicts.len());
    let mut errors: Vec<ErrorCode> = Vec::new();
    let mut outcome = RepairOutcome::default();
    for original in &first.verdicts {
        if original.is_valid() {
            operations.extend(original.operation.clone());
            continue;
        }
        outcome.attempted = true;
        let remaining = match replies.next() {
            Some(reply) if reply.is_valid() => {
                operations.extend(reply.operation.clone());
                outcome.repaired += 1;
                continue;
            }
            Some(reply) => &reply.result.errors,
            None => &original.result.errors,
        };
        outcome.dropped += 1;
        for code in remaining {
            if !errors.contains(code) {
                errors.push(*code);
            }
        }
    }
    RepairResult { operations, outcome, errors }
}

/// Model-backed repairer. Uses the code provider.
#[derive(Clone)]
pub struct Repairer {
    providers: Arc<ProviderRegistry>,
    quality: Arc<QualityMonitor>,
    model: String,
    timeout: Duration,
    max_operations: usize,
}

impl Repairer {
    pub fn new(providers: Arc<ProviderRegistry>, quality: Arc<QualityMonitor>, config: &AssistantConfig) -> Self {
        Self {
            providers,
            quality,
            model: config.code_model.clone(),
            timeout: config.model_timeout,
            max_operations: config.max_operations,
        }
    }

    /// One attempt. A report without invalid drafts is returned as is,
    /// without calling the model.
    pub async fn repair(
        &self,
        report: &ValidationReport,
        validation: &ValidationContext,
        context: &FocusedContext,
    ) -> RepairResult {
        let invalid = report.invalid();
        if invalid.is_empty() {
            return merge_repair(report, None);
        }
        let drafts = match self.ask_model(&invalid, context).await {
            Some(drafts) => drafts,
            None => return merge_repair(report, None),
        };
        let drafts: Vec<OperationDraft> = drafts.into_iter().take(self.max_operations).collect();
        let second = validate_all(&drafts, validation);
        let result = merge_repair(report, Some(&second));
        tracing::info!(
            invalid = invalid.len(),
            repaired = result.outcome.repaired,
            dropped = result.outcome.dropped,
            "Repair attempt finished"
        );
        result
    }

    async fn ask_model(&self, invalid: &[&Verdict], context: &FocusedContext) -> Option<Vec<OperationDraft>> {
        let provider = match self.providers.code() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "No code provider for repair");
                return None;
            }
        };
        let prompt = format!(
            "Fix the invalid operations below by correcting the listed errors. \
             Output ONLY one JSON object: {{\"operations\": [...]}} with the corrected operations.\n\n\
             Errors to fix:\n{details}\n\n\
             Focused context:\n{context}\n\n\
             Rules: include recurrence on create/update ({{\"type\":\"none\"}} when not repeating); \
             a recurrence other than none needs scheduledFor; dates are YYYY-MM-DD and times HH:MM; \
             use only ids from the context.",
            details = error_details(invalid),
            context = context.to_prompt_json(),
        );
        let started = Instant::now();
        let result = complete_with_timeout(provider.as_ref(), &prompt, &self.model, self.timeout).await;
        self.quality
            .record_model_call(&self.model, result.is_ok(), started.elapsed());
        match result {
            Ok(raw) => Some(parse_repair_reply(&raw)),
            Err(e) => {
                tracing::warn!(error = %e, "Repair model call failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Repairer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repairer")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
