//! One-sentence summaries of a plan, and clarify questions.

use agenda_core::time::format_ymd;
use agenda_core::{AssistantConfig, ErrorCode, OpAction, Operation};
use agenda_llm::{complete_with_timeout, unwrap_response_envelope, ProviderRegistry, QualityMonitor};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest summary returned to the user, in chars.
pub const MAX_SUMMARY_CHARS: usize = 280;

pub const NO_CHANGES: &str = "No actionable changes detected.";
pub const INVALID_SUGGESTIONS: &str = "Some suggestions were invalid. Please specify IDs or details.";
pub const CLARIFY_TARGET: &str = "Which task or event do you mean? Provide the exact title or ID.";
pub const CLARIFY_FIELDS: &str = "Could you clarify which item and fields to change?";
pub const APPLY_FAILED: &str = "Nothing was saved because applying the changes failed.";

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+").expect("valid regex"));

/// Count-based summary, e.g. `"creating 2, updating 1."`.
pub fn deterministic_summary(operations: &[Operation], invalid_count: usize) -> String {
    if operations.is_empty() {
        return if invalid_count > 0 { INVALID_SUGGESTIONS } else { NO_CHANGES }.to_string();
    }
    let (mut created, mut updated, mut deleted, mut completed) = (0, 0, 0, 0);
    for op in operations {
        match op.action() {
            OpAction::Create => created += 1,
            OpAction::Update => updated += 1,
            OpAction::Delete => deleted += 1,
            OpAction::SetStatus | OpAction::CompleteOccurrence => completed += 1,
        }
    }
    let parts: Vec<String> = [
        ("creating", created),
        ("updating", updated),
        ("deleting", deleted),
        ("completing", completed),
    ]
    .iter()
    .filter(|(_, n)| *n > 0)
    .map(|(verb, n)| format!("{} {}", verb, n))
    .collect();
    format!("{}.", parts.join(", "))
}

/// Text for a batch that was proposed but rolled back on apply.
pub fn apply_failed_summary(operations: &[Operation]) -> String {
    format!("{} Proposed: {}", APPLY_FAILED, deterministic_summary(operations, 0))
}

/// Question to ask when errors survived repair; `None` when nothing is left.
pub fn clarify_question(remaining: &[ErrorCode]) -> Option<&'static str> {
    if remaining.is_empty() {
        None
    } else if remaining.contains(&ErrorCode::InvalidId) {
        Some(CLARIFY_TARGET)
    } else {
        Some(CLARIFY_FIELDS)
    }
}

/// Strip fences and bullets, collapse whitespace, cap the length.
pub fn clean_summary(raw: &str) -> String {
    let unfenced: String = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let unlisted = LIST_MARKER.replace_all(&unfenced, "");
    let collapsed = unlisted.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_SUMMARY_CHARS).collect()
}

/// `N. action kind: title` lines for the summary prompt.
fn compact_lines(operations: &[Operation]) -> String {
    operations
        .iter()
        .enumerate()
        .map(|(i, op)| {
            let title = op
                .title()
                .map(str::to_string)
                .or_else(|| op.id().map(|id| format!("item {}", id)))
                .unwrap_or_else(|| format!("item {}", i + 1));
            format!("{}. {} {}: {}", i + 1, op.action().as_str(), op.kind().as_str(), title)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Model-backed summarizer. Uses the conversational provider.
#[derive(Clone)]
pub struct Summarizer {
    providers: Arc<ProviderRegistry>,
    quality: Arc<QualityMonitor>,
    model: String,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(providers: Arc<ProviderRegistry>, quality: Arc<QualityMonitor>, config: &AssistantConfig) -> Self {
        Self {
            providers,
            quality,
            model: config.convo_model.clone(),
            timeout: config.model_timeout,
        }
    }

    /// Model summary, or the deterministic text when there is nothing to
    /// describe or the model gives nothing usable.
    pub async fn summarize(
        &self,
        operations: &[Operation],
        remaining: &[ErrorCode],
        today: NaiveDate,
        timezone: &str,
    ) -> String {
        let fallback = deterministic_summary(operations, remaining.len());
        if operations.is_empty() {
            return fallback;
        }
        let Ok(provider) = self.providers.convo() else {
            return fallback;
        };
        let issues = if remaining.is_empty() {
            "none".to_string()
        } else {
            remaining.iter().map(ErrorCode::as_str).collect::<Vec<_>>().join("; ")
        };
        let prompt = format!(
            "Produce a very concise plain-text summary of the plan. If some operations were invalid, \
             say what is ready and what needs attention. No markdown, no lists, no JSON.\n\
             Today: {} ({})\nOps (compact):\n{}\nIssues: {}\nSummary:",
            format_ymd(today),
            timezone,
            compact_lines(operations),
            issues,
        );
        let started = Instant::now();
        let result = complete_with_timeout(provider.as_ref(), &prompt, &self.model, self.timeout).await;
        self.quality
            .record_model_call(&self.model, result.is_ok(), started.elapsed());
        match result {
            Ok(raw) => {
                let cleaned = clean_summary(&unwrap_response_envelope(&raw));
                if cleaned.is_empty() {
                    fallback
                } else {
                    cleaned
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Summary model call failed");
                fallback
            }
        }
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}
