//! Model-call quality metrics.
//!
//! An explicit metrics sink injected into the pipeline. Thread-safe via
//! atomics for counters and `RwLock` for the keyed tallies.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Response times kept for the rolling average.
const RESPONSE_WINDOW: usize = 100;
/// Error codes listed in a report.
const TOP_ERRORS: usize = 5;

#[derive(Debug, Default)]
struct ConfidenceTally {
    sum: f64,
    count: u64,
}

/// Counts requests, model-call outcomes, router confidence, error codes
/// and per-model usage.
#[derive(Debug, Default)]
pub struct QualityMonitor {
    total_requests: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    confidence: RwLock<ConfidenceTally>,
    error_codes: RwLock<HashMap<String, u64>>,
    model_usage: RwLock<HashMap<String, u64>>,
    response_times: RwLock<VecDeque<Duration>>,
}

/// One error code with its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error: String,
    pub count: u64,
}

/// Serializable snapshot of a `QualityMonitor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub total_requests: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Percentage of model calls that succeeded, 0 when none were made
    pub success_rate: f64,
    pub average_confidence: f64,
    pub average_response_ms: u64,
    pub model_usage: BTreeMap<String, u64>,
    /// Most frequent codes first, at most five
    pub common_errors: Vec<ErrorCount>,
}

impl QualityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// One user request entered the pipeline.
    pub fn record_request(&self, correlation_id: &str) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(correlation_id, "Quality: request recorded");
    }

    /// One model call finished.
    pub fn record_model_call(&self, model: &str, ok: bool, elapsed: Duration) {
        if ok {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut usage) = self.model_usage.write() {
            *usage.entry(model.to_string()).or_insert(0) += 1;
        }
        if let Ok(mut times) = self.response_times.write() {
            times.push_back(elapsed);
            while times.len() > RESPONSE_WINDOW {
                times.pop_front();
            }
        }
    }

    /// Router confidence for one request.
    pub fn record_confidence(&self, confidence: f64) {
        if !confidence.is_finite() {
            return;
        }
        if let Ok(mut tally) = self.confidence.write() {
            tally.sum += confidence.clamp(0.0, 1.0);
            tally.count += 1;
        }
    }

    /// Validation codes left over after a request.
    pub fn record_errors<I, S>(&self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Ok(mut errors) = self.error_codes.write() {
            for code in codes {
                *errors.entry(code.as_ref().to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn snapshot(&self) -> QualityReport {
        let successful_calls = self.successful_calls.load(Ordering::Relaxed);
        let failed_calls = self.failed_calls.load(Ordering::Relaxed);
        let calls = successful_calls + failed_calls;

        let average_confidence = self
            .confidence
            .read()
            .map(|t| if t.count > 0 { t.sum / t.count as f64 } else { 0.0 })
            .unwrap_or(0.0);

        let average_response_ms = self
            .response_times
            .read()
            .map(|times| {
                if times.is_empty() {
                    0
                } else {
                    let total: u128 = times.iter().map(|d| d.as_millis()).sum();
                    (total / times.len() as u128) as u64
                }
            })
            .unwrap_or(0);

        let model_usage = self
            .model_usage
            .read()
            .map(|u| u.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();

        let mut common_errors: Vec<ErrorCount> = self
            .error_codes
            .read()
            .map(|e| {
                e.iter()
                    .map(|(error, count)| ErrorCount {
                        error: error.clone(),
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default();
        common_errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error.cmp(&b.error)));
        common_errors.truncate(TOP_ERRORS);

        QualityReport {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_calls,
            failed_calls,
            success_rate: if calls > 0 {
                successful_calls as f64 * 100.0 / calls as f64
            } else {
                0.0
            },
            average_confidence,
            average_response_ms,
            model_usage,
            common_errors,
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_calls.store(0, Ordering::Relaxed);
        self.failed_calls.store(0, Ordering::Relaxed);
        if let Ok(mut tally) = self.confidence.write() {
            *tally = ConfidenceTally::default();
        }
        if let Ok(mut errors) = self.error_codes.write() {
            errors.clear();
        }
        if let Ok(mut usage) = self.model_usage.write() {
            usage.clear();
        }
        if let Ok(mut times) = self.response_times.write() {
            times.clear();
        }
    }
}
