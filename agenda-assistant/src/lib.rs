//! AGENDA Assistant - Instruction to Operations Pipeline
//!
//! Turns a free-text instruction into validated, deduplicated and
//! optionally applied operations:
//! - `router`: chat, plan or clarify, with deterministic overrides
//! - `proposer`: one model call, lenient parse, operation cap
//! - `repairer`: a single repair pass over invalid drafts
//! - `summarizer`: one short sentence, deterministic fallback
//! - `pipeline`: the `Assistant` that runs and checkpoints every stage
//! - `telemetry`: tracing subscriber setup

pub mod pipeline;
pub mod proposer;
pub mod repairer;
pub mod router;
pub mod summarizer;
pub mod telemetry;

pub use pipeline::{
    request_hash, validation_context, Assistant, AssistantRequest, AssistantResponse, ClarifyNote,
    ResponseNotes, StageObserver, Step, CHAT_FALLBACK,
};
pub use proposer::{note, parse_proposal, Proposal, ProposalInput, Proposer, EMPTY_INSTRUCTION_TEXT};
pub use repairer::{RepairOutcome, RepairResult, Repairer};
pub use router::{
    decide, route_fingerprint, ClarifyOption, ClarifySelection, IntentRouter, ModelRoute, RouteDecision,
    RouteInput, RouteReason, RouterOutput, TranscriptTurn,
};
pub use summarizer::{deterministic_summary, Summarizer};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
