//! AGENDA Core - Entity Types, Recurrence and Operations
//!
//! Data structures and pure functions shared by every other crate:
//! entities, the recurrence engine, the operation union, stable
//! validation codes, errors and configuration. No I/O lives here.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod operation;
pub mod recurrence;
pub mod time;

pub use config::AssistantConfig;
pub use entities::{EntityId, Event, Goal, Habit, Schedulable, Task};
pub use enums::{ContextTag, EntityKind, EnumParseError, ErrorCode, GoalStatus, ItemStatus, OpAction};
pub use error::{
    AgendaError, AgendaResult, CheckpointError, ConfigError, LlmError, StorageError,
    ValidationError,
};
pub use operation::{
    GoalPatch, GoalStatusChange, ItemFields, ItemPatch, NewGoal, NewItem, OccurrenceMark,
    Operation, OperationDraft, OperationTag, StatusChange, Target,
};
pub use recurrence::{Occurrence, RecurrenceRule, RecurrenceType};
pub use time::{Clock, ClockTime, FixedClock, SystemClock};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// CORRELATION ID
// ============================================================================

/// Opaque per-request token threading through checkpoints and audit rows.
///
/// UUIDv7, so ids sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Wrap an existing token (e.g. from a resume request).
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Safe to use as a file stem: ASCII alphanumerics, `-` and `_` only.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
