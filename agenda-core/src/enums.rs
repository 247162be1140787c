//! Enum types for agenda entities and operations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY ENUMS
// ============================================================================

/// Kind of persisted entity an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A one-off or repeating task (the wire alias `todo` is accepted)
    #[serde(alias = "todo")]
    Task,
    /// A calendar event with optional start/end times
    Event,
    /// A repeating habit; recurrence is never `none`
    Habit,
    /// A long-running goal with progress tracking
    Goal,
}

impl EntityKind {
    /// Convert to the wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Event => "event",
            EntityKind::Habit => "habit",
            EntityKind::Goal => "goal",
        }
    }

    /// Parse from a wire string. Case-insensitive, accepts `todo` for tasks.
    pub fn from_wire(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "task" | "todo" => Ok(EntityKind::Task),
            "event" => Ok(EntityKind::Event),
            "habit" => Ok(EntityKind::Habit),
            "goal" => Ok(EntityKind::Goal),
            _ => Err(EnumParseError::new("entity kind", s)),
        }
    }
}

/// Action an operation performs on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpAction {
    Create,
    Update,
    Delete,
    SetStatus,
    CompleteOccurrence,
}

impl OpAction {
    /// Convert to the wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpAction::Create => "create",
            OpAction::Update => "update",
            OpAction::Delete => "delete",
            OpAction::SetStatus => "set_status",
            OpAction::CompleteOccurrence => "complete_occurrence",
        }
    }

    /// Parse from a wire string.
    pub fn from_wire(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(OpAction::Create),
            "update" => Ok(OpAction::Update),
            "delete" => Ok(OpAction::Delete),
            "set_status" | "setstatus" => Ok(OpAction::SetStatus),
            "complete_occurrence" | "completeoccurrence" => Ok(OpAction::CompleteOccurrence),
            _ => Err(EnumParseError::new("action", s)),
        }
    }

    /// Whether this action addresses an existing entity by id.
    pub fn requires_id(&self) -> bool {
        !matches!(self, OpAction::Create)
    }
}

/// Status of a task or of a single occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Completed => "completed",
            ItemStatus::Skipped => "skipped",
        }
    }

    pub fn from_wire(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "completed" => Ok(ItemStatus::Completed),
            "skipped" => Ok(ItemStatus::Skipped),
            _ => Err(EnumParseError::new("status", s)),
        }
    }

    /// Completed or skipped items are no longer actionable.
    pub fn is_done(&self) -> bool {
        !matches!(self, ItemStatus::Pending)
    }
}

/// Lifecycle status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Archived => "archived",
        }
    }

    pub fn from_wire(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(GoalStatus::Active),
            "completed" => Ok(GoalStatus::Completed),
            "archived" => Ok(GoalStatus::Archived),
            _ => Err(EnumParseError::new("goal status", s)),
        }
    }
}

/// Life-area tag attached to tasks, events and habits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextTag {
    School,
    Personal,
    Work,
}

impl ContextTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextTag::School => "school",
            ContextTag::Personal => "personal",
            ContextTag::Work => "work",
        }
    }

    pub fn from_wire(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "school" => Ok(ContextTag::School),
            "personal" => Ok(ContextTag::Personal),
            "work" => Ok(ContextTag::Work),
            _ => Err(EnumParseError::new("context", s)),
        }
    }
}

macro_rules! wire_enum_impls {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = EnumParseError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::from_wire(s)
                }
            }
        )*
    };
}

wire_enum_impls!(EntityKind, OpAction, ItemStatus, GoalStatus, ContextTag);

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub what: &'static str,
    pub value: String,
}

impl EnumParseError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.what, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ============================================================================
// VALIDATION CODES
// ============================================================================

/// Stable validation error codes.
///
/// These are data, not errors: they drive user-facing messages and the
/// repair prompt, so their string form must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingRecurrence,
    MissingAnchorForRecurrence,
    HabitRecurrenceRequired,
    InvalidId,
    InvalidTitle,
    TitleTooLong,
    InvalidNotes,
    InvalidRecurrence,
    InvalidScheduledFor,
    InvalidTimeOfDay,
    InvalidStartTime,
    InvalidEndTime,
    InvalidTimeRange,
    InvalidLocation,
    InvalidStatus,
    InvalidContext,
    InvalidOccurrenceDate,
    InvalidProgress,
    UnknownOperationType,
    BulkOperationsNotSupported,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingRecurrence => "missing_recurrence",
            ErrorCode::MissingAnchorForRecurrence => "missing_anchor_for_recurrence",
            ErrorCode::HabitRecurrenceRequired => "habit_recurrence_required",
            ErrorCode::InvalidId => "invalid_id",
            ErrorCode::InvalidTitle => "invalid_title",
            ErrorCode::TitleTooLong => "title_too_long",
            ErrorCode::InvalidNotes => "invalid_notes",
            ErrorCode::InvalidRecurrence => "invalid_recurrence",
            ErrorCode::InvalidScheduledFor => "invalid_scheduled_for",
            ErrorCode::InvalidTimeOfDay => "invalid_time_of_day",
            ErrorCode::InvalidStartTime => "invalid_start_time",
            ErrorCode::InvalidEndTime => "invalid_end_time",
            ErrorCode::InvalidTimeRange => "invalid_time_range",
            ErrorCode::InvalidLocation => "invalid_location",
            ErrorCode::InvalidStatus => "invalid_status",
            ErrorCode::InvalidContext => "invalid_context",
            ErrorCode::InvalidOccurrenceDate => "invalid_occurrence_date",
            ErrorCode::InvalidProgress => "invalid_progress",
            ErrorCode::UnknownOperationType => "unknown_operation_type",
            ErrorCode::BulkOperationsNotSupported => "bulk_operations_not_supported",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_accepts_todo_alias() {
        assert_eq!(EntityKind::from_wire("todo"), Ok(EntityKind::Task));
        assert_eq!("Event".parse::<EntityKind>(), Ok(EntityKind::Event));
        let parsed: EntityKind = serde_json::from_str("\"todo\"").unwrap();
        assert_eq!(parsed, EntityKind::Task);
        assert_eq!(serde_json::to_string(&EntityKind::Task).unwrap(), "\"task\"");
    }

    #[test]
    fn test_entity_kind_rejects_unknown() {
        let err = EntityKind::from_wire("project").unwrap_err();
        assert_eq!(err.value, "project");
        assert!(err.to_string().contains("entity kind"));
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(OpAction::SetStatus.as_str(), "set_status");
        assert_eq!(
            serde_json::to_string(&OpAction::CompleteOccurrence).unwrap(),
            "\"complete_occurrence\""
        );
        assert!(!OpAction::Create.requires_id());
        assert!(OpAction::Delete.requires_id());
    }

    #[test]
    fn test_error_code_serde_matches_as_str() {
        for code in [
            ErrorCode::MissingRecurrence,
            ErrorCode::MissingAnchorForRecurrence,
            ErrorCode::InvalidScheduledFor,
            ErrorCode::BulkOperationsNotSupported,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_status_is_done() {
        assert!(!ItemStatus::Pending.is_done());
        assert!(ItemStatus::Completed.is_done());
        assert!(ItemStatus::Skipped.is_done());
    }
}
