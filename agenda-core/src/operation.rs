//! Operation model
//!
//! `OperationDraft` is the loose JSON shape a model proposes. `Operation` is
//! the closed, typed union the processor executes. The validator in
//! `agenda-ops` is the only bridge from one to the other.

use crate::entities::EntityId;
use crate::recurrence::RecurrenceRule;
use crate::time::ClockTime;
use crate::{ContextTag, EntityKind, GoalStatus, ItemStatus, OpAction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// OPERATION TAG
// ============================================================================

/// One tag per supported `(kind, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    TaskCreate,
    TaskUpdate,
    TaskDelete,
    TaskSetStatus,
    TaskCompleteOccurrence,
    EventCreate,
    EventUpdate,
    EventDelete,
    EventCompleteOccurrence,
    HabitCreate,
    HabitUpdate,
    HabitDelete,
    HabitCompleteOccurrence,
    GoalCreate,
    GoalUpdate,
    GoalDelete,
    GoalSetStatus,
}

impl OperationTag {
    pub const ALL: [OperationTag; 17] = [
        OperationTag::TaskCreate,
        OperationTag::TaskUpdate,
        OperationTag::TaskDelete,
        OperationTag::TaskSetStatus,
        OperationTag::TaskCompleteOccurrence,
        OperationTag::EventCreate,
        OperationTag::EventUpdate,
        OperationTag::EventDelete,
        OperationTag::EventCompleteOccurrence,
        OperationTag::HabitCreate,
        OperationTag::HabitUpdate,
        OperationTag::HabitDelete,
        OperationTag::HabitCompleteOccurrence,
        OperationTag::GoalCreate,
        OperationTag::GoalUpdate,
        OperationTag::GoalDelete,
        OperationTag::GoalSetStatus,
    ];

    pub fn kind(&self) -> EntityKind {
        use OperationTag::*;
        match self {
            TaskCreate | TaskUpdate | TaskDelete | TaskSetStatus | TaskCompleteOccurrence => {
                EntityKind::Task
            }
            EventCreate | EventUpdate | EventDelete | EventCompleteOccurrence => EntityKind::Event,
            HabitCreate | HabitUpdate | HabitDelete | HabitCompleteOccurrence => EntityKind::Habit,
            GoalCreate | GoalUpdate | GoalDelete | GoalSetStatus => EntityKind::Goal,
        }
    }

    pub fn action(&self) -> OpAction {
        use OperationTag::*;
        match self {
            TaskCreate | EventCreate | HabitCreate | GoalCreate => OpAction::Create,
            TaskUpdate | EventUpdate | HabitUpdate | GoalUpdate => OpAction::Update,
            TaskDelete | EventDelete | HabitDelete | GoalDelete => OpAction::Delete,
            TaskSetStatus | GoalSetStatus => OpAction::SetStatus,
            TaskCompleteOccurrence | EventCompleteOccurrence | HabitCompleteOccurrence => {
                OpAction::CompleteOccurrence
            }
        }
    }

    /// Look up the tag for a pair, `None` when the pair is unsupported.
    pub fn from_parts(kind: EntityKind, action: OpAction) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.kind() == kind && tag.action() == action)
    }

    /// `"{kind}_{action}"`, e.g. `task_set_status`.
    pub fn as_str(&self) -> &'static str {
        use OperationTag::*;
        match self {
            TaskCreate => "task_create",
            TaskUpdate => "task_update",
            TaskDelete => "task_delete",
            TaskSetStatus => "task_set_status",
            TaskCompleteOccurrence => "task_complete_occurrence",
            EventCreate => "event_create",
            EventUpdate => "event_update",
            EventDelete => "event_delete",
            EventCompleteOccurrence => "event_complete_occurrence",
            HabitCreate => "habit_create",
            HabitUpdate => "habit_update",
            HabitDelete => "habit_delete",
            HabitCompleteOccurrence => "habit_complete_occurrence",
            GoalCreate => "goal_create",
            GoalUpdate => "goal_update",
            GoalDelete => "goal_delete",
            GoalSetStatus => "goal_set_status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == s)
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Optional calendar fields shared by tasks, events and habits.
///
/// Which fields are meaningful depends on the kind: `time_of_day` for tasks
/// and habits, `start_time`/`end_time`/`location` for events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextTag>,
}

/// Create payload for a task, event or habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub title: String,
    #[serde(flatten)]
    pub fields: ItemFields,
    pub recurrence: RecurrenceRule,
}

/// Update payload for a task, event or habit. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub fields: ItemFields,
    pub recurrence: RecurrenceRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: EntityId,
}

/// Task status change, optionally scoped to one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: EntityId,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_date: Option<NaiveDate>,
}

/// Mark (or unmark) one occurrence of a recurring entity as completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceMark {
    pub id: EntityId,
    pub occurrence_date: NaiveDate,
    #[serde(default = "default_true")]
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GoalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_unit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatusChange {
    pub id: EntityId,
    pub status: GoalStatus,
}

// ============================================================================
// OPERATION
// ============================================================================

/// A validated, executable unit of intent.
///
/// Operations carry no identity beyond their position in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    TaskCreate(NewItem),
    TaskUpdate(ItemPatch),
    TaskDelete(Target),
    TaskSetStatus(StatusChange),
    TaskCompleteOccurrence(OccurrenceMark),
    EventCreate(NewItem),
    EventUpdate(ItemPatch),
    EventDelete(Target),
    EventCompleteOccurrence(OccurrenceMark),
    HabitCreate(NewItem),
    HabitUpdate(ItemPatch),
    HabitDelete(Target),
    HabitCompleteOccurrence(OccurrenceMark),
    GoalCreate(NewGoal),
    GoalUpdate(GoalPatch),
    GoalDelete(Target),
    GoalSetStatus(GoalStatusChange),
}

impl Operation {
    pub fn tag(&self) -> OperationTag {
        match self {
            Operation::TaskCreate(_) => OperationTag::TaskCreate,
            Operation::TaskUpdate(_) => OperationTag::TaskUpdate,
            Operation::TaskDelete(_) => OperationTag::TaskDelete,
            Operation::TaskSetStatus(_) => OperationTag::TaskSetStatus,
            Operation::TaskCompleteOccurrence(_) => OperationTag::TaskCompleteOccurrence,
            Operation::EventCreate(_) => OperationTag::EventCreate,
            Operation::EventUpdate(_) => OperationTag::EventUpdate,
            Operation::EventDelete(_) => OperationTag::EventDelete,
            Operation::EventCompleteOccurrence(_) => OperationTag::EventCompleteOccurrence,
            Operation::HabitCreate(_) => OperationTag::HabitCreate,
            Operation::HabitUpdate(_) => OperationTag::HabitUpdate,
            Operation::HabitDelete(_) => OperationTag::HabitDelete,
            Operation::HabitCompleteOccurrence(_) => OperationTag::HabitCompleteOccurrence,
            Operation::GoalCreate(_) => OperationTag::GoalCreate,
            Operation::GoalUpdate(_) => OperationTag::GoalUpdate,
            Operation::GoalDelete(_) => OperationTag::GoalDelete,
            Operation::GoalSetStatus(_) => OperationTag::GoalSetStatus,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.tag().kind()
    }

    pub fn action(&self) -> OpAction {
        self.tag().action()
    }

    /// Target id, `None` for creates.
    pub fn id(&self) -> Option<EntityId> {
        match self {
            Operation::TaskCreate(_)
            | Operation::EventCreate(_)
            | Operation::HabitCreate(_)
            | Operation::GoalCreate(_) => None,
            Operation::TaskUpdate(p) | Operation::EventUpdate(p) | Operation::HabitUpdate(p) => {
                Some(p.id)
            }
            Operation::TaskDelete(t)
            | Operation::EventDelete(t)
            | Operation::HabitDelete(t)
            | Operation::GoalDelete(t) => Some(t.id),
            Operation::TaskSetStatus(s) => Some(s.id),
            Operation::TaskCompleteOccurrence(m)
            | Operation::EventCompleteOccurrence(m)
            | Operation::HabitCompleteOccurrence(m) => Some(m.id),
            Operation::GoalUpdate(p) => Some(p.id),
            Operation::GoalSetStatus(s) => Some(s.id),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Operation::TaskCreate(n) | Operation::EventCreate(n) | Operation::HabitCreate(n) => {
                Some(&n.title)
            }
            Operation::TaskUpdate(p) | Operation::EventUpdate(p) | Operation::HabitUpdate(p) => {
                p.title.as_deref()
            }
            Operation::GoalCreate(g) => Some(&g.title),
            Operation::GoalUpdate(g) => g.title.as_deref(),
            _ => None,
        }
    }

    fn item_fields(&self) -> Option<&ItemFields> {
        match self {
            Operation::TaskCreate(n) | Operation::EventCreate(n) | Operation::HabitCreate(n) => {
                Some(&n.fields)
            }
            Operation::TaskUpdate(p) | Operation::EventUpdate(p) | Operation::HabitUpdate(p) => {
                Some(&p.fields)
            }
            _ => None,
        }
    }

    pub fn scheduled_for(&self) -> Option<NaiveDate> {
        self.item_fields().and_then(|f| f.scheduled_for)
    }

    pub fn start_time(&self) -> Option<ClockTime> {
        self.item_fields().and_then(|f| f.start_time)
    }

    /// Status the operation sets, as its wire string.
    pub fn status_label(&self) -> Option<&'static str> {
        match self {
            Operation::TaskSetStatus(s) => Some(s.status.as_str()),
            Operation::GoalSetStatus(s) => Some(s.status.as_str()),
            Operation::TaskCompleteOccurrence(m)
            | Operation::EventCompleteOccurrence(m)
            | Operation::HabitCompleteOccurrence(m) => {
                Some(if m.completed { "completed" } else { "pending" })
            }
            _ => None,
        }
    }

    pub fn occurrence_date(&self) -> Option<NaiveDate> {
        match self {
            Operation::TaskSetStatus(s) => s.occurrence_date,
            Operation::TaskCompleteOccurrence(m)
            | Operation::EventCompleteOccurrence(m)
            | Operation::HabitCompleteOccurrence(m) => Some(m.occurrence_date),
            _ => None,
        }
    }

    /// Wire form: the payload fields plus `kind` and `action`.
    pub fn to_wire(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Value::Object(map) = &mut value {
            map.remove("op");
            map.insert("kind".to_string(), Value::from(self.kind().as_str()));
            map.insert("action".to_string(), Value::from(self.action().as_str()));
        }
        value
    }

    /// Back to a draft, e.g. to show an operation to a repair prompt.
    pub fn to_draft(&self) -> OperationDraft {
        OperationDraft::from_value(self.to_wire()).unwrap_or_default()
    }
}

// ============================================================================
// OPERATION DRAFT
// ============================================================================

/// Loosely-typed operation object as proposed by a model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationDraft(pub Map<String, Value>);

impl OperationDraft {
    /// Wrap a JSON object. Non-objects are not drafts.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Start a draft for a `(kind, action)` pair.
    pub fn new(kind: &str, action: &str) -> Self {
        Self::default().with("kind", kind).with("action", action)
    }

    /// Builder: set a field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Field value, treating explicit `null` as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Resolve the operation tag from `kind` + `action`, or a combined `op`
    /// field such as `"task_create"`.
    pub fn tag(&self) -> Option<OperationTag> {
        if let (Some(kind), Some(action)) = (self.str_field("kind"), self.str_field("action")) {
            let kind = EntityKind::from_wire(kind).ok()?;
            let action = OpAction::from_wire(action).ok()?;
            return OperationTag::from_parts(kind, action);
        }
        let combined = self.str_field("op")?.replace(['.', '-'], "_");
        let combined = combined.strip_prefix("todo_").map_or(combined.clone(), |rest| {
            format!("task_{}", rest)
        });
        OperationTag::parse(&combined)
    }

    /// Bulk-style drafts (`ids` arrays, `where` selectors, `bulk` flags or
    /// `bulk_*` actions) are never executable.
    pub fn is_bulk(&self) -> bool {
        self.get("ids").is_some_and(Value::is_array)
            || self.has("where")
            || self.get("bulk").and_then(Value::as_bool).unwrap_or(false)
            || self
                .str_field("action")
                .is_some_and(|a| a.to_lowercase().starts_with("bulk"))
    }
}

impl From<Operation> for OperationDraft {
    fn from(op: Operation) -> Self {
        op.to_draft()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_ymd;
    use serde_json::json;

    #[test]
    fn test_tag_pairs_are_unique_and_round_trip() {
        for tag in OperationTag::ALL {
            assert_eq!(OperationTag::from_parts(tag.kind(), tag.action()), Some(tag));
            assert_eq!(OperationTag::parse(tag.as_str()), Some(tag));
            assert_eq!(
                tag.as_str(),
                format!("{}_{}", tag.kind().as_str(), tag.action().as_str())
            );
        }
    }

    #[test]
    fn test_unsupported_pair_has_no_tag() {
        assert_eq!(
            OperationTag::from_parts(EntityKind::Event, OpAction::SetStatus),
            None
        );
        assert_eq!(
            OperationTag::from_parts(EntityKind::Goal, OpAction::CompleteOccurrence),
            None
        );
    }

    #[test]
    fn test_draft_tag_resolution() {
        assert_eq!(
            OperationDraft::new("todo", "set_status").tag(),
            Some(OperationTag::TaskSetStatus)
        );
        let combined = OperationDraft::default().with("op", "todo.create");
        assert_eq!(combined.tag(), Some(OperationTag::TaskCreate));
        assert_eq!(OperationDraft::new("event", "set_status").tag(), None);
        assert_eq!(OperationDraft::default().tag(), None);
    }

    #[test]
    fn test_draft_null_is_absent() {
        let draft = OperationDraft::from_value(json!({"kind": "task", "id": null})).unwrap();
        assert!(!draft.has("id"));
        assert!(draft.has("kind"));
        assert!(OperationDraft::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_bulk_detection() {
        assert!(OperationDraft::new("task", "delete").with("ids", json!([1, 2])).is_bulk());
        assert!(OperationDraft::new("task", "update")
            .with("where", json!({"overdue": true}))
            .is_bulk());
        assert!(OperationDraft::new("task", "bulk_update").is_bulk());
        assert!(!OperationDraft::new("task", "delete").with("id", 3).is_bulk());
    }

    #[test]
    fn test_to_wire_shape() {
        let op = Operation::TaskCreate(NewItem {
            title: "Buy milk".to_string(),
            fields: ItemFields {
                scheduled_for: parse_ymd("2025-09-15"),
                time_of_day: ClockTime::parse("8:00"),
                ..ItemFields::default()
            },
            recurrence: RecurrenceRule::none(),
        });
        assert_eq!(
            op.to_wire(),
            json!({
                "kind": "task",
                "action": "create",
                "title": "Buy milk",
                "scheduledFor": "2025-09-15",
                "timeOfDay": "08:00",
                "recurrence": {"type": "none"}
            })
        );
        assert_eq!(op.to_draft().tag(), Some(OperationTag::TaskCreate));
    }

    #[test]
    fn test_operation_serde_round_trip_through_tag() {
        let op = Operation::TaskSetStatus(StatusChange {
            id: 8,
            status: ItemStatus::Completed,
            occurrence_date: parse_ymd("2025-09-18"),
        });
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "task_set_status");
        assert_eq!(json["occurrenceDate"], "2025-09-18");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_accessors() {
        let op = Operation::EventCompleteOccurrence(OccurrenceMark {
            id: 4,
            occurrence_date: parse_ymd("2025-09-20").unwrap(),
            completed: true,
        });
        assert_eq!(op.id(), Some(4));
        assert_eq!(op.status_label(), Some("completed"));
        assert_eq!(op.occurrence_date(), parse_ymd("2025-09-20"));
        assert_eq!(op.title(), None);
        assert_eq!(op.kind(), EntityKind::Event);
    }
}
