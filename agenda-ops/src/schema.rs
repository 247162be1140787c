//! Tool schemas
//!
//! One JSON Schema (draft 2020-12) and one worked example per operation tag.
//! Schemas describe the wire shape a model must produce; the validator
//! remains the authority on semantics (anchors, known ids, time ranges).

use agenda_core::{EntityKind, OpAction, OperationTag};
use serde_json::{json, Value};

const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
const TIME_PATTERN: &str = r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$";

fn id_schema() -> Value {
    json!({"type": "integer", "minimum": 1})
}

fn date_schema() -> Value {
    json!({"type": "string", "pattern": DATE_PATTERN})
}

fn time_schema() -> Value {
    json!({"type": "string", "pattern": TIME_PATTERN})
}

fn recurrence_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": {"enum": ["none", "daily", "weekdays", "weekly", "every_n_days"]},
            "intervalDays": {"type": "integer", "minimum": 1},
            "until": {"anyOf": [date_schema(), {"type": "null"}]}
        },
        "required": ["type"]
    })
}

/// Item fields meaningful for `kind`.
fn item_properties(kind: EntityKind) -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "title".into(),
        json!({"type": "string", "minLength": 1, "maxLength": 255}),
    );
    props.insert("notes".into(), json!({"type": "string"}));
    props.insert("scheduledFor".into(), date_schema());
    props.insert(
        "context".into(),
        json!({"enum": ["school", "personal", "work"]}),
    );
    props.insert("recurrence".into(), recurrence_schema());
    if kind == EntityKind::Event {
        props.insert("startTime".into(), time_schema());
        props.insert("endTime".into(), time_schema());
        props.insert("location".into(), json!({"type": "string"}));
    } else {
        props.insert("timeOfDay".into(), time_schema());
    }
    props
}

fn goal_properties() -> serde_json::Map<String, Value> {
    let progress = json!({"type": "number", "minimum": 0});
    let mut props = serde_json::Map::new();
    props.insert(
        "title".into(),
        json!({"type": "string", "minLength": 1, "maxLength": 255}),
    );
    props.insert("notes".into(), json!({"type": "string"}));
    props.insert("currentProgress".into(), progress.clone());
    props.insert("targetProgress".into(), progress);
    props.insert("progressUnit".into(), json!({"type": "string"}));
    props
}

/// JSON Schema for one operation tag.
pub fn schema_for(tag: OperationTag) -> Value {
    let kind = tag.kind();
    let action = tag.action();
    let mut props = if kind == EntityKind::Goal {
        goal_properties()
    } else {
        item_properties(kind)
    };
    props.insert("kind".into(), json!({"const": kind.as_str()}));
    props.insert("action".into(), json!({"const": action.as_str()}));

    let mut required = vec!["kind", "action"];
    if action.requires_id() {
        props.insert("id".into(), id_schema());
        required.push("id");
    }
    match (kind, action) {
        (EntityKind::Goal, OpAction::Create) => required.push("title"),
        (EntityKind::Goal, OpAction::SetStatus) => {
            props.insert(
                "status".into(),
                json!({"enum": ["active", "completed", "archived"]}),
            );
            required.push("status");
        }
        (_, OpAction::Create) => required.extend(["title", "recurrence"]),
        (_, OpAction::Update) if kind != EntityKind::Goal => required.push("recurrence"),
        (_, OpAction::SetStatus) => {
            props.insert(
                "status".into(),
                json!({"enum": ["pending", "completed", "skipped"]}),
            );
            props.insert("occurrenceDate".into(), date_schema());
            required.push("status");
        }
        (_, OpAction::CompleteOccurrence) => {
            props.insert("occurrenceDate".into(), date_schema());
            props.insert("completed".into(), json!({"type": "boolean"}));
            required.push("occurrenceDate");
        }
        _ => {}
    }
    if action == OpAction::Delete {
        // Deletes carry only the id.
        props.retain(|k, _| matches!(k.as_str(), "kind" | "action" | "id"));
    }

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": tag.as_str(),
        "type": "object",
        "properties": Value::Object(props),
        "required": required,
    })
}

/// Worked example for one operation tag; always valid against `schema_for`.
pub fn example_for(tag: OperationTag) -> Value {
    use OperationTag::*;
    match tag {
        TaskCreate => json!({
            "kind": "task", "action": "create", "title": "Buy groceries",
            "scheduledFor": "2025-09-20", "timeOfDay": "18:00", "context": "personal",
            "recurrence": {"type": "none"}
        }),
        TaskUpdate => json!({
            "kind": "task", "action": "update", "id": 12, "scheduledFor": "2025-09-22",
            "recurrence": {"type": "none"}
        }),
        TaskDelete => json!({"kind": "task", "action": "delete", "id": 12}),
        TaskSetStatus => json!({
            "kind": "task", "action": "set_status", "id": 12, "status": "completed"
        }),
        TaskCompleteOccurrence => json!({
            "kind": "task", "action": "complete_occurrence", "id": 14,
            "occurrenceDate": "2025-09-18", "completed": true
        }),
        EventCreate => json!({
            "kind": "event", "action": "create", "title": "Team standup",
            "scheduledFor": "2025-09-15", "startTime": "09:30", "endTime": "09:45",
            "location": "Room 4", "context": "work",
            "recurrence": {"type": "weekdays"}
        }),
        EventUpdate => json!({
            "kind": "event", "action": "update", "id": 21, "startTime": "10:00",
            "endTime": "11:00", "recurrence": {"type": "none"}
        }),
        EventDelete => json!({"kind": "event", "action": "delete", "id": 21}),
        EventCompleteOccurrence => json!({
            "kind": "event", "action": "complete_occurrence", "id": 22,
            "occurrenceDate": "2025-09-17"
        }),
        HabitCreate => json!({
            "kind": "habit", "action": "create", "title": "Read 20 pages",
            "scheduledFor": "2025-09-15", "timeOfDay": "21:00",
            "recurrence": {"type": "daily"}
        }),
        HabitUpdate => json!({
            "kind": "habit", "action": "update", "id": 31, "scheduledFor": "2025-09-15",
            "recurrence": {"type": "every_n_days", "intervalDays": 2}
        }),
        HabitDelete => json!({"kind": "habit", "action": "delete", "id": 31}),
        HabitCompleteOccurrence => json!({
            "kind": "habit", "action": "complete_occurrence", "id": 31,
            "occurrenceDate": "2025-09-17", "completed": true
        }),
        GoalCreate => json!({
            "kind": "goal", "action": "create", "title": "Run a half marathon",
            "targetProgress": 21.1, "progressUnit": "km"
        }),
        GoalUpdate => json!({
            "kind": "goal", "action": "update", "id": 41, "currentProgress": 8
        }),
        GoalDelete => json!({"kind": "goal", "action": "delete", "id": 41}),
        GoalSetStatus => json!({
            "kind": "goal", "action": "set_status", "id": 41, "status": "completed"
        }),
    }
}

/// Check `input` against the schema for `tag`, returning every message.
pub fn check_against_schema(tag: OperationTag, input: &Value) -> Result<(), Vec<String>> {
    let schema = schema_for(tag);
    let compiled = jsonschema::draft202012::new(&schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;
    if compiled.is_valid(input) {
        return Ok(());
    }
    Err(compiled.iter_errors(input).map(|e| e.to_string()).collect())
}
