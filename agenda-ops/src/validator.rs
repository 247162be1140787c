//! Operation validator
//!
//! The only bridge from a loose `OperationDraft` to a typed `Operation`.
//! Deterministic and side-effect free: everything it needs to know about
//! stored entities arrives through `ValidationContext`.

use agenda_core::time::parse_ymd;
use agenda_core::{
    ClockTime, ContextTag, EntityId, EntityKind, ErrorCode, GoalPatch, GoalStatus,
    GoalStatusChange, ItemFields, ItemPatch, ItemStatus, NewGoal, NewItem, OccurrenceMark,
    OpAction, Operation, OperationDraft, OperationTag, RecurrenceRule, StatusChange, Target,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Longest accepted title, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

// ============================================================================
// VALIDATION TYPES
// ============================================================================

/// Verdict for one operation: stable codes, never prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ErrorCode>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<ErrorCode>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn has(&self, code: ErrorCode) -> bool {
        self.errors.contains(&code)
    }

    /// Codes joined with `", "`, as reported by the processor.
    pub fn joined(&self) -> String {
        self.errors
            .iter()
            .map(ErrorCode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What the validator may know about stored entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// When set, ids outside this set are `invalid_id`
    known_ids: Option<BTreeSet<EntityId>>,
    /// Stored `scheduledFor` per id; updates that omit it inherit from here
    anchors: BTreeMap<EntityId, NaiveDate>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_ids(mut self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.known_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_anchor(mut self, id: EntityId, anchor: NaiveDate) -> Self {
        self.anchors.insert(id, anchor);
        self
    }

    pub fn add_anchor(&mut self, id: EntityId, anchor: NaiveDate) {
        self.anchors.insert(id, anchor);
    }

    pub fn anchor(&self, id: EntityId) -> Option<NaiveDate> {
        self.anchors.get(&id).copied()
    }

    pub fn knows(&self, id: EntityId) -> bool {
        self.known_ids.as_ref().map_or(true, |ids| ids.contains(&id))
    }
}

/// One draft with its verdict and, when valid, the typed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub draft: OperationDraft,
    pub tag: Option<OperationTag>,
    pub result: ValidationResult,
    pub operation: Option<Operation>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.result.valid
    }
}

/// Verdicts for a whole batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub verdicts: Vec<Verdict>,
}

impl ValidationReport {
    pub fn all_valid(&self) -> bool {
        self.verdicts.iter().all(Verdict::is_valid)
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.verdicts
            .iter()
            .filter_map(|v| v.operation.clone())
            .collect()
    }

    pub fn invalid(&self) -> Vec<&Verdict> {
        self.verdicts.iter().filter(|v| !v.is_valid()).collect()
    }

    /// Every code in the batch, in order of appearance, without repeats.
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        let mut out: Vec<ErrorCode> = Vec::new();
        for code in self.verdicts.iter().flat_map(|v| v.result.errors.iter()) {
            if !out.contains(code) {
                out.push(*code);
            }
        }
        out
    }
}

// ============================================================================
// FIELD CHECKS
// ============================================================================

struct Check<'a> {
    draft: &'a OperationDraft,
    errors: Vec<ErrorCode>,
}

impl<'a> Check<'a> {
    fn new(draft: &'a OperationDraft) -> Self {
        Self {
            draft,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, code: ErrorCode) {
        if !self.errors.contains(&code) {
            self.errors.push(code);
        }
    }

    /// Finite positive integer id, known to the context.
    fn id(&mut self, ctx: &ValidationContext) -> Option<EntityId> {
        let id = self.draft.get("id").and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            }),
            _ => None,
        });
        match id {
            Some(id) if id > 0 && ctx.knows(id) => Some(id),
            _ => {
                self.fail(ErrorCode::InvalidId);
                None
            }
        }
    }

    fn title(&mut self, required: bool) -> Option<String> {
        match self.draft.get("title") {
            None => {
                if required {
                    self.fail(ErrorCode::InvalidTitle);
                }
                None
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                if s.chars().count() > MAX_TITLE_CHARS {
                    self.fail(ErrorCode::TitleTooLong);
                    None
                } else {
                    Some(s.trim().to_string())
                }
            }
            Some(_) => {
                self.fail(ErrorCode::InvalidTitle);
                None
            }
        }
    }

    fn text(&mut self, key: &str, code: ErrorCode) -> Option<String> {
        match self.draft.get(key) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.fail(code);
                None
            }
        }
    }

    fn date(&mut self, key: &str, code: ErrorCode, required: bool) -> Option<NaiveDate> {
        match self.draft.get(key) {
            None => {
                if required {
                    self.fail(code);
                }
                None
            }
            Some(v) => {
                let parsed = v.as_str().and_then(parse_ymd);
                if parsed.is_none() {
                    self.fail(code);
                }
                parsed
            }
        }
    }

    fn time(&mut self, key: &str, code: ErrorCode) -> Option<ClockTime> {
        let raw = self.draft.get(key)?;
        let parsed = raw.as_str().and_then(ClockTime::parse);
        if parsed.is_none() {
            self.fail(code);
        }
        parsed
    }

    fn context(&mut self) -> Option<ContextTag> {
        let raw = self.draft.get("context")?;
        let parsed = raw.as_str().and_then(|s| ContextTag::from_wire(s).ok());
        if parsed.is_none() {
            self.fail(ErrorCode::InvalidContext);
        }
        parsed
    }

    fn recurrence(&mut self) -> Option<RecurrenceRule> {
        let Some(raw) = self.draft.get("recurrence") else {
            self.fail(ErrorCode::MissingRecurrence);
            return None;
        };
        let parsed = RecurrenceRule::from_json(raw);
        if parsed.is_none() {
            self.fail(ErrorCode::InvalidRecurrence);
        }
        parsed
    }

    fn progress(&mut self, key: &str) -> Option<f64> {
        let raw = self.draft.get(key)?;
        let parsed = raw.as_f64().filter(|f| f.is_finite() && *f >= 0.0);
        if parsed.is_none() {
            self.fail(ErrorCode::InvalidProgress);
        }
        parsed
    }

    fn item_status(&mut self) -> Option<ItemStatus> {
        let parsed = self
            .draft
            .str_field("status")
            .and_then(|s| ItemStatus::from_wire(s).ok());
        if parsed.is_none() {
            self.fail(ErrorCode::InvalidStatus);
        }
        parsed
    }

    fn goal_status(&mut self, required: bool) -> Option<GoalStatus> {
        if !required && !self.draft.has("status") {
            return None;
        }
        let parsed = self
            .draft
            .str_field("status")
            .and_then(|s| GoalStatus::from_wire(s).ok());
        if parsed.is_none() {
            self.fail(ErrorCode::InvalidStatus);
        }
        parsed
    }

    /// Calendar fields meaningful for `kind`.
    fn item_fields(&mut self, kind: EntityKind) -> ItemFields {
        let mut fields = ItemFields {
            notes: self.text("notes", ErrorCode::InvalidNotes),
            scheduled_for: self.date("scheduledFor", ErrorCode::InvalidScheduledFor, false),
            context: self.context(),
            ..ItemFields::default()
        };
        if kind == EntityKind::Event {
            fields.start_time = self.time("startTime", ErrorCode::InvalidStartTime);
            fields.end_time = self.time("endTime", ErrorCode::InvalidEndTime);
            fields.location = self.text("location", ErrorCode::InvalidLocation);
            if let (Some(start), Some(end)) = (fields.start_time, fields.end_time) {
                if end < start {
                    self.fail(ErrorCode::InvalidTimeRange);
                }
            }
        } else {
            fields.time_of_day = self.time("timeOfDay", ErrorCode::InvalidTimeOfDay);
        }
        fields
    }

    /// Recurrence plus its anchor requirement. `id` is set for updates.
    fn anchored_rule(
        &mut self,
        kind: EntityKind,
        fields: &ItemFields,
        id: Option<EntityId>,
        ctx: &ValidationContext,
    ) -> Option<RecurrenceRule> {
        let rule = self.recurrence()?;
        if kind == EntityKind::Habit && !rule.is_repeating() {
            self.fail(ErrorCode::HabitRecurrenceRequired);
            return None;
        }
        if rule.is_repeating() && !self.draft.has("scheduledFor") {
            let inherited = id.and_then(|id| ctx.anchor(id));
            if fields.scheduled_for.is_none() && inherited.is_none() {
                self.fail(ErrorCode::MissingAnchorForRecurrence);
                return None;
            }
        }
        Some(rule)
    }

    fn occurrence(&mut self, ctx: &ValidationContext) -> Option<OccurrenceMark> {
        let id = self.id(ctx);
        let occurrence_date = self.date("occurrenceDate", ErrorCode::InvalidOccurrenceDate, true);
        let completed = match self.draft.get("completed") {
            None => Some(true),
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.fail(ErrorCode::InvalidStatus);
                None
            }
        };
        Some(OccurrenceMark {
            id: id?,
            occurrence_date: occurrence_date?,
            completed: completed?,
        })
    }

    fn finish(self, draft: &OperationDraft, tag: OperationTag, op: Option<Operation>) -> Verdict {
        let result = ValidationResult::invalid(self.errors);
        Verdict {
            draft: draft.clone(),
            tag: Some(tag),
            operation: if result.valid { op } else { None },
            result,
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn rejected(draft: &OperationDraft, tag: Option<OperationTag>, code: ErrorCode) -> Verdict {
    Verdict {
        draft: draft.clone(),
        tag,
        result: ValidationResult::invalid(vec![code]),
        operation: None,
    }
}

fn validate_item(
    mut c: Check<'_>,
    draft: &OperationDraft,
    tag: OperationTag,
    ctx: &ValidationContext,
) -> Verdict {
    let kind = tag.kind();
    let op = match tag.action() {
        OpAction::Create => {
            let title = c.title(true);
            let fields = c.item_fields(kind);
            let rule = c.anchored_rule(kind, &fields, None, ctx);
            match (title, rule) {
                (Some(title), Some(recurrence)) => {
                    let new = NewItem {
                        title,
                        fields,
                        recurrence,
                    };
                    Some(match kind {
                        EntityKind::Event => Operation::EventCreate(new),
                        EntityKind::Habit => Operation::HabitCreate(new),
                        _ => Operation::TaskCreate(new),
                    })
                }
                _ => None,
            }
        }
        OpAction::Update => {
            let id = c.id(ctx);
            let title = c.title(false);
            let fields = c.item_fields(kind);
            let rule = c.anchored_rule(kind, &fields, id, ctx);
            match (id, rule) {
                (Some(id), Some(recurrence)) => {
                    let patch = ItemPatch {
                        id,
                        title,
                        fields,
                        recurrence,
                    };
                    Some(match kind {
                        EntityKind::Event => Operation::EventUpdate(patch),
                        EntityKind::Habit => Operation::HabitUpdate(patch),
                        _ => Operation::TaskUpdate(patch),
                    })
                }
                _ => None,
            }
        }
        OpAction::Delete => c.id(ctx).map(|id| match kind {
            EntityKind::Event => Operation::EventDelete(Target { id }),
            EntityKind::Habit => Operation::HabitDelete(Target { id }),
            _ => Operation::TaskDelete(Target { id }),
        }),
        OpAction::SetStatus => {
            let id = c.id(ctx);
            let status = c.item_status();
            let occurrence_date =
                c.date("occurrenceDate", ErrorCode::InvalidOccurrenceDate, false);
            match (id, status) {
                (Some(id), Some(status)) => Some(Operation::TaskSetStatus(StatusChange {
                    id,
                    status,
                    occurrence_date,
                })),
                _ => None,
            }
        }
        OpAction::CompleteOccurrence => c.occurrence(ctx).map(|mark| match kind {
            EntityKind::Event => Operation::EventCompleteOccurrence(mark),
            EntityKind::Habit => Operation::HabitCompleteOccurrence(mark),
            _ => Operation::TaskCompleteOccurrence(mark),
        }),
    };
    c.finish(draft, tag, op)
}

fn validate_goal(
    mut c: Check<'_>,
    draft: &OperationDraft,
    tag: OperationTag,
    ctx: &ValidationContext,
) -> Verdict {
    let op = match tag {
        OperationTag::GoalCreate => {
            let title = c.title(true);
            let notes = c.text("notes", ErrorCode::InvalidNotes);
            let status = c.goal_status(false);
            let current_progress = c.progress("currentProgress");
            let target_progress = c.progress("targetProgress");
            let progress_unit = c.text("progressUnit", ErrorCode::InvalidProgress);
            title.map(|title| {
                Operation::GoalCreate(NewGoal {
                    title,
                    notes,
                    status,
                    current_progress,
                    target_progress,
                    progress_unit,
                })
            })
        }
        OperationTag::GoalUpdate => {
            let id = c.id(ctx);
            let title = c.title(false);
            let notes = c.text("notes", ErrorCode::InvalidNotes);
            let current_progress = c.progress("currentProgress");
            let target_progress = c.progress("targetProgress");
            let progress_unit = c.text("progressUnit", ErrorCode::InvalidProgress);
            id.map(|id| {
                Operation::GoalUpdate(GoalPatch {
                    id,
                    title,
                    notes,
                    current_progress,
                    target_progress,
                    progress_unit,
                })
            })
        }
        OperationTag::GoalDelete => c.id(ctx).map(|id| Operation::GoalDelete(Target { id })),
        _ => {
            let id = c.id(ctx);
            let status = c.goal_status(true);
            match (id, status) {
                (Some(id), Some(status)) => {
                    Some(Operation::GoalSetStatus(GoalStatusChange { id, status }))
                }
                _ => None,
            }
        }
    };
    c.finish(draft, tag, op)
}

/// Validate one draft.
pub fn validate_draft(draft: &OperationDraft, ctx: &ValidationContext) -> Verdict {
    if draft.is_bulk() {
        return rejected(draft, draft.tag(), ErrorCode::BulkOperationsNotSupported);
    }
    let Some(tag) = draft.tag() else {
        return rejected(draft, None, ErrorCode::UnknownOperationType);
    };
    let check = Check::new(draft);
    if tag.kind() == EntityKind::Goal {
        validate_goal(check, draft, tag, ctx)
    } else {
        validate_item(check, draft, tag, ctx)
    }
}

/// Validate a batch, preserving order.
pub fn validate_all(drafts: &[OperationDraft], ctx: &ValidationContext) -> ValidationReport {
    ValidationReport {
        verdicts: drafts.iter().map(|d| validate_draft(d, ctx)).collect(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(value: Value) -> OperationDraft {
        OperationDraft::from_value(value).unwrap()
    }

    fn codes(value: Value) -> Vec<ErrorCode> {
        validate_draft(&draft(value), &ValidationContext::new()).result.errors
    }

    #[test]
    fn test_create_without_recurrence_is_missing_recurrence() {
        assert_eq!(
            codes(json!({"kind": "task", "action": "create", "title": "X"})),
            vec![ErrorCode::MissingRecurrence]
        );
    }

    #[test]
    fn test_create_with_none_recurrence_is_valid() {
        let verdict = validate_draft(
            &draft(json!({"kind": "todo", "action": "create", "title": " X ", "recurrence": {"type": "none"}})),
            &ValidationContext::new(),
        );
        assert!(verdict.is_valid());
        match verdict.operation {
            Some(Operation::TaskCreate(new)) => assert_eq!(new.title, "X"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_repeating_without_anchor() {
        assert_eq!(
            codes(json!({"kind": "task", "action": "create", "title": "Run", "recurrence": {"type": "daily"}})),
            vec![ErrorCode::MissingAnchorForRecurrence]
        );
        assert!(codes(json!({
            "kind": "task", "action": "create", "title": "Run",
            "scheduledFor": "2025-09-15", "recurrence": {"type": "daily"}
        }))
        .is_empty());
    }

    #[test]
    fn test_update_inherits_anchor_from_context() {
        let d = draft(json!({"kind": "task", "action": "update", "id": 4, "recurrence": {"type": "weekly"}}));
        let bare = validate_draft(&d, &ValidationContext::new());
        assert_eq!(bare.result.errors, vec![ErrorCode::MissingAnchorForRecurrence]);

        let ctx = ValidationContext::new().with_anchor(4, parse_ymd("2025-09-15").unwrap());
        assert!(validate_draft(&d, &ctx).is_valid());
    }

    #[test]
    fn test_habit_recurrence_never_none() {
        assert_eq!(
            codes(json!({"kind": "habit", "action": "create", "title": "Read", "recurrence": {"type": "none"}})),
            vec![ErrorCode::HabitRecurrenceRequired]
        );
    }

    #[test]
    fn test_id_rules() {
        assert_eq!(
            codes(json!({"kind": "task", "action": "delete"})),
            vec![ErrorCode::InvalidId]
        );
        assert_eq!(
            codes(json!({"kind": "task", "action": "delete", "id": -3})),
            vec![ErrorCode::InvalidId]
        );
        assert_eq!(
            codes(json!({"kind": "task", "action": "delete", "id": "7"})),
            vec![ErrorCode::InvalidId]
        );
        assert!(codes(json!({"kind": "task", "action": "delete", "id": 7.0})).is_empty());

        let ctx = ValidationContext::new().with_known_ids([1, 2]);
        let verdict = validate_draft(&draft(json!({"kind": "event", "action": "delete", "id": 9})), &ctx);
        assert_eq!(verdict.result.errors, vec![ErrorCode::InvalidId]);
    }

    #[test]
    fn test_complete_occurrence_requires_date() {
        assert_eq!(
            codes(json!({"kind": "habit", "action": "complete_occurrence", "id": 3})),
            vec![ErrorCode::InvalidOccurrenceDate]
        );
        assert_eq!(
            codes(json!({"kind": "habit", "action": "complete_occurrence", "id": 3, "occurrenceDate": "2025-02-30"})),
            vec![ErrorCode::InvalidOccurrenceDate]
        );
        let verdict = validate_draft(
            &draft(json!({"kind": "event", "action": "complete_occurrence", "id": 3, "occurrenceDate": "2025-09-16", "completed": false})),
            &ValidationContext::new(),
        );
        assert_eq!(
            verdict.operation,
            Some(Operation::EventCompleteOccurrence(OccurrenceMark {
                id: 3,
                occurrence_date: parse_ymd("2025-09-16").unwrap(),
                completed: false,
            }))
        );
    }

    #[test]
    fn test_event_time_checks() {
        let base = json!({"kind": "event", "action": "create", "title": "Lunch", "recurrence": {"type": "none"}});
        let with = |extra: Value| {
            let mut v = base.clone();
            for (k, val) in extra.as_object().unwrap() {
                v[k] = val.clone();
            }
            codes(v)
        };
        assert_eq!(with(json!({"startTime": "25:00"})), vec![ErrorCode::InvalidStartTime]);
        assert_eq!(with(json!({"endTime": "noon"})), vec![ErrorCode::InvalidEndTime]);
        assert_eq!(
            with(json!({"startTime": "13:00", "endTime": "12:00"})),
            vec![ErrorCode::InvalidTimeRange]
        );
        assert!(with(json!({"startTime": "12:00", "endTime": "12:00"})).is_empty());
        assert_eq!(with(json!({"scheduledFor": "09/15/2025"})), vec![ErrorCode::InvalidScheduledFor]);
        assert_eq!(with(json!({"location": 5})), vec![ErrorCode::InvalidLocation]);
    }

    #[test]
    fn test_title_rules() {
        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        assert_eq!(
            codes(json!({"kind": "task", "action": "create", "title": long, "recurrence": {"type": "none"}})),
            vec![ErrorCode::TitleTooLong]
        );
        assert_eq!(
            codes(json!({"kind": "task", "action": "create", "title": "  ", "recurrence": {"type": "none"}})),
            vec![ErrorCode::InvalidTitle]
        );
    }

    #[test]
    fn test_set_status_and_context() {
        assert_eq!(
            codes(json!({"kind": "task", "action": "set_status", "id": 2, "status": "done"})),
            vec![ErrorCode::InvalidStatus]
        );
        assert_eq!(
            codes(json!({"kind": "task", "action": "create", "title": "A", "context": "gym", "recurrence": {"type": "none"}})),
            vec![ErrorCode::InvalidContext]
        );
        assert!(codes(json!({"kind": "goal", "action": "set_status", "id": 2, "status": "archived"})).is_empty());
        assert_eq!(
            codes(json!({"kind": "goal", "action": "update", "id": 2, "currentProgress": -1})),
            vec![ErrorCode::InvalidProgress]
        );
    }

    #[test]
    fn test_unknown_and_bulk() {
        assert_eq!(
            codes(json!({"kind": "event", "action": "set_status", "id": 1})),
            vec![ErrorCode::UnknownOperationType]
        );
        assert_eq!(
            codes(json!({"kind": "task", "action": "delete", "ids": [1, 2]})),
            vec![ErrorCode::BulkOperationsNotSupported]
        );
    }

    #[test]
    fn test_report_helpers() {
        let report = validate_all(
            &[
                draft(json!({"kind": "task", "action": "create", "title": "A", "recurrence": {"type": "none"}})),
                draft(json!({"kind": "task", "action": "create", "title": "B"})),
                draft(json!({"kind": "task", "action": "create"})),
            ],
            &ValidationContext::new(),
        );
        assert!(!report.all_valid());
        assert_eq!(report.operations().len(), 1);
        assert_eq!(report.invalid().len(), 2);
        assert_eq!(
            report.error_codes(),
            vec![ErrorCode::MissingRecurrence, ErrorCode::InvalidTitle]
        );
        assert_eq!(report.verdicts[2].result.joined(), "invalid_title, missing_recurrence");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn arb_draft() -> impl Strategy<Value = OperationDraft> {
        let kind = prop_oneof![Just("task"), Just("event"), Just("habit"), Just("goal"), Just("note")];
        let action = prop_oneof![
            Just("create"),
            Just("update"),
            Just("delete"),
            Just("set_status"),
            Just("complete_occurrence")
        ];
        let rule = prop_oneof![
            Just(Value::Null),
            Just(json!({"type": "none"})),
            Just(json!({"type": "daily"})),
            Just(json!({"type": "every_n_days", "intervalDays": 0})),
        ];
        (
            kind,
            action,
            proptest::option::of(-2i64..6),
            proptest::option::of("[a-z ]{0,12}"),
            proptest::option::of(prop_oneof![Just("2025-09-15"), Just("2025-13-01")]),
            rule,
        )
            .prop_map(|(kind, action, id, title, date, rule)| {
                let mut d = OperationDraft::new(kind, action).with("recurrence", rule);
                if let Some(id) = id {
                    d = d.with("id", id);
                }
                if let Some(title) = title {
                    d = d.with("title", title);
                }
                if let Some(date) = date {
                    d = d.with("scheduledFor", date).with("occurrenceDate", date);
                }
                d
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_validation_is_deterministic(d in arb_draft()) {
            let ctx = ValidationContext::new().with_anchor(3, parse_ymd("2025-09-01").unwrap());
            let first = validate_draft(&d, &ctx);
            let second = validate_draft(&d, &ctx);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.result.valid, first.result.errors.is_empty());
            prop_assert_eq!(first.operation.is_some(), first.result.valid);
        }
    }
}
