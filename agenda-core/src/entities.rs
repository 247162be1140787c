//! Persisted entity types
//!
//! The persistence collaborator owns these; the pipeline only reads
//! snapshots of them and issues operations against them.

use crate::operation::{GoalPatch, ItemFields, ItemPatch, NewGoal, NewItem};
use crate::recurrence::RecurrenceRule;
use crate::time::ClockTime;
use crate::{ContextTag, EntityKind, GoalStatus, ItemStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Positive integer identifier assigned by the persistence collaborator.
pub type EntityId = i64;

// ============================================================================
// SCHEDULABLE TRAIT
// ============================================================================

/// Common read surface for anything that lives on the calendar.
///
/// Used by the recurrence engine for expansion and by the context builder
/// for filtering, so tasks, events and habits can be handled uniformly.
pub trait Schedulable {
    fn master_id(&self) -> EntityId;
    fn kind(&self) -> EntityKind;
    fn title(&self) -> &str;
    /// Anchor date (`scheduledFor`).
    fn anchor(&self) -> Option<NaiveDate>;
    fn recurrence(&self) -> &RecurrenceRule;
    fn context(&self) -> Option<ContextTag>;
    /// `timeOfDay` for tasks and habits, `startTime` for events.
    fn time(&self) -> Option<ClockTime>;
    /// Master-level done flag (ignores per-occurrence state).
    fn is_done(&self) -> bool;
    /// Status of the occurrence on `date`.
    fn status_on(&self, date: NaiveDate) -> ItemStatus;

    fn time_label(&self) -> Option<String> {
        self.time().map(|t| t.to_string())
    }

    fn is_repeating(&self) -> bool {
        self.recurrence().is_repeating()
    }

    /// Master-level status; kinds without a status field report done/pending.
    fn master_status(&self) -> ItemStatus {
        if self.is_done() {
            ItemStatus::Completed
        } else {
            ItemStatus::Pending
        }
    }
}

fn status_from_sets(
    completed: &BTreeSet<NaiveDate>,
    skipped: &BTreeSet<NaiveDate>,
    date: NaiveDate,
) -> ItemStatus {
    if completed.contains(&date) {
        ItemStatus::Completed
    } else if skipped.contains(&date) {
        ItemStatus::Skipped
    } else {
        ItemStatus::Pending
    }
}

// ============================================================================
// TASK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub scheduled_for: Option<NaiveDate>,
    #[serde(default)]
    pub time_of_day: Option<ClockTime>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub context: Option<ContextTag>,
    #[serde(default)]
    pub recurrence: RecurrenceRule,
    #[serde(default)]
    pub completed_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub skipped_dates: BTreeSet<NaiveDate>,
}

impl Task {
    /// Non-repeating, unscheduled, pending task.
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            notes: String::new(),
            scheduled_for: None,
            time_of_day: None,
            status: ItemStatus::Pending,
            context: None,
            recurrence: RecurrenceRule::none(),
            completed_dates: BTreeSet::new(),
            skipped_dates: BTreeSet::new(),
        }
    }

    pub fn from_new(id: EntityId, new: &NewItem) -> Self {
        let mut task = Self::new(id, new.title.clone());
        task.recurrence = new.recurrence.clone();
        task.apply_fields(&new.fields);
        task
    }

    /// Apply an update. The patch always carries the full recurrence rule.
    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        self.recurrence = patch.recurrence.clone();
        self.apply_fields(&patch.fields);
    }

    fn apply_fields(&mut self, fields: &ItemFields) {
        if let Some(notes) = &fields.notes {
            self.notes = notes.clone();
        }
        if fields.scheduled_for.is_some() {
            self.scheduled_for = fields.scheduled_for;
        }
        if fields.time_of_day.is_some() {
            self.time_of_day = fields.time_of_day;
        }
        if fields.context.is_some() {
            self.context = fields.context;
        }
    }

    /// Set the status of a single occurrence date.
    ///
    /// `Pending` clears the date from both sets.
    pub fn set_occurrence_status(&mut self, date: NaiveDate, status: ItemStatus) {
        self.completed_dates.remove(&date);
        self.skipped_dates.remove(&date);
        match status {
            ItemStatus::Completed => {
                self.completed_dates.insert(date);
            }
            ItemStatus::Skipped => {
                self.skipped_dates.insert(date);
            }
            ItemStatus::Pending => {}
        }
    }
}

impl Schedulable for Task {
    fn master_id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Task
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn anchor(&self) -> Option<NaiveDate> {
        self.scheduled_for
    }
    fn recurrence(&self) -> &RecurrenceRule {
        &self.recurrence
    }
    fn context(&self) -> Option<ContextTag> {
        self.context
    }
    fn time(&self) -> Option<ClockTime> {
        self.time_of_day
    }
    fn is_done(&self) -> bool {
        self.status.is_done()
    }
    fn master_status(&self) -> ItemStatus {
        self.status
    }
    fn status_on(&self, date: NaiveDate) -> ItemStatus {
        status_from_sets(&self.completed_dates, &self.skipped_dates, date)
    }
}

// ============================================================================
// EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub scheduled_for: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<ClockTime>,
    #[serde(default)]
    pub end_time: Option<ClockTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub context: Option<ContextTag>,
    #[serde(default)]
    pub recurrence: RecurrenceRule,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_dates: BTreeSet<NaiveDate>,
}

impl Event {
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            notes: String::new(),
            scheduled_for: None,
            start_time: None,
            end_time: None,
            location: None,
            context: None,
            recurrence: RecurrenceRule::none(),
            completed: false,
            completed_dates: BTreeSet::new(),
        }
    }

    pub fn from_new(id: EntityId, new: &NewItem) -> Self {
        let mut event = Self::new(id, new.title.clone());
        event.recurrence = new.recurrence.clone();
        event.apply_fields(&new.fields);
        event
    }

    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        self.recurrence = patch.recurrence.clone();
        self.apply_fields(&patch.fields);
    }

    fn apply_fields(&mut self, fields: &ItemFields) {
        if let Some(notes) = &fields.notes {
            self.notes = notes.clone();
        }
        if fields.scheduled_for.is_some() {
            self.scheduled_for = fields.scheduled_for;
        }
        if fields.start_time.is_some() {
            self.start_time = fields.start_time;
        }
        if fields.end_time.is_some() {
            self.end_time = fields.end_time;
        }
        if fields.location.is_some() {
            self.location = fields.location.clone();
        }
        if fields.context.is_some() {
            self.context = fields.context;
        }
    }

    /// Toggle one occurrence date in the completed set.
    pub fn set_occurrence_completed(&mut self, date: NaiveDate, completed: bool) {
        if completed {
            self.completed_dates.insert(date);
        } else {
            self.completed_dates.remove(&date);
        }
    }
}

impl Schedulable for Event {
    fn master_id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Event
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn anchor(&self) -> Option<NaiveDate> {
        self.scheduled_for
    }
    fn recurrence(&self) -> &RecurrenceRule {
        &self.recurrence
    }
    fn context(&self) -> Option<ContextTag> {
        self.context
    }
    fn time(&self) -> Option<ClockTime> {
        self.start_time
    }
    fn is_done(&self) -> bool {
        self.completed
    }
    fn status_on(&self, date: NaiveDate) -> ItemStatus {
        if self.completed_dates.contains(&date) {
            ItemStatus::Completed
        } else {
            ItemStatus::Pending
        }
    }
}

// ============================================================================
// HABIT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub scheduled_for: Option<NaiveDate>,
    #[serde(default)]
    pub time_of_day: Option<ClockTime>,
    #[serde(default)]
    pub context: Option<ContextTag>,
    pub recurrence: RecurrenceRule,
    #[serde(default)]
    pub completed_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub skipped_dates: BTreeSet<NaiveDate>,
}

impl Habit {
    /// Daily habit anchored at `anchor`.
    pub fn new(id: EntityId, title: impl Into<String>, anchor: NaiveDate) -> Self {
        Self {
            id,
            title: title.into(),
            notes: String::new(),
            scheduled_for: Some(anchor),
            time_of_day: None,
            context: None,
            recurrence: RecurrenceRule::daily(),
            completed_dates: BTreeSet::new(),
            skipped_dates: BTreeSet::new(),
        }
    }

    pub fn from_new(id: EntityId, new: &NewItem) -> Self {
        let mut habit = Self {
            id,
            title: new.title.clone(),
            notes: String::new(),
            scheduled_for: None,
            time_of_day: None,
            context: None,
            recurrence: new.recurrence.clone(),
            completed_dates: BTreeSet::new(),
            skipped_dates: BTreeSet::new(),
        };
        habit.apply_fields(&new.fields);
        habit
    }

    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        self.recurrence = patch.recurrence.clone();
        self.apply_fields(&patch.fields);
    }

    fn apply_fields(&mut self, fields: &ItemFields) {
        if let Some(notes) = &fields.notes {
            self.notes = notes.clone();
        }
        if fields.scheduled_for.is_some() {
            self.scheduled_for = fields.scheduled_for;
        }
        if fields.time_of_day.is_some() {
            self.time_of_day = fields.time_of_day;
        }
        if fields.context.is_some() {
            self.context = fields.context;
        }
    }

    pub fn set_occurrence_completed(&mut self, date: NaiveDate, completed: bool) {
        self.skipped_dates.remove(&date);
        if completed {
            self.completed_dates.insert(date);
        } else {
            self.completed_dates.remove(&date);
        }
    }
}

impl Schedulable for Habit {
    fn master_id(&self) -> EntityId {
        self.id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Habit
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn anchor(&self) -> Option<NaiveDate> {
        self.scheduled_for
    }
    fn recurrence(&self) -> &RecurrenceRule {
        &self.recurrence
    }
    fn context(&self) -> Option<ContextTag> {
        self.context
    }
    fn time(&self) -> Option<ClockTime> {
        self.time_of_day
    }
    fn is_done(&self) -> bool {
        false
    }
    fn status_on(&self, date: NaiveDate) -> ItemStatus {
        status_from_sets(&self.completed_dates, &self.skipped_dates, date)
    }
}

// ============================================================================
// GOAL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub current_progress: Option<f64>,
    #[serde(default)]
    pub target_progress: Option<f64>,
    #[serde(default)]
    pub progress_unit: Option<String>,
}

impl Goal {
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            notes: String::new(),
            status: GoalStatus::Active,
            current_progress: None,
            target_progress: None,
            progress_unit: None,
        }
    }

    pub fn from_new(id: EntityId, new: &NewGoal) -> Self {
        Self {
            id,
            title: new.title.clone(),
            notes: new.notes.clone().unwrap_or_default(),
            status: new.status.unwrap_or_default(),
            current_progress: new.current_progress,
            target_progress: new.target_progress,
            progress_unit: new.progress_unit.clone(),
        }
    }

    pub fn apply(&mut self, patch: &GoalPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if patch.current_progress.is_some() {
            self.current_progress = patch.current_progress;
        }
        if patch.target_progress.is_some() {
            self.target_progress = patch.target_progress;
        }
        if patch.progress_unit.is_some() {
            self.progress_unit = patch.progress_unit.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_ymd;

    #[test]
    fn test_task_deserializes_camel_case_with_defaults() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "id": 3,
            "title": "Pay rent",
            "scheduledFor": "2025-10-01",
            "timeOfDay": "9:00",
            "recurrence": {"type": "none"}
        }))
        .unwrap();
        assert_eq!(task.scheduled_for, parse_ymd("2025-10-01"));
        assert_eq!(task.time_of_day.unwrap().to_string(), "09:00");
        assert_eq!(task.status, ItemStatus::Pending);
        assert!(task.completed_dates.is_empty());
    }

    #[test]
    fn test_set_occurrence_status_moves_between_sets() {
        let mut task = Task::new(1, "Stretch");
        let date = parse_ymd("2025-09-16").unwrap();
        task.set_occurrence_status(date, ItemStatus::Completed);
        assert_eq!(task.status_on(date), ItemStatus::Completed);
        task.set_occurrence_status(date, ItemStatus::Skipped);
        assert_eq!(task.status_on(date), ItemStatus::Skipped);
        assert!(!task.completed_dates.contains(&date));
        task.set_occurrence_status(date, ItemStatus::Pending);
        assert_eq!(task.status_on(date), ItemStatus::Pending);
    }

    #[test]
    fn test_event_uses_start_time_as_time() {
        let mut event = Event::new(2, "Standup");
        event.start_time = crate::time::ClockTime::parse("10:15");
        assert_eq!(event.time_label().as_deref(), Some("10:15"));
        assert_eq!(event.kind(), EntityKind::Event);
    }

    #[test]
    fn test_task_patch_keeps_unset_fields() {
        let new = NewItem {
            title: "Dentist".to_string(),
            fields: ItemFields {
                notes: Some("bring card".to_string()),
                scheduled_for: parse_ymd("2025-10-02"),
                ..ItemFields::default()
            },
            recurrence: RecurrenceRule::none(),
        };
        let mut task = Task::from_new(9, &new);
        assert_eq!(task.notes, "bring card");

        task.apply(&ItemPatch {
            id: 9,
            title: Some("Dentist (moved)".to_string()),
            fields: ItemFields {
                scheduled_for: parse_ymd("2025-10-03"),
                ..ItemFields::default()
            },
            recurrence: RecurrenceRule::weekly(),
        });
        assert_eq!(task.title, "Dentist (moved)");
        assert_eq!(task.notes, "bring card");
        assert_eq!(task.scheduled_for, parse_ymd("2025-10-03"));
        assert!(task.is_repeating());
    }

    #[test]
    fn test_event_occurrence_toggle() {
        let mut event = Event::new(3, "Yoga");
        let date = parse_ymd("2025-09-16").unwrap();
        event.set_occurrence_completed(date, true);
        assert_eq!(event.status_on(date), ItemStatus::Completed);
        event.set_occurrence_completed(date, false);
        assert_eq!(event.status_on(date), ItemStatus::Pending);
    }

    #[test]
    fn test_goal_from_new_defaults_active() {
        let goal = Goal::from_new(
            1,
            &NewGoal {
                title: "Run a 10k".to_string(),
                notes: None,
                status: None,
                current_progress: Some(2.0),
                target_progress: Some(10.0),
                progress_unit: Some("km".to_string()),
            },
        );
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(goal.target_progress, Some(10.0));
    }

    #[test]
    fn test_habit_defaults_to_daily() {
        let habit = Habit::new(5, "Read", parse_ymd("2025-09-01").unwrap());
        assert!(habit.is_repeating());
        assert!(!habit.is_done());
    }
}
