//! Focused context: the bounded snapshot handed to the proposer and repairer.

use crate::filter::{is_overdue, Where};
use crate::matching::TitleRef;
use agenda_core::time::add_days;
use agenda_core::{EntityId, EntityKind, Event, Goal, Habit, Schedulable, Task};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An item the request explicitly points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: EntityKind,
    pub id: EntityId,
    pub title: String,
    pub reason: String,
}

/// Lookup tables that let a model resolve titles and ids without guessing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextIndexes {
    pub task_by_title_ci: BTreeMap<String, EntityId>,
    pub event_by_title_ci: BTreeMap<String, EntityId>,
    pub id_to_kind: BTreeMap<EntityId, EntityKind>,
    pub id_to_title: BTreeMap<EntityId, String>,
}

/// Counts over the filtered (pre-cap) tasks and events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregates {
    pub overdue_count: usize,
    pub next7_days_count: usize,
    pub backlog_count: usize,
    pub scheduled_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMeta {
    /// At least one list hit the item cap
    pub context_truncated: bool,
}

/// Read-only snapshot, built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusedContext {
    #[serde(rename = "where")]
    pub selector: Where,
    pub today: NaiveDate,
    pub timezone: String,
    pub tasks: Vec<Task>,
    pub events: Vec<Event>,
    pub habits: Vec<Habit>,
    pub goals: Vec<Goal>,
    pub candidates: Vec<Candidate>,
    pub indexes: ContextIndexes,
    pub aggregates: Aggregates,
    pub meta: ContextMeta,
}

/// Sort by `(scheduled_for nulls last, time, id)`.
pub(crate) fn sort_schedulable<S: Schedulable>(items: &mut [S]) {
    items.sort_by_key(|item| {
        (
            item.anchor().is_none(),
            item.anchor(),
            item.time(),
            item.master_id(),
        )
    });
}

/// Keep at most `cap` items; report whether anything was cut.
pub(crate) fn cap_list<T>(items: &mut Vec<T>, cap: usize) -> bool {
    let truncated = items.len() > cap;
    items.truncate(cap);
    truncated
}

pub(crate) fn title_ref<S: Schedulable + ?Sized>(item: &S) -> TitleRef {
    TitleRef {
        kind: item.kind(),
        id: item.master_id(),
        title: item.title().to_string(),
        scheduled_for: item.anchor(),
    }
}

/// Raw inputs for `FocusedContext::assemble`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub tasks: Vec<Task>,
    pub events: Vec<Event>,
    pub habits: Vec<Habit>,
    pub goals: Vec<Goal>,
}

impl FocusedContext {
    /// Filter, sort, cap and index a dataset. Pure.
    pub fn assemble(
        selector: &Where,
        data: Dataset,
        today: NaiveDate,
        timezone: &str,
        item_cap: usize,
    ) -> Self {
        let Dataset {
            tasks,
            events,
            habits,
            goals,
        } = data;

        let mut tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|t| selector.admits(t, today))
            .collect();
        let mut events: Vec<Event> = events
            .into_iter()
            .filter(|e| selector.admits(e, today))
            .collect();
        let mut habits: Vec<Habit> = habits
            .into_iter()
            .filter(|h| selector.admits(h, today))
            .collect();
        let mut goals: Vec<Goal> = if selector.includes_kind(EntityKind::Goal) {
            goals
                .into_iter()
                .filter(|g| selector.admits_titled(g.id, &g.title))
                .collect()
        } else {
            Vec::new()
        };

        let aggregates = aggregate(&tasks, &events, today);

        sort_schedulable(&mut tasks);
        sort_schedulable(&mut events);
        sort_schedulable(&mut habits);
        goals.sort_by_key(|g| g.id);

        let mut truncated = cap_list(&mut tasks, item_cap);
        truncated |= cap_list(&mut events, item_cap);
        truncated |= cap_list(&mut habits, item_cap);
        truncated |= cap_list(&mut goals, item_cap);

        let mut ctx = Self {
            selector: selector.clone(),
            today,
            timezone: timezone.to_string(),
            tasks,
            events,
            habits,
            goals,
            candidates: Vec::new(),
            indexes: ContextIndexes::default(),
            aggregates,
            meta: ContextMeta {
                context_truncated: truncated,
            },
        };
        ctx.candidates = ctx.build_candidates();
        ctx.indexes = ctx.build_indexes();
        ctx
    }

    fn build_candidates(&self) -> Vec<Candidate> {
        self.selector
            .ids
            .iter()
            .filter_map(|id| {
                self.titles()
                    .into_iter()
                    .find(|t| t.id == *id)
                    .map(|t| Candidate {
                        kind: t.kind,
                        id: t.id,
                        title: t.title,
                        reason: "explicit_id".to_string(),
                    })
            })
            .collect()
    }

    fn build_indexes(&self) -> ContextIndexes {
        let mut indexes = ContextIndexes::default();
        for task in &self.tasks {
            indexes
                .task_by_title_ci
                .entry(task.title.trim().to_lowercase())
                .or_insert(task.id);
        }
        for event in &self.events {
            indexes
                .event_by_title_ci
                .entry(event.title.trim().to_lowercase())
                .or_insert(event.id);
        }
        for t in self.titles() {
            indexes.id_to_kind.insert(t.id, t.kind);
            indexes.id_to_title.insert(t.id, t.title);
        }
        indexes
    }

    /// Every entity in the snapshot as a title reference.
    pub fn titles(&self) -> Vec<TitleRef> {
        let mut out: Vec<TitleRef> = Vec::new();
        out.extend(self.tasks.iter().map(title_ref));
        out.extend(self.events.iter().map(title_ref));
        out.extend(self.habits.iter().map(title_ref));
        out.extend(self.goals.iter().map(|g| TitleRef {
            kind: EntityKind::Goal,
            id: g.id,
            title: g.title.clone(),
            scheduled_for: None,
        }));
        out
    }

    /// Ids an operation may legitimately reference.
    pub fn known_ids(&self) -> BTreeSet<EntityId> {
        self.titles().into_iter().map(|t| t.id).collect()
    }

    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.indexes.id_to_kind.get(&id).copied()
    }

    /// Stored anchor date of a task, event or habit in the snapshot.
    pub fn anchor_of(&self, id: EntityId) -> Option<NaiveDate> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .and_then(|t| t.scheduled_for)
            .or_else(|| {
                self.events
                    .iter()
                    .find(|e| e.id == id)
                    .and_then(|e| e.scheduled_for)
            })
            .or_else(|| {
                self.habits
                    .iter()
                    .find(|h| h.id == id)
                    .and_then(|h| h.scheduled_for)
            })
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.events.is_empty() && self.habits.is_empty() && self.goals.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.tasks.len() + self.events.len() + self.habits.len() + self.goals.len()
    }

    /// JSON form embedded in prompts.
    pub fn to_prompt_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn aggregate(tasks: &[Task], events: &[Event], today: NaiveDate) -> Aggregates {
    let week_end = add_days(today, 6);
    let mut agg = Aggregates::default();
    let items = tasks
        .iter()
        .map(|t| t as &dyn Schedulable)
        .chain(events.iter().map(|e| e as &dyn Schedulable));
    for item in items {
        match item.anchor() {
            None => agg.backlog_count += 1,
            Some(date) => {
                agg.scheduled_count += 1;
                if !item.is_done() && date >= today && date <= week_end {
                    agg.next7_days_count += 1;
                }
            }
        }
        if is_overdue(item, today) {
            agg.overdue_count += 1;
        }
    }
    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_core::time::parse_ymd;
    use agenda_core::ItemStatus;

    fn day(s: &str) -> NaiveDate {
        parse_ymd(s).unwrap()
    }

    fn task(id: EntityId, title: &str, date: Option<&str>) -> Task {
        let mut t = Task::new(id, title);
        t.scheduled_for = date.map(day);
        t
    }

    fn dataset() -> Dataset {
        let mut done = task(4, "Filed taxes", Some("2025-09-01"));
        done.status = ItemStatus::Completed;
        let mut standup = Event::new(10, "Standup");
        standup.scheduled_for = Some(day("2025-09-17"));
        Dataset {
            tasks: vec![
                task(3, "Someday", None),
                task(1, "Pay rent", Some("2025-09-10")),
                task(2, "Buy milk", Some("2025-09-16")),
                done,
            ],
            events: vec![standup],
            habits: vec![Habit::new(20, "Read", day("2025-09-01"))],
            goals: vec![Goal::new(30, "Run a 10k")],
        }
    }

    #[test]
    fn test_sorted_nulls_last() {
        let ctx = FocusedContext::assemble(&Where::default(), dataset(), day("2025-09-16"), "UTC", 50);
        let ids: Vec<EntityId> = ctx.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 1, 2, 3]);
        assert!(!ctx.meta.context_truncated);
    }

    #[test]
    fn test_cap_sets_truncated() {
        let ctx = FocusedContext::assemble(&Where::default(), dataset(), day("2025-09-16"), "UTC", 2);
        assert_eq!(ctx.tasks.len(), 2);
        assert!(ctx.meta.context_truncated);
        // Aggregates count everything that passed the filter.
        assert_eq!(ctx.aggregates.scheduled_count, 4);
    }

    #[test]
    fn test_aggregates() {
        let ctx = FocusedContext::assemble(&Where::default(), dataset(), day("2025-09-16"), "UTC", 50);
        assert_eq!(
            ctx.aggregates,
            Aggregates {
                overdue_count: 1,
                next7_days_count: 2,
                backlog_count: 1,
                scheduled_count: 4,
            }
        );
    }

    #[test]
    fn test_candidates_and_indexes() {
        let ctx = FocusedContext::assemble(&Where::ids([2, 10, 99]), dataset(), day("2025-09-16"), "UTC", 50);
        assert_eq!(ctx.candidates.len(), 2);
        assert!(ctx.candidates.iter().all(|c| c.reason == "explicit_id"));
        assert_eq!(ctx.indexes.task_by_title_ci.get("buy milk"), Some(&2));
        assert_eq!(ctx.kind_of(10), Some(EntityKind::Event));
        assert!(ctx.goals.is_empty());
        assert_eq!(ctx.known_ids(), [2, 10].into_iter().collect());
    }

    #[test]
    fn test_anchor_lookup_and_prompt_json() {
        let ctx = FocusedContext::assemble(&Where::default(), dataset(), day("2025-09-16"), "UTC", 50);
        assert_eq!(ctx.anchor_of(20), Some(day("2025-09-01")));
        assert_eq!(ctx.anchor_of(3), None);
        let json = ctx.to_prompt_json();
        assert!(json.get("where").is_some());
        assert!(json["meta"]["context_truncated"].is_boolean());
    }
}
