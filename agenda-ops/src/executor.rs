//! Operation executors
//!
//! An executor turns one validated `Operation` into store calls. The
//! processor looks executors up per tag; `StoreExecutor` handles every tag
//! against a `PlannerStore`.

use agenda_core::{
    AgendaError, AgendaResult, EntityId, EntityKind, GoalStatus, ItemStatus, OccurrenceMark,
    Operation, Schedulable, StatusChange, StorageError,
};
use agenda_storage::PlannerStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// OUTCOME
// ============================================================================

/// What a successful execution did, for the summary counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Created,
    Updated,
    Deleted,
    Completed,
}

/// Result of one successful execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub kind: EntityKind,
    pub id: EntityId,
    pub effect: Effect,
    /// Entity state before the change, for undo recording
    #[serde(skip)]
    pub before: Option<Value>,
    /// Entity state after the change; absent for deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Value>,
}

impl ExecOutcome {
    fn new(kind: EntityKind, id: EntityId, effect: Effect) -> Self {
        Self {
            kind,
            id,
            effect,
            before: None,
            entity: None,
        }
    }

    fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    fn entity<T: Serialize>(mut self, value: &T) -> Self {
        self.entity = serde_json::to_value(value).ok();
        self
    }
}

// ============================================================================
// EXECUTOR TRAIT
// ============================================================================

#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, store: &dyn PlannerStore, op: &Operation) -> AgendaResult<ExecOutcome>;
}

fn not_found(kind: EntityKind, id: EntityId) -> AgendaError {
    AgendaError::Storage(StorageError::NotFound { kind, id })
}

/// Prefix a store failure with the step that hit it.
fn failed(
    step: &str,
    kind: EntityKind,
    id: Option<EntityId>,
) -> impl FnOnce(AgendaError) -> AgendaError + '_ {
    move |e| {
        if matches!(e, AgendaError::Storage(StorageError::NotFound { .. })) {
            return e;
        }
        let reason = format!("Failed to {} {}: {}", step, kind, e);
        match id {
            Some(id) => AgendaError::Storage(StorageError::UpdateFailed { kind, id, reason }),
            None => AgendaError::Storage(StorageError::InsertFailed { kind, reason }),
        }
    }
}

fn require<T>(found: Option<T>, kind: EntityKind, id: EntityId) -> AgendaResult<T> {
    found.ok_or_else(|| not_found(kind, id))
}

// ============================================================================
// STORE EXECUTOR
// ============================================================================

/// Executes every operation tag directly against the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreExecutor;

impl StoreExecutor {
    async fn set_task_status(
        &self,
        store: &dyn PlannerStore,
        change: &StatusChange,
    ) -> AgendaResult<ExecOutcome> {
        let kind = EntityKind::Task;
        let mut task = require(store.task_get(change.id).await?, kind, change.id)?;
        let before = task.clone();
        match change.occurrence_date {
            Some(date) => task.set_occurrence_status(date, change.status),
            None => task.status = change.status,
        }
        let saved = store
            .task_update(&task)
            .await
            .map_err(failed("set status of", kind, Some(change.id)))?;
        let effect = if change.status == ItemStatus::Completed {
            Effect::Completed
        } else {
            Effect::Updated
        };
        Ok(ExecOutcome::new(kind, saved.id, effect).before(&before).entity(&saved))
    }

    /// Toggle one occurrence. A non-repeating entity has only one, so the
    /// master's own completion flag moves instead.
    async fn complete_occurrence(
        &self,
        store: &dyn PlannerStore,
        kind: EntityKind,
        mark: &OccurrenceMark,
    ) -> AgendaResult<ExecOutcome> {
        let on_error = || failed("complete occurrence of", kind, Some(mark.id));
        let completed = |id: EntityId| ExecOutcome::new(kind, id, Effect::Completed);
        let outcome = match kind {
            EntityKind::Task => {
                let mut task = require(store.task_get(mark.id).await?, kind, mark.id)?;
                let before = task.clone();
                let status = if mark.completed {
                    ItemStatus::Completed
                } else {
                    ItemStatus::Pending
                };
                if task.is_repeating() {
                    task.set_occurrence_status(mark.occurrence_date, status);
                } else {
                    task.status = status;
                }
                let saved = store.task_update(&task).await.map_err(on_error())?;
                completed(saved.id).before(&before).entity(&saved)
            }
            EntityKind::Event => {
                let mut event = require(store.event_get(mark.id).await?, kind, mark.id)?;
                let before = event.clone();
                if event.is_repeating() {
                    event.set_occurrence_completed(mark.occurrence_date, mark.completed);
                } else {
                    event.completed = mark.completed;
                }
                let saved = store.event_update(&event).await.map_err(on_error())?;
                completed(saved.id).before(&before).entity(&saved)
            }
            EntityKind::Habit => {
                let mut habit = require(store.habit_get(mark.id).await?, kind, mark.id)?;
                let before = habit.clone();
                habit.set_occurrence_completed(mark.occurrence_date, mark.completed);
                let saved = store.habit_update(&habit).await.map_err(on_error())?;
                completed(saved.id).before(&before).entity(&saved)
            }
            EntityKind::Goal => return Err(not_found(kind, mark.id)),
        };
        Ok(outcome)
    }
}

#[async_trait]
impl OperationExecutor for StoreExecutor {
    async fn execute(&self, store: &dyn PlannerStore, op: &Operation) -> AgendaResult<ExecOutcome> {
        let kind = op.kind();
        let created = |id: EntityId| ExecOutcome::new(kind, id, Effect::Created);
        let updated = |id: EntityId| ExecOutcome::new(kind, id, Effect::Updated);
        let deleted = |id: EntityId| ExecOutcome::new(kind, id, Effect::Deleted);
        let on_create = || failed("create", kind, None);
        let on_update = |id: EntityId| failed("update", kind, Some(id));
        let on_delete = |id: EntityId| failed("delete", kind, Some(id));
        match op {
            // === Creates ===
            Operation::TaskCreate(new) => {
                let task = store.task_create(new).await.map_err(on_create())?;
                Ok(created(task.id).entity(&task))
            }
            Operation::EventCreate(new) => {
                let event = store.event_create(new).await.map_err(on_create())?;
                Ok(created(event.id).entity(&event))
            }
            Operation::HabitCreate(new) => {
                let habit = store.habit_create(new).await.map_err(on_create())?;
                Ok(created(habit.id).entity(&habit))
            }
            Operation::GoalCreate(new) => {
                let goal = store.goal_create(new).await.map_err(on_create())?;
                Ok(created(goal.id).entity(&goal))
            }

            // === Updates ===
            Operation::TaskUpdate(patch) => {
                let mut task = require(store.task_get(patch.id).await?, kind, patch.id)?;
                let before = task.clone();
                task.apply(patch);
                let saved = store.task_update(&task).await.map_err(on_update(patch.id))?;
                Ok(updated(saved.id).before(&before).entity(&saved))
            }
            Operation::EventUpdate(patch) => {
                let mut event = require(store.event_get(patch.id).await?, kind, patch.id)?;
                let before = event.clone();
                event.apply(patch);
                let saved = store.event_update(&event).await.map_err(on_update(patch.id))?;
                Ok(updated(saved.id).before(&before).entity(&saved))
            }
            Operation::HabitUpdate(patch) => {
                let mut habit = require(store.habit_get(patch.id).await?, kind, patch.id)?;
                let before = habit.clone();
                habit.apply(patch);
                let saved = store.habit_update(&habit).await.map_err(on_update(patch.id))?;
                Ok(updated(saved.id).before(&before).entity(&saved))
            }
            Operation::GoalUpdate(patch) => {
                let mut goal = require(store.goal_get(patch.id).await?, kind, patch.id)?;
                let before = goal.clone();
                goal.apply(patch);
                let saved = store.goal_update(&goal).await.map_err(on_update(patch.id))?;
                Ok(updated(saved.id).before(&before).entity(&saved))
            }

            // === Deletes: existence is checked first so a miss is NotFound ===
            Operation::TaskDelete(target) => {
                let task = require(store.task_get(target.id).await?, kind, target.id)?;
                store.task_delete(target.id).await.map_err(on_delete(target.id))?;
                Ok(deleted(target.id).before(&task))
            }
            Operation::EventDelete(target) => {
                let event = require(store.event_get(target.id).await?, kind, target.id)?;
                store.event_delete(target.id).await.map_err(on_delete(target.id))?;
                Ok(deleted(target.id).before(&event))
            }
            Operation::HabitDelete(target) => {
                let habit = require(store.habit_get(target.id).await?, kind, target.id)?;
                store.habit_delete(target.id).await.map_err(on_delete(target.id))?;
                Ok(deleted(target.id).before(&habit))
            }
            Operation::GoalDelete(target) => {
                let goal = require(store.goal_get(target.id).await?, kind, target.id)?;
                store.goal_delete(target.id).await.map_err(on_delete(target.id))?;
                Ok(deleted(target.id).before(&goal))
            }

            // === Status ===
            Operation::TaskSetStatus(change) => self.set_task_status(store, change).await,
            Operation::GoalSetStatus(change) => {
                let mut goal = require(store.goal_get(change.id).await?, kind, change.id)?;
                let before = goal.clone();
                goal.status = change.status;
                let saved = store
                    .goal_update(&goal)
                    .await
                    .map_err(failed("set status of", kind, Some(change.id)))?;
                let effect = if change.status == GoalStatus::Completed {
                    Effect::Completed
                } else {
                    Effect::Updated
                };
                Ok(ExecOutcome::new(kind, saved.id, effect).before(&before).entity(&saved))
            }
            Operation::TaskCompleteOccurrence(mark)
            | Operation::EventCompleteOccurrence(mark)
            | Operation::HabitCompleteOccurrence(mark) => {
                self.complete_occurrence(store, kind, mark).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_core::time::parse_ymd;
    use agenda_core::{
        Event, Habit, ItemFields, ItemPatch, NewItem, RecurrenceRule, Target, Task,
    };
    use agenda_storage::MockStorage;

    fn new_task(title: &str) -> NewItem {
        NewItem {
            title: title.to_string(),
            fields: ItemFields::default(),
            recurrence: RecurrenceRule::none(),
        }
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let store = MockStorage::new();
        let created = StoreExecutor
            .execute(&store, &Operation::TaskCreate(new_task("Buy milk")))
            .await
            .unwrap();
        assert_eq!(created.effect, Effect::Created);
        assert_eq!(created.entity.as_ref().unwrap()["title"], "Buy milk");

        let patch = ItemPatch {
            id: created.id,
            title: Some("Buy oat milk".to_string()),
            fields: ItemFields::default(),
            recurrence: RecurrenceRule::none(),
        };
        let updated = StoreExecutor
            .execute(&store, &Operation::TaskUpdate(patch))
            .await
            .unwrap();
        assert_eq!(updated.effect, Effect::Updated);
        assert_eq!(updated.before.unwrap()["title"], "Buy milk");
        assert_eq!(
            store.task_get(created.id).await.unwrap().unwrap().title,
            "Buy oat milk"
        );
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MockStorage::new();
        let err = StoreExecutor
            .execute(&store, &Operation::EventDelete(Target { id: 99 }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgendaError::Storage(StorageError::NotFound { kind: EntityKind::Event, id: 99 })
        ));
    }

    #[tokio::test]
    async fn test_set_status_per_occurrence() {
        let store = MockStorage::new();
        let mut run = Task::new(1, "Run");
        run.scheduled_for = parse_ymd("2025-09-15");
        run.recurrence = RecurrenceRule::daily();
        store.seed_task(run).unwrap();

        let outcome = StoreExecutor
            .execute(
                &store,
                &Operation::TaskSetStatus(StatusChange {
                    id: 1,
                    status: ItemStatus::Skipped,
                    occurrence_date: parse_ymd("2025-09-17"),
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome.effect, Effect::Updated);
        let task = store.task_get(1).await.unwrap().unwrap();
        assert_eq!(task.status, ItemStatus::Pending);
        assert!(task.skipped_dates.contains(&parse_ymd("2025-09-17").unwrap()));
    }

    #[tokio::test]
    async fn test_complete_occurrence_by_kind() {
        let store = MockStorage::new();
        let anchor = parse_ymd("2025-09-15").unwrap();
        store.seed_habit(Habit::new(2, "Read", anchor)).unwrap();
        let mut lunch = Event::new(3, "Lunch");
        lunch.scheduled_for = Some(anchor);
        store.seed_event(lunch).unwrap();

        let day = parse_ymd("2025-09-16").unwrap();
        let mark = |id, occurrence_date| OccurrenceMark { id, occurrence_date, completed: true };
        for op in [
            Operation::HabitCompleteOccurrence(mark(2, day)),
            Operation::EventCompleteOccurrence(mark(3, anchor)),
        ] {
            let outcome = StoreExecutor.execute(&store, &op).await.unwrap();
            assert_eq!(outcome.effect, Effect::Completed);
        }
        assert!(store.habit_get(2).await.unwrap().unwrap().completed_dates.contains(&day));
        // One-off event: the master flag moves
        assert!(store.event_get(3).await.unwrap().unwrap().completed);
    }
}
