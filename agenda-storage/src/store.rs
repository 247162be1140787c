//! Async persistence trait consumed by the assistant pipeline.
//!
//! The storage engine itself is an external collaborator. This trait is
//! the whole contract: CRUD per entity kind, filtered listing, free-text
//! search, audit append, transactions and the idempotency cache.

use crate::{AuditEntry, ListFilter, SearchHit};
use ::async_trait::async_trait;
use agenda_core::{
    AgendaResult, EntityId, Event, Goal, GoalStatus, Habit, NewGoal, NewItem, Task,
};

/// Async storage trait for planner entities.
///
/// Implementations must make concurrent CRUD access safe; the pipeline
/// holds no locks of its own.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    // ========================================================================
    // TASK OPERATIONS
    // ========================================================================

    /// Insert a new task and return it with its assigned id.
    async fn task_create(&self, new: &NewItem) -> AgendaResult<Task>;

    /// Get a task by id.
    async fn task_get(&self, id: EntityId) -> AgendaResult<Option<Task>>;

    /// Replace a stored task. Fails with `NotFound` if the id is unknown.
    async fn task_update(&self, task: &Task) -> AgendaResult<Task>;

    /// Delete a task. Fails with `NotFound` if the id is unknown.
    async fn task_delete(&self, id: EntityId) -> AgendaResult<()>;

    /// List tasks matching the filter, ordered by id.
    async fn task_list(&self, filter: &ListFilter) -> AgendaResult<Vec<Task>>;

    // ========================================================================
    // EVENT OPERATIONS
    // ========================================================================

    async fn event_create(&self, new: &NewItem) -> AgendaResult<Event>;

    async fn event_get(&self, id: EntityId) -> AgendaResult<Option<Event>>;

    async fn event_update(&self, event: &Event) -> AgendaResult<Event>;

    async fn event_delete(&self, id: EntityId) -> AgendaResult<()>;

    async fn event_list(&self, filter: &ListFilter) -> AgendaResult<Vec<Event>>;

    // ========================================================================
    // HABIT OPERATIONS
    // ========================================================================

    async fn habit_create(&self, new: &NewItem) -> AgendaResult<Habit>;

    async fn habit_get(&self, id: EntityId) -> AgendaResult<Option<Habit>>;

    async fn habit_update(&self, habit: &Habit) -> AgendaResult<Habit>;

    async fn habit_delete(&self, id: EntityId) -> AgendaResult<()>;

    async fn habit_list(&self, filter: &ListFilter) -> AgendaResult<Vec<Habit>>;

    // ========================================================================
    // GOAL OPERATIONS
    // ========================================================================

    async fn goal_create(&self, new: &NewGoal) -> AgendaResult<Goal>;

    async fn goal_get(&self, id: EntityId) -> AgendaResult<Option<Goal>>;

    async fn goal_update(&self, goal: &Goal) -> AgendaResult<Goal>;

    async fn goal_delete(&self, id: EntityId) -> AgendaResult<()>;

    /// List goals, optionally restricted to one status.
    async fn goal_list(&self, status: Option<GoalStatus>) -> AgendaResult<Vec<Goal>>;

    // ========================================================================
    // SEARCH + AUDIT
    // ========================================================================

    /// Case-insensitive free-text search over task and event titles and notes.
    async fn search(&self, query: &str) -> AgendaResult<Vec<SearchHit>>;

    /// Append one row to the audit log.
    async fn audit_append(&self, entry: AuditEntry) -> AgendaResult<()>;

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Open a transaction. Nested transactions are not supported.
    async fn begin(&self) -> AgendaResult<()>;

    /// Make every write since `begin` durable.
    async fn commit(&self) -> AgendaResult<()>;

    /// Discard every write since `begin`.
    async fn rollback(&self) -> AgendaResult<()>;

    // ========================================================================
    // IDEMPOTENCY CACHE
    // ========================================================================

    /// Stored response for `(key, request_hash)`, if any and not expired.
    async fn idempotency_get(
        &self,
        key: &str,
        request_hash: &str,
    ) -> AgendaResult<Option<serde_json::Value>>;

    /// Store (or replace) the response for `(key, request_hash)`.
    async fn idempotency_save(
        &self,
        key: &str,
        request_hash: &str,
        response: &serde_json::Value,
    ) -> AgendaResult<()>;
}
