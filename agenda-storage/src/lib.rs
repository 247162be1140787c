//! AGENDA Storage - Persistence Contract and Mock Implementation
//!
//! Defines the persistence collaborator the assistant pipeline consumes.
//! Real engines (SQLite, Postgres) live outside this workspace; the
//! in-memory `MockStorage` backs tests and local development.

pub mod mock;
pub mod store;

pub use mock::MockStorage;
pub use store::PlannerStore;

use agenda_core::{
    AgendaResult, ContextTag, CorrelationId, EntityId, EntityKind, ItemStatus, Schedulable,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Listing filter. Every provided predicate must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    /// Inclusive lower bound on `scheduledFor`
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on `scheduledFor`
    pub to: Option<NaiveDate>,
    pub status: Option<ItemStatus>,
    pub completed: Option<bool>,
    pub context: Option<ContextTag>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Items anchored within `[from, to]`.
    pub fn range(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_context(mut self, context: ContextTag) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Whether `item` passes every predicate.
    ///
    /// A date bound excludes unscheduled items.
    pub fn admits<S: Schedulable + ?Sized>(&self, item: &S) -> bool {
        if self.from.is_some() || self.to.is_some() {
            let Some(date) = item.anchor() else {
                return false;
            };
            if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
                return false;
            }
        }
        if self.status.is_some_and(|status| item.master_status() != status) {
            return false;
        }
        if self.completed.is_some_and(|completed| item.is_done() != completed) {
            return false;
        }
        if self.context.is_some() && item.context() != self.context {
            return false;
        }
        true
    }
}

/// One free-text search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub kind: EntityKind,
    pub id: EntityId,
    pub title: String,
    pub scheduled_for: Option<NaiveDate>,
}

/// One audit-log row, written after each successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Operation tag, e.g. `task_update`
    pub action: String,
    pub entity: EntityKind,
    pub entity_id: Option<EntityId>,
    pub payload: serde_json::Value,
    pub correlation_id: Option<CorrelationId>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity: EntityKind,
        entity_id: Option<EntityId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            action: action.into(),
            entity,
            entity_id,
            payload,
            correlation_id: None,
            at: Utc::now(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

// ============================================================================
// TRANSACTION HELPER
// ============================================================================

/// Run `body` inside one storage transaction.
///
/// Commits when `body` returns `Ok`, rolls back when it returns `Err` or
/// when the commit itself fails. Rollback failures are logged; the original
/// error is the one returned.
pub async fn run_in_transaction<T, F, Fut>(store: &dyn PlannerStore, body: F) -> AgendaResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AgendaResult<T>>,
{
    store.begin().await?;
    let outcome = match body().await {
        Ok(value) => match store.commit().await {
            Ok(()) => return Ok(value),
            Err(e) => e,
        },
        Err(e) => e,
    };
    if let Err(rollback_err) = store.rollback().await {
        tracing::error!(error = %rollback_err, "Transaction rollback failed");
    }
    Err(outcome)
}
