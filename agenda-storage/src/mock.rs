//! In-memory `PlannerStore` for tests and local development.

use crate::{AuditEntry, ListFilter, PlannerStore, SearchHit};
use ::async_trait::async_trait;
use agenda_core::{
    AgendaError, AgendaResult, EntityId, EntityKind, Event, Goal, GoalStatus, Habit, NewGoal,
    NewItem, Schedulable, StorageError, Task,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

/// Everything a transaction can roll back.
#[derive(Debug, Clone, Default)]
struct Tables {
    tasks: BTreeMap<EntityId, Task>,
    events: BTreeMap<EntityId, Event>,
    habits: BTreeMap<EntityId, Habit>,
    goals: BTreeMap<EntityId, Goal>,
    audit: Vec<AuditEntry>,
    /// Last id handed out; one sequence is shared by every kind.
    next_id: EntityId,
}

impl Tables {
    fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }
}

/// Saved tables plus the guard that keeps other transactions out.
#[derive(Debug)]
struct OpenTransaction {
    saved: Tables,
    _guard: OwnedMutexGuard<()>,
}

type IdempotencyMap = HashMap<(String, String), (Instant, serde_json::Value)>;

/// In-memory mock storage.
///
/// `begin` snapshots every table; `rollback` restores the snapshot and
/// `commit` drops it. The idempotency cache sits outside the snapshot.
/// Transactions are serialized: `begin` waits until the open one ends, so a
/// nested `begin` on the same task never returns.
#[derive(Debug)]
pub struct MockStorage {
    tables: Arc<RwLock<Tables>>,
    tx_lock: Arc<tokio::sync::Mutex<()>>,
    snapshot: Mutex<Option<OpenTransaction>>,
    idempotency: Arc<RwLock<IdempotencyMap>>,
    idempotency_ttl: Duration,
    fail_commit: AtomicBool,
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::with_idempotency_ttl(Duration::from_secs(24 * 3600))
    }
}

fn poisoned<T>(_: T) -> AgendaError {
    AgendaError::Storage(StorageError::LockPoisoned)
}

fn not_found(kind: EntityKind, id: EntityId) -> AgendaError {
    AgendaError::Storage(StorageError::NotFound { kind, id })
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idempotency_ttl(ttl: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            tx_lock: Arc::new(tokio::sync::Mutex::new(())),
            snapshot: Mutex::new(None),
            idempotency: Arc::new(RwLock::new(HashMap::new())),
            idempotency_ttl: ttl,
            fail_commit: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `commit` fail (and roll back).
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    // === Seeding helpers ===
    // These bypass id allocation so fixtures can pin ids; the sequence is
    // bumped past any seeded id.

    pub fn seed_task(&self, task: Task) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.next_id = tables.next_id.max(task.id);
        tables.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn seed_event(&self, event: Event) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.next_id = tables.next_id.max(event.id);
        tables.events.insert(event.id, event);
        Ok(())
    }

    pub fn seed_habit(&self, habit: Habit) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.next_id = tables.next_id.max(habit.id);
        tables.habits.insert(habit.id, habit);
        Ok(())
    }

    pub fn seed_goal(&self, goal: Goal) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.next_id = tables.next_id.max(goal.id);
        tables.goals.insert(goal.id, goal);
        Ok(())
    }

    // === Inspection ===

    /// Copy of the audit log, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.tables
            .read()
            .map(|t| t.audit.clone())
            .unwrap_or_default()
    }

    pub fn task_count(&self) -> usize {
        self.tables.read().map(|t| t.tasks.len()).unwrap_or(0)
    }

    pub fn event_count(&self) -> usize {
        self.tables.read().map(|t| t.events.len()).unwrap_or(0)
    }

    pub fn habit_count(&self) -> usize {
        self.tables.read().map(|t| t.habits.len()).unwrap_or(0)
    }

    pub fn goal_count(&self) -> usize {
        self.tables.read().map(|t| t.goals.len()).unwrap_or(0)
    }

    /// Clear all stored data, including the idempotency cache.
    pub fn clear(&self) -> AgendaResult<()> {
        *self.tables.write().map_err(poisoned)? = Tables::default();
        self.idempotency.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

fn filtered<T: Schedulable + Clone>(rows: &BTreeMap<EntityId, T>, filter: &ListFilter) -> Vec<T> {
    rows.values().filter(|r| filter.admits(*r)).cloned().collect()
}

fn replace<T: Clone>(
    rows: &mut BTreeMap<EntityId, T>,
    kind: EntityKind,
    id: EntityId,
    value: &T,
) -> AgendaResult<T> {
    let slot = rows.get_mut(&id).ok_or_else(|| not_found(kind, id))?;
    *slot = value.clone();
    Ok(value.clone())
}

fn remove<T>(rows: &mut BTreeMap<EntityId, T>, kind: EntityKind, id: EntityId) -> AgendaResult<()> {
    rows.remove(&id).map(|_| ()).ok_or_else(|| not_found(kind, id))
}

#[async_trait]
impl PlannerStore for MockStorage {
    // === Task Operations ===

    async fn task_create(&self, new: &NewItem) -> AgendaResult<Task> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let id = tables.allocate_id();
        let task = Task::from_new(id, new);
        tables.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn task_get(&self, id: EntityId) -> AgendaResult<Option<Task>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.tasks.get(&id).cloned())
    }

    async fn task_update(&self, task: &Task) -> AgendaResult<Task> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        replace(&mut tables.tasks, EntityKind::Task, task.id, task)
    }

    async fn task_delete(&self, id: EntityId) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        remove(&mut tables.tasks, EntityKind::Task, id)
    }

    async fn task_list(&self, filter: &ListFilter) -> AgendaResult<Vec<Task>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(filtered(&tables.tasks, filter))
    }

    // === Event Operations ===

    async fn event_create(&self, new: &NewItem) -> AgendaResult<Event> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let id = tables.allocate_id();
        let event = Event::from_new(id, new);
        tables.events.insert(id, event.clone());
        Ok(event)
    }

    async fn event_get(&self, id: EntityId) -> AgendaResult<Option<Event>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.events.get(&id).cloned())
    }

    async fn event_update(&self, event: &Event) -> AgendaResult<Event> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        replace(&mut tables.events, EntityKind::Event, event.id, event)
    }

    async fn event_delete(&self, id: EntityId) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        remove(&mut tables.events, EntityKind::Event, id)
    }

    async fn event_list(&self, filter: &ListFilter) -> AgendaResult<Vec<Event>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(filtered(&tables.events, filter))
    }

    // === Habit Operations ===

    async fn habit_create(&self, new: &NewItem) -> AgendaResult<Habit> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let id = tables.allocate_id();
        let habit = Habit::from_new(id, new);
        tables.habits.insert(id, habit.clone());
        Ok(habit)
    }

    async fn habit_get(&self, id: EntityId) -> AgendaResult<Option<Habit>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.habits.get(&id).cloned())
    }

    async fn habit_update(&self, habit: &Habit) -> AgendaResult<Habit> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        replace(&mut tables.habits, EntityKind::Habit, habit.id, habit)
    }

    async fn habit_delete(&self, id: EntityId) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        remove(&mut tables.habits, EntityKind::Habit, id)
    }

    async fn habit_list(&self, filter: &ListFilter) -> AgendaResult<Vec<Habit>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(filtered(&tables.habits, filter))
    }

    // === Goal Operations ===

    async fn goal_create(&self, new: &NewGoal) -> AgendaResult<Goal> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let id = tables.allocate_id();
        let goal = Goal::from_new(id, new);
        tables.goals.insert(id, goal.clone());
        Ok(goal)
    }

    async fn goal_get(&self, id: EntityId) -> AgendaResult<Option<Goal>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.goals.get(&id).cloned())
    }

    async fn goal_update(&self, goal: &Goal) -> AgendaResult<Goal> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        replace(&mut tables.goals, EntityKind::Goal, goal.id, goal)
    }

    async fn goal_delete(&self, id: EntityId) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        remove(&mut tables.goals, EntityKind::Goal, id)
    }

    async fn goal_list(&self, status: Option<GoalStatus>) -> AgendaResult<Vec<Goal>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .goals
            .values()
            .filter(|g| status.map_or(true, |s| g.status == s))
            .cloned()
            .collect())
    }

    // === Search + Audit ===

    async fn search(&self, query: &str) -> AgendaResult<Vec<SearchHit>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().map_err(poisoned)?;
        let hit = |title: &str, notes: &str| {
            title.to_lowercase().contains(&needle) || notes.to_lowercase().contains(&needle)
        };

        let mut hits: Vec<SearchHit> = tables
            .tasks
            .values()
            .filter(|t| hit(&t.title, &t.notes))
            .map(|t| SearchHit {
                kind: EntityKind::Task,
                id: t.id,
                title: t.title.clone(),
                scheduled_for: t.scheduled_for,
            })
            .collect();
        hits.extend(
            tables
                .events
                .values()
                .filter(|e| hit(&e.title, &e.notes))
                .map(|e| SearchHit {
                    kind: EntityKind::Event,
                    id: e.id,
                    title: e.title.clone(),
                    scheduled_for: e.scheduled_for,
                }),
        );
        Ok(hits)
    }

    async fn audit_append(&self, entry: AuditEntry) -> AgendaResult<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.audit.push(entry);
        Ok(())
    }

    // === Transactions ===

    async fn begin(&self) -> AgendaResult<()> {
        let guard = Arc::clone(&self.tx_lock).lock_owned().await;
        let mut snapshot = self.snapshot.lock().map_err(poisoned)?;
        if snapshot.is_some() {
            return Err(AgendaError::Storage(StorageError::TransactionFailed {
                reason: "transaction already open".to_string(),
            }));
        }
        let saved = self.tables.read().map_err(poisoned)?.clone();
        *snapshot = Some(OpenTransaction { saved, _guard: guard });
        Ok(())
    }

    async fn commit(&self) -> AgendaResult<()> {
        let mut snapshot = self.snapshot.lock().map_err(poisoned)?;
        if snapshot.is_none() {
            return Err(AgendaError::Storage(StorageError::TransactionFailed {
                reason: "no open transaction".to_string(),
            }));
        }
        // A rejected commit stays open for the caller's rollback.
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(AgendaError::Storage(StorageError::TransactionFailed {
                reason: "commit rejected".to_string(),
            }));
        }
        *snapshot = None;
        Ok(())
    }

    async fn rollback(&self) -> AgendaResult<()> {
        let mut snapshot = self.snapshot.lock().map_err(poisoned)?;
        let open = snapshot.take().ok_or_else(|| {
            AgendaError::Storage(StorageError::TransactionFailed {
                reason: "no open transaction".to_string(),
            })
        })?;
        *self.tables.write().map_err(poisoned)? = open.saved;
        Ok(())
    }

    // === Idempotency Cache ===

    async fn idempotency_get(
        &self,
        key: &str,
        request_hash: &str,
    ) -> AgendaResult<Option<serde_json::Value>> {
        let cache = self.idempotency.read().map_err(poisoned)?;
        Ok(cache
            .get(&(key.to_string(), request_hash.to_string()))
            .filter(|(stored_at, _)| stored_at.elapsed() < self.idempotency_ttl)
            .map(|(_, response)| response.clone()))
    }

    async fn idempotency_save(
        &self,
        key: &str,
        request_hash: &str,
        response: &serde_json::Value,
    ) -> AgendaResult<()> {
        let mut cache = self.idempotency.write().map_err(poisoned)?;
        cache.retain(|_, (stored_at, _)| stored_at.elapsed() < self.idempotency_ttl);
        cache.insert(
            (key.to_string(), request_hash.to_string()),
            (Instant::now(), response.clone()),
        );
        Ok(())
    }
}
