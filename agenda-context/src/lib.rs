//! AGENDA Context - Context Assembly for the Assistant Pipeline
//!
//! Builds the read-only snapshots the pipeline reasons over:
//! - `FocusedContext`: a filtered, capped view for proposing and repairing
//! - `RouterContext`: today, this week and a backlog sample for routing
//!
//! Snapshots are built fresh per request and never cached.

pub mod filter;
pub mod focused;
pub mod matching;
pub mod router;

pub use filter::{is_overdue, ScheduledRange, Where};
pub use focused::{Aggregates, Candidate, ContextIndexes, ContextMeta, Dataset, FocusedContext};
pub use matching::{fuzzy_title_matches, normalize_title, TitleRef};
pub use router::{RouterContext, TodaySnapshot, WeekSnapshot};

use agenda_core::{AgendaResult, AssistantConfig, Clock};
use agenda_storage::{ListFilter, PlannerStore};
use std::sync::Arc;

/// Default per-list cap for the focused context.
pub const DEFAULT_ITEM_CAP: usize = 50;
/// Default number of unscheduled tasks sampled into the router context.
pub const DEFAULT_BACKLOG_SAMPLE: usize = 40;

// ============================================================================
// CONTEXT BUILDER
// ============================================================================

/// Reads the store and the clock, hands back snapshots.
#[derive(Clone)]
pub struct ContextBuilder {
    store: Arc<dyn PlannerStore>,
    clock: Arc<dyn Clock>,
    item_cap: usize,
    backlog_sample: usize,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn PlannerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            item_cap: DEFAULT_ITEM_CAP,
            backlog_sample: DEFAULT_BACKLOG_SAMPLE,
        }
    }

    pub fn from_config(
        store: Arc<dyn PlannerStore>,
        clock: Arc<dyn Clock>,
        config: &AssistantConfig,
    ) -> Self {
        Self::new(store, clock)
            .with_item_cap(config.context_item_cap)
            .with_backlog_sample(config.backlog_sample)
    }

    pub fn with_item_cap(mut self, cap: usize) -> Self {
        self.item_cap = cap.max(1);
        self
    }

    pub fn with_backlog_sample(mut self, sample: usize) -> Self {
        self.backlog_sample = sample;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Load tasks, events, habits and (when `where` allows) goals.
    async fn load(&self, selector: &Where) -> AgendaResult<Dataset> {
        let filter = ListFilter {
            context: selector.context,
            ..ListFilter::all()
        };
        let tasks = self.store.task_list(&filter).await?;
        let events = self.store.event_list(&filter).await?;
        let habits = self.store.habit_list(&filter).await?;
        let goals = if selector.includes_kind(agenda_core::EntityKind::Goal) {
            self.store.goal_list(None).await?
        } else {
            Vec::new()
        };
        Ok(Dataset {
            tasks,
            events,
            habits,
            goals,
        })
    }

    /// Filtered snapshot for the proposer and repairer.
    pub async fn focused(&self, selector: &Where) -> AgendaResult<FocusedContext> {
        let data = self.load(selector).await?;
        let ctx = FocusedContext::assemble(
            selector,
            data,
            self.clock.today(),
            self.clock.zone_name(),
            self.item_cap,
        );
        tracing::debug!(
            selector = %selector.describe(),
            items = ctx.item_count(),
            truncated = ctx.meta.context_truncated,
            "Focused context built"
        );
        Ok(ctx)
    }

    /// Compact snapshot for the intent router.
    pub async fn router(&self) -> AgendaResult<RouterContext> {
        let filter = ListFilter::all();
        let data = Dataset {
            tasks: self.store.task_list(&filter).await?,
            events: self.store.event_list(&filter).await?,
            ..Dataset::default()
        };
        let ctx = RouterContext::assemble(
            data,
            self.clock.today(),
            self.clock.zone_name(),
            self.backlog_sample,
        );
        tracing::debug!(
            week_tasks = ctx.week.task_count,
            week_events = ctx.week.event_count,
            backlog = ctx.backlog.len(),
            "Router context built"
        );
        Ok(ctx)
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("clock", &self.clock)
            .field("item_cap", &self.item_cap)
            .field("backlog_sample", &self.backlog_sample)
            .finish()
    }
}
