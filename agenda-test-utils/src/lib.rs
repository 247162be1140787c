//! AGENDA Test Utilities
//!
//! Shared test infrastructure for the AGENDA workspace:
//! - Test fixtures: a fixed clock, a seeded store, a fast config
//! - Scripted model replies keyed by prompt
//! - Proptest generators for dates, rules and drafts
//! - Custom assertions over validation verdicts

pub use agenda_storage::MockStorage;

pub use agenda_core::{
    AgendaError, AgendaResult, AssistantConfig, Clock, ClockTime, ContextTag, EntityId, ErrorCode,
    Event, FixedClock, Goal, Habit, OperationDraft, RecurrenceRule, Task,
};
pub use agenda_llm::{MockCompletionProvider, MockReply, ProviderRegistry};

// ============================================================================
// PROMPT MARKERS
// ============================================================================

/// Phrases that open each pipeline prompt, for
/// [`MockCompletionProvider::on_prompt_containing`].
pub mod prompts {
    pub const ROUTER: &str = "You route messages";
    pub const PROPOSER: &str = "You plan data changes";
    pub const REPAIR: &str = "Fix the invalid operations";
    pub const SUMMARY: &str = "concise plain-text summary";
    pub const CHAT: &str = "friendly assistant";
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    /// Wednesday 2025-09-17, the date every fixture is built around.
    pub fn today() -> NaiveDate {
        date(2025, 9, 17)
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
    }

    pub fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::on(today()))
    }

    /// Config with short timeouts and checkpoints under `checkpoint_dir`.
    pub fn test_config(checkpoint_dir: impl Into<PathBuf>) -> AssistantConfig {
        AssistantConfig {
            router_timeout: Duration::from_millis(200),
            model_timeout: Duration::from_millis(500),
            checkpoint_dir: checkpoint_dir.into(),
            timezone_name: "UTC".to_string(),
            ..AssistantConfig::default()
        }
    }

    /// Store with a small, fixed dataset:
    ///
    /// | id | kind  | title           | schedule                       |
    /// |----|-------|-----------------|--------------------------------|
    /// | 1  | task  | Buy milk        | today                          |
    /// | 2  | task  | Laundry         | unscheduled                    |
    /// | 3  | task  | Water plants    | daily from 2025-09-15          |
    /// | 4  | event | Dentist         | tomorrow 10:00-11:00           |
    /// | 5  | event | Lunch with Sam  | today 12:30-13:30              |
    /// | 6  | habit | Stretch         | daily from 2025-09-01          |
    /// | 7  | goal  | Read 12 books   |                                |
    pub fn seeded_store() -> Arc<MockStorage> {
        let store = MockStorage::new();

        let mut milk = Task::new(1, "Buy milk");
        milk.scheduled_for = Some(today());
        store.seed_task(milk).expect("seed task");

        store.seed_task(Task::new(2, "Laundry")).expect("seed task");

        let mut plants = Task::new(3, "Water plants");
        plants.scheduled_for = Some(date(2025, 9, 15));
        plants.recurrence = RecurrenceRule::daily();
        store.seed_task(plants).expect("seed task");

        store
            .seed_event(event(4, "Dentist", date(2025, 9, 18), (10, 0), (11, 0)))
            .expect("seed event");
        store
            .seed_event(event(5, "Lunch with Sam", today(), (12, 30), (13, 30)))
            .expect("seed event");

        store
            .seed_habit(Habit::new(6, "Stretch", date(2025, 9, 1)))
            .expect("seed habit");
        store.seed_goal(Goal::new(7, "Read 12 books")).expect("seed goal");

        Arc::new(store)
    }

    fn event(id: EntityId, title: &str, on: NaiveDate, start: (u32, u32), end: (u32, u32)) -> Event {
        let mut event = Event::new(id, title);
        event.scheduled_for = Some(on);
        event.start_time = ClockTime::new(start.0, start.1);
        event.end_time = ClockTime::new(end.0, end.1);
        event
    }

    /// Router reply with a decision and confidence and nothing else.
    pub fn route_reply(decision: &str, confidence: f64) -> MockReply {
        MockReply::json(json!({"decision": decision, "confidence": confidence}))
    }

    /// Proposal envelope around `operations`.
    pub fn operations_reply(operations: Vec<Value>) -> MockReply {
        MockReply::json(json!({
            "version": "3",
            "steps": [{"name": "Identify targets"}, {"name": "Propose operations"}],
            "operations": operations,
        }))
    }

    /// Valid non-repeating task create.
    pub fn create_task(title: &str) -> Value {
        json!({"kind": "task", "action": "create", "title": title, "recurrence": {"type": "none"}})
    }

    /// Mock answering router prompts with `route` and everything else from
    /// the queue (then `"{}"`).
    pub fn scripted_provider(route: MockReply) -> Arc<MockCompletionProvider> {
        let provider = Arc::new(MockCompletionProvider::new());
        provider.on_prompt_containing(prompts::ROUTER, route);
        provider
    }

    /// Registry serving `provider` for both roles.
    pub fn registry(provider: Arc<MockCompletionProvider>) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::single(provider))
    }

    /// Prompts sent to `provider` that contain `marker`.
    pub fn prompts_with(provider: &MockCompletionProvider, marker: &str) -> usize {
        provider
            .prompts()
            .iter()
            .filter(|(_, prompt)| prompt.contains(marker))
            .count()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for AGENDA values.

    use super::*;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;
    use serde_json::json;

    /// Dates between 2020-01-01 and roughly the end of 2030.
    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        let base = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid base date");
        (0i64..4000).prop_map(move |offset| base + Duration::days(offset))
    }

    pub fn arb_clock_time() -> impl Strategy<Value = ClockTime> {
        (0u32..24, 0u32..60).prop_filter_map("valid time", |(h, m)| ClockTime::new(h, m))
    }

    /// Repeating rule, optionally bounded by `until`.
    pub fn arb_repeating_rule() -> impl Strategy<Value = RecurrenceRule> {
        let base = prop_oneof![
            Just(RecurrenceRule::daily()),
            Just(RecurrenceRule::weekdays()),
            Just(RecurrenceRule::weekly()),
            (1i64..30).prop_map(RecurrenceRule::every_n_days),
        ];
        (base, proptest::option::of(arb_date())).prop_map(|(rule, until)| match until {
            Some(u) => rule.with_until(u),
            None => rule,
        })
    }

    pub fn arb_rule() -> impl Strategy<Value = RecurrenceRule> {
        prop_oneof![Just(RecurrenceRule::none()), arb_repeating_rule()]
    }

    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,30}"
    }

    pub fn arb_context_tag() -> impl Strategy<Value = ContextTag> {
        prop_oneof![
            Just(ContextTag::School),
            Just(ContextTag::Personal),
            Just(ContextTag::Work),
        ]
    }

    /// Task create draft that always validates.
    pub fn arb_task_create() -> impl Strategy<Value = OperationDraft> {
        (arb_title(), arb_date(), arb_rule()).prop_map(|(title, on, rule)| {
            OperationDraft::new("task", "create")
                .with("title", title)
                .with("scheduledFor", on.format("%Y-%m-%d").to_string())
                .with("recurrence", json!(rule))
        })
    }

    /// Draft over a small id space, some valid, some not.
    pub fn arb_draft() -> impl Strategy<Value = OperationDraft> {
        prop_oneof![
            arb_task_create(),
            (1i64..10).prop_map(|id| OperationDraft::new("task", "delete").with("id", id)),
            (1i64..10, arb_title())
                .prop_map(|(id, t)| OperationDraft::new("event", "update").with("id", id).with("title", t)),
            arb_title().prop_map(|t| OperationDraft::new("task", "create").with("title", t)),
            Just(OperationDraft::new("note", "create")),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for AGENDA-specific checks.

    use super::*;
    use agenda_ops::Verdict;

    /// Assert that a result is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &AgendaResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a result is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &AgendaResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a result is a storage not-found error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &AgendaResult<T>) {
        match result {
            Err(AgendaError::Storage(agenda_core::StorageError::NotFound { .. })) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that a verdict passed.
    #[track_caller]
    pub fn assert_valid(verdict: &Verdict) {
        assert!(
            verdict.is_valid(),
            "Expected valid draft, got {:?} for {:?}",
            verdict.result.errors,
            verdict.draft
        );
    }

    /// Assert that a verdict failed with exactly `codes`, in order.
    #[track_caller]
    pub fn assert_codes(verdict: &Verdict, codes: &[ErrorCode]) {
        assert!(!verdict.is_valid(), "Expected invalid draft: {:?}", verdict.draft);
        assert_eq!(verdict.result.errors, codes, "Unexpected codes for {:?}", verdict.draft);
    }

    /// Assert that a verdict failed with `code` among its errors.
    #[track_caller]
    pub fn assert_has_code(verdict: &Verdict, code: ErrorCode) {
        assert!(
            verdict.result.errors.contains(&code),
            "Expected {} in {:?}",
            code.as_str(),
            verdict.result.errors
        );
    }
}
