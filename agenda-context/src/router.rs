//! Router context: a cheap whole-dataset snapshot that stays small no
//! matter how many items the user has.

use crate::focused::{sort_schedulable, title_ref, Dataset};
use crate::matching::TitleRef;
use agenda_core::recurrence::{expand, matches};
use agenda_core::time::{format_ymd, week_range};
use agenda_core::{Occurrence, Schedulable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Items shown per kind in today's list.
const TODAY_PER_KIND: usize = 10;
/// Titles shown per kind in the week window.
const WEEK_TITLES_PER_KIND: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodaySnapshot {
    pub tasks: Vec<Occurrence>,
    pub events: Vec<Occurrence>,
}

/// Sunday-Saturday window around today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSnapshot {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub task_count: usize,
    pub event_count: usize,
    pub tasks: Vec<TitleRef>,
    pub events: Vec<TitleRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterContext {
    pub today: NaiveDate,
    pub timezone: String,
    pub today_items: TodaySnapshot,
    pub week: WeekSnapshot,
    /// Unscheduled pending tasks, oldest id first
    pub backlog: Vec<TitleRef>,
}

/// Occurrences of `item` on `date`, including a one-off anchored there.
fn on_day<S: Schedulable>(item: &S, date: NaiveDate) -> Option<Occurrence> {
    if item.is_repeating() {
        return expand(item, date, date).into_iter().next();
    }
    (item.anchor() == Some(date)).then(|| Occurrence {
        id: format!("{}@{}", item.master_id(), format_ymd(date)),
        master_id: item.master_id(),
        kind: item.kind(),
        title: item.title().to_string(),
        scheduled_for: date,
        time: item.time_label(),
        status: item.master_status(),
    })
}

/// Unfinished and touching `[from, to]`, either by anchor or by a
/// recurrence match inside the window.
fn in_window<S: Schedulable>(item: &S, from: NaiveDate, to: NaiveDate) -> bool {
    if item.is_done() {
        return false;
    }
    let Some(anchor) = item.anchor() else {
        return false;
    };
    if (from..=to).contains(&anchor) {
        return true;
    }
    item.is_repeating()
        && from
            .iter_days()
            .take_while(|d| *d <= to)
            .any(|d| matches(d, anchor, item.recurrence()))
}

fn today_list<S: Schedulable>(items: &[S], today: NaiveDate) -> Vec<Occurrence> {
    let mut out: Vec<Occurrence> = items.iter().filter_map(|i| on_day(i, today)).collect();
    out.sort_by(|a, b| a.time.cmp(&b.time).then(a.master_id.cmp(&b.master_id)));
    out.truncate(TODAY_PER_KIND);
    out
}

fn week_list<S: Schedulable>(items: &[S], from: NaiveDate, to: NaiveDate) -> (usize, Vec<TitleRef>) {
    let hits: Vec<TitleRef> = items
        .iter()
        .filter(|i| in_window(*i, from, to))
        .map(title_ref)
        .collect();
    let count = hits.len();
    (count, hits.into_iter().take(WEEK_TITLES_PER_KIND).collect())
}

impl RouterContext {
    /// Project a dataset onto today, this week and the backlog. Pure.
    pub fn assemble(data: Dataset, today: NaiveDate, timezone: &str, backlog_sample: usize) -> Self {
        let Dataset {
            mut tasks,
            mut events,
            ..
        } = data;
        sort_schedulable(&mut tasks);
        sort_schedulable(&mut events);

        let (from, to) = week_range(today);
        let (task_count, week_tasks) = week_list(&tasks, from, to);
        let (event_count, week_events) = week_list(&events, from, to);

        let mut backlog: Vec<TitleRef> = tasks
            .iter()
            .filter(|t| t.scheduled_for.is_none() && !t.is_done())
            .map(title_ref)
            .collect();
        backlog.sort_by_key(|t| t.id);
        backlog.truncate(backlog_sample);

        Self {
            today,
            timezone: timezone.to_string(),
            today_items: TodaySnapshot {
                tasks: today_list(&tasks, today),
                events: today_list(&events, today),
            },
            week: WeekSnapshot {
                from,
                to,
                task_count,
                event_count,
                tasks: week_tasks,
                events: week_events,
            },
            backlog,
        }
    }

    /// Every title the router can see, for fuzzy matching.
    pub fn titles(&self) -> Vec<TitleRef> {
        let today = self
            .today_items
            .tasks
            .iter()
            .chain(self.today_items.events.iter())
            .map(|o| TitleRef {
                kind: o.kind,
                id: o.master_id,
                title: o.title.clone(),
                scheduled_for: Some(o.scheduled_for),
            });
        let mut out: Vec<TitleRef> = today.collect();
        out.extend(self.week.tasks.iter().cloned());
        out.extend(self.week.events.iter().cloned());
        out.extend(self.backlog.iter().cloned());
        out
    }

    pub fn to_prompt_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_core::time::parse_ymd;
    use agenda_core::{Event, ItemStatus, RecurrenceRule, Task};

    fn day(s: &str) -> NaiveDate {
        parse_ymd(s).unwrap()
    }

    fn dataset() -> Dataset {
        let mut rent = Task::new(1, "Pay rent");
        rent.scheduled_for = Some(day("2025-09-17"));
        let mut stretch = Task::new(2, "Stretch");
        stretch.scheduled_for = Some(day("2025-09-01"));
        stretch.recurrence = RecurrenceRule::daily();
        stretch.completed_dates.insert(day("2025-09-17"));
        let mut friday = Task::new(3, "Submit report");
        friday.scheduled_for = Some(day("2025-09-19"));
        let mut done = Task::new(4, "Old chore");
        done.scheduled_for = Some(day("2025-09-16"));
        done.status = ItemStatus::Completed;
        let mut standup = Event::new(10, "Standup");
        standup.scheduled_for = Some(day("2025-09-01"));
        standup.recurrence = RecurrenceRule::weekdays();
        Dataset {
            tasks: vec![rent, stretch, friday, done, Task::new(5, "Someday"), Task::new(6, "Later")],
            events: vec![standup],
            ..Dataset::default()
        }
    }

    #[test]
    fn test_today_projects_recurrence() {
        // Wednesday
        let ctx = RouterContext::assemble(dataset(), day("2025-09-17"), "UTC", 40);
        let ids: Vec<i64> = ctx.today_items.tasks.iter().map(|o| o.master_id).collect();
        assert_eq!(ids, vec![1, 2]);
        let stretch = &ctx.today_items.tasks[1];
        assert_eq!(stretch.status, ItemStatus::Completed);
        assert_eq!(stretch.id, "2@2025-09-17");
        assert_eq!(ctx.today_items.events.len(), 1);
    }

    #[test]
    fn test_week_window_counts_unfinished() {
        let ctx = RouterContext::assemble(dataset(), day("2025-09-17"), "UTC", 40);
        assert_eq!(ctx.week.from, day("2025-09-14"));
        assert_eq!(ctx.week.to, day("2025-09-20"));
        // rent, stretch (repeating) and the Friday report; the completed chore is out
        assert_eq!(ctx.week.task_count, 3);
        assert_eq!(ctx.week.event_count, 1);
    }

    #[test]
    fn test_backlog_sample_is_capped() {
        let ctx = RouterContext::assemble(dataset(), day("2025-09-17"), "UTC", 1);
        assert_eq!(ctx.backlog.len(), 1);
        assert_eq!(ctx.backlog[0].id, 5);
    }

    #[test]
    fn test_weekend_has_no_weekday_event() {
        let ctx = RouterContext::assemble(dataset(), day("2025-09-20"), "UTC", 40);
        assert!(ctx.today_items.events.is_empty());
        assert!(ctx.titles().iter().any(|t| t.title == "Standup"));
    }
}
