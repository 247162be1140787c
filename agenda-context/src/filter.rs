//! The `where` selector shared by the router and the context builder.

use agenda_core::time::{format_ymd, parse_ymd};
use agenda_core::{ContextTag, EntityId, EntityKind, ItemStatus, Schedulable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inclusive date window; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl ScheduledRange {
    pub fn day(date: NaiveDate) -> Self {
        Self {
            from: Some(date),
            to: Some(date),
        }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| from <= date) && self.to.map_or(true, |to| date <= to)
    }
}

/// Record selector. Every provided predicate must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Where {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_range: Option<ScheduledRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overdue: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeating: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<EntityKind>,
}

impl Where {
    pub fn ids(ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title_contains: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn range(range: ScheduledRange) -> Self {
        Self {
            scheduled_range: Some(range),
            ..Self::default()
        }
    }

    /// Whether no predicate is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Lenient parse of a model- or client-supplied selector.
    ///
    /// A bare string becomes `title_contains`. Unknown fields and values
    /// that do not parse are ignored rather than rejected. `id` and `kind`
    /// are accepted as singular forms of `ids` and `kinds`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) if !s.trim().is_empty() => Self::title(s.trim()),
            Value::Object(map) => {
                let mut out = Self::default();
                for key in ["ids", "id"] {
                    if let Some(raw) = map.get(key) {
                        out.ids.extend(id_list(raw));
                    }
                }
                out.ids.sort_unstable();
                out.ids.dedup();
                out.title_contains = map
                    .get("title_contains")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                out.scheduled_range = map.get("scheduled_range").and_then(|r| {
                    let range = ScheduledRange {
                        from: r.get("from").and_then(Value::as_str).and_then(parse_ymd),
                        to: r.get("to").and_then(Value::as_str).and_then(parse_ymd),
                    };
                    (range.from.is_some() || range.to.is_some()).then_some(range)
                });
                out.overdue = map.get("overdue").and_then(Value::as_bool);
                out.completed = map.get("completed").and_then(Value::as_bool);
                out.repeating = map.get("repeating").and_then(Value::as_bool);
                out.status = map
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(|s| ItemStatus::from_wire(s).ok());
                out.context = map
                    .get("context")
                    .and_then(Value::as_str)
                    .and_then(|s| ContextTag::from_wire(s).ok());
                for key in ["kinds", "kind"] {
                    match map.get(key) {
                        Some(Value::String(s)) => out.kinds.extend(EntityKind::from_wire(s).ok()),
                        Some(Value::Array(items)) => out.kinds.extend(
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .filter_map(|s| EntityKind::from_wire(s).ok()),
                        ),
                        _ => {}
                    }
                }
                out.kinds.sort();
                out.kinds.dedup();
                out
            }
            _ => Self::default(),
        }
    }

    /// Canonical JSON form (used for fingerprints and prompts).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Whether entities of `kind` can pass this selector at all.
    pub fn includes_kind(&self, kind: EntityKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    /// Whether `item` satisfies every provided predicate.
    ///
    /// Overdue means unfinished and anchored strictly before `today`.
    pub fn admits<S: Schedulable + ?Sized>(&self, item: &S, today: NaiveDate) -> bool {
        if !self.includes_kind(item.kind()) {
            return false;
        }
        if !self.ids.is_empty() && !self.ids.contains(&item.master_id()) {
            return false;
        }
        if let Some(needle) = &self.title_contains {
            if !item.title().to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(overdue) = self.overdue {
            if is_overdue(item, today) != overdue {
                return false;
            }
        }
        if let Some(range) = &self.scheduled_range {
            match item.anchor() {
                Some(date) if range.contains(date) => {}
                _ => return false,
            }
        }
        if self.completed.is_some_and(|c| item.is_done() != c) {
            return false;
        }
        if self.status.is_some_and(|s| item.master_status() != s) {
            return false;
        }
        if self.context.is_some() && item.context() != self.context {
            return false;
        }
        if self.repeating.is_some_and(|r| item.is_repeating() != r) {
            return false;
        }
        true
    }

    /// Title and id predicates only; used for goals, which have no calendar fields.
    pub fn admits_titled(&self, id: EntityId, title: &str) -> bool {
        (self.ids.is_empty() || self.ids.contains(&id))
            && self
                .title_contains
                .as_ref()
                .map_or(true, |needle| title.to_lowercase().contains(&needle.to_lowercase()))
    }

    /// Short human label, e.g. for logs.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.ids.is_empty() {
            parts.push(format!("ids={:?}", self.ids));
        }
        if let Some(t) = &self.title_contains {
            parts.push(format!("title~{}", t));
        }
        if let Some(r) = &self.scheduled_range {
            let fmt = |d: Option<NaiveDate>| d.map(format_ymd).unwrap_or_else(|| "*".to_string());
            parts.push(format!("range={}..{}", fmt(r.from), fmt(r.to)));
        }
        if let Some(o) = self.overdue {
            parts.push(format!("overdue={}", o));
        }
        if parts.is_empty() {
            "all".to_string()
        } else {
            parts.join(" ")
        }
    }
}

fn id_list(raw: &Value) -> Vec<EntityId> {
    let one = |v: &Value| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    };
    match raw {
        Value::Array(items) => items.iter().filter_map(one).filter(|id| *id > 0).collect(),
        other => one(other).filter(|id| *id > 0).into_iter().collect(),
    }
}

/// Unfinished and anchored strictly before `today`.
pub fn is_overdue<S: Schedulable + ?Sized>(item: &S, today: NaiveDate) -> bool {
    !item.is_done() && item.anchor().is_some_and(|date| date < today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_core::{RecurrenceRule, Task};
    use serde_json::json;

    fn day(s: &str) -> NaiveDate {
        parse_ymd(s).unwrap()
    }

    fn task(id: EntityId, title: &str, date: Option<&str>) -> Task {
        let mut t = Task::new(id, title);
        t.scheduled_for = date.map(day);
        t
    }

    #[test]
    fn test_bare_string_becomes_title_contains() {
        let w = Where::from_value(&json!("  groceries "));
        assert_eq!(w.title_contains.as_deref(), Some("groceries"));
        assert!(Where::from_value(&json!("   ")).is_empty());
        assert!(Where::from_value(&Value::Null).is_empty());
    }

    #[test]
    fn test_lenient_object_parse() {
        let w = Where::from_value(&json!({
            "ids": [3, "#7", "x", -1],
            "kind": "todo",
            "scheduled_range": {"from": "2025-09-14", "to": "bad"},
            "status": "pending",
            "context": "nowhere"
        }));
        assert_eq!(w.ids, vec![3, 7]);
        assert_eq!(w.kinds, vec![EntityKind::Task]);
        assert_eq!(w.scheduled_range.unwrap().from, Some(day("2025-09-14")));
        assert_eq!(w.scheduled_range.unwrap().to, None);
        assert_eq!(w.status, Some(ItemStatus::Pending));
        assert_eq!(w.context, None);
    }

    #[test]
    fn test_ids_merged_sorted_and_unique() {
        let w = Where::from_value(&json!({"ids": [7, 3, 7, "#3"], "id": 5}));
        assert_eq!(w.ids, vec![3, 5, 7]);
    }

    #[test]
    fn test_overdue_is_relative_to_today() {
        let today = day("2025-09-16");
        let w = Where {
            overdue: Some(true),
            ..Where::default()
        };
        assert!(w.admits(&task(1, "late", Some("2025-09-15")), today));
        assert!(!w.admits(&task(2, "today", Some("2025-09-16")), today));
        assert!(!w.admits(&task(3, "unscheduled", None), today));

        let mut done = task(4, "done", Some("2025-09-01"));
        done.status = ItemStatus::Completed;
        assert!(!w.admits(&done, today));
    }

    #[test]
    fn test_predicates_intersect() {
        let today = day("2025-09-16");
        let mut repeating = task(1, "Gym session", Some("2025-09-16"));
        repeating.recurrence = RecurrenceRule::daily();
        let w = Where {
            title_contains: Some("GYM".to_string()),
            repeating: Some(true),
            scheduled_range: Some(ScheduledRange::day(today)),
            ..Where::default()
        };
        assert!(w.admits(&repeating, today));
        assert!(!w.admits(&task(2, "Gym session", Some("2025-09-16")), today));
        assert!(!w.admits(&task(3, "Gym", None), today));
    }

    #[test]
    fn test_kinds_exclude_other_kinds() {
        let w = Where {
            kinds: vec![EntityKind::Event],
            ..Where::default()
        };
        assert!(!w.admits(&task(1, "x", None), day("2025-09-16")));
        assert!(w.includes_kind(EntityKind::Event));
    }

    #[test]
    fn test_serialized_where_skips_unset_fields() {
        assert_eq!(Where::ids([5]).to_value(), json!({"ids": [5]}));
        assert_eq!(Where::default().describe(), "all");
    }
}
