//! Recurrence Engine
//!
//! Pure functions over calendar dates: rule validation, the date-matching
//! predicate, and occurrence expansion over a window. Occurrences are never
//! persisted; the only stored state is the set of completed/skipped dates on
//! the master entity.

use crate::entities::Schedulable;
use crate::time::{days_between, format_ymd, parse_ymd};
use crate::{EntityKind, ItemStatus};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Maximum look-ahead for `next_occurrence`.
const NEXT_OCCURRENCE_HORIZON_DAYS: i64 = 366;

// ============================================================================
// RULE TYPES
// ============================================================================

/// The five supported repetition patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    #[default]
    None,
    Daily,
    Weekdays,
    Weekly,
    EveryNDays,
}

impl RecurrenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::None => "none",
            RecurrenceType::Daily => "daily",
            RecurrenceType::Weekdays => "weekdays",
            RecurrenceType::Weekly => "weekly",
            RecurrenceType::EveryNDays => "every_n_days",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "none" => Some(RecurrenceType::None),
            "daily" => Some(RecurrenceType::Daily),
            "weekdays" => Some(RecurrenceType::Weekdays),
            "weekly" => Some(RecurrenceType::Weekly),
            "every_n_days" => Some(RecurrenceType::EveryNDays),
            _ => None,
        }
    }
}

/// A repetition rule anchored on the owning entity's `scheduledFor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    /// Step in days, required iff `kind` is `EveryNDays`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<i64>,
    /// Last date (inclusive) an occurrence may fall on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// Non-repeating rule (`{"type":"none"}`).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn daily() -> Self {
        Self::of(RecurrenceType::Daily)
    }

    pub fn weekly() -> Self {
        Self::of(RecurrenceType::Weekly)
    }

    pub fn weekdays() -> Self {
        Self::of(RecurrenceType::Weekdays)
    }

    pub fn every_n_days(n: i64) -> Self {
        Self {
            kind: RecurrenceType::EveryNDays,
            interval_days: Some(n),
            until: None,
        }
    }

    fn of(kind: RecurrenceType) -> Self {
        Self {
            kind,
            interval_days: None,
            until: None,
        }
    }

    /// Builder: set the inclusive end date.
    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_repeating(&self) -> bool {
        self.kind != RecurrenceType::None
    }

    /// Parse a loosely-typed JSON rule as produced by a model.
    ///
    /// Returns `None` for anything `is_valid_rule` would reject, including an
    /// unknown `type`, a non-integer or non-positive `intervalDays` on an
    /// `every_n_days` rule, and a malformed `until`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let kind = RecurrenceType::from_wire(obj.get("type")?.as_str()?)?;

        let interval_days = match obj.get("intervalDays") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(v.as_i64()?),
        };

        let until = match obj.get("until") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(parse_ymd(v.as_str()?)?),
        };

        let rule = Self {
            kind,
            interval_days: if kind == RecurrenceType::EveryNDays {
                interval_days
            } else {
                None
            },
            until,
        };
        is_valid_rule(&rule).then_some(rule)
    }
}

// ============================================================================
// RULE OPERATIONS
// ============================================================================

/// Check structural validity of a rule.
///
/// `until` is not compared with any anchor here.
pub fn is_valid_rule(rule: &RecurrenceRule) -> bool {
    match rule.kind {
        RecurrenceType::EveryNDays => matches!(rule.interval_days, Some(n) if n >= 1),
        _ => true,
    }
}

/// Does `rule`, anchored at `anchor`, produce an occurrence on `candidate`?
///
/// Dates before the anchor or after `until` never match.
pub fn matches(candidate: NaiveDate, anchor: NaiveDate, rule: &RecurrenceRule) -> bool {
    let diff = days_between(anchor, candidate);
    if diff < 0 {
        return false;
    }
    if let Some(until) = rule.until {
        if candidate > until {
            return false;
        }
    }
    match rule.kind {
        RecurrenceType::None => false,
        RecurrenceType::Daily => true,
        RecurrenceType::Weekdays => !matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun),
        RecurrenceType::Weekly => diff % 7 == 0,
        RecurrenceType::EveryNDays => match rule.interval_days {
            Some(step) if step >= 1 => diff % step == 0,
            _ => false,
        },
    }
}

/// One concrete calendar-date instance of a recurring entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// `{masterId}@{YYYY-MM-DD}`
    pub id: String,
    pub master_id: i64,
    pub kind: EntityKind,
    pub title: String,
    pub scheduled_for: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub status: ItemStatus,
}

/// Expand a recurring entity into occurrences within `[from, to]` inclusive.
///
/// Empty when the entity has no anchor or its rule is `none`.
pub fn expand<S: Schedulable + ?Sized>(
    entity: &S,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<Occurrence> {
    let rule = entity.recurrence();
    let anchor = match entity.anchor() {
        Some(anchor) if rule.is_repeating() => anchor,
        _ => return Vec::new(),
    };

    let end = match rule.until {
        Some(until) => to.min(until),
        None => to,
    };

    let mut out = Vec::new();
    let mut date = from.max(anchor);
    while date <= end {
        if matches(date, anchor, rule) {
            out.push(Occurrence {
                id: format!("{}@{}", entity.master_id(), format_ymd(date)),
                master_id: entity.master_id(),
                kind: entity.kind(),
                title: entity.title().to_string(),
                scheduled_for: date,
                time: entity.time_label(),
                status: entity.status_on(date),
            });
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    out
}

/// First matching date strictly after `after`, within a one-year horizon.
pub fn next_occurrence(
    anchor: NaiveDate,
    rule: &RecurrenceRule,
    after: NaiveDate,
) -> Option<NaiveDate> {
    if !rule.is_repeating() {
        return None;
    }
    let mut date = after.max(anchor.pred_opt()?).succ_opt()?;
    for _ in 0..NEXT_OCCURRENCE_HORIZON_DAYS {
        if rule.until.is_some_and(|until| date > until) {
            return None;
        }
        if matches(date, anchor, rule) {
            return Some(date);
        }
        date = date.succ_opt()?;
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Task;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        parse_ymd(s).unwrap()
    }

    fn repeating_task(anchor: &str, rule: RecurrenceRule) -> Task {
        let mut task = Task::new(7, "Water plants");
        task.scheduled_for = Some(d(anchor));
        task.recurrence = rule;
        task
    }

    #[test]
    fn test_is_valid_rule_every_n_days_requires_positive_interval() {
        assert!(is_valid_rule(&RecurrenceRule::every_n_days(3)));
        assert!(!is_valid_rule(&RecurrenceRule::every_n_days(0)));
        assert!(!is_valid_rule(&RecurrenceRule {
            kind: RecurrenceType::EveryNDays,
            interval_days: None,
            until: None,
        }));
        assert!(is_valid_rule(&RecurrenceRule::none()));
    }

    #[test]
    fn test_from_json_validates_shape() {
        assert_eq!(
            RecurrenceRule::from_json(&json!({"type": "none"})),
            Some(RecurrenceRule::none())
        );
        assert!(RecurrenceRule::from_json(&json!({"type": "monthly"})).is_none());
        assert!(RecurrenceRule::from_json(&json!({"type": "every_n_days", "intervalDays": 2.5})).is_none());
        assert!(RecurrenceRule::from_json(&json!({"type": "every_n_days"})).is_none());
        assert!(RecurrenceRule::from_json(&json!({"type": "daily", "until": "2025-13-01"})).is_none());
        assert_eq!(
            RecurrenceRule::from_json(&json!({"type": "daily", "until": null})),
            Some(RecurrenceRule::daily())
        );
        // until earlier than any anchor is still structurally valid
        assert!(RecurrenceRule::from_json(&json!({"type": "weekly", "until": "1999-01-01"})).is_some());
    }

    #[test]
    fn test_rule_serializes_camel_case() {
        let rule = RecurrenceRule::every_n_days(2).with_until(d("2025-12-31"));
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            value,
            json!({"type": "every_n_days", "intervalDays": 2, "until": "2025-12-31"})
        );
        assert_eq!(serde_json::to_value(RecurrenceRule::none()).unwrap(), json!({"type": "none"}));
    }

    #[test]
    fn test_matches_none_never_matches() {
        assert!(!matches(d("2025-09-15"), d("2025-09-15"), &RecurrenceRule::none()));
    }

    #[test]
    fn test_matches_before_anchor_is_false() {
        assert!(!matches(d("2025-09-14"), d("2025-09-15"), &RecurrenceRule::daily()));
    }

    #[test]
    fn test_matches_weekdays() {
        let rule = RecurrenceRule::weekdays();
        let anchor = d("2025-09-15"); // Monday
        assert!(matches(d("2025-09-19"), anchor, &rule)); // Friday
        assert!(!matches(d("2025-09-20"), anchor, &rule)); // Saturday
        assert!(!matches(d("2025-09-21"), anchor, &rule)); // Sunday
        assert!(matches(d("2025-09-22"), anchor, &rule));
    }

    #[test]
    fn test_matches_weekly() {
        let rule = RecurrenceRule::weekly();
        let anchor = d("2025-09-15");
        assert!(matches(d("2025-09-22"), anchor, &rule));
        assert!(!matches(d("2025-09-23"), anchor, &rule));
    }

    #[test]
    fn test_expand_every_three_days() {
        let task = repeating_task("2025-09-15", RecurrenceRule::every_n_days(3));
        let dates: Vec<_> = expand(&task, d("2025-09-15"), d("2025-09-24"))
            .into_iter()
            .map(|o| format_ymd(o.scheduled_for))
            .collect();
        assert_eq!(dates, vec!["2025-09-15", "2025-09-18", "2025-09-21", "2025-09-24"]);
    }

    #[test]
    fn test_expand_stops_at_until() {
        let task = repeating_task(
            "2025-09-15",
            RecurrenceRule::daily().with_until(d("2025-09-17")),
        );
        let occ = expand(&task, d("2025-09-10"), d("2025-09-30"));
        assert_eq!(occ.len(), 3);
        assert_eq!(occ.last().unwrap().scheduled_for, d("2025-09-17"));
    }

    #[test]
    fn test_expand_without_anchor_is_empty() {
        let mut task = Task::new(1, "Floating");
        task.recurrence = RecurrenceRule::daily();
        assert!(expand(&task, d("2025-09-01"), d("2025-09-30")).is_empty());
    }

    #[test]
    fn test_expand_annotates_status_and_ids() {
        let mut task = repeating_task("2025-09-15", RecurrenceRule::daily());
        task.completed_dates.insert(d("2025-09-16"));
        task.skipped_dates.insert(d("2025-09-17"));
        let occ = expand(&task, d("2025-09-15"), d("2025-09-17"));
        assert_eq!(occ[0].status, ItemStatus::Pending);
        assert_eq!(occ[1].status, ItemStatus::Completed);
        assert_eq!(occ[2].status, ItemStatus::Skipped);
        assert_eq!(occ[1].id, "7@2025-09-16");
        assert_eq!(occ[1].master_id, 7);
    }

    #[test]
    fn test_next_occurrence() {
        let anchor = d("2025-09-15");
        assert_eq!(
            next_occurrence(anchor, &RecurrenceRule::weekly(), d("2025-09-15")),
            Some(d("2025-09-22"))
        );
        // Before the anchor the anchor itself is next
        assert_eq!(
            next_occurrence(anchor, &RecurrenceRule::daily(), d("2025-09-01")),
            Some(anchor)
        );
        assert_eq!(
            next_occurrence(
                anchor,
                &RecurrenceRule::daily().with_until(d("2025-09-16")),
                d("2025-09-16")
            ),
            None
        );
        assert_eq!(next_occurrence(anchor, &RecurrenceRule::none(), anchor), None);
    }
}
