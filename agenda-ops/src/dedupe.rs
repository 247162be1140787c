//! Batch deduplication.

use agenda_core::{EntityId, EntityKind, OpAction, Operation};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Fields that make two operations the same request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub kind: EntityKind,
    pub action: OpAction,
    pub id: Option<EntityId>,
    pub scheduled_for: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub title: Option<String>,
    pub status: Option<&'static str>,
    pub occurrence_date: Option<NaiveDate>,
}

impl DedupeKey {
    pub fn of(op: &Operation) -> Self {
        Self {
            kind: op.kind(),
            action: op.action(),
            id: op.id(),
            scheduled_for: op.scheduled_for(),
            start_time: op.start_time().map(|t| t.to_string()),
            title: op.title().map(str::to_string),
            status: op.status_label(),
            occurrence_date: op.occurrence_date(),
        }
    }
}

/// Keep the first operation per key, preserving order.
pub fn dedupe(ops: Vec<Operation>) -> Vec<Operation> {
    let mut seen: HashSet<DedupeKey> = HashSet::with_capacity(ops.len());
    let before = ops.len();
    let kept: Vec<Operation> = ops
        .into_iter()
        .filter(|op| seen.insert(DedupeKey::of(op)))
        .collect();
    if kept.len() < before {
        tracing::debug!(dropped = before - kept.len(), "Duplicate operations removed");
    }
    kept
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use agenda_core::{ItemStatus, StatusChange, Target};
    use proptest::prelude::*;

    fn arb_op() -> impl Strategy<Value = Operation> {
        prop_oneof![
            (1i64..4).prop_map(|id| Operation::TaskDelete(Target { id })),
            (1i64..4).prop_map(|id| Operation::GoalDelete(Target { id })),
            (1i64..4, any::<bool>()).prop_map(|(id, done)| Operation::TaskSetStatus(StatusChange {
                id,
                status: if done { ItemStatus::Completed } else { ItemStatus::Pending },
                occurrence_date: None,
            })),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_dedupe_is_idempotent(ops in proptest::collection::vec(arb_op(), 0..20)) {
            let once = dedupe(ops.clone());
            let twice = dedupe(once.clone());
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.len() <= ops.len());
            // Order of first appearances is preserved
            let mut cursor = ops.iter();
            for op in &once {
                prop_assert!(cursor.any(|o| o == op));
            }
        }
    }
}
