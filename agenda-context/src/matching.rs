//! Fuzzy title matching against an instruction.

use agenda_core::{EntityId, EntityKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Compact reference to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRef {
    pub kind: EntityKind,
    pub id: EntityId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<NaiveDate>,
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Entities whose normalized title occurs, as whole words, in the
/// normalized instruction. Each `(kind, id)` appears once.
pub fn fuzzy_title_matches<'a, I>(instruction: &str, titles: I) -> Vec<TitleRef>
where
    I: IntoIterator<Item = &'a TitleRef>,
{
    let haystack = format!(" {} ", normalize_title(instruction));
    let mut out: Vec<TitleRef> = Vec::new();
    for candidate in titles {
        let needle = normalize_title(&candidate.title);
        if needle.is_empty() || !haystack.contains(&format!(" {} ", needle)) {
            continue;
        }
        if out
            .iter()
            .any(|seen| seen.kind == candidate.kind && seen.id == candidate.id)
        {
            continue;
        }
        out.push(candidate.clone());
    }
    out
}
