//! Compliance filter and same-URL revision policy.
//!
//! The policy is pure: it looks at the stored item (if any) and the freshly fetched
//! one and returns what to do. The pipeline performs the resulting write.
//!
//! Order:
//! 1. blocked phrase in title/summary/content → skip (blocked)
//! 2. no stored item → insert
//! 3. stored signature within `duplicate_threshold` → skip (duplicate)
//! 4. changed AND newer → revise, otherwise skip (stale)

use chrono::{DateTime, Utc};

use crate::fingerprint::hamming_distance;
use crate::ingest::types::NormalizedItem;
use crate::store::Item;

pub const DEFAULT_DUPLICATE_THRESHOLD: u32 = 5;
/// Content length delta (in characters) that counts as a material change.
pub const CONTENT_DELTA_CHARS: usize = 20;
/// Prefix of title+summary compared for changes and fed to the simhash.
pub const COMPARE_TEXT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Blocked,
    Duplicate,
    Stale,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Blocked => "blocked",
            SkipReason::Duplicate => "duplicate",
            SkipReason::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Insert,
    /// Overwrite the stored item decided against this revision.
    Revise { expected_revision: u32 },
    Skip(SkipReason),
}

/// Case-insensitive substring blocklist.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    phrases: Vec<String>,
}

impl BlockList {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, text: Option<&str>) -> bool {
        let Some(text) = text else { return false };
        if self.phrases.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    pub fn blocks(&self, item: &NormalizedItem) -> bool {
        self.matches(Some(&item.title))
            || self.matches(item.summary.as_deref())
            || self.matches(item.content.as_deref())
    }
}

/// `title summary`, cut to the first `COMPARE_TEXT_CHARS` characters.
pub fn comparison_text(title: &str, summary: Option<&str>) -> String {
    format!("{} {}", title, summary.unwrap_or_default())
        .chars()
        .take(COMPARE_TEXT_CHARS)
        .collect()
}

fn content_len(content: Option<&str>) -> usize {
    content.map(|c| c.chars().count()).unwrap_or(0)
}

/// Title/summary text differs, or content length moved by more than the delta.
pub fn is_changed(existing: &Item, incoming: &NormalizedItem) -> bool {
    let before = comparison_text(&existing.fields.title, existing.fields.summary.as_deref());
    let after = comparison_text(&incoming.title, incoming.summary.as_deref());
    let delta = content_len(existing.fields.content.as_deref())
        .abs_diff(content_len(incoming.content.as_deref()));
    before != after || delta > CONTENT_DELTA_CHARS
}

/// Strictly later publication; a missing side counts as newer.
pub fn is_newer(existing: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    match (existing, incoming) {
        (Some(old), Some(new)) => new > old,
        _ => true,
    }
}

/// Revision policy for an incoming item that is not blocked.
pub fn decide(
    existing: Option<&Item>,
    incoming: &NormalizedItem,
    incoming_simhash: &str,
    duplicate_threshold: u32,
) -> Verdict {
    let Some(existing) = existing else {
        return Verdict::Insert;
    };

    if let Some(stored) = existing.fields.simhash.as_deref() {
        if hamming_distance(stored, incoming_simhash) <= duplicate_threshold {
            return Verdict::Skip(SkipReason::Duplicate);
        }
    }

    let changed = is_changed(existing, incoming);
    let newer = is_newer(Some(existing.fields.published_at), Some(incoming.published_at));
    if changed && newer {
        Verdict::Revise {
            expected_revision: existing.revision,
        }
    } else {
        Verdict::Skip(SkipReason::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::simhash64;
    use crate::ingest::types::ItemType;
    use crate::store::ItemFields;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn incoming(title: &str, content: &str, published_at: DateTime<Utc>) -> NormalizedItem {
        NormalizedItem {
            url: "https://example.com/a".into(),
            title: title.into(),
            summary: Some("summary".into()),
            content: Some(content.into()),
            image_url: None,
            published_at,
            item_type: ItemType::News,
            source_name: "Example".into(),
            source_domain: "example.com".into(),
            source_credibility: 80.0,
            tags: vec![],
        }
    }

    fn stored(n: &NormalizedItem, simhash: Option<String>) -> Item {
        Item {
            id: Uuid::new_v4(),
            url_hash: "h".into(),
            fields: ItemFields {
                url: n.url.clone(),
                title: n.title.clone(),
                summary: n.summary.clone(),
                content: n.content.clone(),
                image_url: None,
                source_name: n.source_name.clone(),
                source_domain: n.source_domain.clone(),
                source_credibility: n.source_credibility,
                item_type: n.item_type,
                tags: vec![],
                published_at: n.published_at,
                day_key: "2025-03-01".into(),
                simhash,
            },
            score: 0.0,
            cluster_id: None,
            revision: 3,
            disabled: false,
            social_likes: 0,
            social_comments: 0,
            social_views: 0,
        }
    }

    #[test]
    fn blocklist_is_case_insensitive_and_covers_all_text_fields() {
        let bl = BlockList::new(&[" Do Not Repost ", " ", "禁止转载"]);
        let mut n = incoming("Fine title", "body", t0());
        assert!(!bl.blocks(&n));
        n.content = Some("… do not REPOST this …".into());
        assert!(bl.blocks(&n));
        n.content = None;
        n.title = "本文禁止转载".into();
        assert!(bl.blocks(&n));
        assert!(!BlockList::default().blocks(&n));
    }

    #[test]
    fn unseen_url_is_inserted() {
        let n = incoming("Model X launched", "body", t0());
        assert_eq!(decide(None, &n, &simhash64(&n.title), 5), Verdict::Insert);
    }

    #[test]
    fn near_identical_signature_is_duplicate() {
        let n = incoming("Model X launched", "body", t0());
        let sig = simhash64(&comparison_text(&n.title, n.summary.as_deref()));
        let existing = stored(&n, Some(sig.clone()));
        let mut later = n.clone();
        later.published_at = t0() + Duration::hours(3);
        later.content = Some("x".repeat(500));
        assert_eq!(decide(Some(&existing), &later, &sig, 5), Verdict::Skip(SkipReason::Duplicate));
    }

    #[test]
    fn changed_and_newer_is_a_revision() {
        let old = incoming("Model X launched", "body", t0());
        let existing = stored(&old, Some("0".repeat(64)));
        let new = incoming("Model X launched with new feature", "body", t0() + Duration::hours(1));
        assert_eq!(
            decide(Some(&existing), &new, &"1".repeat(64), 5),
            Verdict::Revise { expected_revision: 3 }
        );
    }

    #[test]
    fn changed_but_older_is_stale() {
        let old = incoming("Model X launched", "body", t0());
        let existing = stored(&old, None);
        let new = incoming("Model X relaunched", "body", t0() - Duration::hours(1));
        assert_eq!(decide(Some(&existing), &new, &"1".repeat(64), 5), Verdict::Skip(SkipReason::Stale));
    }

    #[test]
    fn small_content_change_is_not_a_change() {
        let old = incoming("Same", &"a".repeat(100), t0());
        let existing = stored(&old, None);
        let mut new = old.clone();
        new.published_at = t0() + Duration::hours(2);
        new.content = Some("a".repeat(120));
        assert!(!is_changed(&existing, &new));
        new.content = Some("a".repeat(121));
        assert!(is_changed(&existing, &new));
    }

    #[test]
    fn missing_timestamp_counts_as_newer() {
        assert!(is_newer(None, Some(t0())));
        assert!(is_newer(Some(t0()), None));
        assert!(!is_newer(Some(t0()), Some(t0())));
    }
}
