//! Greedy, recency-ordered topic clustering.
//!
//! For an accepted item, scan up to `candidate_limit` same-type items published
//! within the lookback window (newest first) and link with the first one whose
//! signature is within `max_distance`. First match wins, not the closest one.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::fingerprint::hamming_distance;
use crate::ingest::types::ItemType;
use crate::store::{ClusterLink, Store, StoreResult};

pub const DEFAULT_CLUSTER_DISTANCE: u32 = 8;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 3;
pub const DEFAULT_CANDIDATE_LIMIT: usize = 50;
pub const TOPIC_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub max_distance: u32,
    pub lookback: Duration,
    pub candidate_limit: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_CLUSTER_DISTANCE,
            lookback: Duration::days(DEFAULT_LOOKBACK_DAYS),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }
}

pub fn topic_from_title(title: &str) -> String {
    title.chars().take(TOPIC_MAX_CHARS).collect()
}

/// Link `item_id` to the first matching candidate. `None` when nothing matched.
pub async fn assign_cluster(
    store: &dyn Store,
    params: &ClusterParams,
    item_id: Uuid,
    simhash: &str,
    item_type: ItemType,
    now: DateTime<Utc>,
) -> StoreResult<Option<ClusterLink>> {
    let since = now - params.lookback;
    let candidates = store
        .find_cluster_candidates(item_type, since, item_id, params.candidate_limit)
        .await?;

    let Some(hit) = candidates
        .iter()
        .find(|c| !c.simhash.is_empty() && hamming_distance(simhash, &c.simhash) <= params.max_distance)
    else {
        return Ok(None);
    };

    let link = store
        .link_cluster(item_id, hit.id, &topic_from_title(&hit.title))
        .await?;
    tracing::debug!(item = %item_id, candidate = %hit.id, item_type = item_type.as_str(), link = ?link, "cluster link");
    Ok(Some(link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ItemFields, MemoryStore};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
    }

    fn sig(ones: usize) -> String {
        format!("{}{}", "1".repeat(ones), "0".repeat(64 - ones))
    }

    fn fields(title: &str, item_type: ItemType, published_at: DateTime<Utc>, simhash: String) -> ItemFields {
        ItemFields {
            url: format!("https://example.com/{}", title.replace(' ', "-")),
            title: title.into(),
            summary: None,
            content: None,
            image_url: None,
            source_name: "Example".into(),
            source_domain: "example.com".into(),
            source_credibility: 60.0,
            item_type,
            tags: vec![],
            published_at,
            day_key: String::new(),
            simhash: Some(simhash),
        }
    }

    #[tokio::test]
    async fn first_match_creates_cluster_with_candidate_as_representative() {
        let store = MemoryStore::new();
        let a = store
            .create_item("a", fields("A long headline", ItemType::News, t0() - Duration::hours(2), sig(0)))
            .await
            .unwrap();
        let b = store
            .create_item("b", fields("B", ItemType::News, t0(), sig(8)))
            .await
            .unwrap();

        let link = assign_cluster(&store, &ClusterParams::default(), b.id, &sig(8), ItemType::News, t0())
            .await
            .unwrap()
            .expect("within distance 8");
        let ClusterLink::Created(cid) = link else {
            panic!("expected Created, got {link:?}");
        };
        let clusters = store.clusters();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].topic, "A long headline");
        assert_eq!(clusters[0].representative_item_id, a.id);
        assert_eq!(store.get_item(a.id).await.unwrap().unwrap().cluster_id, Some(cid));
        assert_eq!(store.get_item(b.id).await.unwrap().unwrap().cluster_id, Some(cid));
    }

    #[tokio::test]
    async fn nothing_within_distance_leaves_item_unclustered() {
        let store = MemoryStore::new();
        store
            .create_item("a", fields("A", ItemType::News, t0(), sig(0)))
            .await
            .unwrap();
        let b = store
            .create_item("b", fields("B", ItemType::News, t0(), sig(9)))
            .await
            .unwrap();
        let link = assign_cluster(&store, &ClusterParams::default(), b.id, &sig(9), ItemType::News, t0())
            .await
            .unwrap();
        assert!(link.is_none());
        assert!(store.get_item(b.id).await.unwrap().unwrap().cluster_id.is_none());
    }

    #[tokio::test]
    async fn other_types_and_old_items_are_not_candidates() {
        let store = MemoryStore::new();
        store
            .create_item("paper", fields("P", ItemType::Paper, t0(), sig(0)))
            .await
            .unwrap();
        store
            .create_item("old", fields("O", ItemType::News, t0() - Duration::days(4), sig(0)))
            .await
            .unwrap();
        let b = store
            .create_item("b", fields("B", ItemType::News, t0(), sig(0)))
            .await
            .unwrap();
        let link = assign_cluster(&store, &ClusterParams::default(), b.id, &sig(0), ItemType::News, t0())
            .await
            .unwrap();
        assert!(link.is_none());
    }

    #[tokio::test]
    async fn most_recent_match_wins_over_closer_older_one() {
        let store = MemoryStore::new();
        // exact match but older
        let older = store
            .create_item("older", fields("Older", ItemType::News, t0() - Duration::hours(5), sig(0)))
            .await
            .unwrap();
        let c1 = store.create_cluster("older topic", older.id).await.unwrap();
        store.attach_items_to_cluster(&[older.id], c1.id).await.unwrap();
        // distance 7 but newer
        let newer = store
            .create_item("newer", fields("Newer", ItemType::News, t0() - Duration::hours(1), sig(7)))
            .await
            .unwrap();
        let me = store
            .create_item("me", fields("Me", ItemType::News, t0(), sig(0)))
            .await
            .unwrap();

        let link = assign_cluster(&store, &ClusterParams::default(), me.id, &sig(0), ItemType::News, t0())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(link, ClusterLink::Created(_)));
        let newer_cluster = store.get_item(newer.id).await.unwrap().unwrap().cluster_id;
        assert_eq!(newer_cluster, Some(link.cluster_id()));
        assert_ne!(newer_cluster, Some(c1.id));
    }

    #[test]
    fn topic_is_truncated() {
        let long = "x".repeat(300);
        assert_eq!(topic_from_title(&long).chars().count(), TOPIC_MAX_CHARS);
    }
}
