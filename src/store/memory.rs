//! Process-local [`Store`] backed by hash maps behind one `RwLock`.
//!
//! Every trait call takes the lock once, so each call is atomic with respect to
//! the others; that is what the duplicate/revision/cluster guards rely on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{
    Cluster, ClusterCandidate, ClusterLink, Item, ItemFields, ItemUpdate, ScoringRow, Store,
    StoreError, StoreResult,
};
use crate::ingest::types::ItemType;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub name: String,
    pub domain: String,
    pub feed_url: Option<String>,
    pub credibility: f64,
}

#[derive(Debug, Default)]
struct Inner {
    sources: HashMap<String, SourceRecord>,
    items: HashMap<Uuid, Item>,
    by_hash: HashMap<String, Uuid>,
    clusters: HashMap<Uuid, Cluster>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    pub fn item_count(&self) -> usize {
        self.read().map(|g| g.items.len()).unwrap_or_default()
    }

    pub fn items(&self) -> Vec<Item> {
        let mut v: Vec<Item> = self
            .read()
            .map(|g| g.items.values().cloned().collect())
            .unwrap_or_default();
        v.sort_by(|a, b| b.fields.published_at.cmp(&a.fields.published_at));
        v
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        let mut v: Vec<Cluster> = self
            .read()
            .map(|g| g.clusters.values().cloned().collect())
            .unwrap_or_default();
        v.sort_by_key(|c| c.created_at);
        v
    }

    pub fn sources(&self) -> Vec<SourceRecord> {
        let mut v: Vec<SourceRecord> = self
            .read()
            .map(|g| g.sources.values().cloned().collect())
            .unwrap_or_default();
        v.sort_by(|a, b| a.domain.cmp(&b.domain));
        v
    }

    /// Social counters are owned by an outside collaborator; this is its write path.
    pub fn set_social(&self, id: Uuid, likes: u64, comments: u64, views: u64) -> StoreResult<()> {
        let mut g = self.write()?;
        let item = g
            .items
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        item.social_likes = likes;
        item.social_comments = comments;
        item.social_views = views;
        Ok(())
    }

    /// Admin-side toggle; the pipeline never sets it.
    pub fn set_disabled(&self, id: Uuid, disabled: bool) -> StoreResult<()> {
        let mut g = self.write()?;
        let item = g
            .items
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        item.disabled = disabled;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_source(
        &self,
        domain: &str,
        name: &str,
        feed_url: Option<&str>,
        credibility: f64,
    ) -> StoreResult<()> {
        let mut g = self.write()?;
        let rec = g
            .sources
            .entry(domain.to_string())
            .or_insert_with(|| SourceRecord {
                name: name.to_string(),
                domain: domain.to_string(),
                feed_url: None,
                credibility,
            });
        rec.name = name.to_string();
        rec.credibility = credibility;
        // an absent feed address never clears a stored one
        if let Some(u) = feed_url {
            rec.feed_url = Some(u.to_string());
        }
        Ok(())
    }

    async fn find_item_by_url_hash(&self, url_hash: &str) -> StoreResult<Option<Item>> {
        let g = self.read()?;
        Ok(g.by_hash.get(url_hash).and_then(|id| g.items.get(id)).cloned())
    }

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<Item>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn create_item(&self, url_hash: &str, fields: ItemFields) -> StoreResult<Item> {
        let mut g = self.write()?;
        if g.by_hash.contains_key(url_hash) {
            return Err(StoreError::DuplicateUrlHash(url_hash.to_string()));
        }
        let item = Item {
            id: Uuid::new_v4(),
            url_hash: url_hash.to_string(),
            fields,
            score: 0.0,
            cluster_id: None,
            revision: 1,
            disabled: false,
            social_likes: 0,
            social_comments: 0,
            social_views: 0,
        };
        g.by_hash.insert(item.url_hash.clone(), item.id);
        g.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_item(&self, id: Uuid, update: ItemUpdate) -> StoreResult<Item> {
        let mut g = self.write()?;
        let item = g
            .items
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        match update {
            ItemUpdate::Revise {
                fields,
                expected_revision,
            } => {
                if item.revision != expected_revision {
                    return Err(StoreError::RevisionConflict {
                        expected: expected_revision,
                        actual: item.revision,
                    });
                }
                item.fields = *fields;
                item.revision += 1;
            }
            ItemUpdate::Score(score) => item.score = score,
        }
        Ok(item.clone())
    }

    async fn find_cluster_candidates(
        &self,
        item_type: ItemType,
        since: DateTime<Utc>,
        exclude_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ClusterCandidate>> {
        let g = self.read()?;
        let mut rows: Vec<&Item> = g
            .items
            .values()
            .filter(|it| {
                it.id != exclude_id
                    && it.fields.item_type == item_type
                    && it.fields.published_at >= since
                    && it.fields.simhash.is_some()
            })
            .collect();
        rows.sort_by(|a, b| b.fields.published_at.cmp(&a.fields.published_at));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|it| ClusterCandidate {
                id: it.id,
                simhash: it.fields.simhash.clone().unwrap_or_default(),
                cluster_id: it.cluster_id,
                title: it.fields.title.clone(),
            })
            .collect())
    }

    async fn create_cluster(&self, topic: &str, representative_item_id: Uuid) -> StoreResult<Cluster> {
        let mut g = self.write()?;
        if !g.items.contains_key(&representative_item_id) {
            return Err(StoreError::NotFound(representative_item_id.to_string()));
        }
        let cluster = Cluster {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            representative_item_id,
            created_at: Utc::now(),
        };
        g.clusters.insert(cluster.id, cluster.clone());
        Ok(cluster)
    }

    async fn attach_items_to_cluster(&self, item_ids: &[Uuid], cluster_id: Uuid) -> StoreResult<usize> {
        let mut g = self.write()?;
        if !g.clusters.contains_key(&cluster_id) {
            return Err(StoreError::NotFound(cluster_id.to_string()));
        }
        let mut changed = 0;
        for id in item_ids {
            if let Some(it) = g.items.get_mut(id) {
                if it.cluster_id.is_none() {
                    it.cluster_id = Some(cluster_id);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn link_cluster(&self, item_id: Uuid, candidate_id: Uuid, topic: &str) -> StoreResult<ClusterLink> {
        let mut g = self.write()?;
        let item_cluster = g
            .items
            .get(&item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?
            .cluster_id;
        if let Some(existing) = item_cluster {
            return Ok(ClusterLink::AlreadyClustered(existing));
        }
        let candidate_cluster = g
            .items
            .get(&candidate_id)
            .ok_or_else(|| StoreError::NotFound(candidate_id.to_string()))?
            .cluster_id;

        let link = match candidate_cluster {
            Some(cid) => ClusterLink::Joined(cid),
            None => {
                let cluster = Cluster {
                    id: Uuid::new_v4(),
                    topic: topic.to_string(),
                    representative_item_id: candidate_id,
                    created_at: Utc::now(),
                };
                let cid = cluster.id;
                g.clusters.insert(cid, cluster);
                if let Some(c) = g.items.get_mut(&candidate_id) {
                    c.cluster_id = Some(cid);
                }
                ClusterLink::Created(cid)
            }
        };
        if let Some(it) = g.items.get_mut(&item_id) {
            it.cluster_id = Some(link.cluster_id());
        }
        Ok(link)
    }

    async fn find_recent_items(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<ScoringRow>> {
        let g = self.read()?;
        let mut rows: Vec<&Item> = g
            .items
            .values()
            .filter(|it| it.fields.published_at >= since)
            .collect();
        rows.sort_by(|a, b| b.fields.published_at.cmp(&a.fields.published_at));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|it| ScoringRow {
                id: it.id,
                published_at: it.fields.published_at,
                source_credibility: it.fields.source_credibility,
                title: it.fields.title.clone(),
                summary: it.fields.summary.clone(),
                social_likes: it.social_likes,
                social_comments: it.social_comments,
                social_views: it.social_views,
            })
            .collect())
    }
}
