//! Storage boundary.
//!
//! The pipeline only talks to persistence through [`Store`]. Two guards make the
//! read-then-write sequences safe under concurrent runs:
//! - `create_item` rejects a second item for the same url hash (`DuplicateUrlHash`),
//!   and revisions carry the revision they were decided against (`RevisionConflict`).
//! - `link_cluster` performs the candidate check and attachment as one operation.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ingest::types::ItemType;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("an item with url hash {0} already exists")]
    DuplicateUrlHash(String),

    #[error("revision conflict: expected {expected}, found {actual}")]
    RevisionConflict { expected: u32, actual: u32 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Another writer won a race; re-reading and deciding again may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateUrlHash(_) | StoreError::RevisionConflict { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub url_hash: String,
    #[serde(flatten)]
    pub fields: ItemFields,
    pub score: f64,
    pub cluster_id: Option<Uuid>,
    pub revision: u32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub social_likes: u64,
    #[serde(default)]
    pub social_comments: u64,
    #[serde(default)]
    pub social_views: u64,
}

/// Content fields written on insert and overwritten on revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub source_name: String,
    pub source_domain: String,
    pub source_credibility: f64,
    pub item_type: ItemType,
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub day_key: String,
    pub simhash: Option<String>,
}

/// Field-level writes to an existing item; each variant is applied atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemUpdate {
    /// Overwrite content fields and bump revision by one, if the stored revision
    /// still equals `expected_revision`.
    Revise {
        fields: Box<ItemFields>,
        expected_revision: u32,
    },
    Score(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub topic: String,
    pub representative_item_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Projection used by the clusterer's candidate scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCandidate {
    pub id: Uuid,
    pub simhash: String,
    pub cluster_id: Option<Uuid>,
    pub title: String,
}

/// Result of an atomic cluster link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    /// Item joined the candidate's existing cluster.
    Joined(Uuid),
    /// A new cluster was created with the candidate as representative.
    Created(Uuid),
    /// Item already belonged to a cluster; nothing changed.
    AlreadyClustered(Uuid),
}

impl ClusterLink {
    pub fn cluster_id(&self) -> Uuid {
        match *self {
            ClusterLink::Joined(id) | ClusterLink::Created(id) | ClusterLink::AlreadyClustered(id) => id,
        }
    }
}

/// Projection used by recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRow {
    pub id: Uuid,
    pub published_at: DateTime<Utc>,
    pub source_credibility: f64,
    pub title: String,
    pub summary: Option<String>,
    pub social_likes: u64,
    pub social_comments: u64,
    pub social_views: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a source keyed by domain.
    async fn upsert_source(
        &self,
        domain: &str,
        name: &str,
        feed_url: Option<&str>,
        credibility: f64,
    ) -> StoreResult<()>;

    async fn find_item_by_url_hash(&self, url_hash: &str) -> StoreResult<Option<Item>>;

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<Item>>;

    /// New item with revision 1. Fails with `DuplicateUrlHash` if the hash is taken.
    async fn create_item(&self, url_hash: &str, fields: ItemFields) -> StoreResult<Item>;

    async fn update_item(&self, id: Uuid, update: ItemUpdate) -> StoreResult<Item>;

    /// Same type, published at or after `since`, not `exclude_id`, with a signature;
    /// newest first, at most `limit`.
    async fn find_cluster_candidates(
        &self,
        item_type: ItemType,
        since: DateTime<Utc>,
        exclude_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ClusterCandidate>>;

    async fn create_cluster(&self, topic: &str, representative_item_id: Uuid) -> StoreResult<Cluster>;

    /// Sets the cluster on items that have none. Returns how many changed.
    async fn attach_items_to_cluster(&self, item_ids: &[Uuid], cluster_id: Uuid) -> StoreResult<usize>;

    /// Atomically: if `item_id` is clustered, keep it; else if the candidate is
    /// clustered, join it; else create a cluster (topic, candidate as representative)
    /// and attach both.
    async fn link_cluster(&self, item_id: Uuid, candidate_id: Uuid, topic: &str) -> StoreResult<ClusterLink>;

    /// Published at or after `since`, newest first, at most `limit`.
    async fn find_recent_items(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<ScoringRow>>;
}
