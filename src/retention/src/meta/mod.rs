//! Metadata authority interface and the schema model it serves.
//!
//! The authority owns databases, retention policies and shard groups. The
//! retention service only reads this model and asks the authority to mutate
//! it; expiry boundaries are decided here, not by the sweep.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryMetaClient;

/// A named logical container of retention policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(default)]
    pub retention_policies: Vec<RetentionPolicyInfo>,
}

/// A retention policy and the shard groups written under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicyInfo {
    pub name: String,
    /// How long data is kept after a shard group ends. Zero keeps data forever.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Time span covered by one shard group.
    #[serde(with = "humantime_serde", default = "default_shard_group_duration")]
    pub shard_group_duration: Duration,
    #[serde(default)]
    pub shard_groups: Vec<ShardGroupInfo>,
}

fn default_shard_group_duration() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

impl RetentionPolicyInfo {
    /// Shard groups that are not yet deleted and ended more than `duration`
    /// before `now`.
    pub fn expired_shard_groups(&self, now: DateTime<Utc>) -> Vec<&ShardGroupInfo> {
        if self.duration.is_zero() {
            return Vec::new();
        }
        let Ok(retention) = TimeDelta::from_std(self.duration) else {
            return Vec::new();
        };

        self.shard_groups
            .iter()
            .filter(|g| !g.is_deleted())
            .filter(|g| {
                g.end_time
                    .checked_add_signed(retention)
                    .is_some_and(|expires_at| expires_at < now)
            })
            .collect()
    }
}

/// A time-bounded bucket of shards for one database and policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardGroupInfo {
    pub id: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Set once the group has been deleted logically. Deleted groups stay in
    /// the model until pruned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: u64,
}

/// Errors reported by a metadata authority.
#[derive(Error, Debug)]
pub enum MetaError {
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("retention policy not found: {database}.{policy}")]
    RetentionPolicyNotFound { database: String, policy: String },

    #[error("shard group {id} not found in {database}.{policy}")]
    ShardGroupNotFound {
        database: String,
        policy: String,
        id: u64,
    },

    #[error("metadata authority unavailable: {0}")]
    Unavailable(String),

    #[error("metadata snapshot error: {0}")]
    Snapshot(String),
}

/// The capability set the retention service consumes from the metadata
/// authority. Implementations must be safe for concurrent use.
#[async_trait]
pub trait MetaClient: Send + Sync {
    /// All databases with their nested retention policies and shard groups.
    async fn databases(&self) -> Result<Vec<DatabaseInfo>, MetaError>;

    /// Logically delete one shard group.
    async fn delete_shard_group(
        &self,
        database: &str,
        policy: &str,
        id: u64,
    ) -> Result<(), MetaError>;

    /// Drop records of shard groups that are deleted and no longer needed.
    ///
    /// Follows the authority's group-pruning convention: soft-deleted shard
    /// groups are removed once their grace period has passed, while retention
    /// policy records stay in place even when they hold no groups.
    async fn prune_shard_groups(&self) -> Result<(), MetaError>;
}
