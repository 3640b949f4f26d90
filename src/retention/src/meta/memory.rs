//! Metadata authority held in process memory, optionally backed by a JSON
//! snapshot file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{DatabaseInfo, MetaClient, MetaError};

/// How long a deleted shard group is kept before pruning removes it.
pub const DEFAULT_PRUNE_GRACE: Duration = Duration::from_secs(24 * 3600);

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaSnapshot {
    #[serde(default)]
    pub databases: Vec<DatabaseInfo>,
}

pub struct InMemoryMetaClient {
    databases: RwLock<Vec<DatabaseInfo>>,
    persist_path: Option<PathBuf>,
    prune_grace: Duration,
}

impl InMemoryMetaClient {
    pub fn new(databases: Vec<DatabaseInfo>) -> Self {
        Self {
            databases: RwLock::new(databases),
            persist_path: None,
            prune_grace: DEFAULT_PRUNE_GRACE,
        }
    }

    /// Load metadata from a JSON snapshot file.
    pub async fn from_snapshot_file(path: &Path) -> Result<Self, MetaError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| MetaError::Snapshot(format!("read {}: {e}", path.display())))?;
        let snapshot: MetaSnapshot = serde_json::from_slice(&raw)
            .map_err(|e| MetaError::Snapshot(format!("parse {}: {e}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            databases = snapshot.databases.len(),
            "Loaded metadata snapshot"
        );

        Ok(Self::new(snapshot.databases))
    }

    /// Write the snapshot to `path` after every mutation.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    pub fn with_prune_grace(mut self, grace: Duration) -> Self {
        self.prune_grace = grace;
        self
    }

    /// Current metadata state.
    pub async fn snapshot(&self) -> MetaSnapshot {
        MetaSnapshot {
            databases: self.databases.read().await.clone(),
        }
    }

    async fn persist(&self, databases: &[DatabaseInfo]) -> Result<(), MetaError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        let snapshot = MetaSnapshot {
            databases: databases.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| MetaError::Snapshot(format!("serialize: {e}")))?;

        // Replace atomically so a crash never leaves a torn snapshot.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| MetaError::Snapshot(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| MetaError::Snapshot(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl MetaClient for InMemoryMetaClient {
    async fn databases(&self) -> Result<Vec<DatabaseInfo>, MetaError> {
        Ok(self.databases.read().await.clone())
    }

    async fn delete_shard_group(
        &self,
        database: &str,
        policy: &str,
        id: u64,
    ) -> Result<(), MetaError> {
        let mut databases = self.databases.write().await;
        let (d, r, g) = locate_shard_group(&databases, database, policy, id)?;

        let group = &mut databases[d].retention_policies[r].shard_groups[g];
        if group.is_deleted() {
            return Ok(());
        }
        group.deleted_at = Some(Utc::now());

        // Only a persisted deletion counts; otherwise the group must stay
        // expired so the next sweep retries it.
        if let Err(e) = self.persist(&databases).await {
            databases[d].retention_policies[r].shard_groups[g].deleted_at = None;
            return Err(e);
        }
        Ok(())
    }

    async fn prune_shard_groups(&self) -> Result<(), MetaError> {
        let grace = TimeDelta::from_std(self.prune_grace).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now().checked_sub_signed(grace);

        let mut databases = self.databases.write().await;
        let mut remaining = databases.clone();
        let mut pruned = 0usize;
        for rp in remaining
            .iter_mut()
            .flat_map(|d| d.retention_policies.iter_mut())
        {
            let before = rp.shard_groups.len();
            rp.shard_groups.retain(|g| match (g.deleted_at, cutoff) {
                (Some(deleted_at), Some(cutoff)) => deleted_at > cutoff,
                _ => true,
            });
            pruned += before - rp.shard_groups.len();
        }

        if pruned == 0 {
            return Ok(());
        }

        self.persist(&remaining).await?;
        *databases = remaining;
        tracing::debug!(pruned, "Pruned deleted shard groups");
        Ok(())
    }
}

/// Index path `(database, policy, group)` of one shard group.
fn locate_shard_group(
    databases: &[DatabaseInfo],
    database: &str,
    policy: &str,
    id: u64,
) -> Result<(usize, usize, usize), MetaError> {
    let d = databases
        .iter()
        .position(|db| db.name == database)
        .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
    let r = databases[d]
        .retention_policies
        .iter()
        .position(|rp| rp.name == policy)
        .ok_or_else(|| MetaError::RetentionPolicyNotFound {
            database: database.to_string(),
            policy: policy.to_string(),
        })?;
    let g = databases[d].retention_policies[r]
        .shard_groups
        .iter()
        .position(|group| group.id == id)
        .ok_or_else(|| MetaError::ShardGroupNotFound {
            database: database.to_string(),
            policy: policy.to_string(),
            id,
        })?;
    Ok((d, r, g))
}
