//! Recording fakes for the metadata authority and the local shard store.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retention::{
    DatabaseInfo, MetaClient, MetaError, RetentionPolicyInfo, ShardGroupInfo, ShardInfo,
    ShardStore, StoreError,
};
use tokio::sync::Notify;

/// Fixed "current time" used by sweep tests: 2024-06-01T00:00:00Z.
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_717_200_000, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - chrono::Duration::days(days)
}

pub fn group(id: u64, end_time: DateTime<Utc>, shards: &[u64]) -> ShardGroupInfo {
    ShardGroupInfo {
        id,
        start_time: end_time - chrono::Duration::days(1),
        end_time,
        deleted_at: None,
        shards: shards.iter().map(|&id| ShardInfo { id }).collect(),
    }
}

pub fn policy(name: &str, days: u64, shard_groups: Vec<ShardGroupInfo>) -> RetentionPolicyInfo {
    RetentionPolicyInfo {
        name: name.to_string(),
        duration: Duration::from_secs(days * 24 * 3600),
        shard_group_duration: Duration::from_secs(24 * 3600),
        shard_groups,
    }
}

pub fn database(name: &str, retention_policies: Vec<RetentionPolicyInfo>) -> DatabaseInfo {
    DatabaseInfo {
        name: name.to_string(),
        retention_policies,
    }
}

/// `db1.rp1` holds expired group 1 with shards 1 and 2; `db2.rp2` holds
/// group 2 with shard 3, which is still retained.
pub fn two_databases() -> Vec<DatabaseInfo> {
    vec![
        database("db1", vec![policy("rp1", 7, vec![group(1, days_ago(10), &[1, 2])])]),
        database("db2", vec![policy("rp2", 7, vec![group(2, days_ago(1), &[3])])]),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCall {
    Databases,
    DeleteShardGroup {
        database: String,
        policy: String,
        id: u64,
    },
    PruneShardGroups,
}

/// Metadata authority fake. Successful deletions mark the group deleted, the
/// way a real authority would.
#[derive(Default)]
pub struct FakeMeta {
    databases: Mutex<Vec<DatabaseInfo>>,
    calls: Mutex<Vec<MetaCall>>,
    failing_groups: Mutex<HashSet<u64>>,
    fail_listing: Mutex<bool>,
    fail_prune: Mutex<bool>,
    gate: Option<SweepGate>,
}

/// Holds `databases()` until released, to keep a sweep in flight.
#[derive(Clone, Default)]
pub struct SweepGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeMeta {
    pub fn new(databases: Vec<DatabaseInfo>) -> Self {
        Self {
            databases: Mutex::new(databases),
            ..Default::default()
        }
    }

    pub fn with_gate(mut self, gate: SweepGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_group(&self, id: u64) {
        self.failing_groups.lock().unwrap().insert(id);
    }

    pub fn heal_group(&self, id: u64) {
        self.failing_groups.lock().unwrap().remove(&id);
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    pub fn fail_prune(&self, fail: bool) {
        *self.fail_prune.lock().unwrap() = fail;
    }

    /// Drop deleted groups from the model, as pruning eventually does.
    pub fn forget_deleted_groups(&self) {
        for rp in self
            .databases
            .lock()
            .unwrap()
            .iter_mut()
            .flat_map(|d| d.retention_policies.iter_mut())
        {
            rp.shard_groups.retain(|g| !g.is_deleted());
        }
    }

    pub fn calls(&self) -> Vec<MetaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn deleted_groups(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MetaCall::DeleteShardGroup { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn prune_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == MetaCall::PruneShardGroups)
            .count()
    }

    fn record(&self, call: MetaCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MetaClient for FakeMeta {
    async fn databases(&self) -> Result<Vec<DatabaseInfo>, MetaError> {
        self.record(MetaCall::Databases);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if *self.fail_listing.lock().unwrap() {
            return Err(MetaError::Unavailable("raft leader unknown".to_string()));
        }
        Ok(self.databases.lock().unwrap().clone())
    }

    async fn delete_shard_group(
        &self,
        database: &str,
        policy: &str,
        id: u64,
    ) -> Result<(), MetaError> {
        self.record(MetaCall::DeleteShardGroup {
            database: database.to_string(),
            policy: policy.to_string(),
            id,
        });
        if self.failing_groups.lock().unwrap().contains(&id) {
            return Err(MetaError::Unavailable("write timeout".to_string()));
        }

        let mut databases = self.databases.lock().unwrap();
        for g in databases
            .iter_mut()
            .filter(|d| d.name == database)
            .flat_map(|d| d.retention_policies.iter_mut())
            .filter(|r| r.name == policy)
            .flat_map(|r| r.shard_groups.iter_mut())
            .filter(|g| g.id == id)
        {
            g.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn prune_shard_groups(&self) -> Result<(), MetaError> {
        self.record(MetaCall::PruneShardGroups);
        if *self.fail_prune.lock().unwrap() {
            return Err(MetaError::Unavailable("prune rejected".to_string()));
        }
        Ok(())
    }
}

/// Local shard store fake.
#[derive(Default)]
pub struct FakeStore {
    shards: Mutex<BTreeSet<u64>>,
    failing: Mutex<HashMap<u64, usize>>,
    delete_requests: Mutex<Vec<u64>>,
    /// Shards that show up on disk only after the next listing.
    created_after_listing: Mutex<Vec<u64>>,
    list_calls: AtomicUsize,
}

impl FakeStore {
    pub fn new(shards: &[u64]) -> Self {
        Self {
            shards: Mutex::new(shards.iter().copied().collect()),
            ..Default::default()
        }
    }

    /// Fail the next `times` deletions of shard `id`.
    pub fn fail_shard(&self, id: u64, times: usize) {
        self.failing.lock().unwrap().insert(id, times);
    }

    pub fn create_after_next_listing(&self, id: u64) {
        self.created_after_listing.lock().unwrap().push(id);
    }

    pub fn add_shard(&self, id: u64) {
        self.shards.lock().unwrap().insert(id);
    }

    pub fn stored(&self) -> Vec<u64> {
        self.shards.lock().unwrap().iter().copied().collect()
    }

    pub fn delete_requests(&self) -> Vec<u64> {
        self.delete_requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.delete_requests.lock().unwrap().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardStore for FakeStore {
    async fn shard_ids(&self) -> Result<Vec<u64>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut shards = self.shards.lock().unwrap();
        let ids = shards.iter().copied().collect();
        shards.extend(self.created_after_listing.lock().unwrap().drain(..));
        Ok(ids)
    }

    async fn delete_shard(&self, id: u64) -> Result<(), StoreError> {
        self.delete_requests.lock().unwrap().push(id);

        {
            let mut failing = self.failing.lock().unwrap();
            match failing.get_mut(&id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    return Err(StoreError::ShardBusy(id));
                }
                _ => {}
            }
        }

        if self.shards.lock().unwrap().remove(&id) {
            Ok(())
        } else {
            Err(StoreError::ShardNotFound(id))
        }
    }
}
