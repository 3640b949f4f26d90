//! One retention sweep: retire expired shard groups in metadata, then remove
//! their shards from local storage.
//!
//! ## Steps
//!
//! 1. Enumerate databases and ask each retention policy for its expired
//!    shard groups.
//! 2. Delete each expired group at the metadata layer. Only groups whose
//!    deletion succeeded contribute their shards to the deletion record.
//! 3. Delete every locally stored shard that appears in the deletion record.
//! 4. Optionally remove orphans: local shards whose group the metadata
//!    authority shows as deleted, and shards an earlier sweep failed to
//!    remove. Shards unknown to metadata are never touched.
//! 5. Ask the metadata authority to prune deleted groups.
//!
//! A failure on one item is logged and skipped; nothing aborts the sweep.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, info, warn};

use common::logging::{self, OperationEvent};

use crate::meta::{DatabaseInfo, MetaClient};
use crate::metrics::RetentionMetrics;
use crate::store::ShardStore;

/// Operation name carried by every sweep's span.
pub const OPERATION_NAME: &str = "retention.delete_check";

/// Outcome of a single sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub trace_id: String,
    /// Whether the metadata authority returned its databases.
    pub metadata_listed: bool,
    pub shard_groups_deleted: usize,
    pub shard_group_failures: usize,
    pub shards_deleted: usize,
    pub shard_failures: usize,
    pub orphans_deleted: usize,
    pub pruned: bool,
    pub elapsed: Duration,
}

/// Owner of a shard whose group was deleted logically.
#[derive(Debug, Clone)]
struct DeletionInfo {
    database: String,
    policy: String,
}

/// Shards cleared for physical deletion, built and dropped within one sweep.
type DeletionRecord = HashMap<u64, DeletionInfo>;

/// Local storage state observed by the physical deletion step.
struct LocalPass {
    stored: HashSet<u64>,
    attempted: HashSet<u64>,
    failed: Vec<(u64, DeletionInfo)>,
}

pub struct Sweeper {
    meta: Arc<dyn MetaClient>,
    store: Arc<dyn ShardStore>,
    reconcile_orphans: bool,
    /// Shards whose group was deleted logically but which are still on
    /// disk. Kept across sweeps, survives pruning of the group.
    unremoved: Mutex<HashMap<u64, DeletionInfo>>,
    metrics: RetentionMetrics,
    dispatch: Dispatch,
}

impl Sweeper {
    pub fn new(meta: Arc<dyn MetaClient>, store: Arc<dyn ShardStore>) -> Self {
        Self {
            meta,
            store,
            reconcile_orphans: true,
            unremoved: Mutex::new(HashMap::new()),
            metrics: RetentionMetrics::new(),
            dispatch: Dispatch::none(),
        }
    }

    pub fn with_orphan_reconciliation(mut self, enabled: bool) -> Self {
        self.reconcile_orphans = enabled;
        self
    }

    /// Route this sweeper's events to `dispatch` instead of discarding them.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn metrics(&self) -> &RetentionMetrics {
        &self.metrics
    }

    /// Ids of shards awaiting removal by a later sweep, sorted.
    pub async fn unremoved_shard_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.unremoved.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run one sweep against the current time.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep, treating `now` as the current time for expiry.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let dispatch = self.dispatch.clone();
        let report = async move {
            let trace_id = logging::next_trace_id();
            let span = logging::operation_span(OPERATION_NAME, &trace_id);
            self.run(now, trace_id).instrument(span).await
        }
        .with_subscriber(dispatch)
        .await;

        self.metrics.record_sweep(&report);
        report
    }

    async fn run(&self, now: DateTime<Utc>, trace_id: String) -> SweepReport {
        info!(
            op_event = %OperationEvent::Start,
            "beginning retention policy deletion check"
        );
        let started = Instant::now();
        let mut report = SweepReport {
            trace_id,
            ..Default::default()
        };

        match self.meta.databases().await {
            Ok(databases) => {
                report.metadata_listed = true;
                let record = self
                    .delete_expired_shard_groups(&databases, now, &mut report)
                    .await;
                let local = self.delete_shards(&record, &mut report).await;
                if let Some(local) = local.filter(|_| self.reconcile_orphans) {
                    self.delete_orphan_shards(&databases, local, &mut report)
                        .await;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to list databases");
            }
        }

        report.pruned = match self.meta.prune_shard_groups().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to prune shard groups");
                false
            }
        };

        report.elapsed = started.elapsed();
        info!(
            op_event = %OperationEvent::End,
            op_elapsed = ?report.elapsed,
            shard_groups_deleted = report.shard_groups_deleted,
            shards_deleted = report.shards_deleted,
            orphans_deleted = report.orphans_deleted,
            "completed retention policy deletion check"
        );
        report
    }

    async fn delete_expired_shard_groups(
        &self,
        databases: &[DatabaseInfo],
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> DeletionRecord {
        let mut record = DeletionRecord::new();
        let mut requested: HashSet<(&str, &str, u64)> = HashSet::new();

        for db in databases {
            for rp in &db.retention_policies {
                for group in rp.expired_shard_groups(now) {
                    if !requested.insert((db.name.as_str(), rp.name.as_str(), group.id)) {
                        continue;
                    }

                    if let Err(e) = self
                        .meta
                        .delete_shard_group(&db.name, &rp.name, group.id)
                        .await
                    {
                        warn!(
                            error = %e,
                            db_instance = %db.name,
                            db_shard_group = group.id,
                            db_rp = %rp.name,
                            "failed to delete shard group"
                        );
                        report.shard_group_failures += 1;
                        continue;
                    }

                    info!(
                        db_instance = %db.name,
                        db_shard_group = group.id,
                        db_rp = %rp.name,
                        "shard group deleted"
                    );
                    report.shard_groups_deleted += 1;

                    for shard in &group.shards {
                        record.insert(
                            shard.id,
                            DeletionInfo {
                                database: db.name.clone(),
                                policy: rp.name.clone(),
                            },
                        );
                    }
                }
            }
        }

        record
    }

    /// Remove locally stored shards named in the deletion record. Returns
    /// `None` when local storage could not be listed.
    async fn delete_shards(
        &self,
        record: &DeletionRecord,
        report: &mut SweepReport,
    ) -> Option<LocalPass> {
        let stored = match self.store.shard_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list local shards");
                return None;
            }
        };

        let mut attempted = HashSet::new();
        let mut failed = Vec::new();
        for &id in &stored {
            let Some(info) = record.get(&id) else {
                continue;
            };
            if !attempted.insert(id) {
                continue;
            }

            match self.store.delete_shard(id).await {
                Ok(()) => {
                    info!(
                        db_instance = %info.database,
                        db_shard_id = id,
                        db_rp = %info.policy,
                        "shard deleted"
                    );
                    report.shards_deleted += 1;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        db_instance = %info.database,
                        db_shard_id = id,
                        db_rp = %info.policy,
                        "failed to delete shard"
                    );
                    report.shard_failures += 1;
                    failed.push((id, info.clone()));
                }
            }
        }

        Some(LocalPass {
            stored: stored.into_iter().collect(),
            attempted,
            failed,
        })
    }

    /// Remove shards left behind by earlier sweeps: those in the unremoved
    /// set and those whose group the snapshot shows as deleted. A shard that
    /// belongs to a live group, or that metadata does not know, is kept.
    async fn delete_orphan_shards(
        &self,
        databases: &[DatabaseInfo],
        local: LocalPass,
        report: &mut SweepReport,
    ) {
        let mut live = HashSet::new();
        let mut deleted: HashMap<u64, DeletionInfo> = HashMap::new();
        for db in databases {
            for rp in &db.retention_policies {
                for group in &rp.shard_groups {
                    for shard in &group.shards {
                        if group.is_deleted() {
                            deleted.insert(
                                shard.id,
                                DeletionInfo {
                                    database: db.name.clone(),
                                    policy: rp.name.clone(),
                                },
                            );
                        } else {
                            live.insert(shard.id);
                        }
                    }
                }
            }
        }

        let mut unremoved = self.unremoved.lock().await;
        unremoved.retain(|id, _| local.stored.contains(id) && !live.contains(id));
        // The snapshot predates this sweep's deletions, so these still look live.
        unremoved.extend(local.failed);

        let mut orphans: Vec<(u64, DeletionInfo)> = unremoved
            .iter()
            .map(|(&id, info)| (id, info.clone()))
            .chain(deleted.into_iter().filter(|(id, _)| {
                local.stored.contains(id) && !live.contains(id) && !unremoved.contains_key(id)
            }))
            .filter(|(id, _)| !local.attempted.contains(id))
            .collect();
        orphans.sort_unstable_by_key(|(id, _)| *id);

        for (id, info) in orphans {
            match self.store.delete_shard(id).await {
                Ok(()) => {
                    info!(
                        db_instance = %info.database,
                        db_shard_id = id,
                        db_rp = %info.policy,
                        "orphan shard deleted"
                    );
                    unremoved.remove(&id);
                    report.orphans_deleted += 1;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        db_instance = %info.database,
                        db_shard_id = id,
                        db_rp = %info.policy,
                        "failed to delete orphan shard"
                    );
                    unremoved.insert(id, info);
                    report.shard_failures += 1;
                }
            }
        }
    }
}
