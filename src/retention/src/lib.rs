//! Retention policy enforcement for a time-series storage node.
//!
//! The service periodically asks the metadata authority for shard groups
//! whose retention has elapsed, deletes them logically, then removes their
//! shards from local storage.

pub mod meta;
pub mod metrics;
pub mod service;
pub mod store;
pub mod sweep;

pub use meta::{
    DatabaseInfo, InMemoryMetaClient, MetaClient, MetaError, RetentionPolicyInfo, ShardGroupInfo,
    ShardInfo,
};
pub use metrics::RetentionMetrics;
pub use service::RetentionService;
pub use store::{DirShardStore, ShardStore, StoreError};
pub use sweep::{OPERATION_NAME, SweepReport, Sweeper};
