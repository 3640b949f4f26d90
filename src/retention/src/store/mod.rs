//! Local storage engine interface.

use async_trait::async_trait;
use thiserror::Error;

pub mod dir;

pub use dir::DirShardStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("shard {0} not found")]
    ShardNotFound(u64),

    #[error("shard {0} is busy")]
    ShardBusy(u64),

    #[error("I/O error on shard {shard_id}: {source}")]
    Io {
        shard_id: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to enumerate shards: {0}")]
    Enumerate(#[source] std::io::Error),
}

/// Physical shard storage on this node. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// Identifiers of every shard physically present on this node.
    async fn shard_ids(&self) -> Result<Vec<u64>, StoreError>;

    /// Remove one shard and all of its data.
    async fn delete_shard(&self, id: u64) -> Result<(), StoreError>;
}
