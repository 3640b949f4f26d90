//! Shard store over a directory tree laid out as
//! `<root>/<database>/<policy>/<shard_id>/`.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ShardStore, StoreError};

pub struct DirShardStore {
    root: PathBuf,
}

impl DirShardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a shard would live at. Does not check that it exists.
    pub fn shard_path(&self, database: &str, policy: &str, id: u64) -> PathBuf {
        self.root.join(database).join(policy).join(id.to_string())
    }

    /// Every shard directory under the root, keyed by shard id.
    async fn scan(&self) -> io::Result<Vec<(u64, PathBuf)>> {
        let mut shards = Vec::new();

        for db_dir in subdirectories(&self.root).await? {
            for rp_dir in subdirectories(&db_dir).await? {
                for shard_dir in subdirectories(&rp_dir).await? {
                    let id = shard_dir
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(|n| n.parse::<u64>().ok());
                    match id {
                        Some(id) => shards.push((id, shard_dir)),
                        None => tracing::debug!(
                            path = %shard_dir.display(),
                            "Skipping non-shard directory"
                        ),
                    }
                }
            }
        }

        Ok(shards)
    }
}

/// Child directories of `dir`; a missing `dir` has none.
async fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[async_trait]
impl ShardStore for DirShardStore {
    async fn shard_ids(&self) -> Result<Vec<u64>, StoreError> {
        let mut ids: Vec<u64> = self
            .scan()
            .await
            .map_err(StoreError::Enumerate)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn delete_shard(&self, id: u64) -> Result<(), StoreError> {
        let paths: Vec<PathBuf> = self
            .scan()
            .await
            .map_err(|source| StoreError::Io {
                shard_id: id,
                source,
            })?
            .into_iter()
            .filter(|(shard_id, _)| *shard_id == id)
            .map(|(_, path)| path)
            .collect();

        if paths.is_empty() {
            return Err(StoreError::ShardNotFound(id));
        }

        for path in paths {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                // Removed concurrently; the shard is gone either way.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StoreError::Io {
                        shard_id: id,
                        source,
                    });
                }
            }
        }

        Ok(())
    }
}
