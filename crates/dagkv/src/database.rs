//! The Database: one block store plus the configuration for logs and
//! replication over it.

use std::sync::Arc;

use dagkv_core::Cid;
use dagkv_log::{LogConfig, LogHandle};
use dagkv_store::BlockStore;
use dagkv_sync::{replicate_with_config, verify_replica, ReplicateConfig, Replication};

use crate::error::{DbError, Result};

/// Configuration for a Database.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Configuration handed to every opened log.
    pub log: LogConfig,
    /// Replication configuration.
    pub replicate: ReplicateConfig,
}

/// A block store with the log and replication engines bound to it.
///
/// The database does not track a "current root"; callers keep the root id
/// of the log they care about and advance it after each commit.
pub struct Database<S: BlockStore> {
    store: Arc<S>,
    config: DatabaseConfig,
}

impl<S: BlockStore> Database<S> {
    pub fn new(store: S, config: DatabaseConfig) -> Self {
        Self::from_arc(Arc::new(store), config)
    }

    /// Share an existing store.
    pub fn from_arc(store: Arc<S>, config: DatabaseConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the empty log and open a handle on it.
    pub async fn empty(&self) -> Result<LogHandle<S>> {
        let log = LogHandle::empty(Arc::clone(&self.store)).await?;
        Ok(log.with_config(self.config.log.clone()))
    }

    /// Open the log whose last transaction is `root`.
    pub async fn open(&self, root: &Cid) -> Result<LogHandle<S>> {
        let log = LogHandle::open(Arc::clone(&self.store), *root).await?;
        Ok(log.with_config(self.config.log.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replication
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy the DAG under `root` from `source` into this database's store.
    pub async fn replicate_from<R: BlockStore + ?Sized>(
        &self,
        source: &R,
        root: &Cid,
    ) -> Result<Replication> {
        Ok(replicate_with_config(root, source, &*self.store, &self.config.replicate).await?)
    }

    /// Whether this store holds every block reachable from `root`.
    pub async fn verify(&self, root: &Cid) -> Result<Replication> {
        Ok(verify_replica(root, &*self.store).await?)
    }

    /// Replicate a log from `source` and open it.
    ///
    /// Fails with [`DbError::IncompleteReplica`] unless the whole log,
    /// history included, arrived within the configured depth.
    pub async fn import<R: BlockStore + ?Sized>(
        &self,
        source: &R,
        root: &Cid,
    ) -> Result<LogHandle<S>> {
        let outcome = self.replicate_from(source, root).await?;
        if let Replication::Partial {
            missing,
            incomplete,
        } = &outcome
        {
            tracing::warn!(
                root = %root,
                missing = missing.len(),
                incomplete = incomplete.len(),
                "imported log is incomplete"
            );
            return Err(DbError::IncompleteReplica {
                root: *root,
                missing: missing.len(),
                incomplete: incomplete.len(),
            });
        }
        self.open(root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagkv_core::Value;
    use dagkv_log::LogError;
    use dagkv_store::MemoryStore;

    fn memory_db() -> Database<MemoryStore> {
        Database::new(MemoryStore::new(), DatabaseConfig::default())
    }

    #[tokio::test]
    async fn test_empty_and_reopen() {
        let db = memory_db();
        let mut log = db.empty().await.unwrap();
        log.set("name", "dagkv");
        let log = log.commit().await.unwrap();

        let reopened = db.open(&log.root()).await.unwrap();
        assert_eq!(reopened.get("name").await.unwrap(), Value::from("dagkv"));
    }

    #[tokio::test]
    async fn test_config_reaches_logs() {
        let config = DatabaseConfig {
            log: LogConfig { batch_size: 3 },
            ..DatabaseConfig::default()
        };
        let db = Database::new(MemoryStore::new(), config);
        let log = db.empty().await.unwrap();
        assert_eq!(log.config().batch_size, 3);
    }

    #[tokio::test]
    async fn test_open_unknown_root_fails_missing() {
        let db = memory_db();
        match db.open(&Cid::from_bytes([7; 32])).await {
            Err(DbError::Log(LogError::Store(e))) => assert!(e.is_missing()),
            other => panic!("expected missing root, got {:?}", other.map(|l| l.root())),
        }
    }

    #[tokio::test]
    async fn test_import_full_log() {
        let origin = memory_db();
        let mut log = origin.empty().await.unwrap();
        for i in 0..20i64 {
            log.set(format!("k{}", i), i);
        }
        let log = log.commit().await.unwrap();

        let replica = memory_db();
        let imported = replica.import(&**origin.store(), &log.root()).await.unwrap();
        assert_eq!(imported.get("k7").await.unwrap(), Value::Integer(7));
        assert!(replica.verify(&log.root()).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_import_shallow_is_rejected() {
        let origin = memory_db();
        let mut log = origin.empty().await.unwrap();
        log.set("k", 1i64);
        let log = log.commit().await.unwrap();

        let config = DatabaseConfig {
            replicate: ReplicateConfig {
                depth: 0,
                batch_size: 10,
            },
            ..DatabaseConfig::default()
        };
        let replica = Database::new(MemoryStore::new(), config);
        assert!(matches!(
            replica.import(&**origin.store(), &log.root()).await,
            Err(DbError::IncompleteReplica { .. })
        ));
    }
}
