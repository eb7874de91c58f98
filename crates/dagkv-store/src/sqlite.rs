//! SQLite implementation of the BlockStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. Bytes read back are re-hashed before they are
//! handed out as a [`Block`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dagkv_core::{Block, Cid};
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::CompletenessCache;
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::BlockStore;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    completeness: CompletenessCache,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            completeness: CompletenessCache::new(),
        }
    }

    /// Run a blocking closure against the connection off the async runtime.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("spawn_blocking failed: {}", e)))?
    }

    /// Number of stored blocks.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = self
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?)
            })
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl BlockStore for SqliteStore {
    async fn get(&self, cid: &Cid) -> Result<Block> {
        let cid = *cid;

        let bytes: Option<Vec<u8>> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT bytes FROM blocks WHERE cid = ?1",
                        params![cid.as_bytes().as_slice()],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match bytes {
            Some(bytes) => Ok(Block::from_parts(cid, bytes)?),
            None => Err(StoreError::Missing(cid)),
        }
    }

    async fn put(&self, block: &Block) -> Result<()> {
        let cid = block.cid();
        let bytes = block.bytes().clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blocks (cid, bytes, size, stored_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    cid.as_bytes().as_slice(),
                    bytes.as_ref(),
                    bytes.len() as i64,
                    now_millis()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn has(&self, cid: &Cid) -> Result<Option<u64>> {
        let cid = *cid;

        self.with_conn(move |conn| {
            let size: Option<i64> = conn
                .query_row(
                    "SELECT size FROM blocks WHERE cid = ?1",
                    params![cid.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(size.map(|s| s as u64))
        })
        .await
    }

    fn completeness(&self) -> &CompletenessCache {
        &self.completeness
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
