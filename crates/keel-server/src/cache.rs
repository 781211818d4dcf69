//! Connection state cache
//!
//! Entries are keyed by the location key of the repository URL, so every
//! spelling of one location shares an entry. Readers and writers from
//! concurrent hydration workers are safe.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::error::{Result, ServiceError};
use keel_core::{ConnectionState, location_key};

/// Cache of the last probe outcome per location
#[async_trait]
pub trait ConnectionStateCache: Send + Sync {
    /// Cached state, `None` on a miss
    async fn get_connection_state(&self, url: &str) -> Result<Option<ConnectionState>>;

    /// Store a state; `None` invalidates the entry
    async fn set_connection_state(&self, url: &str, state: Option<&ConnectionState>) -> Result<()>;
}

fn expired(stored_at: DateTime<Utc>, ttl: Option<Duration>) -> bool {
    ttl.is_some_and(|ttl| Utc::now() - stored_at > ttl)
}

/// In-process cache
#[derive(Default)]
pub struct MemoryConnectionCache {
    entries: RwLock<HashMap<String, (ConnectionState, DateTime<Utc>)>>,
    ttl: Option<Duration>,
}

impl MemoryConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` read as misses
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::default(),
            ttl: Some(ttl),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ConnectionStateCache for MemoryConnectionCache {
    async fn get_connection_state(&self, url: &str) -> Result<Option<ConnectionState>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&location_key(url))
            .filter(|(_, stored_at)| !expired(*stored_at, self.ttl))
            .map(|(state, _)| state.clone()))
    }

    async fn set_connection_state(&self, url: &str, state: Option<&ConnectionState>) -> Result<()> {
        let mut entries = self.entries.write().await;
        let key = location_key(url);
        match state {
            Some(state) => {
                entries.insert(key, (state.clone(), Utc::now()));
            }
            None => {
                entries.remove(&key);
            }
        }
        Ok(())
    }
}

/// SQLite-backed cache, shared between CLI invocations.
///
/// Queries run on the blocking thread pool, one at a time.
pub struct SqliteConnectionCache {
    conn: Arc<Mutex<Connection>>,
    ttl: Option<Duration>,
}

impl SqliteConnectionCache {
    /// File name inside the config directory
    pub const FILE_NAME: &'static str = "connection-state.db";

    /// Open or create cache at a specific path
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let result = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        );

        let conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Connection cache corrupted, recreating: {}", e);
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Connection::open(path)?
            }
        };

        Self::init(conn)
    }

    /// Open in-memory cache (for testing)
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Entries older than `ttl` read as misses
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS connection_states (
                location TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: None,
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    async fn with_conn_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await?
    }

    /// Drop expired rows
    pub fn prune(&self) -> Result<usize> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };
        let cutoff = (Utc::now() - ttl).timestamp();
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM connection_states WHERE stored_at < ?1",
                params![cutoff],
            )?)
        })
    }
}

#[async_trait]
impl ConnectionStateCache for SqliteConnectionCache {
    async fn get_connection_state(&self, url: &str) -> Result<Option<ConnectionState>> {
        let key = location_key(url);
        let row: Option<(String, i64)> = self
            .with_conn_blocking(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state, stored_at FROM connection_states WHERE location = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;

        let Some((state, stored_at)) = row else {
            return Ok(None);
        };
        let stored_at = DateTime::from_timestamp(stored_at, 0).ok_or_else(|| ServiceError::Cache {
            message: format!("invalid timestamp {}", stored_at),
        })?;
        if expired(stored_at, self.ttl) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&state)?))
    }

    async fn set_connection_state(&self, url: &str, state: Option<&ConnectionState>) -> Result<()> {
        let key = location_key(url);
        match state {
            Some(state) => {
                let json = serde_json::to_string(state)?;
                self.with_conn_blocking(move |conn| {
                    conn.execute(
                        "INSERT INTO connection_states (location, state, stored_at)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(location) DO UPDATE SET state = ?2, stored_at = ?3",
                        params![key, json, Utc::now().timestamp()],
                    )?;
                    Ok(())
                })
                .await
            }
            None => {
                self.with_conn_blocking(move |conn| {
                    conn.execute(
                        "DELETE FROM connection_states WHERE location = ?1",
                        params![key],
                    )?;
                    Ok(())
                })
                .await
            }
        }
    }
}
