//! Lock backend over a SQLite table, with polling waiters.
//!
//! Every mutation of the lock table (sweep, acquire, complete, release) is funneled
//! through one mpsc queue drained by a [`LockTableWriter`], so writes never
//! race each other. Waiters only read.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{BackendError, LockBackend, LockBackendKind, ABANDONED_OUTCOME};

/// Default interval between waiter polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS distributed_locks (
        key TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        result TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_distributed_locks_expires_at ON distributed_locks(expires_at);
"#;

type Reply<T> = oneshot::Sender<Result<T, BackendError>>;

/// Mutation requests sent to the writer.
enum LockCommand {
    Acquire {
        key: String,
        owner: String,
        ttl: Duration,
        reply: Reply<bool>,
    },
    Complete {
        key: String,
        owner: String,
        payload: String,
        grace: Duration,
        reply: Reply<()>,
    },
    Release {
        key: String,
        owner: String,
        reply: Reply<()>,
    },
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn open_schema(conn: Connection) -> Result<Arc<Mutex<Connection>>, BackendError> {
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Create a SQLite lock backend and the writer that must be spawned for it.
///
/// Returns:
/// - `SqliteLockBackend` - register this with a `DistributedLock`
/// - `LockTableWriter` - spawn with `tokio::spawn(writer.run())`
pub fn create_sqlite_lock(
    path: &Path,
    poll_interval: Duration,
    buffer_size: usize,
) -> Result<(SqliteLockBackend, LockTableWriter), BackendError> {
    let conn = Connection::open(path)?;
    Ok(build(open_schema(conn)?, poll_interval, buffer_size))
}

/// Same as [`create_sqlite_lock`] over an in-memory database (useful for testing).
pub fn create_in_memory_sqlite_lock(
    poll_interval: Duration,
    buffer_size: usize,
) -> Result<(SqliteLockBackend, LockTableWriter), BackendError> {
    let conn = Connection::open_in_memory()?;
    Ok(build(open_schema(conn)?, poll_interval, buffer_size))
}

fn build(
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
    buffer_size: usize,
) -> (SqliteLockBackend, LockTableWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let backend = SqliteLockBackend {
        tx,
        conn: Arc::clone(&conn),
        poll_interval,
    };
    let writer = LockTableWriter { rx, conn };
    (backend, writer)
}

/// Background task applying lock-table mutations one at a time.
pub struct LockTableWriter {
    rx: mpsc::Receiver<LockCommand>,
    conn: Arc<Mutex<Connection>>,
}

impl LockTableWriter {
    /// Run the writer until every backend handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Lock table writer started");

        while let Some(command) = self.rx.recv().await {
            match command {
                LockCommand::Acquire {
                    key,
                    owner,
                    ttl,
                    reply,
                } => {
                    let _ = reply.send(self.acquire(&key, &owner, ttl));
                }
                LockCommand::Complete {
                    key,
                    owner,
                    payload,
                    grace,
                    reply,
                } => {
                    let _ = reply.send(self.complete(&key, &owner, &payload, grace));
                }
                LockCommand::Release { key, owner, reply } => {
                    let _ = reply.send(self.release(&key, &owner));
                }
            }
        }

        tracing::info!("Lock table writer shutting down");
    }

    fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, BackendError> {
        let now = now_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let swept = tx.execute(
            "DELETE FROM distributed_locks WHERE expires_at <= ?1",
            params![now],
        )?;
        if swept > 0 {
            debug!(swept, "Swept expired lock rows");
        }

        // An abandoned row can be taken over immediately
        let taken_over = tx.execute(
            "DELETE FROM distributed_locks WHERE key = ?1 AND result = ?2",
            params![key, ABANDONED_OUTCOME],
        )?;
        if taken_over > 0 {
            debug!(key = %key, "Taking over abandoned lock row");
        }

        let inserted = match tx.execute(
            "INSERT INTO distributed_locks (key, owner, expires_at, result) VALUES (?1, ?2, ?3, NULL)",
            params![key, owner, now + millis(ttl)],
        ) {
            Ok(_) => true,
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                false
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit()?;
        Ok(inserted)
    }

    fn complete(
        &self,
        key: &str,
        owner: &str,
        payload: &str,
        grace: Duration,
    ) -> Result<(), BackendError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE distributed_locks SET result = ?1, expires_at = ?2 WHERE key = ?3 AND owner = ?4",
            params![payload, now_millis() + millis(grace), key, owner],
        )?;
        if updated == 0 {
            warn!(key = %key, owner = %owner, "Lock row lost before completion, outcome not shared");
        }
        Ok(())
    }

    fn release(&self, key: &str, owner: &str) -> Result<(), BackendError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE distributed_locks SET result = ?1 WHERE key = ?2 AND owner = ?3 AND result IS NULL",
            params![ABANDONED_OUTCOME, key, owner],
        )?;
        if updated > 0 {
            debug!(key = %key, owner = %owner, "Released lock row without outcome");
        }
        Ok(())
    }
}

/// Handle for acquiring and observing locks stored in SQLite.
#[derive(Clone)]
pub struct SqliteLockBackend {
    tx: mpsc::Sender<LockCommand>,
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
}

impl SqliteLockBackend {
    async fn send<T>(&self, build: impl FnOnce(Reply<T>) -> LockCommand) -> Result<T, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| BackendError::new("Lock table writer is not running"))?;
        rx.await
            .map_err(|_| BackendError::new("Lock table writer dropped the request"))?
    }

    fn read_row(&self, key: &str) -> Result<Option<(Option<String>, i64)>, BackendError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT result, expires_at FROM distributed_locks WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }
}

#[async_trait]
impl LockBackend for SqliteLockBackend {
    fn kind(&self) -> LockBackendKind {
        LockBackendKind::Sqlite
    }

    async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        self.send(|reply| LockCommand::Acquire {
            key: key.to_string(),
            owner: owner.to_string(),
            ttl,
            reply,
        })
        .await
    }

    async fn complete(
        &self,
        key: &str,
        owner: &str,
        payload: &str,
        grace: Duration,
    ) -> Result<(), BackendError> {
        self.send(|reply| LockCommand::Complete {
            key: key.to_string(),
            owner: owner.to_string(),
            payload: payload.to_string(),
            grace,
            reply,
        })
        .await
    }

    async fn release(&self, key: &str, owner: &str, _grace: Duration) -> Result<(), BackendError> {
        self.send(|reply| LockCommand::Release {
            key: key.to_string(),
            owner: owner.to_string(),
            reply,
        })
        .await
    }

    async fn wait_for_outcome(&self, key: &str) -> Result<Option<String>, BackendError> {
        loop {
            match self.read_row(key)? {
                None => return Ok(None),
                Some((_, expires_at)) if expires_at <= now_millis() => return Ok(None),
                Some((Some(result), _)) => return Ok(Some(result)),
                Some((None, _)) => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}
