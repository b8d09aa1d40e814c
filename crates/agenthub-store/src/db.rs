use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{Error, Notifier, Result, schema};

/// Pooled handle over the embedded store. Cloning shares the pool.
///
/// All SQL runs on blocking threads; checkout waits on a semaphore bounded by
/// the pool size, and the whole call is bounded by the caller's deadline.
/// On deadline expiry the in-flight statement is interrupted so the
/// transaction rolls back instead of committing late.
#[derive(Clone)]
pub struct Database {
    inner: Arc<PoolInner>,
    notifier: Notifier,
}

struct PoolInner {
    connections: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    source: Source,
    busy_retries: u32,
}

enum Source {
    File(PathBuf),
    /// Shared-cache in-memory database; lives as long as the pool holds
    /// at least one connection open
    Memory(String),
}

impl Database {
    /// Opens (or creates) the store at `path` with `pool_size` connections.
    pub fn open(path: &Path, pool_size: usize, busy_retries: u32) -> Result<Self> {
        Self::build(Source::File(path.to_path_buf()), pool_size, busy_retries)
    }

    /// In-memory store for tests; every pooled connection sees the same data.
    pub fn open_in_memory(pool_size: usize) -> Result<Self> {
        let name = format!("file:agenthub_{}?mode=memory&cache=shared", Uuid::new_v4().simple());
        Self::build(Source::Memory(name), pool_size, 2)
    }

    fn build(source: Source, pool_size: usize, busy_retries: u32) -> Result<Self> {
        let pool_size = pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let conn = open_connection(&source)?;
            if i == 0 {
                schema::init_schema(&conn)?;
            }
            connections.push(conn);
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                connections: Mutex::new(connections),
                permits: Arc::new(Semaphore::new(pool_size)),
                source,
                busy_retries,
            }),
            notifier: Notifier::new(),
        })
    }

    /// The store-owned wake channel.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Runs `f` on a pooled connection within `deadline`. The closure may be
    /// re-run on transient busy/locked failures, so it must be restartable
    /// (single statements, or transactions that roll back on drop).
    pub async fn with_conn<T, F>(&self, deadline: Duration, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let start = Instant::now();
        let permit = tokio::time::timeout(deadline, self.inner.permits.clone().acquire_owned())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::Closed)?;

        let mut conn = self.inner.checkout()?;
        let interrupt = conn.get_interrupt_handle();
        let inner = self.inner.clone();
        let retries = inner.busy_retries;

        let mut task = tokio::task::spawn_blocking(move || {
            let result = run_with_retry(&mut conn, retries, &mut f);
            (conn, result)
        });

        let remaining = deadline.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, &mut task).await {
            Ok(Ok((conn, result))) => {
                inner.checkin(conn);
                drop(permit);
                result
            }
            Ok(Err(join_err)) => {
                // Connection is lost with the panicked task; a replacement is
                // opened lazily on the next checkout.
                drop(permit);
                Err(Error::Io(std::io::Error::other(join_err)))
            }
            Err(_elapsed) => {
                interrupt.interrupt();
                tokio::spawn(async move {
                    if let Ok((conn, _)) = task.await {
                        inner.checkin(conn);
                    }
                    drop(permit);
                });
                Err(Error::Timeout)
            }
        }
    }
}

impl PoolInner {
    fn checkout(&self) -> Result<Connection> {
        let popped = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match popped {
            Some(conn) => Ok(conn),
            None => open_connection(&self.source),
        }
    }

    fn checkin(&self, conn: Connection) {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(conn);
    }
}

fn open_connection(source: &Source) -> Result<Connection> {
    let conn = match source {
        Source::File(path) => {
            let conn = Connection::open(path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn
        }
        Source::Memory(uri) => Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?,
    };
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(conn)
}

fn run_with_retry<T, F>(conn: &mut Connection, retries: u32, f: &mut F) -> Result<T>
where
    F: FnMut(&mut Connection) -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match f(conn) {
            Err(err) if err.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::debug!(attempt, "retrying transient database failure");
                std::thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn pooled_connections_share_one_database() {
        let db = Database::open_in_memory(4).unwrap();
        db.with_conn(DEADLINE, |conn| {
            conn.execute(
                "INSERT INTO projects (id, path, name, created_at, updated_at)
                 VALUES ('p1', '/tmp/p', 'p', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        // A different pooled connection must observe the insert
        for _ in 0..4 {
            let count: i64 = db
                .with_conn(DEADLINE, |conn| {
                    Ok(conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?)
                })
                .await
                .unwrap();
            assert_eq!(count, 1);
        }
    }

    #[tokio::test]
    async fn deadline_interrupts_slow_work() {
        let db = Database::open_in_memory(1).unwrap();
        let result = db
            .with_conn(Duration::from_millis(50), |conn| {
                // recursive CTE that would run far past the deadline
                let n: i64 = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x+1 FROM c LIMIT 500000000)
                     SELECT COUNT(*) FROM c",
                    [],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.db");
        {
            let db = Database::open(&path, 2, 2).unwrap();
            db.with_conn(DEADLINE, |conn| {
                conn.execute(
                    "INSERT INTO projects (id, path, name, created_at, updated_at)
                     VALUES ('p1', '/tmp/p', 'p', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        }
        let db = Database::open(&path, 2, 2).unwrap();
        let count: i64 = db
            .with_conn(DEADLINE, |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
