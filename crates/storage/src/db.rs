//! SQLite connection pool with per-call deadlines

use std::{
    ops::{Deref, DerefMut},
    path::Path,
    time::{Duration, Instant},
};

use derive_more::Debug;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{VoteIndexerError, VoteIndexerResult};

/// Upper bound for a single operation's time budget.
pub const MAX_BUDGET: Duration = Duration::from_secs(24 * 3600);

/// Number of VM instructions between two deadline checks.
const PROGRESS_OPS: std::ffi::c_int = 1_000;

/// Configure a connection with standard PRAGMAs for WAL mode.
fn configure_connection(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )?;
    conn.busy_timeout(Duration::from_secs(5))
}

/// Pooled SQLite database.
///
/// Every operation runs on the blocking thread pool under a deadline. Once
/// the deadline passes the running statement is interrupted, so an open
/// transaction is rolled back instead of committed.
#[derive(Clone, Debug)]
pub struct SqliteDb {
    #[debug(skip)]
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDb {
    /// Open (or create) an on-disk database.
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> VoteIndexerResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(configure_connection);
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        Ok(Self { pool })
    }

    /// Create a private in-memory database, mostly useful in tests.
    ///
    /// The database lives in a single pooled connection that is never
    /// recycled, otherwise it would vanish with it. Shared-cache table locks
    /// ignore `busy_timeout`, so concurrent callers queue on the pool instead
    /// of sharing the cache.
    pub fn in_memory() -> VoteIndexerResult<Self> {
        let uri = format!("file:voteindexer_{}?mode=memory&cache=shared", Uuid::new_v4().simple());
        let manager = SqliteConnectionManager::file(uri).with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;
        Ok(Self { pool })
    }

    /// Run `f` on a pooled connection within `budget`.
    ///
    /// `f` receives the deadline so it can refuse to commit once it has passed.
    pub(crate) async fn run<T, F>(
        &self,
        operation: &'static str,
        budget: Duration,
        f: F,
    ) -> VoteIndexerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, Instant) -> VoteIndexerResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let start = Instant::now();
        let deadline = start + budget.min(MAX_BUDGET);

        let result = tokio::task::spawn_blocking(move || {
            ensure_before(deadline, operation)?;
            let conn = pool.get_timeout(deadline.saturating_duration_since(Instant::now()))?;
            let mut conn = BoundedConnection::new(conn, deadline);
            f(&mut *conn, deadline)
        })
        .await
        .map_err(VoteIndexerError::from)
        .and_then(|res| res);

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(_) => debug!(operation, duration_ms, "storage operation completed"),
            Err(e) if e.is_transient() => {
                warn!(operation, duration_ms, error = %e, "storage operation failed")
            }
            Err(e) => error!(operation, duration_ms, error = %e, "storage operation failed"),
        }
        result
    }
}

/// Fail with a timeout if `deadline` has already passed.
pub(crate) fn ensure_before(deadline: Instant, operation: &'static str) -> VoteIndexerResult<()> {
    if Instant::now() >= deadline {
        return Err(VoteIndexerError::Timeout { operation });
    }
    Ok(())
}

/// Pooled connection whose statements are interrupted after a deadline.
///
/// Dropping it removes the progress handler and rolls back any transaction
/// left open, so the connection goes back to the pool clean.
struct BoundedConnection(PooledConnection<SqliteConnectionManager>);

impl BoundedConnection {
    fn new(conn: PooledConnection<SqliteConnectionManager>, deadline: Instant) -> Self {
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        Self(conn)
    }
}

impl Deref for BoundedConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BoundedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Drop for BoundedConnection {
    fn drop(&mut self) {
        self.0.progress_handler(0, None::<fn() -> bool>);
        if !self.0.is_autocommit() {
            if let Err(e) = self.0.execute_batch("ROLLBACK") {
                error!(error = %e, "failed to roll back dangling transaction");
            }
        }
    }
}
