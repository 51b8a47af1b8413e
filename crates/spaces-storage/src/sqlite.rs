//! SQLite storage backend.
//!
//! Persists blocks, transactions, spaces, space history, sync checkpoints and
//! the sync lock to a single SQLite file. Each block is ingested inside one
//! `sqlx` transaction; dropping it without commit rolls everything back.
//!
//! The sync lock is an `EXCLUSIVE` transaction on a sidecar database next to
//! the main file (`<db>.<name>.lock`), held open on a dedicated connection for
//! the run. SQLite file locks belong to the process, so a crashed run
//! releases the lock with it. In-memory stores lock within the process only.
//!
//! # Usage
//! ```rust,no_run
//! use spaces_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./spaces.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{ConnectOptions, Connection, Row, Sqlite, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use spaces_core::checkpoint::{CheckpointStore, SyncCheckpoint};
use spaces_core::error::IndexerError;
use spaces_core::lock::RunLock;
use spaces_core::store::{IngestTx, SpaceReader, SpaceStore};
use spaces_core::types::{
    Block, NewHistory, Space, SpaceAction, SpaceHistory, SpaceStatus, Transaction,
};

use crate::column::{opt_to_i64, opt_to_u64, to_i64, to_u64};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        hash          TEXT    NOT NULL UNIQUE,
        height        INTEGER NOT NULL UNIQUE,
        time          INTEGER NOT NULL,
        median_time   INTEGER NOT NULL,
        difficulty    REAL    NOT NULL,
        merkle_root   TEXT    NOT NULL,
        size          INTEGER NOT NULL,
        stripped_size INTEGER NOT NULL,
        weight        INTEGER NOT NULL,
        version       INTEGER NOT NULL,
        bits          TEXT    NOT NULL,
        nonce         INTEGER NOT NULL,
        tx_count      INTEGER NOT NULL,
        previous_hash TEXT,
        next_hash     TEXT
    );",
    "CREATE TABLE IF NOT EXISTS transactions (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        block_id INTEGER NOT NULL REFERENCES blocks (id),
        position INTEGER NOT NULL,
        txid     TEXT    NOT NULL UNIQUE,
        raw      TEXT    NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS spaces (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT    NOT NULL UNIQUE,
        status          TEXT    NOT NULL,
        last_history_id INTEGER,
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS space_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        space_id       INTEGER NOT NULL REFERENCES spaces (id),
        transaction_id INTEGER NOT NULL REFERENCES transactions (id),
        txid           TEXT    NOT NULL,
        action         TEXT,
        bid_amount     INTEGER,
        payload        TEXT    NOT NULL,
        created_at     INTEGER NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_space_history_space ON space_history (space_id, id);",
    "CREATE TABLE IF NOT EXISTS sync_checkpoints (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        start_height  INTEGER NOT NULL,
        end_height    INTEGER NOT NULL,
        duration_secs REAL    NOT NULL,
        recorded_at   INTEGER NOT NULL
    );",
];

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn space_from_row(row: &SqliteRow) -> Result<Space, IndexerError> {
    Ok(Space {
        id: row.get("id"),
        name: row.get("name"),
        status: row.get::<String, _>("status").parse()?,
        last_history_id: row.get("last_history_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn history_from_row(row: &SqliteRow) -> Result<SpaceHistory, IndexerError> {
    let payload: String = row.get("payload");
    Ok(SpaceHistory {
        id: row.get("id"),
        space_id: row.get("space_id"),
        transaction_id: row.get("transaction_id"),
        txid: row.get("txid"),
        action: row
            .get::<Option<String>, _>("action")
            .map(|a| SpaceAction::from_label(&a)),
        bid_amount: opt_to_u64("bid_amount", row.get("bid_amount"))?,
        payload: serde_json::from_str(&payload)?,
        created_at: row.get("created_at"),
    })
}

/// SQLite-backed storage for the spaces indexer.
pub struct SqliteStorage {
    pool: SqlitePool,
    /// Database file, `None` for in-memory stores.
    path: Option<PathBuf>,
    /// Lock connections holding an open `EXCLUSIVE` transaction, keyed by
    /// lock name. In-memory stores keep a `None` marker.
    held_locks: Mutex<HashMap<String, Option<SqliteConnection>>>,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./spaces.db"`) or a SQLite URL
    /// (`"sqlite:./spaces.db"`). A missing file is created.
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let options = if path.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(path).map_err(db_err)?
        } else {
            SqliteConnectOptions::new().filename(path)
        };
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self::with_pool(pool, Some(db_file(path)));
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Uses a single pooled connection that is never recycled, since every
    /// connection to `sqlite::memory:` is a separate database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self::with_pool(pool, None);
        storage.init_schema().await?;
        Ok(storage)
    }

    fn with_pool(pool: SqlitePool, path: Option<PathBuf>) -> Self {
        Self {
            pool,
            path,
            held_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
        }
        debug!("sqlite schema initialized");
        Ok(())
    }

    /// Heights of every stored block, ascending.
    pub async fn stored_heights(&self) -> Result<Vec<u64>, IndexerError> {
        let rows = sqlx::query("SELECT height FROM blocks ORDER BY height")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| to_u64("height", r.get("height")))
            .collect()
    }
}

// ─── Ingestion transaction ───────────────────────────────────────────────────

struct SqliteTx {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl IngestTx for SqliteTx {
    async fn insert_block(&mut self, block: &Block) -> Result<i64, IndexerError> {
        let result = sqlx::query(
            "INSERT INTO blocks
             (hash, height, time, median_time, difficulty, merkle_root, size, stripped_size,
              weight, version, bits, nonce, tx_count, previous_hash, next_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&block.hash)
        .bind(to_i64("height", block.height)?)
        .bind(block.time)
        .bind(block.median_time)
        .bind(block.difficulty)
        .bind(&block.merkle_root)
        .bind(to_i64("size", block.size)?)
        .bind(to_i64("stripped_size", block.stripped_size)?)
        .bind(to_i64("weight", block.weight)?)
        .bind(block.version)
        .bind(&block.bits)
        .bind(to_i64("nonce", block.nonce)?)
        .bind(i64::from(block.tx_count))
        .bind(block.previous_hash.as_deref())
        .bind(block.next_hash.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_transaction(
        &mut self,
        block_id: i64,
        position: u32,
        tx: &Transaction,
    ) -> Result<i64, IndexerError> {
        let raw = serde_json::to_string(&tx.raw)?;
        let result = sqlx::query(
            "INSERT INTO transactions (block_id, position, txid, raw) VALUES (?, ?, ?, ?)",
        )
        .bind(block_id)
        .bind(i64::from(position))
        .bind(&tx.txid)
        .bind(&raw)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn find_space(&mut self, name: &str) -> Result<Option<Space>, IndexerError> {
        let row = sqlx::query("SELECT * FROM spaces WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(space_from_row).transpose()
    }

    async fn create_space(
        &mut self,
        name: &str,
        status: SpaceStatus,
    ) -> Result<Space, IndexerError> {
        let ts = now();
        let result = sqlx::query(
            "INSERT INTO spaces (name, status, last_history_id, created_at, updated_at)
             VALUES (?, ?, NULL, ?, ?)",
        )
        .bind(name)
        .bind(status.as_str())
        .bind(ts)
        .bind(ts)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(Space {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            status,
            last_history_id: None,
            created_at: ts,
            updated_at: ts,
        })
    }

    async fn space_history(&mut self, space_id: i64) -> Result<Vec<SpaceHistory>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM space_history WHERE space_id = ? ORDER BY id")
            .bind(space_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter().map(history_from_row).collect()
    }

    async fn append_history(&mut self, entry: &NewHistory) -> Result<i64, IndexerError> {
        let payload = serde_json::to_string(&entry.payload)?;
        let result = sqlx::query(
            "INSERT INTO space_history
             (space_id, transaction_id, txid, action, bid_amount, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.space_id)
        .bind(entry.transaction_id)
        .bind(&entry.txid)
        .bind(entry.action.as_ref().map(|a| a.as_str().to_string()))
        .bind(opt_to_i64("bid_amount", entry.bid_amount)?)
        .bind(&payload)
        .bind(now())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn update_space(
        &mut self,
        space_id: i64,
        last_history_id: i64,
        status: Option<SpaceStatus>,
    ) -> Result<(), IndexerError> {
        sqlx::query(
            "UPDATE spaces
             SET last_history_id = ?, status = COALESCE(?, status), updated_at = ?
             WHERE id = ?",
        )
        .bind(last_history_id)
        .bind(status.map(|s| s.as_str()))
        .bind(now())
        .bind(space_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        self.tx.commit().await.map_err(db_err)
    }
}

#[async_trait]
impl SpaceStore for SqliteStorage {
    async fn begin<'a>(&'a self) -> Result<Box<dyn IngestTx + 'a>, IndexerError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[async_trait]
impl SpaceReader for SqliteStorage {
    async fn space(&self, name: &str) -> Result<Option<Space>, IndexerError> {
        let row = sqlx::query("SELECT * FROM spaces WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(space_from_row).transpose()
    }

    async fn history_for(&self, name: &str) -> Result<Vec<SpaceHistory>, IndexerError> {
        let rows = sqlx::query(
            "SELECT h.* FROM space_history h
             JOIN spaces s ON s.id = h.space_id
             WHERE s.name = ? ORDER BY h.id",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(history_from_row).collect()
    }

    async fn block_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        to_u64("count", row.get("cnt"))
    }

    async fn transaction_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        to_u64("count", row.get("cnt"))
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn last_end_height(&self) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query("SELECT MAX(end_height) AS end_height FROM sync_checkpoints")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        opt_to_u64("end_height", row.get("end_height"))
    }

    async fn record(&self, checkpoint: SyncCheckpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO sync_checkpoints (start_height, end_height, duration_secs, recorded_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(to_i64("start_height", checkpoint.start_height)?)
        .bind(to_i64("end_height", checkpoint.end_height)?)
        .bind(checkpoint.duration_secs)
        .bind(checkpoint.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(
            start = checkpoint.start_height,
            end = checkpoint.end_height,
            "checkpoint recorded"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncCheckpoint>, IndexerError> {
        let rows = sqlx::query(
            "SELECT start_height, end_height, duration_secs, recorded_at
             FROM sync_checkpoints ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| {
                Ok(SyncCheckpoint {
                    start_height: to_u64("start_height", r.get("start_height"))?,
                    end_height: to_u64("end_height", r.get("end_height"))?,
                    duration_secs: r.get("duration_secs"),
                    recorded_at: r.get("recorded_at"),
                })
            })
            .collect()
    }
}

// ─── RunLock impl ────────────────────────────────────────────────────────────

/// File path of a database given as a plain path or `sqlite:` URL.
fn db_file(path: &str) -> PathBuf {
    let file = path
        .strip_prefix("sqlite://")
        .or_else(|| path.strip_prefix("sqlite:"))
        .unwrap_or(path);
    PathBuf::from(file.split('?').next().unwrap_or(file))
}

/// Sidecar lock database for `name`, next to the main database file.
fn lock_file(db: &Path, name: &str) -> PathBuf {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let mut file = db.as_os_str().to_owned();
    file.push(format!(".{safe}.lock"));
    PathBuf::from(file)
}

/// `SQLITE_BUSY` / `SQLITE_LOCKED`: another connection holds the file lock.
fn is_busy(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| matches!(&*code, "5" | "6" | "261" | "262" | "517"))
}

async fn acquire_file_lock(file: &Path) -> Result<Option<SqliteConnection>, sqlx::Error> {
    let mut conn = SqliteConnectOptions::new()
        .filename(file)
        .create_if_missing(true)
        .busy_timeout(Duration::ZERO)
        .connect()
        .await?;
    match sqlx::query("BEGIN EXCLUSIVE").execute(&mut conn).await {
        Ok(_) => Ok(Some(conn)),
        Err(e) if is_busy(&e) => {
            let _ = conn.close().await;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl RunLock for SqliteStorage {
    async fn try_lock(&self, name: &str) -> Result<bool, IndexerError> {
        let mut held = self.held_locks.lock().await;
        if held.contains_key(name) {
            return Ok(false);
        }

        let Some(db) = &self.path else {
            held.insert(name.to_string(), None);
            return Ok(true);
        };

        match acquire_file_lock(&lock_file(db, name)).await {
            Ok(Some(conn)) => {
                held.insert(name.to_string(), Some(conn));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) if is_busy(&e) => Ok(false),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn unlock(&self, name: &str) -> Result<(), IndexerError> {
        let Some(Some(mut conn)) = self.held_locks.lock().await.remove(name) else {
            return Ok(());
        };
        let released = sqlx::query("ROLLBACK").execute(&mut conn).await;
        // Closing the connection drops the file lock even if ROLLBACK failed.
        if let Err(e) = conn.close().await {
            warn!(lock = name, error = %e, "failed to close sqlite lock connection");
        }
        released.map(|_| ()).map_err(db_err)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
