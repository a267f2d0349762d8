// Attendance store backed by a single SQLite file.
//
// Every table holds JSON payloads. Attendance tables also carry the row's
// identity key as canonical JSON under a UNIQUE index, so a duplicate can
// never land even if two writers race.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use floorbook_recon::store::{patched_row, AttendanceStore, Table, TableRecord};
use floorbook_recon::{IdentityKey, StoreError};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS paid_orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS free_orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS paid_attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS free_attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS social_attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sync_lock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at TEXT NOT NULL
);
"#;

/// Low-level database failure, before it is attributed to a table.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("database schema version {found} is newer than supported ({supported})")]
    SchemaVersion { found: i64, supported: i64 },
}

fn write_error(table: Table, attempted: usize, err: impl Into<DbError>) -> StoreError {
    StoreError::Write {
        table,
        attempted,
        written: 0,
        message: err.into().to_string(),
    }
}

fn read_error(table: Table, err: impl Into<DbError>) -> StoreError {
    StoreError::Read {
        table,
        message: err.into().to_string(),
    }
}

fn lock_error(err: impl Into<DbError>) -> StoreError {
    StoreError::Lock(err.into().to_string())
}

fn identity_of<T: IdentityKey>(row: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&row.identity_key())
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened attendance database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(SCHEMA)?;

        let found: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
            .optional()?;
        match found.and_then(|v| v.parse::<i64>().ok()) {
            Some(version) if version > SCHEMA_VERSION => {
                return Err(DbError::SchemaVersion {
                    found: version,
                    supported: SCHEMA_VERSION,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
        }

        Ok(Self { conn })
    }

    pub fn row_count(&self, table: Table) -> Result<usize, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Current lock holder, if any.
    pub fn lock_holder(&self) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row("SELECT holder FROM sync_lock WHERE id = 1", [], |row| row.get(0))
            .optional()?)
    }

    fn payloads(&self, table: Table) -> Result<Vec<String>, DbError> {
        let sql = format!("SELECT payload FROM {} ORDER BY id", table.name());
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl AttendanceStore for SqliteStore {
    fn read_rows<T: TableRecord>(&self) -> Result<Vec<T>, StoreError> {
        self.payloads(T::TABLE)
            .map_err(|e| read_error(T::TABLE, e))?
            .iter()
            .map(|p| serde_json::from_str(p).map_err(|e| read_error(T::TABLE, e)))
            .collect()
    }

    fn read_keys<T: TableRecord + IdentityKey>(&self) -> Result<HashSet<T::Key>, StoreError> {
        let table = T::TABLE;
        let sql = format!("SELECT identity FROM {}", table.name());
        let mut stmt = self.conn.prepare(&sql).map_err(|e| read_error(table, e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| read_error(table, e))?;

        let mut keys = HashSet::new();
        for row in rows {
            let identity = row.map_err(|e| read_error(table, e))?;
            let key: T::Key = serde_json::from_str(&identity).map_err(|e| read_error(table, e))?;
            keys.insert(key);
        }
        debug!(table = %table, keys = keys.len(), "read identity keys");
        Ok(keys)
    }

    /// All-or-nothing: a unique-index violation rolls the whole batch back.
    fn insert_rows<T: TableRecord + IdentityKey>(&mut self, rows: &[T]) -> Result<usize, StoreError> {
        let table = T::TABLE;
        let attempted = rows.len();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| write_error(table, attempted, e))?;
        {
            let sql = format!("INSERT INTO {} (identity, payload) VALUES (?1, ?2)", table.name());
            let mut stmt = tx.prepare(&sql).map_err(|e| write_error(table, attempted, e))?;
            for row in rows {
                let identity = identity_of(row).map_err(|e| write_error(table, attempted, e))?;
                let payload =
                    serde_json::to_string(row).map_err(|e| write_error(table, attempted, e))?;
                stmt.execute(params![identity, payload])
                    .map_err(|e| write_error(table, attempted, e))?;
            }
        }
        tx.commit().map_err(|e| write_error(table, attempted, e))?;
        debug!(table = %table, rows = attempted, "inserted rows");
        Ok(attempted)
    }

    fn replace_all<T: TableRecord>(&mut self, rows: &[T]) -> Result<usize, StoreError> {
        let table = T::TABLE;
        let attempted = rows.len();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| write_error(table, attempted, e))?;
        tx.execute(&format!("DELETE FROM {}", table.name()), [])
            .map_err(|e| write_error(table, attempted, e))?;
        {
            let sql = format!("INSERT INTO {} (payload) VALUES (?1)", table.name());
            let mut stmt = tx.prepare(&sql).map_err(|e| write_error(table, attempted, e))?;
            for row in rows {
                let payload =
                    serde_json::to_string(row).map_err(|e| write_error(table, attempted, e))?;
                stmt.execute(params![payload])
                    .map_err(|e| write_error(table, attempted, e))?;
            }
        }
        tx.commit().map_err(|e| write_error(table, attempted, e))?;
        debug!(table = %table, rows = attempted, "replaced snapshot");
        Ok(attempted)
    }

    fn update_row<T: TableRecord + IdentityKey>(
        &mut self,
        key: &T::Key,
        patch: &Value,
    ) -> Result<T, StoreError> {
        let table = T::TABLE;
        let identity = serde_json::to_string(key).map_err(|e| write_error(table, 1, e))?;

        let found: Option<(i64, String)> = self
            .conn
            .query_row(
                &format!("SELECT id, payload FROM {} WHERE identity = ?1", table.name()),
                params![identity],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| read_error(table, e))?;
        let Some((id, payload)) = found else {
            return Err(StoreError::NotFound {
                table,
                key: key.to_string(),
            });
        };

        let current: Value = serde_json::from_str(&payload).map_err(|e| read_error(table, e))?;
        let (updated, typed) = patched_row::<T>(&current, key, patch)?;
        let encoded = serde_json::to_string(&updated).map_err(|e| write_error(table, 1, e))?;
        self.conn
            .execute(
                &format!("UPDATE {} SET payload = ?1 WHERE id = ?2", table.name()),
                params![encoded, id],
            )
            .map_err(|e| write_error(table, 1, e))?;
        Ok(typed)
    }

    fn try_lock(
        &mut self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(lock_error)?;

        let current: Option<(String, String)> = tx
            .query_row("SELECT holder, acquired_at FROM sync_lock WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(lock_error)?;

        if let Some((current_holder, acquired_at)) = current {
            let acquired = DateTime::parse_from_rfc3339(&acquired_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StoreError::Lock(format!("bad lock timestamp {acquired_at:?}: {e}")))?;
            if current_holder != holder && now - acquired < ttl {
                debug!(holder = %current_holder, "sync lock is held");
                return Ok(false);
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO sync_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)",
            params![holder, now.to_rfc3339()],
        )
        .map_err(lock_error)?;
        tx.commit().map_err(lock_error)?;
        Ok(true)
    }

    fn unlock(&mut self, holder: &str) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM sync_lock WHERE id = 1 AND holder = ?1", params![holder])
            .map_err(lock_error)?;
        if removed == 0 {
            if let Some(other) = self.lock_holder().map_err(lock_error)? {
                return Err(StoreError::Lock(format!(
                    "lock is held by '{other}', not '{holder}'"
                )));
            }
        }
        Ok(())
    }
}
